//! S/MIME signing and encryption of a composed MIME tree.
//!
//! Signing and encryption are applied after composition as the last
//! transform, always in the order sign, then encrypt. Key material is read
//! from disk on every call.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use lettre::message::header::ContentDisposition;
use lettre::message::SinglePart;
use openssl::pkcs12::Pkcs12;
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::{X509Ref, X509};

use crate::config::MailSettings;
use crate::error::{MailError, SecurityError};
use crate::mail::{content_type, ContentDescription, Leaf, MailRequest, MimeNode, Multipart};

pub const DEFAULT_ALGORITHM: &str = "AES256_CBC";

/// A named algorithm accepted by `encryption_algorithm`.
///
/// The table keeps every name the mail module has historically accepted.
/// Only the block ciphers usable for PKCS#7 enveloped data map to a content
/// cipher; the AEAD, key-wrap, key-agreement and digest names are recognised
/// but refused when an envelope is built.
#[derive(Debug, Clone, Copy)]
pub struct EncryptionAlgorithm {
    name: &'static str,
    cipher: Option<fn() -> Cipher>,
}

impl PartialEq for EncryptionAlgorithm {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EncryptionAlgorithm {}

const ALGORITHMS: &[EncryptionAlgorithm] = &[
    alg("AES128_CBC", Some(Cipher::aes_128_cbc)),
    alg("AES128_CCM", None),
    alg("AES128_GCM", None),
    alg("AES128_WRAP", None),
    alg("AES192_CBC", Some(Cipher::aes_192_cbc)),
    alg("AES192_CCM", None),
    alg("AES192_GCM", None),
    alg("AES192_WRAP", None),
    alg("AES256_CBC", Some(Cipher::aes_256_cbc)),
    alg("AES256_CCM", None),
    alg("AES256_GCM", None),
    alg("AES256_WRAP", None),
    alg("CAMELLIA128_CBC", Some(Cipher::camellia_128_cbc)),
    alg("CAMELLIA128_WRAP", None),
    alg("CAMELLIA192_CBC", Some(Cipher::camellia_192_cbc)),
    alg("CAMELLIA192_WRAP", None),
    alg("CAMELLIA256_CBC", Some(Cipher::camellia_256_cbc)),
    alg("CAMELLIA256_WRAP", None),
    alg("CAST5_CBC", None),
    alg("DES_CBC", Some(Cipher::des_cbc)),
    alg("DES_EDE3_CBC", Some(Cipher::des_ede3_cbc)),
    alg("DES_EDE3_WRAP", None),
    alg("ECCDH_SHA1KDF", None),
    alg("ECCDH_SHA224KDF", None),
    alg("ECCDH_SHA256KDF", None),
    alg("ECCDH_SHA384KDF", None),
    alg("ECCDH_SHA512KDF", None),
    alg("ECDH_SHA1KDF", None),
    alg("ECDH_SHA224KDF", None),
    alg("ECDH_SHA256KDF", None),
    alg("ECDH_SHA384KDF", None),
    alg("ECDH_SHA512KDF", None),
    alg("ECMQV_SHA1KDF", None),
    alg("ECMQV_SHA224KDF", None),
    alg("ECMQV_SHA256KDF", None),
    alg("ECMQV_SHA384KDF", None),
    alg("ECMQV_SHA512KDF", None),
    alg("GOST3411", None),
    alg("IDEA_CBC", None),
    alg("MD5", None),
    alg("RC2_CBC", Some(Cipher::rc2_cbc)),
    alg("RIPEMD128", None),
    alg("RIPEMD160", None),
    alg("RIPEMD256", None),
    alg("SEED_CBC", Some(Cipher::seed_cbc)),
    alg("SEED_WRAP", None),
    alg("SHA1", None),
    alg("SHA224", None),
    alg("SHA256", None),
    alg("SHA384", None),
    alg("SHA512", None),
];

const fn alg(name: &'static str, cipher: Option<fn() -> Cipher>) -> EncryptionAlgorithm {
    EncryptionAlgorithm { name, cipher }
}

impl EncryptionAlgorithm {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn all() -> &'static [EncryptionAlgorithm] {
        ALGORITHMS
    }

    fn content_cipher(&self) -> Result<Cipher, SecurityError> {
        self.cipher.map(|cipher| cipher()).ok_or_else(|| {
            SecurityError::Unsupported(format!(
                "{} cannot be used as a content encryption cipher",
                self.name
            ))
        })
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALGORITHMS
            .iter()
            .find(|alg| alg.name.eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| {
                MailError::configuration(format!("unsupported encryption algorithm '{wanted}'"))
            })
    }
}

/// Where to find the signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCredentials {
    pub keystore: PathBuf,
    pub keystore_password: String,
    pub key_alias: Option<String>,
    pub key_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    pub recipient_cert: PathBuf,
    pub algorithm: EncryptionAlgorithm,
}

/// What the envelope has to do for one call. Built before any key material is
/// touched, so configuration problems surface first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityOptions {
    pub signing: Option<SigningCredentials>,
    pub encryption: Option<EncryptionOptions>,
}

impl SecurityOptions {
    /// Merge call attributes with the default signing settings.
    ///
    /// The algorithm name is checked first; a missing keystore or recipient
    /// certificate is reported after it.
    pub fn resolve(request: &MailRequest, settings: &MailSettings) -> Result<Self, MailError> {
        let algorithm = if request.encrypt {
            let name = request
                .encryption_algorithm
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(DEFAULT_ALGORITHM);
            Some(name.parse::<EncryptionAlgorithm>()?)
        } else {
            None
        };

        let defaults = &settings.signing;
        let use_defaults = request.sign.is_none() && defaults.sign_message;
        let signing = if request.sign.unwrap_or(false) || use_defaults {
            let (keystore, keystore_password, key_alias, key_password) = if use_defaults {
                (
                    defaults.keystore.clone(),
                    defaults.keystore_password.clone(),
                    defaults.key_alias.clone(),
                    defaults.key_password.clone(),
                )
            } else {
                (
                    request.keystore.clone(),
                    request.keystore_password.clone(),
                    request.key_alias.clone(),
                    request.key_password.clone(),
                )
            };
            let keystore = keystore.ok_or_else(|| {
                MailError::configuration("signing requested but no keystore was given")
            })?;
            Some(SigningCredentials {
                keystore,
                keystore_password: keystore_password.unwrap_or_default(),
                key_alias,
                key_password,
            })
        } else {
            None
        };

        let encryption = match algorithm {
            Some(algorithm) => {
                let recipient_cert = request.recipient_cert.clone().ok_or_else(|| {
                    MailError::configuration(
                        "encryption requested but no recipient certificate was given",
                    )
                })?;
                Some(EncryptionOptions {
                    recipient_cert,
                    algorithm,
                })
            }
            None => None,
        };

        Ok(Self { signing, encryption })
    }

    pub fn is_active(&self) -> bool {
        self.signing.is_some() || self.encryption.is_some()
    }
}

/// Apply the requested transforms to `body`: sign, then encrypt the result.
pub fn seal(body: MimeNode, options: &SecurityOptions) -> Result<MimeNode, SecurityError> {
    let mut node = body;
    if let Some(credentials) = &options.signing {
        node = sign(node, credentials)?;
    }
    if let Some(encryption) = &options.encryption {
        node = encrypt(&node, encryption)?;
    }
    Ok(node)
}

/// The loaded signing identity.
pub struct Signer {
    pub key: PKey<Private>,
    pub cert: X509,
    pub chain: Stack<X509>,
}

impl Signer {
    pub fn load(credentials: &SigningCredentials) -> Result<Self, SecurityError> {
        let der = read(&credentials.keystore)?;
        let pkcs12 = Pkcs12::from_der(&der)?;

        let mut parsed = pkcs12.parse2(&credentials.keystore_password)?;
        if parsed.pkey.is_none() {
            if let Some(key_password) = credentials
                .key_password
                .as_deref()
                .filter(|p| *p != credentials.keystore_password)
            {
                parsed = pkcs12.parse2(key_password)?;
            }
        }

        let key = parsed
            .pkey
            .ok_or_else(|| SecurityError::Keystore("keystore holds no private key".into()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| SecurityError::Keystore("keystore holds no certificate".into()))?;

        if let Some(alias) = credentials.key_alias.as_deref() {
            check_alias(&cert, alias)?;
        }

        let chain = match parsed.ca {
            Some(ca) => ca,
            None => Stack::new()?,
        };
        Ok(Self { key, cert, chain })
    }
}

fn check_alias(cert: &X509Ref, alias: &str) -> Result<(), SecurityError> {
    match cert.alias() {
        Some(name) if !String::from_utf8_lossy(name).eq_ignore_ascii_case(alias) => {
            Err(SecurityError::Keystore(format!(
                "no key with alias '{alias}' in keystore"
            )))
        }
        _ => Ok(()),
    }
}

/// Digest name for `micalg`. OpenSSL signs with the key's default digest,
/// which is SHA-256 for RSA, DSA and EC keys.
fn micalg(key: &PKeyRef<Private>) -> Result<&'static str, SecurityError> {
    let id = key.id();
    if id == Id::RSA || id == Id::DSA || id == Id::EC {
        Ok("sha-256")
    } else {
        Err(SecurityError::Unsupported(format!(
            "no signature algorithm for key type {id:?}"
        )))
    }
}

/// Wrap `content` in `multipart/signed` with a detached PKCS#7 signature.
///
/// The signature covers the rendered content up to, not including, the CRLF
/// that precedes the next boundary.
pub fn sign(content: MimeNode, credentials: &SigningCredentials) -> Result<MimeNode, SecurityError> {
    let signer = Signer::load(credentials)?;
    let micalg = micalg(&signer.key)?;

    let rendered = content.render();
    let signed = rendered.strip_suffix(b"\r\n").unwrap_or(rendered.as_slice());
    let pkcs7 = Pkcs7::sign(
        &signer.cert,
        &signer.key,
        &signer.chain,
        signed,
        Pkcs7Flags::DETACHED | Pkcs7Flags::BINARY,
    )?;
    let signature = pkcs7.to_der()?;

    tracing::debug!(micalg, bytes = signed.len(), "signed message content");

    let signature = Leaf::binary(
        SinglePart::builder()
            .header(ContentDisposition::attachment("smime.p7s"))
            .header(ContentDescription::new("S/MIME Cryptographic Signature")),
        smime_type("application/pkcs7-signature; name=smime.p7s")?,
        signature,
    );
    Ok(Multipart::signed("application/pkcs7-signature", micalg)
        .with_part(content)
        .with_part(signature)
        .into())
}

/// Wrap `content` in PKCS#7 enveloped data for the recipient certificate.
pub fn encrypt(content: &MimeNode, options: &EncryptionOptions) -> Result<MimeNode, SecurityError> {
    let cipher = options.algorithm.content_cipher()?;
    let cert = load_certificate(&options.recipient_cert)?;

    let mut recipients = Stack::new()?;
    recipients.push(cert)?;

    let rendered = content.render();
    let pkcs7 = Pkcs7::encrypt(&recipients, &rendered, cipher, Pkcs7Flags::BINARY)?;
    let enveloped = pkcs7.to_der()?;

    tracing::debug!(algorithm = options.algorithm.name(), "encrypted message content");

    Ok(Leaf::binary(
        SinglePart::builder()
            .header(ContentDisposition::attachment("smime.p7m"))
            .header(ContentDescription::new("S/MIME Encrypted Message")),
        smime_type("application/pkcs7-mime; smime-type=enveloped-data; name=smime.p7m")?,
        enveloped,
    )
    .into())
}

fn smime_type(value: &str) -> Result<lettre::message::header::ContentType, SecurityError> {
    content_type(value).map_err(|e| SecurityError::Unsupported(e.to_string()))
}

/// Open an enveloped entity produced by [`encrypt`] and return the inner
/// rendered entity.
pub fn decrypt(
    enveloped: &[u8],
    key: &PKeyRef<Private>,
    cert: &X509Ref,
) -> Result<Vec<u8>, SecurityError> {
    let pkcs7 = Pkcs7::from_der(enveloped)?;
    Ok(pkcs7.decrypt(key, cert, Pkcs7Flags::BINARY)?)
}

/// Load a certificate in PEM or DER form.
pub fn load_certificate(path: &Path) -> Result<X509, SecurityError> {
    let bytes = read(path)?;
    let cert = if bytes.starts_with(b"-----BEGIN") {
        X509::from_pem(&bytes)?
    } else {
        X509::from_der(&bytes)?
    };
    Ok(cert)
}

fn read(path: &Path) -> Result<Vec<u8>, SecurityError> {
    std::fs::read(path).map_err(|source| SecurityError::Io {
        path: path.to_path_buf(),
        source,
    })
}
