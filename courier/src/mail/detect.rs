//! Content-type detection for attached files.

use std::path::Path;

/// Guesses the MIME type of a file.
///
/// One detector is shared by every attachment path (explicit attachment
/// parameters and the `mime_attach` shortcut).
pub trait ContentTypeDetector: Send + Sync + 'static {
    /// Returns `None` when nothing better than `application/octet-stream`
    /// can be said about the file.
    fn detect(&self, path: &Path) -> Option<String>;
}

/// Detects by file extension using `mime_guess`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionDetector;

impl ContentTypeDetector for ExtensionDetector {
    fn detect(&self, path: &Path) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_extensions() {
        let detector = ExtensionDetector;
        assert_eq!(detector.detect(Path::new("report.pdf")).as_deref(), Some("application/pdf"));
        assert_eq!(detector.detect(Path::new("notes.txt")).as_deref(), Some("text/plain"));
        assert_eq!(detector.detect(Path::new("photo.PNG")).as_deref(), Some("image/png"));
    }

    #[test]
    fn unknown_extension_is_undetected() {
        assert_eq!(ExtensionDetector.detect(Path::new("blob")), None);
    }
}
