use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier::mail::{MailBuilder, SmtpMailer};
use courier::spool::{BounceEntry, EntryStore, FileStore, LogHooks, SpoolEntry, SpoolManager, SpoolScheduler};
use courier::{Delivery, MailContext, MailService, MailSettings};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use time::format_description::well_known::Rfc3339;

type FileSpool = SpoolManager<FileStore<SpoolEntry>, FileStore<BounceEntry>>;

#[derive(Parser)]
#[command(name = "courier", about = "Compose, send and spool mail")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbosity: u8,

    /// TOML settings file; `COURIER_*` environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message described by a JSON file.
    Send {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Spool the message instead of sending it now.
        #[arg(long)]
        spool: bool,
    },
    /// Inspect or drive the spool.
    Spool {
        #[command(subcommand)]
        command: SpoolCommand,
    },
}

#[derive(Subcommand)]
enum SpoolCommand {
    /// List messages waiting for delivery.
    List,
    /// List messages whose delivery failed.
    Bounces,
    /// Run one delivery cycle and print its summary.
    RunOnce,
    /// Run delivery cycles on the configured interval until Ctrl+C.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("initialising logger")?;

    let settings = Arc::new(MailSettings::load(cli.config.as_deref()).context("loading settings")?);
    let manager = Arc::new(open_spool(&settings).await?);

    match cli.command {
        Commands::Send { file, spool } => send(settings, manager, file, spool).await,
        Commands::Spool { command } => match command {
            SpoolCommand::List => list_spool(&manager).await,
            SpoolCommand::Bounces => list_bounces(&manager).await,
            SpoolCommand::RunOnce => {
                let summary = manager.run_cycle().await.context("running spool cycle")?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            SpoolCommand::Watch => watch(&settings, manager).await,
        },
    }
}

async fn open_spool(settings: &MailSettings) -> Result<FileSpool> {
    let spool = FileStore::open(&settings.spool_directory)
        .await
        .with_context(|| format!("opening spool {}", settings.spool_directory.display()))?;
    let bounces = FileStore::open(&settings.bounce_directory)
        .await
        .with_context(|| format!("opening bounce store {}", settings.bounce_directory.display()))?;
    Ok(SpoolManager::new(spool, bounces, Arc::new(SmtpMailer::new())).log_enabled(settings.log_enabled))
}

async fn send(settings: Arc<MailSettings>, manager: Arc<FileSpool>, file: PathBuf, spool: bool) -> Result<()> {
    let json = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let mut mail: MailBuilder =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", file.display()))?;
    if spool {
        mail.request.spool_enable = Some(true);
    }

    let service = MailService::new(settings, Arc::new(SmtpMailer::new()), manager);
    let dispatch = service
        .send(&mail, &MailContext::new())
        .await
        .context("sending message")?;

    match dispatch.delivery {
        Delivery::Sent { message_id } => {
            log::info!("Sent via {}:{}", dispatch.server.host, dispatch.server.port);
            println!("{message_id}");
        }
        Delivery::Spooled { id } => {
            log::info!("Spooled as {id}");
            println!("{id}");
        }
    }
    Ok(())
}

async fn list_spool(manager: &FileSpool) -> Result<()> {
    let entries = manager.spool().list().await.context("reading spool")?;
    if entries.is_empty() {
        log::info!("Spool is empty");
    }
    for entry in entries {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            entry.id,
            entry.created_at.format(&Rfc3339).unwrap_or_default(),
            entry.priority.as_deref().unwrap_or("-"),
            entry.message.recipients.join(","),
            entry.message.subject,
        );
    }
    Ok(())
}

async fn list_bounces(manager: &FileSpool) -> Result<()> {
    let bounces = manager.bounces().list().await.context("reading bounce store")?;
    if bounces.is_empty() {
        log::info!("No bounced messages");
    }
    for bounce in bounces {
        println!(
            "{}\t{}\t{}\t{}",
            bounce.id,
            bounce.failed_at.format(&Rfc3339).unwrap_or_default(),
            bounce.entry.message.subject,
            bounce.diagnostic,
        );
    }
    Ok(())
}

async fn watch(settings: &MailSettings, manager: Arc<FileSpool>) -> Result<()> {
    let mut scheduler = SpoolScheduler::new().await.context("creating scheduler")?;
    scheduler
        .every(settings.spool_interval(), manager, Arc::new(LogHooks))
        .await
        .context("scheduling spool cycle")?;
    scheduler.start().await.context("starting scheduler")?;
    log::info!(
        "Watching {} every {:?}; Ctrl+C to stop",
        settings.spool_directory.display(),
        settings.spool_interval()
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    scheduler.shutdown().await.context("stopping scheduler")?;
    Ok(())
}
