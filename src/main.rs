//! tgsend - upload a file to Telegram and send it as a message
//!
//! Usage:
//!   tgsend --api-id <id> --api-hash <hash> --phone <phone> --file <path>
//!   tgsend --url <url> --target @channel      (credentials from config.yaml)

use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tgsend::{
    auth::TerminalResponder,
    config::{Settings, TransferRequest},
    error::{Error, Result, Stage, TransferError},
    session::{FileSessionStore, PhoneIdentity, Session, SessionStore},
    source::SourceFile,
    transfer::{Delivery, Orchestrator},
    transport::{is_self_target, Transport},
    upload::{LogSink, ProgressBarSink, ProgressSink},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tgsend")]
#[command(author = "tgsend Contributors")]
#[command(version)]
#[command(about = "Upload a file to Telegram and send it as a message")]
struct Cli {
    /// Telegram API ID (from my.telegram.org)
    #[arg(long)]
    api_id: Option<i32>,

    /// Telegram API hash
    #[arg(long)]
    api_hash: Option<String>,

    /// Phone number in international format
    #[arg(long)]
    phone: Option<String>,

    /// Path to the file to upload
    #[arg(long, conflicts_with = "url")]
    file: Option<PathBuf>,

    /// URL of the file to download and upload
    #[arg(long)]
    url: Option<String>,

    /// Target username or chat ID ("me" for Saved Messages)
    #[arg(long)]
    target: Option<String>,

    /// Message caption (default: "Uploaded file: <name>")
    #[arg(long)]
    caption: Option<String>,

    /// Upload part size in KiB
    #[arg(long)]
    part_size_kib: Option<usize>,

    /// Directory for session files
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Configuration file (default: ./config.yaml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log progress instead of drawing a progress bar
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            phone: self.phone.clone(),
            file: self.file.clone(),
            url: self.url.clone(),
            target: self.target.clone(),
            caption: self.caption.clone(),
            part_size_kib: self.part_size_kib,
            session_dir: self.session_dir.as_deref().map(expand_tilde),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(delivery) => {
            debug!("Transfer id {}", delivery.confirmation.transfer_id);
        }
        Err(e) if e.is_undelivered() => {
            error!("Error: {}", e);
            error!("The file was uploaded but no message was sent; run again to retry");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> std::result::Result<Delivery, TransferError> {
    let setup = |e: Error| TransferError::new(Stage::Setup, e);

    let config_path = cli.config.as_deref().map(expand_tilde);
    let file_settings = Settings::discover(config_path.as_deref()).map_err(setup)?;
    let env_settings = Settings::from_env().map_err(setup)?;
    let request = cli
        .settings()
        .or(env_settings)
        .or(file_settings)
        .into_request()
        .map_err(setup)?;

    let cancel = install_signal_handler();
    let download_sink = progress_sink("Downloading", cli.no_progress);
    let source = SourceFile::resolve(&request.source, download_sink, &cancel)
        .await
        .map_err(|e| TransferError::new(Stage::Source, e))?;
    info!(
        "Preparing to upload file: {} ({:.2} MB)",
        source.name(),
        source.size() as f64 / (1024.0 * 1024.0)
    );

    let store = FileSessionStore::new(&request.session_dir);
    let identity = PhoneIdentity::from_phone(&request.phone).map_err(setup)?;
    let session = store.load(&identity).map_err(setup)?;
    let transport = connect_transport(&request, session).await.map_err(setup)?;

    let responder = TerminalResponder::new();
    let mut orchestrator = Orchestrator::new(&*transport, &store, &responder)
        .with_sink(progress_sink("Uploading", cli.no_progress));
    let delivery = orchestrator.run(&request, &source, &cancel).await?;

    if is_self_target(&request.target) {
        println!("File successfully sent to Saved Messages!");
        println!("Open your Telegram app and check your Saved Messages to access the file.");
    } else {
        println!("File successfully sent to {}!", request.target);
    }
    Ok(delivery)
}

fn progress_sink(label: &'static str, no_progress: bool) -> Arc<dyn ProgressSink> {
    if no_progress || !std::io::stderr().is_terminal() {
        Arc::new(LogSink)
    } else {
        Arc::new(ProgressBarSink::new(label))
    }
}

#[cfg(feature = "grammers")]
async fn connect_transport(
    request: &TransferRequest,
    session: Option<Session>,
) -> Result<Box<dyn Transport>> {
    let transport =
        tgsend::transport::GrammersTransport::connect(request.api_id, &request.api_hash, session)
            .await?;
    Ok(Box::new(transport))
}

#[cfg(not(feature = "grammers"))]
async fn connect_transport(
    _request: &TransferRequest,
    _session: Option<Session>,
) -> Result<Box<dyn Transport>> {
    Err(Error::Config(
        "tgsend was built without a Telegram backend; rebuild with `--features grammers`"
            .to_string(),
    ))
}

/// Cancel the returned token on SIGINT or SIGTERM
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received interrupt, cancelling transfer"),
                        _ = sigterm.recv() => info!("Received SIGTERM, cancelling transfer"),
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received interrupt, cancelling transfer");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt, cancelling transfer");
        }

        cancel.cancel();
    });

    token
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
