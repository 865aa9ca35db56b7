use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};
use sms_relay::configuration::config::Config;
use sms_relay::controller::Controller;
use sms_relay::data_capture::types::{CaptureEvent, MessagePart};
use sms_relay::error_handling::types::ControllerError;
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "sms-relay")]
#[command(version = "0.1.0")]
#[command(about = "Captures incoming messages and relays them to a listener, buffering durably while none is attached")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "SMS_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend override: file or database
    #[arg(short, long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture one message with no session running (fallback path only)
    Receive {
        #[arg(short, long)]
        sender: String,
        /// Message part, repeat for multipart messages
        #[arg(short, long = "part", required = true)]
        parts: Vec<String>,
    },
    /// Deliver everything buffered to stdout as JSON lines
    Drain,
    /// Listen for tab-separated events on stdin and relay them to stdout
    Listen {
        /// Grant capture permission before starting
        #[arg(long)]
        grant: bool,
    },
}

fn load_config(args: &Args) -> Result<Config, ControllerError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            info!("No configuration file given, using defaults");
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    if let Some(backend) = &args.backend {
        config.set_backend(backend)?;
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<(), ControllerError> {
    let config = load_config(&args)?;
    info!("Configuration loaded");
    let controller = Controller::new(config)?;

    match args.command {
        Command::Receive { sender, parts } => {
            let event = CaptureEvent::new(
                parts
                    .into_iter()
                    .map(|part| MessagePart::new(sender.clone(), part))
                    .collect(),
            );
            let buffered = controller.receive(&event)?;
            info!("{} message(s) now in durable buffer", buffered);
        }
        Command::Drain => {
            let delivered = controller.drain(&mut tokio::io::stdout()).await?;
            info!("{} message(s) delivered", delivered);
        }
        Command::Listen { grant } => {
            let input = BufReader::new(tokio::io::stdin());
            let delivered = controller
                .listen(input, &mut tokio::io::stdout(), grant)
                .await?;
            info!("{} message(s) delivered", delivered);
        }
    }
    controller.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("sms-relay failed: {}", e);
        std::process::exit(1);
    }
}
