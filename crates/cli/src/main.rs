use clap::{Parser, Subcommand, ValueEnum};
use lib::config::CursorAdvance;
use lib::relay::{Backend, RelayClient, RelayOverrides, RelaySettings};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "iMessage relay and conversation gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway (HTTP backend the relay posts messages to).
    Gateway {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8001)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Watch the Messages database and relay new messages to the gateway (macOS only).
    Relay {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Backend endpoint URL (default: MURMUR_BRIDGE_ENDPOINT, config, or the local gateway)
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Seconds between polls (default: MURMUR_BRIDGE_POLL, config, or 1.5)
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<f64>,

        /// Bearer token for the backend (default: MURMUR_BRIDGE_TOKEN or config)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,

        /// How the cursor moves past a failed message
        #[arg(long, value_enum)]
        cursor_advance: Option<CursorAdvanceArg>,
    },

    /// Chat with the gateway from the terminal as one conversation (interactive).
    Chat {
        /// Config file path (default: MURMUR_CONFIG_PATH or ~/.murmur/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Conversation id to use.
        #[arg(long, value_name = "ID", default_value = "terminal")]
        conversation: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CursorAdvanceArg {
    LatestCompleted,
    InOrder,
}

impl From<CursorAdvanceArg> for CursorAdvance {
    fn from(arg: CursorAdvanceArg) -> Self {
        match arg {
            CursorAdvanceArg::LatestCompleted => CursorAdvance::LatestCompleted,
            CursorAdvanceArg::InOrder => CursorAdvance::InOrder,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("murmur {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Relay {
            config,
            server,
            poll_interval,
            token,
            cursor_advance,
        }) => {
            let overrides = RelayOverrides {
                server,
                poll_interval,
                token,
                cursor_advance: cursor_advance.map(Into::into),
            };
            if let Err(e) = run_relay(config, overrides).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            conversation,
        }) => {
            if let Err(e) = run_chat(config, conversation).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_relay(config_path: Option<PathBuf>, overrides: RelayOverrides) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let mut settings = RelaySettings::from_config(&config);
    settings.apply(overrides);
    lib::relay::run_relay(settings).await
}

async fn run_chat(config_path: Option<PathBuf>, conversation: String) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, _) = lib::config::load_config(config_path)?;
    let settings = RelaySettings::from_config(&config);
    let client = RelayClient::new(settings.endpoint, settings.token, lib::relay::DEFAULT_TIMEOUT)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        match client.relay(&conversation, input).await {
            Ok(reply) if reply.trim().is_empty() => println!("< (no reply)"),
            Ok(reply) => println!("< {}", reply.trim()),
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    Ok(())
}
