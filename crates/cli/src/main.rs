use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "groupbridge")]
#[command(about = "Relay chat-group messages to a webhook and send messages back", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the config file (if missing) and the session directory.
    Init {
        /// Config file path (default: GROUPBRIDGE_CONFIG_PATH or ~/.groupbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bridge: connect to the session sidecar, relay group messages, serve /qr and /send.
    Gateway {
        /// Config file path (default: GROUPBRIDGE_CONFIG_PATH or ~/.groupbridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT env, config, or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("groupbridge {}", env!("CARGO_PKG_VERSION"));
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
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let session_dir = lib::config::resolve_session_dir(&config);
    let dir = lib::init::init_config_dir(&path, &session_dir)?;
    println!("initialized configuration at {}", dir.display());
    println!("session directory: {}", session_dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (config, _path) = lib::config::load_config(config_path)?;
    let settings = lib::config::Settings::resolve(&config, port)?;
    log::info!("starting gateway on {}:{}", settings.bind, settings.port);
    lib::gateway::run_gateway(settings).await
}
