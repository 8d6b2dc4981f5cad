use anyhow::Result;
use clap::{Parser, Subcommand};
use dispatchd_core::config::LogFormat;
use dispatchd_core::{Config, SqliteJobStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "dispatchd", about = "Multi-tenant inference dispatch service", version)]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(short = 'H', long, help = "Bind address, overrides the config file")]
        host: Option<String>,

        #[arg(short, long, help = "Bind port, overrides the config file")]
        port: Option<u16>,
    },

    /// Create the job store's schema if it does not exist yet
    InitStore,

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    init_tracing(cli.verbose, config.logging.format);

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("starting dispatchd v{}", env!("CARGO_PKG_VERSION"));
            dispatchd_api::run(config).await?;
        }
        Commands::InitStore => {
            info!(path = %config.store.path, "initializing job store");
            SqliteJobStore::connect(&config.store.path).await?;
            info!("job store schema is up to date");
        }
        Commands::PrintConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let directive = if verbose { "dispatchd=debug,tower_http=debug,sqlx=warn" } else { "dispatchd=info,tower_http=warn,sqlx=warn" };
    let subscriber = tracing_subscriber::fmt().with_env_filter(directive).with_target(false);

    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
