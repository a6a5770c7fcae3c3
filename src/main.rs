use clap::Parser;
use sensorpath::{config, server};

/// Sensorpath - sensor/observation resources over OGC-style paths
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP server host address
    #[arg(long, default_value = "0.0.0.0")]
    http_host: String,

    /// HTTP server port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Path to a YAML model declaration (built-in sensor model by default)
    #[arg(long)]
    model: Option<String>,

    /// Identifier representation: long, text or uuid
    #[arg(long, default_value = "long")]
    id_type: String,

    /// Skip the deterministic id sort appended for stable pagination
    #[arg(long)]
    unstable_order: bool,

    /// Default $top when a request does not specify one
    #[arg(long, default_value_t = 100)]
    default_top: i64,

    /// Hard ceiling on $top
    #[arg(long, default_value_t = 1000)]
    max_top: i64,
}

impl From<Cli> for config::CliConfig {
    fn from(cli: Cli) -> Self {
        config::CliConfig {
            http_host: cli.http_host,
            http_port: cli.http_port,
            model_path: cli.model,
            id_type: cli.id_type,
            unstable_order: cli.unstable_order,
            default_top: cli.default_top,
            max_top: cli.max_top,
        }
    }
}

#[tokio::main]
async fn main() {
    // Default to INFO; override with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    println!("\nSensorpath v{}\n", env!("CARGO_PKG_VERSION"));

    let cli_config: config::CliConfig = cli.into();
    let config = match config::ServerConfig::from_cli(cli_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    server::run_with_config(config, None).await;
}
