mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective, LogFormat, LoggingConfig};

mod cmd;

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over [logging] level.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => match Effective::new(&args) {
            Ok(eff) => {
                init_tracing(&eff.logging);
                cmd::serve::run(eff).await
            }
            Err(e) => Err(e),
        },
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
