use clap::Parser;
use tracing_subscriber::EnvFilter;

use cloudsmith_cli::error::Error;
use cloudsmith_cli::Cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cloudsmith_cli::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            let code = e
                .downcast_ref::<Error>()
                .map(Error::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
