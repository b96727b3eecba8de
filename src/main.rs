use std::process;

use clap::Parser;
use project_modernizr::cli::EXIT_PARTIAL;
use project_modernizr::Cli;

#[tokio::main]
async fn main() {
    // Debug logs go to stderr so they never mix with progress output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.execute().await {
        Ok(report) if !report.is_complete() => process::exit(EXIT_PARTIAL),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");

            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {cause}");
            }

            process::exit(1);
        }
    }
}
