//! # assetflow
//!
//! The main binary for the assetflow asset graph.
//!
//! ## Usage
//!
//! ```bash
//! # List assets by level
//! assetflow --config assetflow.toml graph
//!
//! # Evaluate a tick against a status file
//! assetflow tick --status status.json
//!
//! # Inspect stored state
//! assetflow state --asset warehouse/orders
//! ```

use assetflow::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ASSETFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ASSETFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "assetflow=info,assetflow_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  assetflow v{}
  asset graph and declarative automation
"#,
        env!("CARGO_PKG_VERSION")
    );
}
