//! metasync command-line front-end.
//!
//! Exports and imports migration bundles, previews migration plans and
//! inspects the backing database of a registered task.

mod commands;
mod config;
mod formatter;

use clap::Parser;

use config::Args;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metasync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match commands::run(args) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
