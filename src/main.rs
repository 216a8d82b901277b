//! Expose a syntax highlighter to a host process.
#![forbid(unsafe_code)]

mod batch;
mod bridge;
mod cache;
mod engine;
mod error;
mod highlighter;
mod hlopt;
mod lifecycle;
mod listing;
mod oneshot;
mod request;
mod settings;
mod syntax_hl;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;

/// Main program: Set up env and run according to arguments.
fn main() -> Result<()> {
    match dotenv() {
        Ok(_) => (),
        Err(ref err) if err.not_found() => (),
        Err(e) => return Err(e).context("Failed to read .env"),
    }
    // Stdout is for markup and the bridge protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").as_deref().unwrap_or("info"),
        )
        .with_writer(std::io::stderr)
        .init();

    HlBridge::parse().run()
}

/// Syntax highlighting for a host process
#[derive(Parser)]
#[clap(about, author, version)]
enum HlBridge {
    /// Highlight a file (or stdin)
    Highlight(oneshot::Args),
    /// Highlight a json map of requests
    Batch(oneshot::BatchArgs),
    /// List supported languages
    Languages(listing::Args),
    /// List supported themes
    Themes(listing::Args),
    /// Print the stylesheet for class-based output in a theme
    Css(listing::CssArgs),
    /// Serve the named entry points as json lines on stdin/stdout
    Bridge(bridge::Args),
    /// Fill theme options of a settings yaml file
    GenSettings(settings::Args),
}

impl HlBridge {
    fn run(self) -> Result<()> {
        match self {
            HlBridge::Highlight(args) => run_async(args.run()),
            HlBridge::Batch(args) => run_async(args.run()),
            HlBridge::Languages(args) => run_async(args.languages()),
            HlBridge::Themes(args) => run_async(args.themes()),
            HlBridge::Css(args) => run_async(args.run()),
            HlBridge::Bridge(args) => run_async(args.run()),
            HlBridge::GenSettings(args) => args.run(),
        }
    }
}

fn run_async<F>(work: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .build()?
        .block_on(work)
}
