//! A tour of kairo: routing, binding, validation, forms and uploads,
//! cookies, middleware, request extensions, static files, error pages and
//! cancellable background work.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example tour
//!
//! Try:
//!   curl localhost:1323/hello
//!   curl 'localhost:1323/show?team=x-men&member=wolverine'
//!   curl -X POST localhost:1323/users -H 'content-type: application/json' \
//!        -d '{"name":"Joe","email":"joe@example.com"}'
//!   curl -X POST localhost:1323/validate-users -H 'content-type: application/json' \
//!        -d '{"name":"Joe","email":"not-an-email"}'
//!   curl -F name=Joe -F avatar=@avatar.png localhost:1323/save
//!   curl 'localhost:1323/api/search?ids=1,2&ids=3&active=true'
//!   curl 'localhost:1323/parallel_context?delay_ms=200'
//!   curl 'localhost:1323/timestamp?timestamp=2026-10-18T09:15:00Z'
//!   curl -c jar localhost:1323/write_cookie && curl -b jar localhost:1323/read_cookie
//!   curl -u joe:secret localhost:1323/admin

mod app;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use kairo::{Config, DEFAULT_MAX_BODY_SIZE, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::Settings;

#[derive(Parser, Debug)]
#[command(about = "kairo feature tour")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "KAIRO_ADDR", default_value = "0.0.0.0:1323")]
    addr: String,

    /// Cancel each request's token after this many milliseconds.
    #[arg(long, env = "KAIRO_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "KAIRO_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,

    /// Directory served under /static.
    #[arg(long, env = "KAIRO_ASSETS", default_value = "assets")]
    assets: PathBuf,

    /// File served at /.
    #[arg(long, env = "KAIRO_INDEX", default_value = "public/index.html")]
    index: PathBuf,

    /// Where /save stores uploaded avatars.
    #[arg(long, env = "KAIRO_UPLOADS", default_value = "uploads")]
    uploads: PathBuf,

    /// Directory holding `{code}.html` error pages.
    #[arg(long, env = "KAIRO_ERROR_PAGES", default_value = "public")]
    error_pages: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kairo=info,tour=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::new(args.addr).max_body_size(args.max_body_size);
    if let Some(ms) = args.request_timeout_ms {
        config = config.request_timeout(Duration::from_millis(ms));
    }

    tokio::fs::create_dir_all(&args.uploads).await?;
    let settings = Settings {
        assets: args.assets,
        index: args.index,
        uploads: args.uploads,
        error_pages: args.error_pages,
    };

    Server::new(config).serve(app::app(&settings)).await?;
    Ok(())
}
