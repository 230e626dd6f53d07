//! Grocer CLI - cart inspection and management against the live backend.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart for the token in GROCER_API_TOKEN
//! grocer cart list
//!
//! # Add one unit of product 5
//! grocer cart add 5
//!
//! # Decrease product 5 by one (removes the line at zero)
//! grocer cart update 5 -1
//!
//! # Remove product 5 / empty the cart
//! grocer cart remove 5
//! grocer cart clear
//! ```
//!
//! # Commands
//!
//! - `cart` - Load, add, update, remove, clear

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grocer")]
#[command(author, version, about = "Grocer cart CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and modify the authenticated user's cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show every line and the totals
    List,
    /// Add one unit of a product
    Add {
        /// Catalog product id
        product_id: String,
    },
    /// Change a line's quantity by a signed delta
    Update {
        /// Catalog product id
        product_id: String,

        /// Amount to add (negative to subtract)
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Remove a line
    Remove {
        /// Catalog product id
        product_id: String,
    },
    /// Remove every line
    Clear,
}

/// Initialize Sentry error tracking if `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    let sentry_guard = init_sentry();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grocer_cli=info,grocer_cart=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if sentry_guard.is_some() {
        tracing::debug!("Sentry initialized");
    }

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list().await?,
            CartAction::Add { product_id } => commands::cart::add(&product_id).await?,
            CartAction::Update { product_id, delta } => {
                commands::cart::update(&product_id, delta).await?;
            }
            CartAction::Remove { product_id } => commands::cart::remove(&product_id).await?,
            CartAction::Clear => commands::cart::clear().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_update_accepts_negative_delta() {
        let cli = Cli::try_parse_from(["grocer", "cart", "update", "5", "-1"]).expect("parses");
        let Commands::Cart {
            action: CartAction::Update { product_id, delta },
        } = cli.command
        else {
            panic!("expected cart update");
        };
        assert_eq!(product_id, "5");
        assert_eq!(delta, -1);
    }
}
