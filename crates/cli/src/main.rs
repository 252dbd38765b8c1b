//! Dermosul CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! dermosul migrate
//!
//! # Ask Asaas about a payment and mark the order paid if it was
//! dermosul reconcile pedido-a1b2c3d4 --payment-id pay_123
//!
//! # Print a shareable product link
//! dermosul product-url --slug serum-vitamina-c
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `reconcile` - Reconcile an order with the payment gateway
//! - `product-url` - Build a product link with UTM parameters

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "dermosul")]
#[command(author, version, about = "Dermosul CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Check a payment with the gateway and mark the order paid if confirmed
    Reconcile {
        /// External reference of the order (e.g. `pedido-<id>`)
        reference: String,

        /// Gateway payment id, when known
        #[arg(short, long)]
        payment_id: Option<String>,
    },
    /// Build a shareable product URL
    ProductUrl {
        /// Product slug
        #[arg(short, long)]
        slug: Option<String>,

        /// Product id, used when no slug is given
        #[arg(short, long)]
        id: Option<String>,

        /// Explicit path, wins over slug and id
        #[arg(short, long)]
        path: Option<String>,

        /// Origin override (e.g. `https://dermosul.com.br`)
        #[arg(short, long)]
        base: Option<String>,

        /// Leave out the UTM parameters
        #[arg(long)]
        no_utm: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Reconcile {
            reference,
            payment_id,
        } => commands::reconcile::run(&reference, payment_id.as_deref()).await?,
        Commands::ProductUrl {
            slug,
            id,
            path,
            base,
            no_utm,
        } => commands::links::product_url(
            slug.as_deref(),
            id.as_deref(),
            path.as_deref(),
            base.as_deref(),
            !no_utm,
        )?,
    }
    Ok(())
}
