//! # Shop Subcommand
//!
//! - `add`: register a distribution point.
//! - `list`: print all shops as JSON.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use ration_core::ShopCode;

use crate::{connect_engine, print_json};

/// Arguments for the `ration shop` subcommand.
#[derive(Args, Debug)]
pub struct ShopArgs {
    #[command(subcommand)]
    pub command: ShopCommand,
}

/// Shop subcommands.
#[derive(Subcommand, Debug)]
pub enum ShopCommand {
    /// Register a new shop.
    Add {
        /// Unique shop code (e.g., "FPS-001").
        #[arg(long)]
        code: String,
        /// Display name.
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        district: Option<String>,
    },

    /// List all shops.
    List,
}

/// Run a shop subcommand.
pub async fn run_shop(args: &ShopArgs, database_url: &str) -> Result<u8> {
    let engine = connect_engine(database_url).await?;
    match &args.command {
        ShopCommand::Add {
            code,
            name,
            address,
            district,
        } => {
            let code = ShopCode::new(code.as_str()).context("invalid shop code")?;
            let shop = engine
                .create_shop(code, name.clone(), address.clone(), district.clone())
                .await?;
            print_json(&shop)?;
        }
        ShopCommand::List => print_json(&engine.list_shops().await?)?,
    }
    Ok(0)
}
