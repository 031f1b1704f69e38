use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "photo-canon")]
#[command(about = "Deduplicate Takeout exports into a content-addressed store", long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of ./Config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run label, overriding the configured one
    #[arg(long, global = true)]
    pub run_label: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan, hash and resolve all accounts, then write the run manifest
    Plan,
    /// Copy the manifest's unique items into the store
    Materialize,
    /// Merge metadata for every stored item into its sidecar
    Sidecars,
    /// Plan, materialize and write sidecars in one go
    Run,
    /// Write the by-hash inventory of the store
    Inventory,
    /// List junk and leftover partial files in the store
    CheckStore,
    /// Re-hash every stored item and compare against its name
    VerifyStore,
    /// Print configuration values
    PrintConfig,
}

impl Commands {
    /// The subcommand as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Plan => "plan",
            Commands::Materialize => "materialize",
            Commands::Sidecars => "sidecars",
            Commands::Run => "run",
            Commands::Inventory => "inventory",
            Commands::CheckStore => "check-store",
            Commands::VerifyStore => "verify-store",
            Commands::PrintConfig => "print-config",
        }
    }
}
