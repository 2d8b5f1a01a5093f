use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "apsrc")]
#[command(about = "Unpack canvas app archives into diffable source trees and pack them back, losslessly")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the canonical checksum of an archive
    Checksum(ChecksumArgs),

    /// Unpack an archive into a source tree
    Unpack(UnpackArgs),

    /// Pack a source tree into an archive
    Pack(PackArgs),

    /// Initialize an appsource.toml config file
    Init(InitArgs),
}

#[derive(Debug, Parser)]
pub struct ChecksumArgs {
    /// Archive to hash
    pub archive: PathBuf,

    /// List the digest of every entry
    #[arg(long)]
    pub per_file: bool,

    /// Dump the normalized token stream of each entry instead of digests
    #[arg(long, conflicts_with = "per_file")]
    pub debug: bool,
}

#[derive(Debug, Parser)]
pub struct UnpackArgs {
    /// Archive to unpack
    pub archive: PathBuf,

    /// Output directory for the source tree
    #[arg(short, long)]
    pub output: PathBuf,

    /// Replace an existing source tree in the output directory
    #[arg(long)]
    pub overwrite: bool,

    /// Skip re-parsing emitted source files
    #[arg(long)]
    pub no_validate: bool,
}

#[derive(Debug, Parser)]
pub struct PackArgs {
    /// Source tree to pack
    pub source: PathBuf,

    /// Archive to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Skip comparing against the stored checksum
    #[arg(long)]
    pub no_verify: bool,

    /// Exit with an error if the packed archive differs from the stored checksum
    #[arg(long, conflicts_with = "no_verify")]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}
