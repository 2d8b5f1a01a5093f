use anyhow::Result;
use clap::Parser;
use appsource::cli::{AppContext, Cli, Commands};

fn main() -> Result<()> {
    // RUST_LOG=appsource=debug for transform and checksum detail
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Checksum(args) => appsource::checksum_run(args, &ctx),
        Commands::Unpack(args) => appsource::unpack_run(args, &ctx),
        Commands::Pack(args) => appsource::pack_run(args, &ctx),
        Commands::Init(args) => appsource::infra::config::init(args, &ctx),
    }
}
