//! Command runners behind the `apsrc` subcommands.
//!
//! The library returns typed [`SourceError`](crate::error::SourceError)s;
//! here they are wrapped with `anyhow` context for the terminal.

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use crate::archive::MemoryArchive;
use crate::checksum::{ChecksumEngine, ChecksumMismatchWarning, DebugTextHasher};
use crate::cli::{AppContext, ChecksumArgs, PackArgs, UnpackArgs};
use crate::infra::config::load_config;
use crate::source_tree;

fn tick(ctx: &AppContext) -> String {
    if ctx.no_color {
        "✓".to_string()
    } else {
        "✓".green().to_string()
    }
}

fn heading(ctx: &AppContext, text: &str) -> String {
    if ctx.no_color {
        text.to_string()
    } else {
        text.yellow().to_string()
    }
}

fn print_warnings(ctx: &AppContext, warnings: &[ChecksumMismatchWarning]) {
    if ctx.quiet || warnings.is_empty() {
        return;
    }
    eprintln!("{}", heading(ctx, "Checksum differences:"));
    for w in warnings {
        eprintln!("  {w}");
    }
}

pub fn checksum_run(args: ChecksumArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config().unwrap_or_default();
    let archive = MemoryArchive::read_zip(&args.archive)
        .with_context(|| format!("Failed to read archive {}", args.archive.display()))?;
    let engine = ChecksumEngine::new(config.checksum);

    if args.debug {
        for entry in archive.iter().filter(|e| !engine.is_artifact(&e.path)) {
            let dump = engine
                .entry_digest::<DebugTextHasher>(&entry.path, &entry.bytes)
                .with_context(|| format!("Failed to hash {}", entry.path))?;
            println!("{}", heading(ctx, &format!("== {} ==", entry.path)));
            println!("{}", String::from_utf8_lossy(&dump));
        }
        return Ok(());
    }

    let checksum = engine.archive_checksum(archive.to_pairs())?;
    println!("{}", checksum.render());
    if args.per_file {
        for (path, digest) in checksum.per_entry() {
            println!("{digest}  {path}");
        }
    }
    Ok(())
}

pub fn unpack_run(args: UnpackArgs, ctx: &AppContext) -> Result<()> {
    let mut config = load_config().unwrap_or_default();
    if args.no_validate {
        config.source.validate_round_trip = false;
    }

    if ctx.dry_run {
        if !ctx.quiet {
            println!("{}", heading(ctx, "DRY RUN: Would unpack:"));
            println!("  Archive: {}", args.archive.display());
            println!("  Into: {}", args.output.display());
        }
        return Ok(());
    }

    let report = source_tree::unpack(&args.archive, &args.output, &config, args.overwrite)
        .with_context(|| format!("Failed to unpack {}", args.archive.display()))?;
    print_warnings(ctx, &report.warnings);

    if !ctx.quiet {
        println!(
            "{} Unpacked {} files into {} ({})",
            tick(ctx),
            report.files_written,
            args.output.display(),
            report.checksum.render()
        );
    }
    Ok(())
}

pub fn pack_run(args: PackArgs, ctx: &AppContext) -> Result<()> {
    let mut config = load_config().unwrap_or_default();
    if args.no_verify {
        config.source.verify_checksum = false;
    }

    let (archive, report) = source_tree::pack_to_archive(&args.source, &config)
        .with_context(|| format!("Failed to read source tree {}", args.source.display()))?;
    print_warnings(ctx, &report.warnings);
    if args.strict && !report.warnings.is_empty() {
        bail!(
            "Packed archive differs from the checksum stored in {}",
            args.source.display()
        );
    }

    if ctx.dry_run {
        if !ctx.quiet {
            println!("{}", heading(ctx, "DRY RUN: Would pack:"));
            println!("  Entries: {}", report.entries);
            println!("  Into: {}", args.output.display());
        }
        return Ok(());
    }

    archive
        .write_zip(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !ctx.quiet {
        println!(
            "{} Packed {} entries into {} ({})",
            tick(ctx),
            report.entries,
            args.output.display(),
            report.checksum.render()
        );
    }
    Ok(())
}
