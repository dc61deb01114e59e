use std::path::PathBuf;

use clap::Parser;
use context_font::{load, ContextError, SaveOptions};

/// Load a .babelfont package and write it back out
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Package to read
    input: PathBuf,

    /// Package to write; defaults to rewriting the input in place
    output: Option<PathBuf>,

    /// Rewrite every file, not just the ones that are missing
    #[arg(long)]
    full: bool,

    /// Leave layer files of removed glyphs in place
    #[arg(long)]
    no_prune: bool,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity,
}

fn run(args: &Args) -> Result<(), ContextError> {
    log::info!("Loading {}", args.input.display());
    let font = load(&args.input)?;
    log::info!("Loaded {} glyphs", font.glyphs().len());

    let elsewhere = args.output.as_ref().is_some_and(|o| o != &args.input);
    if !args.full && !elsewhere {
        // Writing in place only needs what has changed, which is nothing yet
        font.initialize_dirty_tracking();
    }
    let options = SaveOptions {
        full: args.full || elsewhere,
        prune: !args.no_prune,
    };
    let output = args.output.as_deref();
    let report = font.save(output, &options)?;
    for path in &report.written {
        log::info!("Wrote {}", path.display());
    }
    for path in &report.pruned {
        log::info!("Removed {}", path.display());
    }
    log::info!(
        "{} files written, {} unchanged",
        report.written.len(),
        report.skipped
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbosity.into())
        .init();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
