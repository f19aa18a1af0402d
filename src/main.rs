//! fb2speech - FB2 to audiobook

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fb2speech::{
    BookProject, PrepareOptions, Result, Settings, SpeechKit, SynthesisDriver, concatenator_for,
};

#[derive(Parser)]
#[command(name = "fb2speech")]
#[command(version, about = "Turn an FB2 ebook into an audiobook", long_about = None)]
#[command(after_help = "EXAMPLES:
    fb2speech book.fb2                   Compile and voice into ./book/
    fb2speech book.fb2 --compile-only    Only write book/book.json
    fb2speech book.fb2 --export-images   Also save book images")]
struct Cli {
    /// FB2 book to voice
    #[arg(value_name = "BOOK")]
    book: PathBuf,

    /// Output directory (default: the book path without its extension)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Settings file (default: ./settings.json if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Compile fragments to book.json without synthesizing
    #[arg(long)]
    compile_only: bool,

    /// Ignore an existing book.json
    #[arg(long)]
    recompile: bool,

    /// Write images from the book to the images/ directory
    #[arg(long)]
    export_images: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    let project = match &cli.output {
        Some(dir) => BookProject::new(dir),
        None => BookProject::for_book(&cli.book),
    };

    let options = PrepareOptions {
        recompile: cli.recompile,
        export_images: cli.export_images,
    };
    let fragments = project.prepare(&cli.book, &settings, options)?;
    if cli.compile_only {
        return Ok(());
    }

    let synthesizer = SpeechKit::from_settings(&settings)?;
    let concatenator = concatenator_for(settings.concat_tool);
    let driver = SynthesisDriver::new(&synthesizer, concatenator.as_ref(), &settings);
    let summary = driver.run(&fragments, project.root())?;

    info!(
        "Done: {} clips synthesized, {} skipped, {} sections assembled",
        summary.synthesized,
        summary.skipped,
        summary.sections.len()
    );
    Ok(())
}
