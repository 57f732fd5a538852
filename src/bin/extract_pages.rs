use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use failure::Error;
use tracing::info;

use media_chores::{paths, pdf, range};

/// Extracts pages from a PDF into a new PDF.
#[derive(Parser)]
#[command(name = "extract-pages", version)]
struct Cli {
    /// PDF file to process.
    file: PathBuf,
    /// Output file path/name.
    dest: PathBuf,
    /// Pages to extract (inclusive), in output order. Example: 1 4-6 8
    #[arg(required = true, value_name = "PAGES")]
    pages: Vec<String>,
    /// More logging, repeat for even more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> Result<(), Error> {
    let input = paths::check_input_path(&cli.file)?;
    let mut doc = pdf::load(input)?;
    let total = pdf::page_count(&doc);
    let selected = range::parse_ranges(&cli.pages, total)?;

    let dest = paths::ensure_output_parent(&cli.dest)?;
    pdf::extract_pages(&mut doc, &selected)?;
    pdf::save(&mut doc, dest)?;

    info!(
        "extracted {} of {} page(s) to {}",
        selected.len(),
        total,
        dest.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    media_chores::init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => {
            println!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            media_chores::report_error(&e);
            ExitCode::FAILURE
        }
    }
}
