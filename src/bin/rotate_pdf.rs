use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use failure::Error;
use tracing::info;

use media_chores::pdf::{self, Direction};
use media_chores::paths;

/// Rotates pages in a PDF.
#[derive(Parser)]
#[command(name = "rotate-pdf", version)]
struct Cli {
    /// Path to the file to be rotated.
    file: PathBuf,
    /// Destination path for output file.
    dest: PathBuf,
    /// Direction to rotate the pages.
    #[arg(long, alias = "dir", value_enum, default_value_t = Direction::Cw)]
    direction: Direction,
    /// Angle to rotate the pages, in degrees. Must be a multiple of 90.
    #[arg(long, default_value_t = 90, allow_negative_numbers = true)]
    angle: i64,
    /// More logging, repeat for even more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> Result<(), Error> {
    let degrees = pdf::rotation(cli.direction, cli.angle)?;
    let input = paths::check_input_path(&cli.file)?;
    let mut doc = pdf::load(input)?;
    let dest = paths::ensure_output_parent(&cli.dest)?;

    pdf::rotate_pages(&mut doc, degrees)?;
    pdf::save(&mut doc, dest)?;

    info!(
        "rotated {} page(s) by {} degrees into {}",
        pdf::page_count(&doc),
        degrees,
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
