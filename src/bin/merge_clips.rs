use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use failure::Error;
use tracing::warn;

use media_chores::awake::KeepAwake;
use media_chores::command::{self, SystemTranscoder, TranscodeSettings};
use media_chores::fragment::{self, FragmentError, FragmentPattern, SequenceId};
use media_chores::merge::{MergeReport, Merger};
use media_chores::paths;
use media_chores::plan::{MergePlan, Selection};
use media_chores::probe::Probe;

/// Merges action camera clips that were split into fragments.
///
/// Fragments are named <prefix><order:2><sequence:4>.<ext>, e.g.
/// GX010533.mp4 is the first fragment of recording 0533.
#[derive(Parser)]
#[command(name = "merge-clips", version)]
struct Cli {
    /// Directory containing clips.
    dir: PathBuf,
    /// Destination for merged clips [default: DIR]
    #[arg(long)]
    dest: Option<PathBuf>,
    /// Delete fragments after they were merged.
    #[arg(long, alias = "delete_merged")]
    delete_merged: bool,
    /// Print the transcoder commands and deletions instead of running them.
    #[arg(long)]
    dry_run: bool,
    /// Only merge these recordings, e.g. 0533 12.
    #[arg(long, num_args = 1.., value_name = "ID", value_parser = parse_sequence_id)]
    sequence_ids: Vec<SequenceId>,
    /// Two character file name prefix of the fragments.
    #[arg(long, default_value = "GX")]
    prefix: String,
    /// File extension of the fragments, matched case-insensitively.
    #[arg(long, default_value = "mp4")]
    extension: String,
    /// Video codec for the merged file; `copy` joins without re-encoding.
    #[arg(long, default_value = "copy")]
    codec: String,
    /// Threads to use for ffmpeg when re-encoding.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    threads: u16,
    /// Replace merged files that already exist.
    #[arg(long)]
    overwrite: bool,
    /// Do not compare the merged duration against the fragments.
    #[arg(long)]
    no_verify: bool,
    /// Let the machine idle to sleep while merging.
    #[arg(long)]
    allow_sleep: bool,
    /// ffmpeg executable.
    #[arg(long, env = "FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,
    /// ffprobe executable, used to verify merged files.
    #[arg(long, env = "FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,
    /// More logging, repeat for even more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_sequence_id(s: &str) -> Result<SequenceId, String> {
    s.parse().map_err(|e: FragmentError| e.to_string())
}

#[cfg(not(feature = "libav"))]
fn prober(cli: &Cli) -> Result<Box<dyn Probe>, Error> {
    use media_chores::probe::Ffprobe;

    let program = command::resolve_program(cli.ffprobe.as_os_str())?;
    Ok(Box::new(Ffprobe::new(program)))
}

#[cfg(feature = "libav")]
fn prober(_cli: &Cli) -> Result<Box<dyn Probe>, Error> {
    Ok(Box::new(media_chores::probe::Libav))
}

fn run(cli: &Cli) -> Result<MergeReport, Error> {
    let dir = paths::check_input_dir(&cli.dir)?;
    let pattern = FragmentPattern::new(&cli.prefix, &cli.extension)?;
    let fragments = fragment::scan_dir(dir, &pattern)?;
    let groups = fragment::group_fragments(fragments)?;

    let ffmpeg = match command::resolve_program(cli.ffmpeg.as_os_str()) {
        Ok(program) => program,
        Err(e) if cli.dry_run => {
            warn!("{}", e);
            cli.ffmpeg.clone()
        }
        Err(e) => return Err(e.into()),
    };
    let probe = if cli.dry_run || cli.no_verify {
        None
    } else {
        Some(prober(cli)?)
    };

    // Nothing is created on disk until every program is known to exist.
    let dest: &Path = cli.dest.as_deref().unwrap_or(dir);
    if !cli.dry_run {
        paths::ensure_output_dir(dest)?;
    }

    let selection = if cli.sequence_ids.is_empty() {
        Selection::All
    } else {
        Selection::only(cli.sequence_ids.iter().copied())
    };
    let plan = MergePlan::new(groups, &selection, dest, &pattern);

    let settings = TranscodeSettings {
        codec: cli.codec.clone(),
        threads: usize::from(cli.threads),
        overwrite: cli.overwrite,
    };
    let mut merger = Merger::new(ffmpeg, &SystemTranscoder)
        .settings(settings)
        .dry_run(cli.dry_run)
        .delete_merged(cli.delete_merged);
    if let Some(probe) = probe.as_deref() {
        merger = merger.probe(probe);
    }

    let _awake = if cli.dry_run || cli.allow_sleep {
        KeepAwake::disabled()
    } else {
        KeepAwake::acquire("merging clips")
    };

    let stdout = io::stdout();
    let report = merger.run(&plan, &mut stdout.lock())?;
    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    media_chores::init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) => {
            println!("{}", report);
            println!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            media_chores::report_error(&e);
            ExitCode::FAILURE
        }
    }
}
