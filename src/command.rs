use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use failure::Fail;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

#[derive(Debug, Fail)]
pub enum CommandError {
    #[fail(display = "{:?} was not found on PATH", program)]
    ProgramNotFound { program: OsString },
    #[fail(display = "failed to start {:?}", program)]
    Spawn {
        program: PathBuf,
        #[cause]
        source: io::Error,
    },
    #[fail(display = "`{}` failed with exit code: {:?}", command, code)]
    ExternalProcessFailure { command: String, code: Option<i32> },
    #[fail(display = "failed to write concat list {:?}", path)]
    ConcatList {
        path: PathBuf,
        #[cause]
        source: io::Error,
    },
}

/// Looks the program up on PATH. An explicit path is accepted as is.
pub fn resolve_program(program: &OsStr) -> Result<PathBuf, CommandError> {
    which::which(program).map_err(|_| CommandError::ProgramNotFound {
        program: program.to_os_string(),
    })
}

/// How fragments are encoded when they are joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSettings {
    /// `copy` joins the streams without re-encoding.
    pub codec: String,
    pub threads: usize,
    pub overwrite: bool,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        TranscodeSettings {
            codec: "copy".to_string(),
            threads: 8,
            overwrite: false,
        }
    }
}

impl TranscodeSettings {
    pub fn is_stream_copy(&self) -> bool {
        self.codec == "copy"
    }
}

/// Fragment list next to the output: `0533_merged.concat.txt`.
pub fn concat_list_path(output: &Path) -> PathBuf {
    output.with_extension("concat.txt")
}

/// Input for ffmpeg's concat demuxer.
///
/// One line per fragment, in join order: `file '<absolute path>'`.
pub fn concat_list_contents<P: AsRef<Path>>(fragments: &[P]) -> String {
    fragments
        .iter()
        .map(|p| format!("file '{}'\n", p.as_ref().to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

/// Temporary fragment list, removed on drop even when ffmpeg failed.
///
/// The file is created exclusively: a file already sitting at `path` is an
/// error and is left untouched.
#[derive(Debug)]
pub struct ConcatList {
    file: NamedTempFile,
}

impl ConcatList {
    pub fn write<P: AsRef<Path>>(path: &Path, fragments: &[P]) -> Result<Self, CommandError> {
        let failed = |source| CommandError::ConcatList {
            path: path.to_path_buf(),
            source,
        };

        let absolute = fragments
            .iter()
            .map(|p| fs::canonicalize(p.as_ref()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(failed)?;

        let name = path
            .file_name()
            .ok_or_else(|| failed(io::Error::new(io::ErrorKind::InvalidInput, "no file name")))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = Builder::new()
            .prefix(name)
            .rand_bytes(0)
            .tempfile_in(dir)
            .map_err(failed)?;
        file.write_all(concat_list_contents(&absolute).as_bytes())
            .and_then(|()| file.flush())
            .map_err(failed)?;
        debug!("wrote {}", file.path().display());

        Ok(ConcatList { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// ffmpeg invocation that joins the listed fragments into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ConcatCommand {
    /// # Arguments
    /// * `program` - path to ffmpeg
    /// * `list` - fragment list (see [`concat_list_contents`])
    /// * `output` - where the merged file is written
    /// * `settings` - codec, threads, overwrite
    pub fn new(program: &Path, list: &Path, output: &Path, settings: &TranscodeSettings) -> Self {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |arg: &str| args.push(arg.into());

        push("-hide_banner");
        push("-loglevel");
        push("error");
        // -n: never replace an existing file
        push(if settings.overwrite { "-y" } else { "-n" });
        push("-f");
        push("concat");
        push("-safe");
        push("0");
        push("-i");
        args.push(list.as_os_str().to_os_string());

        let mut push = |arg: &str| args.push(arg.into());
        if settings.is_stream_copy() {
            push("-c");
            push("copy");
        } else {
            push("-c:v");
            push(&settings.codec);
            push("-c:a");
            push("copy");
            push("-threads");
            push(&settings.threads.to_string());
        }
        args.push(output.as_os_str().to_os_string());

        ConcatCommand {
            program: program.to_path_buf(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Command line in a form that can be pasted into a shell.
impl fmt::Display for ConcatCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(self.program.as_os_str()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(arg: &OsStr) -> String {
    let arg = arg.to_string_lossy();
    let safe = |c: char| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c);
    if !arg.is_empty() && arg.chars().all(safe) {
        arg.into_owned()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// External process that performs the join.
pub trait Transcoder {
    fn run(&self, command: &ConcatCommand) -> Result<(), CommandError>;
}

/// Runs the system ffmpeg synchronously.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTranscoder;

impl Transcoder for SystemTranscoder {
    fn run(&self, command: &ConcatCommand) -> Result<(), CommandError> {
        debug!("running {}", command);
        let status = command
            .to_command()
            .status()
            .map_err(|source| CommandError::Spawn {
                program: command.program().to_path_buf(),
                source,
            })?;

        if !status.success() {
            return Err(CommandError::ExternalProcessFailure {
                command: command.to_string(),
                code: status.code(),
            });
        }

        Ok(())
    }
}
