//! Post-merge verification.
//!
//! A zero exit from the transcoder is not enough to delete fragments: the
//! output has to exist, be non-empty and be about as long as its parts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use failure::Fail;
use tracing::debug;

#[derive(Debug, Fail)]
pub enum ProbeError {
    #[fail(display = "merged file {:?} was not written", path)]
    Missing {
        path: PathBuf,
        #[cause]
        source: io::Error,
    },
    #[fail(display = "merged file {:?} is empty", path)]
    Empty { path: PathBuf },
    #[fail(
        display = "merged file {:?} is {:.1}s long, fragments add up to {:.1}s",
        path, actual, expected
    )]
    TooShort { path: PathBuf, actual: f64, expected: f64 },
    #[fail(display = "failed to start {:?}", program)]
    Spawn {
        program: PathBuf,
        #[cause]
        source: io::Error,
    },
    #[fail(display = "could not read duration of {:?}: {}", path, reason)]
    Duration { path: PathBuf, reason: String },
}

pub trait Probe {
    /// Duration of the file in seconds.
    fn duration(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// Reads the container duration through the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: PathBuf,
}

impl Ffprobe {
    pub fn new(program: PathBuf) -> Self {
        Ffprobe { program }
    }
}

impl Probe for Ffprobe {
    fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.program)
            .arg("-loglevel")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("csv=print_section=0")
            .arg(path)
            .output()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Duration {
                path: path.to_path_buf(),
                reason: format!("{} ({})", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("ffprobe {}: {}", path.display(), stdout.trim());
        parse_duration(&stdout).ok_or_else(|| ProbeError::Duration {
            path: path.to_path_buf(),
            reason: format!("unexpected ffprobe output {:?}", stdout.trim()),
        })
    }
}

fn parse_duration(text: &str) -> Option<f64> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Reads the container duration in-process through libav.
#[cfg(feature = "libav")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Libav;

#[cfg(feature = "libav")]
impl Probe for Libav {
    fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        use ffmpeg_next as ffmpeg;

        let failed = |e: ffmpeg::Error| ProbeError::Duration {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        ffmpeg::init().map_err(failed)?;
        let ictx = ffmpeg::format::input(&path).map_err(failed)?;
        let duration = ictx.duration();
        if duration < 0 {
            return Err(ProbeError::Duration {
                path: path.to_path_buf(),
                reason: "container has no duration".to_string(),
            });
        }
        Ok(duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE))
    }
}

/// Allowed shortfall of a merged file: one second or 1%, whichever is larger.
pub fn tolerance(expected: f64) -> f64 {
    (expected * 0.01).max(1.0)
}

/// Checks a freshly merged `output` against the fragments it was built from.
///
/// Without a probe only existence and size are checked.
pub fn verify_merge<P: AsRef<Path>>(
    output: &Path,
    fragments: &[P],
    probe: Option<&dyn Probe>,
) -> Result<(), ProbeError> {
    let metadata = fs::metadata(output).map_err(|source| ProbeError::Missing {
        path: output.to_path_buf(),
        source,
    })?;
    if metadata.len() == 0 {
        return Err(ProbeError::Empty {
            path: output.to_path_buf(),
        });
    }

    let probe = match probe {
        Some(probe) => probe,
        None => return Ok(()),
    };

    let mut expected = 0.0;
    for fragment in fragments {
        expected += probe.duration(fragment.as_ref())?;
    }
    let actual = probe.duration(output)?;
    debug!(
        "{}: {:.2}s merged from {:.2}s of fragments",
        output.display(),
        actual,
        expected
    );

    if actual + tolerance(expected) < expected {
        return Err(ProbeError::TooShort {
            path: output.to_path_buf(),
            actual,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct FixedDurations(HashMap<PathBuf, f64>);

    impl Probe for FixedDurations {
        fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
            self.0.get(path).copied().ok_or_else(|| ProbeError::Duration {
                path: path.to_path_buf(),
                reason: "unknown".to_string(),
            })
        }
    }

    fn setup(merged: f64) -> (TempDir, PathBuf, Vec<PathBuf>, FixedDurations) {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("0001_merged.mp4");
        fs::write(&output, b"merged").unwrap();
        let fragments = vec![dir.path().join("GX010001.mp4"), dir.path().join("GX020001.mp4")];
        let durations = FixedDurations(HashMap::from([
            (fragments[0].clone(), 300.0),
            (fragments[1].clone(), 120.0),
            (output.clone(), merged),
        ]));
        (dir, output, fragments, durations)
    }

    #[rstest]
    #[case("12.345000\n", Some(12.345))]
    #[case("\n  7\n", Some(7.0))]
    #[case("N/A\n", None)]
    #[case("", None)]
    #[case("-3", None)]
    fn parses_ffprobe_output(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_duration(text), expected);
    }

    #[test]
    fn accepts_output_within_tolerance() {
        let (_dir, output, fragments, probe) = setup(416.0);
        verify_merge(&output, &fragments, Some(&probe as &dyn Probe)).unwrap();
    }

    #[test]
    fn rejects_truncated_output() {
        let (_dir, output, fragments, probe) = setup(300.0);
        let err = verify_merge(&output, &fragments, Some(&probe as &dyn Probe)).unwrap_err();
        assert!(matches!(err, ProbeError::TooShort { .. }));
    }

    #[test]
    fn missing_and_empty_outputs_fail_without_probe() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("0001_merged.mp4");
        let none: [&Path; 0] = [];
        assert!(matches!(
            verify_merge(&output, &none, None),
            Err(ProbeError::Missing { .. })
        ));
        fs::write(&output, b"").unwrap();
        assert!(matches!(
            verify_merge(&output, &none, None),
            Err(ProbeError::Empty { .. })
        ));
    }

    #[test]
    fn tolerance_has_a_floor_of_one_second() {
        assert_eq!(tolerance(10.0), 1.0);
        assert_eq!(tolerance(1000.0), 10.0);
    }
}
