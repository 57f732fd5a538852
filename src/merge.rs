//! Sequential merge run over a [`MergePlan`].
//!
//! Groups are merged one after another. The first failing merge or
//! verification aborts the run before anything is deleted, and deletion only
//! ever touches fragments of groups that were merged.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use failure::Fail;
use tracing::{debug, info, warn};

use crate::command::{concat_list_path, CommandError, ConcatCommand, ConcatList, TranscodeSettings, Transcoder};
use crate::fragment::SequenceId;
use crate::plan::{Disposition, MergePlan};
use crate::probe::{verify_merge, Probe, ProbeError};

#[derive(Debug, Fail)]
pub enum MergeError {
    #[fail(display = "{:?} already exists, pass --overwrite to replace it", path)]
    OutputExists { path: PathBuf },
    #[fail(display = "{:?} is in the way of the fragment list, move it aside", path)]
    ListExists { path: PathBuf },
    #[fail(display = "merging recording {} failed", sequence_id)]
    Transcode {
        sequence_id: SequenceId,
        #[cause]
        source: CommandError,
    },
    #[fail(display = "merged recording {} failed verification", sequence_id)]
    Verification {
        sequence_id: SequenceId,
        #[cause]
        source: ProbeError,
    },
    #[fail(display = "failed to delete {:?}", path)]
    Delete {
        path: PathBuf,
        #[cause]
        source: io::Error,
    },
    #[fail(display = "failed to write report")]
    Report {
        #[cause]
        source: io::Error,
    },
}

impl From<io::Error> for MergeError {
    fn from(source: io::Error) -> Self {
        MergeError::Report { source }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeReport {
    pub dry_run: bool,
    pub merged: Vec<(SequenceId, PathBuf)>,
    pub skipped: Vec<(SequenceId, Disposition)>,
    pub deleted: Vec<PathBuf>,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (merge_verb, delete_verb) = if self.dry_run {
            ("would merge", "would delete")
        } else {
            ("merged", "deleted")
        };
        write!(
            f,
            "{} {} recording(s), skipped {}, {} {} file(s)",
            merge_verb,
            self.merged.len(),
            self.skipped.len(),
            delete_verb,
            self.deleted.len()
        )
    }
}

pub struct Merger<'a> {
    ffmpeg: PathBuf,
    transcoder: &'a dyn Transcoder,
    settings: TranscodeSettings,
    probe: Option<&'a dyn Probe>,
    dry_run: bool,
    delete_merged: bool,
}

impl<'a> Merger<'a> {
    pub fn new(ffmpeg: PathBuf, transcoder: &'a dyn Transcoder) -> Self {
        Merger {
            ffmpeg,
            transcoder,
            settings: TranscodeSettings::default(),
            probe: None,
            dry_run: false,
            delete_merged: false,
        }
    }

    pub fn settings(mut self, settings: TranscodeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Checks merged durations with `probe`; without one only existence
    /// and size of the output are checked.
    pub fn probe(mut self, probe: &'a dyn Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Report commands and deletions on `out` instead of running them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn delete_merged(mut self, delete_merged: bool) -> Self {
        self.delete_merged = delete_merged;
        self
    }

    pub fn command_for(&self, output: &Path) -> ConcatCommand {
        ConcatCommand::new(&self.ffmpeg, &concat_list_path(output), output, &self.settings)
    }

    pub fn run<W: Write>(&self, plan: &MergePlan, out: &mut W) -> Result<MergeReport, MergeError> {
        let mut report = MergeReport {
            dry_run: self.dry_run,
            ..MergeReport::default()
        };

        if !self.settings.overwrite {
            if let Some(existing) = plan.to_merge().find(|g| g.output.exists()) {
                return Err(MergeError::OutputExists {
                    path: existing.output.clone(),
                });
            }
        }

        if let Some(list) = plan
            .to_merge()
            .map(|g| concat_list_path(&g.output))
            .find(|list| list.exists())
        {
            return Err(MergeError::ListExists { path: list });
        }

        for group in plan.skipped() {
            let files: Vec<String> = group.paths().map(|p| p.display().to_string()).collect();
            warn!(
                "recording {} {}, keeping {}",
                group.sequence_id,
                group.disposition,
                files.join(", ")
            );
            report.skipped.push((group.sequence_id, group.disposition));
        }

        let total = plan.to_merge().count();
        for (i, group) in plan.to_merge().enumerate() {
            info!(
                "processing {} of {}: recording {} ({} fragments)",
                i + 1,
                total,
                group.sequence_id,
                group.fragments.len()
            );
            let command = self.command_for(&group.output);

            if self.dry_run {
                writeln!(out, "{}", command)?;
                for path in group.paths() {
                    writeln!(out, "    {}", path.display())?;
                }
            } else {
                let fragments: Vec<&Path> = group.paths().collect();
                let transcode_failed = |source| MergeError::Transcode {
                    sequence_id: group.sequence_id,
                    source,
                };
                let list = ConcatList::write(&concat_list_path(&group.output), &fragments).map_err(transcode_failed)?;
                debug!("concat list {}", list.path().display());
                self.transcoder.run(&command).map_err(transcode_failed)?;
                drop(list);

                verify_merge(&group.output, &fragments, self.probe).map_err(|source| MergeError::Verification {
                    sequence_id: group.sequence_id,
                    source,
                })?;
                info!("wrote {}", group.output.display());
            }
            report.merged.push((group.sequence_id, group.output.clone()));
        }

        if self.delete_merged {
            self.delete(plan, out, &mut report)?;
        }

        Ok(report)
    }

    fn delete<W: Write>(&self, plan: &MergePlan, out: &mut W, report: &mut MergeReport) -> Result<(), MergeError> {
        for path in plan.delete_set() {
            if self.dry_run {
                writeln!(out, "would delete {}", path.display())?;
            } else {
                match fs::remove_file(path) {
                    Ok(()) => debug!("deleted {}", path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!("{} is already gone", path.display());
                        continue;
                    }
                    Err(source) => {
                        return Err(MergeError::Delete {
                            path: path.to_path_buf(),
                            source,
                        })
                    }
                }
            }
            report.deleted.push(path.to_path_buf());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_summary_wording() {
        let report = MergeReport {
            dry_run: true,
            merged: vec![(SequenceId::new(533), PathBuf::from("/out/0533_merged.mp4"))],
            skipped: vec![(SequenceId::new(12), Disposition::SkippedSingleton)],
            deleted: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        assert_eq!(
            report.to_string(),
            "would merge 1 recording(s), skipped 1, would delete 2 file(s)"
        );

        let report = MergeReport {
            dry_run: false,
            ..report
        };
        assert_eq!(report.to_string(), "merged 1 recording(s), skipped 1, deleted 2 file(s)");
    }
}
