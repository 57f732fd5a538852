//! Per-recording decisions for a merge run.
//!
//! Every group gets exactly one [`Disposition`]. Both the set of merges to
//! run and the set of files that may be deleted afterwards are derived from
//! it, never from group membership alone.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::fragment::{Fragment, FragmentGroups, FragmentPattern, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Merged,
    /// One fragment only, nothing to concatenate.
    SkippedSingleton,
    /// Not in the caller's allow-list.
    SkippedNotSelected,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Disposition::Merged => "merged",
            Disposition::SkippedSingleton => "skipped (single fragment)",
            Disposition::SkippedNotSelected => "skipped (not selected)",
        };
        f.write_str(text)
    }
}

/// Optional allow-list of recordings to process.
#[derive(Debug, Clone, Default)]
pub enum Selection {
    #[default]
    All,
    Only(BTreeSet<SequenceId>),
}

impl Selection {
    pub fn only<I: IntoIterator<Item = SequenceId>>(ids: I) -> Self {
        Selection::Only(ids.into_iter().collect())
    }

    pub fn contains(&self, id: SequenceId) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(ids) => ids.contains(&id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub sequence_id: SequenceId,
    pub fragments: Vec<Fragment>,
    pub disposition: Disposition,
    pub output: PathBuf,
}

impl GroupPlan {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.fragments.iter().map(|f| f.path.as_path())
    }
}

#[derive(Debug, Clone)]
pub struct MergePlan {
    groups: Vec<GroupPlan>,
}

impl MergePlan {
    /// Decides the fate of every group.
    ///
    /// The allow-list is checked first, so an unselected singleton reports
    /// as not selected.
    pub fn new(groups: FragmentGroups, selection: &Selection, dest: &Path, pattern: &FragmentPattern) -> Self {
        if let Selection::Only(ids) = selection {
            for id in ids.iter().filter(|id| !groups.contains_key(*id)) {
                warn!("recording {} was selected but has no fragments", id);
            }
        }

        let groups = groups
            .into_iter()
            .map(|(sequence_id, fragments)| {
                let disposition = if !selection.contains(sequence_id) {
                    Disposition::SkippedNotSelected
                } else if fragments.len() == 1 {
                    Disposition::SkippedSingleton
                } else {
                    Disposition::Merged
                };
                GroupPlan {
                    sequence_id,
                    output: output_path(dest, sequence_id, pattern),
                    fragments,
                    disposition,
                }
            })
            .collect();

        MergePlan { groups }
    }

    pub fn groups(&self) -> &[GroupPlan] {
        &self.groups
    }

    pub fn to_merge(&self) -> impl Iterator<Item = &GroupPlan> {
        self.groups
            .iter()
            .filter(|g| g.disposition == Disposition::Merged)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &GroupPlan> {
        self.groups
            .iter()
            .filter(|g| g.disposition != Disposition::Merged)
    }

    /// Files that may be removed once every merge has completed.
    pub fn delete_set(&self) -> Vec<&Path> {
        self.to_merge().flat_map(|g| g.paths()).collect()
    }
}

pub fn output_path(dest: &Path, sequence_id: SequenceId, pattern: &FragmentPattern) -> PathBuf {
    dest.join(format!("{}_merged.{}", sequence_id, pattern.extension().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::group_fragments;

    fn groups(names: &[&str]) -> FragmentGroups {
        let pattern = FragmentPattern::default();
        let fragments = names
            .iter()
            .map(|name| Fragment::from_path(&Path::new("/clips").join(name), &pattern).unwrap());
        group_fragments(fragments).unwrap()
    }

    fn plan(selection: &Selection) -> MergePlan {
        MergePlan::new(
            groups(&["GX010533.mp4", "GX020533.mp4", "GX010012.mp4"]),
            selection,
            Path::new("/out"),
            &FragmentPattern::default(),
        )
    }

    fn disposition(plan: &MergePlan, id: u16) -> Disposition {
        plan.groups()
            .iter()
            .find(|g| g.sequence_id == SequenceId::new(id))
            .map(|g| g.disposition)
            .unwrap()
    }

    #[test]
    fn singleton_is_neither_merged_nor_deleted() {
        let plan = plan(&Selection::All);
        assert_eq!(disposition(&plan, 533), Disposition::Merged);
        assert_eq!(disposition(&plan, 12), Disposition::SkippedSingleton);
        assert_eq!(
            plan.delete_set(),
            vec![Path::new("/clips/GX010533.mp4"), Path::new("/clips/GX020533.mp4")]
        );
    }

    #[test]
    fn allow_list_takes_precedence_over_singleton() {
        let plan = plan(&Selection::only([SequenceId::new(533)]));
        assert_eq!(disposition(&plan, 12), Disposition::SkippedNotSelected);
        assert_eq!(plan.to_merge().count(), 1);
        assert_eq!(plan.skipped().count(), 1);
    }

    #[test]
    fn unselected_groups_keep_their_files() {
        let plan = plan(&Selection::only([SequenceId::new(12)]));
        assert_eq!(disposition(&plan, 533), Disposition::SkippedNotSelected);
        assert_eq!(disposition(&plan, 12), Disposition::SkippedSingleton);
        assert!(plan.delete_set().is_empty());
        assert_eq!(plan.to_merge().count(), 0);
    }

    #[test]
    fn outputs_are_named_after_the_recording() {
        let plan = plan(&Selection::All);
        let outputs: Vec<&Path> = plan.groups().iter().map(|g| g.output.as_path()).collect();
        assert_eq!(
            outputs,
            vec![Path::new("/out/0012_merged.mp4"), Path::new("/out/0533_merged.mp4")]
        );
    }
}
