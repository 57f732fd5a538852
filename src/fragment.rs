//! Action camera fragment files and their grouping into recordings.
//!
//! Long recordings are split by the camera into files named
//! `<prefix><order:2><sequence:4>.<ext>`, e.g. `GX020533.mp4` is the second
//! fragment of recording 0533.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use failure::Fail;
use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

const PREFIX_LEN: usize = 2;
const ORDER_LEN: usize = 2;
const SEQUENCE_LEN: usize = 4;
const STEM_LEN: usize = PREFIX_LEN + ORDER_LEN + SEQUENCE_LEN;

#[derive(Debug, Fail)]
pub enum FragmentError {
    #[fail(display = "{:?} is not a fragment name: {}", name, reason)]
    NonConforming { name: String, reason: &'static str },
    #[fail(display = "directory {:?} does not appear to contain any fragment files", dir)]
    NoMatchingFiles { dir: PathBuf },
    #[fail(
        display = "recording {} has two files for fragment {}: {:?} and {:?}",
        sequence_id, order, first, second
    )]
    DuplicateFragment {
        sequence_id: SequenceId,
        order: u8,
        first: PathBuf,
        second: PathBuf,
    },
    #[fail(display = "invalid fragment pattern: {}", reason)]
    Pattern { reason: String },
    #[fail(display = "failed to scan {:?}", dir)]
    Scan {
        dir: PathBuf,
        #[cause]
        source: io::Error,
    },
}

/// Identifier shared by every fragment of one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u16);

impl SequenceId {
    pub fn new(id: u16) -> Self {
        SequenceId(id)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Accepts `533` as well as the zero-padded `0533`.
impl FromStr for SequenceId {
    type Err = FragmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let non_conforming = |reason| FragmentError::NonConforming {
            name: s.to_string(),
            reason,
        };
        if s.is_empty() || s.len() > SEQUENCE_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(non_conforming("sequence id must be 1 to 4 digits"));
        }
        s.parse()
            .map(SequenceId)
            .map_err(|_| non_conforming("sequence id must be 1 to 4 digits"))
    }
}

/// Naming convention of the camera that produced the fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPattern {
    prefix: String,
    extension: String,
}

impl Default for FragmentPattern {
    fn default() -> Self {
        FragmentPattern {
            prefix: "GX".to_string(),
            extension: "mp4".to_string(),
        }
    }
}

impl FragmentPattern {
    pub fn new(prefix: &str, extension: &str) -> Result<Self, FragmentError> {
        if prefix.len() != PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(FragmentError::Pattern {
                reason: format!("prefix {:?} must be {} ASCII letters or digits", prefix, PREFIX_LEN),
            });
        }
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(FragmentError::Pattern {
                reason: format!("extension {:?} must be ASCII letters or digits", extension),
            });
        }
        Ok(FragmentPattern {
            prefix: prefix.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Decodes a bare file name such as `GX010533.MP4`.
    ///
    /// Prefix and extension compare case-insensitively, the numeric fields
    /// must be exactly two and four ASCII digits.
    pub fn decode(&self, file_name: &str) -> Result<(u8, SequenceId), FragmentError> {
        let fail = |reason| FragmentError::NonConforming {
            name: file_name.to_string(),
            reason,
        };

        let (stem, extension) = file_name.rsplit_once('.').ok_or_else(|| fail("missing extension"))?;
        if !extension.eq_ignore_ascii_case(&self.extension) {
            return Err(fail("unexpected extension"));
        }
        if stem.len() != STEM_LEN || !stem.is_ascii() {
            return Err(fail("stem must be 8 ASCII characters"));
        }

        let (prefix, fields) = stem.split_at(PREFIX_LEN);
        if !prefix.eq_ignore_ascii_case(&self.prefix) {
            return Err(fail("unexpected prefix"));
        }
        if !fields.bytes().all(|b| b.is_ascii_digit()) {
            return Err(fail("order and sequence fields must be digits"));
        }

        let (order, sequence) = fields.split_at(ORDER_LEN);
        let order: u8 = order.parse().map_err(|_| fail("bad fragment order"))?;
        if order == 0 {
            return Err(fail("fragment order starts at 01"));
        }
        let sequence: u16 = sequence.parse().map_err(|_| fail("bad sequence id"))?;

        Ok((order, SequenceId(sequence)))
    }

    fn glob(&self, dir: &Path) -> String {
        let dir = Pattern::escape(&dir.to_string_lossy());
        format!(
            "{}/{}{}.{}",
            dir,
            Pattern::escape(&self.prefix),
            "?".repeat(ORDER_LEN + SEQUENCE_LEN),
            Pattern::escape(&self.extension)
        )
    }
}

/// One file on disk that decoded under a [`FragmentPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub sequence_id: SequenceId,
    pub order: u8,
    pub path: PathBuf,
}

impl Fragment {
    pub fn from_path(path: &Path, pattern: &FragmentPattern) -> Result<Self, FragmentError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .ok_or_else(|| FragmentError::NonConforming {
                name: path.display().to_string(),
                reason: "no file name",
            })?;
        let (order, sequence_id) = pattern.decode(&name)?;
        Ok(Fragment {
            sequence_id,
            order,
            path: path.to_path_buf(),
        })
    }
}

/// Fragments keyed by recording, each list in ascending fragment order.
pub type FragmentGroups = BTreeMap<SequenceId, Vec<Fragment>>;

/// Lists the fragment files in `dir`.
///
/// Entries are filtered through a case-insensitive glob first and then
/// through the strict decoder; names that pass the glob but not the decoder
/// are logged and left out.
pub fn scan_dir(dir: &Path, pattern: &FragmentPattern) -> Result<Vec<Fragment>, FragmentError> {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let entries = glob::glob_with(&pattern.glob(dir), options).map_err(|e| FragmentError::Pattern {
        reason: e.to_string(),
    })?;

    let mut fragments = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| FragmentError::Scan {
            dir: dir.to_path_buf(),
            source: e.into_error(),
        })?;
        if !path.is_file() {
            continue;
        }
        match Fragment::from_path(&path, pattern) {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => debug!("skipping {}: {}", path.display(), e),
        }
    }

    if fragments.is_empty() {
        return Err(FragmentError::NoMatchingFiles {
            dir: dir.to_path_buf(),
        });
    }
    Ok(fragments)
}

/// Groups fragments by recording and orders each group by fragment order.
///
/// Two files claiming the same slot of one recording are an error, there is
/// no way to tell which of them belongs in the merge.
pub fn group_fragments<I>(fragments: I) -> Result<FragmentGroups, FragmentError>
where
    I: IntoIterator<Item = Fragment>,
{
    let mut groups = FragmentGroups::new();
    for fragment in fragments {
        groups.entry(fragment.sequence_id).or_default().push(fragment);
    }

    for (sequence_id, members) in groups.iter_mut() {
        members.sort_by_key(|f| f.order);

        if let Some(pair) = members.windows(2).find(|pair| pair[0].order == pair[1].order) {
            return Err(FragmentError::DuplicateFragment {
                sequence_id: *sequence_id,
                order: pair[0].order,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }

        let expected = 1..=members.len();
        if !members.iter().map(|f| usize::from(f.order)).eq(expected) {
            let orders: Vec<u8> = members.iter().map(|f| f.order).collect();
            warn!("recording {} has gaps in its fragments: {:?}", sequence_id, orders);
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn fragment(name: &str) -> Fragment {
        Fragment::from_path(Path::new(name), &FragmentPattern::default()).unwrap()
    }

    #[rstest]
    #[case("GX010533.mp4", 1, 533)]
    #[case("GX020533.MP4", 2, 533)]
    #[case("gx990001.Mp4", 99, 1)]
    #[case("GX010000.mp4", 1, 0)]
    fn decodes_conforming_names(#[case] name: &str, #[case] order: u8, #[case] sequence: u16) {
        let decoded = FragmentPattern::default().decode(name).unwrap();
        assert_eq!(decoded, (order, SequenceId::new(sequence)));
    }

    #[rstest]
    #[case("GX010533")]
    #[case("GX010533.mov")]
    #[case("GH010533.mp4")]
    #[case("GX0105333.mp4")]
    #[case("GX01053.mp4")]
    #[case("GX0a0533.mp4")]
    #[case("GX000533.mp4")]
    #[case("GXé10533.mp4")]
    fn rejects_non_conforming_names(#[case] name: &str) {
        assert!(matches!(
            FragmentPattern::default().decode(name),
            Err(FragmentError::NonConforming { .. })
        ));
    }

    #[test]
    fn custom_prefix_and_extension() {
        let pattern = FragmentPattern::new("GH", ".MOV").unwrap();
        assert_eq!(pattern.extension(), "MOV");
        assert_eq!(pattern.decode("GH030007.mov").unwrap(), (3, SequenceId::new(7)));
        assert!(pattern.decode("GX030007.mov").is_err());
    }

    #[rstest]
    #[case("G", "mp4")]
    #[case("GXX", "mp4")]
    #[case("G*", "mp4")]
    #[case("GX", "")]
    #[case("GX", "m?4")]
    fn rejects_bad_patterns(#[case] prefix: &str, #[case] extension: &str) {
        assert!(matches!(
            FragmentPattern::new(prefix, extension),
            Err(FragmentError::Pattern { .. })
        ));
    }

    #[test]
    fn sequence_ids_parse_with_or_without_padding() {
        assert_eq!("0533".parse::<SequenceId>().unwrap(), SequenceId::new(533));
        assert_eq!("533".parse::<SequenceId>().unwrap(), SequenceId::new(533));
        assert_eq!(SequenceId::new(12).to_string(), "0012");
        assert!("12345".parse::<SequenceId>().is_err());
        assert!("-1".parse::<SequenceId>().is_err());
    }

    #[test]
    fn groups_by_recording_in_fragment_order() {
        let groups = group_fragments(vec![
            fragment("GX020533.mp4"),
            fragment("GX010012.mp4"),
            fragment("GX010533.mp4"),
        ])
        .unwrap();

        assert_eq!(groups.len(), 2);
        let recording: Vec<(u8, &Path)> = groups[&SequenceId::new(533)]
            .iter()
            .map(|f| (f.order, f.path.as_path()))
            .collect();
        assert_eq!(
            recording,
            vec![(1, Path::new("GX010533.mp4")), (2, Path::new("GX020533.mp4"))]
        );
        assert_eq!(groups[&SequenceId::new(12)].len(), 1);
    }

    #[test]
    fn orders_numerically_not_by_listing() {
        let groups = group_fragments(vec![
            fragment("GX110001.mp4"),
            fragment("GX020001.mp4"),
            fragment("GX100001.mp4"),
            fragment("GX010001.mp4"),
        ])
        .unwrap();
        let orders: Vec<u8> = groups[&SequenceId::new(1)].iter().map(|f| f.order).collect();
        assert_eq!(orders, vec![1, 2, 10, 11]);
    }

    #[test]
    fn duplicate_fragment_slot_is_rejected() {
        let err = group_fragments(vec![fragment("GX010533.mp4"), fragment("GX010533.MP4")]).unwrap_err();
        assert!(matches!(
            err,
            FragmentError::DuplicateFragment { order: 1, .. }
        ));
    }

    #[test]
    fn scan_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        for name in ["GX010533.mp4", "GX020533.MP4", "GX010012.mp4", "notes.txt", "GX01abcd.mp4", "GX0105330.mp4"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("GX030533.mp4")).unwrap();

        let mut names: Vec<String> = scan_dir(dir.path(), &FragmentPattern::default())
            .unwrap()
            .into_iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["GX010012.mp4", "GX010533.mp4", "GX020533.MP4"]);
    }

    #[test]
    fn scan_of_directory_without_fragments_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("holiday.mp4"), b"x").unwrap();
        assert!(matches!(
            scan_dir(dir.path(), &FragmentPattern::default()),
            Err(FragmentError::NoMatchingFiles { .. })
        ));
    }
}
