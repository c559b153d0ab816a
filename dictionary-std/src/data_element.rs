use crate::parse::{parse_line, ParseError};
use dcmlink_core::dictionary::{DataDictionary, DictionaryEntry};
use dcmlink_core::header::Tag;
use once_cell::sync::Lazy;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// The embedded standard attribute table.
static TABLE: &str = include_str!("dicom.dic");

static DICT: Lazy<Arc<StandardDataDictionary>> =
    Lazy::new(|| Arc::new(StandardDataDictionary::from_table_lenient(TABLE)));

/// Error type for dictionary loading and queries.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// No attribute with the given name.
    #[snafu(display("No attribute named `{}`", name))]
    NotFound { name: String },
    /// A line of the dictionary table could not be parsed.
    #[snafu(display("Invalid dictionary entry at line {}", line))]
    InvalidEntry { line: usize, source: ParseError },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A data element dictionary loaded from a table of attributes.
///
/// Single tag entries are indexed by tag,
/// while range entries (such as the repeating overlay groups)
/// are kept apart and only consulted when the exact tag is not found.
///
/// The standard dictionary is loaded once on first use
/// and shared through [`StandardDataDictionary::shared`].
#[derive(Debug, Default)]
pub struct StandardDataDictionary {
    /// mapping: name → entry index
    by_name: HashMap<String, usize>,
    /// mapping: tag → entry index
    by_tag: HashMap<Tag, usize>,
    /// indices of entries covering a range of tags
    ranges: Vec<usize>,
    entries: Vec<DictionaryEntry>,
}

impl StandardDataDictionary {
    /// Retrieve the process wide standard dictionary.
    pub fn shared() -> Arc<StandardDataDictionary> {
        Arc::clone(&DICT)
    }

    /// Build a dictionary from the given table text,
    /// failing on the first malformed line.
    pub fn from_table(table: &str) -> Result<Self> {
        let mut d = StandardDataDictionary::default();
        for (i, line) in table.lines().enumerate() {
            if let Some(entry) = parse_line(line).context(InvalidEntrySnafu { line: i + 1 })? {
                d.index(entry);
            }
        }
        Ok(d)
    }

    fn from_table_lenient(table: &str) -> Self {
        let mut d = StandardDataDictionary::default();
        for entry in table.lines().filter_map(|line| parse_line(line).ok().flatten()) {
            d.index(entry);
        }
        d
    }

    /// record the given dictionary entry
    fn index(&mut self, entry: DictionaryEntry) -> &mut Self {
        let i = self.entries.len();
        self.by_name.insert(entry.alias.clone(), i);
        match entry.tag.single() {
            Some(tag) => {
                self.by_tag.insert(tag, i);
            }
            None => self.ranges.push(i),
        }
        self.entries.push(entry);
        self
    }

    /// Resolve the tag of the attribute with the given name.
    pub fn tag_by_name(&self, name: &str) -> Result<Tag> {
        let entry = self.by_name(name).ok_or_else(|| NotFoundSnafu { name }.build())?;
        Ok(match entry.tag.single() {
            Some(tag) => tag,
            // first tag in the range
            None => Tag(entry.tag.group.low, entry.tag.element.low),
        })
    }

    /// The number of entries in the dictionary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DataDictionary for StandardDataDictionary {
    fn by_name(&self, name: &str) -> Option<&DictionaryEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    fn by_tag(&self, tag: Tag) -> Option<&DictionaryEntry> {
        self.by_tag
            .get(&tag)
            .or_else(|| {
                // check tags repeating in different groups or elements
                self.ranges
                    .iter()
                    .find(|&&i| self.entries[i].tag.contains(tag))
            })
            .map(|&i| &self.entries[i])
    }
}

impl Display for StandardDataDictionary {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.write_str("Standard DICOM Data Dictionary")
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, StandardDataDictionary, TABLE};
    use dcmlink_core::dictionary::DataDictionary;
    use dcmlink_core::header::{Tag, VR};
    use matches::assert_matches;
    use rstest::rstest;
    use std::sync::Arc;

    #[test]
    fn embedded_table_is_well_formed() {
        let dict = StandardDataDictionary::from_table(TABLE).unwrap();
        assert_eq!(dict.len(), StandardDataDictionary::shared().len());
    }

    #[test]
    fn shared_instance_is_loaded_once() {
        let a = StandardDataDictionary::shared();
        let b = StandardDataDictionary::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[rstest]
    #[case(Tag(0x0010, 0x0010), "PatientName", VR::PN)]
    #[case(Tag(0x0008, 0x0060), "Modality", VR::CS)]
    #[case(Tag(0x0000, 0x0900), "Status", VR::US)]
    #[case(Tag(0x7FE0, 0x0010), "PixelData", VR::OW)]
    #[case(Tag(0x0028, 0x0106), "SmallestImagePixelValue", VR::US)]
    #[case(Tag(0x0028, 0x3002), "LUTDescriptor", VR::US)]
    #[case(Tag(0x0054, 0x0081), "NumberOfSlices", VR::US)]
    #[case(Tag(0x300A, 0x00B0), "BeamSequence", VR::SQ)]
    #[case(Tag(0x7FE0, 0x0001), "ExtendedOffsetTable", VR::OV)]
    fn known_tags(#[case] tag: Tag, #[case] name: &str, #[case] vr: VR) {
        let dict = StandardDataDictionary::shared();
        assert_eq!(dict.lookup_by_tag(tag), (name, vr));
        assert_eq!(dict.tag_by_name(name).unwrap(), tag);
    }

    #[test]
    fn private_tags_are_not_looked_up() {
        let dict = StandardDataDictionary::shared();
        assert_eq!(dict.lookup_by_tag(Tag(0x0009, 0x0010)), ("Private", VR::UN));
        assert_eq!(dict.lookup_by_tag(Tag(0x0029, 0x1001)), ("Private", VR::UN));
        // the entry is still there for direct queries
        assert_eq!(
            dict.by_tag(Tag(0x0009, 0x0010)).map(|e| e.alias.as_str()),
            Some("PrivateCreator")
        );
    }

    #[test]
    fn unknown_tags() {
        let dict = StandardDataDictionary::shared();
        assert_eq!(dict.lookup_by_tag(Tag(0x0010, 0x9999)), ("Unknown", VR::UN));
        assert_eq!(dict.vr_of(Tag(0x4444, 0x0002)), VR::UN);
    }

    #[test]
    fn repeating_groups_use_ranges() {
        let dict = StandardDataDictionary::shared();
        assert_eq!(dict.lookup_by_tag(Tag(0x6000, 0x3000)), ("OverlayData", VR::OW));
        assert_eq!(dict.lookup_by_tag(Tag(0x60EE, 0x3000)), ("OverlayData", VR::OW));
        assert_eq!(dict.lookup_by_tag(Tag(0x6002, 0x0010)), ("OverlayRows", VR::US));
        assert_eq!(dict.lookup_by_tag(Tag(0x0020, 0x3106)), ("SourceImageIDs", VR::CS));
        assert_eq!(dict.tag_by_name("OverlayData").unwrap(), Tag(0x6000, 0x3000));
    }

    #[test]
    fn group_lengths_resolve_in_any_group() {
        let dict = StandardDataDictionary::shared();
        assert_eq!(dict.vr_of(Tag(0x0018, 0x0000)), VR::UL);
        assert_eq!(dict.vr_of(Tag(0x7FE0, 0x0000)), VR::UL);
        // specific entries take precedence over the range
        assert_eq!(
            dict.lookup_by_tag(Tag(0x0000, 0x0000)),
            ("CommandGroupLength", VR::UL)
        );
    }

    #[test]
    fn missing_name_is_an_error() {
        let dict = StandardDataDictionary::shared();
        assert_matches!(
            dict.tag_by_name("OperatorNickname"),
            Err(Error::NotFound { name }) if name == "OperatorNickname"
        );
    }

    #[test]
    fn malformed_table_reports_line() {
        let table = "# header\n(0010,0010)\tPN\tPatientName\t1\tDICOM\n(0010,zzzz)\tLO\tPatientID\t1\n";
        assert_matches!(
            StandardDataDictionary::from_table(table),
            Err(Error::InvalidEntry { line: 3, .. })
        );
    }
}
