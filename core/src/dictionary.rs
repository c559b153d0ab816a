//! This module contains the concept of a DICOM data dictionary.
//!
//! A dictionary translates attribute tags into their canonical names,
//! typical value representations, and value multiplicity,
//! and names back into tags.
//! Dictionaries are meant to be constructed once
//! and shared between the components that need them,
//! hence the trait is object safe.

use crate::header::{Tag, VR};
use std::fmt::{self, Debug};

/// Restriction on which numbers of a range are part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    /// only even numbers (plain `-`)
    Even,
    /// only odd numbers (`-o-`)
    Odd,
    /// every number (`-u-`)
    All,
}

/// An inclusive range of group or element numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberRange {
    /// lower bound
    pub low: u16,
    /// upper bound
    pub high: u16,
    /// which numbers within the bounds are admitted
    pub parity: Parity,
}

impl NumberRange {
    /// A range with a single value.
    pub fn single(value: u16) -> Self {
        NumberRange {
            low: value,
            high: value,
            parity: Parity::All,
        }
    }

    /// Whether the range holds a single number.
    pub fn is_single(&self) -> bool {
        self.low == self.high
    }

    /// Whether the given number is part of this range.
    pub fn contains(&self, value: u16) -> bool {
        if value < self.low || value > self.high {
            return false;
        }
        match self.parity {
            Parity::All => true,
            Parity::Even => value & 1 == 0,
            Parity::Odd => value & 1 == 1,
        }
    }
}

/// The tags covered by a dictionary entry,
/// either a single tag or a range over group and/or element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagRange {
    /// the group numbers covered
    pub group: NumberRange,
    /// the element numbers covered
    pub element: NumberRange,
}

impl TagRange {
    /// Whether the range represents exactly one tag.
    pub fn single(&self) -> Option<Tag> {
        if self.group.is_single() && self.element.is_single() {
            Some(Tag(self.group.low, self.element.low))
        } else {
            None
        }
    }

    /// Whether the given tag is covered.
    pub fn contains(&self, tag: Tag) -> bool {
        self.group.contains(tag.group()) && self.element.contains(tag.element())
    }
}

impl From<Tag> for TagRange {
    fn from(tag: Tag) -> Self {
        TagRange {
            group: NumberRange::single(tag.group()),
            element: NumberRange::single(tag.element()),
        }
    }
}

/// The value multiplicity range of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Multiplicity {
    /// minimum number of values
    pub min: u32,
    /// maximum number of values, `None` if unbounded (`n`)
    pub max: Option<u32>,
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}-n", self.min),
        }
    }
}

/// A data type for a dictionary entry.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DictionaryEntry {
    /// The attribute tag or tag range
    pub tag: TagRange,
    /// The alias of the attribute, with no spaces, usually InCapitalizedCamelCase
    pub alias: String,
    /// The _typical_ value representation of the attribute
    pub vr: VR,
    /// The admitted value multiplicity
    pub vm: Multiplicity,
}

/// Type trait for a dictionary of DICOM attributes.
pub trait DataDictionary: Debug + Send + Sync {
    /// Fetch an entry by its usual alias (e.g. "PatientName" or "SOPInstanceUID").
    /// Aliases are case sensitive and not separated by spaces.
    fn by_name(&self, name: &str) -> Option<&DictionaryEntry>;

    /// Fetch an entry by its tag.
    fn by_tag(&self, tag: Tag) -> Option<&DictionaryEntry>;

    /// Resolve the name and typical VR of the given tag.
    ///
    /// Tags in private groups resolve to `("Private", UN)`
    /// without consulting the dictionary,
    /// while tags without an entry resolve to `("Unknown", UN)`.
    fn lookup_by_tag(&self, tag: Tag) -> (&str, VR) {
        if tag.is_private() {
            return ("Private", VR::UN);
        }
        match self.by_tag(tag) {
            Some(entry) => (entry.alias.as_str(), entry.vr),
            None => ("Unknown", VR::UN),
        }
    }

    /// Resolve the typical VR of the given tag,
    /// as needed when decoding implicit VR content.
    fn vr_of(&self, tag: Tag) -> VR {
        self.lookup_by_tag(tag).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_honor_parity() {
        let overlays = TagRange {
            group: NumberRange {
                low: 0x6000,
                high: 0x60FF,
                parity: Parity::Even,
            },
            element: NumberRange::single(0x3000),
        };
        assert!(overlays.contains(Tag(0x6000, 0x3000)));
        assert!(overlays.contains(Tag(0x6002, 0x3000)));
        assert!(!overlays.contains(Tag(0x6001, 0x3000)));
        assert!(!overlays.contains(Tag(0x6100, 0x3000)));
        assert_eq!(overlays.single(), None);
        assert_eq!(TagRange::from(Tag(8, 0x16)).single(), Some(Tag(8, 0x16)));
    }

    #[test]
    fn multiplicity_display() {
        let one = Multiplicity { min: 1, max: Some(1) };
        let some = Multiplicity { min: 1, max: Some(3) };
        let many = Multiplicity { min: 2, max: None };
        assert_eq!(one.to_string(), "1");
        assert_eq!(some.to_string(), "1-3");
        assert_eq!(many.to_string(), "2-n");
    }
}
