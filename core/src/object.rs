//! In-memory DICOM objects.

use crate::element::VrElement;
use crate::error::{NoSuchElementSnafu, Result};
use crate::header::Tag;
use std::collections::btree_map::{self, BTreeMap};

/// An ordered set of data elements, unique by tag.
///
/// Elements are kept sorted by tag,
/// and putting an element whose tag is already present replaces the old one.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DicomObject {
    entries: BTreeMap<Tag, VrElement>,
}

impl DicomObject {
    /// Create an empty object.
    pub fn new() -> Self {
        DicomObject::default()
    }

    /// Insert an element, returning the previous element with the same tag.
    pub fn put(&mut self, element: VrElement) -> Option<VrElement> {
        self.entries.insert(element.tag(), element)
    }

    /// Retrieve the element with the given tag, if present.
    pub fn get(&self, tag: Tag) -> Option<&VrElement> {
        self.entries.get(&tag)
    }

    /// Retrieve the element with the given tag,
    /// failing if it is not present.
    pub fn element(&self, tag: Tag) -> Result<&VrElement> {
        self.get(tag).ok_or_else(|| NoSuchElementSnafu { tag }.build())
    }

    /// Remove the element with the given tag.
    pub fn remove(&mut self, tag: Tag) -> Option<VrElement> {
        self.entries.remove(&tag)
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object has no elements.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the elements in tag order.
    pub fn iter(&self) -> btree_map::Values<'_, Tag, VrElement> {
        self.entries.values()
    }

    /// Iterate over the tags in order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.keys().copied()
    }
}

impl<'a> IntoIterator for &'a DicomObject {
    type Item = &'a VrElement;
    type IntoIter = btree_map::Values<'a, Tag, VrElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

impl IntoIterator for DicomObject {
    type Item = VrElement;
    type IntoIter = btree_map::IntoValues<Tag, VrElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl FromIterator<VrElement> for DicomObject {
    fn from_iter<T: IntoIterator<Item = VrElement>>(iter: T) -> Self {
        let mut obj = DicomObject::new();
        obj.extend(iter);
        obj
    }
}

impl Extend<VrElement> for DicomObject {
    fn extend<T: IntoIterator<Item = VrElement>>(&mut self, iter: T) {
        for e in iter {
            self.put(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::VR;

    #[test]
    fn elements_sorted_and_unique() {
        let mut obj = DicomObject::new();
        obj.put(VrElement::from_str(Tag(0x0010, 0x0020), VR::LO, "ID1"));
        obj.put(VrElement::from_str(Tag(0x0008, 0x0060), VR::CS, "CT"));
        let old = obj.put(VrElement::from_str(Tag(0x0010, 0x0020), VR::LO, "ID2"));
        assert!(old.is_some());
        assert_eq!(obj.len(), 2);
        let tags: Vec<_> = obj.tags().collect();
        assert_eq!(tags, vec![Tag(0x0008, 0x0060), Tag(0x0010, 0x0020)]);
        assert_eq!(obj.element(Tag(0x0010, 0x0020)).unwrap().to_str().unwrap(), "ID2");
        assert!(obj.element(Tag(0x0010, 0x0010)).is_err());
    }
}
