//! Data element records.
//!
//! A [`VrElement`] holds its tag, its value representation,
//! and its value in one of three shapes:
//! a primitive byte payload, a list of sequence items,
//! or a list of encapsulated pixel data fragments.
//!
//! Multi-byte binary payloads are kept in big endian byte order,
//! regardless of the transfer syntax they were read from.

use crate::error::{DecodeTextSnafu, IndexOutOfRangeSnafu, NotPrimitiveSnafu, Result};
use crate::header::{Representation, Tag, PIXEL_DATA, VR};
use crate::object::DicomObject;
use crate::text::{trim_padding, DefaultCharacterSetCodec, TextCodec};
use crate::value::DicomValue;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use snafu::ResultExt;
use std::borrow::Cow;

/// The value held by a data element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// A primitive value payload.
    Bytes(Vec<u8>),
    /// The items of a sequence (SQ).
    Items(Vec<DicomObject>),
    /// The frames of encapsulated pixel data,
    /// without the basic offset table.
    Fragments(Vec<Vec<u8>>),
}

/// A DICOM data element record.
#[derive(Debug, Clone, PartialEq)]
pub struct VrElement {
    tag: Tag,
    vr: VR,
    value: ElementValue,
}

macro_rules! binary_constructor {
    ($name: ident, $t: ty, $write: ident, $doc: literal) => {
        #[doc = $doc]
        pub fn $name(tag: Tag, vr: VR, values: &[$t]) -> Self {
            let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<$t>());
            for v in values {
                // writing to a vector does not fail
                let _ = bytes.$write::<BigEndian>(*v);
            }
            VrElement::new(tag, vr, bytes)
        }
    };
}

impl VrElement {
    /// Create an element with a primitive payload.
    /// Binary payloads must be in big endian.
    pub fn new(tag: Tag, vr: VR, bytes: impl Into<Vec<u8>>) -> Self {
        VrElement {
            tag,
            vr,
            value: ElementValue::Bytes(bytes.into()),
        }
    }

    /// Create a textual element,
    /// padding the value to an even length.
    pub fn from_str(tag: Tag, vr: VR, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(vr.padding());
        }
        VrElement::new(tag, vr, bytes)
    }

    /// Create a textual element with multiple values.
    pub fn from_strs(tag: Tag, vr: VR, values: &[&str]) -> Self {
        VrElement::from_str(tag, vr, &values.join("\\"))
    }

    binary_constructor!(from_u16s, u16, write_u16, "Create an element of 16-bit unsigned integers.");
    binary_constructor!(from_i16s, i16, write_i16, "Create an element of 16-bit signed integers.");
    binary_constructor!(from_u32s, u32, write_u32, "Create an element of 32-bit unsigned integers.");
    binary_constructor!(from_i32s, i32, write_i32, "Create an element of 32-bit signed integers.");
    binary_constructor!(from_f32s, f32, write_f32, "Create an element of single precision floats.");
    binary_constructor!(from_f64s, f64, write_f64, "Create an element of double precision floats.");

    /// Create an attribute tag (AT) element.
    pub fn from_tags(tag: Tag, values: &[Tag]) -> Self {
        let words: Vec<u16> = values.iter().flat_map(|t| [t.0, t.1]).collect();
        VrElement::from_u16s(tag, VR::AT, &words)
    }

    /// Create a sequence element with the given items.
    pub fn sequence(tag: Tag, items: Vec<DicomObject>) -> Self {
        VrElement {
            tag,
            vr: VR::SQ,
            value: ElementValue::Items(items),
        }
    }

    /// Create a pixel data element with encapsulated frames.
    pub fn encapsulated(frames: Vec<Vec<u8>>) -> Self {
        VrElement {
            tag: PIXEL_DATA,
            vr: VR::OB,
            value: ElementValue::Fragments(frames),
        }
    }

    /// Create a zero length record standing for an item or delimiter.
    pub fn delimiter(tag: Tag) -> Self {
        VrElement::new(tag, VR::UN, Vec::new())
    }

    /// The element's tag.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The element's value representation.
    #[inline]
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// The element's value.
    #[inline]
    pub fn value(&self) -> &ElementValue {
        &self.value
    }

    /// Take the element's value, consuming the element.
    pub fn into_value(self) -> ElementValue {
        self.value
    }

    /// Whether this record stands for an item or delimiter.
    pub fn is_delimiter(&self) -> bool {
        self.tag.is_delimiter_group()
    }

    /// The primitive payload, if the element has one.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            ElementValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The sequence items, if the element is a sequence.
    pub fn items(&self) -> Option<&[DicomObject]> {
        match &self.value {
            ElementValue::Items(items) => Some(items),
            _ => None,
        }
    }

    /// The pixel data fragments, if the element has encapsulated data.
    pub fn fragments(&self) -> Option<&[Vec<u8>]> {
        match &self.value {
            ElementValue::Fragments(frames) => Some(frames),
            _ => None,
        }
    }

    /// The value multiplicity.
    ///
    /// Textual elements count their backslash separated tokens
    /// (none if empty),
    /// fixed width binary elements count how many values fit in the payload,
    /// and everything else holds one value.
    pub fn vm(&self) -> usize {
        let bytes = match &self.value {
            ElementValue::Bytes(bytes) => bytes,
            _ => return 1,
        };
        match self.vr.representation() {
            Representation::Text { .. } => {
                if bytes.is_empty() {
                    0
                } else {
                    bytes.iter().filter(|&&b| b == b'\\').count() + 1
                }
            }
            Representation::Fixed(width) => bytes.len() / width,
            Representation::Single => 1,
        }
    }

    fn primitive(&self) -> Result<&[u8]> {
        self.bytes().ok_or_else(|| NotPrimitiveSnafu { tag: self.tag }.build())
    }

    /// The whole payload as text, without trailing padding.
    pub fn to_str(&self) -> Result<Cow<'_, str>> {
        let bytes = self.primitive()?;
        Ok(match std::str::from_utf8(bytes) {
            Ok(s) if s.is_ascii() => Cow::Borrowed(trim_padding(s)),
            _ => {
                let s = DefaultCharacterSetCodec
                    .decode(bytes)
                    .context(DecodeTextSnafu { tag: self.tag })?;
                Cow::Owned(trim_padding(&s).to_string())
            }
        })
    }

    /// All textual values, split by backslash and without padding.
    pub fn to_strs(&self) -> Result<Vec<String>> {
        let text = self.to_str()?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(text
            .split('\\')
            .map(|s| trim_padding(s).to_string())
            .collect())
    }

    /// Interpret the `index`-th value according to the element's VR.
    pub fn value_at(&self, index: usize) -> Result<DicomValue> {
        let vm = self.vm();
        if let ElementValue::Items(_) = self.value {
            return DicomValue::from_text(VR::SQ, "");
        }
        if index >= vm {
            return IndexOutOfRangeSnafu { index, vm }.fail();
        }
        let bytes = self.primitive()?;
        match self.vr.representation() {
            Representation::Text { .. } => {
                let tokens = self.to_strs()?;
                let token = tokens.get(index).map(String::as_str).unwrap_or_default();
                DicomValue::from_text(self.vr, token)
            }
            Representation::Fixed(width) => {
                DicomValue::from_binary(self.vr, &bytes[index * width..(index + 1) * width])
            }
            Representation::Single => match self.vr {
                VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN => {
                    Ok(DicomValue::Raw(bytes.to_vec()))
                }
                vr => DicomValue::from_text(vr, &self.to_str()?),
            },
        }
    }

    /// Interpret the first value as an unsigned 16-bit integer.
    pub fn to_u16(&self) -> Result<u16> {
        self.integer_at(0)
    }

    /// Interpret the first value as an unsigned 32-bit integer.
    pub fn to_u32(&self) -> Result<u32> {
        self.integer_at(0)
    }

    /// A whole number value which fits in `T`.
    fn integer_at<T>(&self, index: usize) -> Result<T>
    where
        T: TryFrom<i64>,
    {
        let n = self.number_at(index)?;
        let whole = (n.is_finite() && n.fract() == 0.0)
            .then(|| T::try_from(n as i64).ok())
            .flatten();
        whole.ok_or_else(|| {
            crate::error::UnsupportedDatatypeSnafu {
                vr: self.vr,
                value: n.to_string(),
            }
            .build()
        })
    }

    fn number_at(&self, index: usize) -> Result<f64> {
        match self.value_at(index)? {
            DicomValue::Number(n) => Ok(n),
            other => crate::error::UnsupportedDatatypeSnafu {
                vr: self.vr,
                value: format!("{:?}", other),
            }
            .fail(),
        }
    }
}
