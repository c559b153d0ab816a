//! This module contains all DICOM data element encoding logic.
//!
//! [`VrWriter`] always emits sequences, items
//! and encapsulated pixel data with undefined length,
//! closing them with the respective delimitation items,
//! even if they were originally read with a defined length.

use crate::transfer_syntax::{Endianness, TransferSyntax};
use byteordered::ByteOrdered;
use dcmlink_core::header::{ITEM, ITEM_DELIMITER, SEQUENCE_DELIMITER, UNDEFINED_LENGTH};
use dcmlink_core::{DicomObject, ElementValue, Tag, VrElement, VR};
use snafu::{ensure, ResultExt, Snafu};
use std::io::{self, Write};

/// Module-level error type:
/// for errors which may occur while encoding DICOM data.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to write header of {}", tag))]
    WriteHeader { tag: Tag, source: io::Error },
    #[snafu(display("Failed to write value of {}", tag))]
    WriteValue { tag: Tag, source: io::Error },
    #[snafu(display(
        "Value of {} is too long for a {} element ({} bytes)",
        tag,
        vr,
        len
    ))]
    ValueTooLong { tag: Tag, vr: VR, len: usize },
    #[snafu(display("Encapsulated value of {} requires explicit VR", tag))]
    EncapsulatedInImplicitVr { tag: Tag },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A writer of data element records in a given transfer syntax.
#[derive(Debug)]
pub struct VrWriter<W> {
    to: W,
    explicit_vr: bool,
    endianness: Endianness,
}

impl<W> VrWriter<W>
where
    W: Write,
{
    /// Create a writer of records encoded in the given transfer syntax.
    pub fn new(to: W, ts: &TransferSyntax) -> Self {
        VrWriter {
            to,
            explicit_vr: ts.explicit_vr(),
            endianness: ts.endianness(),
        }
    }

    /// Retrieve the underlying destination.
    pub fn into_inner(self) -> W {
        self.to
    }

    /// Write all elements of an object, in tag order.
    pub fn write_object(&mut self, obj: &DicomObject) -> Result<()> {
        for element in obj {
            self.write_vr(element)?;
        }
        Ok(())
    }

    /// Write a single record.
    ///
    /// Item records are written with undefined length,
    /// and delimiter records with zero length.
    pub fn write_vr(&mut self, element: &VrElement) -> Result<()> {
        let tag = element.tag();
        if element.is_delimiter() {
            let len = if tag == ITEM { UNDEFINED_LENGTH } else { 0 };
            return self.write_item_header(tag, len);
        }

        match element.value() {
            ElementValue::Bytes(bytes) => {
                let vr = element.vr();
                self.write_header(tag, vr, bytes.len())?;
                self.write_value(tag, vr, bytes)
            }
            ElementValue::Items(items) => {
                self.write_header(tag, VR::SQ, UNDEFINED_LENGTH as usize)?;
                for item in items {
                    self.write_item_header(ITEM, UNDEFINED_LENGTH)?;
                    self.write_object(item)?;
                    self.write_item_header(ITEM_DELIMITER, 0)?;
                }
                self.write_item_header(SEQUENCE_DELIMITER, 0)
            }
            ElementValue::Fragments(frames) => {
                ensure!(self.explicit_vr, EncapsulatedInImplicitVrSnafu { tag });
                self.write_header(tag, element.vr(), UNDEFINED_LENGTH as usize)?;
                // basic offset table: offset of each frame's item
                // relative to the first frame item
                let mut table = Vec::with_capacity(frames.len() * 4);
                let mut offset = 0u32;
                for frame in frames {
                    table.extend_from_slice(&offset.to_be_bytes());
                    offset += 8 + frame.len() as u32;
                }
                self.write_item_header(ITEM, table.len() as u32)?;
                self.write_value(ITEM, VR::UL, &table)?;
                for frame in frames {
                    self.write_item_header(ITEM, frame.len() as u32)?;
                    self.write_value(ITEM, VR::OB, frame)?;
                }
                self.write_item_header(SEQUENCE_DELIMITER, 0)
            }
        }
    }

    fn write_header(&mut self, tag: Tag, vr: VR, len: usize) -> Result<()> {
        let mut to = ByteOrdered::runtime(&mut self.to, self.endianness);
        let res: io::Result<()> = (|| {
            to.write_u16(tag.group())?;
            to.write_u16(tag.element())?;
            Ok(())
        })();
        res.context(WriteHeaderSnafu { tag })?;

        if self.explicit_vr {
            if vr.has_long_length() {
                (|| {
                    to.write_all(&vr.to_bytes())?;
                    to.write_u16(0)?;
                    to.write_u32(len as u32)
                })()
                .context(WriteHeaderSnafu { tag })
            } else {
                ensure!(len <= 0xFFFF, ValueTooLongSnafu { tag, vr, len });
                (|| {
                    to.write_all(&vr.to_bytes())?;
                    to.write_u16(len as u16)
                })()
                .context(WriteHeaderSnafu { tag })
            }
        } else {
            to.write_u32(len as u32).context(WriteHeaderSnafu { tag })
        }
    }

    fn write_item_header(&mut self, tag: Tag, len: u32) -> Result<()> {
        let mut to = ByteOrdered::runtime(&mut self.to, self.endianness);
        (|| {
            to.write_u16(tag.group())?;
            to.write_u16(tag.element())?;
            to.write_u32(len)
        })()
        .context(WriteHeaderSnafu { tag })
    }

    /// Write a payload kept in big endian,
    /// swapping multi-byte values if the target is little endian.
    fn write_value(&mut self, tag: Tag, vr: VR, bytes: &[u8]) -> Result<()> {
        match (self.endianness, vr.swap_width()) {
            (Endianness::Little, Some(width)) => {
                let mut swapped = bytes.to_vec();
                for chunk in swapped.chunks_exact_mut(width) {
                    chunk.reverse();
                }
                self.to.write_all(&swapped)
            }
            _ => self.to.write_all(bytes),
        }
        .context(WriteValueSnafu { tag })
    }
}

/// Encode a whole object into a new byte vector.
pub fn write_object(obj: &DicomObject, ts: &TransferSyntax) -> Result<Vec<u8>> {
    let mut writer = VrWriter::new(Vec::new(), ts);
    writer.write_object(obj)?;
    Ok(writer.into_inner())
}

/// The number of bytes an element takes when encoded.
pub fn encoded_len(element: &VrElement, ts: &TransferSyntax) -> Result<usize> {
    let mut writer = VrWriter::new(Vec::new(), ts);
    writer.write_vr(element)?;
    Ok(writer.into_inner().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_syntax::{
        EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
    };
    use matches::assert_matches;

    #[test]
    fn encode_explicit_le_elements() {
        let mut obj = DicomObject::new();
        obj.put(VrElement::from_u16s(Tag(0x0028, 0x0010), VR::US, &[512]));
        obj.put(VrElement::from_str(
            Tag(0x0002, 0x0002),
            VR::UI,
            "1.2.840.10008.5.1.4.1.1.1",
        ));
        let bytes = write_object(&obj, &EXPLICIT_VR_LITTLE_ENDIAN).unwrap();
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x02, 0x00, 0x02, 0x00, b'U', b'I', 0x1a, 0x00,
            b'1', b'.', b'2', b'.', b'8', b'4', b'0', b'.', b'1', b'0', b'0', b'0', b'8', b'.',
            b'5', b'.', b'1', b'.', b'4', b'.', b'1', b'.', b'1', b'.', b'1', 0x00,
            0x28, 0x00, 0x10, 0x00, b'U', b'S', 0x02, 0x00, 0x00, 0x02,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn encode_implicit_and_big_endian_headers() {
        let e = VrElement::from_u32s(Tag(0x0000, 0x0000), VR::UL, &[0x0102_0304]);

        let bytes = write_object(&[e.clone()].into_iter().collect(), &IMPLICIT_VR_LITTLE_ENDIAN)
            .unwrap();
        #[rustfmt::skip]
        assert_eq!(bytes, [
            0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00,
            0x04, 0x03, 0x02, 0x01,
        ]);

        let bytes =
            write_object(&[e].into_iter().collect(), &EXPLICIT_VR_BIG_ENDIAN).unwrap();
        #[rustfmt::skip]
        assert_eq!(bytes, [
            0x00, 0x00, 0x00, 0x00, b'U', b'L', 0x00, 0x04,
            0x01, 0x02, 0x03, 0x04,
        ]);
    }

    #[test]
    fn sequences_are_always_delimited() {
        let mut item = DicomObject::new();
        item.put(VrElement::from_u16s(Tag(0x0028, 0x0010), VR::US, &[1]));
        let sq = VrElement::sequence(Tag(0x0008, 0x1140), vec![item]);
        let mut writer = VrWriter::new(Vec::new(), &IMPLICIT_VR_LITTLE_ENDIAN);
        writer.write_vr(&sq).unwrap();
        let bytes = writer.into_inner();
        #[rustfmt::skip]
        assert_eq!(bytes, [
            0x08, 0x00, 0x40, 0x11, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF,
            0x28, 0x00, 0x10, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00,
            0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00,
            0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
        ]);
        assert_eq!(encoded_len(&sq, &IMPLICIT_VR_LITTLE_ENDIAN).unwrap(), 42);
    }

    #[test]
    fn encapsulated_value_needs_explicit_vr() {
        let e = VrElement::encapsulated(vec![vec![1; 10]]);
        assert_matches!(
            encoded_len(&e, &IMPLICIT_VR_LITTLE_ENDIAN),
            Err(Error::EncapsulatedInImplicitVr { .. })
        );
    }

    #[test]
    fn offset_table_is_cumulative() {
        let e = VrElement::encapsulated(vec![vec![1; 10], vec![2; 4]]);
        let bytes = write_object(&[e].into_iter().collect(), &EXPLICIT_VR_LITTLE_ENDIAN)
            .unwrap();
        // header (12) + table item header (8)
        #[rustfmt::skip]
        assert_eq!(&bytes[20..28], &[
            0x00, 0x00, 0x00, 0x00,
            0x12, 0x00, 0x00, 0x00,
        ]);
        assert_eq!(bytes.len(), 12 + 8 + 8 + (8 + 10) + (8 + 4) + 8);
    }

    #[test]
    fn short_length_overflow_is_an_error() {
        let e = VrElement::from_str(Tag(0x0010, 0x4000), VR::LT, &"x".repeat(70_000));
        assert_matches!(
            encoded_len(&e, &EXPLICIT_VR_LITTLE_ENDIAN),
            Err(Error::ValueTooLong { len: 70_000, .. })
        );
        // implicit VR has no such limit
        assert_eq!(
            encoded_len(&e, &IMPLICIT_VR_LITTLE_ENDIAN).unwrap(),
            8 + 70_000
        );
    }
}
