//! This module contains all DICOM data element decoding logic.
//!
//! [`VrReader`] reads one element record at a time from a byte source.
//! Defined length sequences and items are tracked with a stack of markers,
//! so that reaching their end yields a synthesized delimiter record,
//! just as if they had been encoded with undefined length.
//! Consumers can then treat every sequence as delimited.

use crate::transfer_syntax::{Endianness, TransferSyntax};
use byteordered::ByteOrdered;
use dcmlink_core::dictionary::DataDictionary;
use dcmlink_core::header::{
    ITEM, ITEM_DELIMITER, PIXEL_DATA, SEQUENCE_DELIMITER, UNDEFINED_LENGTH,
};
use dcmlink_core::{DicomObject, Tag, VrElement, VR};
use snafu::{ensure, ResultExt, Snafu};
use std::io::{self, Read};
use tracing::trace;

/// Module-level error type:
/// for errors which may occur while decoding DICOM data.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to read the header's tag field"))]
    ReadTag { source: io::Error },
    #[snafu(display("Stream ended in the middle of a header at position {}", position))]
    TruncatedHeader { position: u64 },
    #[snafu(display("Failed to read the header's value representation"))]
    ReadVr { source: io::Error },
    #[snafu(display("Failed to read the header's reserved bytes"))]
    ReadReserved { source: io::Error },
    #[snafu(display("Failed to read the header's element length field"))]
    ReadLength { source: io::Error },
    #[snafu(display("Failed to read value of {} ({} bytes)", tag, len))]
    ReadValue {
        tag: Tag,
        len: u32,
        source: io::Error,
    },
    #[snafu(display("Stream ended inside a sequence at position {}", position))]
    UnexpectedEndOfSequence { position: u64 },
    #[snafu(display("Unbalanced delimiter {} at position {}", tag, position))]
    UnbalancedDelimiter { tag: Tag, position: u64 },
    #[snafu(display("Unexpected element {} inside sequence at position {}", tag, position))]
    UnexpectedSequenceContent { tag: Tag, position: u64 },
    #[snafu(display(
        "Read position {} went past the end of a sequence or item at {}",
        position,
        end
    ))]
    SequenceOverrun { position: u64, end: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kind of delimiter synthesized when a marker is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
    /// end of a defined length sequence
    SequenceEnd,
    /// end of a defined length item
    ItemEnd,
}

impl DelimiterKind {
    fn tag(self) -> Tag {
        match self {
            DelimiterKind::SequenceEnd => SEQUENCE_DELIMITER,
            DelimiterKind::ItemEnd => ITEM_DELIMITER,
        }
    }
}

/// A pending end of a defined length sequence or item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    end: u64,
    kind: DelimiterKind,
}

/// A byte source which keeps track of how many bytes were read.
#[derive(Debug)]
struct CountingReader<S> {
    inner: S,
    position: u64,
}

impl<S: Read> Read for CountingReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

/// A reader of data element records in a given transfer syntax.
///
/// Each decoding session owns its delimiter marker stack.
#[derive(Debug)]
pub struct VrReader<'d, S> {
    source: CountingReader<S>,
    explicit_vr: bool,
    endianness: Endianness,
    dict: &'d dyn DataDictionary,
    markers: Vec<Marker>,
}

impl<'d, S> VrReader<'d, S>
where
    S: Read,
{
    /// Create a reader of records encoded in the given transfer syntax.
    /// The dictionary resolves value representations of implicit VR content.
    pub fn new(source: S, ts: &TransferSyntax, dict: &'d dyn DataDictionary) -> Self {
        VrReader {
            source: CountingReader {
                inner: source,
                position: 0,
            },
            explicit_vr: ts.explicit_vr(),
            endianness: ts.endianness(),
            dict,
            markers: Vec::new(),
        }
    }

    /// The number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.source.position
    }

    /// Retrieve the underlying source.
    pub fn into_inner(self) -> S {
        self.source.inner
    }

    /// Read the next record.
    ///
    /// Items and delimiters are returned as zero length records
    /// with their respective tags (group `FFFE`).
    /// Sequences are returned whole, their items decoded recursively,
    /// and so is encapsulated pixel data.
    ///
    /// Returns `Ok(None)` when the source ends at a record boundary,
    /// meaning that the object is complete.
    pub fn read_vr(&mut self) -> Result<Option<VrElement>> {
        if let Some(delimiter) = self.take_marker()? {
            return Ok(Some(delimiter));
        }

        let tag = match self.read_tag()? {
            Some(tag) => tag,
            None => return Ok(None),
        };

        if tag.is_delimiter_group() {
            // item delimiters do not have VR or reserved field
            let len = self.read_u32().context(ReadLengthSnafu)?;
            if tag == ITEM && len != UNDEFINED_LENGTH {
                self.markers.push(Marker {
                    end: self.position() + u64::from(len),
                    kind: DelimiterKind::ItemEnd,
                });
            }
            trace!("{} delimiter (length {:#x})", tag, len);
            return Ok(Some(VrElement::delimiter(tag)));
        }

        let (vr, len) = if self.explicit_vr {
            let mut code = [0u8; 2];
            self.source.read_exact(&mut code).context(ReadVrSnafu)?;
            let vr = VR::from_binary(code).unwrap_or(VR::UN);
            let len = if vr.has_long_length() {
                let mut reserved = [0u8; 2];
                self.source
                    .read_exact(&mut reserved)
                    .context(ReadReservedSnafu)?;
                self.read_u32().context(ReadLengthSnafu)?
            } else {
                u32::from(self.read_u16().context(ReadLengthSnafu)?)
            };
            (vr, len)
        } else {
            let len = self.read_u32().context(ReadLengthSnafu)?;
            (self.dict.vr_of(tag), len)
        };

        if tag == PIXEL_DATA && len == UNDEFINED_LENGTH && vr != VR::SQ {
            let frames = self.read_fragments()?;
            trace!("{} encapsulated pixel data, {} frames", tag, frames.len());
            return Ok(Some(VrElement::encapsulated(frames)));
        }

        if vr == VR::SQ || len == UNDEFINED_LENGTH {
            if len != UNDEFINED_LENGTH {
                self.markers.push(Marker {
                    end: self.position() + u64::from(len),
                    kind: DelimiterKind::SequenceEnd,
                });
            }
            let items = self.read_items()?;
            trace!("{} SQ with {} items", tag, items.len());
            return Ok(Some(VrElement::sequence(tag, items)));
        }

        let mut value = self.read_value(tag, len)?;
        if self.endianness == Endianness::Little {
            if let Some(width) = vr.swap_width() {
                for chunk in value.chunks_exact_mut(width) {
                    chunk.reverse();
                }
            }
        }
        trace!("{} {} ({} bytes)", tag, vr, len);
        Ok(Some(VrElement::new(tag, vr, value)))
    }

    /// Read records until the end of the source,
    /// collecting them into an object.
    pub fn read_object(&mut self) -> Result<DicomObject> {
        let mut obj = DicomObject::new();
        while let Some(element) = self.read_vr()? {
            ensure!(
                !element.is_delimiter(),
                UnbalancedDelimiterSnafu {
                    tag: element.tag(),
                    position: self.position(),
                }
            );
            obj.put(element);
        }
        Ok(obj)
    }

    /// Pop the marker which was reached, if any,
    /// converting it into a delimiter record.
    fn take_marker(&mut self) -> Result<Option<VrElement>> {
        let position = self.position();
        if let Some(m) = self.markers.iter().find(|m| m.end < position) {
            return SequenceOverrunSnafu {
                position,
                end: m.end,
            }
            .fail();
        }
        match self.markers.last() {
            Some(m) if m.end == position => {
                let kind = m.kind;
                self.markers.pop();
                Ok(Some(VrElement::delimiter(kind.tag())))
            }
            _ => Ok(None),
        }
    }

    /// Decode the items of a sequence, up to its delimiter.
    fn read_items(&mut self) -> Result<Vec<DicomObject>> {
        let mut items = Vec::new();
        loop {
            let record = self.read_vr()?.ok_or_else(|| {
                UnexpectedEndOfSequenceSnafu {
                    position: self.position(),
                }
                .build()
            })?;
            match record.tag() {
                ITEM => items.push(self.read_item_body()?),
                SEQUENCE_DELIMITER => return Ok(items),
                tag => {
                    return UnexpectedSequenceContentSnafu {
                        tag,
                        position: self.position(),
                    }
                    .fail()
                }
            }
        }
    }

    /// Decode the elements of an item, up to its delimiter.
    fn read_item_body(&mut self) -> Result<DicomObject> {
        let mut item = DicomObject::new();
        loop {
            let record = self.read_vr()?.ok_or_else(|| {
                UnexpectedEndOfSequenceSnafu {
                    position: self.position(),
                }
                .build()
            })?;
            match record.tag() {
                ITEM_DELIMITER => return Ok(item),
                tag if tag.is_delimiter_group() => {
                    return UnbalancedDelimiterSnafu {
                        tag,
                        position: self.position(),
                    }
                    .fail()
                }
                _ => {
                    item.put(record);
                }
            }
        }
    }

    /// Decode the fragments of encapsulated pixel data.
    /// The first item, the basic offset table, is dropped.
    fn read_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut frames = Vec::new();
        let mut offset_table_seen = false;
        loop {
            let tag = self.read_tag()?.ok_or_else(|| {
                UnexpectedEndOfSequenceSnafu {
                    position: self.position(),
                }
                .build()
            })?;
            let len = self.read_u32().context(ReadLengthSnafu)?;
            match tag {
                ITEM => {
                    let data = self.read_value(tag, len)?;
                    if offset_table_seen {
                        frames.push(data);
                    } else {
                        offset_table_seen = true;
                    }
                }
                SEQUENCE_DELIMITER => return Ok(frames),
                tag => {
                    return UnexpectedSequenceContentSnafu {
                        tag,
                        position: self.position(),
                    }
                    .fail()
                }
            }
        }
    }

    /// Read a tag, or nothing if the source ended right away.
    fn read_tag(&mut self) -> Result<Option<Tag>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(ReadTagSnafu),
            }
        }
        match filled {
            0 => Ok(None),
            4 => {
                let mut fields = ByteOrdered::runtime(&buf[..], self.endianness);
                let group = fields.read_u16().context(ReadTagSnafu)?;
                let element = fields.read_u16().context(ReadTagSnafu)?;
                Ok(Some(Tag(group, element)))
            }
            _ => TruncatedHeaderSnafu {
                position: self.position(),
            }
            .fail(),
        }
    }

    fn read_value(&mut self, tag: Tag, len: u32) -> Result<Vec<u8>> {
        let mut value = vec![0u8; len as usize];
        self.source
            .read_exact(&mut value)
            .context(ReadValueSnafu { tag, len })?;
        Ok(value)
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        ByteOrdered::runtime(&mut self.source, self.endianness).read_u16()
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        ByteOrdered::runtime(&mut self.source, self.endianness).read_u32()
    }
}

/// Decode a whole object from a byte slice.
pub fn read_object(
    bytes: &[u8],
    ts: &TransferSyntax,
    dict: &dyn DataDictionary,
) -> Result<DicomObject> {
    VrReader::new(bytes, ts, dict).read_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer_syntax::{
        EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
    };
    use dcmlink_dictionary_std::StandardDataDictionary;
    use matches::assert_matches;

    // manually crafting some DICOM data elements
    //  Tag: (0002,0002) Media Storage SOP Class UID
    //  VR: UI
    //  Length: 26
    //  Value: "1.2.840.10008.5.1.4.1.1.1\0"
    // --
    //  Tag: (0028,0010) Rows
    //  VR: US
    //  Length: 2
    //  Value: 512
    #[rustfmt::skip]
    const RAW_EXPLICIT: &[u8] = &[
        0x02, 0x00, 0x02, 0x00, b'U', b'I', 0x1a, 0x00,
        b'1', b'.', b'2', b'.', b'8', b'4', b'0', b'.', b'1', b'0', b'0', b'0', b'8', b'.',
        b'5', b'.', b'1', b'.', b'4', b'.', b'1', b'.', b'1', b'.', b'1', 0x00,
        0x28, 0x00, 0x10, 0x00, b'U', b'S', 0x02, 0x00, 0x00, 0x02,
    ];

    #[test]
    fn decode_explicit_le_elements() {
        let dict = StandardDataDictionary::shared();
        let mut reader = VrReader::new(RAW_EXPLICIT, &EXPLICIT_VR_LITTLE_ENDIAN, &*dict);
        let e = reader.read_vr().unwrap().unwrap();
        assert_eq!(e.tag(), Tag(0x0002, 0x0002));
        assert_eq!(e.vr(), VR::UI);
        assert_eq!(e.to_str().unwrap(), "1.2.840.10008.5.1.4.1.1.1");
        assert_eq!(reader.position(), 34);

        let e = reader.read_vr().unwrap().unwrap();
        assert_eq!(e.vr(), VR::US);
        // stored in big endian
        assert_eq!(e.bytes(), Some(&[0x02, 0x00][..]));
        assert_eq!(e.to_u16().unwrap(), 512);

        assert_matches!(reader.read_vr(), Ok(None));
    }

    #[test]
    fn decode_explicit_be_header() {
        let dict = StandardDataDictionary::shared();
        #[rustfmt::skip]
        let raw: &[u8] = &[
            // (0028,0010) Rows = 512
            0x00, 0x28, 0x00, 0x10, b'U', b'S', 0x00, 0x02, 0x02, 0x00,
            // (7FE0,0010) Pixel Data, OW, 4 bytes
            0x7F, 0xE0, 0x00, 0x10, b'O', b'W', 0x00, 0x00, 0x00, 0x00, 0x00, 0x04,
            0x01, 0x02, 0x03, 0x04,
        ];
        let mut reader = VrReader::new(raw, &EXPLICIT_VR_BIG_ENDIAN, &*dict);
        let e = reader.read_vr().unwrap().unwrap();
        assert_eq!(e.tag(), Tag(0x0028, 0x0010));
        assert_eq!(e.to_u16().unwrap(), 512);

        let e = reader.read_vr().unwrap().unwrap();
        assert_eq!(e.tag(), Tag(0x7FE0, 0x0010));
        assert_eq!(e.vr(), VR::OW);
        assert_eq!(e.bytes(), Some(&[0x01, 0x02, 0x03, 0x04][..]));
        assert_eq!(reader.position(), 26);
    }

    // (0008,1140) ReferencedImageSequence, implicit VR, defined length 28
    //   Item, defined length 20
    //     (0028,0010) Rows, length 2, 16
    //     (0028,0011) Columns, length 2, 32
    #[rustfmt::skip]
    const RAW_DEFINED_LENGTH_SQ: &[u8] = &[
        0x08, 0x00, 0x40, 0x11, 0x1C, 0x00, 0x00, 0x00,
        0xFE, 0xFF, 0x00, 0xE0, 0x14, 0x00, 0x00, 0x00,
        0x28, 0x00, 0x10, 0x00, 0x02, 0x00, 0x00, 0x00, 0x10, 0x00,
        0x28, 0x00, 0x11, 0x00, 0x02, 0x00, 0x00, 0x00, 0x20, 0x00,
        // (0010,0010) PatientName after the sequence
        0x10, 0x00, 0x10, 0x00, 0x04, 0x00, 0x00, 0x00, b'D', b'o', b'e', b' ',
    ];

    #[test]
    fn defined_length_sequence_becomes_delimited() {
        let dict = StandardDataDictionary::shared();
        let obj = read_object(RAW_DEFINED_LENGTH_SQ, &IMPLICIT_VR_LITTLE_ENDIAN, &*dict).unwrap();
        assert_eq!(obj.len(), 2);
        let sq = obj.element(Tag(0x0008, 0x1140)).unwrap();
        assert_eq!(sq.vr(), VR::SQ);
        let items = sq.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].element(Tag(0x0028, 0x0010)).unwrap().to_u16().unwrap(), 16);
        assert_eq!(items[0].element(Tag(0x0028, 0x0011)).unwrap().to_u16().unwrap(), 32);
        assert_eq!(obj.element(Tag(0x0010, 0x0010)).unwrap().to_str().unwrap(), "Doe");
    }

    #[test]
    fn sequence_overrun_is_an_error() {
        let dict = StandardDataDictionary::shared();
        let mut raw = RAW_DEFINED_LENGTH_SQ.to_vec();
        // sequence length too short to hold its item
        raw[4] = 0x10;
        assert_matches!(
            read_object(&raw, &IMPLICIT_VR_LITTLE_ENDIAN, &*dict),
            Err(Error::SequenceOverrun { .. }) | Err(Error::UnbalancedDelimiter { .. })
        );
    }

    #[test]
    fn truncated_sequence_is_an_error() {
        let dict = StandardDataDictionary::shared();
        assert_matches!(
            read_object(&RAW_DEFINED_LENGTH_SQ[..26], &IMPLICIT_VR_LITTLE_ENDIAN, &*dict),
            Err(Error::UnexpectedEndOfSequence { .. })
        );
    }

    #[test]
    fn stray_item_delimiter_is_an_error() {
        let dict = StandardDataDictionary::shared();
        #[rustfmt::skip]
        let raw: &[u8] = &[0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00];
        assert_matches!(
            read_object(raw, &IMPLICIT_VR_LITTLE_ENDIAN, &*dict),
            Err(Error::UnbalancedDelimiter { tag: ITEM_DELIMITER, .. })
        );
    }

    #[test]
    fn truncated_value_is_an_error() {
        let dict = StandardDataDictionary::shared();
        assert_matches!(
            read_object(&RAW_EXPLICIT[..20], &EXPLICIT_VR_LITTLE_ENDIAN, &*dict),
            Err(Error::ReadValue { len: 26, .. })
        );
        assert_matches!(
            read_object(&RAW_EXPLICIT[..2], &EXPLICIT_VR_LITTLE_ENDIAN, &*dict),
            Err(Error::TruncatedHeader { position: 2 })
        );
    }

    #[test]
    fn implicit_vr_from_dictionary() {
        let dict = StandardDataDictionary::shared();
        #[rustfmt::skip]
        let raw: &[u8] = &[
            // (0028,0010) Rows = 256
            0x28, 0x00, 0x10, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01,
            // (0009,1001) private, 2 bytes
            0x09, 0x00, 0x01, 0x10, 0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD,
        ];
        let obj = read_object(raw, &IMPLICIT_VR_LITTLE_ENDIAN, &*dict).unwrap();
        let rows = obj.element(Tag(0x0028, 0x0010)).unwrap();
        assert_eq!(rows.vr(), VR::US);
        assert_eq!(rows.to_u16().unwrap(), 256);
        let private = obj.element(Tag(0x0009, 0x1001)).unwrap();
        assert_eq!(private.vr(), VR::UN);
        // not swapped
        assert_eq!(private.bytes(), Some(&[0xAB, 0xCD][..]));
    }
}
