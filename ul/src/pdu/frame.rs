//! Raw framing of PDUs and of the items nested in them.
//!
//! A PDU is framed as a type byte, a reserved byte
//! and a 32-bit big endian length, followed by exactly that many bytes.
//! Items use the same shape with a 16-bit length.
//! Framing is always big endian,
//! regardless of the transfer syntax negotiated for the payload.
use byteordered::byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use snafu::{ensure, ResultExt, Snafu};
use std::io::{Read, Write};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum FrameError {
    /// The stream ended before a new frame started.
    #[snafu(display("No frame available"))]
    NoFrameAvailable,

    #[snafu(display("Could not read frame header"))]
    ReadHeader { source: std::io::Error },

    #[snafu(display("Could not read {} bytes of frame content", length))]
    ReadContent {
        length: u32,
        source: std::io::Error,
    },

    #[snafu(display("Expected frame of type {:#04x}, got {:#04x}", expected, got))]
    UnexpectedType { expected: u8, got: u8 },

    #[snafu(display("Item content of {} bytes does not fit in a 16-bit length", length))]
    ItemTooLong { length: usize },

    #[snafu(display("Could not write frame"))]
    WriteFrame { source: std::io::Error },
}

pub type Result<T, E = FrameError> = std::result::Result<T, E>;

/// A PDU as a type code and an uninterpreted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPdu {
    pub pdu_type: u8,
    pub data: Vec<u8>,
}

impl RawPdu {
    /// Read the next PDU from the stream.
    ///
    /// Fails with [`FrameError::NoFrameAvailable`]
    /// if the stream ends cleanly before the first byte.
    pub fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: Read + ?Sized,
    {
        let mut header = [0; 2];
        if let Err(e) = reader.read_exact(&mut header) {
            return if e.kind() == std::io::ErrorKind::UnexpectedEof {
                NoFrameAvailableSnafu.fail()
            } else {
                Err(e).context(ReadHeaderSnafu)
            };
        }
        // byte 1 is reserved and not tested
        let length = reader.read_u32::<BigEndian>().context(ReadHeaderSnafu)?;
        let data = read_n(reader, length).context(ReadContentSnafu { length })?;
        Ok(RawPdu {
            pdu_type: header[0],
            data,
        })
    }

    /// Read the next PDU from the stream,
    /// which must be of the given type.
    pub fn read_expecting<R>(reader: &mut R, expected: u8) -> Result<Vec<u8>>
    where
        R: Read + ?Sized,
    {
        let pdu = RawPdu::read_from(reader)?;
        ensure!(
            pdu.pdu_type == expected,
            UnexpectedTypeSnafu {
                expected,
                got: pdu.pdu_type
            }
        );
        Ok(pdu.data)
    }

    /// Write this PDU to the stream.
    pub fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        write_pdu_frame(writer, self.pdu_type, &self.data)
    }
}

/// Write a PDU frame with the given type and payload.
pub fn write_pdu_frame<W>(writer: &mut W, pdu_type: u8, data: &[u8]) -> Result<()>
where
    W: Write + ?Sized,
{
    (|| {
        writer.write_u8(pdu_type)?;
        writer.write_u8(0)?;
        writer.write_u32::<BigEndian>(data.len() as u32)?;
        writer.write_all(data)
    })()
    .context(WriteFrameSnafu)
}

/// An item nested in a PDU, as a type code and an uninterpreted payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub item_type: u8,
    pub data: Vec<u8>,
}

impl RawItem {
    /// Read the next item from the stream.
    pub fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: Read + ?Sized,
    {
        let mut header = [0; 2];
        reader.read_exact(&mut header).context(ReadHeaderSnafu)?;
        let length = u32::from(reader.read_u16::<BigEndian>().context(ReadHeaderSnafu)?);
        let data = read_n(reader, length).context(ReadContentSnafu { length })?;
        Ok(RawItem {
            item_type: header[0],
            data,
        })
    }

    /// Read the next item from the stream,
    /// which must be of the given type.
    pub fn read_expecting<R>(reader: &mut R, expected: u8) -> Result<Vec<u8>>
    where
        R: Read + ?Sized,
    {
        let item = RawItem::read_from(reader)?;
        ensure!(
            item.item_type == expected,
            UnexpectedTypeSnafu {
                expected,
                got: item.item_type
            }
        );
        Ok(item.data)
    }

    /// Write this item to the stream.
    pub fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write + ?Sized,
    {
        write_item_frame(writer, self.item_type, &self.data)
    }
}

/// Write an item frame with the given type and payload.
pub fn write_item_frame<W>(writer: &mut W, item_type: u8, data: &[u8]) -> Result<()>
where
    W: Write + ?Sized,
{
    ensure!(
        data.len() <= u16::MAX as usize,
        ItemTooLongSnafu { length: data.len() }
    );
    (|| {
        writer.write_u8(item_type)?;
        writer.write_u8(0)?;
        writer.write_u16::<BigEndian>(data.len() as u16)?;
        writer.write_all(data)
    })()
    .context(WriteFrameSnafu)
}

pub(crate) fn read_n<R>(reader: &mut R, bytes_to_read: u32) -> std::io::Result<Vec<u8>>
where
    R: Read + ?Sized,
{
    let mut result = Vec::new();
    reader
        .take(u64::from(bytes_to_read))
        .read_to_end(&mut result)?;
    if result.len() < bytes_to_read as usize {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(70_000)]
    fn pdu_frame_roundtrip(#[case] len: usize) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let pdu = RawPdu {
            pdu_type: 0x04,
            data,
        };
        let mut bytes = Vec::new();
        pdu.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 6 + len);
        assert_eq!(&bytes[2..6], &(len as u32).to_be_bytes());

        let read = RawPdu::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, pdu);
    }

    #[test]
    fn pdu_of_other_type_is_rejected() {
        let mut bytes = Vec::new();
        write_pdu_frame(&mut bytes, 0x05, &[0; 4]).unwrap();
        assert_matches!(
            RawPdu::read_expecting(&mut bytes.as_slice(), 0x06),
            Err(FrameError::UnexpectedType {
                expected: 0x06,
                got: 0x05
            })
        );
        assert_eq!(
            RawPdu::read_expecting(&mut bytes.as_slice(), 0x05).unwrap(),
            vec![0; 4]
        );
    }

    #[test]
    fn item_frame_roundtrip() {
        let item = RawItem {
            item_type: 0x10,
            data: b"1.2.840.10008.3.1.1.1".to_vec(),
        };
        let mut bytes = Vec::new();
        item.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], &[0x10, 0x00, 0x00, 21]);
        assert_eq!(RawItem::read_from(&mut bytes.as_slice()).unwrap(), item);
        assert_matches!(
            RawItem::read_expecting(&mut bytes.as_slice(), 0x20),
            Err(FrameError::UnexpectedType { .. })
        );
    }

    #[test]
    fn oversized_item_is_an_error() {
        let mut bytes = Vec::new();
        assert_matches!(
            write_item_frame(&mut bytes, 0x40, &vec![0; 70_000]),
            Err(FrameError::ItemTooLong { length: 70_000 })
        );
    }

    #[test]
    fn short_frames() {
        let empty: &[u8] = &[];
        assert_matches!(
            RawPdu::read_from(&mut &*empty),
            Err(FrameError::NoFrameAvailable)
        );
        let truncated: &[u8] = &[0x04, 0x00, 0x00, 0x00, 0x00, 0x10, 0x01];
        assert_matches!(
            RawPdu::read_from(&mut &*truncated),
            Err(FrameError::ReadContent { length: 16, .. })
        );
    }
}
