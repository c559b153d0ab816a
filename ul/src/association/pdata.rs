//! Fragmentation of DIMSE messages into P-DATA-TF PDUs.
//!
//! A message is written into a buffer holding a P-DATA-TF PDU under
//! construction. The PDU header, the value item length
//! and the message control header are placeholders
//! until the PDU is cut and sent.
//! Once more data is written than fits in one PDU,
//! the bytes beyond the cut point are handed over
//! to the buffer of the next PDU.
use std::io::Write;

use tracing::trace;

use crate::pdu::{PDataValueType, PDU_HEADER_SIZE, PDV_HEADER_SIZE, P_DATA_TF};

/// Bytes preceding the value data in each PDU:
/// PDU header (6) plus value item header (6).
const HEADER_LEN: usize = (PDU_HEADER_SIZE + PDV_HEADER_SIZE) as usize;

/// The most value data which one P-DATA-TF PDU of the given maximum length can carry.
fn calculate_max_data_len_single(max_pdu_length: u32) -> usize {
    // a PDU length field of `max_pdu_length` covers
    // the value item length (4), context ID (1) and control header (1)
    (max_pdu_length.saturating_sub(PDV_HEADER_SIZE) as usize).max(1)
}

/// Patch the P-Data PDU header in `buffer` for sending.
fn setup_pdata_header(buffer: &mut [u8], value_type: PDataValueType, is_last: bool) {
    let data_len = (buffer.len() - HEADER_LEN) as u32;

    // full PDU length (minus PDU type and reserved byte)
    let pdu_len = data_len + PDV_HEADER_SIZE;
    buffer[2..6].copy_from_slice(&pdu_len.to_be_bytes());

    // presentation data value length (data + context ID + control header)
    let pdv_len = data_len + 2;
    buffer[6..10].copy_from_slice(&pdv_len.to_be_bytes());

    // message control header
    let mut header = 0;
    if value_type == PDataValueType::Command {
        header |= 0x01;
    }
    if is_last {
        header |= 0x02;
    }
    buffer[11] = header;
}

fn new_buffer(presentation_context_id: u8) -> Vec<u8> {
    vec![
        // PDU-type + reserved byte
        P_DATA_TF,
        0x00,
        // full PDU length, unknown at this point
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        // presentation data length, unknown at this point
        0xFF,
        0xFF,
        0xFF,
        0xFF,
        presentation_context_id,
        // message control header, unknown at this point
        0xFF,
    ]
}

/// A P-Data value writer.
///
/// Using this as a [standard writer](std::io::Write)
/// splits the incoming bytes of one message
/// into as many P-DATA-TF PDUs as needed,
/// none of them longer than the maximum PDU length given.
/// Only the PDU emitted by [`finish`](PDataWriter::finish)
/// is marked as the last fragment.
#[must_use]
#[derive(Debug)]
pub struct PDataWriter<W: Write> {
    stream: W,
    presentation_context_id: u8,
    value_type: PDataValueType,
    buffer: Vec<u8>,
    max_data_len: usize,
    pdus_sent: usize,
}

impl<W> PDataWriter<W>
where
    W: Write,
{
    /// Construct a new P-Data value writer.
    ///
    /// `max_pdu_length` is the maximum value of the PDU-length property
    /// admitted by the receiving node.
    pub fn new(
        stream: W,
        presentation_context_id: u8,
        value_type: PDataValueType,
        max_pdu_length: u32,
    ) -> Self {
        let max_data_len = calculate_max_data_len_single(max_pdu_length);
        let mut buffer = new_buffer(presentation_context_id);
        buffer.reserve(max_data_len.min(1 << 20));
        PDataWriter {
            stream,
            presentation_context_id,
            value_type,
            buffer,
            max_data_len,
            pdus_sent: 0,
        }
    }

    /// Declare to have finished the message,
    /// emitting the last P-Data fragment PDU.
    ///
    /// Returns the number of PDUs sent for the whole message.
    pub fn finish(mut self) -> std::io::Result<usize> {
        setup_pdata_header(&mut self.buffer, self.value_type, true);
        self.stream.write_all(&self.buffer)?;
        self.pdus_sent += 1;
        trace!(
            "Sent {:?} message in {} P-DATA-TF PDUs",
            self.value_type,
            self.pdus_sent
        );
        Ok(self.pdus_sent)
    }

    /// Cut and send full PDUs for as long as the buffer holds
    /// more data than fits in one.
    fn dispatch_full_pdus(&mut self) -> std::io::Result<()> {
        while self.buffer.len() - HEADER_LEN > self.max_data_len {
            // hand over the bytes beyond the cut point to the next PDU
            let carry_over = self.buffer.split_off(HEADER_LEN + self.max_data_len);
            let mut current = std::mem::replace(
                &mut self.buffer,
                new_buffer(self.presentation_context_id),
            );
            self.buffer.extend_from_slice(&carry_over);

            setup_pdata_header(&mut current, self.value_type, false);
            self.stream.write_all(&current)?;
            self.pdus_sent += 1;
        }
        Ok(())
    }
}

impl<W> Write for PDataWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dispatch_full_pdus()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{read_pdu, Pdu, MAXIMUM_PDU_SIZE};

    fn collect_pdus(mut bytes: &[u8]) -> Vec<Pdu> {
        let mut pdus = vec![];
        while !bytes.is_empty() {
            pdus.push(read_pdu(&mut bytes, MAXIMUM_PDU_SIZE, true).unwrap());
        }
        pdus
    }

    #[test]
    fn small_message_is_one_pdu() {
        let mut out = Vec::new();
        let mut writer = PDataWriter::new(&mut out, 3, PDataValueType::Command, 16_384);
        writer.write_all(&[0x55; 100]).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);

        let pdus = collect_pdus(&out);
        assert_eq!(pdus.len(), 1);
        match &pdus[0] {
            Pdu::PData { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].presentation_context_id, 3);
                assert_eq!(data[0].value_type, PDataValueType::Command);
                assert!(data[0].is_last);
                assert_eq!(data[0].data, vec![0x55; 100]);
            }
            pdu => panic!("Expected PData, got {:?}", pdu),
        }
    }

    #[test]
    fn exact_fill_waits_for_finish() {
        let mut out = Vec::new();
        let mut writer = PDataWriter::new(&mut out, 1, PDataValueType::Data, 64);
        writer.write_all(&[1; 58]).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);
        assert_eq!(out.len(), 6 + 64);
        assert_eq!(&out[2..6], &64_u32.to_be_bytes());
        assert_eq!(out[11], 0x02);
    }

    #[test]
    fn empty_message_still_sends_last_fragment() {
        let mut out = Vec::new();
        let writer = PDataWriter::new(&mut out, 1, PDataValueType::Data, 64);
        assert_eq!(writer.finish().unwrap(), 1);
        assert_eq!(out, [0x04, 0x00, 0, 0, 0, 6, 0, 0, 0, 2, 1, 0x02]);
    }

    #[test]
    fn data_split_across_writes() {
        let mut out = Vec::new();
        let mut writer = PDataWriter::new(&mut out, 5, PDataValueType::Data, 100);
        let data: Vec<u8> = (0..=255).collect();
        for chunk in data.chunks(7) {
            writer.write_all(chunk).unwrap();
        }
        // 94 bytes per PDU
        assert_eq!(writer.finish().unwrap(), 3);

        let pdus = collect_pdus(&out);
        let mut collected = vec![];
        for (i, pdu) in pdus.iter().enumerate() {
            match pdu {
                Pdu::PData { data } => {
                    assert_eq!(data[0].is_last, i == 2);
                    collected.extend_from_slice(&data[0].data);
                }
                pdu => panic!("Expected PData, got {:?}", pdu),
            }
        }
        assert_eq!(collected, data);
    }
}
