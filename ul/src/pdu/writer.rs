//! Serialization of PDUs into a byte sink.
//!
//! The payload of each PDU is assembled in memory,
//! then written out in a single [frame](super::frame).
use std::borrow::Cow;
use std::io::Write;

use dcmlink_encoding::text::{DefaultCharacterSetCodec, EncodeTextError, TextCodec};
use snafu::{ensure, ResultExt, Snafu};

use crate::pdu::frame::{write_item_frame, write_pdu_frame, FrameError};
use crate::pdu::*;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum WriteError {
    #[snafu(display("Could not encode field `{}`", field))]
    EncodeField {
        field: &'static str,
        source: EncodeTextError,
    },

    #[snafu(display("`{}` is {} bytes long, at most 16 are allowed", field, length))]
    AeTitleTooLong { field: &'static str, length: usize },

    #[snafu(display("Could not write {}", name))]
    WriteFrame {
        /// the name of the PDU or item being written
        name: &'static str,
        source: FrameError,
    },

    #[snafu(display("{} payload of {} bytes does not fit its length field", name, length))]
    PayloadTooLong { name: &'static str, length: usize },
}

pub type Result<T, E = WriteError> = std::result::Result<T, E>;

/// Write a single PDU to the given sink.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write + ?Sized,
{
    let (name, payload): (&'static str, Cow<'_, [u8]>) = match pdu {
        Pdu::AssociationRQ(rq) => ("A-ASSOCIATE-RQ", association_rq(rq)?.into()),
        Pdu::AssociationAC(ac) => ("A-ASSOCIATE-AC", association_ac(ac)?.into()),
        Pdu::AssociationRJ(rj) => ("A-ASSOCIATE-RJ", rejection(rj).into()),
        Pdu::PData { data } => ("P-DATA-TF", pdata(data).into()),
        Pdu::ReleaseRQ => ("A-RELEASE-RQ", Cow::Borrowed(&[0; 4][..])),
        Pdu::ReleaseRP => ("A-RELEASE-RP", Cow::Borrowed(&[0; 4][..])),
        Pdu::AbortRQ { source } => ("A-ABORT", abort(source).into()),
        Pdu::Unknown { data, .. } => ("unknown PDU", Cow::Borrowed(data.as_slice())),
    };
    ensure!(
        u32::try_from(payload.len()).is_ok(),
        PayloadTooLongSnafu {
            name,
            length: payload.len()
        }
    );
    write_pdu_frame(writer, pdu.pdu_type(), &payload).context(WriteFrameSnafu { name })
}

/// The payload of a PDU or item under construction.
#[derive(Debug, Default)]
struct Payload(Vec<u8>);

impl Payload {
    fn u8(&mut self, value: u8) {
        self.0.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.0.extend_from_slice(&value.to_be_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.0.extend_from_slice(&value.to_be_bytes());
    }

    fn reserved(&mut self, len: usize) {
        self.0.resize(self.0.len() + len, 0);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn text(&mut self, text: &str, field: &'static str) -> Result<()> {
        let bytes = DefaultCharacterSetCodec
            .encode(text)
            .context(EncodeFieldSnafu { field })?;
        self.bytes(&bytes);
        Ok(())
    }

    /// AE titles occupy 16 bytes, padded with spaces.
    fn ae_title(&mut self, ae_title: &str, field: &'static str) -> Result<()> {
        let mut bytes = DefaultCharacterSetCodec
            .encode(ae_title)
            .context(EncodeFieldSnafu { field })?;
        ensure!(
            bytes.len() <= 16,
            AeTitleTooLongSnafu {
                field,
                length: bytes.len()
            }
        );
        bytes.resize(16, b' ');
        self.bytes(&bytes);
        Ok(())
    }

    fn item(&mut self, item_type: u8, name: &'static str, content: Payload) -> Result<()> {
        write_item_frame(&mut self.0, item_type, &content.0).context(WriteFrameSnafu { name })
    }

    fn text_item(&mut self, item_type: u8, name: &'static str, text: &str) -> Result<()> {
        let mut content = Payload::default();
        content.text(text, name)?;
        self.item(item_type, name, content)
    }
}

fn association_rq(rq: &AssociationRQ) -> Result<Vec<u8>> {
    let mut payload = association_header(
        rq.protocol_version,
        &rq.called_ae_title,
        &rq.calling_ae_title,
        &rq.application_context_name,
    )?;
    for pc in &rq.presentation_contexts {
        let mut item = Payload::default();
        item.u8(pc.id);
        item.reserved(3);
        item.text_item(ABSTRACT_SYNTAX_SUB_ITEM, "Abstract Syntax Sub-Item", &pc.abstract_syntax)?;
        for ts in &pc.transfer_syntaxes {
            item.text_item(TRANSFER_SYNTAX_SUB_ITEM, "Transfer Syntax Sub-Item", ts)?;
        }
        payload.item(PRESENTATION_CONTEXT_RQ_ITEM, "Presentation Context Item", item)?;
    }
    user_information(&mut payload, &rq.user_variables)?;
    Ok(payload.0)
}

fn association_ac(ac: &AssociationAC) -> Result<Vec<u8>> {
    let mut payload = association_header(
        ac.protocol_version,
        &ac.called_ae_title,
        &ac.calling_ae_title,
        &ac.application_context_name,
    )?;
    for pc in &ac.presentation_contexts {
        let mut item = Payload::default();
        item.u8(pc.id);
        item.reserved(1);
        item.u8(pc.reason.code());
        item.reserved(1);
        item.text_item(TRANSFER_SYNTAX_SUB_ITEM, "Transfer Syntax Sub-Item", &pc.transfer_syntax)?;
        payload.item(PRESENTATION_CONTEXT_AC_ITEM, "Presentation Context Item", item)?;
    }
    user_information(&mut payload, &ac.user_variables)?;
    Ok(payload.0)
}

/// The fixed fields of A-ASSOCIATE-RQ and A-ASSOCIATE-AC,
/// followed by the application context item.
fn association_header(
    protocol_version: u16,
    called_ae_title: &str,
    calling_ae_title: &str,
    application_context_name: &str,
) -> Result<Payload> {
    let mut payload = Payload::default();
    payload.u16(protocol_version);
    payload.reserved(2);
    payload.ae_title(called_ae_title, "Called-AE-title")?;
    payload.ae_title(calling_ae_title, "Calling-AE-title")?;
    payload.reserved(32);
    payload.text_item(
        APPLICATION_CONTEXT_ITEM,
        "Application Context Item",
        application_context_name,
    )?;
    Ok(payload)
}

fn user_information(payload: &mut Payload, user_variables: &[UserVariableItem]) -> Result<()> {
    let mut items = Payload::default();
    for variable in user_variables {
        match variable {
            UserVariableItem::MaxLength(max_length) => {
                let mut content = Payload::default();
                content.u32(*max_length);
                items.item(MAX_LENGTH_SUB_ITEM, "Maximum Length Sub-Item", content)?;
            }
            UserVariableItem::ImplementationClassUID(uid) => items.text_item(
                IMPLEMENTATION_CLASS_UID_SUB_ITEM,
                "Implementation Class UID Sub-Item",
                uid,
            )?,
            UserVariableItem::RoleSelection {
                sop_class_uid,
                scu_role,
                scp_role,
            } => {
                let mut uid = Payload::default();
                uid.text(sop_class_uid, "SOP-class-uid")?;
                let uid_length = u16::try_from(uid.0.len()).map_err(|_| {
                    PayloadTooLongSnafu {
                        name: "SOP-class-uid",
                        length: uid.0.len(),
                    }
                    .build()
                })?;
                let mut content = Payload::default();
                content.u16(uid_length);
                content.bytes(&uid.0);
                content.u8(u8::from(*scu_role));
                content.u8(u8::from(*scp_role));
                items.item(
                    ROLE_SELECTION_SUB_ITEM,
                    "SCP/SCU Role Selection Sub-Item",
                    content,
                )?;
            }
            UserVariableItem::ImplementationVersionName(name) => items.text_item(
                IMPLEMENTATION_VERSION_NAME_SUB_ITEM,
                "Implementation Version Name Sub-Item",
                name,
            )?,
            UserVariableItem::Unknown { item_type, data } => {
                let mut content = Payload::default();
                content.bytes(data);
                items.item(*item_type, "Unknown Sub-Item", content)?;
            }
        }
    }
    payload.item(USER_INFORMATION_ITEM, "User Information Item", items)
}

fn rejection(rj: &AssociationRJ) -> Vec<u8> {
    let (source, reason) = rj.source.codes();
    vec![0, rj.result.code(), source, reason]
}

fn abort(source: &AbortRQSource) -> Vec<u8> {
    let (source, reason) = source.codes();
    vec![0, 0, source, reason]
}

fn pdata(values: &[PDataValue]) -> Vec<u8> {
    let len = values
        .iter()
        .map(|v| PDV_HEADER_SIZE as usize + v.data.len())
        .sum();
    let mut payload = Payload(Vec::with_capacity(len));
    for value in values {
        // the item length covers the context ID and the control header
        payload.u32(value.data.len() as u32 + 2);
        payload.u8(value.presentation_context_id);
        payload.u8(value.control_header());
        payload.bytes(&value.data);
    }
    payload.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::reader::read_pdu;
    use matches::assert_matches;

    fn roundtrip(pdu: &Pdu) -> Pdu {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, pdu).unwrap();
        read_pdu(&mut bytes.as_slice(), MAXIMUM_PDU_SIZE, true).unwrap()
    }

    #[test]
    fn association_rq_layout() {
        let rq = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "STORE-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![
                PresentationContextProposed {
                    id: 1,
                    abstract_syntax: "1.2.840.10008.1.1".to_string(),
                    transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
                },
                PresentationContextProposed {
                    id: 3,
                    abstract_syntax: "1.2.840.10008.5.1.4.1.1.2".to_string(),
                    transfer_syntaxes: vec![
                        "1.2.840.10008.1.2.1".to_string(),
                        "1.2.840.10008.1.2".to_string(),
                    ],
                },
            ],
            user_variables: vec![
                UserVariableItem::MaxLength(16_384),
                UserVariableItem::ImplementationClassUID("1.2.3.4".to_string()),
                UserVariableItem::RoleSelection {
                    sop_class_uid: "1.2.840.10008.1.1".to_string(),
                    scu_role: true,
                    scp_role: false,
                },
                UserVariableItem::ImplementationVersionName("DCMLINK".to_string()),
            ],
        });
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &rq).unwrap();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[2..6], &(bytes.len() as u32 - 6).to_be_bytes());
        // protocol version, reserved
        assert_eq!(&bytes[6..10], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[10..26], b"ANY-SCP         ");
        assert_eq!(&bytes[26..42], b"STORE-SCU       ");
        assert!(bytes[42..74].iter().all(|&b| b == 0));
        // application context item
        assert_eq!(&bytes[74..78], &[0x10, 0x00, 0x00, 21]);
        assert_eq!(&bytes[78..99], b"1.2.840.10008.3.1.1.1");
        // first presentation context item
        assert_eq!(bytes[99], 0x20);
        assert_eq!(bytes[103], 1);

        assert_eq!(roundtrip(&rq), rq);
    }

    #[test]
    fn association_ac_roundtrip() {
        let ac = Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            calling_ae_title: "STORE-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![
                PresentationContextResult {
                    id: 1,
                    reason: PresentationContextResultReason::Acceptance,
                    transfer_syntax: "1.2.840.10008.1.2".to_string(),
                },
                PresentationContextResult {
                    id: 3,
                    reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                    transfer_syntax: "1.2.840.10008.1.2".to_string(),
                },
            ],
            user_variables: vec![
                UserVariableItem::MaxLength(0),
                UserVariableItem::Unknown {
                    item_type: 0x58,
                    data: vec![1, 2, 3],
                },
            ],
        });
        assert_eq!(roundtrip(&ac), ac);
    }

    #[test]
    fn small_pdus_roundtrip() {
        let pdus = [
            Pdu::AssociationRJ(AssociationRJ {
                result: AssociationRJResult::Permanent,
                source: AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                ),
            }),
            Pdu::ReleaseRQ,
            Pdu::ReleaseRP,
            Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(
                    AbortRQServiceProviderReason::UnexpectedPdu,
                ),
            },
            Pdu::PData {
                data: vec![
                    PDataValue {
                        presentation_context_id: 1,
                        value_type: PDataValueType::Command,
                        is_last: true,
                        data: vec![0xAB; 10],
                    },
                    PDataValue {
                        presentation_context_id: 1,
                        value_type: PDataValueType::Data,
                        is_last: false,
                        data: vec![0xCD; 7],
                    },
                ],
            },
        ];
        for pdu in pdus {
            assert_eq!(roundtrip(&pdu), pdu);
        }
    }

    #[test]
    fn release_and_abort_bytes() {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &Pdu::ReleaseRQ).unwrap();
        assert_eq!(bytes, [0x05, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]);

        bytes.clear();
        write_pdu(
            &mut bytes,
            &Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            },
        )
        .unwrap();
        assert_eq!(bytes, [0x07, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn strict_mode_refuses_large_pdus() {
        let pdu = Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Data,
                is_last: true,
                data: vec![0; 5000],
            }],
        };
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();
        assert_matches!(
            read_pdu(&mut bytes.as_slice(), 4096, true),
            Err(ReadError::PduTooLarge {
                pdu_length: 5006,
                max_pdu_length: 4096
            })
        );
        assert_eq!(read_pdu(&mut bytes.as_slice(), 4096, false).unwrap(), pdu);
    }

    #[test]
    fn long_ae_titles_are_refused() {
        let rq = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "STORE-SCU".to_string(),
            called_ae_title: "A-VERY-LONG-AE-TITLE".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![],
            user_variables: vec![],
        });
        let mut bytes = Vec::new();
        assert_matches!(
            write_pdu(&mut bytes, &rq),
            Err(WriteError::AeTitleTooLong {
                field: "Called-AE-title",
                length: 20
            })
        );
        assert!(bytes.is_empty());
    }
}
