//! Interpretation of PDUs read from a byte source.
use std::io::{Cursor, Read};

use byteordered::byteorder::{BigEndian, ReadBytesExt};
use dcmlink_encoding::text::{DecodeTextError, DefaultCharacterSetCodec, TextCodec};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::warn;

use crate::pdu::frame::{read_n, FrameError, RawItem};
use crate::pdu::*;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    /// The stream ended before the start of a new PDU.
    #[snafu(display("No PDU available"))]
    NoPduAvailable,

    #[snafu(display("Could not read PDU"))]
    ReadPdu { source: std::io::Error },

    #[snafu(display("Could not read PDU field `{}`", field))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("Could not decode text of `{}`", field))]
    DecodeText {
        field: &'static str,
        source: DecodeTextError,
    },

    #[snafu(display("Could not read item in {}", context))]
    ReadItem {
        context: &'static str,
        source: FrameError,
    },

    #[snafu(display(
        "Incoming PDU was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge { pdu_length: u32, max_pdu_length: u32 },

    #[snafu(display("Unexpected item of type {:#04x} in {}", item_type, context))]
    UnexpectedItemType {
        item_type: u8,
        context: &'static str,
    },

    #[snafu(display("Invalid item length {}", length))]
    InvalidItemLength { length: u32 },

    #[snafu(display("Missing application context name"))]
    MissingApplicationContextName,

    #[snafu(display("Missing abstract syntax in presentation context {}", id))]
    MissingAbstractSyntax { id: u8 },

    #[snafu(display("Missing transfer syntax in presentation context {}", id))]
    MissingTransferSyntax { id: u8 },

    #[snafu(display("Invalid presentation context result reason {}", reason))]
    InvalidPresentationContextResultReason { reason: u8 },

    #[snafu(display("Invalid reject result, source or reason ({}, {}, {})", result, source_code, reason))]
    InvalidRejectSourceOrReason {
        result: u8,
        source_code: u8,
        reason: u8,
    },

    #[snafu(display("Invalid abort source or reason ({}, {})", source_code, reason))]
    InvalidAbortSourceOrReason { source_code: u8, reason: u8 },
}

pub type Result<T, E = ReadError> = std::result::Result<T, E>;

/// Read and interpret the next PDU from the given source.
///
/// `max_pdu_length` is the maximum PDU length
/// which this node is willing to receive.
/// In strict mode, larger PDUs are refused.
/// Otherwise, they are admitted with a warning
/// up to [`MAXIMUM_PDU_SIZE`].
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Pdu>
where
    R: Read + ?Sized,
{
    let mut pdu_type = [0; 1];
    match reader.read_exact(&mut pdu_type) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return NoPduAvailableSnafu.fail()
        }
        Err(e) => return Err(e).context(ReadPduSnafu),
    }
    // the reserved byte is not tested
    reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Reserved" })?;
    let pdu_length = reader
        .read_u32::<BigEndian>()
        .context(ReadPduFieldSnafu { field: "PDU-length" })?;
    check_length(pdu_length, max_pdu_length, strict)?;

    let bytes = read_n(reader, pdu_length).context(ReadPduSnafu)?;
    parse_pdu(pdu_type[0], bytes)
}

fn check_length(pdu_length: u32, max_pdu_length: u32, strict: bool) -> Result<()> {
    if pdu_length <= max_pdu_length {
        return Ok(());
    }
    let limit = if strict {
        max_pdu_length
    } else {
        MAXIMUM_PDU_SIZE
    };
    ensure!(
        pdu_length <= limit,
        PduTooLargeSnafu {
            pdu_length,
            max_pdu_length: limit
        }
    );
    warn!(
        "Admitting PDU of {} bytes, above the maximum of {}",
        pdu_length, max_pdu_length
    );
    Ok(())
}

/// Interpret the payload of a PDU of the given type.
///
/// Types unknown to this implementation
/// are kept as [`Pdu::Unknown`].
pub fn parse_pdu(pdu_type: u8, bytes: Vec<u8>) -> Result<Pdu> {
    match pdu_type {
        ASSOCIATE_RQ | ASSOCIATE_AC => parse_association(pdu_type, &bytes),
        ASSOCIATE_RJ => parse_rejection(&bytes),
        P_DATA_TF => parse_pdata(&bytes),
        RELEASE_RQ => Ok(Pdu::ReleaseRQ),
        RELEASE_RP => Ok(Pdu::ReleaseRP),
        ABORT_RQ => parse_abort(&bytes),
        _ => Ok(Pdu::Unknown {
            pdu_type,
            data: bytes,
        }),
    }
}

/// Sequential reading of the fields of a PDU or item payload.
struct Fields<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Fields<'a> {
    fn new(data: &'a [u8]) -> Self {
        Fields {
            cursor: Cursor::new(data),
        }
    }

    fn has_remaining(&self) -> bool {
        (self.cursor.position() as usize) < self.cursor.get_ref().len()
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        self.cursor.read_u8().context(ReadPduFieldSnafu { field })
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        self.cursor
            .read_u16::<BigEndian>()
            .context(ReadPduFieldSnafu { field })
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        self.cursor
            .read_u32::<BigEndian>()
            .context(ReadPduFieldSnafu { field })
    }

    fn bytes(&mut self, len: u32, field: &'static str) -> Result<Vec<u8>> {
        read_n(&mut self.cursor, len).context(ReadPduFieldSnafu { field })
    }

    fn reserved(&mut self, len: u32) -> Result<()> {
        self.bytes(len, "Reserved").map(drop)
    }

    fn ae_title(&mut self, field: &'static str) -> Result<String> {
        let bytes = self.bytes(16, field)?;
        Ok(read_text(&bytes, field)?.trim().to_string())
    }

    /// Read the remaining content as a sequence of items.
    fn items(&mut self, context: &'static str) -> Result<Vec<RawItem>> {
        let mut items = Vec::new();
        while self.has_remaining() {
            items.push(RawItem::read_from(&mut self.cursor).context(ReadItemSnafu { context })?);
        }
        Ok(items)
    }
}

fn read_text(bytes: &[u8], field: &'static str) -> Result<String> {
    DefaultCharacterSetCodec
        .decode(bytes)
        .context(DecodeTextSnafu { field })
}

fn read_uid(bytes: &[u8]) -> Result<String> {
    let text = read_text(bytes, "UID")?;
    Ok(text.trim_end_matches(|c| c == '\0' || c == ' ').to_string())
}

fn parse_association(pdu_type: u8, data: &[u8]) -> Result<Pdu> {
    let is_request = pdu_type == ASSOCIATE_RQ;
    let context = if is_request {
        "A-ASSOCIATE-RQ"
    } else {
        "A-ASSOCIATE-AC"
    };

    let mut fields = Fields::new(data);
    let protocol_version = fields.u16("Protocol-version")?;
    fields.reserved(2)?;
    let called_ae_title = fields.ae_title("Called-AE-title")?;
    let calling_ae_title = fields.ae_title("Calling-AE-title")?;
    fields.reserved(32)?;

    let mut application_context_name = None;
    let mut proposed = Vec::new();
    let mut results = Vec::new();
    let mut user_variables = Vec::new();
    for item in fields.items(context)? {
        match item.item_type {
            APPLICATION_CONTEXT_ITEM => application_context_name = Some(read_uid(&item.data)?),
            PRESENTATION_CONTEXT_RQ_ITEM if is_request => {
                proposed.push(parse_presentation_context_proposed(&item.data)?)
            }
            PRESENTATION_CONTEXT_AC_ITEM if !is_request => {
                results.push(parse_presentation_context_result(&item.data)?)
            }
            item_type @ (PRESENTATION_CONTEXT_RQ_ITEM | PRESENTATION_CONTEXT_AC_ITEM) => {
                return UnexpectedItemTypeSnafu { item_type, context }.fail()
            }
            USER_INFORMATION_ITEM => user_variables = parse_user_information(&item.data)?,
            item_type => warn!("Ignoring unknown item {:#04x} in {}", item_type, context),
        }
    }
    let application_context_name =
        application_context_name.context(MissingApplicationContextNameSnafu)?;

    Ok(if is_request {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts: proposed,
            user_variables,
        })
    } else {
        Pdu::AssociationAC(AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts: results,
            user_variables,
        })
    })
}

fn parse_presentation_context_proposed(data: &[u8]) -> Result<PresentationContextProposed> {
    const CONTEXT: &str = "presentation context item";
    let mut fields = Fields::new(data);
    let id = fields.u8("Presentation-context-ID")?;
    fields.reserved(3)?;

    let mut abstract_syntax = None;
    let mut transfer_syntaxes = Vec::new();
    for sub_item in fields.items(CONTEXT)? {
        match sub_item.item_type {
            ABSTRACT_SYNTAX_SUB_ITEM => abstract_syntax = Some(read_uid(&sub_item.data)?),
            TRANSFER_SYNTAX_SUB_ITEM => transfer_syntaxes.push(read_uid(&sub_item.data)?),
            item_type => {
                return UnexpectedItemTypeSnafu {
                    item_type,
                    context: CONTEXT,
                }
                .fail()
            }
        }
    }

    Ok(PresentationContextProposed {
        id,
        abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu { id })?,
        transfer_syntaxes,
    })
}

fn parse_presentation_context_result(data: &[u8]) -> Result<PresentationContextResult> {
    const CONTEXT: &str = "presentation context item";
    let mut fields = Fields::new(data);
    let id = fields.u8("Presentation-context-ID")?;
    fields.reserved(1)?;
    let code = fields.u8("Result/Reason")?;
    let reason = PresentationContextResultReason::from_code(code)
        .context(InvalidPresentationContextResultReasonSnafu { reason: code })?;
    fields.reserved(1)?;

    let mut transfer_syntax = None;
    for sub_item in fields.items(CONTEXT)? {
        ensure!(
            sub_item.item_type == TRANSFER_SYNTAX_SUB_ITEM,
            UnexpectedItemTypeSnafu {
                item_type: sub_item.item_type,
                context: CONTEXT,
            }
        );
        if transfer_syntax.is_none() {
            transfer_syntax = Some(read_uid(&sub_item.data)?);
        }
    }
    // only an accepted context needs a meaningful transfer syntax
    let transfer_syntax = match transfer_syntax {
        Some(ts) => ts,
        None if reason != PresentationContextResultReason::Acceptance => String::new(),
        None => return MissingTransferSyntaxSnafu { id }.fail(),
    };

    Ok(PresentationContextResult {
        id,
        reason,
        transfer_syntax,
    })
}

fn parse_user_information(data: &[u8]) -> Result<Vec<UserVariableItem>> {
    Fields::new(data)
        .items("user information item")?
        .into_iter()
        .map(parse_user_variable)
        .collect()
}

fn parse_user_variable(item: RawItem) -> Result<UserVariableItem> {
    let mut fields = Fields::new(&item.data);
    Ok(match item.item_type {
        MAX_LENGTH_SUB_ITEM => {
            UserVariableItem::MaxLength(fields.u32("Maximum-length-received")?)
        }
        IMPLEMENTATION_CLASS_UID_SUB_ITEM => {
            UserVariableItem::ImplementationClassUID(read_uid(&item.data)?)
        }
        ROLE_SELECTION_SUB_ITEM => {
            let uid_length = fields.u16("UID-length")?;
            let uid = fields.bytes(u32::from(uid_length), "SOP-class-uid")?;
            UserVariableItem::RoleSelection {
                sop_class_uid: read_uid(&uid)?,
                scu_role: fields.u8("SCU-role")? == 1,
                scp_role: fields.u8("SCP-role")? == 1,
            }
        }
        IMPLEMENTATION_VERSION_NAME_SUB_ITEM => UserVariableItem::ImplementationVersionName(
            read_text(&item.data, "Implementation-version-name")?
                .trim()
                .to_string(),
        ),
        item_type => UserVariableItem::Unknown {
            item_type,
            data: item.data,
        },
    })
}

fn parse_rejection(data: &[u8]) -> Result<Pdu> {
    let mut fields = Fields::new(data);
    fields.reserved(1)?;
    let result = fields.u8("Result")?;
    let source_code = fields.u8("Source")?;
    let reason = fields.u8("Reason/Diag.")?;

    let invalid = InvalidRejectSourceOrReasonSnafu {
        result,
        source_code,
        reason,
    };
    Ok(Pdu::AssociationRJ(AssociationRJ {
        result: AssociationRJResult::from_code(result).context(invalid)?,
        source: AssociationRJSource::from_codes(source_code, reason).context(invalid)?,
    }))
}

fn parse_pdata(data: &[u8]) -> Result<Pdu> {
    let mut fields = Fields::new(data);
    let mut values = Vec::new();
    while fields.has_remaining() {
        let length = fields.u32("Item-length")?;
        ensure!(length >= 2, InvalidItemLengthSnafu { length });
        let presentation_context_id = fields.u8("Presentation-context-ID")?;
        // bit 0: command, bit 1: last fragment
        let header = fields.u8("Message Control Header")?;
        let data = fields.bytes(length - 2, "Presentation-data-value")?;
        values.push(PDataValue {
            presentation_context_id,
            value_type: if header & 0x01 != 0 {
                PDataValueType::Command
            } else {
                PDataValueType::Data
            },
            is_last: header & 0x02 != 0,
            data,
        });
    }
    Ok(Pdu::PData { data: values })
}

fn parse_abort(data: &[u8]) -> Result<Pdu> {
    let mut fields = Fields::new(data);
    fields.reserved(2)?;
    let source_code = fields.u8("Source")?;
    let reason = fields.u8("Reason/Diag")?;
    let source = AbortRQSource::from_codes(source_code, reason).context(
        InvalidAbortSourceOrReasonSnafu {
            source_code,
            reason,
        },
    )?;
    Ok(Pdu::AbortRQ { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn empty_source_has_no_pdu() {
        let empty: &[u8] = &[];
        assert_matches!(
            read_pdu(&mut &*empty, DEFAULT_MAX_PDU, true),
            Err(ReadError::NoPduAvailable)
        );
    }

    #[test]
    fn unknown_pdu_type_is_kept() {
        let bytes: &[u8] = &[0x09, 0x00, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB];
        assert_eq!(
            read_pdu(&mut &*bytes, DEFAULT_MAX_PDU, true).unwrap(),
            Pdu::Unknown {
                pdu_type: 0x09,
                data: vec![0xAA, 0xBB]
            }
        );
    }

    #[test]
    fn pdv_item_shorter_than_its_header() {
        let bytes: &[u8] = &[0x04, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x01];
        assert_matches!(
            read_pdu(&mut &*bytes, DEFAULT_MAX_PDU, true),
            Err(ReadError::InvalidItemLength { length: 1 })
        );
    }

    #[test]
    fn invalid_reject_codes() {
        // result 1, source 2, reason 3: not defined for the ACSE provider
        let bytes: &[u8] = &[0x03, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x01, 0x02, 0x03];
        assert_matches!(
            read_pdu(&mut &*bytes, DEFAULT_MAX_PDU, true),
            Err(ReadError::InvalidRejectSourceOrReason {
                result: 1,
                source_code: 2,
                reason: 3
            })
        );
    }

    #[test]
    fn rejected_context_without_transfer_syntax() {
        let item = [0x03, 0x00, 0x03, 0x00];
        let pc = parse_presentation_context_result(&item).unwrap();
        assert_eq!(pc.id, 3);
        assert_eq!(
            pc.reason,
            PresentationContextResultReason::AbstractSyntaxNotSupported
        );
        assert_eq!(pc.transfer_syntax, "");

        let accepted = [0x01, 0x00, 0x00, 0x00];
        assert_matches!(
            parse_presentation_context_result(&accepted),
            Err(ReadError::MissingTransferSyntax { id: 1 })
        );
    }

    #[test]
    fn truncated_item_in_user_information() {
        // a maximum length sub-item claiming 4 bytes, with only 2 present
        let data = [0x51, 0x00, 0x00, 0x04, 0x00, 0x00];
        assert_matches!(
            parse_user_information(&data),
            Err(ReadError::ReadItem {
                context: "user information item",
                ..
            })
        );
    }
}
