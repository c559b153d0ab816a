//! DIMSE command sets.
//!
//! Commands travel as data sets of group 0000,
//! always in implicit VR little endian.
//! This module builds the command sets used by the
//! verification and storage service classes
//! and reads the attributes which drive message dispatch.
use dcmlink_core::{DicomObject, Tag, VrElement, VR};
use dcmlink_dictionary_std::tags;
use dcmlink_encoding::encoded_len;
use dcmlink_encoding::transfer_syntax::IMPLICIT_VR_LITTLE_ENDIAN;
use snafu::{OptionExt, ResultExt, Snafu};

/// Command Field of C-STORE-RQ
pub const C_STORE_RQ: u16 = 0x0001;
/// Command Field of C-STORE-RSP
pub const C_STORE_RSP: u16 = 0x8001;
/// Command Field of C-FIND-RQ
pub const C_FIND_RQ: u16 = 0x0020;
/// Command Field of C-FIND-RSP
pub const C_FIND_RSP: u16 = 0x8020;
/// Command Field of C-MOVE-RQ
pub const C_MOVE_RQ: u16 = 0x0021;
/// Command Field of C-MOVE-RSP
pub const C_MOVE_RSP: u16 = 0x8021;
/// Command Field of C-ECHO-RQ
pub const C_ECHO_RQ: u16 = 0x0030;
/// Command Field of C-ECHO-RSP
pub const C_ECHO_RSP: u16 = 0x8030;

/// Command Data Set Type signalling that no data set follows the command.
pub const NO_DATA_SET: u16 = 0x0101;
/// Command Data Set Type used when a data set follows the command.
pub const DATA_SET_PRESENT: u16 = 0x0000;

pub const PRIORITY_MEDIUM: u16 = 0x0000;
pub const PRIORITY_HIGH: u16 = 0x0001;
pub const PRIORITY_LOW: u16 = 0x0002;

/// Status: success
pub const STATUS_SUCCESS: u16 = 0x0000;
/// Status: refused, out of resources
pub const STATUS_OUT_OF_RESOURCES: u16 = 0xA700;
/// Status: error, data set does not match SOP class
pub const STATUS_DATA_SET_MISMATCH: u16 = 0xA900;
/// Status: error, cannot understand
pub const STATUS_CANNOT_UNDERSTAND: u16 = 0xC000;
/// Status: SOP class not supported
pub const STATUS_SOP_CLASS_NOT_SUPPORTED: u16 = 0x0122;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Command is missing attribute {}", tag))]
    MissingAttribute { tag: Tag },

    #[snafu(display("Invalid value for command attribute {}", tag))]
    InvalidAttribute {
        tag: Tag,
        source: dcmlink_core::Error,
    },

    #[snafu(display("Could not measure command attribute {}", tag))]
    MeasureAttribute {
        tag: Tag,
        source: dcmlink_encoding::encode::Error,
    },

    #[snafu(display("Command group of {} bytes does not fit its length", length))]
    CommandTooLong { length: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classification of a DIMSE status code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusType {
    Success,
    Pending,
    Cancel,
    Warning,
    Failure,
}

impl StatusType {
    pub fn of(status: u16) -> StatusType {
        match status {
            0x0000 => StatusType::Success,
            0xFF00 | 0xFF01 => StatusType::Pending,
            0xFE00 => StatusType::Cancel,
            0x0001 | 0x0107 | 0x0116 | 0xB000..=0xBFFF => StatusType::Warning,
            _ => StatusType::Failure,
        }
    }
}

fn us(tag: Tag, value: u16) -> VrElement {
    VrElement::from_u16s(tag, VR::US, &[value])
}

fn ui(tag: Tag, uid: &str) -> VrElement {
    VrElement::from_str(tag, VR::UI, uid)
}

/// Build a C-ECHO-RQ command set.
pub fn c_echo_rq(message_id: u16) -> DicomObject {
    DicomObject::from_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, dcmlink_dictionary_std::uids::VERIFICATION),
        us(tags::COMMAND_FIELD, C_ECHO_RQ),
        us(tags::MESSAGE_ID, message_id),
        us(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
    ])
}

/// Build a C-ECHO-RSP command set answering the given message.
pub fn c_echo_rsp(message_id: u16, status: u16) -> DicomObject {
    DicomObject::from_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, dcmlink_dictionary_std::uids::VERIFICATION),
        us(tags::COMMAND_FIELD, C_ECHO_RSP),
        us(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id),
        us(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        us(tags::STATUS, status),
    ])
}

/// Build a C-STORE-RQ command set.
/// The data set to store must be sent right after it.
pub fn c_store_rq(
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    priority: u16,
) -> DicomObject {
    DicomObject::from_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid),
        us(tags::COMMAND_FIELD, C_STORE_RQ),
        us(tags::MESSAGE_ID, message_id),
        us(tags::PRIORITY, priority),
        us(tags::COMMAND_DATA_SET_TYPE, DATA_SET_PRESENT),
        ui(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid),
    ])
}

/// Build a C-STORE-RSP command set answering the given message.
pub fn c_store_rsp(
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    status: u16,
) -> DicomObject {
    DicomObject::from_iter([
        ui(tags::AFFECTED_SOP_CLASS_UID, sop_class_uid),
        us(tags::COMMAND_FIELD, C_STORE_RSP),
        us(tags::MESSAGE_ID_BEING_RESPONDED_TO, message_id),
        us(tags::COMMAND_DATA_SET_TYPE, NO_DATA_SET),
        us(tags::STATUS, status),
        ui(tags::AFFECTED_SOP_INSTANCE_UID, sop_instance_uid),
    ])
}

/// Return a copy of the command with a freshly computed
/// Command Group Length (0000,0000) element.
pub fn with_group_length(command: &DicomObject) -> Result<DicomObject> {
    let mut command = command.clone();
    command.remove(tags::COMMAND_GROUP_LENGTH);
    let mut length = 0usize;
    for e in &command {
        length += encoded_len(e, &IMPLICIT_VR_LITTLE_ENDIAN)
            .context(MeasureAttributeSnafu { tag: e.tag() })?;
    }
    let length = u32::try_from(length)
        .ok()
        .context(CommandTooLongSnafu { length })?;
    command.put(VrElement::from_u32s(
        tags::COMMAND_GROUP_LENGTH,
        VR::UL,
        &[length],
    ));
    Ok(command)
}

fn attribute_u16(command: &DicomObject, tag: Tag) -> Result<u16> {
    command
        .get(tag)
        .context(MissingAttributeSnafu { tag })?
        .to_u16()
        .context(InvalidAttributeSnafu { tag })
}

fn attribute_str(command: &DicomObject, tag: Tag) -> Result<String> {
    Ok(command
        .get(tag)
        .context(MissingAttributeSnafu { tag })?
        .to_str()
        .context(InvalidAttributeSnafu { tag })?
        .into_owned())
}

/// The Command Field (0000,0100) of a command set.
pub fn command_field(command: &DicomObject) -> Result<u16> {
    attribute_u16(command, tags::COMMAND_FIELD)
}

/// The Message ID (0000,0110) of a request.
pub fn message_id(command: &DicomObject) -> Result<u16> {
    attribute_u16(command, tags::MESSAGE_ID)
}

/// The Message ID Being Responded To (0000,0120) of a response.
pub fn message_id_responded_to(command: &DicomObject) -> Result<u16> {
    attribute_u16(command, tags::MESSAGE_ID_BEING_RESPONDED_TO)
}

/// The Status (0000,0900) of a response.
pub fn status(command: &DicomObject) -> Result<u16> {
    attribute_u16(command, tags::STATUS)
}

/// Affected SOP Class UID (0000,0002)
pub fn affected_sop_class_uid(command: &DicomObject) -> Result<String> {
    attribute_str(command, tags::AFFECTED_SOP_CLASS_UID)
}

/// Affected SOP Instance UID (0000,1000)
pub fn affected_sop_instance_uid(command: &DicomObject) -> Result<String> {
    attribute_str(command, tags::AFFECTED_SOP_INSTANCE_UID)
}

/// Whether a data set message follows this command,
/// according to its Command Data Set Type (0000,0800).
pub fn has_data_set(command: &DicomObject) -> Result<bool> {
    Ok(attribute_u16(command, tags::COMMAND_DATA_SET_TYPE)? != NO_DATA_SET)
}
