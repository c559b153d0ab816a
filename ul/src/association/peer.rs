//! User information exchanged while an association is negotiated.
use std::io::Write;

use tracing::debug;

use super::send_pdu;
use crate::pdu::{AbortRQSource, Pdu, UserVariableItem, DEFAULT_MAX_PDU};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

/// What the other node declared about itself.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PeerUserInfo {
    pub max_pdu_length: Option<u32>,
    pub implementation_class_uid: Option<String>,
    pub implementation_version_name: Option<String>,
}

impl PeerUserInfo {
    pub fn from_items(items: impl IntoIterator<Item = UserVariableItem>) -> Self {
        items
            .into_iter()
            .fold(PeerUserInfo::default(), |mut info, item| {
                match item {
                    UserVariableItem::MaxLength(len) => info.max_pdu_length = Some(len),
                    UserVariableItem::ImplementationClassUID(uid) => {
                        info.implementation_class_uid = Some(uid)
                    }
                    UserVariableItem::ImplementationVersionName(name) => {
                        info.implementation_version_name = Some(name)
                    }
                    UserVariableItem::RoleSelection { .. } | UserVariableItem::Unknown { .. } => {}
                }
                info
            })
    }

    /// The largest PDU to send to this peer,
    /// bounded by the local maximum.
    /// A declared length of 0 stands for no limit on their side.
    pub fn send_limit(&self, own_max_pdu_length: u32) -> u32 {
        match self.max_pdu_length.unwrap_or(DEFAULT_MAX_PDU) {
            0 => own_max_pdu_length,
            len => len.min(own_max_pdu_length),
        }
    }
}

/// The user information sub-items announced by this implementation,
/// with role selections placed between the class UID and the version name.
pub(crate) fn own_user_variables(
    max_pdu_length: u32,
    roles: impl IntoIterator<Item = UserVariableItem>,
) -> Vec<UserVariableItem> {
    let mut items = vec![
        UserVariableItem::MaxLength(max_pdu_length),
        UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
    ];
    items.extend(roles);
    items.push(UserVariableItem::ImplementationVersionName(
        IMPLEMENTATION_VERSION_NAME.to_string(),
    ));
    items
}

/// Send an A-ABORT while the association is still being set up.
/// Failing to send it is only logged.
pub(crate) fn abort_establishment<W>(writer: &mut W, source: AbortRQSource)
where
    W: Write,
{
    if let Err(e) = send_pdu(writer, &Pdu::AbortRQ { source }) {
        debug!("Could not send A-ABORT: {}", snafu::Report::from_error(e));
    }
}
