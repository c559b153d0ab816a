//! Protocol Data Unit module
//!
//! This module comprises the data structures representing the
//! protocol data units (PDUs) of the upper layer protocol,
//! the raw framing of PDUs and their nested items
//! (see [`frame`]),
//! and readers and writers of fully interpreted PDUs.
pub mod frame;
pub mod reader;
pub mod writer;

use std::fmt::Display;

pub use frame::{RawItem, RawPdu};
pub use reader::{parse_pdu, read_pdu, ReadError};
pub use writer::{write_pdu, WriteError};

/// The default maximum PDU length proposed by this implementation.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum PDU length which a node is expected to admit.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The maximum PDU length accepted when reading in non-strict mode.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The length of the PDU header:
/// PDU type, reserved byte and the 32-bit length.
pub const PDU_HEADER_SIZE: u32 = 6;

/// The length of the header of a presentation data value item
/// inside a P-DATA-TF PDU:
/// the 32-bit item length, the context ID and the message control header.
pub const PDV_HEADER_SIZE: u32 = 6;

/// The A-ASSOCIATE-RQ PDU type.
pub const ASSOCIATE_RQ: u8 = 0x01;
/// The A-ASSOCIATE-AC PDU type.
pub const ASSOCIATE_AC: u8 = 0x02;
/// The A-ASSOCIATE-RJ PDU type.
pub const ASSOCIATE_RJ: u8 = 0x03;
/// The P-DATA-TF PDU type.
pub const P_DATA_TF: u8 = 0x04;
/// The A-RELEASE-RQ PDU type.
pub const RELEASE_RQ: u8 = 0x05;
/// The A-RELEASE-RP PDU type.
pub const RELEASE_RP: u8 = 0x06;
/// The A-ABORT PDU type.
pub const ABORT_RQ: u8 = 0x07;

/// Application Context Item type.
pub const APPLICATION_CONTEXT_ITEM: u8 = 0x10;
/// Presentation Context Item type in an A-ASSOCIATE-RQ.
pub const PRESENTATION_CONTEXT_RQ_ITEM: u8 = 0x20;
/// Presentation Context Item type in an A-ASSOCIATE-AC.
pub const PRESENTATION_CONTEXT_AC_ITEM: u8 = 0x21;
/// Abstract Syntax Sub-Item type.
pub const ABSTRACT_SYNTAX_SUB_ITEM: u8 = 0x30;
/// Transfer Syntax Sub-Item type.
pub const TRANSFER_SYNTAX_SUB_ITEM: u8 = 0x40;
/// User Information Item type.
pub const USER_INFORMATION_ITEM: u8 = 0x50;
/// Maximum Length Sub-Item type.
pub const MAX_LENGTH_SUB_ITEM: u8 = 0x51;
/// Implementation Class UID Sub-Item type.
pub const IMPLEMENTATION_CLASS_UID_SUB_ITEM: u8 = 0x52;
/// SCP/SCU Role Selection Sub-Item type.
pub const ROLE_SELECTION_SUB_ITEM: u8 = 0x54;
/// Implementation Version Name Sub-Item type.
pub const IMPLEMENTATION_VERSION_NAME_SUB_ITEM: u8 = 0x55;

/// Declares the codes which a PDU field may carry,
/// with their conversions from and to the wire
/// and a description of each code.
macro_rules! wire_codes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $text:literal, )+
        }
        $( reserved $reserved:ident if $range:pat, )?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            $(
                /// A code reserved by the standard.
                $reserved(u8),
            )?
        }

        impl $name {
            /// Interpret a code read from the wire.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some($name::$variant), )+
                    $( c if matches!(c, $range) => Some($name::$reserved(c)), )?
                    _ => None,
                }
            }

            /// The code written to the wire.
            pub fn code(self) -> u8 {
                match self {
                    $( $name::$variant => $code, )+
                    $( $name::$reserved(c) => c, )?
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( $name::$variant => f.write_str($text), )+
                    $( $name::$reserved(c) => write!(f, "reserved code {}", c), )?
                }
            }
        }
    };
}

wire_codes! {
    /// The result of negotiating one presentation context.
    pub enum PresentationContextResultReason {
        Acceptance = 0 => "acceptance",
        UserRejection = 1 => "user rejection",
        NoReason = 2 => "no reason",
        AbstractSyntaxNotSupported = 3 => "abstract syntax not supported",
        TransferSyntaxesNotSupported = 4 => "transfer syntaxes not supported",
    }
}

wire_codes! {
    /// Whether an association rejection is final.
    pub enum AssociationRJResult {
        Permanent = 1 => "rejected permanently",
        Transient = 2 => "rejected transiently",
    }
}

wire_codes! {
    /// Rejection reasons given by the called service user.
    pub enum AssociationRJServiceUserReason {
        NoReasonGiven = 1 => "no reason given",
        ApplicationContextNameNotSupported = 2 => "application context name not supported",
        CallingAETitleNotRecognized = 3 => "calling AE title not recognized",
        CalledAETitleNotRecognized = 7 => "called AE title not recognized",
    }
    reserved Reserved if 4..=6 | 8..=10,
}

wire_codes! {
    /// Rejection reasons given by the ACSE service provider.
    pub enum AssociationRJServiceProviderASCEReason {
        NoReasonGiven = 1 => "no reason given",
        ProtocolVersionNotSupported = 2 => "protocol version not supported",
    }
}

wire_codes! {
    /// Rejection reasons given by the presentation service provider.
    pub enum AssociationRJServiceProviderPresentationReason {
        TemporaryCongestion = 1 => "temporary congestion",
        LocalLimitExceeded = 2 => "local limit exceeded",
    }
    reserved Reserved if 0 | 3..=7,
}

wire_codes! {
    /// Reasons for an A-ABORT issued by the service provider.
    pub enum AbortRQServiceProviderReason {
        ReasonNotSpecified = 0 => "reason not specified",
        UnrecognizedPdu = 1 => "unrecognized PDU",
        UnexpectedPdu = 2 => "unexpected PDU",
        Reserved = 3 => "reserved code",
        UnrecognizedPduParameter = 4 => "unrecognized PDU parameter",
        UnexpectedPduParameter = 5 => "unexpected PDU parameter",
        InvalidPduParameter = 6 => "invalid PDU parameter",
    }
}

/// A presentation context as proposed by the association requester.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    /// odd number identifying the context within the association
    pub id: u8,
    /// the abstract syntax (usually a SOP class UID)
    pub abstract_syntax: String,
    /// the candidate transfer syntaxes, most preferred first
    pub transfer_syntaxes: Vec<String>,
}

/// The acceptor's answer to one proposed presentation context.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    /// the chosen transfer syntax,
    /// not significant unless the context was accepted
    pub transfer_syntax: String,
}

/// Who rejected an association, and why.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    /// Interpret the source and reason codes of an A-ASSOCIATE-RJ PDU.
    pub fn from_codes(source: u8, reason: u8) -> Option<Self> {
        match source {
            1 => AssociationRJServiceUserReason::from_code(reason).map(Self::ServiceUser),
            2 => AssociationRJServiceProviderASCEReason::from_code(reason)
                .map(Self::ServiceProviderASCE),
            3 => AssociationRJServiceProviderPresentationReason::from_code(reason)
                .map(Self::ServiceProviderPresentation),
            _ => None,
        }
    }

    /// The source and reason codes as written to the wire.
    pub fn codes(&self) -> (u8, u8) {
        match *self {
            AssociationRJSource::ServiceUser(reason) => (1, reason.code()),
            AssociationRJSource::ServiceProviderASCE(reason) => (2, reason.code()),
            AssociationRJSource::ServiceProviderPresentation(reason) => (3, reason.code()),
        }
    }
}

impl Display for AssociationRJSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssociationRJSource::ServiceUser(r) => write!(f, "service user: {}", r),
            AssociationRJSource::ServiceProviderASCE(r) => {
                write!(f, "service provider (ACSE): {}", r)
            }
            AssociationRJSource::ServiceProviderPresentation(r) => {
                write!(f, "service provider (presentation): {}", r)
            }
        }
    }
}

/// Who aborted an association.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    ServiceProvider(AbortRQServiceProviderReason),
    Reserved,
}

impl AbortRQSource {
    /// Interpret the source and reason codes of an A-ABORT PDU.
    ///
    /// The reason is only significant
    /// when the abort comes from the service provider.
    pub fn from_codes(source: u8, reason: u8) -> Option<Self> {
        match source {
            0 => Some(AbortRQSource::ServiceUser),
            1 => Some(AbortRQSource::Reserved),
            2 => AbortRQServiceProviderReason::from_code(reason).map(AbortRQSource::ServiceProvider),
            _ => None,
        }
    }

    /// The source and reason codes as written to the wire.
    pub fn codes(&self) -> (u8, u8) {
        match *self {
            AbortRQSource::ServiceUser => (0, 0),
            AbortRQSource::Reserved => (1, 0),
            AbortRQSource::ServiceProvider(reason) => (2, reason.code()),
        }
    }
}

impl Display for AbortRQSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortRQSource::ServiceUser => f.write_str("service user"),
            AbortRQSource::Reserved => f.write_str("reserved source"),
            AbortRQSource::ServiceProvider(reason) => write!(f, "service provider: {}", reason),
        }
    }
}

/// Whether a presentation data value is a fragment of a command or of a data set.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

/// A presentation data value:
/// one fragment of a command or data set message.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    /// whether this is the final fragment of the message
    pub is_last: bool,
    pub data: Vec<u8>,
}

impl PDataValue {
    /// The message control header byte of this value.
    pub fn control_header(&self) -> u8 {
        let command = u8::from(self.value_type == PDataValueType::Command);
        let last = u8::from(self.is_last) << 1;
        command | last
    }
}

/// A sub-item of the user information item.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    /// A sub-item not interpreted by this implementation,
    /// kept as is.
    Unknown { item_type: u8, data: Vec<u8> },
    /// Maximum Length (0x51)
    MaxLength(u32),
    /// Implementation Class UID (0x52)
    ImplementationClassUID(String),
    /// SCP/SCU Role Selection (0x54)
    RoleSelection {
        sop_class_uid: String,
        scu_role: bool,
        scp_role: bool,
    },
    /// Implementation Version Name (0x55)
    ImplementationVersionName(String),
}

/// A decoded protocol data unit.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Hash)]
pub enum Pdu {
    /// A PDU of a type which this implementation does not know,
    /// kept undecoded
    Unknown { pdu_type: u8, data: Vec<u8> },
    /// A-ASSOCIATE-RQ
    AssociationRQ(AssociationRQ),
    /// A-ASSOCIATE-AC
    AssociationAC(AssociationAC),
    /// A-ASSOCIATE-RJ
    AssociationRJ(AssociationRJ),
    /// P-DATA-TF
    PData { data: Vec<PDataValue> },
    /// A-RELEASE-RQ
    ReleaseRQ,
    /// A-RELEASE-RP
    ReleaseRP,
    /// A-ABORT
    AbortRQ { source: AbortRQSource },
}

impl Pdu {
    /// The PDU type code.
    pub fn pdu_type(&self) -> u8 {
        match self {
            Pdu::Unknown { pdu_type, .. } => *pdu_type,
            Pdu::AssociationRQ(_) => ASSOCIATE_RQ,
            Pdu::AssociationAC(_) => ASSOCIATE_AC,
            Pdu::AssociationRJ(_) => ASSOCIATE_RJ,
            Pdu::PData { .. } => P_DATA_TF,
            Pdu::ReleaseRQ => RELEASE_RQ,
            Pdu::ReleaseRP => RELEASE_RP,
            Pdu::AbortRQ { .. } => ABORT_RQ,
        }
    }

    /// A one line summary of the PDU, fit for logging.
    ///
    /// Unlike the `Debug` output,
    /// payloads are summarized by their size.
    pub fn short_description(&self) -> impl Display + '_ {
        Summary(self)
    }
}

struct Summary<'a>(&'a Pdu);

impl Display for Summary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Pdu::Unknown { pdu_type, data } => {
                write!(f, "Unknown({:#04x}, {} bytes)", pdu_type, data.len())
            }
            Pdu::AssociationRQ(rq) => write!(
                f,
                "A-ASSOCIATE-RQ {} -> {} ({} presentation contexts)",
                rq.calling_ae_title,
                rq.called_ae_title,
                rq.presentation_contexts.len()
            ),
            Pdu::AssociationAC(ac) => write!(
                f,
                "A-ASSOCIATE-AC {} <- {} ({} presentation contexts)",
                ac.calling_ae_title,
                ac.called_ae_title,
                ac.presentation_contexts.len()
            ),
            Pdu::AssociationRJ(rj) => write!(f, "A-ASSOCIATE-RJ {}, {}", rj.result, rj.source),
            Pdu::PData { data } => {
                f.write_str("P-DATA-TF [")?;
                for (i, pdv) in data.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(
                        f,
                        "#{} {:?}{} {} bytes",
                        pdv.presentation_context_id,
                        pdv.value_type,
                        if pdv.is_last { " (last)" } else { "" },
                        pdv.data.len()
                    )?;
                }
                f.write_str("]")
            }
            Pdu::ReleaseRQ => f.write_str("A-RELEASE-RQ"),
            Pdu::ReleaseRP => f.write_str("A-RELEASE-RP"),
            Pdu::AbortRQ { source } => write!(f, "A-ABORT ({})", source),
        }
    }
}

/// The contents of an A-ASSOCIATE-RQ PDU.
#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

/// The contents of an A-ASSOCIATE-AC PDU.
///
/// The AE titles are those of the request, echoed back.
#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationAC {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

#[derive(Debug, Clone, Eq, Hash, PartialEq, PartialOrd)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

macro_rules! impl_into_pdu {
    ($($t:ident),+) => {
        $(
            impl From<$t> for Pdu {
                fn from(value: $t) -> Self {
                    Pdu::$t(value)
                }
            }
        )+
    };
}

impl_into_pdu!(AssociationRQ, AssociationAC, AssociationRJ);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdu_short_description() {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        };
        assert_eq!(pdu.short_description().to_string(), "A-ABORT (service user)");

        let pdu = Pdu::PData {
            data: vec![PDataValue {
                is_last: true,
                presentation_context_id: 3,
                value_type: PDataValueType::Data,
                data: vec![0x55; 384],
            }],
        };
        assert_eq!(
            pdu.short_description().to_string(),
            "P-DATA-TF [#3 Data (last) 384 bytes]",
        );

        let pdu = Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        });
        assert_eq!(
            pdu.short_description().to_string(),
            "A-ASSOCIATE-RJ rejected permanently, service user: called AE title not recognized",
        );
    }

    #[test]
    fn reject_and_abort_codes() {
        for (source, reason) in [(1, 1), (1, 2), (1, 3), (1, 7), (1, 9), (2, 2), (3, 1), (3, 5)] {
            let rj = AssociationRJSource::from_codes(source, reason).unwrap();
            assert_eq!(rj.codes(), (source, reason));
        }
        assert_eq!(AssociationRJSource::from_codes(2, 3), None);
        assert_eq!(AssociationRJSource::from_codes(1, 11), None);
        assert_eq!(
            AssociationRJSource::from_codes(3, 0),
            Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::Reserved(0)
            ))
        );

        for (source, reason) in [(0, 0), (2, 0), (2, 2), (2, 6)] {
            let abort = AbortRQSource::from_codes(source, reason).unwrap();
            assert_eq!(abort.codes(), (source, reason));
        }
        assert_eq!(AbortRQSource::from_codes(3, 0), None);
        assert_eq!(AbortRQSource::from_codes(2, 7), None);
    }

    #[test]
    fn result_reason_codes() {
        for code in 0..=4 {
            let reason = PresentationContextResultReason::from_code(code).unwrap();
            assert_eq!(reason.code(), code);
        }
        assert_eq!(PresentationContextResultReason::from_code(5), None);
        assert_eq!(
            PresentationContextResultReason::TransferSyntaxesNotSupported.to_string(),
            "transfer syntaxes not supported"
        );
    }

    #[test]
    fn control_header_bits() {
        let mut value = PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Command,
            is_last: false,
            data: vec![],
        };
        assert_eq!(value.control_header(), 0x01);
        value.is_last = true;
        assert_eq!(value.control_header(), 0x03);
        value.value_type = PDataValueType::Data;
        assert_eq!(value.control_header(), 0x02);
    }
}
