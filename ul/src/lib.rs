//! This crates contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! This crate can be used as a base
//! for concrete service class users (SCUs)
//! and service class providers (SCPs).
//!
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication support,
//!   along with their wire framing.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities via the upper layer protocol by TCP,
//!   and for exchanging DIMSE messages over them.
//! - The [`dimse`] module
//!   builds and inspects the command sets of the
//!   verification and storage service classes.

pub mod association;
pub mod dimse;
pub mod pdu;

/// The current implementation class UID generically referring to dcmlink.
///
/// Automatically generated as per the standard, part 5, section B.2.
///
/// This UID may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.262174532908741176045129315873540628911";

/// The current implementation version name generically referring to dcmlink.
///
/// This name may change in future versions,
/// even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DCMLINK 0.1";

// re-exports

pub use association::{
    Association, ClientAssociationOptions, ServerAssociationOptions, TcpAssociation,
};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
