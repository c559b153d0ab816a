//! DICOM value representation encoding and decoding.
//!
//! This crate converts between in-memory data element records
//! and their wire bytes, in any of the [transfer syntaxes] known to it:
//! implicit or explicit VR, little or big endian.
//!
//! - [`decode`] holds the [`VrReader`],
//!   which reads one record at a time,
//!   decoding sequences and encapsulated pixel data recursively.
//! - [`encode`] holds the [`VrWriter`], its mirror image.
//!
//! All APIs are based on synchronous I/O.
//!
//! [transfer syntaxes]: ./transfer_syntax/index.html

pub mod decode;
pub mod encode;
pub mod transfer_syntax;

pub use dcmlink_core::text;

pub use decode::{read_object, VrReader};
pub use encode::{encoded_len, write_object, VrWriter};
pub use transfer_syntax::TransferSyntax;
