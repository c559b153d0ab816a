#![crate_type = "lib"]
#![deny(trivial_numeric_casts, unsafe_code, unstable_features)]
#![warn(
    missing_debug_implementations,
    unused_qualifications,
    unused_import_braces
)]

//! This is the core library of dcmlink containing the data structures
//! exchanged by the codec and the network layer.
//!
//! The current structure of this crate is as follows:
//!
//! - [`header`] comprises the DICOM attribute tag,
//!   value representations and their representation descriptors.
//! - [`dictionary`] describes the behavior of DICOM data dictionaries,
//!   which translate attribute names and tags to a dictionary entry.
//! - [`element`] holds data element records
//!   and [`object`] the ordered collections of them.
//! - [`value`] interprets individual element values
//!   according to their representation.
//! - [`text`] handles the default character repertoire.
//! - [`error`] contains crate-level error and result types.

pub mod dictionary;
pub mod element;
pub mod error;
pub mod header;
pub mod object;
pub mod text;
pub mod value;

pub use dictionary::{DataDictionary, DictionaryEntry};
pub use element::{ElementValue, VrElement};
pub use error::{Error, Result};
pub use header::{ParseVrError, Representation, Tag, VR};
pub use object::DicomObject;
pub use value::{DicomValue, PersonName};

// re-export crates that are part of the public API
pub use chrono;
