//! This crate implements the standard DICOM attribute dictionary and constants.
//!
//! ## Run-time dictionary
//!
//! - [`data_element`]: the DICOM attributes of the embedded table
//!   (`dicom.dic`), loaded once on first use
//!   and shared as an immutable value through
//!   [`StandardDataDictionary::shared`].
//!   Components which need a dictionary take it as a dependency
//!   instead of reaching for global state.
//! - [`parse`]: the parser for dictionary tables,
//!   which also allows loading custom tables
//!   with [`StandardDataDictionary::from_table`].
//!
//! ## Constants
//!
//! - [`tags`], which map an attribute alias to a DICOM tag
//! - [`uids`], for various normative DICOM unique identifiers
pub mod data_element;
pub mod parse;
pub mod tags;
pub mod uids;

pub use data_element::{Error, StandardDataDictionary};
