//! Crate level error and result types.
use crate::header::{Tag, VR};
use crate::text::DecodeTextError;
use snafu::Snafu;

/// The main data type for errors when accessing element values.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// No typed value access exists for elements of this representation.
    #[snafu(display("Value access is not implemented for {} elements", vr))]
    UnimplementedType { vr: VR },

    /// The raw value could not be interpreted as its representation demands.
    #[snafu(display("Unsupported {} value {:?}", vr, value))]
    UnsupportedDatatype { vr: VR, value: String },

    /// The value index goes beyond the value multiplicity.
    #[snafu(display("Value index {} out of range for multiplicity {}", index, vm))]
    IndexOutOfRange { index: usize, vm: usize },

    /// The element holds sequence items or fragments instead of a primitive value.
    #[snafu(display("Element {} does not hold a primitive value", tag))]
    NotPrimitive { tag: Tag },

    /// The textual value could not be decoded.
    #[snafu(display("Could not decode text of element {}", tag))]
    DecodeText { tag: Tag, source: DecodeTextError },

    /// The object has no element with the given tag.
    #[snafu(display("No such data element {}", tag))]
    NoSuchElement { tag: Tag },
}

/// Type alias for a result from this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
