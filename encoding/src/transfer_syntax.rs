//! The DICOM transfer syntaxes known to the codec.
//!
//! A transfer syntax specifier tells whether value representations
//! are explicit, the byte order of the encoded data,
//! and whether pixel data is encapsulated.
//! Every specifier in this module is handled by the same
//! [`VrReader`](crate::decode::VrReader) and
//! [`VrWriter`](crate::encode::VrWriter),
//! compressed pixel data is carried as opaque fragments.

pub use byteordered::Endianness;

/// A DICOM transfer syntax specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSyntax {
    /// The unique identifier of the transfer syntax.
    uid: &'static str,
    /// The name of the transfer syntax.
    name: &'static str,
    /// The byte order of data.
    byte_order: Endianness,
    /// Whether the transfer syntax mandates an explicit value representation,
    /// or the VR is implicit.
    explicit_vr: bool,
    /// Whether pixel data is encapsulated in fragments.
    encapsulated: bool,
}

impl TransferSyntax {
    const fn new(
        uid: &'static str,
        name: &'static str,
        byte_order: Endianness,
        explicit_vr: bool,
        encapsulated: bool,
    ) -> Self {
        TransferSyntax {
            uid,
            name,
            byte_order,
            explicit_vr,
            encapsulated,
        }
    }

    /// Obtain this transfer syntax' unique identifier.
    pub const fn uid(&self) -> &'static str {
        self.uid
    }

    /// Obtain the name of this transfer syntax.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Obtain this transfer syntax' expected endianness.
    pub const fn endianness(&self) -> Endianness {
        self.byte_order
    }

    /// Check whether this transfer syntax uses explicit VR.
    pub const fn explicit_vr(&self) -> bool {
        self.explicit_vr
    }

    /// Check whether pixel data is encapsulated.
    pub const fn encapsulated(&self) -> bool {
        self.encapsulated
    }
}

/// Implicit VR Little Endian, the default transfer syntax.
/// DIMSE command sets are always encoded with it.
pub const IMPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2",
    "Implicit VR Little Endian",
    Endianness::Little,
    false,
    false,
);

/// Explicit VR Little Endian.
pub const EXPLICIT_VR_LITTLE_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.1",
    "Explicit VR Little Endian",
    Endianness::Little,
    true,
    false,
);

/// Explicit VR Big Endian (retired).
pub const EXPLICIT_VR_BIG_ENDIAN: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.2",
    "Explicit VR Big Endian",
    Endianness::Big,
    true,
    false,
);

/// JPEG Baseline (Process 1).
pub const JPEG_BASELINE: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.4.50",
    "JPEG Baseline (Process 1)",
    Endianness::Little,
    true,
    true,
);

/// JPEG Lossless, Non-Hierarchical (Process 14).
pub const JPEG_LOSSLESS_NON_HIERARCHICAL: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.4.57",
    "JPEG Lossless, Non-Hierarchical (Process 14)",
    Endianness::Little,
    true,
    true,
);

/// JPEG Lossless, Non-Hierarchical, First-Order Prediction.
pub const JPEG_LOSSLESS_FIRST_ORDER: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.4.70",
    "JPEG Lossless, Non-Hierarchical, First-Order Prediction",
    Endianness::Little,
    true,
    true,
);

/// RLE Lossless.
pub const RLE_LOSSLESS: TransferSyntax = TransferSyntax::new(
    "1.2.840.10008.1.2.5",
    "RLE Lossless",
    Endianness::Little,
    true,
    true,
);

/// Every transfer syntax known to this crate.
pub static ALL: &[TransferSyntax] = &[
    IMPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_BIG_ENDIAN,
    JPEG_BASELINE,
    JPEG_LOSSLESS_NON_HIERARCHICAL,
    JPEG_LOSSLESS_FIRST_ORDER,
    RLE_LOSSLESS,
];

/// Obtain a transfer syntax by its UID.
///
/// Trailing padding (`\0` or space) in `uid` is ignored.
pub fn get(uid: &str) -> Option<&'static TransferSyntax> {
    let uid = uid.trim_end_matches(|c| c == '\0' || c == ' ');
    ALL.iter().find(|ts| ts.uid == uid)
}
