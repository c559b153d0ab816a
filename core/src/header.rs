//! This module contains the basic types for interpreting DICOM data element headers:
//! the attribute tag, the value representation,
//! and the representation descriptor which drives value multiplicity.

use std::fmt;
use std::str::{from_utf8, FromStr};

use snafu::Snafu;

/// Idiomatic alias for a tag's group number.
pub type GroupNumber = u16;
/// Idiomatic alias for a tag's element number.
pub type ElementNumber = u16;

/// The value of a length field which stands for an undefined length.
pub const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// The tag group reserved for items and delimiters.
pub const DELIMITER_GROUP: GroupNumber = 0xFFFE;

/// Item (FFFE,E000).
pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
/// Item Delimitation Item (FFFE,E00D).
pub const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
/// Sequence Delimitation Item (FFFE,E0DD).
pub const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);
/// Pixel Data (7FE0,0010).
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// The data type for DICOM data element tags.
///
/// Tags are ordered by group first and element second,
/// both compared as unsigned numbers,
/// which is the order in which elements appear in a data set.
///
/// Both `(u16, u16)` and `[u16; 2]` can be
/// efficiently converted to this type as well.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct Tag(pub GroupNumber, pub ElementNumber);

impl Tag {
    /// Getter for the tag's group value.
    #[inline]
    pub fn group(self) -> GroupNumber {
        self.0
    }

    /// Getter for the tag's element value.
    #[inline]
    pub fn element(self) -> ElementNumber {
        self.1
    }

    /// Whether the tag belongs to a private (odd) group.
    #[inline]
    pub fn is_private(self) -> bool {
        self.0 & 1 == 1
    }

    /// Whether this is an item or delimiter tag (group `FFFE`).
    #[inline]
    pub fn is_delimiter_group(self) -> bool {
        self.0 == DELIMITER_GROUP
    }

    /// Whether this tag belongs to the command group (`0000`).
    #[inline]
    pub fn is_command(self) -> bool {
        self.0 == 0x0000
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag({:#06X?}, {:#06X?})", self.0, self.1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl PartialEq<(u16, u16)> for Tag {
    fn eq(&self, other: &(u16, u16)) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl From<(u16, u16)> for Tag {
    #[inline]
    fn from(value: (u16, u16)) -> Tag {
        Tag(value.0, value.1)
    }
}

impl From<[u16; 2]> for Tag {
    #[inline]
    fn from(value: [u16; 2]) -> Tag {
        Tag(value[0], value[1])
    }
}

/// How the payload of an element with a given VR is split into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Each value takes exactly this many bytes.
    Fixed(usize),
    /// Textual values separated by backslashes,
    /// each at most `max_len` characters long.
    Text {
        /// the maximum number of characters in one value
        max_len: usize,
    },
    /// The payload is never split into multiple values.
    Single,
}

macro_rules! value_representations {
    ($( $vr:ident: $name:literal, $repr:expr; )+) => {
        /// A DICOM value representation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum VR {
            $(
                #[doc = $name]
                $vr,
            )+
        }

        impl VR {
            /// The two letter code of this VR.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( VR::$vr => stringify!($vr), )+
                }
            }

            /// The full name of this VR, such as "Person Name".
            pub fn name(self) -> &'static str {
                match self {
                    $( VR::$vr => $name, )+
                }
            }

            /// The representation descriptor of this VR.
            pub fn representation(self) -> Representation {
                use Representation::*;
                match self {
                    $( VR::$vr => $repr, )+
                }
            }
        }

        impl FromStr for VR {
            type Err = ParseVrError;

            fn from_str(code: &str) -> Result<Self, Self::Err> {
                match code {
                    $( stringify!($vr) => Ok(VR::$vr), )+
                    _ => Err(ParseVrError { _private: () }),
                }
            }
        }
    };
}

value_representations! {
    AE: "Application Entity", Text { max_len: 16 };
    AS: "Age String", Text { max_len: 4 };
    AT: "Attribute Tag", Fixed(4);
    CS: "Code String", Text { max_len: 16 };
    DA: "Date", Text { max_len: 8 };
    DS: "Decimal String", Text { max_len: 16 };
    DT: "Date Time", Text { max_len: 26 };
    FL: "Floating Point Single", Fixed(4);
    FD: "Floating Point Double", Fixed(8);
    IS: "Integer String", Text { max_len: 12 };
    LO: "Long String", Text { max_len: 64 };
    LT: "Long Text", Single;
    OB: "Other Byte", Single;
    OD: "Other Double", Single;
    OF: "Other Float", Single;
    OL: "Other Long", Single;
    OV: "Other Very Long", Single;
    OW: "Other Word", Single;
    PN: "Person Name", Text { max_len: 64 };
    SH: "Short String", Text { max_len: 16 };
    SL: "Signed Long", Fixed(4);
    SQ: "Sequence of Items", Single;
    SS: "Signed Short", Fixed(2);
    ST: "Short Text", Single;
    SV: "Signed Very Long", Fixed(8);
    TM: "Time", Text { max_len: 16 };
    UC: "Unlimited Characters", Text { max_len: usize::MAX };
    UI: "Unique Identifier (UID)", Text { max_len: 64 };
    UL: "Unsigned Long", Fixed(4);
    UN: "Unknown", Single;
    UR: "Universal Resource Identifier", Single;
    US: "Unsigned Short", Fixed(2);
    UT: "Unlimited Text", Single;
    UV: "Unsigned Very Long", Fixed(8);
}

/// The error returned when parsing a string which is not a known VR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(display("no such value representation"))]
pub struct ParseVrError {
    _private: (),
}

impl VR {
    /// Obtain the value representation encoded as two upper case letters,
    /// as found in explicit VR element headers.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        from_utf8(&chars).ok()?.parse().ok()
    }

    /// The two letter code of this VR, as written in explicit VR element headers.
    pub fn to_bytes(self) -> [u8; 2] {
        let code = self.as_str().as_bytes();
        [code[0], code[1]]
    }

    /// Whether the explicit VR header of this representation
    /// has two reserved bytes followed by a 32-bit length.
    pub fn has_long_length(self) -> bool {
        matches!(
            self,
            VR::OB
                | VR::OD
                | VR::OF
                | VR::OL
                | VR::OV
                | VR::OW
                | VR::SQ
                | VR::SV
                | VR::UC
                | VR::UN
                | VR::UR
                | VR::UT
                | VR::UV
        )
    }

    /// The width of the unit which must be byte swapped
    /// when changing endianness, if any.
    pub fn swap_width(self) -> Option<usize> {
        match self {
            VR::OW | VR::AT => Some(2),
            VR::OF | VR::OL => Some(4),
            VR::OD | VR::OV => Some(8),
            _ => match self.representation() {
                Representation::Fixed(width) => Some(width),
                _ => None,
            },
        }
    }

    /// The byte used to pad values to an even length.
    pub fn padding(self) -> u8 {
        match self {
            VR::UI | VR::OB | VR::UN => 0,
            _ => b' ',
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_order_is_group_major() {
        assert!(Tag(0x0008, 0xFFFF) < Tag(0x0010, 0x0000));
        assert!(Tag(0x0010, 0x0010) < Tag(0x0010, 0x0020));
        assert!(Tag(0x7FE0, 0x0010) < Tag(0xFFFE, 0xE000));
    }

    #[test]
    fn tag_display() {
        assert_eq!(Tag(0x7FE0, 0x0010).to_string(), "(7FE0,0010)");
        assert_eq!(format!("{:?}", Tag(0x0008, 0x0016)), "Tag(0x0008, 0x0016)");
        assert!(Tag(0x0009, 0x0010).is_private());
        assert!(!Tag(0x0010, 0x0010).is_private());
    }

    #[test]
    fn vr_binary_roundtrip() {
        for vr in [VR::AE, VR::OB, VR::SQ, VR::UT, VR::FD] {
            assert_eq!(VR::from_binary(vr.to_bytes()), Some(vr));
        }
        assert_eq!(VR::from_binary(*b"ZZ"), None);
        assert_eq!(VR::from_binary([0xFF, 0x00]), None);
        assert_eq!("PN".parse::<VR>(), Ok(VR::PN));
        assert_eq!("pn".parse::<VR>(), Err(ParseVrError { _private: () }));
        assert_eq!(
            "XX".parse::<VR>().unwrap_err().to_string(),
            "no such value representation"
        );
        assert_eq!(VR::PN.name(), "Person Name");
        assert_eq!(VR::from_binary(*b"UC"), Some(VR::UC));
        assert!(VR::UR.has_long_length());
        assert!(VR::SV.has_long_length());
        assert!(!VR::SS.has_long_length());
    }

    #[test]
    fn swap_widths() {
        assert_eq!(VR::US.swap_width(), Some(2));
        assert_eq!(VR::AT.swap_width(), Some(2));
        assert_eq!(VR::OW.swap_width(), Some(2));
        assert_eq!(VR::FL.swap_width(), Some(4));
        assert_eq!(VR::FD.swap_width(), Some(8));
        assert_eq!(VR::OF.swap_width(), Some(4));
        assert_eq!(VR::OD.swap_width(), Some(8));
        assert_eq!(VR::UV.swap_width(), Some(8));
        assert_eq!(VR::OB.swap_width(), None);
        assert_eq!(VR::DS.swap_width(), None);
    }

    #[test]
    fn representations() {
        assert_eq!(VR::US.representation(), Representation::Fixed(2));
        assert_eq!(VR::AT.representation(), Representation::Fixed(4));
        assert_eq!(VR::FD.representation(), Representation::Fixed(8));
        assert_eq!(VR::LO.representation(), Representation::Text { max_len: 64 });
        assert_eq!(VR::LT.representation(), Representation::Single);
        assert_eq!(VR::SQ.representation(), Representation::Single);
        assert!(VR::UN.has_long_length());
        assert!(!VR::LT.has_long_length());
    }
}
