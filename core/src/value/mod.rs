//! Typed access to the individual values of a data element.
//!
//! Element payloads are kept as raw bytes.
//! [`DicomValue`] is what one obtains when
//! interpreting one of those values according to the element's VR.

use crate::error::{Result, UnimplementedTypeSnafu, UnsupportedDatatypeSnafu};
use crate::header::{Tag, VR};
use byteordered::byteorder::{BigEndian, ByteOrder};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub mod deserialize;
pub mod person_name;

pub use self::person_name::PersonName;

/// A single value of a data element, interpreted according to its VR.
#[derive(Debug, Clone, PartialEq)]
pub enum DicomValue {
    /// Textual value (AE, AS, CS, LO, LT, SH, ST, UI, UT).
    Str(String),
    /// Numeric value, from decimal or integer strings or binary numbers.
    Number(f64),
    /// A date (DA).
    Date(NaiveDate),
    /// A time of day (TM).
    Time(NaiveTime),
    /// A date and time (DT).
    DateTime(NaiveDateTime),
    /// A person name (PN).
    PersonName(PersonName),
    /// An attribute tag (AT).
    AttrTag(Tag),
    /// Uninterpreted bytes (OB, OW, UN).
    Raw(Vec<u8>),
}

impl DicomValue {
    /// Interpret one textual token (already stripped of padding)
    /// according to the given representation.
    pub(crate) fn from_text(vr: VR, token: &str) -> Result<Self> {
        let unsupported = || {
            UnsupportedDatatypeSnafu {
                vr,
                value: token.to_string(),
            }
            .build()
        };
        match vr {
            VR::DA => deserialize::parse_date(token.trim().as_bytes())
                .map(DicomValue::Date)
                .map_err(|_| unsupported()),
            VR::TM => deserialize::parse_time(token.trim().as_bytes())
                .map(DicomValue::Time)
                .map_err(|_| unsupported()),
            VR::DT => deserialize::parse_datetime(token.trim().as_bytes())
                .map(DicomValue::DateTime)
                .map_err(|_| unsupported()),
            VR::DS | VR::IS => token
                .trim()
                .parse::<f64>()
                .map(DicomValue::Number)
                .map_err(|_| unsupported()),
            VR::PN => Ok(DicomValue::PersonName(PersonName::from_slice(token))),
            VR::SQ => UnimplementedTypeSnafu { vr }.fail(),
            _ => Ok(DicomValue::Str(token.to_string())),
        }
    }

    /// Interpret one fixed width binary value,
    /// given in big endian byte order.
    pub(crate) fn from_binary(vr: VR, bytes: &[u8]) -> Result<Self> {
        Ok(match vr {
            VR::US => DicomValue::Number(f64::from(BigEndian::read_u16(bytes))),
            VR::SS => DicomValue::Number(f64::from(BigEndian::read_i16(bytes))),
            VR::UL => DicomValue::Number(f64::from(BigEndian::read_u32(bytes))),
            VR::SL => DicomValue::Number(f64::from(BigEndian::read_i32(bytes))),
            VR::FL => DicomValue::Number(f64::from(BigEndian::read_f32(bytes))),
            VR::FD => DicomValue::Number(BigEndian::read_f64(bytes)),
            VR::SV => DicomValue::Number(BigEndian::read_i64(bytes) as f64),
            VR::UV => DicomValue::Number(BigEndian::read_u64(bytes) as f64),
            VR::AT => DicomValue::AttrTag(Tag(
                BigEndian::read_u16(&bytes[0..2]),
                BigEndian::read_u16(&bytes[2..4]),
            )),
            _ => return UnimplementedTypeSnafu { vr }.fail(),
        })
    }

    /// Obtain the value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DicomValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Obtain the value as a string slice, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DicomValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matches::assert_matches;

    #[test]
    fn text_values_by_vr() {
        assert_eq!(
            DicomValue::from_text(VR::DS, " 1.5").unwrap(),
            DicomValue::Number(1.5)
        );
        assert_eq!(
            DicomValue::from_text(VR::CS, "ORIGINAL").unwrap(),
            DicomValue::Str("ORIGINAL".into())
        );
        assert_matches!(
            DicomValue::from_text(VR::DA, "20200101"),
            Ok(DicomValue::Date(_))
        );
        assert_matches!(
            DicomValue::from_text(VR::IS, "one"),
            Err(crate::Error::UnsupportedDatatype { vr: VR::IS, .. })
        );
        assert_matches!(
            DicomValue::from_text(VR::SQ, ""),
            Err(crate::Error::UnimplementedType { vr: VR::SQ })
        );
    }

    #[test]
    fn binary_values_by_vr() {
        assert_eq!(
            DicomValue::from_binary(VR::US, &[0x01, 0x02]).unwrap(),
            DicomValue::Number(258.)
        );
        assert_eq!(
            DicomValue::from_binary(VR::SS, &[0xFF, 0xFE]).unwrap(),
            DicomValue::Number(-2.)
        );
        assert_eq!(
            DicomValue::from_binary(VR::AT, &[0x00, 0x10, 0x00, 0x20]).unwrap(),
            DicomValue::AttrTag(Tag(0x0010, 0x0020))
        );
        assert_eq!(
            DicomValue::from_binary(VR::SV, &[0xFF; 8]).unwrap(),
            DicomValue::Number(-1.)
        );
        assert_eq!(
            DicomValue::from_binary(VR::UV, &[0, 0, 0, 0, 0, 0, 0x01, 0x00]).unwrap(),
            DicomValue::Number(256.)
        );
    }
}
