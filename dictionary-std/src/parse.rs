//! Parser for dictionary tables.
//!
//! Lines have the form `(gggg,eeee)<TAB>VR<TAB>Name<TAB>VM<TAB>Version`.
//! Empty lines and lines starting with `#` are ignored.

use dcmlink_core::dictionary::{DictionaryEntry, Multiplicity, NumberRange, Parity, TagRange};
use dcmlink_core::VR;
use snafu::{OptionExt, ResultExt, Snafu};
use std::num::ParseIntError;

/// An error parsing one line of a dictionary table.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ParseError {
    #[snafu(display("Missing field `{}`", field))]
    MissingField { field: &'static str },
    #[snafu(display("Malformed tag `{}`", text))]
    MalformedTag { text: String },
    #[snafu(display("Invalid hexadecimal number `{}`", text))]
    InvalidNumber {
        text: String,
        source: ParseIntError,
    },
    #[snafu(display("Unknown value representation `{}`", text))]
    UnknownVr { text: String },
    #[snafu(display("Invalid value multiplicity `{}`", text))]
    InvalidMultiplicity { text: String },
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parse a single table line.
/// Returns `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<DictionaryEntry>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split('\t').map(str::trim).filter(|f| !f.is_empty());
    let tag = fields.next().context(MissingFieldSnafu { field: "tag" })?;
    let vr = fields.next().context(MissingFieldSnafu { field: "VR" })?;
    let alias = fields.next().context(MissingFieldSnafu { field: "name" })?;
    let vm = fields.next().context(MissingFieldSnafu { field: "VM" })?;

    Ok(Some(DictionaryEntry {
        tag: parse_tag_range(tag)?,
        alias: alias.to_string(),
        vr: parse_vr(vr)?,
        vm: parse_multiplicity(vm)?,
    }))
}

fn parse_tag_range(text: &str) -> Result<TagRange> {
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .context(MalformedTagSnafu { text })?;
    let (group, element) = inner.split_once(',').context(MalformedTagSnafu { text })?;
    Ok(TagRange {
        group: parse_number_range(group)?,
        element: parse_number_range(element)?,
    })
}

fn parse_number_range(text: &str) -> Result<NumberRange> {
    let (low, high, parity) = if let Some((low, high)) = text.split_once("-o-") {
        (low, high, Parity::Odd)
    } else if let Some((low, high)) = text.split_once("-u-") {
        (low, high, Parity::All)
    } else if let Some((low, high)) = text.split_once('-') {
        (low, high, Parity::Even)
    } else {
        let value = parse_hex(text)?;
        return Ok(NumberRange::single(value));
    };
    Ok(NumberRange {
        low: parse_hex(low)?,
        high: parse_hex(high)?,
        parity,
    })
}

fn parse_hex(text: &str) -> Result<u16> {
    u16::from_str_radix(text, 16).context(InvalidNumberSnafu { text })
}

fn parse_vr(text: &str) -> Result<VR> {
    // ambiguous representations (e.g. `OB/OW`) resolve to the first option
    let first = text.split('/').next().unwrap_or(text);
    first.parse().ok().context(UnknownVrSnafu { text })
}

fn parse_multiplicity(text: &str) -> Result<Multiplicity> {
    let invalid = || InvalidMultiplicitySnafu { text }.build();
    let (min, max) = match text.split_once('-') {
        Some((min, max)) => (min, Some(max)),
        None => (text, None),
    };
    let min: u32 = min.parse().map_err(|_| invalid())?;
    let max = match max {
        None => Some(min),
        Some(max) if max.ends_with('n') => None,
        Some(max) => Some(max.parse().map_err(|_| invalid())?),
    };
    Ok(Multiplicity { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcmlink_core::Tag;
    use matches::assert_matches;

    #[test]
    fn parses_single_entry() {
        let entry = parse_line("(0010,0010)\tPN\tPatientName\t1\tDICOM")
            .unwrap()
            .unwrap();
        assert_eq!(entry.tag.single(), Some(Tag(0x0010, 0x0010)));
        assert_eq!(entry.alias, "PatientName");
        assert_eq!(entry.vr, VR::PN);
        assert_eq!(entry.vm, Multiplicity { min: 1, max: Some(1) });
    }

    #[test]
    fn parses_ranges() {
        let entry = parse_line("(6000-60FF,3000)\tOB/OW\tOverlayData\t1\tDICOM")
            .unwrap()
            .unwrap();
        assert_eq!(entry.vr, VR::OB);
        assert_eq!(entry.tag.group.parity, Parity::Even);
        assert!(entry.tag.contains(Tag(0x6002, 0x3000)));
        assert!(!entry.tag.contains(Tag(0x6003, 0x3000)));

        let entry = parse_line("(0009-o-FFFF,0010-u-00FF)\tLO\tPrivateCreator\t1\tDICOM")
            .unwrap()
            .unwrap();
        assert_eq!(entry.tag.group.parity, Parity::Odd);
        assert_eq!(entry.tag.element.parity, Parity::All);
        assert!(entry.tag.contains(Tag(0x0029, 0x0011)));
    }

    #[test]
    fn parses_multiplicities() {
        let vm = |s| parse_multiplicity(s).unwrap();
        assert_eq!(vm("1-n"), Multiplicity { min: 1, max: None });
        assert_eq!(vm("2-2n"), Multiplicity { min: 2, max: None });
        assert_eq!(vm("1-3"), Multiplicity { min: 1, max: Some(3) });
        assert!(parse_multiplicity("x").is_err());
    }

    #[test]
    fn skips_comments_and_reports_errors() {
        assert_matches!(parse_line("# a comment"), Ok(None));
        assert_matches!(parse_line("   "), Ok(None));
        assert_matches!(
            parse_line("(0010,0010)\tPN"),
            Err(ParseError::MissingField { field: "name" })
        );
        assert_matches!(
            parse_line("(0010;0010)\tPN\tPatientName\t1"),
            Err(ParseError::MalformedTag { .. })
        );
        assert_matches!(
            parse_line("(00G0,0010)\tPN\tPatientName\t1"),
            Err(ParseError::InvalidNumber { .. })
        );
        assert_matches!(
            parse_line("(0010,0010)\tXX\tPatientName\t1"),
            Err(ParseError::UnknownVr { .. })
        );
    }
}
