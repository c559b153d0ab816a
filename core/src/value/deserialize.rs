//! Parsing of date and time values.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use snafu::{OptionExt, Snafu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Unexpected end of element"))]
    UnexpectedEndOfElement,
    #[snafu(display("Invalid date"))]
    InvalidDate,
    #[snafu(display("Invalid time"))]
    InvalidTime,
    #[snafu(display("Expected fraction delimiter '.', got '{}'", *value as char))]
    FractionDelimiter { value: u8 },
    #[snafu(display("Invalid number token: got '{}', but must be a digit in '0'..='9'", *value as char))]
    InvalidNumberToken { value: u8 },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Decode a single DICOM Date (DA) into a `NaiveDate` value.
/// A full 8 byte representation (YYYYMMDD) is required.
pub fn parse_date(buf: &[u8]) -> Result<NaiveDate> {
    if buf.len() < 8 {
        return UnexpectedEndOfElementSnafu.fail();
    }
    let year = read_number(&buf[0..4])? as i32;
    let month = read_number(&buf[4..6])?;
    let day = read_number(&buf[6..8])?;
    NaiveDate::from_ymd_opt(year, month, day).context(InvalidDateSnafu)
}

/// Decode a single DICOM Time (TM) into a `NaiveTime` value.
///
/// Minutes, seconds and the fraction are optional (`HH[MM[SS[.F{1,6}]]]`).
/// Missing components are zero.
pub fn parse_time(buf: &[u8]) -> Result<NaiveTime> {
    let (time, _rest) = parse_time_impl(buf)?;
    Ok(time)
}

fn parse_time_impl(buf: &[u8]) -> Result<(NaiveTime, &[u8])> {
    if buf.len() < 2 {
        return UnexpectedEndOfElementSnafu.fail();
    }
    let hour = read_number(&buf[0..2])?;
    let mut buf = &buf[2..];
    let mut minute = 0;
    let mut second = 0;
    let mut micro = 0;
    if buf.len() >= 2 && buf[0].is_ascii_digit() {
        minute = read_number(&buf[0..2])?;
        buf = &buf[2..];
        if buf.len() >= 2 && buf[0].is_ascii_digit() {
            second = read_number(&buf[0..2])?;
            buf = &buf[2..];
            if let Some((&first, fraction)) = buf.split_first() {
                if first == b'.' {
                    let digits = fraction
                        .iter()
                        .take(6)
                        .take_while(|c| c.is_ascii_digit())
                        .count();
                    if digits > 0 {
                        let value = read_number(&fraction[..digits])?;
                        micro = value * 10u32.pow(6 - digits as u32);
                    }
                    buf = &fraction[digits..];
                } else if first.is_ascii_digit() {
                    return FractionDelimiterSnafu { value: first }.fail();
                }
            }
        }
    }
    let time =
        NaiveTime::from_hms_micro_opt(hour, minute, second, micro).context(InvalidTimeSnafu)?;
    Ok((time, buf))
}

/// Decode a single DICOM Date Time (DT) into a `NaiveDateTime` value.
///
/// The time part is optional and defaults to midnight.
/// A trailing UTC offset (`&ZZXX`) is ignored.
pub fn parse_datetime(buf: &[u8]) -> Result<NaiveDateTime> {
    let date = parse_date(buf)?;
    let rest = &buf[8..];
    let rest = match rest.iter().position(|&c| c == b'+' || c == b'-') {
        Some(i) => &rest[..i],
        None => rest,
    };
    let time = if rest.is_empty() {
        NaiveTime::MIN
    } else {
        parse_time_impl(rest)?.0
    };
    Ok(NaiveDateTime::new(date, time))
}

fn read_number(text: &[u8]) -> Result<u32> {
    text.iter().try_fold(0u32, |acc, &c| {
        if c.is_ascii_digit() {
            Ok(acc * 10 + u32::from(c - b'0'))
        } else {
            InvalidNumberTokenSnafu { value: c }.fail()
        }
    })
}
