use std::fmt::{Display, Formatter};

/// Represents a DICOM person name (PN) single-byte component group.
///
/// The string representation is split by the `^` separator into
/// family name, given name, middle name, prefix and suffix, in this order.
/// Every component may be empty.
/// Ideographic and phonetic component groups (after `=`) are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    family: String,
    given: String,
    middle: String,
    prefix: String,
    suffix: String,
}

macro_rules! write_if_not_empty {
    ($formater: expr, $component: expr,  $format: expr) => {
        if !$component.is_empty() {
            write!($formater, $format, $component)?
        }
    };
}

impl Display for PersonName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write_if_not_empty!(f, self.prefix, "{} ");
        write_if_not_empty!(f, self.given, "{} ");
        write_if_not_empty!(f, self.middle, "{} ");
        write!(f, "{}", self.family)?;
        write_if_not_empty!(f, self.suffix, " {}");
        Ok(())
    }
}

impl PersonName {
    pub fn new(
        family: impl Into<String>,
        given: impl Into<String>,
        middle: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        PersonName {
            family: family.into(),
            given: given.into(),
            middle: middle.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn from_slice(slice: &str) -> Self {
        let alphabetic = slice.split('=').next().unwrap_or_default();
        let mut parts = alphabetic.split('^').map(|s| s.trim().to_string());
        PersonName {
            family: parts.next().unwrap_or_default(),
            given: parts.next().unwrap_or_default(),
            middle: parts.next().unwrap_or_default(),
            prefix: parts.next().unwrap_or_default(),
            suffix: parts.next().unwrap_or_default(),
        }
    }

    /// The `^` separated form, without trailing empty components.
    pub fn to_dicom_string(&self) -> String {
        let mut name = [
            &self.family,
            &self.given,
            &self.middle,
            &self.prefix,
            &self.suffix,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("^");
        let trimmed = name.trim_end_matches('^').len();
        name.truncate(trimmed);
        name
    }

    pub fn family(&self) -> &str {
        &self.family
    }
    pub fn given(&self) -> &str {
        &self.given
    }
    pub fn middle(&self) -> &str {
        &self.middle
    }
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}
