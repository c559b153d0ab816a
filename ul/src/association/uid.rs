//! Private utility module for working with UIDs

use std::borrow::Cow;

/// Remove the trailing padding (NUL or space) of a UID
/// as it may appear on the wire.
pub(crate) fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c| c == '\0' || c == ' ')
}

/// Remove the trailing padding of a UID, keeping it borrowed if it was.
pub(crate) fn trim_uid_cow(uid: Cow<'_, str>) -> Cow<'_, str> {
    match uid {
        Cow::Borrowed(uid) => Cow::Borrowed(trim_uid(uid)),
        Cow::Owned(uid) if trim_uid(&uid).len() == uid.len() => Cow::Owned(uid),
        Cow::Owned(uid) => Cow::Owned(trim_uid(&uid).to_string()),
    }
}

/// Whether two UIDs are the same, disregarding padding.
pub(crate) fn uid_eq(a: &str, b: &str) -> bool {
    trim_uid(a) == trim_uid(b)
}
