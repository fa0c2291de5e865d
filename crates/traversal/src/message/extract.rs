//! Locate the `Via` and `Contact` lines of a received message and the
//! callback address hidden in the `Contact` user-part.
//!
//! Matching is purely syntactic: the first occurrence wins and nothing about
//! the SIP grammar is checked.

use std::fmt;

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use thiserror::Error;

// Unicode mode is off so any byte, valid UTF-8 or not, belongs to the line.
static VIA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u:Via:[^\r\n]+)").unwrap());
static CONTACT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u:Contact:[^\r\n]+)").unwrap());
static CALLBACK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u:@(?P<callback>[^;]+))").unwrap());

/// The field that could not be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MissingField {
    #[error("bad via")]
    Via,
    #[error("bad contact")]
    Contact,
    #[error("invalid host/port in contact")]
    Callback,
}

/// A header line exactly as received, field name included, without its line
/// ending. The bytes need not be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderLine(Bytes);

impl HeaderLine {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HeaderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// `host:port` recovered from a `Contact` user-part
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackAddress(String);

impl CallbackAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallbackAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn find_line(regex: &Regex, raw: &[u8]) -> Option<HeaderLine> {
    regex
        .find(raw)
        .map(|m| HeaderLine(Bytes::copy_from_slice(m.as_bytes())))
}

/// First `Via:` line in `raw`.
pub fn extract_via(raw: &[u8]) -> Result<HeaderLine, MissingField> {
    find_line(&VIA_REGEX, raw).ok_or(MissingField::Via)
}

/// First `Contact:` line in `raw`.
pub fn extract_contact(raw: &[u8]) -> Result<HeaderLine, MissingField> {
    find_line(&CONTACT_REGEX, raw).ok_or(MissingField::Contact)
}

/// Everything after the first `@` of the contact up to the next `;`.
///
/// The address is only ever dialled, so bytes that are not UTF-8 are replaced.
pub fn extract_callback(contact: &[u8]) -> Result<CallbackAddress, MissingField> {
    let caps = CALLBACK_REGEX
        .captures(contact)
        .ok_or(MissingField::Callback)?;
    let callback = caps.name("callback").ok_or(MissingField::Callback)?;

    Ok(CallbackAddress(
        String::from_utf8_lossy(callback.as_bytes()).into_owned(),
    ))
}
