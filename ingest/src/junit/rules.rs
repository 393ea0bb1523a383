//! Tag names and attribute fallback tables for the JUnit dialects we accept.
//!
//! Each field is read from a list of attribute names tried in order, the first
//! present and non-blank value wins. Supporting a new producer usually means
//! adding an alias here rather than another branch in the extractors.

use std::{borrow::Cow, time::Duration};

use quick_xml::{
    encoding::Decoder,
    events::{
        BytesCData, BytesStart, BytesText,
        attributes::{AttrError, Attribute},
    },
};

use crate::string_safety::is_blank;

pub const TAG_REPORT: &[u8] = b"testsuites";
pub const TAG_TEST_SUITE: &[u8] = b"testsuite";
pub const TAG_TEST_CASE: &[u8] = b"testcase";
pub const TAG_FAILURE: &[u8] = b"failure";
pub const TAG_ERROR: &[u8] = b"error";
pub const TAG_SKIPPED: &[u8] = b"skipped";
pub const TAG_SYSTEM_OUT: &[u8] = b"system-out";
pub const TAG_SYSTEM_ERR: &[u8] = b"system-err";

pub const SUITE_NAME: &[&str] = &["name"];
pub const SUITE_PACKAGE: &[&str] = &["package"];
pub const SUITE_TIMESTAMP: &[&str] = &["timestamp"];
pub const SUITE_DURATION: &[&str] = &["time", "duration"];
pub const SUITE_FAILURES: &[&str] = &["failures"];
pub const SUITE_ERRORS: &[&str] = &["errors"];

pub const CASE_NAME: &[&str] = &["name", "testname"];
pub const CASE_CLASS_NAME: &[&str] = &["classname", "class"];
pub const CASE_DURATION: &[&str] = &["time", "duration"];

pub const DETAIL_MESSAGE: &[&str] = &["message"];

/// The kind of element a start tag opens, matched on its local name so that
/// namespace prefixes are ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Report,
    TestSuite,
    TestCase,
    Failure,
    Error,
    Skipped,
    SystemOut,
    SystemErr,
    Other,
}

impl ElementKind {
    pub fn of(e: &BytesStart) -> Self {
        match e.local_name().as_ref() {
            TAG_REPORT => ElementKind::Report,
            TAG_TEST_SUITE => ElementKind::TestSuite,
            TAG_TEST_CASE => ElementKind::TestCase,
            TAG_FAILURE => ElementKind::Failure,
            TAG_ERROR => ElementKind::Error,
            TAG_SKIPPED => ElementKind::Skipped,
            TAG_SYSTEM_OUT => ElementKind::SystemOut,
            TAG_SYSTEM_ERR => ElementKind::SystemErr,
            _ => ElementKind::Other,
        }
    }
}

/// The attributes of one start tag, decoded with the document's encoding.
///
/// Decoding every attribute up front also checks the attribute syntax, which
/// the lookups below would otherwise skip over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(Vec<(String, String)>);

impl Attrs {
    pub fn decode(e: &BytesStart, decoder: Decoder) -> Result<Self, AttrError> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = decode_lossy(attr.key.as_ref(), decoder).into_owned();
            attrs.push((key, decode_attr(&attr, decoder)));
        }
        Ok(Self(attrs))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// First present, non-blank attribute among `names`.
pub fn first_attr(attrs: &Attrs, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| attrs.get(name))
        .find(|value| !is_blank(value))
        .map(String::from)
}

/// First attribute among `names` that parses as non-negative, finite seconds.
/// Returns the raw value of the first present attribute when none parses.
pub fn first_duration(attrs: &Attrs, names: &[&str]) -> Result<Option<Duration>, String> {
    let mut unparsable = None;
    for name in names {
        let Some(raw) = first_attr(attrs, &[*name]) else {
            continue;
        };
        match parse_seconds(&raw) {
            Some(duration) => return Ok(Some(duration)),
            None => {
                unparsable.get_or_insert(raw);
            }
        }
    }
    unparsable.map_or(Ok(None), Err)
}

pub fn first_count(attrs: &Attrs, names: &[&str]) -> usize {
    first_attr(attrs, names)
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or_default()
}

/// Seconds as written by JUnit producers, tolerating thousands separators.
/// Plain decimals are read exactly, anything else goes through `f64`.
pub fn parse_seconds<T: AsRef<str>>(raw: T) -> Option<Duration> {
    let cleaned: String = raw.as_ref().trim().chars().filter(|c| *c != ',').collect();
    parse_decimal_seconds(&cleaned).or_else(|| {
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
    })
}

fn parse_decimal_seconds(value: &str) -> Option<Duration> {
    let (secs, fraction) = value.split_once('.').unwrap_or((value, ""));
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if secs.is_empty() || !is_digits(secs) || !is_digits(fraction) {
        return None;
    }

    let mut nanos: String = fraction.chars().take(9).collect();
    while nanos.len() < 9 {
        nanos.push('0');
    }
    Some(Duration::new(secs.parse().ok()?, nanos.parse().ok()?))
}

fn decode_attr(attr: &Attribute, decoder: Decoder) -> String {
    match attr.decode_and_unescape_value(decoder) {
        Ok(value) => value.into_owned(),
        Err(..) => unescape_lossy(&decode_lossy(&attr.value, decoder)),
    }
}

pub fn decode_text(e: &BytesText, decoder: Decoder) -> String {
    match e.unescape() {
        Ok(value) => value.into_owned(),
        Err(..) => unescape_lossy(&decode_lossy(e, decoder)),
    }
}

pub fn decode_cdata(e: &BytesCData, decoder: Decoder) -> String {
    decode_lossy(e, decoder).into_owned()
}

fn decode_lossy<'b>(raw: &'b [u8], decoder: Decoder) -> Cow<'b, str> {
    decoder
        .decode(raw)
        .unwrap_or_else(|_| String::from_utf8_lossy(raw))
}

fn unescape_lossy(raw: &str) -> String {
    match quick_xml::escape::unescape(raw) {
        Ok(value) => value.into_owned(),
        Err(..) => raw.to_string(),
    }
}

/// Decoded attributes of a start tag written as `name attr="value" ...`.
#[cfg(test)]
pub(crate) fn attrs_of(tag: &str) -> Attrs {
    use quick_xml::{Reader, events::Event};

    let xml = format!("<{tag}/>");
    let mut reader = Reader::from_str(&xml);
    match reader.read_event().unwrap() {
        Event::Empty(e) => Attrs::decode(&e, reader.decoder()).unwrap(),
        event => panic!("unexpected event {event:?}"),
    }
}
