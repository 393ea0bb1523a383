//! Bounded capture of console output.
//!
//! Console logs attached to suites and cases can be arbitrarily large. Unless
//! long output is explicitly kept, text over the byte limit keeps a window from
//! its head and a window from its tail, with a marker line recording how many
//! bytes were dropped in between.

use std::borrow::Cow;

use crate::string_safety::{safe_truncate_str, safe_truncate_str_tail};

/// Two 499 byte windows around the widest possible marker line.
pub const DEFAULT_LIMIT_BYTES: usize = 1044;

const MARKER_PREFIX: &str = "\n...[truncated ";
const MARKER_SUFFIX: &str = " bytes]...\n";
const MAX_COUNT_DIGITS: usize = 20;

/// Length of a marker line carrying the largest representable byte count.
pub const MAX_MARKER_LEN: usize = MARKER_PREFIX.len() + MAX_COUNT_DIGITS + MARKER_SUFFIX.len();

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CapturePolicy {
    keep_long_stdio: bool,
    limit_bytes: usize,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CapturePolicy {
    pub fn new(keep_long_stdio: bool) -> Self {
        Self {
            keep_long_stdio,
            limit_bytes: DEFAULT_LIMIT_BYTES,
        }
    }

    pub fn with_limit(mut self, limit_bytes: usize) -> Self {
        self.limit_bytes = limit_bytes;
        self
    }

    pub fn keep_long_stdio(&self) -> bool {
        self.keep_long_stdio
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    pub fn bound<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.keep_long_stdio {
            Cow::Borrowed(text)
        } else {
            bound(text, self.limit_bytes)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Console output owned by one suite or case. Each captured block is bounded
/// on its own and appended in document order.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedOutput {
    stdout: Option<String>,
    stderr: Option<String>,
}

impl CapturedOutput {
    pub fn push(&mut self, stream: Stream, text: &str, policy: &CapturePolicy) {
        let slot = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        slot.get_or_insert_with(String::new)
            .push_str(&policy.bound(text));
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_none() && self.stderr.is_none()
    }

    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.stdout, self.stderr)
    }
}

/// Returns `text` unchanged when it fits in `limit_bytes`, otherwise its head
/// and tail joined by a marker line. The result never exceeds `limit_bytes`.
pub fn bound(text: &str, limit_bytes: usize) -> Cow<'_, str> {
    if text.len() <= limit_bytes {
        return Cow::Borrowed(text);
    }

    let window = limit_bytes.saturating_sub(MAX_MARKER_LEN) / 2;
    let head = safe_truncate_str(text, window);
    let tail = safe_truncate_str_tail(text, window);
    let elided = text.len() - head.len() - tail.len();
    let marker = format!("{MARKER_PREFIX}{elided}{MARKER_SUFFIX}");

    if marker.len() > limit_bytes {
        return Cow::Borrowed(safe_truncate_str(text, limit_bytes));
    }

    let mut bounded = String::with_capacity(head.len() + marker.len() + tail.len());
    bounded.push_str(head);
    bounded.push_str(&marker);
    bounded.push_str(tail);
    Cow::Owned(bounded)
}
