//! Canonical suite and case records every dialect is normalized into.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Outcome of a single test case.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::Errored => "errored",
            CaseStatus::Skipped => "skipped",
        }
    }

    pub fn from_str_opt<T: AsRef<str>>(value: T) -> Option<Self> {
        match value.as_ref() {
            "passed" => Some(CaseStatus::Passed),
            "failed" => Some(CaseStatus::Failed),
            "errored" => Some(CaseStatus::Errored),
            "skipped" => Some(CaseStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CaseStatus::Failed | CaseStatus::Errored)
    }
}

/// One test case of a suite. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    name: String,
    class_name: String,
    display_name: String,
    status: CaseStatus,
    duration: Duration,
    error_details: Option<String>,
    skipped_message: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CaseFields {
    pub name: String,
    pub class_name: String,
    pub status: CaseStatus,
    pub duration: Duration,
    pub error_details: Option<String>,
    pub skipped_message: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl From<CaseFields> for CaseRecord {
    fn from(
        CaseFields {
            name,
            class_name,
            status,
            duration,
            error_details,
            skipped_message,
            stdout,
            stderr,
        }: CaseFields,
    ) -> Self {
        let display_name = display_name(&class_name, &name);
        Self {
            name,
            class_name,
            display_name,
            status,
            duration,
            error_details,
            skipped_message,
            stdout,
            stderr,
        }
    }
}

fn display_name(class_name: &str, name: &str) -> String {
    match (class_name.is_empty(), name.is_empty()) {
        (false, false) => format!("{class_name}.{name}"),
        (false, true) => class_name.to_string(),
        (true, _) => name.to_string(),
    }
}

impl CaseRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    pub fn skipped_message(&self) -> Option<&str> {
        self.skipped_message.as_deref()
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failure()
    }
}

/// One logical suite execution, owning its cases in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteRecord {
    name: String,
    timestamp: Option<DateTime<FixedOffset>>,
    duration: Duration,
    stdout: Option<String>,
    stderr: Option<String>,
    cases: Vec<CaseRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SuiteFields {
    pub name: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub duration: Duration,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub cases: Vec<CaseRecord>,
}

impl From<SuiteFields> for SuiteRecord {
    fn from(
        SuiteFields {
            name,
            timestamp,
            duration,
            stdout,
            stderr,
            cases,
        }: SuiteFields,
    ) -> Self {
        Self {
            name,
            timestamp,
            duration,
            stdout,
            stderr,
            cases,
        }
    }
}

impl SuiteRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn cases(&self) -> &[CaseRecord] {
        &self.cases
    }

    /// First case with the given name.
    pub fn case<T: AsRef<str>>(&self, name: T) -> Option<&CaseRecord> {
        self.cases.iter().find(|c| c.name == name.as_ref())
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.is_failed()).count()
    }
}
