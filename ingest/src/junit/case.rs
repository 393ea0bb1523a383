use std::time::Duration;

use super::{
    capture::{CapturePolicy, CapturedOutput, Stream},
    diagnostics::{Diagnostic, RecoverableDialectQuirk},
    record::{CaseFields, CaseRecord, CaseStatus},
    rules::{self, Attrs},
};
use crate::string_safety::is_blank;

/// Name given to the test case synthesized from failures declared on a suite.
pub const SYNTHESIZED_CASE_NAME: &str = "<init>";

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutcomeKind {
    Skipped,
    Failure,
    Error,
}

impl OutcomeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Failure => "failure",
            OutcomeKind::Error => "error",
        }
    }

    fn status(&self) -> CaseStatus {
        match self {
            OutcomeKind::Skipped => CaseStatus::Skipped,
            OutcomeKind::Failure => CaseStatus::Failed,
            OutcomeKind::Error => CaseStatus::Errored,
        }
    }
}

/// A `failure`, `error` or `skipped` element and the text it carries.
#[derive(Debug, Clone)]
pub(crate) struct OutcomeBuilder {
    kind: OutcomeKind,
    message: Option<String>,
    body: String,
}

impl OutcomeBuilder {
    pub fn open(kind: OutcomeKind, attrs: &Attrs) -> Self {
        Self {
            kind,
            message: rules::first_attr(attrs, rules::DETAIL_MESSAGE),
            body: String::new(),
        }
    }

    pub fn with_message<T: Into<String>>(kind: OutcomeKind, message: T) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            body: String::new(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        self.kind
    }

    pub fn push_text(&mut self, text: &str) {
        self.body.push_str(text);
    }

    pub fn is_blank(&self) -> bool {
        is_blank(&self.body) && self.message.as_deref().is_none_or(is_blank)
    }

    /// Body text is usually the stack trace or full assertion output, so it is
    /// preferred over the one-line `message` attribute.
    pub fn into_text(self) -> String {
        if !is_blank(&self.body) {
            self.body
        } else {
            self.message.unwrap_or_default()
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CaseBuilder {
    name: String,
    class_name: Option<String>,
    duration: Duration,
    outcome: Option<OutcomeBuilder>,
    output: CapturedOutput,
    diagnostics: Vec<Diagnostic>,
}

impl CaseBuilder {
    pub fn open(attrs: &Attrs) -> Self {
        let mut diagnostics = Vec::new();

        let name = rules::first_attr(attrs, rules::CASE_NAME).unwrap_or_else(|| {
            diagnostics.push(Diagnostic::new(RecoverableDialectQuirk::CaseNameMissing));
            String::new()
        });

        let duration = rules::first_duration(attrs, rules::CASE_DURATION).unwrap_or_else(|raw| {
            diagnostics.push(Diagnostic::new(
                RecoverableDialectQuirk::DurationUnparsable(raw),
            ));
            None
        });

        Self {
            name,
            class_name: rules::first_attr(attrs, rules::CASE_CLASS_NAME),
            duration: duration.unwrap_or_default(),
            outcome: None,
            output: CapturedOutput::default(),
            diagnostics,
        }
    }

    /// A case standing in for a suite that reported a failure outside of any
    /// test case. Its class name is always the suite name.
    pub fn synthesized(outcome: OutcomeBuilder) -> Self {
        Self {
            name: SYNTHESIZED_CASE_NAME.to_string(),
            class_name: None,
            duration: Duration::ZERO,
            outcome: Some(outcome),
            output: CapturedOutput::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn own_class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn push_output(&mut self, stream: Stream, text: &str, policy: &CapturePolicy) {
        self.output.push(stream, text, policy);
    }

    /// Keeps the most severe outcome; among equally severe ones the first wins.
    pub fn offer_outcome(&mut self, outcome: OutcomeBuilder) {
        let Some(current) = &self.outcome else {
            self.outcome = Some(outcome);
            return;
        };

        if current.kind() != OutcomeKind::Skipped && outcome.kind() != OutcomeKind::Skipped {
            let dropped = current.kind().min(outcome.kind());
            self.diagnostics.push(Diagnostic::new(
                RecoverableDialectQuirk::DuplicateDetail(dropped.tag()),
            ));
        }

        if outcome.kind() > current.kind() {
            self.outcome = Some(outcome);
        }
    }

    pub fn finish(self, suite_name: &str) -> (CaseRecord, Vec<Diagnostic>) {
        let Self {
            name,
            class_name,
            duration,
            outcome,
            output,
            mut diagnostics,
        } = self;

        let class_name = class_name.unwrap_or_else(|| {
            if name != SYNTHESIZED_CASE_NAME {
                diagnostics.push(Diagnostic::new(
                    RecoverableDialectQuirk::ClassNameFromSuite,
                ));
            }
            suite_name.to_string()
        });

        let (status, error_details, skipped_message) = match outcome {
            None => (CaseStatus::Passed, None, None),
            Some(outcome) => {
                let status = outcome.kind().status();
                let text = outcome.into_text();
                if status == CaseStatus::Skipped {
                    (status, None, Some(text).filter(|t| !is_blank(t)))
                } else {
                    (status, Some(text), None)
                }
            }
        };

        let (stdout, stderr) = output.into_parts();

        let record = CaseFields {
            name,
            class_name,
            status,
            duration,
            error_details,
            skipped_message,
            stdout,
            stderr,
        }
        .into();

        (record, diagnostics)
    }
}
