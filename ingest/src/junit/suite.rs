use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use super::{
    capture::{CapturePolicy, CapturedOutput, Stream},
    case::{CaseBuilder, OutcomeBuilder, OutcomeKind, SYNTHESIZED_CASE_NAME},
    date_parser::TimestampParser,
    diagnostics::{Diagnostic, RecoverableDialectQuirk},
    record::{SuiteFields, SuiteRecord},
    rules::{self, Attrs},
};

#[derive(Debug, Clone, Default)]
pub(crate) struct SuiteBuilder {
    name: Option<String>,
    timestamp: Option<DateTime<FixedOffset>>,
    duration: Duration,
    declared_failures: usize,
    declared_errors: usize,
    output: CapturedOutput,
    cases: Vec<CaseBuilder>,
    outcome: Option<OutcomeBuilder>,
    nested_suites: usize,
    diagnostics: Vec<Diagnostic>,
}

impl SuiteBuilder {
    pub fn open(attrs: &Attrs, timestamps: &mut TimestampParser) -> Self {
        let mut diagnostics = Vec::new();

        let timestamp = rules::first_attr(attrs, rules::SUITE_TIMESTAMP).and_then(|raw| {
            let parsed = timestamps.parse(&raw);
            if parsed.is_none() {
                diagnostics.push(Diagnostic::new(
                    RecoverableDialectQuirk::TimestampUnparsable(raw),
                ));
            }
            parsed
        });

        let duration = rules::first_duration(attrs, rules::SUITE_DURATION).unwrap_or_else(|raw| {
            diagnostics.push(Diagnostic::new(
                RecoverableDialectQuirk::DurationUnparsable(raw),
            ));
            None
        });

        Self {
            name: qualified_name(attrs),
            timestamp,
            duration: duration.unwrap_or_default(),
            declared_failures: rules::first_count(attrs, rules::SUITE_FAILURES),
            declared_errors: rules::first_count(attrs, rules::SUITE_ERRORS),
            diagnostics,
            ..Default::default()
        }
    }

    /// Collects test cases that appeared directly under a report wrapper.
    pub fn implicit(name: Option<String>) -> Self {
        Self {
            name,
            diagnostics: vec![Diagnostic::new(RecoverableDialectQuirk::ImplicitSuite)],
            ..Default::default()
        }
    }

    pub fn push_case(&mut self, case: CaseBuilder) {
        self.cases.push(case);
    }

    pub fn push_output(&mut self, stream: Stream, text: &str, policy: &CapturePolicy) {
        self.output.push(stream, text, policy);
    }

    pub fn push_nested_suite(&mut self) {
        self.nested_suites += 1;
    }

    /// A suite that only groups other suites. Its declared counts are the
    /// totals of its children, so it does not become a record of its own.
    pub fn is_container(&self) -> bool {
        self.nested_suites > 0
            && self.cases.is_empty()
            && self.outcome.is_none()
            && self.output.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// A `failure` or `error` element placed directly under the suite, as
    /// emitted when a test class fails to load.
    pub fn offer_outcome(&mut self, outcome: OutcomeBuilder) {
        let keep_current = self
            .outcome
            .as_ref()
            .is_some_and(|current| current.kind() >= outcome.kind());
        if !keep_current {
            self.outcome = Some(outcome);
        }
    }

    pub fn finish(self) -> (SuiteRecord, Vec<Diagnostic>) {
        let Self {
            name,
            timestamp,
            duration,
            declared_failures,
            declared_errors,
            output,
            cases,
            outcome,
            nested_suites: _,
            mut diagnostics,
        } = self;

        let name = name.unwrap_or_else(|| {
            match cases.first().and_then(|case| case.own_class_name()) {
                Some(class_name) => {
                    diagnostics.push(Diagnostic::new(
                        RecoverableDialectQuirk::SuiteNameFromFirstCase(class_name.to_string()),
                    ));
                    class_name.to_string()
                }
                None => {
                    diagnostics.push(Diagnostic::new(RecoverableDialectQuirk::SuiteNameMissing));
                    String::new()
                }
            }
        });

        let declared_outcome = (cases.is_empty() && declared_failures + declared_errors > 0)
            .then(|| declared_kind(declared_errors))
            .map(|kind| OutcomeBuilder::with_message(kind, ""));
        let synthesized = outcome.or(declared_outcome).map(|outcome| {
            let outcome = if outcome.is_blank() {
                OutcomeBuilder::with_message(
                    outcome.kind(),
                    declared_message(declared_failures, declared_errors),
                )
            } else {
                outcome
            };
            diagnostics.push(Diagnostic::new(RecoverableDialectQuirk::SynthesizedCase(
                SYNTHESIZED_CASE_NAME.to_string(),
            )));
            CaseBuilder::synthesized(outcome)
        });

        let mut records = Vec::with_capacity(cases.len() + usize::from(synthesized.is_some()));
        for (index, case) in synthesized.into_iter().chain(cases).enumerate() {
            let (record, case_diagnostics) = case.finish(&name);
            diagnostics.extend(case_diagnostics.into_iter().map(|d| d.in_case(index)));
            records.push(record);
        }

        let (stdout, stderr) = output.into_parts();

        let record = SuiteFields {
            name,
            timestamp,
            duration,
            stdout,
            stderr,
            cases: records,
        }
        .into();

        (record, diagnostics)
    }
}

/// `package` and `name` joined as Ant's junitreport splits them, unless the
/// name is already qualified.
fn qualified_name(attrs: &Attrs) -> Option<String> {
    let name = rules::first_attr(attrs, rules::SUITE_NAME)?;
    match rules::first_attr(attrs, rules::SUITE_PACKAGE) {
        Some(package) if !name.starts_with(&format!("{package}.")) => {
            Some(format!("{package}.{name}"))
        }
        _ => Some(name),
    }
}

fn declared_kind(declared_errors: usize) -> OutcomeKind {
    if declared_errors > 0 {
        OutcomeKind::Error
    } else {
        OutcomeKind::Failure
    }
}

fn declared_message(failures: usize, errors: usize) -> String {
    if failures + errors == 0 {
        String::from("test suite reported a failure without any details")
    } else {
        format!(
            "test suite declared {failures} failure(s) and {errors} error(s) without reporting any test case"
        )
    }
}
