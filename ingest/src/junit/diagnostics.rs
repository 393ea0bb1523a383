use thiserror::Error;

/// Irregularities in an otherwise well-formed report that were absorbed by a
/// fallback rule. These are never returned as errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoverableDialectQuirk {
    #[error("test suite has no name, took `{0}` from its first test case")]
    SuiteNameFromFirstCase(String),
    #[error("test suite has no name and no test case to take one from")]
    SuiteNameMissing,
    #[error("could not parse test suite timestamp `{0}`")]
    TimestampUnparsable(String),
    #[error("could not parse duration `{0}`")]
    DurationUnparsable(String),
    #[error("test case has no name")]
    CaseNameMissing,
    #[error("test case has no class name, using the test suite name")]
    ClassNameFromSuite,
    #[error("test case reports more than one failure or error, dropped `{0}`")]
    DuplicateDetail(&'static str),
    #[error("failure declared on the test suite itself, added test case `{0}`")]
    SynthesizedCase(String),
    #[error("test cases outside of any test suite were collected into an implicit one")]
    ImplicitSuite,
    #[error("`{0}` found outside of any test suite or test case")]
    Orphaned(&'static str),
    #[error("test suite `{0}` only groups other test suites, emitted its children instead")]
    ContainerSuite(String),
}

/// Where in the parsed output a quirk was absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Index into the returned suites, `None` when the element never became part of one.
    pub suite: Option<usize>,
    /// Index into that suite's cases.
    pub case: Option<usize>,
    pub quirk: RecoverableDialectQuirk,
}

impl Diagnostic {
    pub fn new(quirk: RecoverableDialectQuirk) -> Self {
        Self {
            suite: None,
            case: None,
            quirk,
        }
    }

    pub(crate) fn in_case(mut self, case: usize) -> Self {
        self.case.get_or_insert(case);
        self
    }

    pub(crate) fn in_suite(mut self, suite: usize) -> Self {
        self.suite.get_or_insert(suite);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.suite, self.case) {
            (Some(suite), Some(case)) => write!(f, "suite {suite}, case {case}: {}", self.quirk),
            (Some(suite), None) => write!(f, "suite {suite}: {}", self.quirk),
            _ => write!(f, "{}", self.quirk),
        }
    }
}
