use std::{
    fs,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use quick_xml::{
    Reader,
    encoding::{self, Decoder},
    events::{BytesStart, Event},
};
use thiserror::Error;

use super::{
    capture::{CapturePolicy, Stream},
    case::{CaseBuilder, OutcomeBuilder, OutcomeKind},
    date_parser::TimestampParser,
    diagnostics::{Diagnostic, RecoverableDialectQuirk},
    record::SuiteRecord,
    rules::{self, Attrs, ElementKind},
    suite::SuiteBuilder,
};

/// The input is not well-formed markup. Nothing is returned in this case.
#[derive(Error, Debug)]
pub enum MalformedReportError {
    #[error("markup error at byte {position}: {source}")]
    Markup {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("could not read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("element `{0}` is never closed")]
    UnclosedElement(String),
    #[error("end tag `{0}` has no matching start tag")]
    UnmatchedEndTag(String),
    #[error("no root element found")]
    NoRootElement,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("could not open report {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse report {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: MalformedReportError,
    },
}

/// How the suites were laid out in the input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReportShape {
    /// The root element is a single `testsuite`.
    SingleSuite,
    /// The root element is a `testsuites` wrapper.
    MultiSuite,
    /// Several root elements follow each other in one stream.
    Concatenated { documents: usize },
    /// The root element is neither a suite nor a wrapper.
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub suites: Vec<SuiteRecord>,
    pub shape: ReportShape,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedReport {
    pub fn into_suites(self) -> Vec<SuiteRecord> {
        self.suites
    }
}

/// Parses the JUnit report at `path`.
///
/// Only input that is not well-formed markup is an error; anything else
/// produces best-effort records, in document order.
pub fn parse<P: AsRef<Path>>(
    path: P,
    keep_long_stdio: bool,
) -> Result<Vec<SuiteRecord>, ReportError> {
    parse_with_policy(path, CapturePolicy::new(keep_long_stdio)).map(ParsedReport::into_suites)
}

pub fn parse_with_policy<P: AsRef<Path>>(
    path: P,
    policy: CapturePolicy,
) -> Result<ParsedReport, ReportError> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|source| ReportError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    ReportParser::new(policy)
        .parse(BufReader::new(file))
        .map_err(|source| ReportError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug)]
enum Frame {
    Report {
        name: Option<String>,
        orphans: Option<SuiteBuilder>,
    },
    Suite(SuiteBuilder),
    Case(CaseBuilder),
    Outcome(OutcomeBuilder),
    Output { stream: Stream, text: String },
    Other,
}

enum Owner<'a> {
    Suite(&'a mut SuiteBuilder),
    Case(&'a mut CaseBuilder),
}

/// Single pass over the markup events of one report. Every open element is a
/// frame on a stack, and a frame is folded into the nearest enclosing frame
/// that can own it when its end tag is read.
#[derive(Debug, Default)]
pub struct ReportParser {
    policy: CapturePolicy,
    timestamps: TimestampParser,
    frames: Vec<Frame>,
    suites: Vec<SuiteRecord>,
    diagnostics: Vec<Diagnostic>,
    root_count: usize,
    root_kind: Option<ElementKind>,
}

impl ReportParser {
    pub fn new(policy: CapturePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Reads one report from `xml`. The encoding is taken from a byte order
    /// mark or the XML declaration, and defaults to UTF-8.
    pub fn parse<R: BufRead>(self, mut xml: R) -> Result<ParsedReport, MalformedReportError> {
        // The reader scans for ASCII delimiters, so 16-bit encodings are
        // transcoded before any markup is read.
        let wide = encoding::detect_encoding(xml.fill_buf()?)
            .filter(|(charset, _)| charset.name().starts_with("UTF-16"));

        match wide {
            Some((charset, bom_len)) => {
                let mut bytes = Vec::new();
                xml.read_to_end(&mut bytes)?;
                let text = encoding::decode(&bytes[bom_len.min(bytes.len())..], charset)
                    .map_err(|source| MalformedReportError::Markup {
                        position: 0,
                        source,
                    })?;
                tracing::debug!(encoding = charset.name(), "transcoding report to UTF-8");
                self.read_events(Reader::from_str(&text))
            }
            None => self.read_events(Reader::from_reader(xml)),
        }
    }

    fn read_events<R: BufRead>(
        mut self,
        mut reader: Reader<R>,
    ) -> Result<ParsedReport, MalformedReportError> {
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        loop {
            let event =
                reader
                    .read_event_into(&mut buf)
                    .map_err(|source| MalformedReportError::Markup {
                        position: reader.buffer_position() as u64,
                        source,
                    })?;
            let position = reader.buffer_position() as u64;
            if self.match_event(event, reader.decoder(), position)?.is_none() {
                break;
            }
            buf.clear();
        }

        let shape = self.shape();
        tracing::trace!(?shape, suites = self.suites.len(), "parsed report");

        Ok(ParsedReport {
            suites: self.suites,
            shape,
            diagnostics: self.diagnostics,
        })
    }

    fn match_event(
        &mut self,
        event: Event,
        decoder: Decoder,
        position: u64,
    ) -> Result<Option<()>, MalformedReportError> {
        match event {
            Event::Eof => {
                if let Some(frame) = self.frames.last() {
                    return Err(MalformedReportError::UnclosedElement(
                        frame.tag().to_string(),
                    ));
                }
                if self.root_count == 0 {
                    return Err(MalformedReportError::NoRootElement);
                }
                return Ok(None);
            }
            Event::Start(e) => {
                let frame = self.open(&e, decoder, position)?;
                self.frames.push(frame);
            }
            Event::Empty(e) => {
                let frame = self.open(&e, decoder, position)?;
                self.close(frame);
            }
            Event::End(e) => {
                let frame = self.frames.pop().ok_or_else(|| {
                    MalformedReportError::UnmatchedEndTag(
                        String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    )
                })?;
                self.close(frame);
            }
            Event::Text(e) => self.push_text(&rules::decode_text(&e, decoder)),
            Event::CData(e) => self.push_text(&rules::decode_cdata(&e, decoder)),
            _ => (),
        };
        Ok(Some(()))
    }

    fn open(
        &mut self,
        e: &BytesStart,
        decoder: Decoder,
        position: u64,
    ) -> Result<Frame, MalformedReportError> {
        let attrs = Attrs::decode(e, decoder).map_err(|source| MalformedReportError::Markup {
            position,
            source: source.into(),
        })?;

        let kind = ElementKind::of(e);
        if self.frames.is_empty() {
            self.root_count += 1;
            self.root_kind.get_or_insert(kind);
        }

        let frame = match kind {
            ElementKind::Report => Frame::Report {
                name: rules::first_attr(&attrs, rules::SUITE_NAME),
                orphans: None,
            },
            ElementKind::TestSuite => {
                Frame::Suite(SuiteBuilder::open(&attrs, &mut self.timestamps))
            }
            ElementKind::TestCase => Frame::Case(CaseBuilder::open(&attrs)),
            ElementKind::Failure => {
                Frame::Outcome(OutcomeBuilder::open(OutcomeKind::Failure, &attrs))
            }
            ElementKind::Error => Frame::Outcome(OutcomeBuilder::open(OutcomeKind::Error, &attrs)),
            ElementKind::Skipped => {
                Frame::Outcome(OutcomeBuilder::open(OutcomeKind::Skipped, &attrs))
            }
            ElementKind::SystemOut => Frame::Output {
                stream: Stream::Stdout,
                text: String::new(),
            },
            ElementKind::SystemErr => Frame::Output {
                stream: Stream::Stderr,
                text: String::new(),
            },
            ElementKind::Other => Frame::Other,
        };
        Ok(frame)
    }

    fn close(&mut self, frame: Frame) {
        match frame {
            Frame::Report { orphans, .. } => {
                if let Some(suite) = orphans {
                    self.emit(suite);
                }
            }
            Frame::Suite(suite) => self.close_test_suite(suite),
            Frame::Case(case) => self.close_test_case(case),
            Frame::Outcome(outcome) => match nearest_owner(&mut self.frames) {
                Some(Owner::Case(case)) => case.offer_outcome(outcome),
                Some(Owner::Suite(suite)) => {
                    if outcome.kind() != OutcomeKind::Skipped {
                        suite.offer_outcome(outcome);
                    }
                }
                None => self.orphaned(outcome.kind().tag()),
            },
            Frame::Output { stream, text } => match nearest_owner(&mut self.frames) {
                Some(Owner::Case(case)) => case.push_output(stream, &text, &self.policy),
                Some(Owner::Suite(suite)) => suite.push_output(stream, &text, &self.policy),
                None => self.orphaned(stream_tag(stream)),
            },
            Frame::Other => (),
        }
    }

    fn close_test_suite(&mut self, suite: SuiteBuilder) {
        let parent = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Suite(parent) => Some(parent),
            _ => None,
        });
        if let Some(parent) = parent {
            parent.push_nested_suite();
        }

        if suite.is_container() {
            let name = suite.name().unwrap_or_default().to_string();
            let diagnostic = Diagnostic::new(RecoverableDialectQuirk::ContainerSuite(name));
            tracing::debug!("{diagnostic}");
            self.diagnostics.push(diagnostic);
        } else {
            self.emit(suite);
        }
    }

    fn close_test_case(&mut self, case: CaseBuilder) {
        let owner = self.frames.iter_mut().rev().find_map(|frame| match frame {
            Frame::Suite(suite) => Some(suite),
            Frame::Report { name, orphans } => {
                Some(orphans.get_or_insert_with(|| SuiteBuilder::implicit(name.clone())))
            }
            _ => None,
        });

        match owner {
            Some(suite) => suite.push_case(case),
            None => self.orphaned("testcase"),
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.frames.last_mut() {
            Some(Frame::Outcome(outcome)) => outcome.push_text(text),
            Some(Frame::Output { text: captured, .. }) => captured.push_str(text),
            _ => (),
        }
    }

    fn emit(&mut self, suite: SuiteBuilder) {
        let index = self.suites.len();
        let (record, diagnostics) = suite.finish();
        for diagnostic in diagnostics {
            let diagnostic = diagnostic.in_suite(index);
            tracing::debug!("{diagnostic}");
            self.diagnostics.push(diagnostic);
        }
        self.suites.push(record);
    }

    fn orphaned(&mut self, tag: &'static str) {
        let diagnostic = Diagnostic::new(RecoverableDialectQuirk::Orphaned(tag));
        tracing::debug!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    fn shape(&self) -> ReportShape {
        match (self.root_count, self.root_kind) {
            (1, Some(ElementKind::TestSuite)) => ReportShape::SingleSuite,
            (1, Some(ElementKind::Report)) => ReportShape::MultiSuite,
            (documents, _) if documents > 1 => ReportShape::Concatenated { documents },
            _ => ReportShape::Unrecognized,
        }
    }
}

impl Frame {
    fn tag(&self) -> &'static str {
        match self {
            Frame::Report { .. } => "testsuites",
            Frame::Suite(..) => "testsuite",
            Frame::Case(..) => "testcase",
            Frame::Outcome(outcome) => outcome.kind().tag(),
            Frame::Output { stream, .. } => stream_tag(*stream),
            Frame::Other => "element",
        }
    }
}

fn nearest_owner(frames: &mut [Frame]) -> Option<Owner<'_>> {
    frames.iter_mut().rev().find_map(|frame| match frame {
        Frame::Suite(suite) => Some(Owner::Suite(suite)),
        Frame::Case(case) => Some(Owner::Case(case)),
        _ => None,
    })
}

fn stream_tag(stream: Stream) -> &'static str {
    match stream {
        Stream::Stdout => "system-out",
        Stream::Stderr => "system-err",
    }
}
