//! Persistence format for suite records.
//!
//! Every field is its own child element so that the document can grow new
//! fields without breaking older readers: elements a reader does not know are
//! skipped. Optional fields are omitted when absent.

use std::{
    io::{BufRead, Write},
    time::Duration,
};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use thiserror::Error;

use super::{
    record::{CaseFields, CaseRecord, CaseStatus, SuiteFields, SuiteRecord},
    rules,
};

const SUITE_RECORD: &str = "suite-record";
const CASE_RECORD: &str = "case-record";
const CASES: &str = "cases";
const NAME: &str = "name";
const CLASS_NAME: &str = "class-name";
const STATUS: &str = "status";
const TIMESTAMP: &str = "timestamp";
const DURATION: &str = "duration";
const ERROR_DETAILS: &str = "error-details";
const SKIPPED_MESSAGE: &str = "skipped-message";
const STDOUT: &str = "stdout";
const STDERR: &str = "stderr";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("no `suite-record` root element found")]
    MissingRoot,
    #[error("document ended inside `{0}`")]
    UnexpectedEof(String),
    #[error("invalid value `{value}` for `{field}`")]
    InvalidField { field: &'static str, value: String },
}

pub fn write_suite<W: Write>(suite: &SuiteRecord, writer: W) -> Result<(), CodecError> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new(SUITE_RECORD)))?;
    write_field(&mut writer, NAME, suite.name())?;
    if let Some(timestamp) = suite.timestamp() {
        write_field(&mut writer, TIMESTAMP, &format_timestamp(&timestamp))?;
    }
    write_field(&mut writer, DURATION, &format_duration(suite.duration()))?;
    write_optional_field(&mut writer, STDOUT, suite.stdout())?;
    write_optional_field(&mut writer, STDERR, suite.stderr())?;

    if suite.cases().is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(CASES)))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(CASES)))?;
        for case in suite.cases() {
            write_case(&mut writer, case)?;
        }
        writer.write_event(Event::End(BytesEnd::new(CASES)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(SUITE_RECORD)))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn write_case<W: Write>(writer: &mut Writer<W>, case: &CaseRecord) -> Result<(), CodecError> {
    writer.write_event(Event::Start(BytesStart::new(CASE_RECORD)))?;
    write_field(writer, NAME, case.name())?;
    write_field(writer, CLASS_NAME, case.class_name())?;
    write_field(writer, STATUS, case.status().as_str())?;
    write_field(writer, DURATION, &format_duration(case.duration()))?;
    write_optional_field(writer, ERROR_DETAILS, case.error_details())?;
    write_optional_field(writer, SKIPPED_MESSAGE, case.skipped_message())?;
    write_optional_field(writer, STDOUT, case.stdout())?;
    write_optional_field(writer, STDERR, case.stderr())?;
    writer.write_event(Event::End(BytesEnd::new(CASE_RECORD)))?;
    Ok(())
}

fn write_field<W: Write>(writer: &mut Writer<W>, tag: &str, value: &str) -> Result<(), CodecError> {
    // An empty start/end pair would be split across lines by the indenter.
    if value.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(tag)))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_optional_field<W: Write>(
    writer: &mut Writer<W>,
    tag: &str,
    value: Option<&str>,
) -> Result<(), CodecError> {
    match value {
        Some(value) => write_field(writer, tag, value),
        None => Ok(()),
    }
}

pub fn read_suite<R: BufRead>(xml: R) -> Result<SuiteRecord, CodecError> {
    let mut reader = RecordReader::new(xml);
    loop {
        match reader.next_event()? {
            Event::Start(e) if e.local_name().as_ref() == SUITE_RECORD.as_bytes() => {
                return reader.read_suite_fields(false);
            }
            Event::Empty(e) if e.local_name().as_ref() == SUITE_RECORD.as_bytes() => {
                return reader.read_suite_fields(true);
            }
            Event::Eof => return Err(CodecError::MissingRoot),
            _ => (),
        }
    }
}

impl SuiteRecord {
    pub fn to_xml_string(&self) -> Result<String, CodecError> {
        let mut buf = Vec::new();
        write_suite(self, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn from_xml_str<T: AsRef<str>>(xml: T) -> Result<Self, CodecError> {
        read_suite(xml.as_ref().as_bytes())
    }
}

struct Child {
    name: String,
    empty: bool,
}

struct RecordReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    fn new(xml: R) -> Self {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>, CodecError> {
        self.buf.clear();
        Ok(self.reader.read_event_into(&mut self.buf)?.into_owned())
    }

    /// The next child element of the current element, or `None` once the
    /// current element is closed.
    fn next_child(&mut self, parent: &str) -> Result<Option<Child>, CodecError> {
        loop {
            match self.next_event()? {
                Event::Start(e) => {
                    return Ok(Some(Child {
                        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        empty: false,
                    }));
                }
                Event::Empty(e) => {
                    return Ok(Some(Child {
                        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        empty: true,
                    }));
                }
                Event::End(..) => return Ok(None),
                Event::Eof => return Err(CodecError::UnexpectedEof(parent.to_string())),
                _ => (),
            }
        }
    }

    fn read_text(&mut self, child: &Child) -> Result<String, CodecError> {
        let mut text = String::new();
        if child.empty {
            return Ok(text);
        }
        loop {
            match self.next_event()? {
                Event::Text(e) => text.push_str(&rules::decode_text(&e, self.reader.decoder())),
                Event::CData(e) => {
                    text.push_str(&rules::decode_cdata(&e, self.reader.decoder()))
                }
                Event::Start(..) => self.skip(&Child {
                    name: child.name.clone(),
                    empty: false,
                })?,
                Event::End(..) => return Ok(text),
                Event::Eof => return Err(CodecError::UnexpectedEof(child.name.clone())),
                _ => (),
            }
        }
    }

    fn skip(&mut self, child: &Child) -> Result<(), CodecError> {
        if child.empty {
            return Ok(());
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.next_event()? {
                Event::Start(..) => depth += 1,
                Event::End(..) => depth -= 1,
                Event::Eof => return Err(CodecError::UnexpectedEof(child.name.clone())),
                _ => (),
            }
        }
        Ok(())
    }

    fn read_suite_fields(&mut self, empty: bool) -> Result<SuiteRecord, CodecError> {
        let mut fields = SuiteFields::default();
        if empty {
            return Ok(fields.into());
        }

        while let Some(child) = self.next_child(SUITE_RECORD)? {
            match child.name.as_str() {
                NAME => fields.name = self.read_text(&child)?,
                TIMESTAMP => fields.timestamp = Some(parse_timestamp(&self.read_text(&child)?)?),
                DURATION => fields.duration = parse_duration(&self.read_text(&child)?)?,
                STDOUT => fields.stdout = Some(self.read_text(&child)?),
                STDERR => fields.stderr = Some(self.read_text(&child)?),
                CASES => fields.cases = self.read_cases(&child)?,
                _ => self.skip(&child)?,
            }
        }
        Ok(fields.into())
    }

    fn read_cases(&mut self, cases: &Child) -> Result<Vec<CaseRecord>, CodecError> {
        let mut records = Vec::new();
        if cases.empty {
            return Ok(records);
        }

        while let Some(child) = self.next_child(CASES)? {
            if child.name == CASE_RECORD {
                records.push(self.read_case_fields(&child)?);
            } else {
                self.skip(&child)?;
            }
        }
        Ok(records)
    }

    fn read_case_fields(&mut self, case: &Child) -> Result<CaseRecord, CodecError> {
        let mut fields = CaseFields::default();
        if case.empty {
            return Ok(fields.into());
        }

        while let Some(child) = self.next_child(CASE_RECORD)? {
            match child.name.as_str() {
                NAME => fields.name = self.read_text(&child)?,
                CLASS_NAME => fields.class_name = self.read_text(&child)?,
                STATUS => {
                    let value = self.read_text(&child)?;
                    fields.status = CaseStatus::from_str_opt(&value).ok_or(
                        CodecError::InvalidField {
                            field: STATUS,
                            value,
                        },
                    )?;
                }
                DURATION => fields.duration = parse_duration(&self.read_text(&child)?)?,
                ERROR_DETAILS => fields.error_details = Some(self.read_text(&child)?),
                SKIPPED_MESSAGE => fields.skipped_message = Some(self.read_text(&child)?),
                STDOUT => fields.stdout = Some(self.read_text(&child)?),
                STDERR => fields.stderr = Some(self.read_text(&child)?),
                _ => self.skip(&child)?,
            }
        }
        Ok(fields.into())
    }
}

fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, CodecError> {
    DateTime::parse_from_rfc3339(value.trim()).map_err(|_| CodecError::InvalidField {
        field: TIMESTAMP,
        value: value.to_string(),
    })
}

fn format_duration(duration: Duration) -> String {
    format!("{}.{:09}", duration.as_secs(), duration.subsec_nanos())
}

/// Reads `seconds.nanoseconds` exactly, without going through floating point.
fn parse_duration(value: &str) -> Result<Duration, CodecError> {
    let invalid = || CodecError::InvalidField {
        field: DURATION,
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let (secs, fraction) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
    if fraction.is_empty()
        || fraction.len() > 9
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let secs = secs.parse::<u64>().map_err(|_| invalid())?;
    let nanos = format!("{fraction:0<9}").parse::<u32>().map_err(|_| invalid())?;
    Ok(Duration::new(secs, nanos))
}
