use std::time::Duration;

use chrono::{DateTime as ChronoDateTime, FixedOffset, TimeDelta};
use speedate::{
    Date as SpeedateDate, DateTime as SpeedateDateTime, MicrosecondsPrecisionOverflowBehavior,
    TimeConfigBuilder,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TimestampKind {
    DateTime,
    NaiveDate,
}

#[derive(Debug, Clone, Default)]
struct TimestampAndOffset {
    timestamp_secs_micros: Option<(i64, u32)>,
    offset_secs: Option<i32>,
}

/// Parses suite timestamps. Reports from a single tool use one format
/// throughout, so the first format that succeeds is tried first afterwards.
#[derive(Debug, Clone, Default)]
pub struct TimestampParser {
    last_kind: Option<TimestampKind>,
}

impl TimestampParser {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn parse<T: AsRef<str>>(&mut self, value: T) -> Option<ChronoDateTime<FixedOffset>> {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return None;
        }

        let (kind, parsed) = match self.last_kind {
            Some(TimestampKind::NaiveDate) => Self::parse_naive_date(value)
                .map(|p| (TimestampKind::NaiveDate, p))
                .or_else(|| Self::parse_date_time(value).map(|p| (TimestampKind::DateTime, p))),
            _ => Self::parse_date_time(value)
                .map(|p| (TimestampKind::DateTime, p))
                .or_else(|| Self::parse_naive_date(value).map(|p| (TimestampKind::NaiveDate, p))),
        }?;

        let timestamp = Self::to_chrono(parsed)?;
        self.last_kind = Some(kind);
        Some(timestamp)
    }

    fn parse_date_time(value: &str) -> Option<TimestampAndOffset> {
        // nextest and other Rust producers write nanoseconds, only microseconds are kept
        let config = TimeConfigBuilder::new()
            .microseconds_precision_overflow_behavior(
                MicrosecondsPrecisionOverflowBehavior::Truncate,
            )
            .build();
        SpeedateDateTime::parse_bytes_with_config(value.as_bytes(), &config)
            .ok()
            .map(|dt| TimestampAndOffset {
                timestamp_secs_micros: Some((dt.timestamp(), dt.time.microsecond)),
                offset_secs: dt.time.tz_offset,
            })
    }

    fn parse_naive_date(value: &str) -> Option<TimestampAndOffset> {
        SpeedateDate::parse_str(value)
            .ok()
            .map(|d| TimestampAndOffset {
                timestamp_secs_micros: Some((d.timestamp(), 0)),
                offset_secs: None,
            })
    }

    fn to_chrono(
        TimestampAndOffset {
            timestamp_secs_micros,
            offset_secs,
        }: TimestampAndOffset,
    ) -> Option<ChronoDateTime<FixedOffset>> {
        let utc = timestamp_secs_micros.and_then(|(secs, micros)| {
            let nanos = Duration::from_micros(micros.into()).subsec_nanos();
            ChronoDateTime::from_timestamp(secs, nanos)
        })?;

        // speedate reports the wall-clock timestamp, so the offset still has to be removed
        match offset_secs.and_then(FixedOffset::east_opt) {
            Some(offset) => utc
                .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))
                .map(|instant| instant.with_timezone(&offset)),
            None => Some(utc.fixed_offset()),
        }
    }
}
