//! Filtering, aggregates and CSV export over the call log

use std::collections::BTreeMap;
use std::io;

use chrono::{FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::call_log::{CallDirection, CallLogRecord, CallStatus};
use crate::Result;

pub const CSV_HEADERS: [&str; 8] = [
    "id",
    "to",
    "from",
    "startedAt",
    "endedAt",
    "durationSeconds",
    "status",
    "notes",
];

/// Offset used to bucket calls by local day and hour
pub fn fixed_offset(minutes: i32) -> FixedOffset {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFilter {
    #[default]
    All,
    Incoming,
    Outgoing,
    Completed,
    Missed,
    Error,
}

/// Log list view: hidden records are excluded unless `hidden` is set
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(default, alias = "showHidden")]
    pub hidden: bool,
    #[serde(default)]
    pub filter: LogFilter,
    #[serde(default)]
    pub search: Option<String>,
}

impl LogQuery {
    pub fn including_hidden() -> Self {
        Self {
            hidden: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &CallLogRecord, office_number: &str) -> bool {
        if record.hidden && !self.hidden {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !record.to_number.contains(search) && !record.from_number.contains(search) {
                return false;
            }
        }
        match self.filter {
            LogFilter::All => true,
            LogFilter::Incoming => record.direction(office_number) == CallDirection::Incoming,
            LogFilter::Outgoing => record.direction(office_number) == CallDirection::Outgoing,
            LogFilter::Completed => record.status == CallStatus::Completed,
            LogFilter::Missed => record.status == CallStatus::Canceled,
            LogFilter::Error => record.status == CallStatus::Error,
        }
    }

    pub fn apply<I>(&self, records: I, office_number: &str) -> Vec<CallLogRecord>
    where
        I: IntoIterator<Item = CallLogRecord>,
    {
        records
            .into_iter()
            .filter(|r| self.matches(r, office_number))
            .collect()
    }
}

/// Headline numbers for the dashboard
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub total_calls: u64,
    pub total_seconds: u64,
    pub total_minutes: u64,
    pub completed: u64,
    pub missed: u64,
    pub errors: u64,
    pub incoming: u64,
    pub outgoing: u64,
    /// Percent, rounded
    pub incoming_ratio: u32,
    pub outgoing_ratio: u32,
    /// Local hour with the most call starts; ties go to the earlier hour
    pub peak_hour: Option<u32>,
}

impl LogSummary {
    pub fn from_records(records: &[CallLogRecord], office_number: &str, offset: FixedOffset) -> Self {
        let mut summary = LogSummary::default();
        let mut per_hour: BTreeMap<u32, u64> = BTreeMap::new();

        for record in records {
            summary.total_calls += 1;
            summary.total_seconds += record.duration_seconds;
            match record.status {
                CallStatus::Completed => summary.completed += 1,
                CallStatus::Canceled => summary.missed += 1,
                CallStatus::Error => summary.errors += 1,
            }
            match record.direction(office_number) {
                CallDirection::Incoming => summary.incoming += 1,
                CallDirection::Outgoing => summary.outgoing += 1,
            }
            if let Some(started) = record.started_at {
                *per_hour
                    .entry(started.with_timezone(&offset).hour())
                    .or_default() += 1;
            }
        }

        summary.total_minutes = (summary.total_seconds + 30) / 60;
        summary.incoming_ratio = percent(summary.incoming, summary.total_calls);
        summary.outgoing_ratio = percent(summary.outgoing, summary.total_calls);
        summary.peak_hour = per_hour
            .iter()
            .fold(None, |best: Option<(u32, u64)>, (&hour, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((hour, count)),
            })
            .map(|(hour, _)| hour);
        summary
    }
}

fn percent(part: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Calls and talk time for one local day
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub total_calls: u64,
    pub total_duration: u64,
}

/// Newest day first; calls without a start time are skipped
pub fn daily_stats(records: &[CallLogRecord], offset: FixedOffset) -> Vec<DailyStats> {
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for record in records {
        let Some(started) = record.started_at else {
            continue;
        };
        let entry = days
            .entry(started.with_timezone(&offset).date_naive())
            .or_default();
        entry.0 += 1;
        entry.1 += record.duration_seconds;
    }
    days.into_iter()
        .rev()
        .map(|(day, (total_calls, total_duration))| DailyStats {
            day,
            total_calls,
            total_duration,
        })
        .collect()
}

pub fn write_csv<W: io::Write>(records: &[CallLogRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADERS)?;
    for record in records {
        wtr.write_record([
            record.id.to_string(),
            record.to_number.clone(),
            record.from_number.clone(),
            record.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            record.ended_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            record.duration_seconds.to_string(),
            record.status.to_string(),
            record.notes.replace(['\r', '\n'], " "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    const OFFICE: &str = "+493042430344";

    fn record(id: i64, from: &str, status: CallStatus, started: Option<DateTime<Utc>>) -> CallLogRecord {
        CallLogRecord {
            id,
            to_number: "+15550001".into(),
            from_number: from.into(),
            started_at: started,
            ended_at: None,
            duration_seconds: 60,
            status,
            hidden: false,
            notes: String::new(),
        }
    }

    #[test]
    fn filters_by_direction_status_and_search() {
        let records = vec![
            record(1, OFFICE, CallStatus::Completed, None),
            record(2, "+4917600000", CallStatus::Canceled, None),
            CallLogRecord {
                hidden: true,
                ..record(3, "+4917600000", CallStatus::Error, None)
            },
        ];

        let outgoing = LogQuery {
            filter: LogFilter::Outgoing,
            ..Default::default()
        };
        assert_eq!(outgoing.apply(records.clone(), OFFICE).len(), 1);

        let missed = LogQuery {
            filter: LogFilter::Missed,
            ..Default::default()
        };
        assert_eq!(missed.apply(records.clone(), OFFICE)[0].id, 2);

        let errors_hidden = LogQuery {
            hidden: true,
            filter: LogFilter::Error,
            search: Some("4917".into()),
        };
        assert_eq!(errors_hidden.apply(records.clone(), OFFICE)[0].id, 3);

        assert_eq!(LogQuery::default().apply(records, OFFICE).len(), 2);
    }

    #[test]
    fn summary_counts_and_peak_hour() {
        let at = |h| Some(Utc.with_ymd_and_hms(2024, 3, 4, h, 15, 0).unwrap());
        let records = vec![
            record(1, OFFICE, CallStatus::Completed, at(9)),
            record(2, "+4917600000", CallStatus::Completed, at(14)),
            record(3, "+4917600000", CallStatus::Error, at(14)),
            record(4, "+4917600000", CallStatus::Canceled, None),
        ];

        let summary = LogSummary::from_records(&records, OFFICE, fixed_offset(60));
        assert_eq!(summary.total_calls, 4);
        assert_eq!(summary.total_minutes, 4);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.missed, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.outgoing, 1);
        assert_eq!(summary.incoming_ratio, 75);
        assert_eq!(summary.peak_hour, Some(15));
    }

    #[test]
    fn daily_stats_group_by_local_day() {
        let records = vec![
            record(1, OFFICE, CallStatus::Completed, Some(Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap())),
            record(2, OFFICE, CallStatus::Completed, Some(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap())),
            record(3, OFFICE, CallStatus::Completed, None),
        ];
        let days = daily_stats(&records, fixed_offset(60));
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(days[0].total_calls, 1);
        assert_eq!(days[1].total_duration, 60);
    }

    #[test]
    fn csv_flattens_notes_and_quotes() {
        let mut r = record(7, OFFICE, CallStatus::Completed, None);
        r.notes = "call back,\nMonday".into();
        let mut out = Vec::new();
        write_csv(&[r], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,to,from,startedAt,endedAt,durationSeconds,status,notes");
        assert!(lines[1].starts_with("7,+15550001,+493042430344,,,60,completed,"));
        assert!(lines[1].ends_with("\"call back, Monday\""));
        assert_eq!(lines.len(), 2);
    }
}
