//! Deadline export as an iCalendar event.

use chrono::{DateTime, NaiveDate, Utc};

use crate::db::Submission;

const STAMP: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// Download name: the title with whitespace runs turned into `_`.
    pub fn file_name(&self) -> String {
        format!("{}.ics", self.title.split_whitespace().collect::<Vec<_>>().join("_"))
    }
}

pub fn generate_ics(event: &CalendarEvent) -> String {
    [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("SUMMARY:{}", event.title),
        format!("DESCRIPTION:{}", event.description),
        format!("DTSTART:{}", event.start.format(STAMP)),
        format!("DTEND:{}", event.end.format(STAMP)),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ]
    .join("\n")
}

/// `None` when the record has no deadline.
pub fn deadline_event(record: &Submission) -> Option<CalendarEvent> {
    let at = record.deadline.and_then(midnight_utc)?;
    Some(CalendarEvent {
        title: format!("Review Deadline: {}", record.filename),
        description: format!("Deadline for document: {}", record.filename),
        start: at,
        end: at,
    })
}

fn midnight_utc(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Stage;

    #[test]
    fn deadline_renders_as_vevent() {
        let mut record = Submission::new("alice_lee_Stage2.pdf", Stage::Stage2, 1);
        assert!(deadline_event(&record).is_none());

        record.deadline = NaiveDate::from_ymd_opt(2024, 3, 9);
        let event = deadline_event(&record).unwrap();
        assert_eq!(event.file_name(), "Review_Deadline:_alice_lee_Stage2.pdf.ics");

        let ics = generate_ics(&event);
        assert!(ics.starts_with("BEGIN:VCALENDAR\nVERSION:2.0\nBEGIN:VEVENT\n"));
        assert!(ics.contains("SUMMARY:Review Deadline: alice_lee_Stage2.pdf\n"));
        assert!(ics.contains("DTSTART:20240309T000000Z\nDTEND:20240309T000000Z\n"));
        assert!(ics.ends_with("END:VEVENT\nEND:VCALENDAR"));
    }
}
