//! Earnings-call transcript parsing: speaker turns and header metadata.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Labels that look like speaker turns but introduce header metadata.
const HEADER_LABELS: &[&str] = &[
    "participants",
    "participant",
    "speakers",
    "speaker",
    "present",
    "attendees",
    "attendee",
    "date",
    "note",
    "time",
];

const MAX_SPEAKER_WORDS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub speaker: String,
    pub role: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMetadata {
    /// e.g. "Q3 FY24"
    pub quarter: Option<String>,
    pub call_date: Option<NaiveDate>,
    pub participants: Vec<String>,
}

fn speaker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<speaker>[A-Z][\w.'’ ]{0,59}?)(?:\s+[-–]\s+(?P<role>[^:]{1,80}?))?\s*:\s*(?P<text>.*)$",
        )
        .unwrap_or_else(|e| panic!("invalid speaker pattern: {e}"))
    })
}

fn quarter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Q[1-4]\s*(?:FY)?\s*\d{2}(?:\d{2})?")
            .unwrap_or_else(|e| panic!("invalid quarter pattern: {e}"))
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?P<day>\d{1,2})(?:st|nd|rd|th)?\s+(?P<month>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:tember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?),?\s+(?P<year>\d{4})\b",
        )
        .unwrap_or_else(|e| panic!("invalid date pattern: {e}"))
    })
}

fn participants_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:participants?|speakers?|present|attendees?):\s*([^\n]+)")
            .unwrap_or_else(|e| panic!("invalid participants pattern: {e}"))
    })
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

fn parse_turn(line: &str) -> Option<Segment> {
    let caps = speaker_re().captures(line)?;
    let speaker = caps.name("speaker")?.as_str().trim();
    let lowered = speaker.to_ascii_lowercase();
    if speaker.split_whitespace().count() > MAX_SPEAKER_WORDS
        || HEADER_LABELS.iter().any(|label| *label == lowered)
    {
        return None;
    }
    Some(Segment {
        speaker: speaker.to_string(),
        role: caps
            .name("role")
            .map(|r| r.as_str().trim().to_string())
            .filter(|r| !r.is_empty()),
        text: caps
            .name("text")
            .map(|t| t.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

/// Split a transcript into speaker turns.
///
/// A turn starts at a line shaped like `Name: text` or `Name - Role: text`;
/// following lines without a speaker continue it. Text before the first turn
/// is header material and is not returned.
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(turn) = parse_turn(trimmed) {
            segments.push(turn);
        } else if let Some(current) = segments.last_mut() {
            if !current.text.is_empty() {
                current.text.push(' ');
            }
            current.text.push_str(trimmed);
        }
    }
    segments.retain(|s| !s.text.is_empty());
    segments
}

/// Quarter, call date and participant list from a transcript header.
pub fn transcript_metadata(text: &str) -> TranscriptMetadata {
    let quarter = quarter_re()
        .find(text)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "));

    let call_date = date_re().captures(text).and_then(|caps| {
        let day = caps.name("day")?.as_str().parse().ok()?;
        let month = month_number(caps.name("month")?.as_str())?;
        let year = caps.name("year")?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });

    let participants = participants_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    TranscriptMetadata {
        quarter,
        call_date,
        participants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALL: &str = "\
Infosys Limited Q4 FY24 Earnings Conference Call
18th April 2024
Participants: Salil Parekh, Jayesh Sanghrajka

Operator: Ladies and gentlemen, good day and welcome.
Salil Parekh - Chief Executive Officer: Thank you. We had a strong quarter.
Large deal wins reached a record.
Analyst: Congratulations on the numbers. What drove margins?
Jayesh Sanghrajka - CFO: Cost optimisation: mostly utilisation.
";

    #[test]
    fn test_split_segments() {
        let segments = split_segments(CALL);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].speaker, "Operator");
        assert_eq!(segments[0].role, None);
        assert_eq!(segments[1].speaker, "Salil Parekh");
        assert_eq!(segments[1].role.as_deref(), Some("Chief Executive Officer"));
        assert_eq!(
            segments[1].text,
            "Thank you. We had a strong quarter. Large deal wins reached a record."
        );
        assert_eq!(segments[3].role.as_deref(), Some("CFO"));
        assert_eq!(segments[3].text, "Cost optimisation: mostly utilisation.");
    }

    #[test]
    fn test_header_lines_are_not_turns() {
        let segments = split_segments("Participants: A, B\nDate: 1 May 2024\n");
        assert!(segments.is_empty());
    }

    #[test]
    fn test_metadata() {
        let meta = transcript_metadata(CALL);
        assert_eq!(meta.quarter.as_deref(), Some("Q4 FY24"));
        assert_eq!(meta.call_date, NaiveDate::from_ymd_opt(2024, 4, 18));
        assert_eq!(meta.participants, vec!["Salil Parekh", "Jayesh Sanghrajka"]);
    }

    #[test]
    fn test_metadata_absent() {
        let meta = transcript_metadata("Nothing useful here.");
        assert_eq!(meta, TranscriptMetadata::default());
    }

    #[test]
    fn test_invalid_calendar_date_is_ignored() {
        let meta = transcript_metadata("Held on 31 February 2024");
        assert_eq!(meta.call_date, None);
    }
}
