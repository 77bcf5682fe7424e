//! Track metadata and its inline string form
//!
//! The inline form separates fields with `" \x1E "` (space, record
//! separator, space); sub-fields such as the three title parts are joined
//! by a single space:
//!
//! ```text
//! composer | title1 title2 title3 | tpe1 tpe2 tpe3 tpe4 | date | album | genre | year | duration | part-of-set
//! ```

use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field separator byte
pub const FIELD_SEPARATOR: char = '\u{1E}';

/// Separator as written between fields
pub const INLINE_DELIM: &str = " \u{1E} ";

/// Number of fields in an inline string
pub const INLINE_FIELDS: usize = 9;

/// Tag metadata as read from an audio file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetaData {
    pub composer: String,
    pub title1: String,
    pub title2: String,
    pub title3: String,
    pub tpe1: String,
    pub tpe2: String,
    pub tpe3: String,
    pub tpe4: String,
    pub date: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
    /// Duration in seconds
    pub duration: i32,
    pub part_of_set: i32,
}

impl AudioMetaData {
    /// Encode as an inline string
    pub fn to_inline(&self) -> String {
        let title = [&self.title1, &self.title2, &self.title3]
            .map(|s| s.as_str())
            .join(" ");
        let performer = [&self.tpe1, &self.tpe2, &self.tpe3, &self.tpe4]
            .map(|s| s.as_str())
            .join(" ");
        [
            self.composer.clone(),
            title,
            performer,
            self.date.clone(),
            self.album.clone(),
            self.genre.clone(),
            self.year.to_string(),
            self.duration.to_string(),
            self.part_of_set.to_string(),
        ]
        .join(INLINE_DELIM)
    }
}

/// Parsed columns of a stored track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub composer: String,
    pub title: String,
    pub performer: String,
    pub date: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
    pub duration: i32,
    pub part: i32,
}

/// Strip control characters, spaces and DEL from both ends
fn trim_field(s: &str) -> &str {
    s.trim_matches(|c: char| (c as u32) < 33 || c as u32 == 127)
}

fn parse_int(field: &str, name: &str) -> Result<i32, StoreError> {
    let field = trim_field(field);
    if field.is_empty() {
        return Ok(0);
    }
    field
        .parse()
        .map_err(|_| StoreError::Malformed(format!("{} is not a number: {:?}", name, field)))
}

impl TrackRecord {
    /// Parse an inline string
    pub fn parse_inline(inline: &str) -> Result<Self, StoreError> {
        let inline = inline.trim_end_matches('\0');
        let fields: Vec<&str> = inline.split(FIELD_SEPARATOR).collect();
        if fields.len() != INLINE_FIELDS {
            return Err(StoreError::Malformed(format!(
                "expected {} fields, found {}",
                INLINE_FIELDS,
                fields.len()
            )));
        }

        Ok(Self {
            composer: trim_field(fields[0]).to_string(),
            title: trim_field(fields[1]).to_string(),
            performer: trim_field(fields[2]).to_string(),
            date: trim_field(fields[3]).to_string(),
            album: trim_field(fields[4]).to_string(),
            genre: trim_field(fields[5]).to_string(),
            year: parse_int(fields[6], "year")?,
            duration: parse_int(fields[7], "duration")?,
            part: parse_int(fields[8], "part")?,
        })
    }

    fn columns(&self) -> [String; INLINE_FIELDS] {
        [
            self.composer.clone(),
            self.title.clone(),
            self.performer.clone(),
            self.date.clone(),
            self.album.clone(),
            self.genre.clone(),
            self.year.to_string(),
            self.duration.to_string(),
            self.part.to_string(),
        ]
    }
}

/// A track as held by a store: its columns plus the insertion time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTrack {
    pub uid: u32,
    pub record: TrackRecord,
    pub time: DateTime<Utc>,
}

impl StoredTrack {
    /// Columns joined by the inline delimiter, the insertion time last.
    /// Empty text columns are rendered as a single space.
    pub fn to_inline(&self) -> String {
        let mut columns: Vec<String> = self
            .record
            .columns()
            .into_iter()
            .map(|c| if c.is_empty() { " ".to_string() } else { c })
            .collect();
        columns.push(self.time.format("%Y-%m-%d %H:%M:%S").to_string());
        columns.join(INLINE_DELIM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AudioMetaData {
        AudioMetaData {
            composer: "J.S. Bach".into(),
            title1: "Cello Suite No. 1".into(),
            title2: "Prelude".into(),
            tpe1: "Yo-Yo Ma".into(),
            date: "1983".into(),
            album: "Suites".into(),
            genre: "Classical".into(),
            year: 1983,
            duration: 150,
            part_of_set: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_layout() {
        let inline = sample().to_inline();
        assert_eq!(inline.matches(FIELD_SEPARATOR).count(), INLINE_FIELDS - 1);
        assert!(inline.starts_with("J.S. Bach \u{1E} Cello Suite No. 1 Prelude "));
        assert!(inline.ends_with(" \u{1E} 1983 \u{1E} 150 \u{1E} 1"));
    }

    #[test]
    fn test_parse_trims_fields() {
        let record = TrackRecord::parse_inline(&sample().to_inline()).unwrap();
        assert_eq!(record.composer, "J.S. Bach");
        assert_eq!(record.title, "Cello Suite No. 1 Prelude");
        assert_eq!(record.performer, "Yo-Yo Ma");
        assert_eq!(record.genre, "Classical");
        assert_eq!(record.year, 1983);
        assert_eq!(record.duration, 150);
        assert_eq!(record.part, 1);
    }

    #[test]
    fn test_parse_strips_nul_and_control_bytes() {
        let inline = "\t a \u{7F}\u{1E}b\u{1E}c\u{1E}d\u{1E}e\u{1E}f\u{1E} 7 \u{1E}8\u{1E}9\0";
        let record = TrackRecord::parse_inline(inline).unwrap();
        assert_eq!(record.composer, "a");
        assert_eq!(record.year, 7);
        assert_eq!(record.part, 9);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            TrackRecord::parse_inline("only \u{1E} two"),
            Err(StoreError::Malformed(_))
        ));
        let bad_year = "a\u{1E}b\u{1E}c\u{1E}d\u{1E}e\u{1E}f\u{1E}later\u{1E}8\u{1E}9";
        assert!(matches!(
            TrackRecord::parse_inline(bad_year),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_stored_track_renders_empty_columns() {
        let track = StoredTrack {
            uid: 1,
            record: TrackRecord {
                composer: "X".into(),
                ..Default::default()
            },
            time: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let inline = track.to_inline();
        assert!(inline.starts_with("X \u{1E}   \u{1E} "));
        assert!(inline.ends_with("1970-01-01 00:00:00"));
        assert_eq!(inline.matches(FIELD_SEPARATOR).count(), INLINE_FIELDS);
    }

    #[test]
    fn test_stored_track_json() {
        let track = StoredTrack {
            uid: 3,
            record: TrackRecord::parse_inline(&sample().to_inline()).unwrap(),
            time: DateTime::from_timestamp(86_400, 0).unwrap(),
        };
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["uid"], 3);
        assert_eq!(json["record"]["performer"], "Yo-Yo Ma");
        assert_eq!(json["time"], "1970-01-02T00:00:00Z");

        let back: StoredTrack = serde_json::from_value(json).unwrap();
        assert_eq!(back, track);
    }
}
