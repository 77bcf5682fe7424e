//! Track metadata from ID3 tags
//!
//! ID3v2 frames win over ID3v1 fields when a file carries both. Files
//! without a tag are described by their file stem.

use auscout_db::AudioMetaData;
use id3::{Tag, TagLike};
use std::path::Path;

/// Metadata for `path`, with `duration_secs` from the decoded audio
pub fn read_metadata(path: &Path, duration_secs: f64) -> AudioMetaData {
    let mut meta = match id3::v1v2::read_from_path(path) {
        Ok(tag) => from_tag(&tag),
        Err(e) => {
            if !matches!(e.kind, id3::ErrorKind::NoTag) {
                log::debug!("unreadable tag in {}: {}", path.display(), e);
            }
            AudioMetaData::default()
        }
    };

    if [&meta.title1, &meta.title2, &meta.title3]
        .iter()
        .all(|t| t.is_empty())
    {
        meta.title1 = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    meta.duration = duration_secs.round() as i32;
    meta
}

fn from_tag(tag: &Tag) -> AudioMetaData {
    let frame = |id: &str| {
        tag.get(id)
            .and_then(|f| f.content().text())
            .map(clean)
            .unwrap_or_default()
    };
    let text = |value: Option<&str>| value.map(clean).unwrap_or_default();

    let date = match frame("TDAT") {
        d if d.is_empty() => tag
            .date_recorded()
            .map(|ts| ts.to_string())
            .unwrap_or_default(),
        d => d,
    };

    AudioMetaData {
        composer: text(tag.artist()),
        title1: frame("TIT1"),
        title2: text(tag.title()),
        title3: frame("TIT3"),
        tpe1: frame("TPE1"),
        tpe2: frame("TPE2"),
        tpe3: frame("TPE3"),
        tpe4: frame("TPE4"),
        date,
        album: text(tag.album()),
        genre: text(tag.genre()),
        year: tag
            .year()
            .or_else(|| tag.date_recorded().map(|ts| ts.year))
            .unwrap_or_default(),
        duration: 0,
        part_of_set: tag.disc().map_or(0, |n| n as i32),
    }
}

/// Single-line text without the inline field separator
fn clean(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\0' | '\r' | '\n' | '\u{1E}' => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use id3::{Frame, Version};
    use std::fs;
    use tempfile::TempDir;

    fn untagged(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, vec![0u8; 512]).unwrap();
        path
    }

    #[test]
    fn test_id3v2_fields() {
        let dir = TempDir::new().unwrap();
        let path = untagged(&dir, "01-track.mp3");

        let mut tag = Tag::new();
        tag.set_title("Copper Sky");
        tag.set_artist("Ada Lind");
        tag.set_album("Weathervane");
        tag.set_genre("Ambient");
        tag.set_year(1999);
        tag.set_disc(2);
        tag.add_frame(Frame::text("TIT1", "Field Recordings"));
        tag.add_frame(Frame::text("TIT3", "Second take"));
        tag.add_frame(Frame::text("TPE2", "The Lind Trio"));
        tag.add_frame(Frame::text("TDAT", "0304"));
        tag.write_to_path(&path, Version::Id3v23).unwrap();

        let meta = read_metadata(&path, 241.6);
        assert_eq!(meta.title1, "Field Recordings");
        assert_eq!(meta.title2, "Copper Sky");
        assert_eq!(meta.title3, "Second take");
        assert_eq!(meta.composer, "Ada Lind");
        assert_eq!(meta.tpe1, "Ada Lind");
        assert_eq!(meta.tpe2, "The Lind Trio");
        assert_eq!(meta.album, "Weathervane");
        assert_eq!(meta.genre, "Ambient");
        assert_eq!(meta.date, "0304");
        assert_eq!(meta.year, 1999);
        assert_eq!(meta.part_of_set, 2);
        assert_eq!(meta.duration, 242);
    }

    #[test]
    fn test_id3v1_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.mp3");

        let field = |s: &str, len: usize| {
            let mut bytes = s.as_bytes().to_vec();
            bytes.resize(len, 0);
            bytes
        };
        let mut bytes = vec![0u8; 512];
        bytes.extend_from_slice(b"TAG");
        bytes.extend(field("Night Ferry", 30));
        bytes.extend(field("Harbour Lights", 30));
        bytes.extend(field("Crossings", 30));
        bytes.extend(field("1987", 4));
        bytes.extend(field("", 30));
        bytes.push(255);
        fs::write(&path, bytes).unwrap();

        let meta = read_metadata(&path, 10.0);
        assert_eq!(meta.title2, "Night Ferry");
        assert_eq!(meta.composer, "Harbour Lights");
        assert_eq!(meta.album, "Crossings");
        assert!(meta.title1.is_empty());
    }

    #[test]
    fn test_untagged_file_uses_stem() {
        let dir = TempDir::new().unwrap();
        let path = untagged(&dir, "field-notes.wav");
        let meta = read_metadata(&path, 3.2);
        assert_eq!(meta.title1, "field-notes");
        assert!(meta.composer.is_empty());
        assert_eq!(meta.duration, 3);
    }

    #[test]
    fn test_clean_strips_separators() {
        assert_eq!(clean(" a\u{1E}b\nc\0 "), "a b c");
    }
}
