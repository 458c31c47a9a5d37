//! Discovers the `.info.json` files yt-dlp leaves in the downloads directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::{ImporterError, Result};

pub const INFO_JSON_SUFFIX: &str = ".info.json";

/// The part of a yt-dlp `.info.json` the importer cares about. Every other
/// field is kept untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoMetadataRecord {
    pub webpage_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Valid(VideoMetadataRecord),
    InvalidJson(String),
    MissingUrlField,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub path: PathBuf,
    pub outcome: ParseOutcome,
}

/// Lists the metadata files currently in `directory`. Files are only opened
/// when the returned iterator reaches them.
pub fn scan(directory: &Path) -> Result<PendingRecords> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| {
            let context = format!("reading downloads directory {}", directory.display());
            match err.into_io_error() {
                Some(source) => ImporterError::io(context, source),
                None => ImporterError::Configuration(context),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(INFO_JSON_SUFFIX) {
            continue;
        }
        paths.push(entry.into_path());
    }
    Ok(PendingRecords {
        paths: paths.into_iter(),
    })
}

#[derive(Debug)]
pub struct PendingRecords {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for PendingRecords {
    type Item = PendingRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let outcome = match fs::read_to_string(&path) {
            Ok(contents) => parse_record(&contents),
            Err(err) => ParseOutcome::Unreadable(err.to_string()),
        };
        Some(PendingRecord { path, outcome })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// A `webpage_url` that is absent, null or not a string counts as missing.
pub fn parse_record(contents: &str) -> ParseOutcome {
    let value: Value = match serde_json::from_str(contents) {
        Ok(value) => value,
        Err(err) => return ParseOutcome::InvalidJson(err.to_string()),
    };
    match value.get("webpage_url") {
        Some(Value::String(_)) => {}
        _ => return ParseOutcome::MissingUrlField,
    }
    match VideoMetadataRecord::deserialize(value) {
        Ok(record) => ParseOutcome::Valid(record),
        Err(_) => ParseOutcome::MissingUrlField,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn parse_record_keeps_extra_fields() {
        let outcome = parse_record(r#"{"webpage_url":"https://youtu.be/a","id":"a","duration":12}"#);
        let ParseOutcome::Valid(record) = outcome else {
            panic!("expected a valid record, got {outcome:?}");
        };
        assert_eq!(record.webpage_url, "https://youtu.be/a");
        assert_eq!(record.extra.get("id"), Some(&Value::from("a")));
        assert!(!record.extra.contains_key("webpage_url"));
    }

    #[test]
    fn parse_record_reports_invalid_json() {
        assert!(matches!(
            parse_record("{\"webpage_url\": "),
            ParseOutcome::InvalidJson(_)
        ));
    }

    #[test]
    fn parse_record_requires_string_url() {
        assert_eq!(parse_record(r#"{"id":"a"}"#), ParseOutcome::MissingUrlField);
        assert_eq!(
            parse_record(r#"{"webpage_url":null}"#),
            ParseOutcome::MissingUrlField
        );
        assert_eq!(
            parse_record(r#"{"webpage_url":42}"#),
            ParseOutcome::MissingUrlField
        );
        assert_eq!(parse_record("[1,2]"), ParseOutcome::MissingUrlField);
    }

    #[test]
    fn scan_only_yields_info_json_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "b.info.json", "not json");
        write(dir.path(), "a.info.json", r#"{"webpage_url":"https://youtu.be/a"}"#);
        write(dir.path(), "a.description", "text");
        write(dir.path(), "notes.json", "{}");
        fs::create_dir(dir.path().join("nested.info.json")).unwrap();

        let records: Vec<_> = scan(dir.path()).unwrap().collect();
        let names: Vec<_> = records
            .iter()
            .map(|record| record.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.info.json", "b.info.json"]);
        assert!(matches!(records[0].outcome, ParseOutcome::Valid(_)));
        assert!(matches!(records[1].outcome, ParseOutcome::InvalidJson(_)));
    }

    #[test]
    fn rescanning_reflects_deleted_files() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.info.json", r#"{"webpage_url":"u"}"#);
        assert_eq!(scan(dir.path()).unwrap().count(), 1);
        fs::remove_file(path).unwrap();
        assert_eq!(scan(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_removed_after_listing_is_reported_unreadable() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "a.info.json", r#"{"webpage_url":"u"}"#);
        let mut records = scan(dir.path()).unwrap();
        fs::remove_file(path).unwrap();
        assert!(matches!(
            records.next().unwrap().outcome,
            ParseOutcome::Unreadable(_)
        ));
    }

    #[test]
    fn scan_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let err = scan(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ImporterError::Io { .. }));
    }
}
