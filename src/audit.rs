//! Append-only audit log of import outcomes.
//!
//! One entry per line: a fixed-width timestamp, ` - `, then the message.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;

use crate::error::{ImporterError, Result};

/// `Oct 05 2026 09:03:07`: every field is zero padded so the width never changes.
pub const TIMESTAMP_FORMAT: &str = "%b %d %Y %H:%M:%S";
pub const TIMESTAMP_WIDTH: usize = 20;
pub const SEPARATOR: &str = " - ";

const LOG_NAME_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Log file used for one channel: the percent-encoded channel URL with a
/// `.log` extension, so every channel gets its own history.
pub fn log_file_for_channel(logs_path: &Path, channel_url: &str) -> PathBuf {
    let name = utf8_percent_encode(channel_url, LOG_NAME_ESCAPES).to_string();
    logs_path.join(format!("{name}.log"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl AuditLogEntry {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp: truncate_to_second(timestamp),
            message: message.into(),
        }
    }

    /// Encodes the entry as one line, including the trailing `\n`. Line
    /// breaks inside the message become spaces.
    pub fn encode(&self) -> String {
        let message = self.message.replace(['\r', '\n'], " ");
        format!(
            "{}{SEPARATOR}{message}\n",
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }

    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let stamp = line.get(..TIMESTAMP_WIDTH)?;
        let rest = line.get(TIMESTAMP_WIDTH..)?;
        let message = rest.strip_prefix(SEPARATOR)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        Some(Self {
            timestamp,
            message: message.to_owned(),
        })
    }
}

fn truncate_to_second(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// Log messages grouped by the second they were written in, in chronological
/// order. Messages sharing a timestamp keep their order in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImportBatchResult {
    entries: BTreeMap<DateTime<Utc>, Vec<String>>,
}

impl ImportBatchResult {
    fn push(&mut self, entry: AuditLogEntry) {
        self.entries
            .entry(entry.timestamp)
            .or_default()
            .push(entry.message);
    }

    /// Number of distinct timestamps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of individual messages across all timestamps.
    pub fn message_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<&[String]> {
        self.entries.get(timestamp).map(Vec::as_slice)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DateTime<Utc>, Vec<String>> {
        self.entries.iter()
    }

    /// Every message flattened back into log order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.values().flatten().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a ImportBatchResult {
    type Item = (&'a DateTime<Utc>, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, DateTime<Utc>, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the log file if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        File::create(&self.path)
            .map(drop)
            .map_err(|err| ImporterError::io_at("could not create the log file", &self.path, err))
    }

    pub fn append(&self, message: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_exists()?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|err| ImporterError::io_at("opening log file", &self.path, err))?;
        let line = AuditLogEntry::new(now, message).encode();
        file.write_all(line.as_bytes())
            .map_err(|err| ImporterError::io_at("writing log file", &self.path, err))
    }

    /// Replays the log. Lines that do not start with a valid timestamp are
    /// skipped, as are entries strictly before `since`.
    pub fn read_since(&self, since: Option<DateTime<Utc>>) -> Result<ImportBatchResult> {
        let since = since.map(truncate_to_second);
        let mut result = ImportBatchResult::default();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(result),
            Err(err) => return Err(ImporterError::io_at("opening log file", &self.path, err)),
        };

        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .map_err(|err| ImporterError::io_at("reading log file", &self.path, err))?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buffer);
            let Some(entry) = AuditLogEntry::decode(&line) else {
                continue;
            };
            if since.is_some_and(|since| entry.timestamp < since) {
                continue;
            }
            result.push(entry);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn encode_uses_fixed_width_prefix() {
        let line = AuditLogEntry::new(at(9, 3, 7), "hello").encode();
        assert_eq!(line, "Jan 05 2024 09:03:07 - hello\n");
        assert_eq!(line.find(SEPARATOR), Some(TIMESTAMP_WIDTH));
    }

    #[test]
    fn decode_reads_back_encoded_line() {
        let entry = AuditLogEntry::new(at(23, 59, 59), "body with - dashes");
        assert_eq!(AuditLogEntry::decode(&entry.encode()), Some(entry));
    }

    #[test]
    fn encode_flattens_multiline_messages() {
        let line = AuditLogEntry::new(at(1, 0, 0), "a\nb\r\nc").encode();
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(AuditLogEntry::decode(&line).unwrap().message, "a b  c");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(AuditLogEntry::decode(""), None);
        assert_eq!(AuditLogEntry::decode("garbage line that is long enough"), None);
        assert_eq!(AuditLogEntry::decode("Jan 05 2024 09:03:07 hello"), None);
        assert_eq!(AuditLogEntry::decode("Jan 45 2024 09:03:07 - hello"), None);
        assert_eq!(AuditLogEntry::decode("Jän 05 2024 09:03:0 - x"), None);
    }

    #[test]
    fn append_creates_file_and_preserves_order() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("channel.log"));
        assert!(!log.path().exists());
        for (index, message) in ["one", "two", "three"].iter().enumerate() {
            log.append(message, at(10, 0, index as u32)).unwrap();
        }
        let all = log.read_since(None).unwrap();
        assert_eq!(all.message_count(), 3);
        assert_eq!(all.messages().collect::<Vec<_>>(), vec!["one", "two", "three"]);
    }

    #[test]
    fn same_second_messages_share_a_key() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("channel.log"));
        log.append("first", at(10, 0, 0)).unwrap();
        log.append("second", at(10, 0, 0)).unwrap();
        let all = log.read_since(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(
            all.get(&at(10, 0, 0)).unwrap(),
            &["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn read_since_filters_by_timestamp() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("channel.log"));
        log.append("early", at(8, 0, 0)).unwrap();
        log.append("on time", at(9, 0, 0)).unwrap();
        log.append("late", at(10, 0, 0)).unwrap();

        let since_nine = log.read_since(Some(at(9, 0, 0))).unwrap();
        assert_eq!(since_nine.messages().collect::<Vec<_>>(), vec!["on time", "late"]);
        assert_eq!(log.read_since(Some(at(7, 0, 0))).unwrap().message_count(), 3);
        assert!(log.read_since(Some(at(11, 0, 0))).unwrap().is_empty());
    }

    #[test]
    fn read_since_skips_corrupt_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("channel.log");
        let mut contents = AuditLogEntry::new(at(9, 0, 0), "kept").encode();
        contents.push_str("this line is corrupt\n");
        contents.push('\n');
        contents.push_str(&AuditLogEntry::new(at(9, 0, 1), "also kept").encode());
        contents.push_str("Jan 05 2024 09:00:02 - no newline at end");
        fs::write(&path, contents).unwrap();

        let all = AuditLog::new(&path).read_since(None).unwrap();
        assert_eq!(
            all.messages().collect::<Vec<_>>(),
            vec!["kept", "also kept", "no newline at end"]
        );
    }

    #[test]
    fn read_since_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("never-written.log"));
        assert!(log.read_since(None).unwrap().is_empty());
    }

    #[test]
    fn append_fails_when_directory_is_missing() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("missing").join("channel.log"));
        let err = log.append("x", at(9, 0, 0)).unwrap_err();
        assert!(matches!(err, ImporterError::Io { .. }));
    }

    #[test]
    fn log_file_name_encodes_channel_url() {
        let path = log_file_for_channel(Path::new("/logs"), "https://www.youtube.com/@chan");
        assert_eq!(
            path,
            PathBuf::from("/logs/https%3A%2F%2Fwww.youtube.com%2F%40chan.log")
        );
    }
}
