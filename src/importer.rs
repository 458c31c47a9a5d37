//! Drives one import batch: scan the downloads directory, skip what the VMS
//! already has, submit the rest and report what was logged along the way.
//!
//! A metadata file is only removed once the VMS answered its import request
//! or reported it as a duplicate. Everything else stays on disk and is picked
//! up again by the next run, so a crash or a network outage never loses a
//! video. One bad file never stops the batch.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audit::{AuditLog, ImportBatchResult};
use crate::clock::{Clock, SystemClock};
use crate::config::ImporterConfig;
use crate::downloader::{Downloader, YtDlp};
use crate::error::{ImporterError, Result};
use crate::scanner::{self, ParseOutcome, PendingRecord};
use crate::token::generate_token;
use crate::vms::{VmsApi, VmsClient};

/// Where a single metadata file ended up after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    InvalidSkipped,
    DuplicateSkipped,
    Submitted,
    FailedRetained,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub invalid: usize,
    pub duplicates: usize,
    pub submitted: usize,
    pub failed: usize,
}

impl BatchCounts {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::InvalidSkipped => self.invalid += 1,
            ItemOutcome::DuplicateSkipped => self.duplicates += 1,
            ItemOutcome::Submitted => self.submitted += 1,
            ItemOutcome::FailedRetained => self.failed += 1,
        }
    }
}

impl fmt::Display for BatchCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted, {} duplicate, {} invalid, {} failed",
            self.submitted, self.duplicates, self.invalid, self.failed
        )
    }
}

pub struct Importer {
    config: ImporterConfig,
    audit: AuditLog,
    downloader: Arc<dyn Downloader>,
    vms: Arc<dyn VmsApi>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("channel_url", &self.config.channel_url)
            .field("publication_name", &self.config.publication_name)
            .field("log_file", &self.audit.path())
            .finish_non_exhaustive()
    }
}

impl Importer {
    /// Importer talking to the real publication and running `yt-dlp` from `PATH`.
    pub fn new(config: ImporterConfig) -> Result<Self> {
        Self::with_downloader_program(config, crate::downloader::DEFAULT_YT_DLP)
    }

    pub fn with_downloader_program(
        config: ImporterConfig,
        program: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let vms = VmsClient::for_publication(&config.publication_name);
        Self::with_collaborators(
            config,
            Arc::new(YtDlp::new(program)),
            Arc::new(vms),
            Arc::new(SystemClock),
        )
    }

    /// Validates the configuration and checks the downloader can be run.
    pub fn with_collaborators(
        config: ImporterConfig,
        downloader: Arc<dyn Downloader>,
        vms: Arc<dyn VmsApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        downloader.ensure_available()?;
        let audit = AuditLog::new(config.log_file());
        Ok(Self {
            config,
            audit,
            downloader,
            vms,
            clock,
        })
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Downloads and imports in one go.
    pub fn run(&self) -> Result<ImportBatchResult> {
        self.download()?;
        self.import_downloads()
    }

    /// Lets the downloader refresh the metadata files for the channel. A
    /// failing exit status is logged but not fatal: whatever files it did
    /// write are still worth importing.
    pub fn download(&self) -> Result<()> {
        let status = self.downloader.invoke(
            &self.config.downloader_params,
            &self.config.downloads_path,
            &self.config.channel_url,
        )?;
        if !status.success() {
            warn!(channel = %self.config.channel_url, %status, "downloader exited with failure");
            self.log(&format!(
                "Downloader exited with {status} for {}",
                self.config.channel_url
            ))?;
        }
        Ok(())
    }

    /// Processes every pending metadata file and returns the log entries
    /// written since the batch started.
    pub fn import_downloads(&self) -> Result<ImportBatchResult> {
        let started = self.clock.now();
        let mut counts = BatchCounts::default();

        for record in scanner::scan(&self.config.downloads_path)? {
            let outcome = self.process(record)?;
            counts.record(outcome);
        }

        info!(channel = %self.config.channel_url, %counts, "import batch finished");
        self.audit.read_since(Some(started))
    }

    fn process(&self, record: PendingRecord) -> Result<ItemOutcome> {
        let PendingRecord { path, outcome } = record;
        let shown = path.display();
        let (detail, message) = match outcome {
            ParseOutcome::Valid(video) => return self.submit_or_skip(&path, &video.webpage_url),
            ParseOutcome::InvalidJson(reason) => (
                format!("invalid json: {reason}"),
                format!("The following file does not contain valid json: {shown}"),
            ),
            ParseOutcome::MissingUrlField => (
                "missing webpage_url".to_string(),
                format!("The following file does not contain the webpage_url of the video: {shown}"),
            ),
            ParseOutcome::Unreadable(reason) => (
                format!("unreadable: {reason}"),
                format!("The following file could not be read: {shown} ({reason})"),
            ),
        };
        let error = ImporterError::Data(format!("{shown}: {detail}"));
        warn!(%error, "skipping metadata file");
        self.log(&message)?;
        Ok(ItemOutcome::InvalidSkipped)
    }

    fn submit_or_skip(&self, path: &Path, url: &str) -> Result<ItemOutcome> {
        if self.config.dedupe && self.already_imported(url) {
            info!(url, path = %path.display(), "video already imported");
            self.log(&format!(
                "Video already imported, skipping: {url} - {}",
                path.display()
            ))?;
            self.remove_consumed(path)?;
            return Ok(ItemOutcome::DuplicateSkipped);
        }

        let response = generate_token(&self.config.shared_secret, self.clock.now())
            .and_then(|token| self.vms.submit_import(url, &token));
        match response {
            Ok(body) => {
                info!(url, path = %path.display(), "video submitted");
                self.log(&body)?;
                self.remove_consumed(path)?;
                self.clock.sleep(self.config.throttle);
                Ok(ItemOutcome::Submitted)
            }
            Err(err) => {
                warn!(url, path = %path.display(), error = %err, "import request failed");
                self.log(&format!("Exception: {err} - {}", path.display()))?;
                Ok(ItemOutcome::FailedRetained)
            }
        }
    }

    /// Any doubt resolves to "not imported yet".
    fn already_imported(&self, url: &str) -> bool {
        match generate_token(&self.config.shared_secret, self.clock.now()) {
            Ok(token) => self.vms.search_by_source_url(url, &token).found,
            Err(err) => {
                warn!(url, error = %err, "could not sign duplicate search");
                false
            }
        }
    }

    fn remove_consumed(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed metadata file");
                Ok(())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not remove metadata file");
                self.log(&format!("Could not remove {}: {err}", path.display()))
            }
        }
    }

    fn log(&self, message: &str) -> Result<()> {
        self.audit.append(message, self.clock.now())
    }
}
