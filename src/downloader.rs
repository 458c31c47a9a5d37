//! The external metadata downloader (yt-dlp).

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use tracing::{debug, info};

use crate::error::{ImporterError, Result};

pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(channel_id)s.%(upload_date)s.%(id)s.%(title)s.%(ext)s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderParams {
    /// Only write metadata, never the media itself.
    pub skip_download: bool,
    /// Resume partially downloaded files.
    pub continue_partial: bool,
    pub output_template: String,
}

impl Default for DownloaderParams {
    fn default() -> Self {
        Self {
            skip_download: true,
            continue_partial: true,
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
        }
    }
}

impl DownloaderParams {
    /// Command-line arguments for a run writing into `target_dir`.
    pub fn to_args(&self, target_dir: &Path) -> Vec<String> {
        let mut args = vec!["--write-info-json".to_string()];
        if self.skip_download {
            args.push("--skip-download".into());
        }
        if self.continue_partial {
            args.push("--continue".into());
        }
        args.push("--output".into());
        args.push(
            target_dir
                .join(&self.output_template)
                .to_string_lossy()
                .into_owned(),
        );
        args
    }
}

pub trait Downloader: Send + Sync {
    /// Fails when the tool cannot be run at all.
    fn ensure_available(&self) -> Result<()>;

    fn invoke(
        &self,
        params: &DownloaderParams,
        target_dir: &Path,
        source_url: &str,
    ) -> Result<ExitStatus>;
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_YT_DLP)
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Downloader for YtDlp {
    /// Runs `<program> --version` so a missing install fails before any batch.
    fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(ImporterError::Configuration(format!(
                "{} is installed but returned {status}",
                self.program.display()
            ))),
            Err(err) => Err(ImporterError::Configuration(format!(
                "{} is not installed or not in PATH: {err}",
                self.program.display()
            ))),
        }
    }

    fn invoke(
        &self,
        params: &DownloaderParams,
        target_dir: &Path,
        source_url: &str,
    ) -> Result<ExitStatus> {
        let args = params.to_args(target_dir);
        debug!(program = %self.program.display(), ?args, "running downloader");
        info!(url = source_url, target = %target_dir.display(), "fetching channel metadata");

        Command::new(&self.program)
            .args(&args)
            .arg(source_url)
            .stdin(Stdio::null())
            .status()
            .map_err(|err| {
                ImporterError::io(format!("running {}", self.program.display()), err)
            })
    }
}
