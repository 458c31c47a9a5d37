#![forbid(unsafe_code)]

//! Fetches a channel's metadata with yt-dlp and imports every new video into
//! a Blue Billywig publication. Meant to be run periodically, one job per
//! channel/publication pair.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vms_importer::{
    audit::{ImportBatchResult, TIMESTAMP_FORMAT},
    config::{ConfigOverrides, resolve_config},
    importer::Importer,
    security::refuse_root,
};

#[derive(Debug, Parser)]
#[command(name = "import_channel", version, about)]
struct Args {
    /// Channel to import, e.g. https://www.youtube.com/@name
    #[arg(long)]
    channel_url: Option<String>,
    /// Publication name as it appears in https://<name>.bbvms.com
    #[arg(long)]
    publication: Option<String>,
    /// `<token id>-<seed>` shared secret of the publication
    #[arg(long)]
    shared_secret: Option<String>,
    #[arg(long)]
    downloads_path: Option<PathBuf>,
    #[arg(long)]
    logs_path: Option<PathBuf>,
    /// Pause after every successful submission
    #[arg(long)]
    throttle_seconds: Option<u64>,
    /// Submit without asking the VMS for an earlier import first
    #[arg(long)]
    no_dedupe: bool,
    /// Only import metadata already present in the downloads directory
    #[arg(long)]
    skip_download: bool,
    /// Path to the yt-dlp executable
    #[arg(long)]
    yt_dlp: Option<PathBuf>,
    /// Env file with defaults for the options above
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
    /// Print the batch summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            channel_url: self.channel_url.clone(),
            publication_name: self.publication.clone(),
            shared_secret: self.shared_secret.clone(),
            downloads_path: self.downloads_path.clone(),
            logs_path: self.logs_path.clone(),
            throttle_seconds: self.throttle_seconds,
            dedupe: self.no_dedupe.then_some(false),
            yt_dlp: self.yt_dlp.clone(),
            env_path: Some(self.env_file.clone()),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    refuse_root("import_channel")?;

    let args = Args::parse();
    let resolved = resolve_config(args.overrides()).context("loading configuration")?;
    let importer = Importer::with_downloader_program(resolved.importer, resolved.yt_dlp)
        .context("initializing importer")?;

    println!("Channel: {}", importer.config().channel_url);
    println!("Publication: {}", importer.config().publication_name);
    println!("Log file: {}", importer.audit_log().path().display());
    println!();

    let summary = if args.skip_download {
        importer.import_downloads()
    } else {
        importer.run()
    }
    .context("running import")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serializing summary")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ImportBatchResult) {
    if summary.is_empty() {
        println!("Nothing to import.");
        return;
    }
    for (timestamp, messages) in summary {
        for message in messages {
            println!("{} - {}", timestamp.format(TIMESTAMP_FORMAT), message);
        }
    }
}
