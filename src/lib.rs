#![forbid(unsafe_code)]

//! Imports a channel's videos into a Blue Billywig VMS publication.
//!
//! `yt-dlp` writes one `.info.json` per video into the downloads directory;
//! the [`importer::Importer`] then walks those files, asks the VMS whether
//! each video was imported before, submits the new ones and keeps an audit
//! log of everything it did.

pub mod audit;
pub mod clock;
pub mod config;
pub mod downloader;
pub mod error;
pub mod importer;
pub mod scanner;
pub mod security;
pub mod token;
pub mod vms;

pub use error::{ImporterError, Result};
