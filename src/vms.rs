//! Blue Billywig VMS API: duplicate search and URL import.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ImporterError, Result};

pub const SEARCH_PATH: &str = "/sapi/mediaclip";
pub const IMPORT_PATH: &str = "/sapi/import";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote operations the importer depends on.
pub trait VmsApi: Send + Sync {
    /// Whether a clip imported from `video_url` already exists. Never fails:
    /// anything other than a clear positive answer counts as "not found".
    fn search_by_source_url(&self, video_url: &str, token: &str) -> SearchOutcome;

    /// Submits `video_url` for import and returns the response body, whatever
    /// the HTTP status. Errors only when no response was received.
    fn submit_import(&self, video_url: &str, token: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub found: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportRequest<'a> {
    pub url: &'a str,
}

/// Query clause the VMS matches against clips it imported itself. The
/// `imported-from:` prefix is assigned by the VMS on import.
pub fn source_id_query(video_url: &str) -> String {
    format!("sourceid:\"imported-from:{video_url}\"")
}

pub fn publication_base_url(publication_name: &str) -> String {
    format!("https://{publication_name}.bbvms.com")
}

#[derive(Debug, Clone)]
pub struct VmsClient {
    agent: ureq::Agent,
    base_url: String,
}

impl VmsClient {
    pub fn for_publication(publication_name: &str) -> Self {
        Self::with_base_url(publication_base_url(publication_name))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: &str, path: &str, token: &str) -> ureq::Request {
        self.agent
            .request(method, &format!("{}{path}", self.base_url))
            .set("rpctoken", token)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
    }
}

impl VmsApi for VmsClient {
    fn search_by_source_url(&self, video_url: &str, token: &str) -> SearchOutcome {
        let response = self
            .request("GET", SEARCH_PATH, token)
            .query("q", &source_id_query(video_url))
            .call();

        let found = match response {
            Ok(response) if response.status() == 200 => match response.into_string() {
                Ok(body) => numfound_is_positive(&body),
                Err(err) => {
                    warn!(url = video_url, error = %err, "could not read search response");
                    false
                }
            },
            Ok(response) => {
                warn!(url = video_url, status = response.status(), "unexpected search status");
                false
            }
            Err(ureq::Error::Status(status, _)) => {
                warn!(url = video_url, status, "search request rejected");
                false
            }
            Err(ureq::Error::Transport(err)) => {
                warn!(url = video_url, error = %err, "search request failed");
                false
            }
        };
        debug!(url = video_url, found, "duplicate search finished");
        SearchOutcome { found }
    }

    fn submit_import(&self, video_url: &str, token: &str) -> Result<String> {
        let body = serde_json::to_string(&ImportRequest { url: video_url })
            .map_err(|err| ImporterError::Data(format!("serializing import request: {err}")))?;

        let response = match self.request("POST", IMPORT_PATH, token).send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                debug!(url = video_url, status, "import request returned an error status");
                response
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(ImporterError::Transport(err.to_string()));
            }
        };

        response
            .into_string()
            .map_err(|err| ImporterError::Transport(format!("reading import response: {err}")))
    }
}

/// `numfound` may come back as a number or a numeric string.
fn numfound_is_positive(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    match value.get("numfound") {
        Some(Value::Number(number)) => number.as_f64().is_some_and(|count| count > 0.0),
        Some(Value::String(text)) => text.trim().parse::<u64>().is_ok_and(|count| count > 0),
        _ => false,
    }
}
