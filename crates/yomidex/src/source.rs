use std::fmt;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

/// Where the sheet export comes from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Source {
    Url(String),
    Path(PathBuf),
}

/// Failure to obtain the sheet text. `Display` is the message shown to users.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not fetch the sheet (HTTP {0}); check its sharing settings")]
    Status(StatusCode),
    #[error("could not reach the sheet: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Source {
    /// CSV export URL of a Google Sheets tab.
    pub fn google_sheet(sheet_id: &str, gid: &str) -> Self {
        Source::Url(format!(
            "https://docs.google.com/spreadsheets/d/{sheet_id}/gviz/tq?tqx=out:csv&gid={gid}"
        ))
    }

    /// `http(s)://` strings are URLs, everything else a filesystem path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Source::Url(raw.to_string())
        } else {
            Source::Path(PathBuf::from(raw))
        }
    }

    pub async fn fetch_text(&self, client: &reqwest::Client) -> Result<String, SourceError> {
        match self {
            Source::Url(url) => {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::Status(status));
                }
                let text = response.text().await?;
                info!("fetched {} bytes from {url}", text.len());
                Ok(text)
            }
            Source::Path(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => f.write_str(url),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}
