//! Raw input loading: local delimited files and the ticket blob.
//!
//! Any failure here is fatal for the run. There are no retries; a
//! transient blob failure surfaces to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;

use crate::config::SourceLocation;
use crate::error::{ConfigError, PipelineError, SourceError, SourceResult};
use crate::logs::{log_info, log_success};
use crate::models::RawTable;
use crate::parser::{parse_csv_bytes, parse_ndjson};

/// Matches the query string of a URL (SAS tokens live there).
static QUERY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?.*$").expect("valid regex"));

/// Strip the query string so SAS signatures never reach the logs.
pub fn redact_url(url: &str) -> String {
    QUERY_RE.replace(url, "?<redacted>").into_owned()
}

/// How a source's payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Ndjson,
}

/// Load one raw input into a table.
pub async fn load_source(
    name: &str,
    location: &SourceLocation,
    format: SourceFormat,
    csv_delimiter: Option<char>,
) -> Result<RawTable, PipelineError> {
    let (label, bytes) = match location {
        SourceLocation::File { path } => (path.display().to_string(), read_file(path)?),
        SourceLocation::Blob { timeout_secs, .. } => {
            let url = location
                .blob_url(name)?
                .ok_or_else(|| ConfigError::MissingUrl(name.to_string()))?;
            let bytes = fetch_blob(&url, Duration::from_secs(*timeout_secs)).await?;
            (redact_url(&url), bytes)
        }
    };

    let table = decode_source(&label, &bytes, format, csv_delimiter)?;
    log_success(format!(
        "Loaded {}: {} rows, {} columns",
        name,
        table.len(),
        table.columns.len()
    ));
    Ok(table)
}

/// Parse a source payload according to its format.
pub fn decode_source(
    label: &str,
    bytes: &[u8],
    format: SourceFormat,
    csv_delimiter: Option<char>,
) -> SourceResult<RawTable> {
    match format {
        SourceFormat::Csv => {
            let result = parse_csv_bytes(bytes, csv_delimiter).map_err(|e| SourceError::Csv {
                path: label.to_string(),
                message: e.to_string(),
            })?;
            log_info(format!(
                "{}: encoding {}, delimiter '{}'",
                label,
                result.encoding,
                result.delimiter.escape_default()
            ));
            Ok(result.table)
        }
        SourceFormat::Ndjson => {
            let content = std::str::from_utf8(bytes).map_err(|e| {
                let valid = &bytes[..e.valid_up_to()];
                SourceError::Ndjson {
                    path: label.to_string(),
                    line: valid.iter().filter(|&&b| b == b'\n').count() + 1,
                    message: format!("invalid UTF-8: {}", e),
                }
            })?;
            parse_ndjson(content).map_err(|e| SourceError::Ndjson {
                path: label.to_string(),
                line: e.line,
                message: e.message,
            })
        }
    }
}

fn read_file(path: &Path) -> SourceResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Single authenticated GET of a pre-authorized blob URL.
pub async fn fetch_blob(url: &str, timeout: Duration) -> SourceResult<Vec<u8>> {
    let redacted = redact_url(url);
    log_info(format!("Fetching blob {}", redacted));

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Unreachable {
            url: redacted.clone(),
            message: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Unreachable {
            url: redacted.clone(),
            message: e.without_url().to_string(),
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(SourceError::Unauthorized {
            url: redacted,
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(SourceError::Unreachable {
            url: redacted,
            message: format!("HTTP {}", status),
        });
    }

    let bytes = response.bytes().await.map_err(|e| SourceError::Unreachable {
        url: redacted.clone(),
        message: e.without_url().to_string(),
    })?;
    Ok(bytes.to_vec())
}
