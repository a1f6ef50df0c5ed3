use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File naming convention shared with the corpus generator:
/// `<prefix>-<shard>-<YYYYMMDD>-<HH>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingTemplate {
    pub prefix: String,
    pub extension: String,
}

impl Default for NamingTemplate {
    fn default() -> Self {
        Self {
            prefix: "Shard".into(),
            extension: "csv".into(),
        }
    }
}

impl NamingTemplate {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Glob-level match: right prefix and extension, content not yet validated.
    pub fn is_candidate(&self, file_name: &str) -> bool {
        file_name.starts_with(&format!("{}-", self.prefix))
            && file_name.ends_with(&format!(".{}", self.extension))
    }

    /// Render the file name for a shard at the given hour.
    pub fn file_name(&self, shard_id: u32, timestamp: NaiveDateTime) -> String {
        format!(
            "{}-{}-{}.{}",
            self.prefix,
            shard_id,
            timestamp.format("%Y%m%d-%H"),
            self.extension
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("expected 4 dash-separated segments, found {0}")]
    SegmentCount(usize),
    #[error("prefix `{0}` does not match template")]
    Prefix(String),
    #[error("missing `.{0}` extension")]
    Extension(String),
    #[error("shard id `{0}` is not a positive integer")]
    ShardId(String),
    #[error("date `{0}` is not a valid YYYYMMDD date")]
    Date(String),
    #[error("hour `{0}` is not a two-digit hour between 00 and 23")]
    Hour(String),
}

/// Identity triple decoded from an artifact file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedName {
    pub shard_id: u32,
    pub timestamp: NaiveDateTime,
}

pub fn parse_artifact_name(
    file_name: &str,
    template: &NamingTemplate,
) -> Result<ParsedName, NameError> {
    let stem = file_name
        .strip_suffix(&format!(".{}", template.extension))
        .ok_or_else(|| NameError::Extension(template.extension.clone()))?;
    let segments: Vec<&str> = stem.split('-').collect();
    if segments.len() != 4 {
        return Err(NameError::SegmentCount(segments.len()));
    }
    if segments[0] != template.prefix {
        return Err(NameError::Prefix(segments[0].to_string()));
    }

    let shard_id = parse_shard_id(segments[1])?;
    let date = parse_date(segments[2])?;
    let hour = parse_hour(segments[3])?;
    let timestamp = date
        .and_hms_opt(hour, 0, 0)
        .ok_or_else(|| NameError::Hour(segments[3].to_string()))?;

    Ok(ParsedName {
        shard_id,
        timestamp,
    })
}

fn parse_shard_id(raw: &str) -> Result<u32, NameError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NameError::ShardId(raw.to_string()));
    }
    match raw.parse::<u32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(NameError::ShardId(raw.to_string())),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, NameError> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NameError::Date(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").map_err(|_| NameError::Date(raw.to_string()))
}

fn parse_hour(raw: &str) -> Result<u32, NameError> {
    if raw.len() != 2 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NameError::Hour(raw.to_string()));
    }
    match raw.parse::<u32>() {
        Ok(hour) if hour < 24 => Ok(hour),
        _ => Err(NameError::Hour(raw.to_string())),
    }
}
