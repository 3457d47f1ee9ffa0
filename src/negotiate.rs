//! Content negotiation.
//!
//! Decides which headers a request carries and, when the caller did not name a data type,
//! which parser a response goes through based on its declared `Content-Type`.
use crate::settings::RequestSettings;
use std::fmt::Display;
use std::str::FromStr;

pub const X_REQUESTED_WITH: &str = "X-Requested-With";
pub const XML_HTTP_REQUEST: &str = "XMLHttpRequest";
pub const ANY_MIME_TYPE: &str = "*/*";

/// Logical response format. Drives parsing and the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Json,
    Xml,
    Html,
    Text,
    Script,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Json => "json",
            DataType::Xml => "xml",
            DataType::Html => "html",
            DataType::Text => "text",
            DataType::Script => "script",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(DataType::Json),
            "xml" => Ok(DataType::Xml),
            "html" => Ok(DataType::Html),
            "text" => Ok(DataType::Text),
            "script" => Ok(DataType::Script),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// Data type → accept string table. Order matters: classification picks the first match.
///
/// The table is read-only; replace it as a whole through the settings if needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTable {
    entries: Vec<(DataType, String)>,
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::new([
            (DataType::Xml, "application/xml, text/xml"),
            (DataType::Html, "text/html"),
            (DataType::Text, "text/plain"),
            (DataType::Json, "application/json"),
            (
                DataType::Script,
                "text/javascript, application/javascript, application/ecmascript",
            ),
        ])
    }
}

impl MimeTable {
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (DataType, S)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(dt, accept)| (dt, accept.into())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataType, &str)> {
        self.entries.iter().map(|(dt, accept)| (*dt, accept.as_str()))
    }

    /// Accept value for `data_type`, or `*/*` when unset or not in the table.
    pub fn accept_for(&self, data_type: Option<DataType>) -> &str {
        data_type
            .and_then(|dt| self.entries.iter().find(|(k, _)| *k == dt))
            .map(|(_, accept)| accept.as_str())
            .unwrap_or(ANY_MIME_TYPE)
    }

    /// Finds the data type whose accept string lists the media type of `content_type`.
    ///
    /// Parameters like `charset` are ignored, comparison is case-insensitive.
    pub fn classify(&self, content_type: Option<&str>) -> Option<DataType> {
        let essence = content_type?
            .split(';')
            .next()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())?;

        self.entries
            .iter()
            .find(|(_, accept)| {
                accept
                    .split(',')
                    .any(|candidate| candidate.trim().eq_ignore_ascii_case(&essence))
            })
            .map(|(dt, _)| *dt)
    }
}

/// Applies the derived request headers to `settings`:
/// 1. `X-Requested-With: XMLHttpRequest` for same-origin requests, unless already set
/// 2. `Content-Type` when the settings carry one
/// 3. `Accept` for the current data type
pub fn prepare_headers(settings: &mut RequestSettings) {
    if !settings.cross_domain && !settings.headers.contains(X_REQUESTED_WITH) {
        settings.headers.insert(X_REQUESTED_WITH, XML_HTTP_REQUEST);
    }

    if let Some(content_type) = &settings.content_type {
        settings.headers.insert("Content-Type", content_type.clone());
    }

    let accept = settings.mime_types.accept_for(settings.data_type).to_string();
    settings.headers.insert("Accept", accept);
}

/// Resolves the data type from a response `Content-Type` when the request did not fix one.
///
/// Returns the data type in effect afterwards. The `Accept` header is recomputed so the
/// settings handed to callbacks reflect the sniffed type.
pub fn classify_response_type(settings: &mut RequestSettings, content_type: Option<&str>) -> Option<DataType> {
    if settings.data_type.is_none() {
        settings.data_type = settings.mime_types.classify(content_type);
        prepare_headers(settings);
    }
    settings.data_type
}
