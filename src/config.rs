//! Default request settings.
//!
//! [`AjaxSettings`] is the bottom layer of every request: per-call [`AjaxOptions`]
//! are merged on top of it when a request is issued. Settings can be passed explicitly
//! to an [`Ajax`](crate::Ajax) dispatcher, or changed process-wide through
//! [`set_ajax_settings`] / [`update_ajax_settings`].
//!
//! Since settings are resolved when a request is issued, changing the defaults only
//! affects requests issued afterwards.
//!
//! # Examples
//!
//! ```rust
//! use gosub_ajax::config::AjaxSettings;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = AjaxSettings::builder()
//!     .timeout_ms(1000)
//!     .header("X-App", "gosub")
//!     .build()?; // returns Result<AjaxSettings, AjaxConfigError>
//! assert_eq!(cfg.timeout, 1000);
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `method`: Default method (default: `GET`).
//! - `is_async`: Run requests in the background (default: `true`).
//! - `success` / `error`: Callbacks used when a request does not bring its own.
//! - `context`: Context handed to callbacks (default: the request settings).
//! - `headers`: Headers sent with every request.
//! - `data`: Data sent with every request that does not bring its own.
//! - `transport_factory`: Creates the native request object (default: reqwest based).
//! - `cross_domain`: Treat every request as cross-origin (default: `false`).
//! - `timeout`: Timeout in milliseconds, `0` disables it (default: `0`).
//! - `content_type`: `Content-Type` header (default: form urlencoded, UTF-8).
//! - `mime_types`: Data type → accept string table.
//!
//! [`AjaxOptions`]: crate::settings::AjaxOptions
use crate::callbacks::{ErrorCallback, SuccessCallback};
use crate::negotiate::MimeTable;
use crate::param::RequestData;
use crate::settings::{Context, Headers, Method};
use crate::transport::native::TransportFactory;
use lazy_static::lazy_static;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_USER_AGENT: &str = "Gosub/1.0 (X11; Linux x86_64) Gecko/20250802 GosubBrowser/1.0";
pub const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

#[derive(Clone)]
pub struct AjaxSettings {
    pub method: Method,
    pub is_async: bool,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
    pub context: Option<Context>,
    pub headers: Headers,
    pub data: Option<RequestData>,
    pub transport_factory: TransportFactory,
    pub cross_domain: bool,
    pub timeout: u64,
    pub content_type: Option<String>,
    pub mime_types: Arc<MimeTable>,
}

impl Default for AjaxSettings {
    fn default() -> Self {
        Self {
            method: Method::Get,
            is_async: true,
            success: None,
            error: None,
            context: None,
            headers: Headers::new(),
            data: None,
            transport_factory: TransportFactory::default(),
            cross_domain: false,
            timeout: 0,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            mime_types: Arc::new(MimeTable::default()),
        }
    }
}

impl fmt::Debug for AjaxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AjaxSettings")
            .field("method", &self.method)
            .field("is_async", &self.is_async)
            .field("has_success", &self.success.is_some())
            .field("has_error", &self.error.is_some())
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("cross_domain", &self.cross_domain)
            .field("timeout", &self.timeout)
            .field("content_type", &self.content_type)
            .field("mime_types", &self.mime_types)
            .finish_non_exhaustive()
    }
}

impl AjaxSettings {
    pub fn builder() -> AjaxSettingsBuilder {
        AjaxSettingsBuilder::default()
    }
}

#[derive(Clone, Default)]
pub struct AjaxSettingsBuilder {
    inner: AjaxSettings,
}

impl AjaxSettingsBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut AjaxSettings)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn method(self, m: Method) -> Self { self.map(|c| c.method = m) }
    pub fn is_async(self, on: bool) -> Self { self.map(|c| c.is_async = on) }
    pub fn success(self, cb: SuccessCallback) -> Self { self.map(|c| c.success = Some(cb)) }
    pub fn error(self, cb: ErrorCallback) -> Self { self.map(|c| c.error = Some(cb)) }
    pub fn context(self, ctx: Context) -> Self { self.map(|c| c.context = Some(ctx)) }
    pub fn header<K: Into<String>, V: Into<String>>(self, name: K, value: V) -> Self { self.map(|c| c.headers.insert(name, value)) }
    pub fn data<D: Into<RequestData>>(self, data: D) -> Self { self.map(|c| c.data = Some(data.into())) }
    pub fn transport_factory(self, factory: TransportFactory) -> Self { self.map(|c| c.transport_factory = factory) }
    pub fn cross_domain(self, on: bool) -> Self { self.map(|c| c.cross_domain = on) }
    pub fn timeout_ms(self, ms: u64) -> Self { self.map(|c| c.timeout = ms) }
    pub fn content_type<S: Into<String>>(self, ct: S) -> Self { self.map(|c| c.content_type = Some(ct.into())) }
    pub fn no_content_type(self) -> Self { self.map(|c| c.content_type = None) }
    pub fn mime_types(self, table: MimeTable) -> Self { self.map(|c| c.mime_types = Arc::new(table)) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut AjaxSettings)) -> Self { self.map(f) }

    /// Validate and build the final settings.
    pub fn build(self) -> Result<AjaxSettings, AjaxConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum AjaxConfigError {
    EmptyMimeTable,
    EmptyContentType,
    InvalidHeaderName(String),
    InvalidHeaderValue { name: String },
}

impl fmt::Display for AjaxConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AjaxConfigError::EmptyMimeTable =>
                write!(f, "mime_types must contain at least one entry"),
            AjaxConfigError::EmptyContentType =>
                write!(f, "content_type must not be empty (use no_content_type() instead)"),
            AjaxConfigError::InvalidHeaderName(name) =>
                write!(f, "header name {name:?} is not a valid HTTP header name"),
            AjaxConfigError::InvalidHeaderValue { name } =>
                write!(f, "value of header {name:?} is not a valid HTTP header value"),
        }
    }
}
impl std::error::Error for AjaxConfigError {}

fn validate(c: &AjaxSettings) -> Result<(), AjaxConfigError> {
    if c.mime_types.is_empty() {
        return Err(AjaxConfigError::EmptyMimeTable);
    }
    if matches!(c.content_type.as_deref(), Some(ct) if ct.trim().is_empty()) {
        return Err(AjaxConfigError::EmptyContentType);
    }
    for (name, value) in c.headers.iter() {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(AjaxConfigError::InvalidHeaderName(name.to_string()));
        }
        if http::HeaderValue::from_str(value).is_err() {
            return Err(AjaxConfigError::InvalidHeaderValue { name: name.to_string() });
        }
    }
    Ok(())
}

// ---------- Process-wide defaults ----------

lazy_static! {
    static ref GLOBAL_SETTINGS: RwLock<Arc<AjaxSettings>> = RwLock::new(Arc::new(AjaxSettings::default()));
}

/// Snapshot of the process-wide defaults.
pub fn ajax_settings() -> Arc<AjaxSettings> {
    GLOBAL_SETTINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replaces the process-wide defaults.
pub fn set_ajax_settings(settings: AjaxSettings) {
    *GLOBAL_SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
}

/// Changes the process-wide defaults in place. Requests already issued keep the
/// snapshot they were resolved with.
pub fn update_ajax_settings(f: impl FnOnce(&mut AjaxSettings)) {
    let mut guard = GLOBAL_SETTINGS.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = AjaxSettings::clone(&guard);
    f(&mut next);
    *guard = Arc::new(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiate::DataType;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AjaxSettings::default();
        assert_eq!(cfg.method, Method::Get);
        assert!(cfg.is_async);
        assert_eq!(cfg.timeout, 0);
        assert!(!cfg.cross_domain);
        assert_eq!(cfg.content_type.as_deref(), Some(DEFAULT_CONTENT_TYPE));
        assert!(cfg.headers.is_empty());
    }

    #[test]
    fn builder_rejects_empty_mime_table() {
        let err = AjaxSettings::builder()
            .mime_types(MimeTable::new(Vec::<(DataType, String)>::new()))
            .build()
            .unwrap_err();
        assert_eq!(err, AjaxConfigError::EmptyMimeTable);
    }

    #[test]
    fn builder_rejects_invalid_headers() {
        let err = AjaxSettings::builder().header("Bad Name", "x").build().unwrap_err();
        assert_eq!(err, AjaxConfigError::InvalidHeaderName("Bad Name".into()));

        let err = AjaxSettings::builder().header("X-Ok", "line\nbreak").build().unwrap_err();
        assert_eq!(err, AjaxConfigError::InvalidHeaderValue { name: "X-Ok".into() });
    }

    #[test]
    fn builder_rejects_blank_content_type() {
        let err = AjaxSettings::builder().content_type("  ").build().unwrap_err();
        assert_eq!(err, AjaxConfigError::EmptyContentType);

        let cfg = AjaxSettings::builder().no_content_type().build().unwrap();
        assert!(cfg.content_type.is_none());
    }

    #[test]
    fn global_updates_do_not_touch_earlier_snapshots() {
        let before = ajax_settings();
        update_ajax_settings(|s| s.headers.insert("X-Global-Config-Test", "1"));
        let after = ajax_settings();

        assert!(!before.headers.contains("X-Global-Config-Test"));
        assert_eq!(after.headers.get("X-Global-Config-Test"), Some("1"));

        update_ajax_settings(|s| {
            s.headers.remove("X-Global-Config-Test");
        });
        assert!(!ajax_settings().headers.contains("X-Global-Config-Test"));
    }
}
