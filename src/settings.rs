//! Per-request settings.
//!
//! [`AjaxOptions`] holds what a caller asks for, [`AjaxSettings`] the defaults, and
//! [`resolve`] layers the first onto the second into the [`RequestSettings`] record a
//! transport consumes. Once a transport starts, the record is only handed out by shared
//! reference.
use crate::callbacks::{ErrorCallback, SuccessCallback};
use crate::config::AjaxSettings;
use crate::negotiate::{DataType, MimeTable};
use crate::param::{param, RequestData};
use crate::transport::native::TransportFactory;
use indexmap::IndexMap;
use std::any::Any;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Methods whose data travels in the URL rather than in the body.
    pub fn is_url_addressable(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Delete | Method::Options)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

impl From<Method> for http::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Patch => http::Method::PATCH,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
        }
    }
}

/// Request header fields. Names compare case-insensitively; the spelling of the first
/// insertion is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(&self, name: &str) -> Option<&String> {
        self.0.keys().find(|k| k.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = self.key_of(name)?;
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.key_of(name).is_some()
    }

    /// Sets `name` to `value`, replacing any existing value for that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.key_of(&name).cloned() {
            Some(existing) => {
                self.0.insert(existing, value.into());
            }
            None => {
                self.0.insert(name, value.into());
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = self.key_of(name)?.clone();
        self.0.shift_remove(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layers `other` on top of `self`, key by key.
    pub fn merge(&mut self, other: Headers) {
        for (name, value) in other.0 {
            self.insert(name, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// What callbacks see as their context.
#[derive(Clone, Default)]
pub enum Context {
    /// The settings record of the request itself
    #[default]
    Settings,
    /// Any caller supplied value
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Context {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Context::Custom(Arc::new(value))
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::Settings => write!(f, "Context::Settings"),
            Context::Custom(_) => write!(f, "Context::Custom(..)"),
        }
    }
}

/// Per-call overrides. Anything left `None` falls back to the defaults.
#[derive(Clone, Default)]
pub struct AjaxOptions {
    pub url: String,
    pub method: Option<Method>,
    pub is_async: Option<bool>,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
    pub context: Option<Context>,
    pub headers: Headers,
    pub data: Option<RequestData>,
    pub transport_factory: Option<TransportFactory>,
    pub cross_domain: Option<bool>,
    /// Milliseconds, 0 disables the timeout
    pub timeout: Option<u64>,
    pub content_type: Option<String>,
    pub data_type: Option<DataType>,
}

impl AjaxOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[inline]
    fn map(mut self, f: impl FnOnce(&mut AjaxOptions)) -> Self {
        f(&mut self);
        self
    }

    pub fn method(self, m: Method) -> Self { self.map(|o| o.method = Some(m)) }
    pub fn is_async(self, on: bool) -> Self { self.map(|o| o.is_async = Some(on)) }
    pub fn success(self, cb: SuccessCallback) -> Self { self.map(|o| o.success = Some(cb)) }
    pub fn error(self, cb: ErrorCallback) -> Self { self.map(|o| o.error = Some(cb)) }
    pub fn context(self, ctx: Context) -> Self { self.map(|o| o.context = Some(ctx)) }
    pub fn header<K: Into<String>, V: Into<String>>(self, name: K, value: V) -> Self { self.map(|o| o.headers.insert(name, value)) }
    pub fn data<D: Into<RequestData>>(self, data: D) -> Self { self.map(|o| o.data = Some(data.into())) }
    pub fn transport_factory(self, factory: TransportFactory) -> Self { self.map(|o| o.transport_factory = Some(factory)) }
    pub fn cross_domain(self, on: bool) -> Self { self.map(|o| o.cross_domain = Some(on)) }
    pub fn timeout_ms(self, ms: u64) -> Self { self.map(|o| o.timeout = Some(ms)) }
    pub fn content_type<S: Into<String>>(self, ct: S) -> Self { self.map(|o| o.content_type = Some(ct.into())) }
    pub fn data_type(self, dt: DataType) -> Self { self.map(|o| o.data_type = Some(dt)) }
}

impl Debug for AjaxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AjaxOptions")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// Fully resolved configuration of one request.
#[derive(Clone)]
pub struct RequestSettings {
    pub method: Method,
    /// Target URL, with URL-addressable data already appended
    pub url: String,
    pub is_async: bool,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
    pub context: Context,
    pub headers: Headers,
    /// Residual body: serialized data of body-carrying methods
    pub data: Option<String>,
    pub transport_factory: TransportFactory,
    pub cross_domain: bool,
    /// Milliseconds, 0 disables the timeout
    pub timeout: u64,
    pub content_type: Option<String>,
    /// Fixed once set, either by the caller or by response sniffing
    pub data_type: Option<DataType>,
    pub mime_types: Arc<MimeTable>,
}

impl RequestSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }
}

impl Debug for RequestSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSettings")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("is_async", &self.is_async)
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("cross_domain", &self.cross_domain)
            .field("timeout", &self.timeout)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// Layers `overrides` onto `defaults`.
///
/// Headers merge per key. Data is serialized with [`param`]: URL-addressable methods get
/// it appended to the URL (`?` or `&` depending on whether a query already exists), other
/// methods keep it as the body. The data type is left alone; it is resolved at response
/// time unless the caller fixed it.
pub fn resolve(defaults: &AjaxSettings, overrides: AjaxOptions) -> RequestSettings {
    let method = overrides.method.unwrap_or(defaults.method);

    let mut headers = defaults.headers.clone();
    headers.merge(overrides.headers);

    let mut url = overrides.url;
    let mut body = None;

    if let Some(data) = overrides.data.or_else(|| defaults.data.clone()) {
        if !data.is_blank() {
            let query = param(&data);
            if method.is_url_addressable() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            } else {
                body = Some(query);
            }
        }
    }

    RequestSettings {
        method,
        url,
        is_async: overrides.is_async.unwrap_or(defaults.is_async),
        success: overrides.success.or_else(|| defaults.success.clone()),
        error: overrides.error.or_else(|| defaults.error.clone()),
        context: overrides.context.or_else(|| defaults.context.clone()).unwrap_or_default(),
        headers,
        data: body,
        transport_factory: overrides
            .transport_factory
            .unwrap_or_else(|| defaults.transport_factory.clone()),
        cross_domain: overrides.cross_domain.unwrap_or(defaults.cross_domain),
        timeout: overrides.timeout.unwrap_or(defaults.timeout),
        content_type: overrides.content_type.or_else(|| defaults.content_type.clone()),
        data_type: overrides.data_type,
        mime_types: defaults.mime_types.clone(),
    }
}
