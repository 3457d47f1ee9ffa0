use crate::errors::AjaxError;
use crate::net::{fetch, FetchRequest, Response};
use crate::settings::Method;
use crate::transport::native::{HttpRequest, ReadyStateChange, ReadyStateEvents};
use http::{HeaderMap, HeaderName, HeaderValue};
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default native request, backed by the shared reqwest client.
///
/// `send` spawns the request on the current tokio runtime. Network failures finish with
/// status 0 and the error as status text, like a browser request object would.
///
/// Relative URLs are resolved against `base`; without one only absolute URLs open.
#[derive(Debug, Default)]
pub struct ReqwestRequest {
    base: Option<Url>,
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    cancel: CancellationToken,
}

impl ReqwestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Url) -> Self {
        Self {
            base: Some(base),
            ..Self::default()
        }
    }
}

impl HttpRequest for ReqwestRequest {
    fn open(&mut self, method: Method, url: &str, _is_async: bool) -> Result<(), AjaxError> {
        let parsed = match &self.base {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };
        let parsed = parsed.map_err(|e| AjaxError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.method = method;
        self.url = Some(parsed);
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), AjaxError> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| AjaxError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| AjaxError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    fn send(&mut self, body: Option<String>) -> ReadyStateEvents {
        let (tx, rx) = mpsc::unbounded_channel();

        let Some(url) = self.url.clone() else {
            // nothing to send to; finish right away like an unopened request would fail
            let blank = Url::parse("about:blank").ok();
            if let Some(blank) = blank {
                let _ = tx.send(ReadyStateChange::Done(Response::network_error(blank, "request not opened")));
            }
            return rx;
        };

        let request = FetchRequest {
            method: self.method.into(),
            url: url.clone(),
            headers: self.headers.clone(),
            body,
        };
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("request to {url} aborted");
                }
                res = fetch(request) => {
                    // send errors only mean the listener was detached
                    match res {
                        Ok(response) => {
                            let _ = tx.send(ReadyStateChange::HeadersReceived);
                            let _ = tx.send(ReadyStateChange::Loading);
                            let _ = tx.send(ReadyStateChange::Done(response));
                        }
                        Err(e) => {
                            let _ = tx.send(ReadyStateChange::Done(Response::network_error(url, e.to_string())));
                        }
                    }
                }
            }
        });

        rx
    }

    fn abort(&mut self) {
        self.cancel.cancel();
    }
}
