use crate::errors::AjaxError;
use crate::net::Response;
use crate::settings::{Headers, Method};
use crate::transport::native::{HttpRequest, ReadyStateChange, ReadyStateEvents, TransportFactory};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Response a [`CannedTransport`] answers every request with.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Time between the headers and the body arriving
    pub delay: Option<Duration>,
}

impl CannedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, "OK").body(body)
    }

    pub fn status(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: String::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn to_response(&self, url: Url) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        Response {
            url,
            status: self.status,
            status_text: self.status_text.clone(),
            headers,
            body: self.body.clone().into_bytes(),
        }
    }
}

/// What a canned request saw from the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: Option<Method>,
    pub url: Option<String>,
    pub is_async: bool,
    pub headers: Headers,
    pub body: Option<String>,
    pub sent: bool,
    pub aborted: bool,
}

/// In-process transport that answers every request with the same [`CannedResponse`]
/// and records what it was asked to do. Useful for hosts without network access and
/// for tests.
#[derive(Debug, Clone)]
pub struct CannedTransport {
    response: CannedResponse,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CannedTransport {
    pub fn new(response: CannedResponse) -> Self {
        Self {
            response,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn factory(&self) -> TransportFactory {
        let transport = self.clone();
        TransportFactory::new(move || Box::new(transport.create_request()))
    }

    /// Every request created so far, in creation order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.log).clone()
    }

    fn create_request(&self) -> CannedRequest {
        let mut log = lock(&self.log);
        log.push(RecordedRequest::default());
        CannedRequest {
            response: self.response.clone(),
            log: self.log.clone(),
            index: log.len() - 1,
            cancel: CancellationToken::new(),
        }
    }
}

fn lock(log: &Mutex<Vec<RecordedRequest>>) -> MutexGuard<'_, Vec<RecordedRequest>> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CannedRequest {
    response: CannedResponse,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
    index: usize,
    cancel: CancellationToken,
}

impl CannedRequest {
    fn record(&self, f: impl FnOnce(&mut RecordedRequest)) {
        if let Some(entry) = lock(&self.log).get_mut(self.index) {
            f(entry);
        }
    }
}

impl HttpRequest for CannedRequest {
    fn open(&mut self, method: Method, url: &str, is_async: bool) -> Result<(), AjaxError> {
        self.record(|r| {
            r.method = Some(method);
            r.url = Some(url.to_string());
            r.is_async = is_async;
        });
        Ok(())
    }

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), AjaxError> {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            return Err(AjaxError::InvalidHeader {
                name: name.to_string(),
                reason: "not a valid HTTP header".into(),
            });
        }
        self.record(|r| r.headers.insert(name, value));
        Ok(())
    }

    fn send(&mut self, body: Option<String>) -> ReadyStateEvents {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut target = None;
        self.record(|r| {
            r.sent = true;
            r.body = body;
            target = r.url.clone();
        });

        // relative URLs are resolved against a local origin
        let raw = target.unwrap_or_default();
        let url = Url::parse(&raw)
            .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(&raw)));
        let response = match url {
            Ok(url) => self.response.to_response(url),
            Err(e) => match Url::parse("about:blank") {
                Ok(blank) => Response::network_error(blank, e.to_string()),
                Err(_) => return rx,
            },
        };

        let delay = self.response.delay;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let _ = tx.send(ReadyStateChange::HeadersReceived);
            if let Some(delay) = delay {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(ReadyStateChange::Loading);
            let _ = tx.send(ReadyStateChange::Done(response));
        });

        rx
    }

    fn abort(&mut self) {
        self.cancel.cancel();
        self.record(|r| r.aborted = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_progress_before_done() {
        let transport = CannedTransport::new(CannedResponse::ok("hi").header("X-Test", "1"));
        let mut request = transport.factory().create();
        request.open(Method::Get, "/hello", true).unwrap();
        let mut events = request.send(None);

        assert!(matches!(events.recv().await, Some(ReadyStateChange::HeadersReceived)));
        assert!(matches!(events.recv().await, Some(ReadyStateChange::Loading)));
        match events.recv().await {
            Some(ReadyStateChange::Done(response)) => {
                assert_eq!(response.url.as_str(), "http://localhost/hello");
                assert_eq!(response.text(), "hi");
                assert_eq!(response.headers.get("x-test").unwrap(), "1");
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn aborted_requests_never_finish() {
        let transport = CannedTransport::new(CannedResponse::ok("late").delay(Duration::from_secs(5)));
        let mut request = transport.factory().create();
        request.open(Method::Get, "/slow", true).unwrap();
        let mut events = request.send(None);
        request.abort();

        assert!(matches!(events.recv().await, Some(ReadyStateChange::HeadersReceived)));
        assert!(events.recv().await.is_none());
        assert!(transport.requests()[0].aborted);
    }
}
