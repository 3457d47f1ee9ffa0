//! Native transport.
//!
//! Drives one [`HttpRequest`] through open → headers → send and waits for it to report
//! [`ReadyStateChange::Done`], racing an optional timeout and a manual abort:
//!
//! ```text
//! idle → opened → sent → { completed-success | completed-error | aborted-timeout }
//! ```
//!
//! Status 2xx and 304 are successes: the body is decoded with the resolved data type
//! (sniffed from `Content-Type` when the caller gave none). Everything else, including
//! status 0 from a failed connection, ends on the error callback with the status text.
mod canned;
mod http_request;

pub use canned::{CannedResponse, CannedTransport, RecordedRequest};
pub use http_request::ReqwestRequest;

use crate::errors::AjaxError;
use crate::negotiate::{classify_response_type, prepare_headers};
use crate::net::Response;
use crate::parse::parse;
use crate::settings::{Method, RequestSettings};
use crate::transport::handle::{ReadyState, RequestHandle};
use crate::transport::Completion;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress reported by a native request after `send`.
#[derive(Debug)]
pub enum ReadyStateChange {
    HeadersReceived,
    Loading,
    /// The request finished; carries whatever came back (status 0 if nothing did)
    Done(Response),
}

impl ReadyStateChange {
    pub fn ready_state(&self) -> ReadyState {
        match self {
            ReadyStateChange::HeadersReceived => ReadyState::HeadersReceived,
            ReadyStateChange::Loading => ReadyState::Loading,
            ReadyStateChange::Done(_) => ReadyState::Done,
        }
    }
}

/// Listener side of a sent request. Dropping it detaches the listener.
pub type ReadyStateEvents = mpsc::UnboundedReceiver<ReadyStateChange>;

/// Single-shot native request primitive, modelled after the host's request object.
///
/// Implementations report progress on the returned [`ReadyStateEvents`] and must send
/// exactly one [`ReadyStateChange::Done`] unless aborted.
pub trait HttpRequest: Send {
    fn open(&mut self, method: Method, url: &str, is_async: bool) -> Result<(), AjaxError>;

    fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), AjaxError>;

    fn send(&mut self, body: Option<String>) -> ReadyStateEvents;

    /// Stops the request. Must be idempotent.
    fn abort(&mut self);
}

/// Creates a fresh [`HttpRequest`] per request.
#[derive(Clone)]
pub struct TransportFactory(Arc<dyn Fn() -> Box<dyn HttpRequest> + Send + Sync>);

impl TransportFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Box<dyn HttpRequest> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Default reqwest requests, resolving relative URLs against `base`.
    pub fn with_base(base: url::Url) -> Self {
        Self::new(move || Box::new(ReqwestRequest::with_base(base.clone())))
    }

    pub fn create(&self) -> Box<dyn HttpRequest> {
        (self.0)()
    }
}

impl Default for TransportFactory {
    fn default() -> Self {
        Self::new(|| Box::new(ReqwestRequest::new()))
    }
}

impl std::fmt::Debug for TransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportFactory")
    }
}

pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 304
}

/// Runs the request described by `settings` to completion.
///
/// The timeout is only armed for asynchronous requests: a synchronous request blocks
/// until the native request returns, whatever `timeout` says.
pub(crate) async fn run(mut settings: RequestSettings, handle: RequestHandle) -> Completion {
    let mut request = settings.transport_factory.create();
    let timeout = settings.timeout().filter(|_| settings.is_async);

    let mut events = match start(request.as_mut(), &mut settings, &handle) {
        Ok(events) => events,
        Err(e) => return Completion::failed(settings, e),
    };

    let timer = async move {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => futures::future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    let finished = loop {
        tokio::select! {
            // an abort or timeout that already happened beats a queued response
            biased;
            _ = handle.cancelled() => break Err(AjaxError::Aborted),
            _ = &mut timer => break Err(AjaxError::Timeout),
            change = events.recv() => match change {
                Some(ReadyStateChange::Done(response)) => break Ok(response),
                // not finished yet
                Some(progress) => handle.set_ready_state(progress.ready_state()),
                None => break Err(AjaxError::Transport("request ended without a response".into())),
            },
        }
    };

    let response = match finished {
        Ok(response) => response,
        Err(e) => {
            // detach first so nothing reported after this point is observed
            drop(events);
            request.abort();
            handle.set_ready_state(ReadyState::Done);
            debug!("[{}] {} {} stopped: {}", handle.id(), settings.method, settings.url, e);
            return Completion::failed(settings, e);
        }
    };

    complete(settings, response, &handle)
}

fn start(
    request: &mut dyn HttpRequest,
    settings: &mut RequestSettings,
    handle: &RequestHandle,
) -> Result<ReadyStateEvents, AjaxError> {
    request.open(settings.method, &settings.url, settings.is_async)?;
    handle.set_ready_state(ReadyState::Opened);

    prepare_headers(settings);
    for (name, value) in settings.headers.iter() {
        request.set_request_header(name, value)?;
    }

    debug!("[{}] sending {} {}", handle.id(), settings.method, settings.url);
    Ok(request.send(settings.data.clone()))
}

fn complete(mut settings: RequestSettings, response: Response, handle: &RequestHandle) -> Completion {
    let text = response.text();
    handle.update(|env| {
        env.ready_state = ReadyState::Done;
        env.status = response.status;
        env.status_text = response.status_text.clone();
        env.response_text = Some(text.clone());
        env.headers = response
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
    });
    debug!("[{}] done with status {}", handle.id(), response.status);

    if !is_success_status(response.status) {
        return Completion::failed(
            settings,
            AjaxError::Status {
                status: response.status,
                status_text: response.status_text,
            },
        );
    }

    let data_type = classify_response_type(&mut settings, response.content_type());
    match parse(&text, data_type) {
        Ok(value) => {
            handle.update(|env| env.response = Some(value.clone()));
            Completion::succeeded(settings, value)
        }
        Err(e) => Completion::failed(settings, e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AjaxSettings;
    use crate::errors::ErrorKind;
    use crate::negotiate::DataType;
    use crate::parse::ResponseValue;
    use crate::settings::{resolve, AjaxOptions};
    use crate::transport::handle::RequestState;
    use crate::transport::{finish, TransportKind};
    use serde_json::json;
    use std::time::Duration;

    fn settings_for(transport: &CannedTransport, options: AjaxOptions) -> RequestSettings {
        resolve(&AjaxSettings::default(), options.transport_factory(transport.factory()))
    }

    #[test]
    fn success_statuses() {
        assert!(is_success_status(200));
        assert!(is_success_status(204));
        assert!(is_success_status(299));
        assert!(is_success_status(304));
        assert!(!is_success_status(0));
        assert!(!is_success_status(301));
        assert!(!is_success_status(404));
    }

    #[tokio::test]
    async fn json_content_type_is_sniffed_and_decoded() {
        let transport = CannedTransport::new(
            CannedResponse::ok(r#"{"id": 3}"#).header("Content-Type", "application/json"),
        );
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, AjaxOptions::new("/users/3")), handle.clone()).await;

        assert_eq!(completion.settings.data_type, Some(DataType::Json));
        assert_eq!(completion.settings.headers.get("Accept"), Some("application/json"));
        assert_eq!(completion.outcome.unwrap(), ResponseValue::Json(json!({"id": 3})));
        assert_eq!(handle.status(), 200);
        assert_eq!(handle.ready_state(), ReadyState::Done);
        assert_eq!(handle.response_header("content-type").as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn request_line_and_headers_reach_the_native_request() {
        let transport = CannedTransport::new(CannedResponse::ok("fine"));
        let options = AjaxOptions::new("/users")
            .method(Method::Post)
            .data("name=denis")
            .header("X-App", "gosub");
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, options), handle).await;
        assert_eq!(completion.outcome.unwrap().as_text(), Some("fine"));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Some(Method::Post));
        assert_eq!(sent[0].url.as_deref(), Some("/users"));
        assert!(sent[0].is_async);
        assert_eq!(sent[0].body.as_deref(), Some("name=denis"));
        assert_eq!(sent[0].headers.get("X-App"), Some("gosub"));
        assert_eq!(sent[0].headers.get("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(sent[0].headers.get("Accept"), Some("*/*"));
    }

    #[tokio::test]
    async fn not_modified_counts_as_success() {
        let transport = CannedTransport::new(CannedResponse::status(304, "Not Modified"));
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, AjaxOptions::new("/cached")), handle).await;
        assert_eq!(completion.outcome.unwrap().as_text(), Some(""));
    }

    #[tokio::test]
    async fn error_statuses_carry_the_status_text() {
        let transport = CannedTransport::new(CannedResponse::status(404, "Not Found").body("nope"));
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, AjaxOptions::new("/missing")), handle.clone()).await;

        match completion.outcome {
            Err(AjaxError::Status { status, ref status_text }) => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
            }
            ref other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(handle.response_text().as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn undecodable_body_is_a_parse_error() {
        let transport = CannedTransport::new(CannedResponse::ok("not json"));
        let options = AjaxOptions::new("/users").data_type(DataType::Json);
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, options), handle).await;

        let err = completion.outcome.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[tokio::test]
    async fn timeout_wins_over_a_late_response() {
        let transport = CannedTransport::new(CannedResponse::ok("late").delay(Duration::from_millis(500)));
        let options = AjaxOptions::new("/slow").timeout_ms(20);
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, options), handle.clone()).await;

        assert!(matches!(completion.outcome, Err(AjaxError::Timeout)));
        assert_eq!(completion.state(), RequestState::TimedOut);
        assert!(transport.requests()[0].aborted);
        assert_eq!(handle.status(), 0);
    }

    #[tokio::test]
    async fn manual_abort_stops_the_request() {
        let transport = CannedTransport::new(CannedResponse::ok("late").delay(Duration::from_millis(500)));
        let handle = RequestHandle::new(TransportKind::Native);
        let task = tokio::spawn(run(settings_for(&transport, AjaxOptions::new("/slow")), handle.clone()));

        handle.abort();
        let completion = task.await.unwrap();
        assert!(matches!(completion.outcome, Err(AjaxError::Aborted)));
        assert!(transport.requests()[0].aborted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_beats_an_already_queued_response() {
        for _ in 0..20 {
            let transport = CannedTransport::new(CannedResponse::ok("fast"));
            let handle = RequestHandle::new(TransportKind::Native);
            handle.abort();

            let completion = run(settings_for(&transport, AjaxOptions::new("/fast")), handle).await;
            assert!(matches!(completion.outcome, Err(AjaxError::Aborted)));
        }
    }

    #[tokio::test]
    async fn invalid_headers_fail_before_sending() {
        let transport = CannedTransport::new(CannedResponse::ok("unused"));
        let options = AjaxOptions::new("/users").header("X-Bad", "line\nbreak");
        let handle = RequestHandle::new(TransportKind::Native);
        let completion = run(settings_for(&transport, options), handle.clone()).await;

        assert!(matches!(completion.outcome, Err(AjaxError::InvalidHeader { .. })));
        assert!(transport.requests()[0].body.is_none());

        // finishing still settles exactly once
        assert!(finish(&handle, completion).is_err());
        assert_eq!(handle.state(), RequestState::Failed);
    }
}
