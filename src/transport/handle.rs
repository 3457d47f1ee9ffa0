//! Handle returned for every request, regardless of transport.
//!
//! The handle mirrors what a native request object exposes (ready state, status,
//! response text and headers) and lets the caller abort. For JSONP requests the same
//! fields are filled in by the script transport once its callback fires.
use crate::parse::ResponseValue;
use crate::settings::Headers;
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// A unique identifier for a request, used in logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a request. Exactly one terminal state is ever reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

/// Progress of the underlying native request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// Response side of the handle, filled in as the request progresses.
#[derive(Debug, Default)]
pub(crate) struct Envelope {
    pub ready_state: ReadyState,
    pub status: u16,
    pub status_text: String,
    pub response_text: Option<String>,
    pub response: Option<ResponseValue>,
    pub headers: Headers,
}

/// Runs on the aborting thread, before `abort` returns.
pub(crate) type AbortHook = Box<dyn FnOnce() + Send>;

struct HandleInner {
    id: RequestId,
    kind: TransportKind,
    settled: AtomicBool,
    state: watch::Sender<RequestState>,
    cancel: CancellationToken,
    // cancel is only ever triggered while holding this lock
    abort_hooks: Mutex<Vec<AbortHook>>,
    envelope: Mutex<Envelope>,
}

/// Shared handle to one in-flight (or finished) request. Cheap to clone.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl RequestHandle {
    pub(crate) fn new(kind: TransportKind) -> Self {
        let (state, _) = watch::channel(RequestState::Pending);
        Self {
            inner: Arc::new(HandleInner {
                id: RequestId::new(),
                kind,
                settled: AtomicBool::new(false),
                state,
                cancel: CancellationToken::new(),
                abort_hooks: Mutex::new(Vec::new()),
                envelope: Mutex::new(Envelope::default()),
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn state(&self) -> RequestState {
        *self.inner.state.borrow()
    }

    /// Aborts the request. Safe to call any number of times, also after completion.
    ///
    /// A pending request ends with an `error`/`abort` outcome. Whatever the transport
    /// registered to stop delivery (the JSONP global, for one) is gone when this returns.
    pub fn abort(&self) {
        if self.inner.settled.load(Ordering::Acquire) {
            return;
        }

        let hooks = {
            let mut hooks = self.abort_hooks();
            self.inner.cancel.cancel();
            std::mem::take(&mut *hooks)
        };
        for hook in hooks {
            hook();
        }
    }

    /// Waits until the request reached a terminal state. Callbacks have run by then.
    pub async fn wait(&self) -> RequestState {
        let mut rx = self.inner.state.subscribe();
        // the sender lives as long as this handle, so this only ends on a terminal state
        let state = match rx.wait_for(RequestState::is_terminal).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    pub fn ready_state(&self) -> ReadyState {
        self.envelope().ready_state
    }

    /// HTTP status; `0` until a response arrived.
    pub fn status(&self) -> u16 {
        self.envelope().status
    }

    pub fn status_text(&self) -> String {
        self.envelope().status_text.clone()
    }

    pub fn response_text(&self) -> Option<String> {
        self.envelope().response_text.clone()
    }

    /// Decoded response, once the request succeeded.
    pub fn response(&self) -> Option<ResponseValue> {
        self.envelope().response.clone()
    }

    /// Response headers. For JSONP requests these are the (unsent) request headers.
    pub fn response_headers(&self) -> Headers {
        self.envelope().headers.clone()
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        self.envelope().headers.get(name).map(str::to_string)
    }

    fn abort_hooks(&self) -> MutexGuard<'_, Vec<AbortHook>> {
        self.inner.abort_hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn envelope(&self) -> MutexGuard<'_, Envelope> {
        self.inner.envelope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Envelope)) {
        f(&mut *self.envelope());
    }

    pub(crate) fn set_ready_state(&self, ready_state: ReadyState) {
        self.update(|env| env.ready_state = ready_state);
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    /// Registers `hook` to run inside [`abort`](Self::abort). Runs it right away when the
    /// request was aborted already.
    pub(crate) fn on_abort(&self, hook: AbortHook) {
        {
            let mut hooks = self.abort_hooks();
            if !self.inner.cancel.is_cancelled() {
                hooks.push(hook);
                return;
            }
        }
        hook();
    }

    /// Moves the request into its terminal `state`, running `on_settled` first.
    ///
    /// Only the first call wins; later calls return `false` without running anything.
    pub(crate) fn settle(&self, state: RequestState, on_settled: impl FnOnce()) -> bool {
        if self.inner.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.abort_hooks().clear();
        on_settled();
        self.inner.state.send_replace(state);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_first_settle_wins() {
        let handle = RequestHandle::new(TransportKind::Native);
        let mut fired = 0;

        assert!(handle.settle(RequestState::TimedOut, || fired += 1));
        assert!(!handle.settle(RequestState::Succeeded, || fired += 1));

        assert_eq!(fired, 1);
        assert_eq!(handle.state(), RequestState::TimedOut);
    }

    #[test]
    fn abort_is_idempotent() {
        let handle = RequestHandle::new(TransportKind::Script);
        handle.abort();
        handle.abort();
        assert!(handle.inner.cancel.is_cancelled());
        // abort alone does not settle; the transport does
        assert_eq!(handle.state(), RequestState::Pending);
    }

    #[test]
    fn abort_after_settle_is_a_no_op() {
        let handle = RequestHandle::new(TransportKind::Native);
        handle.settle(RequestState::Succeeded, || {});
        handle.abort();
        assert!(!handle.inner.cancel.is_cancelled());
    }

    #[test]
    fn abort_hooks_run_before_abort_returns() {
        let handle = RequestHandle::new(TransportKind::Script);
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        handle.on_abort(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!fired.load(Ordering::SeqCst));

        handle.abort();
        assert!(fired.load(Ordering::SeqCst));

        // registered after the abort: runs immediately
        let late = Arc::new(AtomicBool::new(false));
        let flag = late.clone();
        handle.on_abort(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(late.load(Ordering::SeqCst));
    }

    #[test]
    fn settling_drops_abort_hooks() {
        let handle = RequestHandle::new(TransportKind::Script);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        handle.on_abort(Box::new(move || flag.store(true, Ordering::SeqCst)));

        handle.settle(RequestState::Succeeded, || {});
        handle.abort();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wait_returns_the_terminal_state() {
        let handle = RequestHandle::new(TransportKind::Native);
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };

        handle.settle(RequestState::Failed, || {});
        assert_eq!(waiter.await.unwrap(), RequestState::Failed);
        // already terminal: returns immediately
        assert_eq!(handle.wait().await, RequestState::Failed);
    }

    #[test]
    fn envelope_starts_empty() {
        let handle = RequestHandle::new(TransportKind::Native);
        assert_eq!(handle.ready_state(), ReadyState::Unsent);
        assert_eq!(handle.status(), 0);
        assert!(handle.response().is_none());
        assert!(handle.response_text().is_none());
    }
}
