//! Script transport (JSONP).
//!
//! The request URL names a one-off global callback; a script element pointing at that
//! URL is appended to the document head and the loaded script calls the global with its
//! payload. The handle is then filled in the same shape a native response would have
//! (`200 OK`, the payload, the request headers), so callbacks can't tell the difference.
//!
//! ```text
//! idle → injected → { fulfilled | aborted-timeout | aborted-manual }
//! ```
//!
//! Script load failures are not observable here: a script that never calls back only
//! ends through the timeout or a manual abort.
mod document;
mod loader;

pub use document::{JsonpCallback, ScriptDocument, ScriptElement, ScriptId};
pub use loader::{eval_jsonp, HttpScriptLoader, ScriptLoader, StaticScriptLoader};

use crate::errors::AjaxError;
use crate::negotiate::prepare_headers;
use crate::parse::ResponseValue;
use crate::settings::RequestSettings;
use crate::transport::handle::{ReadyState, RequestHandle};
use crate::transport::{rewrite_jsonp_url, Completion};
use lazy_static::lazy_static;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

lazy_static! {
    // Per-process token, keeps our globals apart from anybody else's
    static ref NAMESPACE: String = format!("gosub{}", rand::random::<u32>());
}

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Unique global name, `<namespace>_<timestamp>`. Stamps never repeat within a process.
pub fn callback_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let prev = LAST_STAMP
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    format!("{}_{}", *NAMESPACE, now.max(prev + 1))
}

/// The injected script and global of one request. Torn down at most once, at the latest
/// when dropped.
struct Injection {
    document: Arc<ScriptDocument>,
    name: String,
    script: Option<ScriptId>,
    torn_down: bool,
}

impl Injection {
    fn new(document: Arc<ScriptDocument>, name: String) -> Self {
        Self {
            document,
            name,
            script: None,
            torn_down: false,
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(script) = self.script.take() {
            self.document.remove_script(script);
        }
        self.document.delete_global(&self.name);
        debug!("removed JSONP callback {}", self.name);
    }
}

impl Drop for Injection {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub(crate) async fn run(
    mut settings: RequestSettings,
    handle: RequestHandle,
    document: Arc<ScriptDocument>,
) -> Completion {
    let name = callback_name();
    let mut injection = Injection::new(document.clone(), name.clone());

    let (tx, rx) = oneshot::channel();
    document.install_global(
        name.clone(),
        Box::new(move |payload| {
            let _ = tx.send(payload);
        }),
    );

    settings.url = rewrite_jsonp_url(&settings.url, &name);
    // never transmitted, but the settings handed to callbacks look like a native request's
    prepare_headers(&mut settings);

    let script = document.append_script(settings.url.clone());
    injection.script = Some(script);

    // abort removes the global right away, a late payload finds nothing to call
    let hook_document = document.clone();
    let hook_name = name.clone();
    handle.on_abort(Box::new(move || {
        hook_document.delete_global(&hook_name);
        hook_document.remove_script(script);
    }));
    handle.set_ready_state(ReadyState::Opened);
    debug!("[{}] injected script {}", handle.id(), settings.url);

    let timeout = settings.timeout();
    let timer = async move {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => futures::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        biased;
        _ = handle.cancelled() => Err(AjaxError::Aborted),
        _ = timer => Err(AjaxError::Timeout),
        payload = rx => payload.map_err(|_| AjaxError::Transport(format!("callback {name} was removed"))),
    };

    injection.teardown();

    match outcome {
        Ok(payload) => {
            let value = ResponseValue::Json(payload);
            handle.update(|env| {
                env.ready_state = ReadyState::Done;
                env.status = 200;
                env.status_text = "OK".to_string();
                env.response_text = value.as_json().map(|v| v.to_string());
                env.response = Some(value.clone());
                env.headers = settings.headers.clone();
            });
            Completion::succeeded(settings, value)
        }
        Err(e) => {
            handle.set_ready_state(ReadyState::Done);
            debug!("[{}] JSONP {} stopped: {}", handle.id(), settings.url, e);
            Completion::failed(settings, e)
        }
    }
}
