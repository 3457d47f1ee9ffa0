//! Transport selection and the shared completion path.
//!
//! Every request runs through exactly one transport:
//! - [`native`]: an [`HttpRequest`](native::HttpRequest) created by the settings'
//!   transport factory
//! - [`script`]: a script element whose URL names a one-off global callback (JSONP)
//!
//! Both hand back a [`Completion`]; [`finish`] settles the request handle and routes the
//! outcome to the callbacks, so nothing downstream cares which transport ran.
pub mod handle;
pub mod native;
pub mod script;

use crate::callbacks;
use crate::errors::AjaxError;
use crate::parse::ResponseValue;
use crate::settings::RequestSettings;
use handle::{RequestHandle, RequestState};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// `=?` followed by `&` or the end of the URL, or `??` anywhere.
    static ref JSONP_MARKER: Regex = Regex::new(r"(=)\?(&|$)|\?\?").expect("valid JSONP marker pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Native,
    Script,
}

/// Picks the transport for `settings`. URLs carrying a JSONP marker always go through
/// the script transport, whatever `cross_domain` says.
pub fn select(settings: &RequestSettings) -> TransportKind {
    if is_jsonp_url(&settings.url) {
        TransportKind::Script
    } else {
        TransportKind::Native
    }
}

pub fn is_jsonp_url(url: &str) -> bool {
    JSONP_MARKER.is_match(url)
}

/// Replaces the first JSONP marker in `url` with `callback`.
pub fn rewrite_jsonp_url(url: &str, callback: &str) -> String {
    JSONP_MARKER
        .replacen(url, 1, |caps: &Captures| {
            format!(
                "{}{}{}",
                caps.get(1).map_or("", |m| m.as_str()),
                callback,
                caps.get(2).map_or("", |m| m.as_str()),
            )
        })
        .into_owned()
}

/// Final result of a transport run, together with the settings as they were at the end
/// (the data type may have been sniffed from the response).
pub(crate) struct Completion {
    pub settings: RequestSettings,
    pub outcome: Result<ResponseValue, AjaxError>,
}

impl Completion {
    pub fn succeeded(settings: RequestSettings, value: ResponseValue) -> Self {
        Self { settings, outcome: Ok(value) }
    }

    pub fn failed(settings: RequestSettings, error: AjaxError) -> Self {
        Self { settings, outcome: Err(error) }
    }

    pub fn state(&self) -> RequestState {
        match &self.outcome {
            Ok(_) => RequestState::Succeeded,
            Err(AjaxError::Timeout) => RequestState::TimedOut,
            Err(AjaxError::Aborted) => RequestState::Aborted,
            Err(_) => RequestState::Failed,
        }
    }
}

/// Settles `handle` with the completion and fires the matching callback, once.
pub(crate) fn finish(handle: &RequestHandle, completion: Completion) -> Result<ResponseValue, AjaxError> {
    let state = completion.state();
    handle.settle(state, || {
        callbacks::dispatch(&completion.outcome, handle, &completion.settings);
    });
    completion.outcome
}
