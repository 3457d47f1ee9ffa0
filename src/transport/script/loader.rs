use crate::net::fetch::{fetch, FetchRequest};
use crate::transport::native::is_success_status;
use crate::transport::script::document::{ScriptDocument, ScriptElement};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

lazy_static! {
    /// `name(<json>)`, optionally prefixed with `/**/` and followed by `;`.
    static ref JSONP_BODY: Regex =
        Regex::new(r"^\s*(?:/\*\*/)?\s*([A-Za-z_$][\w$.]*)\s*\(([\s\S]*)\)\s*;?\s*$")
            .expect("valid JSONP body pattern");
}

/// Loads script elements appended to a [`ScriptDocument`].
///
/// Loading happens in the background. A loaded JSONP script calls its global through
/// [`ScriptDocument::call_global`]; a script that fails to load calls nothing.
pub trait ScriptLoader: Send + Sync {
    fn load(&self, script: ScriptElement, document: Arc<ScriptDocument>);
}

/// Splits a JSONP response into the called function and its argument.
///
/// Only the `name(<json>)` form is understood; this is not a script engine.
pub fn eval_jsonp(source: &str) -> Option<(String, Value)> {
    let caps = JSONP_BODY.captures(source)?;
    let callee = caps.get(1)?.as_str();
    // window.cb(...) and cb(...) call the same global
    let name = callee.rsplit('.').next().unwrap_or(callee).to_string();
    let payload = serde_json::from_str(caps.get(2)?.as_str()).ok()?;
    Some((name, payload))
}

/// Fetches scripts over HTTP with the shared client and runs JSONP bodies.
///
/// Relative script URLs are resolved against `base`; without one they cannot be loaded.
#[derive(Debug, Clone, Default)]
pub struct HttpScriptLoader {
    base: Option<Url>,
}

impl HttpScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: Url) -> Self {
        Self { base: Some(base) }
    }

    fn resolve(&self, src: &str) -> Option<Url> {
        match &self.base {
            Some(base) => base.join(src).ok(),
            None => Url::parse(src).ok(),
        }
    }
}

impl ScriptLoader for HttpScriptLoader {
    fn load(&self, script: ScriptElement, document: Arc<ScriptDocument>) {
        let Some(url) = self.resolve(&script.src) else {
            warn!("cannot load script {}: not an absolute URL", script.src);
            return;
        };

        tokio::spawn(async move {
            let response = match fetch(FetchRequest::get(url)).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("failed to load script {}: {}", script.src, e);
                    return;
                }
            };
            if !is_success_status(response.status) {
                warn!("failed to load script {}: status {}", script.src, response.status);
                return;
            }

            match eval_jsonp(&response.text()) {
                Some((name, payload)) => {
                    debug!("script {} calls {}", script.src, name);
                    document.call_global(&name, payload);
                }
                None => warn!("script {} is not a JSONP response", script.src),
            }
        });
    }
}

/// Answers every script with the same payload, without touching the network.
///
/// The global to call is the path segment or query value of the script URL that names
/// an installed global. A `silent` loader never calls anything, like a script that
/// failed to load.
#[derive(Debug, Clone)]
pub struct StaticScriptLoader {
    payload: Value,
    delay: Option<Duration>,
    silent: bool,
    loaded: Arc<Mutex<Vec<String>>>,
}

impl StaticScriptLoader {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            delay: None,
            silent: false,
            loaded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Sources of every script handed to this loader so far.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ScriptLoader for StaticScriptLoader {
    fn load(&self, script: ScriptElement, document: Arc<ScriptDocument>) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(script.src.clone());
        if self.silent {
            return;
        }

        let payload = self.payload.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let name = script
                .src
                .split(['?', '&', '=', '/'])
                .find(|token| !token.is_empty() && document.has_global(token))
                .map(str::to_string);
            match name {
                Some(name) => {
                    document.call_global(&name, payload);
                }
                None => debug!("script {} names no installed global", script.src),
            }
        });
    }
}
