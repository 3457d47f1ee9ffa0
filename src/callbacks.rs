use crate::errors::{AjaxError, ErrorKind};
use crate::parse::ResponseValue;
use crate::settings::{Context, RequestSettings};
use crate::transport::handle::RequestHandle;
use log::{debug, warn};
use std::any::Any;
use std::sync::Arc;

pub type SuccessCallback = Arc<dyn Fn(&Success<'_>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Failure<'_>) + Send + Sync>;

/// Wraps a closure as a success callback.
pub fn on_success<F>(f: F) -> SuccessCallback
where
    F: Fn(&Success<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a closure as an error callback.
pub fn on_error<F>(f: F) -> ErrorCallback
where
    F: Fn(&Failure<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Context as seen from inside a callback.
#[derive(Clone, Copy)]
pub enum ContextRef<'a> {
    Settings(&'a RequestSettings),
    Custom(&'a (dyn Any + Send + Sync)),
}

impl<'a> ContextRef<'a> {
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        match *self {
            ContextRef::Custom(value) => value.downcast_ref::<T>(),
            ContextRef::Settings(_) => None,
        }
    }

    pub fn settings(&self) -> Option<&'a RequestSettings> {
        match *self {
            ContextRef::Settings(settings) => Some(settings),
            ContextRef::Custom(_) => None,
        }
    }
}

fn context_of(settings: &RequestSettings) -> ContextRef<'_> {
    match &settings.context {
        Context::Settings => ContextRef::Settings(settings),
        Context::Custom(value) => ContextRef::Custom(value.as_ref()),
    }
}

/// Arguments of a success callback.
pub struct Success<'a> {
    pub response: &'a ResponseValue,
    pub handle: &'a RequestHandle,
    pub settings: &'a RequestSettings,
}

impl<'a> Success<'a> {
    pub fn context(&self) -> ContextRef<'a> {
        context_of(self.settings)
    }
}

/// Arguments of an error callback.
pub struct Failure<'a> {
    pub kind: ErrorKind,
    pub error: &'a AjaxError,
    pub handle: &'a RequestHandle,
    pub settings: &'a RequestSettings,
}

impl<'a> Failure<'a> {
    /// Status text, `timeout`, `abort` or the decoder error.
    pub fn message(&self) -> String {
        self.error.message()
    }

    pub fn context(&self) -> ContextRef<'a> {
        context_of(self.settings)
    }
}

/// Routes a terminal outcome to the matching callback. Missing callbacks are no-ops.
pub(crate) fn dispatch(
    outcome: &Result<ResponseValue, AjaxError>,
    handle: &RequestHandle,
    settings: &RequestSettings,
) {
    match outcome {
        Ok(response) => {
            debug!("[{}] success", handle.id());
            if let Some(cb) = &settings.success {
                cb(&Success { response, handle, settings });
            }
        }
        Err(error) => {
            warn!("[{}] {} {} failed: {} ({})", handle.id(), settings.method, settings.url, error.kind(), error.message());
            if let Some(cb) = &settings.error {
                cb(&Failure {
                    kind: error.kind(),
                    error,
                    handle,
                    settings,
                });
            }
        }
    }
}
