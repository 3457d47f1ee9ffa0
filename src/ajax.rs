//! Request dispatcher.
//!
//! [`Ajax`] resolves the settings of a call, picks the transport and runs it on tokio.
//! Asynchronous requests hand back a [`RequestHandle`] right away; synchronous ones block
//! until the outcome is known. Either way the success or error callback has run by the
//! time the caller sees the result.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gosub_ajax::{on_success, Ajax, AjaxOptions, DataType};
//! # fn main() -> Result<(), gosub_ajax::AjaxError> {
//! let ajax = Ajax::new()?;
//!
//! ajax.ajax(
//!     AjaxOptions::new("https://example.com/users.json")
//!         .data_type(DataType::Json)
//!         .success(on_success(|s| println!("{:?}", s.response))),
//! );
//!
//! // GET shorthand: data may be left out
//! ajax.get("https://example.com/ping", on_success(|_| println!("pong")));
//! # Ok(()) }
//! ```
use crate::callbacks::SuccessCallback;
use crate::config::{ajax_settings, AjaxSettings};
use crate::errors::AjaxError;
use crate::negotiate::DataType;
use crate::param::RequestData;
use crate::parse::ResponseValue;
use crate::settings::{resolve, AjaxOptions, Method, RequestSettings};
use crate::transport::handle::RequestHandle;
use crate::transport::script::ScriptDocument;
use crate::transport::{self, finish, native, script, Completion, TransportKind};
use log::debug;
use std::future::Future;
use std::sync::Arc;
use lazy_static::lazy_static;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Result of [`Ajax::ajax`].
#[derive(Debug)]
pub enum Dispatch {
    /// Running in the background
    Pending(RequestHandle),
    /// Synchronous request, already finished
    Completed(Result<ResponseValue, AjaxError>),
}

impl Dispatch {
    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatch::Pending(_))
    }

    pub fn handle(&self) -> Option<&RequestHandle> {
        match self {
            Dispatch::Pending(handle) => Some(handle),
            Dispatch::Completed(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<RequestHandle> {
        match self {
            Dispatch::Pending(handle) => Some(handle),
            Dispatch::Completed(_) => None,
        }
    }

    pub fn into_result(self) -> Option<Result<ResponseValue, AjaxError>> {
        match self {
            Dispatch::Pending(_) => None,
            Dispatch::Completed(result) => Some(result),
        }
    }
}

/// Trailing arguments of the [`Ajax::get`] / [`Ajax::post`] shorthands.
///
/// Data is optional: `(callback)` and `(None, callback)` mean the same, and a data type
/// may follow either form.
#[derive(Clone, Default)]
pub struct ShorthandArgs {
    pub data: Option<RequestData>,
    pub success: Option<SuccessCallback>,
    pub data_type: Option<DataType>,
}

impl From<()> for ShorthandArgs {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<RequestData> for ShorthandArgs {
    fn from(data: RequestData) -> Self {
        Self { data: Some(data), ..Self::default() }
    }
}

impl From<Option<RequestData>> for ShorthandArgs {
    fn from(data: Option<RequestData>) -> Self {
        Self { data, ..Self::default() }
    }
}

impl From<&str> for ShorthandArgs {
    fn from(data: &str) -> Self {
        RequestData::from(data).into()
    }
}

impl From<SuccessCallback> for ShorthandArgs {
    fn from(success: SuccessCallback) -> Self {
        Self { success: Some(success), ..Self::default() }
    }
}

impl From<(SuccessCallback, DataType)> for ShorthandArgs {
    fn from((success, data_type): (SuccessCallback, DataType)) -> Self {
        Self {
            data: None,
            success: Some(success),
            data_type: Some(data_type),
        }
    }
}

impl From<(RequestData, SuccessCallback)> for ShorthandArgs {
    fn from((data, success): (RequestData, SuccessCallback)) -> Self {
        (Some(data), success).into()
    }
}

impl From<(Option<RequestData>, SuccessCallback)> for ShorthandArgs {
    fn from((data, success): (Option<RequestData>, SuccessCallback)) -> Self {
        Self {
            data,
            success: Some(success),
            data_type: None,
        }
    }
}

impl From<(RequestData, SuccessCallback, DataType)> for ShorthandArgs {
    fn from((data, success, data_type): (RequestData, SuccessCallback, DataType)) -> Self {
        (Some(data), success, data_type).into()
    }
}

impl From<(Option<RequestData>, SuccessCallback, DataType)> for ShorthandArgs {
    fn from((data, success, data_type): (Option<RequestData>, SuccessCallback, DataType)) -> Self {
        Self {
            data,
            success: Some(success),
            data_type: Some(data_type),
        }
    }
}

lazy_static! {
    // Fallback for callers outside of any runtime. Never dropped, so requests in flight
    // outlive every dispatcher that spawned them.
    static ref SHARED_RUNTIME: std::io::Result<Runtime> = tokio::runtime::Builder::new_multi_thread()
        .thread_name("gosub-ajax")
        .enable_all()
        .build();
}

fn shared_runtime() -> Result<Handle, AjaxError> {
    match &*SHARED_RUNTIME {
        Ok(runtime) => Ok(runtime.handle().clone()),
        Err(e) => Err(AjaxError::Runtime(std::io::Error::new(e.kind(), e.to_string()))),
    }
}

/// Issues requests. Cheap to clone; clones share the runtime and the script document.
#[derive(Clone)]
pub struct Ajax {
    /// Explicit defaults; `None` reads the process-wide ones on every call
    settings: Option<Arc<AjaxSettings>>,
    document: Arc<ScriptDocument>,
    runtime: Handle,
}

impl std::fmt::Debug for Ajax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ajax")
            .field("settings", &self.settings)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl Ajax {
    /// Creates a dispatcher on the current tokio runtime, or on a process-wide runtime
    /// when called outside of one.
    pub fn new() -> Result<Self, AjaxError> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => shared_runtime()?,
        };

        Ok(Self {
            settings: None,
            document: Arc::new(ScriptDocument::default()),
            runtime,
        })
    }

    /// Uses `settings` as defaults instead of the process-wide ones.
    pub fn with_settings(mut self, settings: AjaxSettings) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Uses `document` for JSONP requests.
    pub fn with_document(mut self, document: Arc<ScriptDocument>) -> Self {
        self.document = document;
        self
    }

    /// Runs requests on the runtime behind `handle`.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = handle;
        self
    }

    pub fn document(&self) -> &Arc<ScriptDocument> {
        &self.document
    }

    fn defaults(&self) -> Arc<AjaxSettings> {
        match &self.settings {
            Some(settings) => settings.clone(),
            None => ajax_settings(),
        }
    }

    /// Issues one request.
    ///
    /// JSONP requests always run in the background. Synchronous native requests block the
    /// calling thread and ignore `timeout`; on a current-thread runtime they can't block
    /// and fail instead.
    pub fn ajax(&self, options: AjaxOptions) -> Dispatch {
        let settings = resolve(&self.defaults(), options);
        let kind = transport::select(&settings);
        let handle = RequestHandle::new(kind);
        debug!("[{}] {} {} via {:?}", handle.id(), settings.method, settings.url, kind);

        match kind {
            TransportKind::Script => {
                let document = self.document.clone();
                self.spawn(handle.clone(), move |h| script::run(settings, h, document));
                Dispatch::Pending(handle)
            }
            TransportKind::Native if settings.is_async => {
                self.spawn(handle.clone(), move |h| native::run(settings, h));
                Dispatch::Pending(handle)
            }
            TransportKind::Native => Dispatch::Completed(self.run_blocking(settings, handle)),
        }
    }

    /// `GET` shorthand, see [`ShorthandArgs`].
    pub fn get(&self, url: impl Into<String>, args: impl Into<ShorthandArgs>) -> Dispatch {
        self.shorthand(Method::Get, url.into(), args.into())
    }

    /// `POST` shorthand, see [`ShorthandArgs`].
    pub fn post(&self, url: impl Into<String>, args: impl Into<ShorthandArgs>) -> Dispatch {
        self.shorthand(Method::Post, url.into(), args.into())
    }

    /// Loads a script with `GET`.
    pub fn get_script(&self, url: impl Into<String>, callback: SuccessCallback) -> Dispatch {
        self.get(url, (callback, DataType::Script))
    }

    /// Loads JSON with `GET`; a JSONP marker in `url` goes through the script transport.
    pub fn get_json(
        &self,
        url: impl Into<String>,
        data: Option<RequestData>,
        callback: SuccessCallback,
    ) -> Dispatch {
        self.get(url, (data, callback, DataType::Json))
    }

    fn shorthand(&self, method: Method, url: String, args: ShorthandArgs) -> Dispatch {
        let mut options = AjaxOptions::new(url).method(method);
        options.data = args.data;
        options.success = args.success;
        options.data_type = args.data_type;
        self.ajax(options)
    }

    fn spawn<F, Fut>(&self, handle: RequestHandle, run: F)
    where
        F: FnOnce(RequestHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        self.runtime.spawn(async move {
            let completion = run(handle.clone()).await;
            let _ = finish(&handle, completion);
        });
    }

    fn run_blocking(&self, settings: RequestSettings, handle: RequestHandle) -> Result<ResponseValue, AjaxError> {
        let inside_runtime = match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                let error = AjaxError::Transport("synchronous requests need a multi-threaded runtime".into());
                return finish(&handle, Completion::failed(settings, error));
            }
            Ok(_) => true,
            Err(_) => false,
        };

        let runtime = self.runtime.clone();
        let task = async move {
            let completion = native::run(settings, handle.clone()).await;
            finish(&handle, completion)
        };

        if inside_runtime {
            tokio::task::block_in_place(|| runtime.block_on(task))
        } else {
            runtime.block_on(task)
        }
    }
}
