pub mod ajax;
pub mod callbacks;
pub mod config;
pub mod errors;
pub mod negotiate;
pub mod net;
pub mod param;
pub mod parse;
pub mod settings;
pub mod transport;

pub use ajax::{Ajax, Dispatch, ShorthandArgs};
pub use callbacks::{on_error, on_success, ContextRef, ErrorCallback, Failure, Success, SuccessCallback};
pub use config::{ajax_settings, set_ajax_settings, update_ajax_settings, AjaxSettings};
pub use errors::{AjaxError, ErrorKind, ParseError};
pub use negotiate::{DataType, MimeTable};
pub use param::{param, RequestData};
pub use parse::{ResponseValue, XmlDocument, XmlElement, XmlNode};
pub use settings::{AjaxOptions, Context, Headers, Method, RequestSettings};
pub use transport::handle::{ReadyState, RequestHandle, RequestId, RequestState};
pub use transport::native::{HttpRequest, TransportFactory};
pub use transport::script::{ScriptDocument, ScriptLoader};
pub use transport::TransportKind;
