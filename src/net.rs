pub mod fetch;
pub mod response;

pub use fetch::{fetch, FetchRequest};
pub use response::Response;
