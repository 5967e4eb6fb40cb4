pub mod request;
pub mod status;

pub use request::{NewRequest, RequestRecord, RequestUser};
pub use status::status_text;
