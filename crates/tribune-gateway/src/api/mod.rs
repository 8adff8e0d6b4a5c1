//! HTTP surface besides the socket: error mapping and the internal publish
//! hook used by the CMS after it persists a message.

mod error;
pub mod publish;

pub use error::ApiError;
