//! Session bounded context - the lifecycle of one inbound call

pub mod aggregate;
pub mod value_object;

pub use aggregate::Session;
pub use value_object::{DialogId, SessionState};
