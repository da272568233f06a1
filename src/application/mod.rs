//! Application layer - Use cases and application services
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Driving an inbound call through its signaling states
//! - Deciding how the media phase of a call ended

pub mod answer;

pub use answer::{answer_with_echo, EchoAnswerHandler, SessionError};
