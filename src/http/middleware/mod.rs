//! Request-shaping pipeline stages.
//!
//! Security stages live in [`crate::security`]; these are the stages that
//! decode, stage or serve request content, plus the terminal error responder.

pub mod body;
pub mod cookies;
pub mod errors;
pub mod static_files;
pub mod upload;
