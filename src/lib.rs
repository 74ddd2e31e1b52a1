//! Bootstrap and request pipeline for the video sharing API.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;
pub mod store;

pub use config::ProcessConfig;
pub use http::AppState;
pub use lifecycle::LifecycleSupervisor;
