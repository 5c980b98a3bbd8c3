//! Outward notification transport.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook (JSON POST) and tracing log channel implementations
//! - Dispatcher that delivers each notification to every configured channel

pub mod dispatcher;
pub mod log;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
