pub mod config;
pub mod context;
pub mod error;
pub mod record;

pub use config::Config;
pub use context::{NotificationContext, NotificationContextBuilder};
pub use error::*;
pub use record::{RuleId, RuleRecord, DEFAULT_SCHEDULE};
