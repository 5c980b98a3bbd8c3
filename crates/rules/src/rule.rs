//! Host-side view of a loaded rule instance.

use std::fmt;

use herald_core::NotificationContext;

use crate::error::Result;

/// A rule instance the engine can evaluate.
///
/// Implemented by units loaded from compiled artifacts; the `Result`s carry
/// faults raised inside the unit (a panic, an undecodable context) so one
/// misbehaving rule never takes the caller down with it. Instances are
/// shared across ticks and must tolerate concurrent calls.
pub trait NotificationRule: Send + Sync {
    /// Name of the type this instance was created from.
    fn entry_point(&self) -> &str;

    /// Whether the rule's condition holds for `context`.
    fn evaluate(&self, context: &NotificationContext) -> Result<bool>;

    /// Notification text for `context`. Only meaningful after `evaluate`
    /// returned `Ok(true)`.
    fn describe(&self, context: &NotificationContext) -> Result<String>;
}

impl fmt::Debug for dyn NotificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRule")
            .field("entry_point", &self.entry_point())
            .finish()
    }
}
