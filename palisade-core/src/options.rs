use std::time::Duration;

use crate::error::SafeError;

/// Creation options of a [`SafeCollection`](crate::SafeCollection).
///
/// ```rust
/// use std::time::Duration;
/// use palisade_core::CollectionOptions;
///
/// let options = CollectionOptions::new()
///     .with_sweep_interval(Duration::from_millis(250))
///     .with_delete_objects(true);
///
/// assert!(options.validate().is_ok());
/// ```
///
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// The collection owns deletion of its members.
    pub delete_objects: bool,
    /// Period of the automatic reclamation sweeper.
    pub sweep_interval: Duration,
    /// Sleep between polls of a synchronous `remove_all`.
    pub drain_poll_interval: Duration,
    /// How long a synchronous `remove_all` waits before it starts warning.
    pub drain_warn_after: Duration,
    /// OS thread name of the sweeper.
    pub sweeper_name: String,
}

impl CollectionOptions {
    pub fn new() -> Self {
        CollectionOptions {
            delete_objects: true,
            sweep_interval: Duration::from_secs(1),
            drain_poll_interval: Duration::from_millis(10),
            drain_warn_after: Duration::from_secs(5),
            sweeper_name: String::from("palisade-sweeper"),
        }
    }

    pub fn with_delete_objects(mut self, delete_objects: bool) -> Self {
        self.delete_objects = delete_objects;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    pub fn with_drain_warn_after(mut self, after: Duration) -> Self {
        self.drain_warn_after = after;
        self
    }

    pub fn with_sweeper_name(mut self, name: impl Into<String>) -> Self {
        self.sweeper_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), SafeError> {
        if self.sweep_interval.is_zero() {
            return Err(SafeError::ZeroInterval {
                name: "sweep_interval",
            });
        }

        if self.drain_poll_interval.is_zero() {
            return Err(SafeError::ZeroInterval {
                name: "drain_poll_interval",
            });
        }

        Ok(())
    }
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self::new()
    }
}
