use std::time::Duration;

/// Configures connection and read timeouts plus task polling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Connection-establishment timeout applied to every attempt.
    ///
    /// Attempts at index 2 and beyond within one logical request use this
    /// value plus 2 seconds.
    pub connect_timeout: Duration,
    /// Full round-trip timeout for write (indexing/admin) traffic.
    pub write_timeout: Duration,
    /// Full round-trip timeout for search traffic.
    pub search_timeout: Duration,
    /// Sleep between task-status polls in [`wait_task`].
    ///
    /// [`wait_task`]: crate::BeaconIndex::wait_task
    pub task_poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(5),
            task_poll_interval: Duration::from_millis(100),
        }
    }
}
