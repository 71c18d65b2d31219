use std::time::{Duration, Instant};

use crate::{BeaconError, Result};

/// How long a rotated host order is preferred after a failure before the
/// original order is served again. The rotated list is kept as-is past the
/// window; only the read path switches back.
pub(crate) const STALENESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Which host list and read timeout a request uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TrafficClass {
    /// Read/search traffic.
    Search,
    /// Indexing and admin traffic.
    Write,
}

impl TrafficClass {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Write => "write",
        }
    }
}

#[derive(Debug, Default)]
struct RotationRecord {
    current: Vec<String>,
    original: Vec<String>,
    last_failure: Option<Instant>,
}

/// Ordered candidate hosts per traffic class.
///
/// A transient failure demotes the failing host to the back of `current`
/// and stamps the class's failure time. Reads inside the staleness window
/// see the rotated order; reads after it fall back to `original` without
/// mutating anything, on the theory that the failure was a stale DNS
/// resolution rather than a dead host.
#[derive(Debug, Default)]
pub(crate) struct HostRotation {
    search: RotationRecord,
    write: RotationRecord,
}

impl HostRotation {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces both the current and original list for a class.
    pub(crate) fn set_hosts(&mut self, class: TrafficClass, hosts: Vec<String>) -> Result<()> {
        if hosts.is_empty() {
            return Err(BeaconError::Config(format!(
                "empty host list for {} traffic",
                class.as_str()
            )));
        }
        let record = self.record_mut(class);
        record.current = hosts.clone();
        record.original = hosts;
        record.last_failure = None;
        Ok(())
    }

    pub(crate) fn current_hosts(&self, class: TrafficClass) -> Vec<String> {
        self.current_hosts_at(class, Instant::now())
    }

    fn current_hosts_at(&self, class: TrafficClass, now: Instant) -> Vec<String> {
        let record = self.record(class);
        match record.last_failure {
            Some(at) if now.duration_since(at) < STALENESS_WINDOW => record.current.clone(),
            _ => record.original.clone(),
        }
    }

    /// Rotates the class's current list one step and stamps the failure time.
    pub(crate) fn record_failure(&mut self, class: TrafficClass) {
        self.record_failure_at(class, Instant::now());
    }

    fn record_failure_at(&mut self, class: TrafficClass, now: Instant) {
        let record = self.record_mut(class);
        if !record.current.is_empty() {
            let first = record.current.remove(0);
            record.current.push(first);
        }
        record.last_failure = Some(now);
    }

    fn record(&self, class: TrafficClass) -> &RotationRecord {
        match class {
            TrafficClass::Search => &self.search,
            TrafficClass::Write => &self.write,
        }
    }

    fn record_mut(&mut self, class: TrafficClass) -> &mut RotationRecord {
        match class {
            TrafficClass::Search => &mut self.search,
            TrafficClass::Write => &mut self.write,
        }
    }
}
