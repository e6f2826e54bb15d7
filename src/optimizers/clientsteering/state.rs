//! Back-off tracking for client steering actions across runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

/// Sentinel for "no action ever recorded".
const NEVER: i64 = i64::MIN;

/// Per-(AP, client) last-action timestamps, in process-monotonic
/// nanoseconds. Steering algorithms consult this before emitting an action
/// so clients are not bounced repeatedly.
///
/// Each key's timestamp is an atomic updated by compare-and-set, so
/// concurrent steering runs (different zones sharing a client MAC on two
/// APs never contend; same pair races resolve to one winner).
#[derive(Debug, Default)]
pub struct ClientSteeringState {
    last_action: RwLock<HashMap<(String, String), Arc<AtomicI64>>>,
}

impl ClientSteeringState {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, ap: &str, station: &str) -> Arc<AtomicI64> {
        if let Some(cell) = self
            .last_action
            .read()
            .expect("steering lock poisoned")
            .get(&(ap.to_string(), station.to_string()))
        {
            return cell.clone();
        }
        self.last_action
            .write()
            .expect("steering lock poisoned")
            .entry((ap.to_string(), station.to_string()))
            .or_insert_with(|| Arc::new(AtomicI64::new(NEVER)))
            .clone()
    }

    /// If the back-off window since the last recorded action for
    /// `(ap, station)` has expired (or none was ever recorded), record
    /// `current_time_ns` and return true. In dry-run mode, report the same
    /// verdict without recording anything.
    pub fn register_if_backoff_expired(
        &self,
        ap: &str,
        station: &str,
        current_time_ns: i64,
        backoff_time_ns: i64,
        dry_run: bool,
    ) -> bool {
        let cell = self.cell(ap, station);
        loop {
            let last = cell.load(Ordering::Acquire);
            let expired = last == NEVER || current_time_ns.saturating_sub(last) > backoff_time_ns;
            if !expired {
                return false;
            }
            if dry_run {
                return true;
            }
            match cell.compare_exchange(last, current_time_ns, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                // another run recorded first; re-evaluate against its stamp
                Err(_) => continue,
            }
        }
    }
}
