//! Live feed: turns newly stored samples into hub broadcasts

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use waypost_api::{DriverStatus, DriverStatusUpdate, LocationSample, LocationUpdate};
use waypost_config::DetectorSettings;
use waypost_core::{HomeChecker, StopTracker};
use waypost_hub::Hub;
use waypost_store::Store;
use waypost_util::{DriverId, Result};

/// Samples read from the store per tick
const FEED_BATCH_SIZE: usize = 1000;

struct DriverFeed {
    name: String,
    status: DriverStatus,
    tracker: StopTracker,
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedTick {
    pub samples: usize,
    pub updates: usize,
    pub status_changes: usize,
}

/// Follows the sample log and publishes the latest position of each driver.
///
/// Starts at the end of the log, so history is never replayed to viewers.
pub struct LiveFeed {
    store: Arc<dyn Store>,
    homes: HomeChecker,
    hub: Hub,
    detector: DetectorSettings,
    cursor: i64,
    drivers: HashMap<DriverId, DriverFeed>,
}

impl LiveFeed {
    pub fn new(store: Arc<dyn Store>, hub: Hub, detector: DetectorSettings) -> Result<Self> {
        let cursor = store.latest_sample_seq()?;
        debug!(cursor, "Live feed positioned at end of sample log");

        Ok(Self {
            homes: HomeChecker::new(Arc::clone(&store)),
            store,
            hub,
            detector,
            cursor,
            drivers: HashMap::new(),
        })
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Publish everything appended since the previous tick.
    pub fn tick(&mut self) -> Result<FeedTick> {
        let batch = self.store.samples_after(self.cursor, FEED_BATCH_SIZE)?;
        let Some((last_seq, _)) = batch.last() else {
            return Ok(FeedTick::default());
        };
        self.cursor = *last_seq;

        let mut tick = FeedTick {
            samples: batch.len(),
            ..Default::default()
        };

        let mut latest: BTreeMap<DriverId, LocationSample> = BTreeMap::new();
        for (seq, sample) in batch {
            if let Err(e) = sample.validate() {
                warn!(seq, driver_id = %sample.driver_id, error = %e, "Skipping malformed sample");
                continue;
            }

            let feed = self.driver_feed(&sample.driver_id);
            if let Some(stop) = feed.tracker.push(&sample) {
                debug!(
                    driver_id = %stop.driver_id,
                    minutes = stop.duration_minutes,
                    "Driver left a stop"
                );
            }
            latest.insert(sample.driver_id.clone(), sample);
        }

        for (driver_id, sample) in latest {
            let status = self.derive_status(&sample);
            let Some(feed) = self.drivers.get_mut(&driver_id) else {
                continue;
            };

            let update = LocationUpdate::from_sample(&sample, feed.name.clone(), status);
            if let Err(e) = self.hub.broadcast_location(&update) {
                warn!(driver_id = %driver_id, error = %e, "Failed to publish location");
                continue;
            }
            tick.updates += 1;

            if status != feed.status {
                feed.status = status;
                tick.status_changes += 1;
                info!(driver_id = %driver_id, status = %status, "Driver status changed");

                if let Err(e) = self.store.set_driver_status(&driver_id, status) {
                    debug!(driver_id = %driver_id, error = %e, "Driver status not persisted");
                }
                let change = DriverStatusUpdate {
                    driver_id: driver_id.clone(),
                    name: feed.name.clone(),
                    status: status.as_str().to_string(),
                };
                if let Err(e) = self.hub.broadcast_driver_status(&change) {
                    warn!(driver_id = %driver_id, error = %e, "Failed to publish status change");
                }
            }
        }

        Ok(tick)
    }

    fn driver_feed(&mut self, driver_id: &DriverId) -> &mut DriverFeed {
        match self.drivers.entry(driver_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (name, status) = match self.store.get_driver(driver_id) {
                    Ok(Some(driver)) => (driver.name, driver.status),
                    Ok(None) => (driver_id.to_string(), DriverStatus::Offline),
                    Err(e) => {
                        warn!(driver_id = %driver_id, error = %e, "Driver lookup failed, publishing under its id");
                        (driver_id.to_string(), DriverStatus::Offline)
                    }
                };
                entry.insert(DriverFeed {
                    name,
                    status,
                    tracker: StopTracker::new(driver_id.clone(), self.detector),
                })
            }
        }
    }

    fn derive_status(&self, sample: &LocationSample) -> DriverStatus {
        match self
            .homes
            .is_near_home(&sample.driver_id, sample.latitude, sample.longitude)
        {
            Ok(Some(_)) => return DriverStatus::AtHome,
            Ok(None) => {}
            Err(e) => {
                warn!(driver_id = %sample.driver_id, error = %e, "Home lookup failed");
            }
        }

        let stationary = self
            .drivers
            .get(&sample.driver_id)
            .is_some_and(|feed| feed.tracker.is_stationary(sample));
        if stationary {
            DriverStatus::Stopped
        } else {
            DriverStatus::Moving
        }
    }
}
