//! Dwell detection over a driver's location samples
//!
//! Samples are clustered around an anchor: the first stationary sample of a
//! candidate dwell. Stationary samples within the stop radius of the anchor
//! join the cluster; anything else closes it. A closed cluster becomes a
//! [`Stop`] when it lasted at least the minimum stop duration.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use tracing::trace;
use waypost_api::{LocationSample, LocationType, Stop};
use waypost_config::DetectorSettings;
use waypost_util::{centroid, floor_minutes, haversine_distance_meters, DriverId};

fn is_stationary(settings: &DetectorSettings, sample: &LocationSample) -> bool {
    !sample.is_moving
        || sample
            .speed
            .is_some_and(|speed| speed < settings.min_moving_speed_kmh)
}

/// Candidate dwell being accumulated
#[derive(Debug, Clone)]
struct Cluster {
    anchor_lat: f64,
    anchor_lon: f64,
    started_at: DateTime<Utc>,
    last_at: DateTime<Utc>,
    members: Vec<(f64, f64)>,
}

impl Cluster {
    fn start(sample: &LocationSample) -> Self {
        Self {
            anchor_lat: sample.latitude,
            anchor_lon: sample.longitude,
            started_at: sample.recorded_at,
            last_at: sample.recorded_at,
            members: vec![(sample.latitude, sample.longitude)],
        }
    }

    fn distance_to(&self, sample: &LocationSample) -> f64 {
        haversine_distance_meters(
            self.anchor_lat,
            self.anchor_lon,
            sample.latitude,
            sample.longitude,
        )
    }

    fn extend(&mut self, sample: &LocationSample) {
        self.last_at = sample.recorded_at;
        self.members.push((sample.latitude, sample.longitude));
    }

    fn duration(&self) -> chrono::Duration {
        self.last_at - self.started_at
    }
}

/// Incremental stop detection for one driver.
///
/// Feed samples in chronological order with [`StopTracker::push`]. Closed
/// stops are returned as they complete; [`StopTracker::open_stop`] exposes
/// the dwell in progress once it qualifies.
#[derive(Debug, Clone)]
pub struct StopTracker {
    driver_id: DriverId,
    settings: DetectorSettings,
    cluster: Option<Cluster>,
}

impl StopTracker {
    pub fn new(driver_id: DriverId, settings: DetectorSettings) -> Self {
        Self {
            driver_id,
            settings,
            cluster: None,
        }
    }

    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    /// Whether a sample counts toward a dwell
    pub fn is_stationary(&self, sample: &LocationSample) -> bool {
        is_stationary(&self.settings, sample)
    }

    /// Consume the next sample, returning a stop if one just closed.
    pub fn push(&mut self, sample: &LocationSample) -> Option<Stop> {
        if let Some(cluster) = &self.cluster
            && sample.recorded_at < cluster.last_at
        {
            trace!(
                driver_id = %self.driver_id,
                recorded_at = %sample.recorded_at,
                "Ignoring out-of-order sample"
            );
            return None;
        }

        if !self.is_stationary(sample) {
            return self.close();
        }

        match &mut self.cluster {
            Some(cluster) if cluster.distance_to(sample) <= self.settings.stop_radius_meters => {
                cluster.extend(sample);
                None
            }
            Some(_) => {
                let closed = self.close();
                self.cluster = Some(Cluster::start(sample));
                closed
            }
            None => {
                self.cluster = Some(Cluster::start(sample));
                None
            }
        }
    }

    /// The dwell in progress, if it already lasts long enough to count.
    ///
    /// The returned stop has no `ended_at`.
    pub fn open_stop(&self) -> Option<Stop> {
        self.cluster
            .as_ref()
            .and_then(|cluster| self.materialize(cluster, false))
    }

    /// Close the stream, evaluating any cluster still open.
    pub fn finish(&mut self) -> Option<Stop> {
        self.close()
    }

    fn close(&mut self) -> Option<Stop> {
        let cluster = self.cluster.take()?;
        let stop = self.materialize(&cluster, true);
        if stop.is_none() {
            trace!(
                driver_id = %self.driver_id,
                members = cluster.members.len(),
                minutes = cluster.duration().num_minutes(),
                "Discarding short dwell"
            );
        }
        stop
    }

    fn materialize(&self, cluster: &Cluster, closed: bool) -> Option<Stop> {
        let duration = cluster.duration();
        if duration < self.settings.min_stop_duration {
            return None;
        }

        let (latitude, longitude) = centroid(cluster.members.iter().copied())?;
        Some(Stop {
            id: None,
            driver_id: self.driver_id.clone(),
            trip_id: None,
            latitude,
            longitude,
            location_type: LocationType::Unknown,
            started_at: cluster.started_at,
            ended_at: closed.then_some(cluster.last_at),
            duration_minutes: floor_minutes(duration),
            is_in_vehicle: true,
        })
    }
}

/// Batch stop detection
#[derive(Debug, Clone, Copy, Default)]
pub struct StopDetector {
    settings: DetectorSettings,
}

impl StopDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Whether a sample counts toward a dwell
    pub fn is_stationary(&self, sample: &LocationSample) -> bool {
        is_stationary(&self.settings, sample)
    }

    /// Detect every completed stop in one driver's samples.
    ///
    /// Samples are sorted by time first if needed. The dwell still open at
    /// the end of the input is closed at the last sample, so batch output
    /// never contains an open stop.
    pub fn detect(&self, samples: &[LocationSample]) -> Vec<Stop> {
        self.run(samples, true)
    }

    /// Like [`StopDetector::detect`], but a dwell still open at the last
    /// sample is left out instead of being cut off there.
    pub fn detect_closed(&self, samples: &[LocationSample]) -> Vec<Stop> {
        self.run(samples, false)
    }

    fn run(&self, samples: &[LocationSample], close_at_end: bool) -> Vec<Stop> {
        if samples.len() < 2 {
            return Vec::new();
        }

        let samples: Cow<'_, [LocationSample]> =
            if samples.is_sorted_by_key(|s| s.recorded_at) {
                Cow::Borrowed(samples)
            } else {
                let mut sorted = samples.to_vec();
                sorted.sort_by_key(|s| s.recorded_at);
                Cow::Owned(sorted)
            };

        let mut tracker = StopTracker::new(samples[0].driver_id.clone(), self.settings);
        let mut stops: Vec<Stop> = samples
            .iter()
            .filter_map(|sample| tracker.push(sample))
            .collect();
        if close_at_end {
            stops.extend(tracker.finish());
        }

        stops
    }
}
