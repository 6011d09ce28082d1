use crate::{settings::BlockDetectionSettings, types::Vec3};

/// Ring of recent agent locations used to notice an agent that stopped making progress.
#[derive(Clone, Debug)]
pub struct BlockDetector {
    settings: BlockDetectionSettings,
    samples: Vec<Vec3>,
    next_sample_idx: usize,
    last_sample_time: Option<f32>,
}

impl BlockDetector {
    pub fn new(settings: BlockDetectionSettings) -> Self {
        Self {
            samples: Vec::with_capacity(settings.sample_count),
            settings,
            next_sample_idx: 0,
            last_sample_time: None,
        }
    }

    pub fn settings(&self) -> &BlockDetectionSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Replaces distance, interval and sample count, then clears the samples.
    pub fn configure(&mut self, distance: f32, interval: f32, sample_count: usize) {
        self.settings.distance = distance;
        self.settings.interval = interval;
        self.settings.sample_count = sample_count;
        self.reset();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.next_sample_idx = 0;
        self.last_sample_time = None;
    }

    /// Makes the next [`BlockDetector::sample`] call record regardless of the interval.
    pub fn force_update(&mut self) {
        self.last_sample_time = None;
    }

    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    /// Records `location` if enabled and the interval elapsed. Returns true when recorded.
    ///
    /// A fresh or reset detector records its first sample immediately instead of waiting one
    /// interval.
    pub fn sample(&mut self, now: f32, location: Vec3) -> bool {
        let count = self.settings.sample_count;
        if !self.settings.enabled || count == 0 {
            return false;
        }
        if let Some(last) = self.last_sample_time
            && now <= last + self.settings.interval
        {
            return false;
        }

        self.last_sample_time = Some(now);
        if self.next_sample_idx == self.samples.len() {
            self.samples.push(location);
        } else {
            self.samples[self.next_sample_idx] = location;
        }
        self.next_sample_idx = (self.next_sample_idx + 1) % count;
        true
    }

    /// True when the ring is full and every sample lies within the block distance of the centroid.
    pub fn is_blocked(&self) -> bool {
        let count = self.settings.sample_count;
        if count == 0 || self.samples.len() != count {
            return false;
        }

        let center = self.samples.iter().fold(Vec3::zeros(), |acc, s| acc + s) / count as f32;
        let max_dist_sq = self.settings.distance * self.settings.distance;
        self.samples
            .iter()
            .all(|s| (s - center).norm_squared() <= max_dist_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(sample_count: usize) -> BlockDetector {
        BlockDetector::new(BlockDetectionSettings {
            enabled: true,
            distance: 0.1,
            interval: 0.5,
            sample_count,
        })
    }

    #[test]
    fn samples_respect_interval() {
        let mut det = detector(3);
        assert!(det.sample(0.0, Vec3::zeros()));
        assert!(!det.sample(0.4, Vec3::zeros()));
        assert!(!det.sample(0.5, Vec3::zeros()));
        assert!(det.sample(0.51, Vec3::zeros()));
        assert_eq!(det.samples().len(), 2);

        det.force_update();
        assert!(det.sample(0.52, Vec3::zeros()));
    }

    #[test]
    fn first_sample_after_reset_is_immediate() {
        let mut det = detector(3);
        assert!(det.sample(10.0, Vec3::zeros()));
        det.reset();
        assert!(det.samples().is_empty());
        assert!(det.sample(10.1, Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(det.samples(), &[Vec3::new(1.0, 0.0, 0.0)]);
    }

    #[test]
    fn stationary_agent_is_blocked_once_ring_is_full() {
        let mut det = detector(3);
        det.sample(0.0, Vec3::new(1.0, 0.0, 1.0));
        det.sample(1.0, Vec3::new(1.02, 0.0, 1.0));
        assert!(!det.is_blocked());
        det.sample(2.0, Vec3::new(1.0, 0.0, 1.03));
        assert!(det.is_blocked());
    }

    #[test]
    fn moving_agent_is_not_blocked() {
        let mut det = detector(3);
        for i in 0..6 {
            det.sample(i as f32, Vec3::new(i as f32 * 0.3, 0.0, 0.0));
        }
        assert_eq!(det.samples().len(), 3);
        assert!(!det.is_blocked());
    }

    #[test]
    fn ring_overwrites_oldest_sample() {
        let mut det = detector(2);
        det.sample(0.0, Vec3::new(5.0, 0.0, 0.0));
        det.sample(1.0, Vec3::zeros());
        assert!(!det.is_blocked());
        det.sample(2.0, Vec3::zeros());
        assert!(det.is_blocked());
    }

    #[test]
    fn disabled_detector_never_samples() {
        let mut det = detector(2);
        det.set_enabled(false);
        assert!(!det.sample(0.0, Vec3::zeros()));
        assert!(!det.is_blocked());
    }
}
