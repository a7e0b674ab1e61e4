//! Level estimation: dB conversions and the sliding RMS accumulator

use std::collections::VecDeque;

/// Smallest magnitude considered by `v2db`; 0.0 maps to this level.
pub const AMPLITUDE_EPSILON: f32 = 1e-6;

/// Level reported for silence (`v2db(0.0)`), in dBFS
pub const MIN_DB: f32 = -120.0;

/// Linear amplitude to dBFS, clamped at `MIN_DB`
pub fn v2db(value: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude <= AMPLITUDE_EPSILON {
        return MIN_DB;
    }
    20.0 * magnitude.log10()
}

/// dBFS to linear amplitude
pub fn db2v(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Sliding window over the most recent `capacity` samples of one channel.
///
/// Keeps the running sum of squares for O(1) RMS, the largest magnitude seen
/// since creation, and where the signal last crossed zero. Positions are
/// offsets from the first sample added.
#[derive(Debug, Clone)]
pub struct RmsBuffer {
    ring: VecDeque<f32>,
    capacity: usize,
    sum_squares: f64,
    peak: f32,
    added: usize,
    previous: Option<f32>,
    last_crossing: Option<usize>,
}

impl RmsBuffer {
    /// Create an empty window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            sum_squares: 0.0,
            peak: 0.0,
            added: 0,
            previous: None,
            last_crossing: None,
        }
    }

    /// Push one sample, evicting the oldest once the window is full
    pub fn add_sample(&mut self, sample: f32) {
        if self.ring.len() == self.capacity {
            if let Some(old) = self.ring.pop_front() {
                self.sum_squares -= (old as f64) * (old as f64);
            }
        }
        self.ring.push_back(sample);
        self.sum_squares += (sample as f64) * (sample as f64);

        self.peak = self.peak.max(sample.abs());

        if let Some(prev) = self.previous {
            let crossed = (prev < 0.0 && sample >= 0.0)
                || (prev > 0.0 && sample <= 0.0)
                || (prev == 0.0 && sample != 0.0);
            if crossed {
                self.last_crossing = Some(self.added);
            }
        }
        self.previous = Some(sample);
        self.added += 1;
    }

    /// RMS of the samples currently in the window (0.0 when empty)
    pub fn rms(&self) -> f32 {
        if self.ring.is_empty() {
            return 0.0;
        }
        (self.sum_squares.max(0.0) / self.ring.len() as f64).sqrt() as f32
    }

    pub fn rms_db(&self) -> f32 {
        v2db(self.rms())
    }

    /// Largest absolute sample since the buffer was created
    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn peak_db(&self) -> f32 {
        v2db(self.peak)
    }

    /// Offset of the most recent zero or sign-change crossing, if it is still
    /// inside the window
    pub fn last_sign_change_position(&self) -> Option<usize> {
        let oldest = self.added.saturating_sub(self.ring.len());
        self.last_crossing.filter(|&pos| pos >= oldest)
    }

    /// Samples added since creation
    pub fn samples_added(&self) -> usize {
        self.added
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
