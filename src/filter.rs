use core::f32::consts::PI;

/// First order low-pass filter.
pub struct LowPassFilter {
    output: f32,
    alpha: f32,
    is_initialised: bool,
}

impl Default for LowPassFilter {
    fn default() -> Self {
        LowPassFilter {
            output: 0.,
            alpha: 1.,
            is_initialised: false,
        }
    }
}

impl LowPassFilter {
    /// Create a filter with a `cutoff_freq` (in hz) for samples arriving at `sample_freq` (in hz).
    pub fn with_sample_rate_and_cutoff(sample_freq: f32, cutoff_freq: f32) -> Self {
        let mut filter = Self::default();
        filter.set_cutoff_frequency(sample_freq, cutoff_freq);
        filter
    }

    pub fn set_cutoff_frequency(&mut self, sample_freq: f32, cutoff_freq: f32) {
        if sample_freq <= 0. || cutoff_freq <= 0. {
            self.alpha = 1.;
            return;
        }
        let dt = 1.0 / sample_freq;
        let rc = 1.0 / (2.0 * PI * cutoff_freq);
        self.alpha = dt / (dt + rc);
    }

    /// Set the filter's response from a sample period `dt` and a time constant `tc` (both in seconds).
    pub fn set_time_constant(&mut self, dt: f32, tc: f32) {
        self.alpha = if dt + tc <= 0. { 1. } else { dt / (dt + tc) };
    }

    pub fn apply(&mut self, sample: f32) -> f32 {
        self.output = if self.is_initialised {
            sample * self.alpha + self.output * (1. - self.alpha)
        } else {
            self.is_initialised = true;
            sample
        };
        self.output
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn reset(&mut self, value: f32) {
        self.is_initialised = true;
        self.output = value;
    }
}

/// Slope estimator over the last `FILTER_SIZE` timestamped samples.
///
/// Sizes of 5 and 7 use a smoothing derivative kernel,
/// other sizes fall back to the slope between the oldest and newest sample.
pub struct DerivativeFilter<const FILTER_SIZE: usize> {
    buffer: [f32; FILTER_SIZE],
    timestamps: [u32; FILTER_SIZE],
    /// Index the next sample will be written to.
    idx: usize,
    len: usize,
    new_data: bool,
    last_slope: f32,
}

impl<const FILTER_SIZE: usize> Default for DerivativeFilter<FILTER_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FILTER_SIZE: usize> DerivativeFilter<FILTER_SIZE> {
    pub fn new() -> Self {
        Self {
            buffer: [0.0; FILTER_SIZE],
            timestamps: [0; FILTER_SIZE],
            idx: 0,
            len: 0,
            new_data: false,
            last_slope: 0.0,
        }
    }

    /// Add a sample taken at `timestamp` (in ms). Repeated timestamps are ignored.
    pub fn update(&mut self, sample: f32, timestamp: u32) {
        if self.len > 0 && self.timestamps[self.newest(0)] == timestamp {
            return;
        }

        self.buffer[self.idx] = sample;
        self.timestamps[self.idx] = timestamp;
        self.idx = (self.idx + 1) % FILTER_SIZE;
        self.len = (self.len + 1).min(FILTER_SIZE);
        self.new_data = true;
    }

    /// Rate of change in units per millisecond.
    pub fn slope(&mut self) -> f32 {
        if !self.new_data {
            return self.last_slope;
        }

        let slope = if self.len < FILTER_SIZE || FILTER_SIZE < 2 {
            0.
        } else {
            // pairs of samples `i` steps either side of the middle of the window
            let half = FILTER_SIZE / 2;
            let term = |i: usize| self.slope_between(half - i, half + i);

            match FILTER_SIZE {
                5 => (2. * 2. * term(1) + 4. * 1. * term(2)) / 8.,
                7 => (2. * 5. * term(1) + 4. * 4. * term(2) + 6. * 1. * term(3)) / 32.,
                _ => self.slope_between(0, FILTER_SIZE - 1),
            }
        };

        self.last_slope = if slope.is_nan() || slope.is_infinite() {
            0.
        } else {
            slope
        };
        self.new_data = false;
        self.last_slope
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn slope_between(&self, ahead_age: usize, behind_age: usize) -> f32 {
        let (ahead, behind) = (self.newest(ahead_age), self.newest(behind_age));
        let span = self.timestamps[ahead].wrapping_sub(self.timestamps[behind]);
        if span == 0 {
            return 0.;
        }
        (self.buffer[ahead] - self.buffer[behind]) / span as f32
    }

    /// Buffer index of the sample `age` updates older than the newest one.
    fn newest(&self, age: usize) -> usize {
        (self.idx + 2 * FILTER_SIZE - 1 - age) % FILTER_SIZE
    }
}
