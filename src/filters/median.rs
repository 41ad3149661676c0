use crate::buffer::RingBuffer;

/// Sliding-window median for one scalar channel.
///
/// One instance per translation axis.
#[derive(Clone, Debug)]
pub struct ScalarMedianFilter {
    window: RingBuffer<f64>,
    scratch: Vec<f64>,
}

impl ScalarMedianFilter {
    /// Create a filter over the `window_size` most recent samples
    pub fn new(window_size: usize) -> Self {
        ScalarMedianFilter {
            window: RingBuffer::new(window_size),
            scratch: Vec::with_capacity(window_size.max(1)),
        }
    }

    /// Add a sample, evicting the oldest once the window is full
    pub fn add_sample(&mut self, value: f64) {
        self.window.push(value);
    }

    /// Median of the current window: middle value, or the mean of the two
    /// middle values for an even count. NaN on an empty window.
    pub fn median(&mut self) -> f64 {
        let n = self.window.len();
        if n == 0 {
            return f64::NAN;
        }

        self.scratch.clear();
        self.scratch.extend(self.window.iter().copied());
        self.scratch.sort_by(|a, b| a.total_cmp(b));

        let mid = n / 2;
        if n % 2 == 1 {
            self.scratch[mid]
        } else {
            0.5 * (self.scratch[mid - 1] + self.scratch[mid])
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }
}
