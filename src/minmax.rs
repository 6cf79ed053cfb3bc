// Copyright (c) 2026 The Cadence Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A windowed maximum estimator over round-trip-counted time, based on
//! Kathleen Nichols' algorithm.
//! Refer to <https://groups.google.com/g/bbr-dev/c/3RTgkzi5ZD8>.
//!
//! The estimator keeps the best, 2nd best and 3rd best samples, maintaining
//! the invariant that the measurement time of the n'th best is at least that
//! of the n-1'th best, and that the three samples are spread across the
//! window. Constant space and constant time per update, and almost always
//! the same maximum as tracking every sample in the window.
//!
//! A new overall maximum lets us forget everything older: it dominates the
//! rest of the window by definition and it is the most recent sample, so the
//! filter restarts from it.

#[derive(Debug, Copy, Clone, Default)]
struct FilterSample {
    /// Round-trip count at which the sample was taken.
    time: u64,

    /// Sample value.
    value: u64,
}

/// Windowed maximum of bandwidth samples, timed in packet round trips.
#[derive(Debug)]
pub(crate) struct MaxFilter {
    /// Window length in round trips.
    window: u64,

    /// The best, second best, and third best samples.
    samples: [FilterSample; 3],
}

impl MaxFilter {
    pub(crate) fn new(window: u64) -> Self {
        Self {
            window,
            samples: [Default::default(); 3],
        }
    }

    /// Forget all state and restart the filter from the given sample.
    fn reset(&mut self, sample: FilterSample) {
        self.samples.fill(sample)
    }

    /// As time advances, rotate the 1st, 2nd, and 3rd choices.
    fn subwin_update(&mut self, sample: FilterSample) {
        let dt = sample.time.saturating_sub(self.samples[0].time);
        if dt > self.window {
            // The best sample aged out of the window; promote the 2nd and
            // 3rd choices. Iterate once more in case the promoted 2nd
            // choice is also outside the window.
            self.samples[0] = self.samples[1];
            self.samples[1] = self.samples[2];
            self.samples[2] = sample;
            if sample.time.saturating_sub(self.samples[0].time) > self.window {
                self.samples[0] = self.samples[1];
                self.samples[1] = self.samples[2];
                self.samples[2] = sample;
            }
        } else if self.samples[1].time == self.samples[0].time && dt > self.window / 4 {
            // A quarter of the window passed without a new best; take a 2nd
            // choice from the second quarter.
            self.samples[2] = sample;
            self.samples[1] = sample;
        } else if self.samples[2].time == self.samples[1].time && dt > self.window / 2 {
            // Half the window passed; take a 3rd choice from the last half.
            self.samples[2] = sample;
        }
    }

    /// Feed a new measurement, updating the 1st, 2nd, or 3rd choice max.
    pub(crate) fn update(&mut self, time: u64, value: u64) {
        if time < self.samples[2].time {
            // Time must be monotonically increasing.
            return;
        }

        let sample = FilterSample { time, value };

        if self.samples[0].value == 0 // uninitialized
            || sample.value >= self.samples[0].value // new max
            || sample.time.saturating_sub(self.samples[2].time) > self.window
        // nothing left in the window
        {
            self.reset(sample);
            return;
        }

        if sample.value >= self.samples[1].value {
            self.samples[2] = sample;
            self.samples[1] = sample;
        } else if sample.value >= self.samples[2].value {
            self.samples[2] = sample;
        }

        self.subwin_update(sample);
    }

    /// Current windowed maximum.
    pub(crate) fn get(&self) -> u64 {
        self.samples[0].value
    }
}
