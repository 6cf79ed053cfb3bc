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

//! RTT pattern detector.
//!
//! The time gaps between successive rate samples are binned into a fixed
//! histogram. A periodic radio scheduler produces a dominant spike at its
//! period (and often sub-harmonics at integer fractions of it); once enough
//! samples have accumulated, the detector extracts the dominant peaks and
//! either confirms a scheduling unit or declares the connection aperiodic.

use log::*;

/// Histogram bucket width in microseconds.
pub(crate) const BUCKET_WIDTH_US: u64 = 500;

/// Number of histogram buckets. Gaps beyond `BUCKET_COUNT * BUCKET_WIDTH_US`
/// are ignored.
pub(crate) const BUCKET_COUNT: usize = 40;

/// Samples accumulated before a classification pass runs.
const DECISION_SAMPLE_COUNT: u32 = 250;

/// Number of dominant peaks extracted per classification pass.
const PEAK_COUNT: usize = 3;

/// Minimum occurrences for the top peak to count as a confirmed period.
const PEAK_VALUE_THRESHOLD: u8 = 8;

/// Buckets zeroed on each side of an extracted peak, so that the shoulders
/// of a spike cannot re-win as a separate peak.
const SUPPRESS_RADIUS: usize = 4;

/// Low buckets zeroed before peak extraction; gaps that short are ack
/// clustering, not scheduler periods.
const LOW_BUCKET_CUTOFF: usize = 5;

/// Outcome of a classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Classification {
    /// Not enough samples accumulated yet.
    Pending,

    /// A dominant period was confirmed; the scheduling unit in microseconds.
    Periodic(u64),

    /// No reliable period exists; period-aware control should be disabled.
    Aperiodic,

    /// Peaks were weak but harmonically related; keep collecting.
    Inconclusive,
}

/// Histogram of sample-gap occurrences with iterative peak extraction.
#[derive(Debug)]
pub(crate) struct PatternDetector {
    /// One counter per 500 us gap bucket. Counters saturate.
    histogram: [u8; BUCKET_COUNT],

    /// Samples accumulated since the last reset.
    sample_count: u32,
}

impl PatternDetector {
    pub(crate) fn new() -> Self {
        Self {
            histogram: [0; BUCKET_COUNT],
            sample_count: 0,
        }
    }

    /// Samples accumulated since the last reset.
    pub(crate) fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Zero the histogram and the sample counter.
    pub(crate) fn reset(&mut self) {
        self.histogram = [0; BUCKET_COUNT];
        self.sample_count = 0;
    }

    /// Bin one inter-sample gap.
    ///
    /// The count is spread across the bucket and its upper neighbor so that
    /// a period sitting near a bucket edge still accumulates into a single
    /// dominant spike despite timing jitter.
    pub(crate) fn observe(&mut self, gap_us: u64) {
        let index = (gap_us / BUCKET_WIDTH_US) as usize;
        if index >= BUCKET_COUNT {
            return;
        }

        self.histogram[index] = self.histogram[index].saturating_add(1);
        if index + 1 < BUCKET_COUNT {
            self.histogram[index + 1] = self.histogram[index + 1].saturating_add(1);
        }
        self.sample_count += 1;
    }

    /// Run a classification pass once enough samples have accumulated.
    ///
    /// The histogram and sample counter are fully reset by every pass,
    /// whatever the outcome.
    pub(crate) fn classify(&mut self) -> Classification {
        if self.sample_count < DECISION_SAMPLE_COUNT {
            return Classification::Pending;
        }

        let peaks = self.extract_peaks();
        let decision = Self::decide(&peaks);

        debug!(
            "pattern classified: peaks = {:?}, decision = {:?}",
            peaks, decision
        );

        self.reset();
        decision
    }

    /// Iteratively extract the dominant peaks, zeroing each winner and its
    /// neighborhood so adjacent buckets cannot win twice.
    fn extract_peaks(&mut self) -> [(usize, u8); PEAK_COUNT] {
        for bucket in self.histogram.iter_mut().take(LOW_BUCKET_CUTOFF) {
            *bucket = 0;
        }

        let mut peaks = [(0, 0); PEAK_COUNT];
        for peak in peaks.iter_mut() {
            let mut max = 0;
            let mut index = 0;
            for (j, count) in self.histogram.iter().enumerate().skip(LOW_BUCKET_CUTOFF) {
                if *count > max {
                    max = *count;
                    index = j;
                }
            }
            *peak = (index, max);

            self.histogram[index] = 0;
            let lo = index.saturating_sub(SUPPRESS_RADIUS);
            let hi = (index + SUPPRESS_RADIUS).min(BUCKET_COUNT - 1);
            for bucket in self.histogram[lo..=hi].iter_mut() {
                *bucket = 0;
            }
        }
        peaks
    }

    fn decide(peaks: &[(usize, u8); PEAK_COUNT]) -> Classification {
        let (top_index, top_value) = peaks[0];

        if top_value >= PEAK_VALUE_THRESHOLD {
            let mut su = BUCKET_WIDTH_US * top_index as u64;

            // A spike at 5 ms with a co-occurring spike at 2.5 ms means the
            // true period is 2.5 ms and every other cycle was missed.
            if top_index == 10 {
                if (peaks[1].0 == 5 && peaks[1].1 >= top_value / 2)
                    || (peaks[2].0 == 5 && peaks[2].1 >= top_value / 2)
                {
                    su = 2500;
                }
            }

            // Conversely, a spike at 10 ms backed by one at 5 ms is a 5 ms
            // scheduler seen through aggregated acks.
            if top_index == 20 {
                if peaks[1].0 == 10 {
                    su = 5000;
                } else if peaks[2].0 == 10 && peaks[2].1 >= top_value / 2 {
                    su = 5000;
                }
            }

            // Rounding corrections for the common cellular intervals.
            if su == 4500 {
                su = 5000;
            } else if su == 7500 {
                su = 8000;
            }

            return Classification::Periodic(su);
        }

        if top_value == 0 || peaks[1].1 == 0 {
            return Classification::Aperiodic;
        }

        // Weak peaks can still be trusted if they are harmonically related
        // within one bucket of tolerance; otherwise the gaps are noise.
        let a = peaks[0].0;
        let b = peaks[1].0;
        if a % b != 0 && a % (b + 1) != 0 && (b <= 1 || a % (b - 1) != 0) {
            return Classification::Aperiodic;
        }

        Classification::Inconclusive
    }
}
