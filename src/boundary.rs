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

//! Scheduling-unit boundary tracker.
//!
//! Sample arrival times jitter around the scheduler's nominal period, so a
//! boundary cannot be declared by a simple modulo of the clock. The tracker
//! accumulates delivered bytes per period, compares consecutive inter-sample
//! gaps against the period minus a margin, and carries residual drift
//! forward in `clock_pass` so that early or late arrivals within one period
//! do not trigger spurious boundaries.

use crate::pattern::BUCKET_WIDTH_US;

/// Periods at or below this length get a one-bucket margin instead of two.
const SMALL_UNIT_THRESHOLD_US: u64 = 3000;

/// What the tracker concluded from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryEvent {
    /// Still inside the current period, or not gathering one.
    None,

    /// A full scheduling unit completed.
    UnitComplete {
        /// Bytes delivered over the completed unit.
        delivered: u64,

        /// Observed length of the completed unit in microseconds.
        interval_us: u64,
    },
}

/// Accumulates delivered bytes per detected period and locates period
/// boundaries despite arrival jitter.
#[derive(Debug, Default)]
pub(crate) struct BoundaryTracker {
    /// Bytes delivered within the period being gathered.
    unit_delivered: u64,

    /// Observed length of the period being gathered.
    unit_interval_us: u64,

    /// Drift carried from gaps that stayed inside one period.
    clock_pass: u64,

    /// Whether a period is currently being gathered.
    gathering: bool,

    /// Arrival clock of the previous sample.
    previous_clock: u64,

    /// Gap preceding the previous sample.
    previous_clock_diff: u64,

    /// Bytes acked by the previous sample, accounted to the period that its
    /// gap closed.
    previous_ack_bytes: u64,
}

impl BoundaryTracker {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Arrival clock of the previous sample.
    pub(crate) fn previous_clock(&self) -> u64 {
        self.previous_clock
    }

    /// Record a sample arrival without boundary tracking. Used while the
    /// controller is not in steady state.
    pub(crate) fn touch(&mut self, now_us: u64) {
        self.previous_clock = now_us;
    }

    fn reset_unit(&mut self) {
        self.gathering = false;
        self.unit_interval_us = 0;
        self.unit_delivered = 0;
        self.clock_pass = 0;
    }

    /// Advance the tracker by one sample.
    ///
    /// `acked_bytes` is accounted to the period closed by the *next* call,
    /// mirroring that an ack pays for the gap that preceded it.
    pub(crate) fn advance(&mut self, now_us: u64, acked_bytes: u64, su: u64) -> BoundaryEvent {
        if su == 0 {
            self.touch(now_us);
            return BoundaryEvent::None;
        }

        let margin = if su <= SMALL_UNIT_THRESHOLD_US {
            BUCKET_WIDTH_US
        } else {
            2 * BUCKET_WIDTH_US
        };
        let threshold = su.saturating_sub(margin);

        let raw_gap = now_us.saturating_sub(self.previous_clock);
        let padded_prev = self.previous_clock_diff + self.clock_pass;
        let padded_cur = raw_gap + self.clock_pass;

        let mut event = BoundaryEvent::None;
        let mut clock_saving = false;

        if padded_prev >= threshold && padded_cur < threshold {
            // The previous gap closed a period and the current one opened
            // the next; start gathering without invoking the controller.
            self.unit_delivered += self.previous_ack_bytes;
            self.gathering = true;

            // If the raw previous gap overran the nominal period by more
            // than the margin, carry the overrun forward as drift.
            let nominal = ((padded_prev + margin) / su) * su;
            if self.previous_clock_diff.abs_diff(nominal) > margin
                && self.previous_clock_diff >= su + BUCKET_WIDTH_US
                && self.previous_clock_diff > nominal
            {
                self.clock_pass += self.previous_clock_diff - nominal;
            }

            self.unit_interval_us = padded_prev;
        } else if padded_prev >= threshold && padded_cur >= threshold {
            // Past the boundary on both sides: the previous gap spanned a
            // whole period on its own.
            self.unit_delivered += self.previous_ack_bytes;
            self.unit_interval_us = padded_prev;

            event = BoundaryEvent::UnitComplete {
                delivered: self.unit_delivered,
                interval_us: self.unit_interval_us,
            };
            self.reset_unit();
        } else if padded_prev < threshold && padded_cur >= threshold {
            // The current gap crossed the boundary; close out the period
            // being gathered.
            if self.gathering {
                self.unit_delivered += self.previous_ack_bytes;

                event = BoundaryEvent::UnitComplete {
                    delivered: self.unit_delivered,
                    interval_us: self.unit_interval_us,
                };
                self.reset_unit();

                // A short raw gap only crossed thanks to carried drift;
                // remember the padded gap so the drift is not counted twice.
                if raw_gap < threshold {
                    clock_saving = true;
                }
            }
        } else if self.gathering {
            // Still inside the period; fold the previous gap into the
            // carried drift.
            self.unit_delivered += self.previous_ack_bytes;
            self.clock_pass += self.previous_clock_diff;
        }

        self.previous_clock_diff = if clock_saving { padded_cur } else { raw_gap };
        self.previous_ack_bytes = acked_bytes;
        self.previous_clock = now_us;

        event
    }
}
