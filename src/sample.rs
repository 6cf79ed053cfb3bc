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

//! Input and output types exchanged with the host transport stack.

/// A delivery rate sample produced by the host for one acknowledgment.
///
/// Invalid sub-fields (zero `delivered`, `interval_us`, or `rtt_us`) cause
/// the affected sub-update to be skipped; they never abort the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateSample {
    /// Bytes newly marked as delivered over the sampling interval.
    pub delivered: u64,

    /// Length of the sampling interval in microseconds.
    pub interval_us: u64,

    /// Round-trip time measured for this sample in microseconds, or zero
    /// when no valid measurement is available.
    pub rtt_us: u64,

    /// The connection delivery count recorded when the most recently acked
    /// packet was sent. Used to detect packet-timed round trips.
    pub prior_delivered: u64,

    /// Segments newly acked (including SACKed) by this acknowledgment.
    pub acked: u64,

    /// Whether the sender was application-limited when the sample was taken.
    pub is_app_limited: bool,
}

/// Socket state shared with the host for one `on_sample` call.
///
/// `cwnd` is written back by the controller; the remaining fields are read
/// at call time.
#[derive(Debug, Clone, Copy)]
pub struct HostState {
    /// Current wall-clock timestamp in microseconds.
    pub now_us: u64,

    /// Total segments delivered over the lifetime of the connection. The
    /// round-trip marker `RateSample::prior_delivered` is compared against
    /// snapshots of this counter.
    pub delivered: u64,

    /// Current congestion window in segments.
    pub cwnd: u64,

    /// Upper bound on the congestion window in segments.
    pub cwnd_clamp: u64,

    /// Sender maximum segment size in bytes.
    pub mss: u64,

    /// Upper bound on the pacing rate in bytes per second.
    pub max_pacing_rate: u64,
}

/// Control outputs of one `on_sample` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOutput {
    /// Target congestion window in segments.
    pub cwnd: u64,

    /// Pacing rate in bytes per second.
    pub pacing_rate: u64,
}
