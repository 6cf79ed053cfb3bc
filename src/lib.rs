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

//! Cadence is a congestion control algorithm for transport connections over
//! cellular links.
//!
//! Cellular base stations assign radio resources on a recurring schedule, and
//! that schedule shows up at the transport layer as a periodic pattern in the
//! observed round-trip times. Cadence first discovers available bandwidth and
//! the minimum round-trip time like a bandwidth-delay-product controller,
//! then bins the time gaps between delivery-rate samples into a histogram to
//! infer the scheduler's period (the "scheduling unit"). Once a stable period
//! is confirmed, it switches to a steady-state controller that tracks RTT
//! inflation and deflation relative to that period, keeping the pipe full
//! without building the standing queues the periodic scheduler would
//! otherwise cause. When no reliable period can be found, it falls back to
//! generic bandwidth-delay control.
//!
//! The crate consumes per-acknowledgment rate samples and socket state from a
//! host transport stack and emits a target congestion window and pacing rate.
//! It never manages sockets, timers, or packet I/O itself.
//!
//! ## Example
//!
//! ```
//! use cadence_cc::{Cadence, Config, HostState, RateSample};
//!
//! let mut cc = Cadence::new(Config::new());
//! let mut host = HostState {
//!     now_us: 2_000_000,
//!     delivered: 10,
//!     cwnd: 10,
//!     cwnd_clamp: 1_000,
//!     mss: 1200,
//!     max_pacing_rate: u64::MAX,
//! };
//! let sample = RateSample {
//!     delivered: 12_000,
//!     interval_us: 40_000,
//!     rtt_us: 40_000,
//!     prior_delivered: 0,
//!     acked: 10,
//!     is_app_limited: false,
//! };
//! let out = cc.on_sample(&mut host, &sample);
//! assert!(out.cwnd >= 4);
//! ```

use std::fmt;

pub use crate::cadence::CaState;
pub use crate::cadence::Cadence;
pub use crate::cadence::Mode;
pub use crate::sample::HostState;
pub use crate::sample::RateSample;
pub use crate::sample::SampleOutput;

/// Fixed-point scale for bandwidth values (bytes per microsecond).
pub(crate) const BW_SCALE: u32 = 24;
pub(crate) const BW_UNIT: u64 = 1 << BW_SCALE;

/// Fixed-point scale for gain factors.
pub(crate) const GAIN_SCALE: u32 = 8;
pub(crate) const GAIN_UNIT: u64 = 1 << GAIN_SCALE;

/// Fixed-point scale for the window blend weight.
pub(crate) const BLEND_SCALE: u32 = 5;
pub(crate) const BLEND_UNIT: u64 = 1 << BLEND_SCALE;

/// Scheduling unit assumed until the pattern detector has classified one, in
/// microseconds. Matches the most common cellular scheduling interval.
pub(crate) const INITIAL_SCHEDULING_UNIT_US: u64 = 5000;

/// Default minimal congestion window in segments.
const DEFAULT_MIN_CWND: u64 = 4;

/// Default initial congestion window in segments.
const DEFAULT_INITIAL_CWND: u64 = 10;

/// Default EWMA smoothing divisor.
const DEFAULT_GAMMA: u64 = 8;

/// Default multiplier applied to the smoothed bandwidth when mapping it to a
/// pacing rate.
const DEFAULT_ALPHA: u64 = 2;

/// Default percentage of the window blended toward the bandwidth-delay target
/// on each steady-state adjustment.
const DEFAULT_BETA: u64 = 5;

/// Error type for cadence operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The provided configuration value is invalid.
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(v) => write!(f, "invalid config: {v}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Cadence configurable parameters.
///
/// Tunables are snapshotted when the controller is created; changing a
/// `Config` has no effect on connections already using it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Multiplier applied to the smoothed bandwidth estimate when deriving
    /// the pacing rate in steady state.
    alpha: u64,

    /// Percentage of the congestion window blended toward the
    /// bandwidth-delay target on each adjustment, applied at 1/32
    /// granularity.
    beta: u64,

    /// Smoothing divisor of the bandwidth EWMA (pole `1/gamma`).
    gamma: u64,

    /// Forced scheduling unit in microseconds. Zero selects automatic
    /// detection.
    scheduling_unit: u64,

    /// Emit a per-sample state dump at trace level.
    enable_trace: bool,

    /// Minimal congestion window in segments.
    min_cwnd: u64,

    /// Initial congestion window in segments.
    initial_cwnd: u64,
}

impl Config {
    pub fn new() -> Self {
        Config {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
            scheduling_unit: 0,
            enable_trace: false,
            min_cwnd: DEFAULT_MIN_CWND,
            initial_cwnd: DEFAULT_INITIAL_CWND,
        }
    }

    /// Set the pacing bandwidth multiplier. Must be at least 1.
    pub fn set_alpha(&mut self, alpha: u64) -> Result<()> {
        if alpha == 0 {
            return Err(Error::InvalidConfig("alpha must be at least 1".into()));
        }
        self.alpha = alpha;
        Ok(())
    }

    /// Set the window blend percentage. Must be in 1..=100.
    pub fn set_beta(&mut self, beta: u64) -> Result<()> {
        if beta == 0 || beta > 100 {
            return Err(Error::InvalidConfig("beta must be in 1..=100".into()));
        }
        self.beta = beta;
        Ok(())
    }

    /// Set the EWMA smoothing divisor. Must be at least 1.
    pub fn set_gamma(&mut self, gamma: u64) -> Result<()> {
        if gamma == 0 {
            return Err(Error::InvalidConfig("gamma must be at least 1".into()));
        }
        self.gamma = gamma;
        Ok(())
    }

    /// Force the scheduling unit to a fixed period in microseconds and skip
    /// pattern detection. Zero restores automatic detection.
    pub fn set_scheduling_unit(&mut self, scheduling_unit_us: u64) {
        self.scheduling_unit = scheduling_unit_us;
    }

    /// Enable the per-sample state dump at trace level.
    pub fn enable_trace(&mut self, v: bool) {
        self.enable_trace = v;
    }

    /// Set the minimal congestion window in segments.
    pub fn set_min_cwnd(&mut self, min_cwnd: u64) {
        self.min_cwnd = min_cwnd;
    }

    /// Set the initial congestion window in segments.
    pub fn set_initial_cwnd(&mut self, initial_cwnd: u64) {
        self.initial_cwnd = initial_cwnd;
    }

    pub(crate) fn alpha(&self) -> u64 {
        self.alpha
    }

    pub(crate) fn beta(&self) -> u64 {
        self.beta
    }

    pub(crate) fn gamma(&self) -> u64 {
        self.gamma
    }

    pub(crate) fn scheduling_unit(&self) -> u64 {
        self.scheduling_unit
    }

    pub(crate) fn trace_enabled(&self) -> bool {
        self.enable_trace
    }

    pub(crate) fn min_cwnd(&self) -> u64 {
        self.min_cwnd
    }

    pub(crate) fn initial_cwnd(&self) -> u64 {
        self.initial_cwnd
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

mod boundary;
mod cadence;
mod minmax;
mod pattern;
mod sample;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::new();
        assert_eq!(config.alpha(), 2);
        assert_eq!(config.beta(), 5);
        assert_eq!(config.gamma(), 8);
        assert_eq!(config.scheduling_unit(), 0);
        assert!(!config.trace_enabled());
        assert_eq!(config.min_cwnd(), 4);
        assert_eq!(config.initial_cwnd(), 10);
    }

    #[test]
    fn config_validation() {
        let mut config = Config::new();
        assert_eq!(
            config.set_alpha(0),
            Err(Error::InvalidConfig("alpha must be at least 1".into()))
        );
        assert_eq!(
            config.set_beta(101),
            Err(Error::InvalidConfig("beta must be in 1..=100".into()))
        );
        assert_eq!(
            config.set_gamma(0),
            Err(Error::InvalidConfig("gamma must be at least 1".into()))
        );
        assert!(config.set_alpha(3).is_ok());
        assert!(config.set_beta(10).is_ok());
        assert!(config.set_gamma(4).is_ok());
        assert_eq!(config.alpha(), 3);
        assert_eq!(config.beta(), 10);
        assert_eq!(config.gamma(), 4);
    }
}
