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

//! The Cadence congestion controller.
//!
//! Cadence starts out like a bandwidth-delay-product controller: a high-gain
//! startup probes for bandwidth while a windowed maximum filter and a static
//! minimum track the path model. Once bandwidth growth stalls, the queue
//! built during startup is drained and control hands over to the
//! steady-state machinery: a histogram-based detector infers the period of
//! the radio scheduler from inter-sample gaps, a boundary tracker totals the
//! bytes delivered per period, and a trend-based controller inflates or
//! deflates the window estimate from the RTT movement across consecutive
//! periods. Connections without a stable period fall back to plain
//! bandwidth-delay control.
//!
//! All arithmetic is fixed point: bandwidth at scale 2^24 (bytes per
//! microsecond), gains at scale 2^8, blend weights at scale 2^5.

use log::*;

use crate::boundary::BoundaryEvent;
use crate::boundary::BoundaryTracker;
use crate::minmax::MaxFilter;
use crate::pattern::Classification;
use crate::pattern::PatternDetector;
use crate::sample::HostState;
use crate::sample::RateSample;
use crate::sample::SampleOutput;
use crate::Config;
use crate::BLEND_SCALE;
use crate::BLEND_UNIT;
use crate::BW_SCALE;
use crate::BW_UNIT;
use crate::GAIN_SCALE;
use crate::GAIN_UNIT;
use crate::INITIAL_SCHEDULING_UNIT_US;

/// Startup pacing gain, `2/ln(2)`, the minimum gain that doubles the sending
/// rate each round.
const STARTUP_GAIN: u64 = GAIN_UNIT * 2885 / 1000 + 1;

/// Drain pacing gain, the inverse of the startup gain.
const DRAIN_GAIN: u64 = GAIN_UNIT * 1000 / 2885;

/// Gain applied to the bandwidth-delay product when deriving the target
/// window outside steady state.
const CWND_GAIN: u64 = GAIN_UNIT * 2;

/// Bandwidth must grow past `6/5` of the smoothed estimate for a probe round
/// to count as still finding bandwidth.
const FULL_BW_THRESHOLD: u64 = GAIN_UNIT * 6 / 5;

/// Probe rounds without growth before bandwidth is considered fully
/// discovered.
const FULL_BW_COUNT_THRESHOLD: u32 = 3;

/// Length of the bandwidth maximum filter window in packet-timed round
/// trips.
const BW_FILTER_ROUNDS: u64 = 2;

/// Baseline for the interval-inflation pacing throttle: a 100% inflated
/// interval halves the gain.
const INFLATION_BASELINE: u64 = 200;

/// Trend history starts from a pessimistic 100 ms guess.
const INITIAL_RTT_US: u64 = 100_000;

/// Below `1.2 Mbps / 8` the TSO goal drops to a single segment.
const MIN_TSO_RATE: u64 = 1_200_000;

/// Pacing rate to burst-size shift (about 1 ms of data per burst).
const PACING_SHIFT: u32 = 10;

/// Upper bound of a TSO burst in bytes, headers excluded.
const TSO_MAX_BYTES: u64 = 64 * 1024 - 1 - 320;

/// Upper bound of the TSO goal in segments.
const MAX_TSO_SEGS: u64 = 127;

const MICROS_PER_SEC: u64 = 1_000_000;

/// Controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Discovering available bandwidth with a high pacing gain.
    Startup,

    /// Draining the queue built during startup.
    Drain,

    /// Scheduling-unit aware control.
    Steady,

    /// Generic bandwidth-delay control; no reliable period was detected.
    Fallback,
}

/// Host congestion-avoidance state, reported via
/// [`on_state_change`](Cadence::on_state_change).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    Open,
    Disorder,
    Recovery,
    Loss,
}

/// Per-connection Cadence state.
///
/// One instance per connection, owned by the single execution context that
/// delivers its rate samples. Every call completes before the next sample is
/// processed; nothing is shared across connections.
#[derive(Debug)]
pub struct Cadence {
    /// Configurable parameters, snapshotted at creation.
    config: Config,

    mode: Mode,

    /// Smallest observed round-trip time; `u64::MAX` until the first valid
    /// sample. Never increased afterwards.
    min_rtt_us: u64,

    /// Windowed maximum of bandwidth samples, fed while not in steady state.
    bw_filter: MaxFilter,

    /// Count of packet-timed round trips, the filter's clock.
    round_count: u64,

    /// Delivery count that ends the current round trip.
    next_round_delivered: u64,

    /// Whether the current sample started a new round trip.
    is_round_start: bool,

    full_bw_reached: bool,

    /// Consecutive probe rounds without bandwidth growth.
    full_bw_count: u32,

    /// Pacing gain at scale 2^8.
    pacing_gain: u64,

    /// Pacing rate in bytes per second, as last reported to the host.
    pacing_rate: u64,

    /// Smoothed bandwidth estimate at scale 2^24, pole `1/gamma`.
    ewma_bw: u64,

    /// Window estimate in bytes; the primary steady-state output.
    cwnd_est: u64,

    /// Detected or configured scheduling unit in microseconds.
    su: u64,

    detector: PatternDetector,

    tracker: BoundaryTracker,

    /// Interval inflation of the current sample in percent, used to scale
    /// down the additive window increment.
    inflation_pct: u64,

    /// RTT of the previous steady-state sample.
    previous_rtt: u64,

    /// RTT recorded at the previous period boundary.
    previous_previous_rtt: u64,

    /// Bandwidth of the previous steady-state sample at scale 2^24.
    previous_bw: u64,

    /// Whether the host ever reported a loss. Informational only.
    loss_seen: bool,
}

impl Cadence {
    /// Create the per-connection state. This is the `on_init` entry point;
    /// call it once, before any samples.
    pub fn new(config: Config) -> Self {
        let scheduling_unit = config.scheduling_unit();

        Cadence {
            config,
            mode: Mode::Startup,
            min_rtt_us: u64::MAX,
            bw_filter: MaxFilter::new(BW_FILTER_ROUNDS),
            round_count: 0,
            next_round_delivered: 0,
            is_round_start: false,
            full_bw_reached: false,
            full_bw_count: 0,
            pacing_gain: STARTUP_GAIN,
            pacing_rate: 0,
            ewma_bw: 0,
            cwnd_est: 0,
            su: if scheduling_unit != 0 {
                scheduling_unit
            } else {
                INITIAL_SCHEDULING_UNIT_US
            },
            detector: PatternDetector::new(),
            tracker: BoundaryTracker::new(),
            inflation_pct: 0,
            previous_rtt: INITIAL_RTT_US,
            previous_previous_rtt: INITIAL_RTT_US,
            previous_bw: 0,
            loss_seen: false,
        }
    }

    /// Consume one rate sample and produce the next window and pacing rate.
    ///
    /// The main control entry point. It always returns a usable output and
    /// writes the window back to `host.cwnd`; invalid sub-fields of the
    /// sample only skip the sub-updates that depend on them.
    pub fn on_sample(&mut self, host: &mut HostState, sample: &RateSample) -> SampleOutput {
        self.update_model(host, sample);

        if self.config.trace_enabled() {
            trace!(
                "cadence: mode={:?} cwnd_est={} rtt_us={} min_rtt_us={} su={} ewma_bw={} \
                 max_bw={} interval_us={} delivered={} cwnd={} pacing_gain={} acked={} \
                 app_limited={} loss_seen={}",
                self.mode,
                self.cwnd_est,
                sample.rtt_us,
                self.min_rtt_us,
                self.su,
                self.ewma_bw,
                self.bw_filter.get(),
                sample.interval_us,
                sample.delivered,
                host.cwnd,
                self.pacing_gain,
                sample.acked,
                sample.is_app_limited,
                self.loss_seen,
            );
        }

        self.track_scheduling_unit(host, sample);

        let bw = self.output_bw(sample);
        if self.mode == Mode::Fallback {
            self.pacing_gain = GAIN_UNIT;
        }
        self.set_pacing_rate(host, bw);
        self.set_cwnd(host, sample, bw);

        SampleOutput {
            cwnd: host.cwnd,
            pacing_rate: self.pacing_rate,
        }
    }

    /// Record a host congestion state change. Loss is noted and nothing
    /// else; it does not alter mode, window, or pacing.
    pub fn on_state_change(&mut self, state: CaState) {
        if state == CaState::Loss {
            self.loss_seen = true;
            debug!("cadence: loss reported in mode {:?}", self.mode);
        }
    }

    /// Release detector state. Idempotent and safe at any point of the
    /// connection lifetime, including before the first sample.
    pub fn on_release(&mut self) {
        self.detector.reset();
    }

    /// Pacing rate in bytes per second, as last reported.
    pub fn pacing_rate(&self) -> u64 {
        self.pacing_rate
    }

    /// Detected or configured scheduling unit in microseconds.
    pub fn scheduling_unit(&self) -> u64 {
        self.su
    }

    /// Current controller mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Smallest observed round-trip time, `u64::MAX` until known.
    pub fn min_rtt_us(&self) -> u64 {
        self.min_rtt_us
    }

    /// Check if still probing for bandwidth.
    pub fn in_slow_start(&self) -> bool {
        self.mode == Mode::Startup
    }

    /// Minimal congestion window in segments.
    pub fn minimal_window(&self) -> u64 {
        self.config.min_cwnd()
    }

    /// Initial congestion window in segments.
    pub fn initial_window(&self) -> u64 {
        self.config.initial_cwnd()
    }

    fn update_model(&mut self, host: &HostState, sample: &RateSample) {
        self.update_bw(host, sample);
        self.check_full_bw_reached(sample);
        self.check_drain(host);
        self.update_min_rtt(sample);
    }

    /// Advance the round counter and feed the bandwidth filter.
    fn update_bw(&mut self, host: &HostState, sample: &RateSample) {
        self.is_round_start = false;
        if sample.delivered == 0 || sample.interval_us == 0 {
            return;
        }

        // The acked packet was sent at or past the previous round's end
        // marker: a packet-timed round trip completed.
        if sample.prior_delivered >= self.next_round_delivered {
            self.next_round_delivered = host.delivered;
            if self.mode != Mode::Steady {
                self.round_count += 1;
            }
            self.is_round_start = true;
        }

        let bw = sample.delivered * BW_UNIT / sample.interval_us;

        if self.mode != Mode::Steady {
            // App-limited samples underestimate the path unless they still
            // beat the current maximum.
            if !sample.is_app_limited || bw >= self.bw_filter.get() {
                self.bw_filter.update(self.round_count, bw);
            }
        }
    }

    /// Once per round start, check whether the probe stopped finding
    /// bandwidth.
    fn check_full_bw_reached(&mut self, sample: &RateSample) {
        if self.full_bw_reached || !self.is_round_start || sample.is_app_limited {
            return;
        }

        let threshold = self.ewma_bw * FULL_BW_THRESHOLD >> GAIN_SCALE;
        if self.bw_filter.get() >= threshold {
            self.ewma_bw = self.bw_filter.get();
            self.full_bw_count = 0;
            return;
        }

        self.full_bw_count += 1;
        if self.full_bw_count >= FULL_BW_COUNT_THRESHOLD {
            self.full_bw_reached = true;
            debug!(
                "cadence: full bandwidth reached, ewma_bw={} max_bw={}",
                self.ewma_bw,
                self.bw_filter.get()
            );
        }
    }

    /// Leave startup once bandwidth is fully discovered. Drain and steady
    /// entry are folded together: the drain gain is installed and
    /// immediately superseded by unity when steady state initializes.
    fn check_drain(&mut self, host: &HostState) {
        if self.mode == Mode::Startup && self.full_bw_reached {
            self.mode = Mode::Drain;
            self.pacing_gain = DRAIN_GAIN;
            self.enter_steady(host);
        }
    }

    fn enter_steady(&mut self, host: &HostState) {
        self.cwnd_est = host.cwnd * host.mss;
        self.mode = Mode::Steady;
        self.pacing_gain = GAIN_UNIT;
        self.ewma_bw = self.bw_filter.get();
        debug!(
            "cadence: enter steady, cwnd_est={} ewma_bw={} su={}",
            self.cwnd_est, self.ewma_bw, self.su
        );
    }

    /// The latency floor is static once discovered: no decay window.
    fn update_min_rtt(&mut self, sample: &RateSample) {
        if sample.rtt_us > 0 && sample.rtt_us <= self.min_rtt_us {
            self.min_rtt_us = sample.rtt_us;
        }
    }

    /// Feed the pattern detector and the boundary tracker with this sample's
    /// arrival gap, and run the steady-state adjustment at period
    /// boundaries.
    fn track_scheduling_unit(&mut self, host: &mut HostState, sample: &RateSample) {
        if sample.rtt_us == 0 || self.previous_rtt == 0 || self.min_rtt_us > sample.rtt_us {
            return;
        }

        if self.config.scheduling_unit() == 0 {
            let gap = host.now_us.saturating_sub(self.tracker.previous_clock());
            self.detector.observe(gap);
            let classification = self.detector.classify();
            self.apply_classification(host, classification);
        } else {
            self.su = self.config.scheduling_unit();
        }

        if self.mode != Mode::Steady {
            self.tracker.touch(host.now_us);
            return;
        }

        self.update_inflation_throttle(sample);

        let bw = if sample.interval_us > 0 {
            sample.delivered * BW_UNIT / sample.interval_us
        } else {
            0
        };

        let acked_bytes = sample.acked * host.mss;
        if let BoundaryEvent::UnitComplete {
            delivered,
            interval_us,
        } = self.tracker.advance(host.now_us, acked_bytes, self.su)
        {
            self.adjust_window(delivered, interval_us);
        }

        self.previous_bw = bw;
        self.previous_rtt = sample.rtt_us;
    }

    /// Act on a pattern classification outcome.
    fn apply_classification(&mut self, host: &HostState, classification: Classification) {
        match classification {
            Classification::Pending | Classification::Inconclusive => {}
            Classification::Periodic(su) => {
                self.su = su;
                if self.mode != Mode::Steady {
                    self.enter_steady(host);
                }
                debug!("cadence: scheduling unit confirmed, su={su}");
            }
            Classification::Aperiodic => {
                self.mode = Mode::Fallback;
                self.su = INITIAL_SCHEDULING_UNIT_US;
                debug!("cadence: no reliable period, falling back");
            }
        }
    }

    /// Throttle the pacing gain in proportion to how much the sample
    /// interval overshot the latency floor. Runs on every steady-state
    /// sample, not only at period boundaries.
    fn update_inflation_throttle(&mut self, sample: &RateSample) {
        self.inflation_pct = 0;
        if sample.interval_us > self.min_rtt_us {
            let inflation = 100 * (sample.interval_us - self.min_rtt_us) / sample.interval_us;
            self.inflation_pct = inflation;
            self.pacing_gain = GAIN_UNIT * (INFLATION_BASELINE - inflation) / INFLATION_BASELINE;
        }
    }

    /// Adjust the window estimate at a scheduling-unit boundary from the RTT
    /// trend across the two most recent periods.
    fn adjust_window(&mut self, unit_delivered: u64, unit_interval_us: u64) {
        let unit_bw = if unit_interval_us > 0 {
            unit_delivered * BW_UNIT / unit_interval_us
        } else {
            0
        };
        let beta = BLEND_UNIT * self.config.beta();

        if self.previous_rtt <= self.previous_previous_rtt {
            // The pipe is not inflating: grow additively, proportional to
            // one scheduling unit of smoothed bandwidth and to how far the
            // RTT dropped relative to the queueing headroom.
            let current = self.cwnd_est;

            let mut amount = self.ewma_bw;
            if self.inflation_pct > 0 {
                amount = amount * (INFLATION_BASELINE - self.inflation_pct) / INFLATION_BASELINE;
            }
            amount = (amount * self.su) >> BW_SCALE;
            amount *= self.previous_previous_rtt - self.previous_rtt;
            let headroom = self.previous_previous_rtt.saturating_sub(self.min_rtt_us);
            let amount = if headroom > 0 { amount / headroom } else { 0 };

            if self.ewma_bw > self.previous_bw {
                // Bandwidth grew since the last period: pull the estimate
                // toward the bandwidth-delay target, discounting the extra
                // queueing delay the growth implies.
                let mut queue_rtt = self.previous_rtt.saturating_sub(self.min_rtt_us);
                queue_rtt = queue_rtt * (self.ewma_bw - self.previous_bw) / self.ewma_bw;
                self.cwnd_est = Self::blend(self.cwnd_est, self.min_rtt_us, queue_rtt, beta);
            }

            self.cwnd_est += amount;
            // This branch never shrinks the window.
            self.cwnd_est = self.cwnd_est.max(current);
        } else {
            // The pipe is inflating: blend toward a bandwidth-delay target
            // whose denominator carries both the implied queueing delay and
            // the RTT excess scaled by this period's bandwidth overshoot.
            let mut excess_rtt = self.previous_rtt - self.previous_previous_rtt;

            let mut queue_rtt = self.previous_rtt.saturating_sub(self.min_rtt_us);
            if self.ewma_bw > self.previous_bw {
                queue_rtt = queue_rtt * (self.ewma_bw - self.previous_bw) / self.ewma_bw;
            } else {
                queue_rtt = 0;
            }

            if self.previous_bw > unit_bw {
                excess_rtt = excess_rtt * unit_bw / self.previous_bw;
            }

            self.cwnd_est =
                Self::blend(self.cwnd_est, self.min_rtt_us, queue_rtt + excess_rtt, beta);
        }

        let gamma = self.config.gamma();
        self.ewma_bw -= self.ewma_bw / gamma;
        self.ewma_bw += self.previous_bw / gamma;

        self.previous_previous_rtt = self.previous_rtt;
    }

    /// Blend the window estimate toward `cwnd * min_rtt / (min_rtt +
    /// extra_rtt)` with weight `beta` (percent at 1/32 granularity).
    fn blend(cwnd: u64, min_rtt_us: u64, extra_rtt_us: u64, beta: u64) -> u64 {
        let denominator = min_rtt_us + extra_rtt_us;
        if denominator == 0 {
            return cwnd;
        }

        let target = ((cwnd * min_rtt_us / denominator * beta) >> BLEND_SCALE) / 100;
        let kept = cwnd * (100 * BLEND_UNIT - beta) / (100 * BLEND_UNIT);
        kept + target
    }

    /// Bandwidth handed to the output mapper.
    fn output_bw(&self, sample: &RateSample) -> u64 {
        if sample.interval_us == 0 || self.su == 0 {
            return self.ewma_bw * self.config.alpha();
        }
        if self.mode != Mode::Steady {
            return self.bw_filter.get();
        }
        self.ewma_bw * self.config.alpha()
    }

    /// Map the bandwidth estimate and pacing gain to bytes per second.
    fn set_pacing_rate(&mut self, host: &HostState, bw: u64) {
        let mut rate = if self.full_bw_reached || self.bw_filter.get() != 0 {
            bw
        } else {
            // Conservative probe rate until the filter warms up.
            1000 * BW_UNIT / 10_000
        };

        rate = (rate * self.pacing_gain) >> GAIN_SCALE;
        rate = (rate * MICROS_PER_SEC) >> BW_SCALE;
        self.pacing_rate = rate.min(host.max_pacing_rate);
    }

    fn min_tso_segs(&self) -> u64 {
        if self.pacing_rate < MIN_TSO_RATE >> 3 {
            1
        } else {
            2
        }
    }

    /// Burst size goal in segments, derived from the pacing rate.
    fn tso_segs_goal(&self, mss: u64) -> u64 {
        let bytes = (self.pacing_rate >> PACING_SHIFT).min(TSO_MAX_BYTES);
        (bytes / mss).max(self.min_tso_segs()).min(MAX_TSO_SEGS)
    }

    /// Target window in segments.
    fn target_cwnd(&self, host: &HostState, bw: u64) -> u64 {
        if self.min_rtt_us == u64::MAX {
            // No RTT sample yet: stay on the initial window.
            return self.config.initial_cwnd();
        }

        let mss = host.mss.max(1);
        if self.mode == Mode::Steady {
            return self.cwnd_est / mss;
        }

        // Bandwidth-delay product, rounded up, padded with enough TSO
        // bursts to keep offload-sized sends from draining the pipe.
        let w = bw * self.min_rtt_us;
        let bytes = ((w * CWND_GAIN >> GAIN_SCALE) + BW_UNIT - 1) / BW_UNIT;
        bytes / mss + 3 * self.tso_segs_goal(mss)
    }

    /// Move the host window toward the target, by at most the newly acked
    /// segments.
    fn set_cwnd(&mut self, host: &mut HostState, sample: &RateSample, bw: u64) {
        if sample.acked == 0 {
            return;
        }

        let mut cwnd = host.cwnd;
        let target = self.target_cwnd(host, bw);

        if self.full_bw_reached {
            cwnd = (cwnd + sample.acked).min(target);
        } else if cwnd < target || host.delivered < self.config.initial_cwnd() {
            // Before bandwidth is discovered, grow unconditionally while
            // below the target or still inside the initial window of data.
            cwnd += sample.acked;
        }

        cwnd = cwnd.max(self.config.min_cwnd());
        host.cwnd = cwnd.min(host.cwnd_clamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[ctor::ctor]
    fn init() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .try_init();
    }

    fn test_host() -> HostState {
        HostState {
            now_us: 1_000_000,
            delivered: 0,
            cwnd: 10,
            cwnd_clamp: 10_000,
            mss: 1200,
            max_pacing_rate: u64::MAX,
        }
    }

    /// One acknowledgment worth of progress: 50 segments delivered over a
    /// 50 ms interval, each sample starting a new packet-timed round.
    fn feed_sample(cc: &mut Cadence, host: &mut HostState, gap_us: u64, rtt_us: u64) -> SampleOutput {
        host.now_us += gap_us;
        let prior_delivered = host.delivered;
        host.delivered += 50;
        let sample = RateSample {
            delivered: 60_000,
            interval_us: rtt_us,
            rtt_us,
            prior_delivered,
            acked: 50,
            is_app_limited: false,
        };
        cc.on_sample(host, &sample)
    }

    #[test]
    fn startup_discovers_bandwidth_and_enters_steady() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();

        assert!(cc.in_slow_start());

        // Constant bandwidth: the first round refreshes the EWMA, the next
        // three stall, and steady state starts on the fourth.
        for _ in 0..3 {
            feed_sample(&mut cc, &mut host, 5000, 50_000);
            assert!(cc.in_slow_start());
        }
        feed_sample(&mut cc, &mut host, 5000, 50_000);

        assert!(cc.full_bw_reached);
        assert_eq!(cc.mode(), Mode::Steady);
        assert!(!cc.in_slow_start());
        assert_eq!(cc.ewma_bw, cc.bw_filter.get());
        assert_eq!(cc.cwnd_est % host.mss, 0);
        assert!(cc.cwnd_est > 0);
    }

    #[test]
    fn startup_window_grows_toward_bdp_target() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();

        let before = host.cwnd;
        feed_sample(&mut cc, &mut host, 5000, 50_000);
        assert!(host.cwnd > before);
        assert!(host.cwnd <= host.cwnd_clamp);
    }

    #[test]
    fn min_rtt_is_monotonically_non_increasing() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();
        let mut rng = rand::thread_rng();
        let mut running_min = u64::MAX;

        for _ in 0..500 {
            let rtt = rng.gen_range(10_000..100_000);
            running_min = running_min.min(rtt);
            feed_sample(&mut cc, &mut host, 5000, rtt);
            assert_eq!(cc.min_rtt_us(), running_min);
        }
    }

    #[test]
    fn invalid_samples_do_not_disturb_the_model() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();

        feed_sample(&mut cc, &mut host, 5000, 50_000);
        let min_rtt = cc.min_rtt_us();
        let max_bw = cc.bw_filter.get();

        // Zero rtt, delivered, and interval: every sub-update skips, the
        // call still produces an output.
        host.now_us += 5000;
        let sample = RateSample::default();
        let out = cc.on_sample(&mut host, &sample);
        assert_eq!(cc.min_rtt_us(), min_rtt);
        assert_eq!(cc.bw_filter.get(), max_bw);
        assert!(out.cwnd >= cc.minimal_window());
    }

    #[test]
    fn improving_rtt_never_shrinks_window() {
        let mut cc = Cadence::new(Config::new());
        cc.mode = Mode::Steady;
        cc.min_rtt_us = 40_000;
        cc.previous_rtt = 50_000;
        cc.previous_previous_rtt = 50_000;
        cc.ewma_bw = 20_000_000;
        cc.previous_bw = 20_000_000;
        cc.cwnd_est = 500_000;

        // Flat RTT, unchanged bandwidth: the increment degenerates to zero
        // and the floor holds the window exactly.
        cc.adjust_window(60_000, 5000);
        assert_eq!(cc.cwnd_est, 500_000);

        // Dropping RTT: the increment is positive.
        cc.previous_rtt = 45_000;
        cc.adjust_window(60_000, 5000);
        assert!(cc.cwnd_est > 500_000);
    }

    #[test]
    fn worsening_rtt_shrinks_window() {
        let mut cc = Cadence::new(Config::new());
        cc.mode = Mode::Steady;
        cc.min_rtt_us = 40_000;
        cc.previous_rtt = 60_000;
        cc.previous_previous_rtt = 50_000;
        cc.ewma_bw = 20_000_000;
        cc.previous_bw = 20_000_000;
        cc.cwnd_est = 500_000;

        cc.adjust_window(60_000, 5000);
        assert!(cc.cwnd_est < 500_000);
        assert!(cc.cwnd_est > 0);
        // The boundary rotates the RTT history.
        assert_eq!(cc.previous_previous_rtt, 60_000);
    }

    #[test]
    fn adjustment_refreshes_the_bandwidth_ewma() {
        let mut cc = Cadence::new(Config::new());
        cc.mode = Mode::Steady;
        cc.min_rtt_us = 40_000;
        cc.previous_rtt = 50_000;
        cc.previous_previous_rtt = 50_000;
        cc.ewma_bw = 16_000_000;
        cc.previous_bw = 24_000_000;
        cc.cwnd_est = 500_000;

        // ewma - ewma/8 + previous/8
        cc.adjust_window(60_000, 5000);
        assert_eq!(cc.ewma_bw, 16_000_000 - 2_000_000 + 3_000_000);
    }

    #[test]
    fn interval_inflation_throttles_pacing_gain() {
        let mut cc = Cadence::new(Config::new());
        cc.min_rtt_us = 40_000;
        cc.pacing_gain = GAIN_UNIT;

        // 50% inflated interval: gain drops to (200 - 50) / 200 of unity.
        let sample = RateSample {
            interval_us: 80_000,
            ..Default::default()
        };
        cc.update_inflation_throttle(&sample);
        assert_eq!(cc.inflation_pct, 50);
        assert_eq!(cc.pacing_gain, GAIN_UNIT * 150 / 200);

        // A non-inflated sample clears the scaling but keeps the gain.
        let sample = RateSample {
            interval_us: 40_000,
            ..Default::default()
        };
        cc.update_inflation_throttle(&sample);
        assert_eq!(cc.inflation_pct, 0);
        assert_eq!(cc.pacing_gain, GAIN_UNIT * 150 / 200);
    }

    #[test]
    fn aperiodic_classification_falls_back() {
        let mut cc = Cadence::new(Config::new());
        let host = test_host();
        cc.su = 8000;

        cc.apply_classification(&host, Classification::Aperiodic);
        assert_eq!(cc.mode(), Mode::Fallback);
        assert_eq!(cc.scheduling_unit(), INITIAL_SCHEDULING_UNIT_US);
    }

    #[test]
    fn periodic_classification_enters_steady() {
        let mut cc = Cadence::new(Config::new());
        let host = test_host();

        cc.apply_classification(&host, Classification::Periodic(2500));
        assert_eq!(cc.mode(), Mode::Steady);
        assert_eq!(cc.scheduling_unit(), 2500);
        assert_eq!(cc.cwnd_est, host.cwnd * host.mss);

        // Re-detection in steady state only updates the period.
        cc.cwnd_est = 999_999;
        cc.apply_classification(&host, Classification::Periodic(5000));
        assert_eq!(cc.scheduling_unit(), 5000);
        assert_eq!(cc.cwnd_est, 999_999);
    }

    #[test]
    fn fallback_forces_unity_pacing_gain() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();
        cc.mode = Mode::Fallback;
        cc.pacing_gain = GAIN_UNIT / 2;

        feed_sample(&mut cc, &mut host, 5000, 50_000);
        assert_eq!(cc.pacing_gain, GAIN_UNIT);
    }

    #[test]
    fn forced_scheduling_unit_skips_detection() {
        let mut config = Config::new();
        config.set_scheduling_unit(8000);
        let mut cc = Cadence::new(config);
        let mut host = test_host();

        for _ in 0..20 {
            feed_sample(&mut cc, &mut host, 8000, 50_000);
        }
        assert_eq!(cc.scheduling_unit(), 8000);
        // Nothing was binned while the override is active.
        assert_eq!(cc.detector.sample_count(), 0);
    }

    #[test]
    fn loss_only_records_a_flag() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();

        feed_sample(&mut cc, &mut host, 5000, 50_000);
        let mode = cc.mode();
        let cwnd = host.cwnd;

        cc.on_state_change(CaState::Loss);
        assert!(cc.loss_seen);
        assert_eq!(cc.mode(), mode);
        assert_eq!(host.cwnd, cwnd);

        cc.on_state_change(CaState::Open);
        assert!(cc.loss_seen);
    }

    #[test]
    fn release_is_idempotent() {
        let mut cc = Cadence::new(Config::new());
        cc.on_release();
        cc.on_release();

        // Still usable after release.
        let mut host = test_host();
        let out = feed_sample(&mut cc, &mut host, 5000, 50_000);
        assert!(out.cwnd >= cc.minimal_window());
        cc.on_release();
    }

    #[test]
    fn window_respects_floor_and_clamp() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();
        host.cwnd = 1;
        host.cwnd_clamp = 6;

        let out = feed_sample(&mut cc, &mut host, 5000, 50_000);
        assert!(out.cwnd >= 4);
        assert!(out.cwnd <= 6);
    }

    #[test]
    fn converges_on_a_five_ms_schedule() {
        let mut cc = Cadence::new(Config::new());
        let mut host = test_host();

        // A 5 ms radio scheduler with jittered arrivals: gaps alternate
        // between 4.8 ms and 5.2 ms while delivery stays constant.
        let mut pacing_rates = Vec::new();
        for i in 0..300 {
            let gap = if i % 2 == 0 { 4800 } else { 5200 };
            let out = feed_sample(&mut cc, &mut host, gap, 50_000);
            pacing_rates.push(out.pacing_rate);
        }

        assert_eq!(cc.mode(), Mode::Steady);
        assert_eq!(cc.scheduling_unit(), 5000);

        // Once the trend stabilizes the pacing rate must not oscillate:
        // every rate of the last 50 samples stays within +/-10% of their
        // midpoint.
        let tail = &pacing_rates[250..];
        let max = *tail.iter().max().unwrap();
        let min = *tail.iter().min().unwrap();
        assert!(max > 0);
        assert!(max - min <= (max + min) / 2 / 10);

        // And the window holds steady at the estimate.
        assert_eq!(host.cwnd, cc.cwnd_est / host.mss);
    }
}
