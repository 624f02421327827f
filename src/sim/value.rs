//! Value simulation: derives live varbind values from profile entries
//!
//! Every simulated value is a pure function of
//! `(device seed, oid, boot time, now)` plus the device's correlated
//! metrics. Counters integrate the time-of-day curve instead of
//! accumulating in mutable state, so missed polls never desync them.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DeviceType;
use crate::mib::{Behavior, LoadPattern, MibEntry, Variance};
use crate::sim::correlation::MetricName;
use crate::sim::patterns;
use crate::snmp::SnmpValue;

const COUNTER32_MODULUS: u64 = 1 << 32;

/// The slice of device state the simulator reads.
#[derive(Debug)]
pub struct SimContext<'a> {
    pub device_type: &'a DeviceType,
    pub device_seed: u64,
    pub boot_time: DateTime<Utc>,
    pub metrics: &'a HashMap<MetricName, f64>,
}

/// Stateless value simulator, shared by all agents.
#[derive(Debug, Default)]
pub struct ValueSimulator;

impl ValueSimulator {
    pub fn new() -> Self {
        Self
    }

    /// Produces the live value for one profile entry.
    pub fn simulate(&self, entry: &MibEntry, ctx: &SimContext<'_>, now: DateTime<Utc>) -> SnmpValue {
        match &entry.behavior {
            Behavior::Static => entry.value.clone(),
            Behavior::UptimeTicks => SnmpValue::TimeTicks(uptime_ticks(ctx.boot_time, now)),
            Behavior::TrafficCounter {
                rate_range,
                variance,
                burst_probability,
            } => self.traffic_counter(entry, ctx, now, *rate_range, variance, *burst_probability),
            Behavior::ErrorCounter { rate_range } => self.error_counter(entry, ctx, now, *rate_range),
            Behavior::UtilizationGauge { range, pattern } => {
                self.utilization_gauge(entry, ctx, now, *range, *pattern)
            }
            Behavior::SignalGauge {
                range,
                weather_sensitive,
            } => self.signal_gauge(entry, ctx, now, *range, *weather_sensitive),
            Behavior::CpuGauge => self.cpu_gauge(entry, ctx, now),
            Behavior::StatusEnum { states } => self.status_enum(entry, ctx, now, states),
        }
    }

    fn traffic_counter(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        (lo, hi): (u64, u64),
        variance: &Variance,
        burst_probability: f64,
    ) -> SnmpValue {
        let rate = self.sample_rate(entry, ctx, lo, hi, variance);
        let burst = self.burst_factor(entry, ctx, now, burst_probability);
        let weighted = patterns::weighted_traffic_seconds(ctx.boot_time, now, ctx.device_type);
        let delta = (weighted * rate * burst) as u64;
        self.wrapped_counter(entry, ctx, delta)
    }

    fn error_counter(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        (lo, hi): (u64, u64),
    ) -> SnmpValue {
        let base_rate = self.sample_rate(entry, ctx, lo, hi, &Variance::Uniform);

        // busier interfaces and weaker signal both produce more errors
        let utilization = ctx
            .metrics
            .get(&MetricName::InterfaceUtilization)
            .copied()
            .unwrap_or(30.0);
        let signal = ctx
            .metrics
            .get(&MetricName::SignalQuality)
            .copied()
            .unwrap_or(80.0);
        let utilization_scale = 0.5 + utilization / 100.0;
        let signal_scale = 1.5 - signal / 100.0;

        let weighted = patterns::weighted_traffic_seconds(ctx.boot_time, now, ctx.device_type);
        let delta = (weighted * base_rate * utilization_scale * signal_scale) as u64;
        self.wrapped_counter(entry, ctx, delta)
    }

    fn wrapped_counter(&self, entry: &MibEntry, ctx: &SimContext<'_>, delta: u64) -> SnmpValue {
        match entry.value {
            SnmpValue::Counter64(base) => SnmpValue::Counter64(base.wrapping_add(delta)),
            SnmpValue::Counter32(base) => {
                let total = u64::from(base) + delta;
                let wraps = total / COUNTER32_MODULUS;
                let mut value = total % COUNTER32_MODULUS;
                if wraps > 0 {
                    // small post-wrap jitter, stable per device and oid
                    value = (value + self.seed_for(entry, ctx) % 251) % COUNTER32_MODULUS;
                }
                SnmpValue::Counter32(value as u32)
            }
            // load-time validation keeps counter behaviors on counter types
            _ => entry.value.clone(),
        }
    }

    fn utilization_gauge(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        (lo, hi): (u32, u32),
        pattern: LoadPattern,
    ) -> SnmpValue {
        let center = f64::from(base_u32(&entry.value));
        let mut factor = patterns::daily_factor(now) * patterns::weekly_factor(now, ctx.device_type);
        if pattern == LoadPattern::Flat {
            factor = 1.0 + (factor - 1.0) * 0.2;
        }
        let jitter = self.bucket_jitter(entry, ctx, now, 0.05);
        let value = (center * factor * jitter).clamp(f64::from(lo), f64::from(hi));
        SnmpValue::Gauge32(value as u32)
    }

    fn signal_gauge(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        (lo, hi): (i32, i32),
        weather_sensitive: bool,
    ) -> SnmpValue {
        let center = match entry.value {
            SnmpValue::Integer(v) => f64::from(v),
            SnmpValue::Gauge32(v) => f64::from(v),
            _ => 0.0,
        };
        let weather = if weather_sensitive {
            patterns::weather_variation(now, ctx.device_seed)
        } else {
            1.0
        };
        let jitter = self.bucket_jitter(entry, ctx, now, 0.03);
        let value = (center * weather * jitter).clamp(f64::from(lo), f64::from(hi));
        match entry.value {
            SnmpValue::Gauge32(_) => SnmpValue::Gauge32(value.max(0.0) as u32),
            _ => SnmpValue::Integer(value as i32),
        }
    }

    fn cpu_gauge(&self, entry: &MibEntry, ctx: &SimContext<'_>, now: DateTime<Utc>) -> SnmpValue {
        let base = f64::from(base_u32(&entry.value));
        let time_factor =
            patterns::daily_factor(now) * patterns::weekly_factor(now, ctx.device_type);
        let traffic_load = ctx
            .metrics
            .get(&MetricName::InterfaceUtilization)
            .copied()
            .unwrap_or(20.0);
        let jitter = self.bucket_jitter(entry, ctx, now, 0.08);
        let value = (base * time_factor * jitter + traffic_load * 0.3).clamp(0.0, 100.0);
        SnmpValue::Gauge32(value as u32)
    }

    fn status_enum(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        states: &[(i32, f64)],
    ) -> SnmpValue {
        if states.is_empty() {
            return entry.value.clone();
        }
        let mut rng = self.bucket_rng(entry, ctx, now);
        let total: f64 = states.iter().map(|(_, w)| w).sum();
        let mut roll = rng.gen::<f64>() * total;
        for (value, weight) in states {
            if roll < *weight {
                return SnmpValue::Integer(*value);
            }
            roll -= weight;
        }
        SnmpValue::Integer(states[states.len() - 1].0)
    }

    fn sample_rate(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        lo: u64,
        hi: u64,
        variance: &Variance,
    ) -> f64 {
        let span = (hi.max(lo) - lo) as f64;
        match variance {
            Variance::Uniform => {
                let mut rng = StdRng::seed_from_u64(self.seed_for(entry, ctx));
                lo as f64 + rng.gen::<f64>() * span
            }
            Variance::Gaussian { sigma } => {
                let mut rng = StdRng::seed_from_u64(self.seed_for(entry, ctx));
                let mean = (lo + hi) as f64 / 2.0;
                let sample = mean + gaussian(&mut rng) * sigma * span;
                sample.clamp(lo as f64, hi as f64)
            }
            Variance::DeviceSpecific => {
                // one rate per device, shared by all of its counters
                let mut rng = StdRng::seed_from_u64(ctx.device_seed);
                lo as f64 + rng.gen::<f64>() * span
            }
        }
    }

    fn burst_factor(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        burst_probability: f64,
    ) -> f64 {
        if burst_probability <= 0.0 {
            return 1.0;
        }
        let bucket = now.timestamp().div_euclid(300) as u64;
        let mut rng = StdRng::seed_from_u64(
            self.seed_for(entry, ctx) ^ bucket.wrapping_mul(0xD6E8_FEB8_6659_FD93),
        );
        if rng.gen::<f64>() < burst_probability {
            2.5
        } else {
            1.0
        }
    }

    /// Deterministic jitter factor that is stable within a one-minute
    /// bucket, so identical requests in the same bucket see identical
    /// values.
    fn bucket_jitter(
        &self,
        entry: &MibEntry,
        ctx: &SimContext<'_>,
        now: DateTime<Utc>,
        amplitude: f64,
    ) -> f64 {
        let mut rng = self.bucket_rng(entry, ctx, now);
        1.0 + amplitude * (rng.gen::<f64>() * 2.0 - 1.0)
    }

    fn bucket_rng(&self, entry: &MibEntry, ctx: &SimContext<'_>, now: DateTime<Utc>) -> StdRng {
        let bucket = now.timestamp().div_euclid(60) as u64;
        StdRng::seed_from_u64(self.seed_for(entry, ctx) ^ bucket.wrapping_mul(0x2545_F491_4F6C_DD1D))
    }

    fn seed_for(&self, entry: &MibEntry, ctx: &SimContext<'_>) -> u64 {
        let mut hasher = DefaultHasher::new();
        ctx.device_seed.hash(&mut hasher);
        entry.oid.components().hash(&mut hasher);
        hasher.finish()
    }
}

/// Uptime in hundredths of a second, wrapping at 2³².
pub fn uptime_ticks(boot_time: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    if now <= boot_time {
        return 0;
    }
    let centis = (now - boot_time).num_milliseconds() / 10;
    (centis as u64 % COUNTER32_MODULUS) as u32
}

/// Stable seed for a device identity string.
pub fn device_seed(device_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    device_id.hash(&mut hasher);
    hasher.finish()
}

fn base_u32(value: &SnmpValue) -> u32 {
    match value {
        SnmpValue::Gauge32(v) | SnmpValue::Counter32(v) | SnmpValue::TimeTicks(v) => *v,
        SnmpValue::Integer(v) => (*v).max(0) as u32,
        _ => 0,
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
