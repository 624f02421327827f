//! Cross-metric correlation engine
//!
//! A change to one device metric nudges its correlated metrics through a
//! rule table. Rules do not cascade: only direct targets of the changed
//! metric move, which keeps the update loop-free.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::config::CorrelationConfig;
use crate::{Error, Result};

/// Device metrics that participate in correlations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    Temperature,
    SignalQuality,
    CpuUsage,
    PowerConsumption,
    InterfaceUtilization,
    ErrorRate,
}

impl MetricName {
    /// Natural value range a metric is clamped to.
    pub fn natural_range(&self) -> (f64, f64) {
        match self {
            Self::Temperature => (-10.0, 60.0),
            Self::SignalQuality => (0.0, 100.0),
            Self::CpuUsage => (0.0, 100.0),
            Self::PowerConsumption => (0.0, 500.0),
            Self::InterfaceUtilization => (0.0, 100.0),
            Self::ErrorRate => (0.0, 100.0),
        }
    }

    pub fn midpoint(&self) -> f64 {
        let (lo, hi) = self.natural_range();
        (lo + hi) / 2.0
    }
}

impl FromStr for MetricName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "signal_quality" => Ok(Self::SignalQuality),
            "cpu_usage" => Ok(Self::CpuUsage),
            "power_consumption" => Ok(Self::PowerConsumption),
            "interface_utilization" => Ok(Self::InterfaceUtilization),
            "error_rate" => Ok(Self::ErrorRate),
            other => Err(Error::parse(format!("unknown metric name: {other}"))),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Temperature => "temperature",
            Self::SignalQuality => "signal_quality",
            Self::CpuUsage => "cpu_usage",
            Self::PowerConsumption => "power_consumption",
            Self::InterfaceUtilization => "interface_utilization",
            Self::ErrorRate => "error_rate",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationRule {
    pub source: MetricName,
    pub target: MetricName,
    /// Fraction of the target's range moved per full-range change of the
    /// source. Negative values are inverse correlations.
    pub sensitivity: f64,
    /// Relative jitter applied to each nudge.
    pub noise: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    rules: Vec<CorrelationRule>,
}

impl CorrelationEngine {
    pub fn new(rules: Vec<CorrelationRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &CorrelationConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            rules.push(CorrelationRule {
                source: rule.source.parse()?,
                target: rule.target.parse()?,
                sensitivity: rule.sensitivity,
                noise: rule.noise.abs(),
            });
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[CorrelationRule] {
        &self.rules
    }

    /// Records `new_value` for `changed` and nudges every direct target.
    /// All values are clamped to their natural ranges.
    pub fn apply(
        &self,
        changed: MetricName,
        new_value: f64,
        metrics: &mut HashMap<MetricName, f64>,
        rng: &mut impl Rng,
    ) {
        let (lo, hi) = changed.natural_range();
        let new_value = new_value.clamp(lo, hi);
        let old_value = metrics.insert(changed, new_value).unwrap_or(new_value);

        let source_span = hi - lo;
        let delta = (new_value - old_value) / source_span;
        if delta == 0.0 {
            return;
        }

        for rule in self.rules.iter().filter(|r| r.source == changed) {
            let (t_lo, t_hi) = rule.target.natural_range();
            let t_span = t_hi - t_lo;
            let jitter = 1.0 + rule.noise * (rng.gen::<f64>() * 2.0 - 1.0);
            let current = metrics
                .get(&rule.target)
                .copied()
                .unwrap_or_else(|| rule.target.midpoint());
            let updated = (current + rule.sensitivity * delta * t_span * jitter).clamp(t_lo, t_hi);
            metrics.insert(rule.target, updated);
        }
    }
}
