//! Configuration management for the SNMP fleet simulator

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub pool: PoolConfig,
    pub agent: AgentConfig,
    pub devices: DevicesConfig,
    pub correlation: CorrelationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub node_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub bind_address: String,
    /// Ports bound per warmup batch during startup.
    pub warmup_batch_size: usize,
    pub recv_buffer_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_devices: usize,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_devices: 10_000,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub community: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            community: "public".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

/// Simulated device categories.
///
/// The built-in tags carry default MIB profiles and simulation
/// characteristics; `Custom` tags rely on a loaded walk file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceType {
    CableModem,
    Mta,
    Cmts,
    Switch,
    Router,
    Server,
    Printer,
    Custom(String),
}

impl DeviceType {
    /// Residential device types see weekend traffic rise; enterprise types
    /// see it dip.
    pub fn is_residential(&self) -> bool {
        matches!(self, Self::CableModem | Self::Mta | Self::Printer)
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim();
        if tag.is_empty() {
            return Err(Error::InvalidDeviceType("empty device type tag".into()));
        }
        Ok(match tag {
            "cable_modem" => Self::CableModem,
            "mta" => Self::Mta,
            "cmts" => Self::Cmts,
            "switch" => Self::Switch,
            "router" => Self::Router,
            "server" => Self::Server,
            "printer" => Self::Printer,
            other => {
                if !other
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(Error::InvalidDeviceType(other.to_string()));
                }
                Self::Custom(other.to_string())
            }
        })
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CableModem => write!(f, "cable_modem"),
            Self::Mta => write!(f, "mta"),
            Self::Cmts => write!(f, "cmts"),
            Self::Switch => write!(f, "switch"),
            Self::Router => write!(f, "router"),
            Self::Server => write!(f, "server"),
            Self::Printer => write!(f, "printer"),
            Self::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An inclusive UDP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            (self.max - self.min) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        self.min..=self.max
    }
}

/// Binds a device type to a port range; every port in the range simulates
/// one device of that type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    pub device_type: DeviceType,
    pub range: PortRange,
}

/// Predefined fleet compositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMix {
    #[serde(rename = "small_test")]
    SmallTest,
    #[serde(rename = "medium_test")]
    MediumTest,
    #[serde(rename = "cable_network")]
    CableNetwork,
    #[serde(rename = "enterprise_network")]
    EnterpriseNetwork,
}

impl DeviceMix {
    /// Composition ratios; each mix sums to 1.0.
    pub fn ratios(&self) -> Vec<(DeviceType, f64)> {
        match self {
            Self::SmallTest => vec![
                (DeviceType::CableModem, 0.80),
                (DeviceType::Switch, 0.10),
                (DeviceType::Router, 0.10),
            ],
            Self::MediumTest => vec![
                (DeviceType::CableModem, 0.85),
                (DeviceType::Switch, 0.10),
                (DeviceType::Router, 0.05),
            ],
            Self::CableNetwork => vec![
                (DeviceType::CableModem, 0.79),
                (DeviceType::Mta, 0.20),
                (DeviceType::Cmts, 0.01),
            ],
            Self::EnterpriseNetwork => vec![
                (DeviceType::Switch, 0.55),
                (DeviceType::Router, 0.35),
                (DeviceType::Server, 0.10),
            ],
        }
    }

    /// Expands the mix into contiguous per-type port ranges starting at
    /// `base_port`. Every listed type gets at least one device.
    pub fn expand(&self, base_port: u16, device_count: usize) -> Result<Vec<PortAssignment>> {
        if device_count == 0 {
            return Err(Error::parse("device_count must be at least 1"));
        }
        let available = usize::from(u16::MAX) - usize::from(base_port) + 1;
        if device_count > available {
            return Err(Error::InsufficientPorts {
                required: device_count,
                available,
            });
        }

        let ratios = self.ratios();
        let mut counts: Vec<usize> = ratios
            .iter()
            .map(|(_, ratio)| ((device_count as f64) * ratio).round().max(1.0) as usize)
            .collect();
        // rounding drift lands on the dominant type
        let total: usize = counts.iter().sum();
        if total > device_count {
            let overshoot = total - device_count;
            if counts[0] <= overshoot {
                return Err(Error::InsufficientPorts {
                    required: total,
                    available: device_count,
                });
            }
            counts[0] -= overshoot;
        } else {
            counts[0] += device_count - total;
        }

        let mut assignments = Vec::with_capacity(ratios.len());
        let mut next_port = u32::from(base_port);
        for ((device_type, _), count) in ratios.into_iter().zip(counts) {
            let min = next_port as u16;
            let max = (next_port + count as u32 - 1) as u16;
            assignments.push(PortAssignment {
                device_type,
                range: PortRange::new(min, max),
            });
            next_port += count as u32;
        }
        Ok(assignments)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Predefined mix; ignored when explicit `assignments` are given.
    pub mix: Option<DeviceMix>,
    pub base_port: u16,
    pub device_count: usize,
    pub assignments: Vec<PortAssignment>,
    /// Walk files to load per device type instead of the built-in profile.
    pub walk_files: Vec<WalkFileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkFileConfig {
    pub device_type: DeviceType,
    pub path: String,
}

impl DevicesConfig {
    /// Resolves explicit assignments or expands the configured mix.
    pub fn resolved_assignments(&self) -> Result<Vec<PortAssignment>> {
        if !self.assignments.is_empty() {
            return Ok(self.assignments.clone());
        }
        let mix = self.mix.unwrap_or(DeviceMix::SmallTest);
        mix.expand(self.base_port, self.device_count)
    }
}

/// One cross-metric correlation rule: a change to `source` nudges `target`
/// by `sensitivity` times the relative change, with `noise` jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRuleConfig {
    pub source: String,
    pub target: String,
    pub sensitivity: f64,
    pub noise: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub rules: Vec<CorrelationRuleConfig>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                CorrelationRuleConfig {
                    source: "temperature".to_string(),
                    target: "signal_quality".to_string(),
                    sensitivity: -0.3,
                    noise: 0.02,
                },
                CorrelationRuleConfig {
                    source: "cpu_usage".to_string(),
                    target: "power_consumption".to_string(),
                    sensitivity: 0.4,
                    noise: 0.02,
                },
                CorrelationRuleConfig {
                    source: "interface_utilization".to_string(),
                    target: "error_rate".to_string(),
                    sensitivity: 0.2,
                    noise: 0.02,
                },
                CorrelationRuleConfig {
                    source: "interface_utilization".to_string(),
                    target: "cpu_usage".to_string(),
                    sensitivity: 0.25,
                    noise: 0.02,
                },
            ],
        }
    }
}

impl SimulatorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimulatorConfig = toml::from_str(&contents)
            .map_err(|e| Error::parse(format!("Invalid TOML: {e}")))?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("SNMPSIM").separator("_"))
            .build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.community.is_empty() {
            return Err(Error::parse("community string must not be empty"));
        }
        if self.pool.max_devices == 0 {
            return Err(Error::parse("pool.max_devices must be at least 1"));
        }
        if self.pool.sweep_interval_secs == 0 || self.pool.idle_timeout_secs == 0 {
            return Err(Error::parse("pool sweep interval and idle timeout must be nonzero"));
        }
        if self.network.warmup_batch_size == 0 {
            return Err(Error::parse("network.warmup_batch_size must be at least 1"));
        }

        let assignments = self.devices.resolved_assignments()?;
        if assignments.is_empty() {
            return Err(Error::parse("no device port assignments configured"));
        }
        for assignment in &assignments {
            if assignment.range.is_empty() {
                return Err(Error::parse(format!(
                    "empty port range for {}",
                    assignment.device_type
                )));
            }
        }
        for (i, a) in assignments.iter().enumerate() {
            for b in &assignments[i + 1..] {
                if a.range.overlaps(&b.range) {
                    return Err(Error::parse(format!(
                        "overlapping port ranges: {} {}..{} and {} {}..{}",
                        a.device_type,
                        a.range.min,
                        a.range.max,
                        b.device_type,
                        b.range.min,
                        b.range.max,
                    )));
                }
            }
        }

        let mut seen = HashMap::new();
        for walk in &self.devices.walk_files {
            if seen
                .insert(walk.device_type.clone(), &walk.path)
                .is_some()
            {
                return Err(Error::parse(format!(
                    "duplicate walk file for {}",
                    walk.device_type
                )));
            }
        }

        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig {
                node_id: "snmpsim-1".to_string(),
                description: "SNMP device fleet simulator".to_string(),
            },
            network: NetworkConfig {
                bind_address: "0.0.0.0".to_string(),
                warmup_batch_size: 100,
                recv_buffer_size: None,
            },
            pool: PoolConfig::default(),
            agent: AgentConfig::default(),
            devices: DevicesConfig {
                mix: Some(DeviceMix::SmallTest),
                base_port: 30_000,
                device_count: 50,
                assignments: vec![],
                walk_files: vec![],
            },
            correlation: CorrelationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
                format: LogFormat::Compact,
            },
        }
    }
}
