//! Error handling for the SNMP fleet simulator

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("BER encoding error: {0}")]
    Encoding(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid OID: {0}")]
    InvalidOid(String),

    #[error("Invalid device type: {0}")]
    InvalidDeviceType(String),

    #[error("No profile loaded for device type: {0}")]
    ProfileNotLoaded(String),

    #[error("Port {0} is outside all configured port ranges")]
    UnknownPortRange(u16),

    #[error("Device pool is at capacity ({0} devices)")]
    PoolAtCapacity(usize),

    #[error("Failed to bind UDP port {port}: {reason}")]
    PortBindFailed { port: u16, reason: String },

    #[error("Insufficient ports: required {required}, available {available}")]
    InsufficientPorts { required: usize, available: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_oid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOid(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
