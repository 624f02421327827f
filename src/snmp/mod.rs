//! SNMP wire layer: OIDs, message model, BER codec, request pipeline

pub mod ber;
pub mod message;
pub mod oid;
pub mod pipeline;

pub use message::{ErrorStatus, PduType, SnmpMessage, SnmpPdu, SnmpValue, SnmpVersion, VarBind};
pub use oid::Oid;
