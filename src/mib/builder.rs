//! Built-in MIB profiles per device type
//!
//! Generates the system group, ifNumber, and the IF-MIB interface table,
//! plus DOCSIS signal gauges for cable gear and a CPU gauge for
//! infrastructure devices. Walk files override these when configured.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::DeviceType;
use crate::mib::profile::{Behavior, DeviceProfile, LoadPattern, MibEntry, Variance};
use crate::snmp::oid::Oid;
use crate::snmp::SnmpValue;
use crate::{Error, Result};

/// Static simulation characteristics of a built-in device type.
#[derive(Debug, Clone)]
pub struct DeviceCharacteristics {
    pub interface_count: u32,
    pub signal_monitoring: bool,
    pub has_cpu_gauge: bool,
    pub sys_descr: &'static str,
    pub sys_object_id: &'static str,
    pub if_prefix: &'static str,
    pub if_speed: u32,
    /// Octets/second range for interface traffic counters.
    pub traffic_rate: (u64, u64),
}

impl DeviceCharacteristics {
    pub fn for_type(device_type: &DeviceType) -> Result<Self> {
        let characteristics = match device_type {
            DeviceType::CableModem => Self {
                interface_count: 2,
                signal_monitoring: true,
                has_cpu_gauge: false,
                sys_descr: "ARRIS SB6183 DOCSIS 3.0 Cable Modem <<HW_REV: 5; VENDOR: ARRIS>>",
                sys_object_id: "1.3.6.1.4.1.4115.900.2",
                if_prefix: "cable-modem",
                if_speed: 1_000_000_000,
                traffic_rate: (5_000, 120_000),
            },
            DeviceType::Mta => Self {
                interface_count: 2,
                signal_monitoring: true,
                has_cpu_gauge: false,
                sys_descr: "ARRIS Touchstone TM822 Telephony Modem MTA",
                sys_object_id: "1.3.6.1.4.1.4115.820.1",
                if_prefix: "mta",
                if_speed: 100_000_000,
                traffic_rate: (1_000, 20_000),
            },
            DeviceType::Cmts => Self {
                interface_count: 24,
                signal_monitoring: true,
                has_cpu_gauge: true,
                sys_descr: "Cisco uBR10012 Universal Broadband Router CMTS",
                sys_object_id: "1.3.6.1.4.1.9.1.317",
                if_prefix: "cable",
                if_speed: u32::MAX, // ifSpeed saturates at 2^32-1 for 10G links
                traffic_rate: (1_000_000, 50_000_000),
            },
            DeviceType::Switch => Self {
                interface_count: 24,
                signal_monitoring: false,
                has_cpu_gauge: true,
                sys_descr: "24-Port Gigabit Managed Ethernet Switch",
                sys_object_id: "1.3.6.1.4.1.11.2.3.7.11.45",
                if_prefix: "ethernet",
                if_speed: 1_000_000_000,
                traffic_rate: (100_000, 5_000_000),
            },
            DeviceType::Router => Self {
                interface_count: 8,
                signal_monitoring: false,
                has_cpu_gauge: true,
                sys_descr: "Edge Services Router, IOS-style Software",
                sys_object_id: "1.3.6.1.4.1.9.1.122",
                if_prefix: "ge-0/0/",
                if_speed: 1_000_000_000,
                traffic_rate: (500_000, 20_000_000),
            },
            DeviceType::Server => Self {
                interface_count: 4,
                signal_monitoring: false,
                has_cpu_gauge: true,
                sys_descr: "Linux rack server 5.15.0 x86_64",
                sys_object_id: "1.3.6.1.4.1.8072.3.2.10",
                if_prefix: "eth",
                if_speed: 1_000_000_000,
                traffic_rate: (50_000, 2_000_000),
            },
            DeviceType::Printer => Self {
                interface_count: 2,
                signal_monitoring: false,
                has_cpu_gauge: false,
                sys_descr: "Network Laser Printer",
                sys_object_id: "1.3.6.1.4.1.11.2.3.9.1",
                if_prefix: "print",
                if_speed: 100_000_000,
                traffic_rate: (100, 5_000),
            },
            DeviceType::Custom(tag) => {
                return Err(Error::InvalidDeviceType(format!(
                    "{tag} has no built-in profile; configure a walk file"
                )))
            }
        };
        Ok(characteristics)
    }
}

/// Builds the built-in profile for a device type.
pub fn builtin_profile(device_type: &DeviceType) -> Result<DeviceProfile> {
    let ch = DeviceCharacteristics::for_type(device_type)?;
    let mut entries = Vec::new();

    let system: Oid = "1.3.6.1.2.1.1".parse()?;
    push_static(
        &mut entries,
        system.extend(&[1, 0]),
        SnmpValue::OctetString(ch.sys_descr.as_bytes().to_vec()),
    );
    push_static(
        &mut entries,
        system.extend(&[2, 0]),
        SnmpValue::ObjectIdentifier(ch.sys_object_id.parse()?),
    );
    entries.push(MibEntry::new(
        system.extend(&[3, 0]),
        SnmpValue::TimeTicks(0),
        Behavior::UptimeTicks,
    ));
    push_static(
        &mut entries,
        system.extend(&[4, 0]),
        SnmpValue::OctetString(b"ops@snmpsim.local".to_vec()),
    );
    push_static(
        &mut entries,
        system.extend(&[5, 0]),
        SnmpValue::OctetString(format!("{device_type}-sim").into_bytes()),
    );
    push_static(
        &mut entries,
        system.extend(&[6, 0]),
        SnmpValue::OctetString(b"Simulated Network".to_vec()),
    );
    push_static(
        &mut entries,
        system.extend(&[7, 0]),
        SnmpValue::Integer(72),
    );

    push_static(
        &mut entries,
        "1.3.6.1.2.1.2.1.0".parse()?,
        SnmpValue::Integer(ch.interface_count as i32),
    );

    let if_entry: Oid = "1.3.6.1.2.1.2.2.1".parse()?;
    for i in 1..=ch.interface_count {
        let column = |col: u32| if_entry.extend(&[col, i]);

        push_static(&mut entries, column(1), SnmpValue::Integer(i as i32));
        push_static(
            &mut entries,
            column(2),
            SnmpValue::OctetString(format!("{}{}", ch.if_prefix, i - 1).into_bytes()),
        );
        // docsCableMaclayer on the RF side of cable gear, ethernetCsmacd
        // everywhere else
        let if_type = if ch.signal_monitoring && i == 2 { 127 } else { 6 };
        push_static(&mut entries, column(3), SnmpValue::Integer(if_type));
        push_static(&mut entries, column(4), SnmpValue::Integer(1500));
        push_static(&mut entries, column(5), SnmpValue::Gauge32(ch.if_speed));
        push_static(
            &mut entries,
            column(6),
            SnmpValue::OctetString(phys_address(device_type, i)),
        );
        push_static(&mut entries, column(7), SnmpValue::Integer(1));
        entries.push(MibEntry::new(
            column(8),
            SnmpValue::Integer(1),
            Behavior::StatusEnum {
                states: vec![(1, 0.97), (2, 0.03)],
            },
        ));
        entries.push(MibEntry::new(
            column(10),
            SnmpValue::Counter32(1_000_000 + i * 10_000),
            Behavior::TrafficCounter {
                rate_range: ch.traffic_rate,
                variance: Variance::DeviceSpecific,
                burst_probability: 0.10,
            },
        ));
        entries.push(MibEntry::new(
            column(11),
            SnmpValue::Counter32(10_000 + i * 500),
            Behavior::TrafficCounter {
                rate_range: (ch.traffic_rate.0 / 100, ch.traffic_rate.1 / 100),
                variance: Variance::Uniform,
                burst_probability: 0.05,
            },
        ));
        entries.push(MibEntry::new(
            column(14),
            SnmpValue::Counter32(0),
            Behavior::ErrorCounter { rate_range: (0, 3) },
        ));
        entries.push(MibEntry::new(
            column(16),
            SnmpValue::Counter32(800_000 + i * 10_000),
            Behavior::TrafficCounter {
                rate_range: ch.traffic_rate,
                variance: Variance::DeviceSpecific,
                burst_probability: 0.10,
            },
        ));
        entries.push(MibEntry::new(
            column(17),
            SnmpValue::Counter32(8_000 + i * 500),
            Behavior::TrafficCounter {
                rate_range: (ch.traffic_rate.0 / 100, ch.traffic_rate.1 / 100),
                variance: Variance::Uniform,
                burst_probability: 0.05,
            },
        ));
        entries.push(MibEntry::new(
            column(20),
            SnmpValue::Counter32(0),
            Behavior::ErrorCounter { rate_range: (0, 3) },
        ));
    }

    if ch.signal_monitoring {
        // downstream SNR and power per RF interface, in tenths of a dB
        let snr: Oid = "1.3.6.1.2.1.10.127.1.1.4.1.5".parse()?;
        let power: Oid = "1.3.6.1.2.1.10.127.1.1.1.1.6".parse()?;
        for i in 1..=ch.interface_count.min(8) {
            entries.push(MibEntry::new(
                snr.append(i),
                SnmpValue::Integer(320),
                Behavior::SignalGauge {
                    range: (220, 400),
                    weather_sensitive: true,
                },
            ));
            entries.push(MibEntry::new(
                power.append(i),
                SnmpValue::Integer(25),
                Behavior::SignalGauge {
                    range: (-150, 150),
                    weather_sensitive: true,
                },
            ));
        }
    }

    if ch.has_cpu_gauge {
        entries.push(MibEntry::new(
            "1.3.6.1.2.1.25.3.3.1.2.1".parse()?,
            SnmpValue::Gauge32(25),
            Behavior::CpuGauge,
        ));
        entries.push(MibEntry::new(
            "1.3.6.1.2.1.25.3.3.1.2.2".parse()?,
            SnmpValue::Gauge32(20),
            Behavior::CpuGauge,
        ));
    }

    // a utilization gauge per device under the enterprise arc, driven by
    // the diurnal curve
    entries.push(MibEntry::new(
        "1.3.6.1.4.1.50216.1.1.0".parse()?,
        SnmpValue::Gauge32(35),
        Behavior::UtilizationGauge {
            range: (0, 100),
            pattern: if ch.has_cpu_gauge {
                LoadPattern::Flat
            } else {
                LoadPattern::Diurnal
            },
        },
    ));

    DeviceProfile::from_records(device_type.clone(), entries)
}

fn push_static(entries: &mut Vec<MibEntry>, oid: Oid, value: SnmpValue) {
    entries.push(MibEntry::new(oid, value, Behavior::Static));
}

/// Deterministic MAC address for an interface of a device type.
fn phys_address(device_type: &DeviceType, interface: u32) -> Vec<u8> {
    let mut hasher = DefaultHasher::new();
    device_type.to_string().hash(&mut hasher);
    interface.hash(&mut hasher);
    let h = hasher.finish();
    vec![
        0x02, // locally administered
        0x1A,
        (h >> 24) as u8,
        (h >> 16) as u8,
        (h >> 8) as u8,
        h as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mib::profile::EndOfMib;

    #[test]
    fn test_cable_modem_profile_contents() {
        let profile = builtin_profile(&DeviceType::CableModem).unwrap();

        let sys_descr = profile
            .get(&"1.3.6.1.2.1.1.1.0".parse().unwrap())
            .expect("sysDescr present");
        let SnmpValue::OctetString(descr) = &sys_descr.value else {
            panic!("sysDescr must be a string");
        };
        assert!(String::from_utf8_lossy(descr).contains("Cable Modem"));

        let if_descr = profile
            .get(&"1.3.6.1.2.1.2.2.1.2.1".parse().unwrap())
            .expect("ifDescr.1 present");
        assert_eq!(
            if_descr.value,
            SnmpValue::OctetString(b"cable-modem0".to_vec())
        );

        // signal monitoring on
        assert!(profile
            .get(&"1.3.6.1.2.1.10.127.1.1.4.1.5.1".parse().unwrap())
            .is_some());
    }

    #[test]
    fn test_ifindex_walk_reaches_ifdescr() {
        // GETNEXT from the last ifIndex instance lands on ifDescr.1
        let profile = builtin_profile(&DeviceType::CableModem).unwrap();
        let last_if_index: Oid = "1.3.6.1.2.1.2.2.1.1.2".parse().unwrap();
        let next = profile.get_next(&last_if_index).unwrap();
        assert_eq!(next.oid.to_string(), "1.3.6.1.2.1.2.2.1.2.1");
    }

    #[test]
    fn test_switch_has_many_interfaces_no_signal() {
        let profile = builtin_profile(&DeviceType::Switch).unwrap();
        let if_number = profile
            .get(&"1.3.6.1.2.1.2.1.0".parse().unwrap())
            .unwrap();
        assert_eq!(if_number.value, SnmpValue::Integer(24));
        assert!(profile
            .get(&"1.3.6.1.2.1.10.127.1.1.4.1.5.1".parse().unwrap())
            .is_none());
        // infrastructure devices expose CPU load
        assert!(profile
            .get(&"1.3.6.1.2.1.25.3.3.1.2.1".parse().unwrap())
            .is_some());
    }

    #[test]
    fn test_all_builtin_types_build_and_walk() {
        for device_type in [
            DeviceType::CableModem,
            DeviceType::Mta,
            DeviceType::Cmts,
            DeviceType::Switch,
            DeviceType::Router,
            DeviceType::Server,
            DeviceType::Printer,
        ] {
            let profile = builtin_profile(&device_type).unwrap();
            assert!(profile.len() > 10, "{device_type} too small");

            // every profile walks cleanly end to end
            let mut cursor: Oid = "0.0".parse().unwrap();
            let mut steps = 0;
            loop {
                match profile.get_next(&cursor) {
                    Ok(entry) => {
                        cursor = entry.oid.clone();
                        steps += 1;
                        assert!(steps <= profile.len());
                    }
                    Err(EndOfMib) => break,
                }
            }
            assert_eq!(steps, profile.len());
        }
    }

    #[test]
    fn test_custom_type_requires_walk_file() {
        let err = builtin_profile(&DeviceType::Custom("lab-sensor".to_string())).unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceType(_)));
    }

    #[test]
    fn test_phys_addresses_distinct_per_interface() {
        let a = phys_address(&DeviceType::Switch, 1);
        let b = phys_address(&DeviceType::Switch, 2);
        assert_ne!(a, b);
        assert_eq!(a.len(), 6);
        assert_eq!(a, phys_address(&DeviceType::Switch, 1));
    }
}
