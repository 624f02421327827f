//! Walk-file loader
//!
//! Parses `name_or_oid = TYPE: value` dumps (the format snmpwalk emits)
//! into MIB entries. Symbolic names are resolved through a built-in table;
//! malformed lines are logged and skipped rather than failing the load.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::mib::profile::{Behavior, MibEntry, Variance};
use crate::snmp::oid::Oid;
use crate::snmp::SnmpValue;
use crate::Result;

static RECORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\S+?)\s*=\s*([A-Za-z][A-Za-z0-9-]*):\s*(.*?)\s*$").expect("record regex")
});

// net-snmp prints empty strings as `name = ""` with no TYPE marker
static EMPTY_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(\S+?)\s*=\s*"(.*)"\s*$"#).expect("empty string regex"));

static TIMETICKS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((\d+)\)").expect("timeticks regex"));

static INTEGER_ENUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*\((-?\d+)\)$").expect("integer enum regex"));

/// Well-known symbolic names to OID prefixes (system group and the IF-MIB
/// interface table columns).
static NAME_TABLE: Lazy<HashMap<&'static str, Oid>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut add = |name: &'static str, oid: &str| {
        table.insert(name, oid.parse::<Oid>().expect("name table oid"));
    };
    add("sysDescr", "1.3.6.1.2.1.1.1");
    add("sysObjectID", "1.3.6.1.2.1.1.2");
    add("sysUpTime", "1.3.6.1.2.1.1.3");
    add("sysContact", "1.3.6.1.2.1.1.4");
    add("sysName", "1.3.6.1.2.1.1.5");
    add("sysLocation", "1.3.6.1.2.1.1.6");
    add("sysServices", "1.3.6.1.2.1.1.7");
    add("ifNumber", "1.3.6.1.2.1.2.1");
    add("ifIndex", "1.3.6.1.2.1.2.2.1.1");
    add("ifDescr", "1.3.6.1.2.1.2.2.1.2");
    add("ifType", "1.3.6.1.2.1.2.2.1.3");
    add("ifMtu", "1.3.6.1.2.1.2.2.1.4");
    add("ifSpeed", "1.3.6.1.2.1.2.2.1.5");
    add("ifPhysAddress", "1.3.6.1.2.1.2.2.1.6");
    add("ifAdminStatus", "1.3.6.1.2.1.2.2.1.7");
    add("ifOperStatus", "1.3.6.1.2.1.2.2.1.8");
    add("ifLastChange", "1.3.6.1.2.1.2.2.1.9");
    add("ifInOctets", "1.3.6.1.2.1.2.2.1.10");
    add("ifInUcastPkts", "1.3.6.1.2.1.2.2.1.11");
    add("ifInNUcastPkts", "1.3.6.1.2.1.2.2.1.12");
    add("ifInDiscards", "1.3.6.1.2.1.2.2.1.13");
    add("ifInErrors", "1.3.6.1.2.1.2.2.1.14");
    add("ifInUnknownProtos", "1.3.6.1.2.1.2.2.1.15");
    add("ifOutOctets", "1.3.6.1.2.1.2.2.1.16");
    add("ifOutUcastPkts", "1.3.6.1.2.1.2.2.1.17");
    add("ifOutNUcastPkts", "1.3.6.1.2.1.2.2.1.18");
    add("ifOutDiscards", "1.3.6.1.2.1.2.2.1.19");
    add("ifOutErrors", "1.3.6.1.2.1.2.2.1.20");
    table
});

/// Loads and parses a walk file. Only I/O failures are errors; bad lines
/// are skipped with a warning.
pub fn load_walk_file<P: AsRef<Path>>(path: P) -> Result<Vec<MibEntry>> {
    let contents = std::fs::read_to_string(&path)?;
    let entries = parse_walk(&contents);
    debug!(
        path = %path.as_ref().display(),
        entries = entries.len(),
        "loaded walk file"
    );
    Ok(entries)
}

/// Parses walk-file text into MIB entries with inferred behaviors.
pub fn parse_walk(contents: &str) -> Vec<MibEntry> {
    let mut entries = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Some((oid, value)) => {
                let behavior = infer_behavior(&oid, &value);
                entries.push(MibEntry::new(oid, value, behavior));
            }
            None => {
                warn!(line = line_no + 1, content = trimmed, "skipping malformed walk line");
            }
        }
    }
    entries
}

fn parse_line(line: &str) -> Option<(Oid, SnmpValue)> {
    if let Some(caps) = RECORD_RE.captures(line) {
        let oid = resolve_name(&caps[1])?;
        let value = parse_value(&caps[2], &caps[3])?;
        return Some((oid, value));
    }
    if let Some(caps) = EMPTY_STRING_RE.captures(line) {
        let oid = resolve_name(&caps[1])?;
        return Some((oid, SnmpValue::OctetString(caps[2].as_bytes().to_vec())));
    }
    None
}

/// Resolves `SNMPv2-MIB::sysDescr.0`, `sysDescr.0`, or a plain numeric
/// OID. Unknown symbolic names fall through to numeric parsing.
fn resolve_name(name: &str) -> Option<Oid> {
    let bare = name.rsplit("::").next().unwrap_or(name);

    let (base, suffix) = match bare.find('.') {
        Some(dot) if bare[..dot].chars().any(|c| c.is_ascii_alphabetic()) => {
            (&bare[..dot], Some(&bare[dot + 1..]))
        }
        _ => (bare, None),
    };

    if let Some(prefix) = NAME_TABLE.get(base) {
        return match suffix {
            Some(suffix) => {
                let tail: Oid = suffix.parse().ok()?;
                Some(prefix.extend(tail.components()))
            }
            None => Some(prefix.clone()),
        };
    }

    bare.parse().ok()
}

fn parse_value(type_name: &str, raw: &str) -> Option<SnmpValue> {
    match type_name {
        "STRING" => {
            let text = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(raw);
            Some(SnmpValue::OctetString(text.as_bytes().to_vec()))
        }
        "Hex-STRING" => {
            let cleaned: String = raw.split_whitespace().collect();
            hex::decode(cleaned).ok().map(SnmpValue::OctetString)
        }
        "INTEGER" => {
            if let Some(caps) = INTEGER_ENUM_RE.captures(raw) {
                return caps[1].parse().ok().map(SnmpValue::Integer);
            }
            raw.parse().ok().map(SnmpValue::Integer)
        }
        "Counter32" => raw.parse().ok().map(SnmpValue::Counter32),
        "Counter64" => raw.parse().ok().map(SnmpValue::Counter64),
        "Gauge32" | "Unsigned32" => raw.parse().ok().map(SnmpValue::Gauge32),
        "Timeticks" => {
            let caps = TIMETICKS_RE.captures(raw)?;
            caps[1].parse().ok().map(SnmpValue::TimeTicks)
        }
        "OID" => resolve_name(raw.strip_prefix('.').unwrap_or(raw)).map(SnmpValue::ObjectIdentifier),
        "IpAddress" | "Network" => Some(SnmpValue::OctetString(raw.as_bytes().to_vec())),
        _ => None,
    }
}

const IF_ENTRY: [u32; 9] = [1, 3, 6, 1, 2, 1, 2, 2, 1];
const DOCSIS_SNR: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 4, 1, 5];
const DOCSIS_DOWN_POWER: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 1, 1, 6];
const HR_PROCESSOR_LOAD: [u32; 11] = [1, 3, 6, 1, 2, 1, 25, 3, 3, 1, 2];
const IF_HC_ENTRY: [u32; 10] = [1, 3, 6, 1, 2, 1, 31, 1, 1, 1];

/// Assigns a simulation behavior from the OID's well-known prefix and the
/// loaded value type. Anything unrecognized stays static.
pub fn infer_behavior(oid: &Oid, value: &SnmpValue) -> Behavior {
    let comps = oid.components();

    // sysUpTime
    if comps.starts_with(&[1, 3, 6, 1, 2, 1, 1, 3]) && matches!(value, SnmpValue::TimeTicks(_)) {
        return Behavior::UptimeTicks;
    }

    if comps.starts_with(&IF_ENTRY) && comps.len() > IF_ENTRY.len() {
        let column = comps[IF_ENTRY.len()];
        match (column, value) {
            // ifInOctets / ifOutOctets
            (10 | 16, SnmpValue::Counter32(_) | SnmpValue::Counter64(_)) => {
                return Behavior::TrafficCounter {
                    rate_range: (50_000, 500_000),
                    variance: Variance::DeviceSpecific,
                    burst_probability: 0.10,
                };
            }
            // packet counters
            (11 | 12 | 17 | 18, SnmpValue::Counter32(_) | SnmpValue::Counter64(_)) => {
                return Behavior::TrafficCounter {
                    rate_range: (50, 5_000),
                    variance: Variance::Uniform,
                    burst_probability: 0.05,
                };
            }
            // errors and discards
            (13 | 14 | 15 | 19 | 20, SnmpValue::Counter32(_)) => {
                return Behavior::ErrorCounter { rate_range: (0, 5) };
            }
            // ifOperStatus
            (8, SnmpValue::Integer(_)) => {
                return Behavior::StatusEnum {
                    states: vec![(1, 0.97), (2, 0.03)],
                };
            }
            _ => {}
        }
    }

    // ifXTable high-capacity octet counters
    if comps.starts_with(&IF_HC_ENTRY) && comps.len() > IF_HC_ENTRY.len() {
        let column = comps[IF_HC_ENTRY.len()];
        if matches!(column, 6 | 10) && matches!(value, SnmpValue::Counter64(_)) {
            return Behavior::TrafficCounter {
                rate_range: (500_000, 10_000_000),
                variance: Variance::DeviceSpecific,
                burst_probability: 0.10,
            };
        }
    }

    if comps.starts_with(&DOCSIS_SNR) {
        if let SnmpValue::Integer(base) = value {
            return Behavior::SignalGauge {
                range: ((base - 100).max(0), base + 60),
                weather_sensitive: true,
            };
        }
    }

    if comps.starts_with(&DOCSIS_DOWN_POWER) {
        if let SnmpValue::Integer(base) = value {
            return Behavior::SignalGauge {
                range: (base - 40, base + 40),
                weather_sensitive: true,
            };
        }
    }

    if comps.starts_with(&HR_PROCESSOR_LOAD) && matches!(value, SnmpValue::Gauge32(_)) {
        return Behavior::CpuGauge;
    }

    Behavior::Static
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
# sample cable modem walk
SNMPv2-MIB::sysDescr.0 = STRING: "ARRIS SB6183 DOCSIS 3.0 Cable Modem"
SNMPv2-MIB::sysObjectID.0 = OID: .1.3.6.1.4.1.4115.900.2
sysUpTime.0 = Timeticks: (8640000) 1 day, 0:00:00.00
sysName.0 = STRING: cm-lab-1
ifNumber.0 = INTEGER: 2
IF-MIB::ifIndex.1 = INTEGER: 1
IF-MIB::ifDescr.1 = STRING: cable-modem0
IF-MIB::ifOperStatus.1 = INTEGER: up(1)
IF-MIB::ifPhysAddress.1 = Hex-STRING: 00 1A 2B 3C 4D 5E
IF-MIB::ifInOctets.1 = Counter32: 123456789
IF-MIB::ifInErrors.1 = Counter32: 12
IF-MIB::ifSpeed.1 = Gauge32: 1000000000
.1.3.6.1.2.1.10.127.1.1.4.1.5.3 = INTEGER: 300
this line is garbage
unknownName.0 = INTEGER: 5
ifDescr.2 = BITS: something unsupported
"#;

    #[test]
    fn test_parse_sample_walk() {
        let entries = parse_walk(SAMPLE);
        // garbage, unknown symbol, and unsupported type are skipped
        assert_eq!(entries.len(), 13);

        let by_oid: HashMap<String, &MibEntry> = entries
            .iter()
            .map(|e| (e.oid.to_string(), e))
            .collect();

        let sys_descr = by_oid["1.3.6.1.2.1.1.1.0"];
        assert_eq!(
            sys_descr.value,
            SnmpValue::OctetString(b"ARRIS SB6183 DOCSIS 3.0 Cable Modem".to_vec())
        );
        assert_eq!(sys_descr.behavior, Behavior::Static);

        let uptime = by_oid["1.3.6.1.2.1.1.3.0"];
        assert_eq!(uptime.value, SnmpValue::TimeTicks(8_640_000));
        assert_eq!(uptime.behavior, Behavior::UptimeTicks);

        let obj_id = by_oid["1.3.6.1.2.1.1.2.0"];
        assert_eq!(
            obj_id.value,
            SnmpValue::ObjectIdentifier("1.3.6.1.4.1.4115.900.2".parse().unwrap())
        );

        let phys = by_oid["1.3.6.1.2.1.2.2.1.6.1"];
        assert_eq!(
            phys.value,
            SnmpValue::OctetString(vec![0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E])
        );
    }

    #[test]
    fn test_behavior_inference() {
        let entries = parse_walk(SAMPLE);
        let by_oid: HashMap<String, &MibEntry> = entries
            .iter()
            .map(|e| (e.oid.to_string(), e))
            .collect();

        assert!(matches!(
            by_oid["1.3.6.1.2.1.2.2.1.10.1"].behavior,
            Behavior::TrafficCounter { .. }
        ));
        assert!(matches!(
            by_oid["1.3.6.1.2.1.2.2.1.14.1"].behavior,
            Behavior::ErrorCounter { .. }
        ));
        assert!(matches!(
            by_oid["1.3.6.1.2.1.2.2.1.8.1"].behavior,
            Behavior::StatusEnum { .. }
        ));
        assert!(matches!(
            by_oid["1.3.6.1.2.1.10.127.1.1.4.1.5.3"].behavior,
            Behavior::SignalGauge {
                weather_sensitive: true,
                ..
            }
        ));
        // ifSpeed has no recognized progression
        assert_eq!(by_oid["1.3.6.1.2.1.2.2.1.5.1"].behavior, Behavior::Static);
    }

    #[test]
    fn test_integer_enum_label() {
        let (oid, value) = parse_line("ifOperStatus.2 = INTEGER: down(2)").unwrap();
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.2.2.1.8.2");
        assert_eq!(value, SnmpValue::Integer(2));
    }

    #[test]
    fn test_empty_string_form() {
        let (oid, value) = parse_line(r#"sysLocation.0 = """#).unwrap();
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.6.0");
        assert_eq!(value, SnmpValue::OctetString(vec![]));
    }

    #[test]
    fn test_unknown_symbol_skipped_numeric_kept() {
        assert!(parse_line("mysteryObject.0 = INTEGER: 5").is_none());
        let (oid, _) = parse_line(".1.3.6.1.4.1.99.1.0 = INTEGER: 5").unwrap();
        assert_eq!(oid.to_string(), "1.3.6.1.4.1.99.1.0");
    }

    #[test]
    fn test_load_walk_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let entries = load_walk_file(file.path()).unwrap();
        assert_eq!(entries.len(), 13);
    }

    #[test]
    fn test_load_walk_file_missing_path() {
        assert!(load_walk_file("/nonexistent/walk.snmpwalk").is_err());
    }
}
