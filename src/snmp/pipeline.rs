//! Request pipeline: decoded request in, response out
//!
//! Applies the v1/v2c semantics on top of a device agent: per-varbind
//! exceptions for v2c, error-status conversion for v1, and the GETBULK
//! non-repeater/repeater interleave with response-size truncation.

use std::time::Duration;

use crate::device::agent::DeviceAgent;
use crate::snmp::ber::encoded_varbind_len;
use crate::snmp::message::{ErrorStatus, PduType, SnmpMessage, SnmpPdu, SnmpVersion, VarBind};
use crate::snmp::oid::Oid;
use crate::snmp::SnmpValue;

/// Hard UDP payload cap.
pub const MAX_UDP_DATAGRAM: usize = 65_507;

/// Soft response cap used for GETBULK truncation, sized to stay under a
/// typical MTU.
pub const MAX_RESPONSE_OCTETS: usize = 1400;

/// Upper clamp for `max_repetitions`. The protocol allows arbitrary
/// values; everything above this is treated as exactly this.
pub const POOL_MAX_REPS: i64 = 100;

/// A request that has not produced a response within this window is
/// dropped without replying.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Message framing bytes around the varbind list: outer sequence, version,
/// community, PDU header, request-id, error fields, list header.
fn header_overhead(community_len: usize) -> usize {
    32 + community_len
}

/// Converts a decoded request into a response message. Community checking
/// happens at the UDP layer; by this point the request is authenticated.
pub async fn process(agent: &DeviceAgent, request: &SnmpMessage) -> SnmpMessage {
    let version = request.version;
    let pdu = &request.pdu;

    if pdu.varbinds.is_empty() {
        return error_reply(request, ErrorStatus::GenErr, 0);
    }

    match (version, pdu.pdu_type) {
        (_, PduType::GetResponse) => error_reply(request, ErrorStatus::GenErr, 0),
        (SnmpVersion::V1, PduType::GetBulkRequest) => {
            // v1 has no GETBULK; the original responds rather than drops
            error_reply(request, ErrorStatus::GenErr, 0)
        }
        (_, PduType::GetRequest) => handle_get(agent, request).await,
        (_, PduType::GetNextRequest) => handle_get_next(agent, request).await,
        (SnmpVersion::V2c, PduType::GetBulkRequest) => handle_get_bulk(agent, request).await,
    }
}

async fn handle_get(agent: &DeviceAgent, request: &SnmpMessage) -> SnmpMessage {
    let mut results = Vec::with_capacity(request.pdu.varbinds.len());
    for vb in &request.pdu.varbinds {
        results.push(agent.get(&vb.oid).await);
    }
    finish_read(request, results)
}

async fn handle_get_next(agent: &DeviceAgent, request: &SnmpMessage) -> SnmpMessage {
    let mut results = Vec::with_capacity(request.pdu.varbinds.len());
    for vb in &request.pdu.varbinds {
        results.push(agent.get_next(&vb.oid).await);
    }
    finish_read(request, results)
}

/// Shared GET/GETNEXT tail: v2c carries exceptions inline, v1 converts the
/// first exception into `noSuchName` with a 1-based error index and echoes
/// the request varbinds.
fn finish_read(request: &SnmpMessage, results: Vec<VarBind>) -> SnmpMessage {
    if request.version == SnmpVersion::V1 {
        if let Some(position) = results.iter().position(|vb| vb.value.is_exception()) {
            return error_reply(request, ErrorStatus::NoSuchName, position as i64 + 1);
        }
    }
    reply(request, results)
}

async fn handle_get_bulk(agent: &DeviceAgent, request: &SnmpMessage) -> SnmpMessage {
    let varbinds = &request.pdu.varbinds;
    let non_repeaters = request.pdu.non_repeaters().max(0) as usize;
    let n = non_repeaters.min(varbinds.len());
    let max_repetitions = request.pdu.max_repetitions().clamp(0, POOL_MAX_REPS) as usize;

    let budget = MAX_RESPONSE_OCTETS.saturating_sub(header_overhead(request.community.len()));
    let mut used = 0usize;
    let mut results: Vec<VarBind> = Vec::new();
    let mut truncated = false;

    let mut push_within_budget = |results: &mut Vec<VarBind>, vb: VarBind| -> bool {
        let len = encoded_varbind_len(&vb);
        if used + len > budget {
            return false;
        }
        used += len;
        results.push(vb);
        true
    };

    // non-repeater section: one GETNEXT each
    for vb in &varbinds[..n] {
        let result = agent.get_next(&vb.oid).await;
        if !push_within_budget(&mut results, result) {
            truncated = true;
            break;
        }
    }

    // repeater section
    let repeater_count = varbinds.len() - n;
    if !truncated && repeater_count == 1 {
        // a single repeater walks a contiguous run of the profile, so one
        // agent slice call replaces the per-iteration stepping
        let start = varbinds[n].oid.clone();
        let slice = agent.get_bulk_slice(&start, max_repetitions).await;
        let walked = slice.len();
        let mut cursor = start;
        for vb in slice {
            cursor = vb.oid.clone();
            if !push_within_budget(&mut results, vb) {
                truncated = true;
                break;
            }
        }
        if !truncated && walked < max_repetitions {
            let end = VarBind::new(cursor, SnmpValue::EndOfMibView);
            if !push_within_budget(&mut results, end) {
                truncated = true;
            }
        }
    } else if !truncated && repeater_count > 1 {
        // multiple repeaters interleave per iteration, feeding each
        // repeater the OID it returned in the previous iteration; an
        // exhausted repeater keeps repeating its EndOfMibView, which a
        // contiguous slice per repeater cannot express
        let mut cursors: Vec<Oid> = varbinds[n..].iter().map(|vb| vb.oid.clone()).collect();
        let mut finished: Vec<Option<VarBind>> = vec![None; cursors.len()];

        'bulk: for _ in 0..max_repetitions {
            if finished.iter().all(Option::is_some) {
                break;
            }
            for (slot, cursor) in cursors.iter_mut().enumerate() {
                let result = match &finished[slot] {
                    Some(end) => end.clone(),
                    None => {
                        let vb = agent.get_next(cursor).await;
                        if vb.value == SnmpValue::EndOfMibView {
                            finished[slot] = Some(vb.clone());
                        } else {
                            *cursor = vb.oid.clone();
                        }
                        vb
                    }
                };
                if !push_within_budget(&mut results, result) {
                    truncated = true;
                    break 'bulk;
                }
            }
        }
    }

    if truncated && results.is_empty() {
        return error_reply(request, ErrorStatus::TooBig, 0);
    }
    reply(request, results)
}

fn reply(request: &SnmpMessage, varbinds: Vec<VarBind>) -> SnmpMessage {
    debug_assert!(varbinds.iter().all(|vb| vb.value != SnmpValue::Null));
    SnmpMessage {
        version: request.version,
        community: request.community.clone(),
        pdu: SnmpPdu::response(request.pdu.request_id, varbinds),
    }
}

/// tooBig fallback used by the listener when an encoded response exceeds
/// the datagram cap.
pub fn too_big_reply(request: &SnmpMessage) -> SnmpMessage {
    error_reply(request, ErrorStatus::TooBig, 0)
}

/// Error responses echo the original request varbinds per RFC 1157.
fn error_reply(request: &SnmpMessage, status: ErrorStatus, index: i64) -> SnmpMessage {
    SnmpMessage {
        version: request.version,
        community: request.community.clone(),
        pdu: SnmpPdu::error_response(
            request.pdu.request_id,
            status,
            index,
            request.pdu.varbinds.clone(),
        ),
    }
}
