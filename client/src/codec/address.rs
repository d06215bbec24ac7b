use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rmpv::Value;

use crate::codec::util;
use crate::{Result, SerfClientError};

pub const ADDRESS_FIELD: &str = "Addr";
const MEMBERS_FIELD: &str = "Members";

/// Returns a copy of `record` with the raw IP address in `field` replaced
/// by its text form. IPv4-mapped IPv6 addresses come out as dotted quads.
pub fn decode_address_field(record: &Value, field: &str) -> Result<Value> {
    let invalid = |reason: &str| SerfClientError::InvalidAddress {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let entries = record.as_map().ok_or_else(|| invalid("record is not a map"))?;
    let mut found = false;
    let mut decoded = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if !found && util::key_matches(key, field) {
            let raw = util::as_bytes(value).ok_or_else(|| invalid("value is not binary"))?;
            let address = decode_address(raw).map_err(|reason| invalid(&reason))?;
            decoded.push((key.clone(), Value::from(address.to_string())));
            found = true;
        } else {
            decoded.push((key.clone(), value.clone()));
        }
    }

    if found {
        Ok(Value::Map(decoded))
    } else {
        Err(invalid("field is missing"))
    }
}

/// Decodes the address of every entry in the body of a `members` reply.
pub fn decode_member_addresses(body: &Value) -> Result<Value> {
    let entries = body.as_map().ok_or_else(|| {
        SerfClientError::InvalidResponse("members body is not a map".to_string())
    })?;

    let mut decoded = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let value = if util::key_matches(key, MEMBERS_FIELD) {
            let members = value.as_array().ok_or_else(|| {
                SerfClientError::InvalidResponse("members list is not an array".to_string())
            })?;
            let members = members
                .iter()
                .map(|member| decode_address_field(member, ADDRESS_FIELD))
                .collect::<Result<Vec<_>>>()?;
            Value::Array(members)
        } else {
            value.clone()
        };
        decoded.push((key.clone(), value));
    }
    Ok(Value::Map(decoded))
}

fn decode_address(raw: &[u8]) -> std::result::Result<IpAddr, String> {
    match raw.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(raw);
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            let address = Ipv6Addr::from(octets);
            Ok(match address.to_ipv4_mapped() {
                Some(address) => IpAddr::V4(address),
                None => IpAddr::V6(address),
            })
        }
        length => Err(format!("expected 4 or 16 bytes, got {}", length)),
    }
}
