//! Resumable scanner locating the end of one MessagePack object.
//!
//! The wire carries objects back to back with no length prefix, so the only
//! way to find a boundary is to walk the markers. The scanner keeps its
//! position and the number of items still owed by open containers, so bytes
//! that arrive in later reads continue the walk instead of restarting it.

use rmp::Marker;

use crate::{Result, SerfClientError};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct Item {
    /// Bytes taken by the marker, length fields and payload.
    len: usize,
    /// Items nested below this one (array elements, map keys and values).
    children: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Boundary {
    offset: usize,
    pending: u64,
}

impl Boundary {
    pub(crate) fn new() -> Self {
        Boundary::default()
    }

    /// Continues scanning `buffer`, which must start where the previous
    /// object ended and only grow between calls. Returns the length of the
    /// first complete object, after which the scanner is reset.
    pub(crate) fn advance(&mut self, buffer: &[u8]) -> Result<Option<usize>> {
        if self.pending == 0 {
            self.pending = 1;
        }
        while self.pending > 0 {
            match measure(&buffer[self.offset..])? {
                Some(item) => {
                    self.offset += item.len;
                    self.pending = self.pending - 1 + item.children;
                }
                None => return Ok(None),
            }
        }

        let end = self.offset;
        self.offset = 0;
        Ok(Some(end))
    }

    pub(crate) fn scanned(&self) -> usize {
        self.offset
    }

    pub(crate) fn reset(&mut self) {
        *self = Boundary::default();
    }
}

fn measure(bytes: &[u8]) -> Result<Option<Item>> {
    let marker = match bytes.first() {
        Some(marker) => Marker::from_u8(*marker),
        None => return Ok(None),
    };

    let item = match marker {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => scalar(1),
        Marker::FixMap(len) => container(1, 2 * u64::from(len)),
        Marker::FixArray(len) => container(1, u64::from(len)),
        Marker::FixStr(len) => scalar(1 + usize::from(len)),
        Marker::Reserved => {
            return Err(SerfClientError::InvalidResponse(
                "reserved marker 0xc1 in stream".to_string(),
            ))
        }
        Marker::Bin8 | Marker::Str8 => return sized(bytes, 1, 0),
        Marker::Bin16 | Marker::Str16 => return sized(bytes, 2, 0),
        Marker::Bin32 | Marker::Str32 => return sized(bytes, 4, 0),
        Marker::Ext8 => return sized(bytes, 1, 1),
        Marker::Ext16 => return sized(bytes, 2, 1),
        Marker::Ext32 => return sized(bytes, 4, 1),
        Marker::U8 | Marker::I8 => scalar(2),
        Marker::U16 | Marker::I16 => scalar(3),
        Marker::U32 | Marker::I32 | Marker::F32 => scalar(5),
        Marker::U64 | Marker::I64 | Marker::F64 => scalar(9),
        Marker::FixExt1 => scalar(3),
        Marker::FixExt2 => scalar(4),
        Marker::FixExt4 => scalar(6),
        Marker::FixExt8 => scalar(10),
        Marker::FixExt16 => scalar(18),
        Marker::Array16 => return counted(bytes, 2, 1),
        Marker::Array32 => return counted(bytes, 4, 1),
        Marker::Map16 => return counted(bytes, 2, 2),
        Marker::Map32 => return counted(bytes, 4, 2),
    };

    Ok(if bytes.len() >= item.len { Some(item) } else { None })
}

fn scalar(len: usize) -> Item {
    Item { len, children: 0 }
}

fn container(len: usize, children: u64) -> Item {
    Item { len, children }
}

/// str, bin and ext: a big-endian length of `width` bytes (plus `extra`
/// bytes of ext type), then the payload.
fn sized(bytes: &[u8], width: usize, extra: usize) -> Result<Option<Item>> {
    let payload = match read_length(bytes, width) {
        Some(payload) => payload,
        None => return Ok(None),
    };
    let len = 1 + width + extra + payload as usize;
    Ok(if bytes.len() >= len { Some(scalar(len)) } else { None })
}

fn counted(bytes: &[u8], width: usize, per_entry: u64) -> Result<Option<Item>> {
    Ok(read_length(bytes, width).map(|count| container(1 + width, per_entry * count)))
}

fn read_length(bytes: &[u8], width: usize) -> Option<u64> {
    let field = bytes.get(1..1 + width)?;
    Some(field.iter().fold(0u64, |length, byte| (length << 8) | u64::from(*byte)))
}
