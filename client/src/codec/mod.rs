//! MessagePack object handling shared by the request and response paths.

pub mod address;
pub(crate) mod boundary;
pub(crate) mod util;

pub use self::address::{decode_address_field, decode_member_addresses};
