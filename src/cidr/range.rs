//! Range arithmetic over IPv4 CIDR values.
//!
//! Pure value operations, no I/O. Ranges are `ipnet::Ipv4Net` values that
//! have already been checked to be canonical (no host bits set).

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::error::{CidrError, Result};

/// Parse a canonical IPv4 CIDR such as `10.0.0.0/16`.
///
/// Host bits must be zero: `10.0.0.1/16` is rejected rather than truncated,
/// since a stored or configured range with host bits set is a data error.
pub fn parse(value: &str) -> Result<Ipv4Net> {
    let trimmed = value.trim();
    let net = trimmed
        .parse::<Ipv4Net>()
        .map_err(|e| CidrError::invalid_cidr(trimmed, e))?;
    if net != net.trunc() {
        return Err(CidrError::invalid_cidr(
            trimmed,
            format!("host bits are set, expected {}", net.trunc()),
        ));
    }
    Ok(net)
}

/// True if `a` and `b` are equal or one contains the other.
///
/// For aligned ranges this is the same as sharing any address.
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a == b || a.contains(b) || b.contains(a)
}

pub fn first_address(net: &Ipv4Net) -> Ipv4Addr {
    net.network()
}

pub fn last_address(net: &Ipv4Net) -> Ipv4Addr {
    net.broadcast()
}

/// Number of addresses covered by a prefix length.
fn block_size(prefix_len: u8) -> u64 {
    1u64 << (32 - u32::from(prefix_len))
}

/// The adjacent range with the same prefix length immediately after `net`.
///
/// Returns `None` when `net` already ends at `255.255.255.255`.
pub fn next_range_of_same_prefix(net: &Ipv4Net) -> Option<Ipv4Net> {
    let next = u64::from(u32::from(net.network())) + block_size(net.prefix_len());
    let start = u32::try_from(next).ok()?;
    Ipv4Net::new(Ipv4Addr::from(start), net.prefix_len()).ok()
}

/// First candidate of `prefix_len` starting at the first address of `bounding`.
pub fn range_of_prefix(bounding: &Ipv4Net, prefix_len: u8) -> Result<Ipv4Net> {
    if prefix_len < bounding.prefix_len() || prefix_len > 32 {
        return Err(CidrError::InvalidPrefix {
            prefix_len,
            bounding: *bounding,
        });
    }
    Ipv4Net::new(bounding.network(), prefix_len).map_err(|_| CidrError::InvalidPrefix {
        prefix_len,
        bounding: *bounding,
    })
}
