//! First-fit CIDR allocation.
//!
//! Walks candidate blocks of the requested size from the start of the
//! bounding range and returns the first one that overlaps nothing in `used`.
//! On a conflict the candidate advances by its own block size, whatever the
//! size of the range it collided with. Stored assignments depend on this
//! order, so a smarter skip would change which range a request receives.

use ipnet::Ipv4Net;
use thiserror::Error;

use super::range::{first_address, last_address, next_range_of_same_prefix, overlaps, range_of_prefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("no free /{prefix_len} block left in {bounding}")]
    Exhausted { bounding: Ipv4Net, prefix_len: u8 },

    #[error("prefix length /{prefix_len} cannot be carved out of {bounding}")]
    InvalidPrefix { bounding: Ipv4Net, prefix_len: u8 },
}

/// Find the first block of `prefix_len` inside `bounding` that does not
/// overlap any range in `used`.
///
/// `used` may hold ranges outside `bounding`; they are tested like any other.
/// The caller is responsible for pushing the result onto its `used` list
/// before the next allocation in the same pass.
pub fn allocate(bounding: &Ipv4Net, prefix_len: u8, used: &[Ipv4Net]) -> Result<Ipv4Net, AllocationError> {
    let mut candidate = range_of_prefix(bounding, prefix_len).map_err(|_| AllocationError::InvalidPrefix {
        bounding: *bounding,
        prefix_len,
    })?;

    let exhausted = AllocationError::Exhausted {
        bounding: *bounding,
        prefix_len,
    };

    while used.iter().any(|u| overlaps(u, &candidate)) {
        // Running off the top of the address space means we are past the bounding range too
        candidate = next_range_of_same_prefix(&candidate).ok_or(exhausted)?;
    }

    if last_address(bounding) < first_address(&candidate) {
        return Err(exhausted);
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cidr::range::parse;

    fn net(s: &str) -> Ipv4Net {
        parse(s).unwrap()
    }

    #[test]
    fn test_first_fit_on_empty_pool() {
        let pool = net("10.0.0.0/16");
        assert_eq!(allocate(&pool, 24, &[]).unwrap(), net("10.0.0.0/24"));
        assert_eq!(allocate(&pool, 16, &[]).unwrap(), pool);
    }

    #[test]
    fn test_sequential_allocations_do_not_collide() {
        let pool = net("10.0.0.0/16");
        let mut used = Vec::new();
        for expected in ["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"] {
            let got = allocate(&pool, 24, &used).unwrap();
            assert_eq!(got, net(expected));
            used.push(got);
        }
    }

    #[test]
    fn test_reuses_gap_left_in_used_list() {
        let pool = net("10.0.0.0/16");
        let used = vec![net("10.0.0.0/24"), net("10.0.2.0/24")];
        assert_eq!(allocate(&pool, 24, &used).unwrap(), net("10.0.1.0/24"));
    }

    #[test]
    fn test_advances_by_own_size_past_larger_conflict() {
        let pool = net("10.0.0.0/16");
        // The /23 blocks two /24 candidates in turn
        let used = vec![net("10.0.0.0/23")];
        assert_eq!(allocate(&pool, 24, &used).unwrap(), net("10.0.2.0/24"));
    }

    #[test]
    fn test_smaller_conflict_blocks_whole_candidate() {
        let vpc = net("10.0.0.0/24");
        let used = vec![net("10.0.0.16/28")];
        assert_eq!(allocate(&vpc, 26, &used).unwrap(), net("10.0.0.64/26"));
        assert_eq!(allocate(&vpc, 28, &used).unwrap(), net("10.0.0.0/28"));
    }

    #[test]
    fn test_ignores_ranges_outside_bounding() {
        let vpc = net("10.0.1.0/24");
        let used = vec![net("10.0.0.0/28"), net("10.0.0.16/28")];
        assert_eq!(allocate(&vpc, 28, &used).unwrap(), net("10.0.1.0/28"));
    }

    #[test]
    fn test_exhaustion_boundary() {
        // /16 holds exactly 2^(24-16) = 256 blocks of /24
        let pool = net("10.0.0.0/16");
        let mut used = Vec::new();
        for _ in 0..256 {
            let got = allocate(&pool, 24, &used).unwrap();
            assert!(pool.contains(&got));
            used.push(got);
        }
        assert_eq!(used.last(), Some(&net("10.0.255.0/24")));
        assert_eq!(
            allocate(&pool, 24, &used),
            Err(AllocationError::Exhausted { bounding: pool, prefix_len: 24 })
        );
    }

    #[test]
    fn test_exhausted_at_top_of_address_space() {
        let pool = net("255.255.255.0/24");
        let used = vec![pool];
        assert!(matches!(allocate(&pool, 26, &used), Err(AllocationError::Exhausted { .. })));
    }

    #[test]
    fn test_prefix_shorter_than_bounding() {
        let pool = net("10.0.0.0/24");
        assert!(matches!(
            allocate(&pool, 16, &[]),
            Err(AllocationError::InvalidPrefix { prefix_len: 16, .. })
        ));
    }

    #[test]
    fn test_allocate_is_pure() {
        let pool = net("10.0.0.0/24");
        let used = vec![net("10.0.0.0/26")];
        let first = allocate(&pool, 26, &used).unwrap();
        let second = allocate(&pool, 26, &used).unwrap();
        assert_eq!(first, second);
        assert_eq!(used.len(), 1);
    }
}
