//! Error types for CIDR resolution.
//!
//! `InvalidCidr`, `PoolNotFound` and `PoolExhausted` are permanent
//! configuration or capacity problems and are never retried. Store failures
//! arrive here only after the persistence layer has given up retrying.

use ipnet::Ipv4Net;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, CidrError>;

#[derive(Debug, Error)]
pub enum CidrError {
    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("Prefix length /{prefix_len} cannot be carved out of {bounding}")]
    InvalidPrefix { prefix_len: u8, bounding: Ipv4Net },

    #[error("Didn't find entry for pool \"{pool}\" in region {region} in the cidr pool catalog")]
    PoolNotFound { pool: String, region: String },

    #[error("Cidr pool \"{pool}\" ({bounding}) in {region} ran out of space while assigning for {owner}")]
    PoolExhausted {
        pool: String,
        region: String,
        owner: String,
        bounding: Ipv4Net,
    },

    #[error("{what} requests a dynamic range but has no size")]
    MissingPrefix { what: String },

    #[error("VPC \"{region}/{vpc}\" has no resolved range for pool \"{pool}\" requested by subnet {subnet}")]
    UnresolvedVpcPool {
        region: String,
        vpc: String,
        pool: String,
        subnet: String,
    },

    #[error("{what} is cidr-src lookup and no stored assignment was found")]
    LookupNotFound { what: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CidrError {
    pub(crate) fn invalid_cidr(value: impl Into<String>, reason: impl ToString) -> Self {
        CidrError::InvalidCidr {
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
