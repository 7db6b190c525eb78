//! Homomorphic hash primitive.
//!
//! This module provides the cryptographic half of the dual hash:
//!
//! - [`group`]: values modulo a fixed 256-bit prime, with encoding and
//!   arithmetic,
//! - [`hash`]: element hashing, set hashing, O(1) extension and
//!   extension verification.
//!
//! The construction is a sum of element digests. An attacker who can
//! choose element pre-images can forge colliding multisets by birthday
//! search on the sum; downstream code depends only on the homomorphism
//! contract exposed here, so a stronger construction (e.g. an
//! LtHash-style map into a larger group) can be swapped in without
//! interface changes.

pub mod group;
pub mod hash;

pub use group::{GroupHash, HASH_LEN};
pub use hash::{combine, extend, hash_element, hash_set, verify_extension};
