//! DB-compatible (e.g. de/serialisable) types, and the transactions over them.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

pub mod admin;
pub mod candidate;
pub mod generation;
pub mod redemption;
pub mod settings;
pub mod token;
pub mod vote;
