//! API-friendly types: request bodies, responses and request guards.

pub mod admin;
pub mod candidate;
mod json;
pub mod pagination;
pub mod pin;
pub mod response;
pub mod session;
pub mod stats;
pub mod token;
pub mod vote;
