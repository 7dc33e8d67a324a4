//! Shared wire definitions for the souk messaging core.

pub mod message;
pub mod presence;
pub mod push;
pub mod typing;
