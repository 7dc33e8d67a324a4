//! Souk messaging server library.
//!
//! Listing-anchored two-party conversations for a classifieds marketplace:
//! conversation and message stores, the send pipeline, cursor pagination,
//! acknowledged delivery over a WebSocket push channel, presence and typing
//! signals, and a per-sender rate guard. Exposed as a library for tests and
//! embedding.

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod delivery;
pub mod ephemeral;
pub mod error;
pub mod http;
pub mod hub;
pub mod model;
pub mod pagination;
pub mod presence;
pub mod rate_guard;
pub mod server;
pub mod service;
pub mod socket;
pub mod store;
