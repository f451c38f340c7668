//! Storefront - catalog site server
//!
//! This crate implements the HTTP front end of a small catalog site. Every
//! inbound request passes a per-client fixed window rate limit gate before it
//! reaches any handler; a background sweeper keeps the gate's memory bounded.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
