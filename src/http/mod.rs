//! HTTP front end: routes, the rate limit middleware and the server.

mod middleware;
mod routes;
mod server;

pub use middleware::{client_identity, enforce_rate_limit};
pub use server::{AppState, HttpServer};
