//! # dropoff-server
//!
//! HTTP shell for the dropoff locker tower client.
//!
//! This library provides the API handlers, the shared state and the logging
//! setup used by the `dropoff-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
