///! # Boardly Worker Library
///!
///! Runs the periodic maintenance jobs shared with the API's cron endpoints.
///!
///! ## Modules
///!
///! - `config`: Worker configuration and job intervals
///! - `scheduler`: Interval loops with graceful shutdown

pub mod config;
pub mod scheduler;
