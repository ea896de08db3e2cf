//! Hookwatch - webhook capture server and live local viewer.

pub mod cache;
pub mod capture;
pub mod client;
pub mod config;
pub mod merge;
pub mod render;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;
