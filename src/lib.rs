// Public API for the server binary, integration tests and client tooling

pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
