// Library root: re-exports all modules so integration tests and the binary
// can reach the app's public API.

pub mod app;
pub mod config;
pub mod db;
pub mod protocol;
