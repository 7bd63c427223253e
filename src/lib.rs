pub mod config;
pub mod infra;
pub mod server;
pub mod services;
