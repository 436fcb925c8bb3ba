// Nido Client - library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod transport;
