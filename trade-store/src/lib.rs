pub mod api;
pub mod clock;
pub mod config;
pub mod date;
pub mod db;
pub mod expiry;
pub mod metrics;
pub mod trade;

pub mod error;
pub mod logger;
