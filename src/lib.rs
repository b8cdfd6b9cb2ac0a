pub mod actors;
pub mod app;
pub mod config;
pub mod errors;
pub mod http;
pub mod ids;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod utils;
