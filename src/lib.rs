pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod dispatch;
pub mod engine;
pub mod exchange;
pub mod services;
