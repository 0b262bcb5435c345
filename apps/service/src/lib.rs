pub mod alerting;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod status;
pub mod validation;
