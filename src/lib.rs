pub mod app_error;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod validation;
pub mod web;

pub use crate::config::AppConfig;
