pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod engine;
pub mod middleware;
pub mod utils;
