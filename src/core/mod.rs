pub mod auth;
pub mod config;
pub mod cost;
pub mod formatter;
pub mod models;
pub mod slack;
pub mod window;
