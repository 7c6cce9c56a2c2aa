pub mod adapters;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod tokens;
pub mod web;
