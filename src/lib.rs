pub mod api;
pub mod chat;
pub mod classroom;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
