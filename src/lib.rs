pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod mixer;
pub mod startup;
