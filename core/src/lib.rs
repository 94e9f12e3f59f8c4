pub mod action;
pub mod command;
pub mod config;
pub mod exercise;
pub mod report;
pub mod style;
pub mod testing;

pub use crate::config::Config;
