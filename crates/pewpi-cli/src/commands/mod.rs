//! Command handlers

pub mod backup;
pub mod config;
pub mod doc;
pub mod status;
pub mod token;
pub mod user;
