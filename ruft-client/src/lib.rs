mod client;
mod config;
mod download;
mod upload;

pub use client::*;
pub use config::*;
