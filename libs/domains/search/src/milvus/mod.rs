mod client;
mod config;

pub use client::MilvusBackend;
pub use config::MilvusConfig;
