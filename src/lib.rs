pub mod aggregate;
pub mod config;
pub mod consistency;
pub mod error;
pub mod loader;
pub mod output;
pub mod parser;
pub mod record;
pub mod stats;
pub mod store;
