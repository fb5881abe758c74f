pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod repl;
pub mod stream;
