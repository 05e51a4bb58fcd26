pub mod cache;
pub mod cli;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod executor;
pub mod helpers;
pub mod host;
pub mod loader;
pub mod plugins;
pub mod request;
pub mod worker;
