pub mod builder;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod importer;
#[cfg(feature = "cli")]
pub mod logging;
pub mod parser;
pub mod runner;
pub mod template;
