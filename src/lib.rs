pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod menu;
pub mod orchestrator;
pub mod progress;
pub mod scanner;
