pub mod cli;
pub mod config;
pub mod describe;
pub mod engine;
pub mod error;
pub mod frames;
pub mod namespace;
pub mod pipeline;
pub mod report;
pub mod scenes;
pub mod service;
pub mod tracker;
pub mod util;
pub mod worker;
