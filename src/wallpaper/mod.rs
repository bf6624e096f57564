pub mod applier;
pub mod automation;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crop;
pub mod download;
pub mod geometry;
pub mod pipeline;
pub mod scheduler;
pub mod screens;
pub mod status;
pub mod store;
