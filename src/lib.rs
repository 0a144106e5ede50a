pub mod config;
pub mod consts;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod moves;
pub mod registry;
pub mod server;
pub mod service;
