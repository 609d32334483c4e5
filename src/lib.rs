pub mod autopilot;
pub mod cards;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod history_store;
pub mod participants;
pub mod protocol;
pub mod registry;
pub mod rng;
pub mod server_utils;
pub mod types;
pub mod zones;
