pub mod arena;
pub mod commands;
pub mod config;
pub mod constants;
pub mod eject;
pub mod error;
pub mod host;
pub mod lang;
pub mod machine;
pub mod outcome;
pub mod overlay;
pub mod registry;
pub mod reveal;
pub mod selection;
pub mod server_protocol;
pub mod server_utils;
pub mod state_store;
pub mod timers;
pub mod types;
