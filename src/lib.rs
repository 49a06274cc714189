// src/lib.rs

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;
pub mod state;

pub use error::ChatError;
pub use state::AppState;
