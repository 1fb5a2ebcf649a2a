pub mod chat;
pub mod config;

pub use chat::{ChatMessage, Role};
pub use config::Config;
