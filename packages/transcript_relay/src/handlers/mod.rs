pub mod chat;
pub mod health;

// Re-export all handlers for easy route registration
pub use chat::{agent_chat_handler, chat_handler};
pub use health::{health_handler, metrics_handler};
