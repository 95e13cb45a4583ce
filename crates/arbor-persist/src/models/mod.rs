pub mod chat_message;
pub mod conversation;

pub use chat_message::ChatMessage;
pub use conversation::Conversation;
