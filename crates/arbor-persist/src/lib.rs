pub mod accumulator;
pub mod error;
pub mod models;
pub mod store;
pub mod tree;

pub use accumulator::TurnAccumulator;
pub use error::{PersistError, Result};
pub use models::{ChatMessage, Conversation};
pub use store::{ConversationStore, MemoryStore, MongoStore};
pub use tree::ConversationTree;
