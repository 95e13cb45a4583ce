pub mod events;
pub mod message;

pub use events::RelayEvent;
pub use message::{AuthorRole, Message, MessageStatus, ROOT_PARENT};
