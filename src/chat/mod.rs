pub mod conversation;
pub mod session;

pub use conversation::{Behavior, Conversation};
pub use session::ChatSession;
