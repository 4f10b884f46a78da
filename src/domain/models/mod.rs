mod chat_config;
mod conversation;
mod generation_job;
mod protocol;
mod retrieved_document;
mod turn;
mod wire_message;

pub use chat_config::*;
pub use conversation::*;
pub use generation_job::*;
pub use protocol::*;
pub use retrieved_document::*;
pub use turn::*;
pub use wire_message::*;
