mod async_job_manager;
mod chat_orchestrator;
mod protocol_selector;
mod request_builder;
mod retrieval_augmenter;
mod synchronous_invoker;

pub use async_job_manager::*;
pub use chat_orchestrator::*;
pub use protocol_selector::*;
pub use request_builder::*;
pub use retrieval_augmenter::*;
pub use synchronous_invoker::*;
