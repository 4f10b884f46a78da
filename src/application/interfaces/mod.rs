mod artifact_store;
mod document_index;
mod inference_endpoint;
mod sleeper;

pub use artifact_store::*;
pub use document_index::*;
pub use inference_endpoint::*;
pub use sleeper::*;
