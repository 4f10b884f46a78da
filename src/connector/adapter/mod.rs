mod bedrock_runtime_client;
mod event_stream;
mod http_artifact_store;
mod http_support;
mod in_memory_artifact_store;
mod in_memory_document_index;
mod json_job_file;
mod knowledge_base_client;
mod local_artifact_store;
mod mock_inference_endpoint;

pub use bedrock_runtime_client::*;
pub use event_stream::{EventStreamDecoder, Frame, HeaderValue};
pub use http_artifact_store::*;
pub use http_support::BEARER_TOKEN_ENV;
pub use in_memory_artifact_store::*;
pub use in_memory_document_index::*;
pub use json_job_file::*;
pub use knowledge_base_client::*;
pub use local_artifact_store::*;
pub use mock_inference_endpoint::*;
