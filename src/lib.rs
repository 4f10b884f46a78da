pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    ArtifactStore, AsyncJobManager, ChatEvent, ChatOrchestrator, ChatReply, DocumentIndex,
    InferenceEndpoint, PollPolicy, ProtocolSelector, ReplyKind, RetrievalAugmenter, Sleeper,
    SynchronousInvoker, TokioSleeper, UserInput,
};

pub use connector::{
    BedrockRuntimeClient, Container, ContainerConfig, EventStreamDecoder, HttpArtifactStore,
    InMemoryArtifactStore, InMemoryDocumentIndex, KnowledgeBaseClient, LocalArtifactStore,
    MockInferenceEndpoint,
};

pub use domain::{
    Attachment, ChatConfig, ConversationStore, DomainError, GenerationJob, JobHandle,
    JobOutcome, JobProgress, JobStatus, OutputLocation, Protocol, ProtocolFamily,
    ProtocolSelection, RetrievedDocument, Role, Turn, WireMessage,
};
