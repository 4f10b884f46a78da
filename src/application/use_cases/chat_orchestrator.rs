//! Chat orchestrator: runs one user turn end to end.
//!
//! Selects the protocol for the configured model, grounds text prompts with
//! retrieved documents, dispatches to the synchronous invoker or the job
//! manager and appends the finished exchange to the session history.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::use_cases::async_job_manager::AsyncJobManager;
use crate::application::use_cases::protocol_selector::ProtocolSelector;
use crate::application::use_cases::retrieval_augmenter::RetrievalAugmenter;
use crate::application::use_cases::synchronous_invoker::SynchronousInvoker;
use crate::domain::{
    Attachment, ConversationStore, DomainError, GenerationJob, JobOutcome, JobProgress,
    OutputLocation, Protocol, ProtocolSelection, RetrievedDocument, Turn, WireMessage,
};

const IMAGE_CAPTION: &str = "I've generated the image based on your prompt.";

/// Incremental updates delivered while a turn is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    ContextRetrieved(Vec<RetrievedDocument>),
    TextFragment(String),
    JobSubmitted(GenerationJob),
    JobProgress(JobProgress),
}

/// What the user typed plus any attached files.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl UserInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Text,
    Image,
    Video,
    /// A synchronous call failed; the reply text describes the error.
    BackendFailure,
    /// The video job ended in the failed state.
    JobFailure,
}

/// The assistant turn appended for a user turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub kind: ReplyKind,
    pub turn: Turn,
    pub sources: Vec<RetrievedDocument>,
}

impl ChatReply {
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, ReplyKind::BackendFailure | ReplyKind::JobFailure)
    }
}

/// Per-session state: the history and the job slot.
pub struct ChatSession {
    id: Uuid,
    conversation: ConversationStore,
    jobs: AsyncJobManager,
}

impl ChatSession {
    pub fn new(jobs: AsyncJobManager) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: ConversationStore::new(),
            jobs,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn active_job(&self) -> Option<&GenerationJob> {
        self.jobs.active()
    }

    /// Drop all turns and any active job together.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.jobs.reset();
    }
}

pub struct ChatOrchestrator {
    selector: ProtocolSelector,
    augmenter: RetrievalAugmenter,
    invoker: SynchronousInvoker,
    session: ChatSession,
    model_id: String,
    streaming: bool,
    output_location: Option<OutputLocation>,
}

impl ChatOrchestrator {
    pub fn new(
        selector: ProtocolSelector,
        augmenter: RetrievalAugmenter,
        invoker: SynchronousInvoker,
        jobs: AsyncJobManager,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            selector,
            augmenter,
            invoker,
            session: ChatSession::new(jobs),
            model_id: model_id.into(),
            streaming: true,
            output_location: None,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_output_location(mut self, location: Option<OutputLocation>) -> Self {
        self.output_location = location;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn set_model(&mut self, model_id: impl Into<String>) {
        self.model_id = model_id.into();
        info!("Switched model to {}", self.model_id);
    }

    pub fn selection(&self) -> ProtocolSelection {
        self.selector.select(&self.model_id)
    }

    /// Streaming only applies to text models.
    pub fn is_streaming(&self) -> bool {
        self.streaming && self.selection().protocol.supports_streaming()
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub fn history(&self) -> &[Turn] {
        self.session.conversation().turns()
    }

    pub fn active_job(&self) -> Option<&GenerationJob> {
        self.session.active_job()
    }

    pub fn knowledge_base_id(&self) -> Option<&str> {
        self.augmenter.knowledge_base_id()
    }

    pub fn clear(&mut self) {
        info!("Clearing session {}", self.session.id());
        self.session.reset();
    }

    pub fn restore_job(&mut self, job: GenerationJob) -> Result<(), DomainError> {
        self.session.jobs.restore(job)
    }

    /// Run one user turn. `on_event` sees every incremental update before
    /// the exchange is appended.
    pub async fn send<F>(
        &mut self,
        input: UserInput,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<ChatReply, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        if input.text.trim().is_empty() {
            return Err(DomainError::invalid_input("message cannot be empty"));
        }

        let selection = self.selection();
        info!(
            "Turn for {} via {} protocol ({} family)",
            self.model_id, selection.protocol, selection.family
        );

        match selection.protocol {
            Protocol::Text => self.send_text(input, &selection, cancel, &mut on_event).await,
            Protocol::Image => self.send_image(input, &selection, cancel).await,
            Protocol::Video => self.send_video(input, &selection, cancel, &mut on_event).await,
        }
    }

    /// Continue polling a job restored from an earlier session.
    pub async fn resume_job<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<ChatReply, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        self.await_job(cancel, &mut on_event).await
    }

    async fn send_text<F>(
        &mut self,
        input: UserInput,
        selection: &ProtocolSelection,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<ChatReply, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        let names = attachment_names(&input.attachments);

        let retrieval = selection.protocol.uses_retrieval() && self.augmenter.is_enabled();
        let docs = match retrieval {
            true => match self.augmenter.query(&input.text).await {
                Ok(docs) => docs,
                Err(e) if e.is_service_failure() => {
                    let user = Turn::user(input.text.clone(), names, WireMessage::user(input.text))?;
                    return self.commit_failure(user, &e);
                }
                Err(e) => return Err(e),
            },
            false => Vec::new(),
        };
        if !docs.is_empty() {
            on_event(ChatEvent::ContextRetrieved(docs.clone()));
        }

        let context = RetrievalAugmenter::render(&docs);
        let wire = WireMessage::user(RetrievalAugmenter::augment(&input.text, context.as_deref()))
            .with_attachments(input.attachments);
        let user = Turn::user(input.text, names, wire)?;

        let mut history = self.session.conversation().wire_history();
        history.push(user.wire().clone());

        let result = if self.streaming {
            self.consume_stream(selection, &history, cancel, on_event).await
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DomainError::Cancelled),
                text = self.invoker.complete_text(&self.model_id, selection, &history) => text,
            }
        };

        match result {
            Ok(text) => self.commit(user, Turn::assistant(text), ReplyKind::Text, docs),
            Err(e) if e.is_service_failure() => self.commit_failure(user, &e),
            Err(e) => Err(e),
        }
    }

    /// Accumulate a streamed reply. Nothing is kept if the turn is cancelled
    /// or the stream breaks.
    async fn consume_stream<F>(
        &self,
        selection: &ProtocolSelection,
        history: &[WireMessage],
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<String, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            stream = self.invoker.stream_text(&self.model_id, selection, history) => stream?,
        };

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stream cancelled; discarding {} buffered characters", text.len());
                    return Err(DomainError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    text.push_str(&fragment);
                    on_event(ChatEvent::TextFragment(fragment));
                }
                Some(Err(e)) => {
                    warn!("Stream broke after {} characters: {}", text.len(), e);
                    return Err(e);
                }
                None => break,
            }
        }

        if text.is_empty() {
            warn!("Stream finished without any text");
        }
        Ok(text)
    }

    async fn send_image(
        &mut self,
        input: UserInput,
        selection: &ProtocolSelection,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, DomainError> {
        let names = attachment_names(&input.attachments);
        let prompt = input.text.clone();
        let user = Turn::user(
            input.text,
            names,
            WireMessage::user(prompt.clone()).with_attachments(input.attachments),
        )?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DomainError::Cancelled),
            image = self.invoker.generate_image(&self.model_id, selection, &prompt) => image,
        };

        match result {
            Ok(image) => self.commit(
                user,
                Turn::assistant_image(IMAGE_CAPTION, &image),
                ReplyKind::Image,
                Vec::new(),
            ),
            Err(e) if e.is_service_failure() => self.commit_failure(user, &e),
            Err(e) => Err(e),
        }
    }

    async fn send_video<F>(
        &mut self,
        input: UserInput,
        selection: &ProtocolSelection,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<ChatReply, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        self.session.jobs.ensure_idle()?;
        let output = self.output_location.clone().ok_or_else(|| {
            DomainError::configuration("an output location is required for video generation")
        })?;
        let reference = input.attachments.iter().find(|a| a.is_image());

        let submitted = self
            .session
            .jobs
            .submit(&self.model_id, selection, &input.text, reference, Some(&output))
            .await;

        match submitted {
            Ok(job) => on_event(ChatEvent::JobSubmitted(job.clone())),
            Err(e) if e.is_service_failure() => {
                let user = Turn::user(
                    input.text.clone(),
                    attachment_names(&input.attachments),
                    WireMessage::user(input.text).with_output_location(output),
                )?;
                return self.commit_failure(user, &e);
            }
            Err(e) => return Err(e),
        }

        self.await_job(cancel, on_event).await
    }

    async fn await_job<F>(
        &mut self,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<ChatReply, DomainError>
    where
        F: FnMut(ChatEvent) + Send,
    {
        let (prompt, output) = match self.session.active_job() {
            Some(job) => (job.prompt().to_string(), job.output().clone()),
            None => return Err(DomainError::NoActiveJob),
        };

        let outcome = self
            .session
            .jobs
            .run_to_completion(cancel, |progress| {
                on_event(ChatEvent::JobProgress(progress.clone()))
            })
            .await?;

        let user = Turn::user(
            prompt.clone(),
            Vec::new(),
            WireMessage::user(prompt).with_output_location(output),
        )?;
        let kind = match outcome {
            JobOutcome::Completed { .. } => ReplyKind::Video,
            JobOutcome::Failed { .. } => ReplyKind::JobFailure,
        };
        self.commit(user, Turn::assistant(outcome.message()), kind, Vec::new())
    }

    fn commit(
        &mut self,
        user: Turn,
        assistant: Turn,
        kind: ReplyKind,
        sources: Vec<RetrievedDocument>,
    ) -> Result<ChatReply, DomainError> {
        self.session
            .conversation
            .append_exchange(user, assistant.clone())?;
        Ok(ChatReply {
            kind,
            turn: assistant,
            sources,
        })
    }

    /// Record a failed turn. The exchange is shown in the history but never
    /// resent, so the request that failed cannot break later turns.
    fn commit_failure(&mut self, user: Turn, error: &DomainError) -> Result<ChatReply, DomainError> {
        warn!("Turn failed: {}", error);
        let text = format!("Error invoking model: {}", error.detail());
        self.commit(
            user.without_context(),
            Turn::assistant(text).without_context(),
            ReplyKind::BackendFailure,
            Vec::new(),
        )
    }
}

fn attachment_names(attachments: &[Attachment]) -> Vec<String> {
    attachments.iter().map(|a| a.name().to_string()).collect()
}
