use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::{ChatEvent, ChatOrchestrator, ChatReply, ReplyKind, UserInput};
use crate::connector::adapter::JsonJobFile;
use crate::domain::{Attachment, DomainError, JobHandle, Role, RetrievedDocument};

use super::super::Container;

const HELP: &str = "Commands: /attach <path>, /resume, /history, /clear, /quit";

/// Drives the interactive chat and one-shot questions from the terminal.
pub struct ChatController {
    orchestrator: ChatOrchestrator,
    job_file: JsonJobFile,
    image_dir: PathBuf,
    start_message: String,
    pending_attachments: Vec<Attachment>,
}

impl ChatController {
    pub async fn new(container: &Container) -> Result<Self> {
        let mut orchestrator = container.orchestrator().await?;
        let job_file = container.job_file();

        match job_file.load().await {
            Ok(Some(job)) => {
                info!("Found unfinished video job {}", job.handle());
                orchestrator.restore_job(job)?;
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring saved job at {}: {}", job_file.path().display(), e),
        }

        Ok(Self {
            orchestrator,
            job_file,
            image_dir: container.image_dir(),
            start_message: container.chat_config().start_message.clone(),
            pending_attachments: Vec::new(),
        })
    }

    pub fn start_message(&self) -> &str {
        &self.start_message
    }

    pub fn pending_job_notice(&self) -> Option<String> {
        self.orchestrator.active_job().map(|job| {
            format!(
                "An unfinished video job for \"{}\" is waiting. Type /resume to keep polling.",
                job.prompt()
            )
        })
    }

    /// Queue a file for the next message.
    pub async fn attach(&mut self, path: &str) -> Result<String> {
        match load_attachment(Path::new(path)).await? {
            Some(attachment) => {
                let name = attachment.name().to_string();
                self.pending_attachments.push(attachment);
                Ok(format!(
                    "Attached {name} ({} queued for the next message)",
                    self.queued_attachments()
                ))
            }
            None => Ok(format!("Skipped {path}: unsupported file type")),
        }
    }

    pub fn queued_attachments(&self) -> usize {
        self.pending_attachments.len()
    }

    /// Send one message; failures the conversation absorbed come back as text.
    pub async fn ask(&mut self, prompt: String) -> Result<String> {
        let (_, output) = self.run_turn(prompt).await?;
        Ok(output)
    }

    /// Send one message and fail if the model call or the job failed.
    pub async fn ask_once(&mut self, prompt: String) -> Result<String> {
        match self.run_turn(prompt).await? {
            (Some(ReplyKind::JobFailure), output) => {
                Err(DomainError::JobTerminalFailure(output).into())
            }
            (Some(ReplyKind::BackendFailure), output) => Err(DomainError::backend(output).into()),
            (_, output) => Ok(output),
        }
    }

    pub async fn resume(&mut self) -> Result<String> {
        if self.orchestrator.active_job().is_none() {
            return Ok("No video job to resume.".to_string());
        }

        let cancel = cancel_on_ctrl_c();
        let result = self
            .orchestrator
            .resume_job(&cancel, print_event)
            .await;
        cancel.cancel();

        match result {
            Ok(reply) => self.finish(reply, false).await,
            Err(e) => self.interrupted(e).await,
        }
    }

    pub async fn clear(&mut self) -> Result<String> {
        self.orchestrator.clear();
        self.pending_attachments.clear();
        self.job_file.remove().await?;
        Ok(self.start_message.clone())
    }

    pub fn history(&self) -> String {
        let turns = self.orchestrator.history();
        if turns.is_empty() {
            return "No messages yet.".to_string();
        }

        turns
            .iter()
            .map(|turn| {
                let who = match turn.role() {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                let mut line = format!("[{who}] {}", turn.text());
                let attachments = turn.display().attachments();
                if !attachments.is_empty() {
                    line.push_str(&format!(" (attached: {})", attachments.join(", ")));
                }
                if turn.display().image().is_some() {
                    line.push_str(" [image]");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Interactive loop over standard input.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", self.start_message);
        println!("{HELP}");
        if let Some(notice) = self.pending_job_notice() {
            println!("{notice}");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            let result = match command {
                "/quit" | "/exit" => break,
                "/help" => Ok(HELP.to_string()),
                "/clear" => self.clear().await,
                "/history" => Ok(self.history()),
                "/resume" => self.resume().await,
                "/attach" if rest.trim().is_empty() => Ok("Usage: /attach <path>".to_string()),
                "/attach" => self.attach(rest.trim()).await,
                _ => self.ask(line.to_string()).await,
            };

            match result {
                Ok(output) if output.is_empty() => {}
                Ok(output) => println!("{output}"),
                Err(e) => eprintln!("Error: {e}"),
            }
        }

        Ok(())
    }

    async fn run_turn(&mut self, prompt: String) -> Result<(Option<ReplyKind>, String)> {
        let attachments = std::mem::take(&mut self.pending_attachments);
        let input = UserInput::new(prompt).with_attachments(attachments.clone());
        let streamed = self.orchestrator.is_streaming();
        let job_before = self.active_job_handle();

        let cancel = cancel_on_ctrl_c();
        let result = self.orchestrator.send(input, &cancel, print_event).await;
        cancel.cancel();

        match result {
            Ok(reply) => {
                let kind = reply.kind;
                Ok((Some(kind), self.finish(reply, streamed).await?))
            }
            Err(e) => {
                // Attachments stay queued unless a new job already took them.
                if self.active_job_handle() == job_before {
                    self.pending_attachments = attachments;
                }
                Ok((None, self.interrupted(e).await?))
            }
        }
    }

    fn active_job_handle(&self) -> Option<JobHandle> {
        self.orchestrator.active_job().map(|job| job.handle().clone())
    }

    async fn finish(&mut self, reply: ChatReply, streamed: bool) -> Result<String> {
        let mut output = match reply.kind {
            ReplyKind::Text if streamed => {
                println!();
                String::new()
            }
            ReplyKind::Image => {
                let mut text = reply.turn.text().to_string();
                if let Some(image) = reply.turn.display().image() {
                    let path = self.save_image(&image.decode()?).await?;
                    text.push_str(&format!("\nSaved image to {}", path.display()));
                }
                text
            }
            ReplyKind::Video | ReplyKind::JobFailure => {
                self.job_file.remove().await?;
                reply.turn.text().to_string()
            }
            _ => reply.turn.text().to_string(),
        };

        if !reply.sources.is_empty() {
            output.push_str(&format_sources(&reply.sources));
        }
        Ok(output)
    }

    /// Turn errors that leave the session usable into a message. A job that
    /// is still running is written to disk for a later `/resume`.
    async fn interrupted(&mut self, error: DomainError) -> Result<String> {
        if !matches!(error, DomainError::Cancelled | DomainError::PollLimitExceeded(_)) {
            return Err(error.into());
        }

        match self.orchestrator.active_job() {
            Some(job) => {
                self.job_file.save(job).await?;
                Ok(format!(
                    "{error}. The video job is still running; use /resume to keep polling."
                ))
            }
            None => Ok(format!("{error}.")),
        }
    }

    async fn save_image(&self, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.image_dir).await?;
        let path = self.image_dir.join(format!("image-{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// A token cancelled by the next Ctrl-C. Cancel it yourself once the turn
/// is over to stop the watcher.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    watcher.cancel();
                }
            }
        }
    });
    cancel
}

fn print_event(event: ChatEvent) {
    match event {
        ChatEvent::TextFragment(fragment) => {
            print!("{fragment}");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::ContextRetrieved(docs) => {
            eprintln!("Retrieved {} documents", docs.len());
        }
        ChatEvent::JobSubmitted(job) => {
            println!("Video generation started: {}", job.handle());
        }
        ChatEvent::JobProgress(progress) => println!("{}", progress.describe()),
    }
}

pub(crate) fn format_sources(sources: &[RetrievedDocument]) -> String {
    let mut output = String::from("\n\nSources:\n");
    for (i, doc) in sources.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, doc.display_line()));
        output.push_str(&format!("   {}\n", doc.preview().replace('\n', " ")));
    }
    output
}

async fn load_attachment(path: &Path) -> Result<Option<Attachment>> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment::from_bytes(name, bytes))
}
