//! Interaction session
//!
//! One utterance at a time: compile, pass through the confirmation gate,
//! execute. While a destructive command is pending, the next utterance is
//! treated as the answer to the confirmation prompt and is not compiled.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use voxshell_core::config::ConfirmationSettings;
use voxshell_core::{
    classify_reply, AuditEvent, AuditLog, CommandCompiler, CommandLine, Compilation,
    ConfirmationGate, DeclineCause, GateDecision, IntentId, IntentLibrary, OsFamily,
    ReleasedCommand, RejectionReason, RenderError, ResultExt, ShellConfig,
};
use voxshell_sandbox::{ExecutionResult, Executor, ExecutorConfig};

/// Why a request was refused before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refusal {
    /// The validator rejected the rendered command
    Unsafe(RejectionReason),
    /// A slot value looked like template syntax or an option
    TemplateInjection,
}

/// Structured result of one turn, handed to the voice output
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Blank input
    Silence,
    NotUnderstood,
    MissingSlot {
        intent: IntentId,
        slot: String,
    },
    Unsupported {
        intent: IntentId,
        os: OsFamily,
    },
    Refused {
        intent: IntentId,
        refusal: Refusal,
    },
    AwaitingConfirmation {
        intent: IntentId,
        command: CommandLine,
    },
    Declined {
        intent: IntentId,
        cause: DeclineCause,
    },
    Executed {
        intent: IntentId,
        command: CommandLine,
        result: ExecutionResult,
    },
    DirectoryChanged {
        path: PathBuf,
    },
    DirectoryChangeFailed {
        path: PathBuf,
    },
    /// Released but not run because of `--dry-run`
    DryRun {
        intent: IntentId,
        command: CommandLine,
    },
}

impl Outcome {
    pub fn intent(&self) -> Option<IntentId> {
        match self {
            Outcome::MissingSlot { intent, .. }
            | Outcome::Unsupported { intent, .. }
            | Outcome::Refused { intent, .. }
            | Outcome::AwaitingConfirmation { intent, .. }
            | Outcome::Declined { intent, .. }
            | Outcome::Executed { intent, .. }
            | Outcome::DryRun { intent, .. } => Some(*intent),
            Outcome::DirectoryChanged { .. } | Outcome::DirectoryChangeFailed { .. } => {
                Some(IntentId::ChangeDirectory)
            }
            Outcome::Silence | Outcome::NotUnderstood => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Executed { result, .. } => Some(result.exit_code),
            _ => None,
        }
    }
}

/// Serial interaction loop state
#[derive(Debug)]
pub struct Session {
    compiler: CommandCompiler,
    gate: ConfirmationGate,
    executor: Executor,
    audit: AuditLog,
    confirmation: ConfirmationSettings,
    cwd: PathBuf,
    dry_run: bool,
}

impl Session {
    pub fn new(
        compiler: CommandCompiler,
        executor: Executor,
        confirmation: ConfirmationSettings,
        cwd: PathBuf,
    ) -> Self {
        let gate = ConfirmationGate::new(compiler.policy().clone(), confirmation.wait());
        Self {
            compiler,
            gate,
            executor,
            audit: AuditLog::default(),
            confirmation,
            cwd,
            dry_run: false,
        }
    }

    /// Load the library and build every collaborator from configuration
    pub fn from_config(config: &ShellConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let library = match &config.intents_path {
            Some(path) => IntentLibrary::load(path)?,
            None => IntentLibrary::builtin().context("Built-in intent library is invalid")?,
        };
        let policy = config.safety_policy().context("Invalid safety settings")?;
        let compiler = CommandCompiler::new(Arc::new(library), Arc::new(policy));

        let cwd = match &config.execution.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let executor = Executor::new(ExecutorConfig::from_shell_config(config));

        let mut session = Self::new(compiler, executor, config.confirmation.clone(), cwd);
        session.audit = AuditLog::new(config.audit_capacity);
        session.dry_run = config.execution.dry_run;

        tracing::info!(
            os = %config.os_family(),
            intents = session.compiler.library().len(),
            dry_run = session.dry_run,
            "Session ready"
        );
        Ok(session)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn compiler(&self) -> &CommandCompiler {
        &self.compiler
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.gate.is_pending()
    }

    /// When the pending confirmation expires
    pub fn deadline(&self) -> Option<Instant> {
        self.gate.deadline()
    }

    /// Decline the pending confirmation if its window has passed
    pub async fn expire(&mut self, now: Instant) -> Option<Outcome> {
        let decision = self.gate.expire(now)?;
        Some(self.apply(decision).await)
    }

    /// Process one utterance
    pub async fn handle(&mut self, utterance: &str, now: Instant) -> Outcome {
        if self.gate.is_pending() {
            let decision = match self.gate.expire(now) {
                Some(decision) => Some(decision),
                None => {
                    let event = classify_reply(
                        utterance,
                        &self.confirmation.confirm_words,
                        &self.confirmation.cancel_words,
                    );
                    self.gate.resolve(event, now)
                }
            };
            if let Some(decision) = decision {
                return self.apply(decision).await;
            }
        }

        if utterance.trim().is_empty() {
            return Outcome::Silence;
        }

        match self.compiler.compile(utterance) {
            Compilation::NotUnderstood => {
                self.audit.log(AuditEvent::NotUnderstood, None, utterance);
                Outcome::NotUnderstood
            }
            Compilation::MissingSlot { intent, slot } => {
                self.audit
                    .log(AuditEvent::NotUnderstood, Some(intent), format!("missing slot {}", slot));
                Outcome::MissingSlot { intent, slot }
            }
            Compilation::RenderFailed { intent, error } => {
                self.audit.log(AuditEvent::Rejected, Some(intent), error.to_string());
                match error {
                    RenderError::UnsupportedOnThisOs { os, .. } => Outcome::Unsupported { intent, os },
                    RenderError::TemplateInjection { .. } => Outcome::Refused {
                        intent,
                        refusal: Refusal::TemplateInjection,
                    },
                }
            }
            Compilation::Compiled { parsed, .. } => {
                self.audit
                    .log(AuditEvent::Matched, Some(parsed.intent), parsed.command.to_string());
                let admission = self.gate.admit(parsed, now);
                if let Some(superseded) = admission.superseded {
                    self.audit.log(
                        AuditEvent::Declined,
                        Some(superseded.intent),
                        format!("superseded: {}", superseded.command),
                    );
                }
                self.apply(admission.decision).await
            }
        }
    }

    async fn apply(&mut self, decision: GateDecision) -> Outcome {
        match decision {
            GateDecision::Released(released) => self.run_released(released).await,
            GateDecision::AwaitingConfirmation { command, .. } => {
                self.audit.log(
                    AuditEvent::AwaitingConfirmation,
                    Some(command.intent),
                    command.command.to_string(),
                );
                Outcome::AwaitingConfirmation {
                    intent: command.intent,
                    command: command.command,
                }
            }
            GateDecision::Declined { command, cause } => {
                self.audit.log(
                    AuditEvent::Declined,
                    Some(command.intent),
                    format!("{:?}: {}", cause, command.command),
                );
                Outcome::Declined {
                    intent: command.intent,
                    cause,
                }
            }
            GateDecision::Rejected { command, reason } => {
                self.audit.log(
                    AuditEvent::Rejected,
                    Some(command.intent),
                    format!("{}: {}", reason, command.command),
                );
                Outcome::Refused {
                    intent: command.intent,
                    refusal: Refusal::Unsafe(reason),
                }
            }
        }
    }

    async fn run_released(&mut self, released: ReleasedCommand) -> Outcome {
        let intent = released.intent();
        let command = released.command().clone();
        if released.parsed().destructive {
            self.audit.log(AuditEvent::Confirmed, Some(intent), command.to_string());
        }

        if self.dry_run {
            let _ = released.into_parsed();
            return Outcome::DryRun { intent, command };
        }

        if intent == IntentId::ChangeDirectory {
            return self.change_directory(released);
        }

        let executor = self.executor.clone();
        let cwd = self.cwd.clone();
        let task = tokio::spawn(async move { executor.execute_in(released, Some(&cwd)).await });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(format!("Executor task failed: {}", e), Default::default()),
        };

        let event = if result.success {
            AuditEvent::Executed
        } else {
            AuditEvent::Failed
        };
        self.audit
            .log(event, Some(intent), format!("{} -> exit {}", command, result.exit_code));

        Outcome::Executed {
            intent,
            command,
            result,
        }
    }

    /// `cd` cannot run as a child process; it moves the session directory
    fn change_directory(&mut self, released: ReleasedCommand) -> Outcome {
        let parsed = released.into_parsed();
        let target = parsed
            .slots
            .get("directory")
            .cloned()
            .or_else(|| parsed.command.args.first().cloned())
            .unwrap_or_default();
        let path = self.cwd.join(&target);

        if path.is_dir() {
            tracing::info!("Working directory: {}", path.display());
            self.audit.log(
                AuditEvent::Executed,
                Some(IntentId::ChangeDirectory),
                path.display().to_string(),
            );
            self.cwd = path.clone();
            Outcome::DirectoryChanged { path }
        } else {
            self.audit.log(
                AuditEvent::Failed,
                Some(IntentId::ChangeDirectory),
                format!("not a directory: {}", path.display()),
            );
            Outcome::DirectoryChangeFailed { path }
        }
    }
}
