//! Utterance to command pipeline
//!
//! Matcher, renderer and validator chained into one synchronous call. The
//! compiler never executes anything; it hands a [`ParsedCommand`] and its
//! verdict to the caller, which routes it through the confirmation gate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RenderError;
use crate::intent::{IntentId, IntentLibrary, OsFamily};
use crate::matcher::{MatchOutcome, SlotValues};
use crate::render::{render, CommandLine};
use crate::safety::{RejectionReason, SafetyPolicy, SafetyVerdict};

/// One utterance turned into a concrete command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub id: Uuid,
    pub intent: IntentId,
    pub slots: SlotValues,
    pub command: CommandLine,
    pub destructive: bool,
    pub rejection: Option<RejectionReason>,
}

impl ParsedCommand {
    pub fn new(intent: IntentId, slots: SlotValues, command: CommandLine, destructive: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent,
            slots,
            command,
            destructive,
            rejection: None,
        }
    }

    fn with_verdict(mut self, verdict: SafetyVerdict) -> Self {
        self.rejection = verdict.rejection();
        self
    }
}

/// Outcome of compiling one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compilation {
    /// No intent matched
    NotUnderstood,
    /// An intent matched but a required slot was empty
    MissingSlot { intent: IntentId, slot: String },
    /// The template could not be rendered
    RenderFailed { intent: IntentId, error: RenderError },
    /// A command was rendered and classified
    Compiled {
        parsed: ParsedCommand,
        verdict: SafetyVerdict,
    },
}

/// Shared, read-only pipeline state
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    library: Arc<IntentLibrary>,
    policy: Arc<SafetyPolicy>,
}

impl CommandCompiler {
    pub fn new(library: Arc<IntentLibrary>, policy: Arc<SafetyPolicy>) -> Self {
        Self { library, policy }
    }

    pub fn library(&self) -> &Arc<IntentLibrary> {
        &self.library
    }

    pub fn policy(&self) -> &Arc<SafetyPolicy> {
        &self.policy
    }

    /// Target OS family, taken from the policy
    pub fn os(&self) -> OsFamily {
        self.policy.os()
    }

    /// Match, render and validate an utterance
    pub fn compile(&self, utterance: &str) -> Compilation {
        let matched = match self.library.match_utterance(utterance) {
            MatchOutcome::Matched(m) => m,
            MatchOutcome::MissingSlot { intent, slot } => {
                tracing::info!(intent = %intent, slot = %slot, "Required slot missing");
                return Compilation::MissingSlot { intent, slot };
            }
            MatchOutcome::NoMatch => return Compilation::NotUnderstood,
        };

        let Some(intent) = self.library.get(matched.intent) else {
            return Compilation::NotUnderstood;
        };

        let command = match render(&intent.definition, &matched.slots, self.os()) {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!(intent = %matched.intent, "Render failed: {}", error);
                return Compilation::RenderFailed {
                    intent: matched.intent,
                    error,
                };
            }
        };

        let destructive = intent.is_destructive();
        let verdict = self.policy.validate(&command, destructive);
        let parsed =
            ParsedCommand::new(matched.intent, matched.slots, command, destructive).with_verdict(verdict);

        tracing::debug!(intent = %parsed.intent, ?verdict, "Compiled: {}", parsed.command);
        Compilation::Compiled { parsed, verdict }
    }
}
