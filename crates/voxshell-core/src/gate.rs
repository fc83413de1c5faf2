//! Confirmation gate
//!
//! Event-driven state machine between validation and execution. Safe
//! commands are released immediately, destructive ones wait for an explicit
//! `Confirm` before a deadline, rejected ones never leave the gate.
//!
//! The gate has a single slot. Admitting a new command while another is
//! awaiting confirmation declines the pending one. Time is always passed in
//! by the caller so the wait can be driven without sleeping.
//!
//! [`ReleasedCommand`] can only be built here and is not `Clone`; the
//! executor consumes it by value, so a command runs at most once and only
//! after passing through this gate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::compiler::ParsedCommand;
use crate::intent::IntentId;
use crate::matcher::normalize;
use crate::render::CommandLine;
use crate::safety::{RejectionReason, SafetyPolicy, SafetyVerdict};

/// Default confirmation wait
pub const DEFAULT_CONFIRMATION_WAIT: Duration = Duration::from_secs(15);

/// Events that resolve a pending confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    Confirm,
    Decline,
    Cancel,
    Timeout,
}

/// Why a destructive command did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineCause {
    /// The user answered with anything but a confirmation
    Declined,
    /// The user cancelled explicitly
    Cancelled,
    /// The confirmation window elapsed
    TimedOut,
    /// A newer command was admitted while this one was pending
    Superseded,
}

/// Observable state of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    AwaitingConfirmation { command_id: Uuid, deadline: Instant },
}

/// A command cleared for execution
#[derive(Debug)]
#[must_use = "a released command does nothing unless it is executed"]
pub struct ReleasedCommand {
    parsed: ParsedCommand,
}

impl ReleasedCommand {
    fn new(parsed: ParsedCommand) -> Self {
        Self { parsed }
    }

    pub fn parsed(&self) -> &ParsedCommand {
        &self.parsed
    }

    pub fn intent(&self) -> IntentId {
        self.parsed.intent
    }

    pub fn command(&self) -> &CommandLine {
        &self.parsed.command
    }

    pub fn into_parsed(self) -> ParsedCommand {
        self.parsed
    }
}

/// Result of admitting or resolving a command
#[derive(Debug)]
pub enum GateDecision {
    Released(ReleasedCommand),
    AwaitingConfirmation {
        command: ParsedCommand,
        deadline: Instant,
    },
    Declined {
        command: ParsedCommand,
        cause: DeclineCause,
    },
    Rejected {
        command: ParsedCommand,
        reason: RejectionReason,
    },
}

/// Result of [`ConfirmationGate::admit`]
#[derive(Debug)]
pub struct Admission {
    pub decision: GateDecision,
    /// Previously pending command, declined by this admission
    pub superseded: Option<ParsedCommand>,
}

#[derive(Debug)]
struct Pending {
    command: ParsedCommand,
    deadline: Instant,
}

/// Single-slot confirmation gate
#[derive(Debug)]
pub struct ConfirmationGate {
    policy: Arc<SafetyPolicy>,
    wait: Duration,
    pending: Option<Pending>,
}

impl ConfirmationGate {
    pub fn new(policy: Arc<SafetyPolicy>, wait: Duration) -> Self {
        Self {
            policy,
            wait,
            pending: None,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn state(&self) -> GateState {
        match &self.pending {
            None => GateState::Idle,
            Some(pending) => GateState::AwaitingConfirmation {
                command_id: pending.command.id,
                deadline: pending.deadline,
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline of the pending confirmation, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Validate a parsed command and move it through the gate
    pub fn admit(&mut self, parsed: ParsedCommand, now: Instant) -> Admission {
        let superseded = self.pending.take().map(|pending| {
            tracing::info!(command = %pending.command.id, "Pending confirmation superseded");
            pending.command
        });

        let verdict = self.policy.validate(&parsed.command, parsed.destructive);
        let decision = match verdict {
            SafetyVerdict::Allowed => {
                tracing::info!(intent = %parsed.intent, "Released: {}", parsed.command);
                GateDecision::Released(ReleasedCommand::new(parsed))
            }
            SafetyVerdict::AllowedDestructive => {
                let deadline = now + self.wait;
                tracing::info!(intent = %parsed.intent, "Awaiting confirmation: {}", parsed.command);
                self.pending = Some(Pending {
                    command: parsed.clone(),
                    deadline,
                });
                GateDecision::AwaitingConfirmation {
                    command: parsed,
                    deadline,
                }
            }
            SafetyVerdict::Rejected(reason) => GateDecision::Rejected {
                command: parsed,
                reason,
            },
        };

        Admission {
            decision,
            superseded,
        }
    }

    /// Apply an event to the pending confirmation; `None` when nothing is pending
    pub fn resolve(&mut self, event: GateEvent, now: Instant) -> Option<GateDecision> {
        let pending = self.pending.take()?;

        let cause = match event {
            GateEvent::Confirm if now < pending.deadline => {
                tracing::info!(intent = %pending.command.intent, "Confirmed: {}", pending.command.command);
                return Some(GateDecision::Released(ReleasedCommand::new(pending.command)));
            }
            GateEvent::Confirm | GateEvent::Timeout => DeclineCause::TimedOut,
            GateEvent::Decline => DeclineCause::Declined,
            GateEvent::Cancel => DeclineCause::Cancelled,
        };

        tracing::info!(intent = %pending.command.intent, ?cause, "Declined: {}", pending.command.command);
        Some(GateDecision::Declined {
            command: pending.command,
            cause,
        })
    }

    /// Decline the pending command if its deadline has passed
    pub fn expire(&mut self, now: Instant) -> Option<GateDecision> {
        match &self.pending {
            Some(pending) if now >= pending.deadline => self.resolve(GateEvent::Timeout, now),
            _ => None,
        }
    }
}

/// Map a spoken reply onto a gate event
///
/// Only an exact confirmation word confirms. Cancel words cancel, anything
/// else declines.
pub fn classify_reply(reply: &str, confirm_words: &[String], cancel_words: &[String]) -> GateEvent {
    let reply = normalize(reply);
    let matches = |words: &[String]| words.iter().any(|w| normalize(w) == reply);

    if matches(confirm_words) {
        GateEvent::Confirm
    } else if matches(cancel_words) {
        GateEvent::Cancel
    } else {
        GateEvent::Decline
    }
}
