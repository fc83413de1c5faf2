//! VoxShell CLI - voice-driven interaction loop
//!
//! Wires the compiler, confirmation gate and executor into a serial session,
//! and turns each turn's [`Outcome`] into a spoken reply.
//!
//! ```text
//! utterance ─▶ Session ─▶ CommandCompiler ─▶ ConfirmationGate ─▶ Executor
//!                 │                                                  │
//!                 └──────────────── Outcome ◀────────────────────────┘
//!                                      │
//!                               reply::render ─▶ SpeechSink
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations)]

pub mod reply;
pub mod repl;
pub mod session;
pub mod speech;

pub use repl::{is_exit_word, run, LoopSummary, EXIT_WORDS};
pub use session::{Outcome, Refusal, Session};
pub use speech::{ConsoleSink, RecordingSink, ScriptedSource, SpeechSink, StdinSource, UtteranceSource};

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
