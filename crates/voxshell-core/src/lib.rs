//! VoxShell Core - natural-language to command compiler with a safety gate
//!
//! Turns a transcribed utterance ("建立一個叫做 test 的資料夾", "list files")
//! into a single, validated system command. Nothing here spawns a process;
//! execution lives in `voxshell-sandbox` and only accepts commands released
//! by the [`gate::ConfirmationGate`].
//!
//! # Pipeline
//!
//! 1. **Intent Library** (`intent`): ordered catalog of triggers, slots and
//!    per-OS templates, loaded once from TOML.
//! 2. **Matcher** (`matcher`): first intent whose trigger matches wins; slots
//!    are extracted with typed rules.
//! 3. **Renderer** (`render`): literal placeholder substitution into a
//!    program plus argument vector.
//! 4. **Validator** (`safety`): allow-list, then deny patterns.
//! 5. **Confirmation Gate** (`gate`): destructive commands wait for an
//!    explicit confirmation.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use voxshell_core::{CommandCompiler, Compilation, IntentLibrary, OsFamily, SafetyPolicy, SafetyVerdict};
//!
//! let compiler = CommandCompiler::new(
//!     Arc::new(IntentLibrary::builtin().unwrap()),
//!     Arc::new(SafetyPolicy::new(OsFamily::Unix)),
//! );
//!
//! match compiler.compile("建立一個叫做 test 的資料夾") {
//!     Compilation::Compiled { parsed, verdict } => {
//!         assert_eq!(parsed.command.to_string(), "mkdir test");
//!         assert_eq!(verdict, SafetyVerdict::Allowed);
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod audit;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gate;
pub mod intent;
pub mod matcher;
pub mod render;
pub mod safety;

pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use compiler::{CommandCompiler, Compilation, ParsedCommand};
pub use config::{ReplyLanguage, ShellConfig};
pub use error::{ConfigError, LibraryError, RenderError, Result, ResultExt, VoxError};
pub use gate::{
    classify_reply, Admission, ConfirmationGate, DeclineCause, GateDecision, GateEvent, GateState,
    ReleasedCommand,
};
pub use intent::{IntentDefinition, IntentId, IntentLibrary, OsFamily};
pub use matcher::{match_utterance, normalize, IntentMatch, MatchOutcome, SlotValues};
pub use render::{render, CommandLine};
pub use safety::{AllowEntry, RejectionReason, SafetyPolicy, SafetyVerdict};

/// Version of VoxShell Core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
