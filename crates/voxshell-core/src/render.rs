//! Command renderer
//!
//! Turns a matched intent plus its slot values into one program and a
//! discrete argument vector. Substitution is literal: slot values never get
//! a second pass, and values that look like template syntax or command-line
//! options are refused outright.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::intent::{IntentDefinition, OsFamily};
use crate::matcher::SlotValues;

lazy_static! {
    /// cmd.exe switch, optionally with a value: `/q`, `/y`, `/s`, `/a:h`
    static ref WINDOWS_SWITCH_VALUE: Regex = Regex::new(r"^/[A-Za-z?\-]{1,2}(?::.*)?$").unwrap();
}

/// A single command: program plus arguments, never a script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a raw command string on whitespace; `None` when blank
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }

    /// Program followed by arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Render the template of `definition` for `os`
pub fn render(
    definition: &IntentDefinition,
    slots: &SlotValues,
    os: OsFamily,
) -> Result<CommandLine, RenderError> {
    let template = definition
        .templates
        .for_os(os)
        .ok_or(RenderError::UnsupportedOnThisOs {
            intent: definition.id,
            os,
        })?;

    for (name, value) in slots {
        if is_injected(value, os) {
            tracing::warn!(intent = %definition.id, slot = %name, "Refusing injected slot value");
            return Err(RenderError::TemplateInjection { slot: name.clone() });
        }
    }

    let mut args = Vec::with_capacity(template.args.len());
    for arg in &template.args {
        if let Some(name) = bare_placeholder(arg) {
            // Optional slot without a value: drop the argument entirely
            if let Some(value) = slots.get(name) {
                args.push(value.clone());
            }
            continue;
        }
        args.push(substitute(arg, slots));
    }

    Ok(CommandLine {
        program: template.program.trim().to_string(),
        args,
    })
}

/// Template syntax, or anything the program would read as an option
fn is_injected(value: &str, os: OsFamily) -> bool {
    value.contains('{')
        || value.contains('}')
        || value.starts_with('-')
        || (os == OsFamily::Windows && WINDOWS_SWITCH_VALUE.is_match(value))
}

fn bare_placeholder(arg: &str) -> Option<&str> {
    let inner = arg.strip_prefix('{')?.strip_suffix('}')?;
    if inner.contains('{') || inner.contains('}') {
        None
    } else {
        Some(inner)
    }
}

/// Single left-to-right pass; substituted text is never rescanned
fn substitute(arg: &str, slots: &SlotValues) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                if let Some(value) = slots.get(name) {
                    out.push_str(value);
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
