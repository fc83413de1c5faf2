//! Safety validator
//!
//! Classifies a rendered command as allowed, allowed-but-destructive or
//! rejected. Two layers, applied in order:
//!
//! 1. Allow-list: the program must be a known, low-risk executable
//!    (default-deny). An entry may also pin the first argument to a set of
//!    subcommands.
//! 2. Deny patterns: a hard veto over the whole argument vector, even for
//!    allow-listed programs.
//!
//! Validation is lexical and total: it never touches the clock, the
//! filesystem or any mutable state. The rule that fired is logged, only the
//! category is returned.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::intent::OsFamily;
use crate::render::CommandLine;

lazy_static! {
    /// cmd.exe style switches such as `/s`, `/q`, `/t`, `/?`
    static ref WINDOWS_SWITCH: Regex = Regex::new(r"^/[A-Za-z?\-]{1,2}$").unwrap();

    /// `c:\...`, `c:/...`
    static ref WINDOWS_DRIVE_PATH: Regex = Regex::new(r"^[A-Za-z]:[\\/]").unwrap();

    /// Bare volume designator such as `c:`
    static ref WINDOWS_VOLUME: Regex = Regex::new(r"^[A-Za-z]:$").unwrap();
}

/// Characters that let a shell chain, redirect or expand
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '>', '<', '\n', '\r'];

/// Extra metacharacters honoured by cmd.exe
const WINDOWS_METACHARACTERS: &[char] = &['^', '%'];

/// Programs allowed when no allow-list is configured
pub const DEFAULT_ALLOWED_PROGRAMS: &[&str] = &[
    "ls", "dir", "pwd", "cd", "mkdir", "rmdir", "cp", "copy", "mv", "move", "rm", "del", "echo",
    "cat", "type", "find", "grep", "ps", "df", "du", "free", "whoami", "date", "time", "which",
    "where", "systeminfo", "uname", "tree", "hostname",
];

pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 1000;

/// Why a command was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Program (or subcommand) is not on the allow-list
    NotWhitelisted,
    /// A deny pattern matched
    DangerousPattern,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NotWhitelisted => write!(f, "not_whitelisted"),
            RejectionReason::DangerousPattern => write!(f, "dangerous_pattern"),
        }
    }
}

/// Classification of one rendered command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Allowed,
    AllowedDestructive,
    Rejected(RejectionReason),
}

impl SafetyVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, SafetyVerdict::Rejected(_))
    }

    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            SafetyVerdict::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Allow-list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowEntry {
    /// Lowercase program name without extension
    pub program: String,
    /// When set, the first argument must be one of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcommands: Option<Vec<String>>,
}

impl AllowEntry {
    pub fn program(program: impl Into<String>) -> Self {
        Self {
            program: program.into().to_lowercase(),
            subcommands: None,
        }
    }

    pub fn with_subcommands(program: impl Into<String>, subcommands: &[&str]) -> Self {
        Self {
            program: program.into().to_lowercase(),
            subcommands: Some(subcommands.iter().map(|s| s.to_lowercase()).collect()),
        }
    }

    fn permits(&self, first_arg: Option<&str>) -> bool {
        match &self.subcommands {
            None => true,
            Some(allowed) => first_arg
                .map(|arg| allowed.iter().any(|s| s.eq_ignore_ascii_case(arg)))
                .unwrap_or(false),
        }
    }
}

/// The deny rule that vetoed a command; logged, never returned
#[derive(Debug, Clone, PartialEq, Eq)]
enum DenyRule {
    CommandTooLong(usize),
    Metacharacter(char),
    RecursiveForce,
    NoPreserveRoot,
    DevicePath(String),
    HomeExpansion(String),
    Traversal(String),
    OutsidePermittedRoots(String),
    Custom(String),
}

impl std::fmt::Display for DenyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyRule::CommandTooLong(len) => write!(f, "command_too_long({})", len),
            DenyRule::Metacharacter(c) => write!(f, "shell_metacharacter({:?})", c),
            DenyRule::RecursiveForce => write!(f, "recursive_force_delete"),
            DenyRule::NoPreserveRoot => write!(f, "no_preserve_root"),
            DenyRule::DevicePath(p) => write!(f, "device_path({})", p),
            DenyRule::HomeExpansion(p) => write!(f, "home_expansion({})", p),
            DenyRule::Traversal(p) => write!(f, "path_traversal({})", p),
            DenyRule::OutsidePermittedRoots(p) => write!(f, "outside_permitted_roots({})", p),
            DenyRule::Custom(p) => write!(f, "custom_pattern({})", p),
        }
    }
}

/// Static validation policy, built once and shared read-only
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    os: OsFamily,
    allow: Vec<AllowEntry>,
    permitted_roots: Vec<String>,
    max_command_length: usize,
    deny_patterns: Vec<Regex>,
}

impl SafetyPolicy {
    /// Default policy for an OS family
    pub fn new(os: OsFamily) -> Self {
        let mut allow: Vec<AllowEntry> = DEFAULT_ALLOWED_PROGRAMS
            .iter()
            .map(|p| AllowEntry::program(*p))
            .collect();
        allow.push(AllowEntry::with_subcommands("fsutil", &["volume"]));

        Self {
            os,
            allow,
            permitted_roots: Vec::new(),
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            deny_patterns: Vec::new(),
        }
    }

    /// Replace the allow-list
    pub fn with_allow_list(mut self, entries: Vec<AllowEntry>) -> Self {
        self.allow = entries;
        self
    }

    /// Add one program to the allow-list
    pub fn with_allowed(mut self, program: impl Into<String>) -> Self {
        self.allow.push(AllowEntry::program(program));
        self
    }

    /// Permit absolute paths under `root`
    pub fn with_permitted_root(mut self, root: impl Into<String>) -> Self {
        let root = self.normalize_path(&root.into());
        self.permitted_roots.push(root);
        self
    }

    pub fn with_max_command_length(mut self, max: usize) -> Self {
        self.max_command_length = max;
        self
    }

    /// Add an extra deny regex, matched against the whole command line
    pub fn with_deny_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidDenyPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.deny_patterns.push(regex);
        Ok(self)
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn allow_list(&self) -> &[AllowEntry] {
        &self.allow
    }

    pub fn permitted_roots(&self) -> &[String] {
        &self.permitted_roots
    }

    pub fn max_command_length(&self) -> usize {
        self.max_command_length
    }

    /// Classify a rendered command
    pub fn validate(&self, command: &CommandLine, destructive: bool) -> SafetyVerdict {
        if let Err(reason) = self.check_allow_list(command) {
            tracing::warn!(program = %command.program, "Rejected: {}", reason);
            return SafetyVerdict::Rejected(RejectionReason::NotWhitelisted);
        }

        if let Some(rule) = self.find_denied(command) {
            tracing::warn!(program = %command.program, rule = %rule, "Rejected dangerous command");
            return SafetyVerdict::Rejected(RejectionReason::DangerousPattern);
        }

        if destructive {
            SafetyVerdict::AllowedDestructive
        } else {
            SafetyVerdict::Allowed
        }
    }

    /// Tokenize a raw command string on whitespace, then validate it
    pub fn validate_line(&self, line: &str, destructive: bool) -> SafetyVerdict {
        let Some(command) = CommandLine::parse(line) else {
            tracing::warn!("Rejected: empty command line");
            return SafetyVerdict::Rejected(RejectionReason::NotWhitelisted);
        };

        let verdict = self.validate(&command, destructive);
        if verdict.is_rejected() {
            return verdict;
        }

        // Whitespace splitting hides line breaks and padding, so check the raw text too
        let raw_rule = if line.len() > self.max_command_length {
            Some(DenyRule::CommandTooLong(line.len()))
        } else {
            line.chars()
                .find(|c| *c == '\n' || *c == '\r')
                .map(DenyRule::Metacharacter)
        };
        if let Some(rule) = raw_rule {
            tracing::warn!(program = %command.program, rule = %rule, "Rejected dangerous command");
            return SafetyVerdict::Rejected(RejectionReason::DangerousPattern);
        }

        verdict
    }

    fn check_allow_list(&self, command: &CommandLine) -> Result<(), String> {
        let program = normalize_program(&command.program)
            .ok_or_else(|| format!("program {:?} is not a bare name", command.program))?;

        let entry = self
            .allow
            .iter()
            .find(|entry| entry.program == program)
            .ok_or_else(|| format!("program {:?} is not allow-listed", program))?;

        let first = command.args.first().map(String::as_str);
        if entry.permits(first) {
            Ok(())
        } else {
            Err(format!("subcommand {:?} of {} is not allow-listed", first, program))
        }
    }

    fn find_denied(&self, command: &CommandLine) -> Option<DenyRule> {
        let rendered = command.to_string();
        if rendered.len() > self.max_command_length {
            return Some(DenyRule::CommandTooLong(rendered.len()));
        }

        let metacharacters = |c: &char| {
            SHELL_METACHARACTERS.contains(c)
                || (self.os == OsFamily::Windows && WINDOWS_METACHARACTERS.contains(c))
        };
        for token in command.argv() {
            if let Some(c) = token.chars().find(metacharacters) {
                return Some(DenyRule::Metacharacter(c));
            }
        }

        if let Some(rule) = recursive_force(&command.args) {
            return Some(rule);
        }

        for arg in &command.args {
            if let Some(rule) = self.check_path(path_part(arg)) {
                return Some(rule);
            }
        }

        self.deny_patterns
            .iter()
            .find(|regex| regex.is_match(&rendered))
            .map(|regex| DenyRule::Custom(regex.as_str().to_string()))
    }

    fn check_path(&self, token: &str) -> Option<DenyRule> {
        if token.is_empty() {
            return None;
        }

        let lowered = token.to_lowercase();
        if lowered == "/dev" || lowered.starts_with("/dev/") || token.starts_with(r"\\.\") || token.starts_with(r"\\?\") {
            return Some(DenyRule::DevicePath(token.to_string()));
        }

        if token.starts_with('~') {
            return Some(DenyRule::HomeExpansion(token.to_string()));
        }

        if token.split(['/', '\\']).any(|component| component == "..") {
            return Some(DenyRule::Traversal(token.to_string()));
        }

        if self.is_absolute(token) && !self.under_permitted_root(token) {
            return Some(DenyRule::OutsidePermittedRoots(token.to_string()));
        }

        None
    }

    fn is_absolute(&self, token: &str) -> bool {
        match self.os {
            OsFamily::Unix => token.starts_with('/'),
            OsFamily::Windows => {
                if WINDOWS_SWITCH.is_match(token) || WINDOWS_VOLUME.is_match(token) {
                    return false;
                }
                WINDOWS_DRIVE_PATH.is_match(token) || token.starts_with('/') || token.starts_with('\\')
            }
        }
    }

    fn under_permitted_root(&self, token: &str) -> bool {
        let path = self.normalize_path(token);
        self.permitted_roots.iter().any(|root| {
            root == "/" || path == *root || path.starts_with(&format!("{}/", root))
        })
    }

    /// Forward slashes, no trailing separator, case-folded on Windows
    fn normalize_path(&self, path: &str) -> String {
        let mut path = path.replace('\\', "/");
        if self.os == OsFamily::Windows {
            path = path.to_lowercase();
        }
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        path
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(OsFamily::current())
    }
}

/// Lowercased program name with `.exe` stripped; `None` for paths
fn normalize_program(program: &str) -> Option<String> {
    let program = program.trim();
    if program.is_empty() || program.contains('/') || program.contains('\\') {
        return None;
    }
    let lowered = program.to_lowercase();
    let name = lowered.strip_suffix(".exe").unwrap_or(&lowered);
    Some(name.to_string())
}

/// Value part of `--opt=value`, otherwise the token itself
fn path_part(arg: &str) -> &str {
    if arg.starts_with('-') {
        match arg.split_once('=') {
            Some((_, value)) => value,
            None => "",
        }
    } else {
        arg
    }
}

fn recursive_force(args: &[String]) -> Option<DenyRule> {
    let mut recursive = false;
    let mut force = false;
    let mut slash_s = false;
    let mut slash_q = false;

    for arg in args {
        let lowered = arg.to_lowercase();
        match lowered.as_str() {
            "--no-preserve-root" => return Some(DenyRule::NoPreserveRoot),
            "--recursive" => recursive = true,
            "--force" => force = true,
            "/s" => slash_s = true,
            "/q" => slash_q = true,
            _ => {}
        }

        if let Some(cluster) = arg.strip_prefix('-') {
            if !cluster.starts_with('-') {
                let letters: Vec<char> = cluster.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
                recursive |= letters.iter().any(|c| *c == 'r' || *c == 'R');
                force |= letters.contains(&'f');
            }
        }
    }

    if (recursive && force) || (slash_s && slash_q) {
        Some(DenyRule::RecursiveForce)
    } else {
        None
    }
}
