//! Intent library
//!
//! A static, ordered catalog of intent definitions: trigger patterns, slot
//! specs, per-OS command templates and the destructive flag. The catalog is
//! data, loaded from TOML (or JSON) at startup and never mutated afterwards.
//!
//! Library order is matching policy: the first intent whose trigger matches
//! wins, so more specific intents are declared before generic ones. Every
//! intent may list `examples`; loading fails if an example resolves to a
//! different intent, which catches triggers that shadow each other.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{LibraryError, ResultExt};
use crate::matcher::{self, MatchOutcome};

/// Built-in intent library shipped with the crate
pub const BUILTIN_LIBRARY: &str = include_str!("../intents.toml");

/// Identifier of a recognized request category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentId {
    CreateFolder,
    ListFiles,
    ChangeDirectory,
    CopyFile,
    MoveFile,
    DeleteFile,
    RemoveFolder,
    PurgeDirectory,
    CurrentDirectory,
    DiskUsage,
    SystemInfo,
    CurrentTime,
}

impl IntentId {
    /// Every intent id, in declaration order of the enum
    pub const ALL: [IntentId; 12] = [
        IntentId::CreateFolder,
        IntentId::ListFiles,
        IntentId::ChangeDirectory,
        IntentId::CopyFile,
        IntentId::MoveFile,
        IntentId::DeleteFile,
        IntentId::RemoveFolder,
        IntentId::PurgeDirectory,
        IntentId::CurrentDirectory,
        IntentId::DiskUsage,
        IntentId::SystemInfo,
        IntentId::CurrentTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentId::CreateFolder => "create_folder",
            IntentId::ListFiles => "list_files",
            IntentId::ChangeDirectory => "change_directory",
            IntentId::CopyFile => "copy_file",
            IntentId::MoveFile => "move_file",
            IntentId::DeleteFile => "delete_file",
            IntentId::RemoveFolder => "remove_folder",
            IntentId::PurgeDirectory => "purge_directory",
            IntentId::CurrentDirectory => "current_directory",
            IntentId::DiskUsage => "disk_usage",
            IntentId::SystemInfo => "system_info",
            IntentId::CurrentTime => "current_time",
        }
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target operating system family for command templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Linux, macOS and other POSIX systems
    Unix,
    /// Windows (cmd.exe conventions)
    Windows,
}

impl OsFamily {
    /// OS family of the running process
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Unix
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Unix => write!(f, "unix"),
            OsFamily::Windows => write!(f, "windows"),
        }
    }
}

impl std::str::FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unix" | "linux" | "macos" => Ok(OsFamily::Unix),
            "windows" | "win" => Ok(OsFamily::Windows),
            other => Err(format!("unknown OS family: {}", other)),
        }
    }
}

/// Trigger pattern as written in the library file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Phrase that must appear in the utterance, compared case-insensitively
    Phrase(String),
    /// Case-insensitive regular expression evaluated against the tidied utterance
    Regex(String),
}

/// One keyword alternative of a [`SlotRule::Keyword`] rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordChoice {
    /// Words that select this choice
    pub keywords: Vec<String>,
    /// Value assigned to the slot
    pub value: String,
}

/// Typed extraction rule for a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SlotRule {
    /// Named capture group of the trigger regex that matched
    Capture { group: String },
    /// Phrase between an opening cue and the earliest closing cue
    Between {
        after: Vec<String>,
        #[serde(default)]
        before: Vec<String>,
    },
    /// Whitespace token following a cue word
    After { cues: Vec<String> },
    /// Whitespace token at a fixed index
    Position { index: usize },
    /// Enumerated keyword mapped to a value
    Keyword { choices: Vec<KeywordChoice> },
}

/// Parameter slot of an intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Tried in order, the first non-empty value wins
    pub rules: Vec<SlotRule>,
}

/// Program plus argument template for one OS family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Slot names referenced by `{name}` placeholders in the arguments
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        for arg in &self.args {
            let mut rest = arg.as_str();
            while let Some(open) = rest.find('{') {
                let after = &rest[open + 1..];
                match after.find('}') {
                    Some(close) => {
                        names.push(after[..close].to_string());
                        rest = &after[close + 1..];
                    }
                    None => break,
                }
            }
        }
        names
    }
}

/// Templates keyed by OS family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix: Option<CommandTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<CommandTemplate>,
}

impl TemplateSet {
    /// Template for exactly this OS family, no fallback
    pub fn for_os(&self, os: OsFamily) -> Option<&CommandTemplate> {
        match os {
            OsFamily::Unix => self.unix.as_ref(),
            OsFamily::Windows => self.windows.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandTemplate> {
        self.unix.iter().chain(self.windows.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.unix.is_none() && self.windows.is_none()
    }
}

/// Declarative intent entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub id: IntentId,
    #[serde(default)]
    pub description: String,
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub slots: Vec<SlotSpec>,
    pub templates: TemplateSet,
    #[serde(default)]
    pub destructive: bool,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Compiled trigger
#[derive(Debug, Clone)]
pub enum Trigger {
    Phrase(String),
    Regex(Regex),
}

impl Trigger {
    fn compile(intent: IntentId, spec: &TriggerSpec) -> Result<Self, LibraryError> {
        match spec {
            TriggerSpec::Phrase(phrase) => {
                let phrase = matcher::normalize(phrase);
                if phrase.is_empty() {
                    return Err(LibraryError::InvalidPattern {
                        intent,
                        message: "empty phrase".to_string(),
                    });
                }
                Ok(Trigger::Phrase(phrase))
            }
            TriggerSpec::Regex(pattern) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(Trigger::Regex)
                .map_err(|e| LibraryError::InvalidPattern {
                    intent,
                    message: e.to_string(),
                }),
        }
    }

    /// Match against tidied text, returning named captures on success
    ///
    /// Captured values keep the case of `text`.
    pub fn captures(&self, text: &str) -> Option<BTreeMap<String, String>> {
        match self {
            Trigger::Phrase(phrase) => text
                .to_lowercase()
                .contains(phrase.as_str())
                .then(BTreeMap::new),
            Trigger::Regex(regex) => {
                let caps = regex.captures(text)?;
                let named = regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_string(), m.as_str().to_string()))
                    })
                    .collect();
                Some(named)
            }
        }
    }
}

/// Intent definition with its triggers compiled
#[derive(Debug, Clone)]
pub struct CompiledIntent {
    pub definition: IntentDefinition,
    triggers: Vec<Trigger>,
}

impl CompiledIntent {
    pub fn id(&self) -> IntentId {
        self.definition.id
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn is_destructive(&self) -> bool {
        self.definition.destructive
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LibraryFile {
    intents: Vec<IntentDefinition>,
}

/// Ordered, immutable intent catalog
#[derive(Debug, Clone)]
pub struct IntentLibrary {
    intents: Vec<CompiledIntent>,
}

impl IntentLibrary {
    /// Validate and compile definitions, keeping their order
    pub fn from_definitions(definitions: Vec<IntentDefinition>) -> Result<Self, LibraryError> {
        if definitions.is_empty() {
            return Err(LibraryError::Empty);
        }

        let mut seen = HashSet::new();
        let mut intents = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.id) {
                return Err(LibraryError::DuplicateId(definition.id));
            }
            Self::check_definition(&definition)?;

            let triggers = definition
                .triggers
                .iter()
                .map(|spec| Trigger::compile(definition.id, spec))
                .collect::<Result<Vec<_>, _>>()?;
            Self::check_capture_groups(&definition, &triggers)?;
            intents.push(CompiledIntent {
                definition,
                triggers,
            });
        }

        let library = Self { intents };
        library.check_examples()?;

        tracing::info!("Loaded {} intents", library.len());
        Ok(library)
    }

    fn check_definition(definition: &IntentDefinition) -> Result<(), LibraryError> {
        let id = definition.id;
        if definition.triggers.is_empty() {
            return Err(LibraryError::NoTrigger(id));
        }
        if definition.templates.is_empty() {
            return Err(LibraryError::NoTemplate(id));
        }

        let declared: HashSet<&str> = definition.slots.iter().map(|s| s.name.as_str()).collect();
        for template in definition.templates.iter() {
            let program = template.program.trim();
            if program.is_empty() || program.contains('{') || program.contains('}') {
                return Err(LibraryError::DynamicProgram {
                    intent: id,
                    program: template.program.clone(),
                });
            }
            for slot in template.placeholders() {
                if !declared.contains(slot.as_str()) {
                    return Err(LibraryError::UnknownPlaceholder { intent: id, slot });
                }
            }
        }
        Ok(())
    }

    /// Every `capture` rule must name a group of some regex trigger
    fn check_capture_groups(definition: &IntentDefinition, triggers: &[Trigger]) -> Result<(), LibraryError> {
        let groups: HashSet<&str> = triggers
            .iter()
            .filter_map(|trigger| match trigger {
                Trigger::Regex(regex) => Some(regex.capture_names().flatten()),
                Trigger::Phrase(_) => None,
            })
            .flatten()
            .collect();

        for slot in &definition.slots {
            for rule in &slot.rules {
                if let SlotRule::Capture { group } = rule {
                    if !groups.contains(group.as_str()) {
                        return Err(LibraryError::UnknownCaptureGroup {
                            intent: definition.id,
                            group: group.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Every example must resolve to its own intent under first-match-wins
    fn check_examples(&self) -> Result<(), LibraryError> {
        for intent in &self.intents {
            for example in &intent.definition.examples {
                let actual = match matcher::match_utterance(self, example) {
                    MatchOutcome::Matched(m) if m.intent == intent.id() => continue,
                    MatchOutcome::Matched(m) => m.intent.to_string(),
                    MatchOutcome::MissingSlot { intent, slot } => {
                        format!("{} (missing slot {})", intent, slot)
                    }
                    MatchOutcome::NoMatch => "no match".to_string(),
                };
                return Err(LibraryError::ShadowedExample {
                    intent: intent.id(),
                    example: example.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Parse a TOML library (`[[intents]]` array)
    pub fn from_toml_str(content: &str) -> Result<Self, LibraryError> {
        let file: LibraryFile = toml::from_str(content)?;
        Self::from_definitions(file.intents)
    }

    /// Parse a JSON library (`{"intents": [...]}`)
    pub fn from_json_str(content: &str) -> Result<Self, LibraryError> {
        let file: LibraryFile = serde_json::from_str(content)?;
        Self::from_definitions(file.intents)
    }

    /// The library embedded in the crate
    pub fn builtin() -> Result<Self, LibraryError> {
        Self::from_toml_str(BUILTIN_LIBRARY)
    }

    /// Load a library file; the format is picked by extension
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read intent library {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let library = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        library.with_context(|| format!("Invalid intent library {}", path.display()))
    }

    /// Serialize the definitions back to TOML
    pub fn to_toml_string(&self) -> Result<String, LibraryError> {
        let file = LibraryFile {
            intents: self.definitions().cloned().collect(),
        };
        toml::to_string_pretty(&file).map_err(|e| LibraryError::Parse(e.to_string()))
    }

    pub fn get(&self, id: IntentId) -> Option<&CompiledIntent> {
        self.intents.iter().find(|intent| intent.id() == id)
    }

    /// Intents in matching order
    pub fn iter(&self) -> impl Iterator<Item = &CompiledIntent> {
        self.intents.iter()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.intents.iter().map(|intent| &intent.definition)
    }

    pub fn ids(&self) -> Vec<IntentId> {
        self.intents.iter().map(|intent| intent.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder_intent() -> IntentDefinition {
        IntentDefinition {
            id: IntentId::CreateFolder,
            description: "建立資料夾".to_string(),
            triggers: vec![TriggerSpec::Phrase("make folder".to_string())],
            slots: vec![SlotSpec {
                name: "name".to_string(),
                required: true,
                default: None,
                rules: vec![SlotRule::After {
                    cues: vec!["folder".to_string()],
                }],
            }],
            templates: TemplateSet {
                unix: Some(CommandTemplate {
                    program: "mkdir".to_string(),
                    args: vec!["{name}".to_string()],
                }),
                windows: None,
            },
            destructive: false,
            examples: vec!["make folder reports".to_string()],
        }
    }

    #[test]
    fn test_builtin_library_loads() {
        let library = IntentLibrary::builtin().unwrap();
        assert!(!library.is_empty());

        // Every intent id has an entry in the shipped catalog
        for id in IntentId::ALL {
            assert!(library.get(id).is_some(), "missing builtin intent {}", id);
        }
    }

    #[test]
    fn test_builtin_order_is_most_specific_first() {
        let library = IntentLibrary::builtin().unwrap();
        let ids = library.ids();
        let pos = |id: IntentId| ids.iter().position(|i| *i == id).unwrap();

        assert!(pos(IntentId::PurgeDirectory) < pos(IntentId::RemoveFolder));
        assert!(pos(IntentId::RemoveFolder) < pos(IntentId::DeleteFile));
        assert!(pos(IntentId::CurrentDirectory) < pos(IntentId::ListFiles));
        assert_eq!(ids.last(), Some(&IntentId::CurrentTime));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let result = IntentLibrary::from_definitions(vec![folder_intent(), folder_intent()]);
        assert_eq!(
            result.unwrap_err(),
            LibraryError::DuplicateId(IntentId::CreateFolder)
        );
    }

    #[test]
    fn test_empty_library_rejected() {
        assert_eq!(
            IntentLibrary::from_definitions(Vec::new()).unwrap_err(),
            LibraryError::Empty
        );
        assert_eq!(
            IntentLibrary::from_toml_str("intents = []").unwrap_err(),
            LibraryError::Empty
        );
    }

    #[test]
    fn test_missing_template_rejected() {
        let mut intent = folder_intent();
        intent.templates = TemplateSet::default();
        assert_eq!(
            IntentLibrary::from_definitions(vec![intent]).unwrap_err(),
            LibraryError::NoTemplate(IntentId::CreateFolder)
        );
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut intent = folder_intent();
        intent.templates.unix = Some(CommandTemplate {
            program: "mkdir".to_string(),
            args: vec!["{folder}".to_string()],
        });
        let err = IntentLibrary::from_definitions(vec![intent]).unwrap_err();
        assert!(matches!(err, LibraryError::UnknownPlaceholder { ref slot, .. } if slot == "folder"));
    }

    #[test]
    fn test_unknown_capture_group_rejected() {
        let mut intent = folder_intent();
        intent.triggers = vec![TriggerSpec::Regex(r"make folder (?P<name>\S+)".to_string())];
        intent.slots[0].rules = vec![SlotRule::Capture {
            group: "nmae".to_string(),
        }];
        let err = IntentLibrary::from_definitions(vec![intent]).unwrap_err();
        assert!(matches!(err, LibraryError::UnknownCaptureGroup { ref group, .. } if group == "nmae"));
    }

    #[test]
    fn test_known_capture_group_accepted() {
        let mut intent = folder_intent();
        intent.triggers = vec![TriggerSpec::Regex(r"make folder (?P<name>\S+)".to_string())];
        intent.slots[0].rules = vec![SlotRule::Capture {
            group: "name".to_string(),
        }];
        let library = IntentLibrary::from_definitions(vec![intent]).unwrap();
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_dynamic_program_rejected() {
        let mut intent = folder_intent();
        intent.templates.unix = Some(CommandTemplate {
            program: "{name}".to_string(),
            args: Vec::new(),
        });
        let err = IntentLibrary::from_definitions(vec![intent]).unwrap_err();
        assert!(matches!(err, LibraryError::DynamicProgram { .. }));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut intent = folder_intent();
        intent.triggers = vec![TriggerSpec::Regex("(unclosed".to_string())];
        intent.examples.clear();
        let err = IntentLibrary::from_definitions(vec![intent]).unwrap_err();
        assert!(matches!(err, LibraryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_shadowed_example_rejected() {
        // A broad "list" trigger declared first swallows the folder example
        let greedy = IntentDefinition {
            id: IntentId::ListFiles,
            description: String::new(),
            triggers: vec![TriggerSpec::Phrase("folder".to_string())],
            slots: Vec::new(),
            templates: TemplateSet {
                unix: Some(CommandTemplate {
                    program: "ls".to_string(),
                    args: Vec::new(),
                }),
                windows: None,
            },
            destructive: false,
            examples: Vec::new(),
        };

        let err = IntentLibrary::from_definitions(vec![greedy, folder_intent()]).unwrap_err();
        assert_eq!(
            err,
            LibraryError::ShadowedExample {
                intent: IntentId::CreateFolder,
                example: "make folder reports".to_string(),
                actual: "list_files".to_string(),
            }
        );
    }

    #[test]
    fn test_toml_round_trip_preserves_order() {
        let library = IntentLibrary::builtin().unwrap();
        let text = library.to_toml_string().unwrap();
        let reloaded = IntentLibrary::from_toml_str(&text).unwrap();
        assert_eq!(library.ids(), reloaded.ids());
    }

    #[test]
    fn test_json_library() {
        let json = r#"{
            "intents": [{
                "id": "disk_usage",
                "triggers": [{"phrase": "disk usage"}],
                "templates": {"unix": {"program": "df", "args": ["-h"]}},
                "examples": ["show disk usage"]
            }]
        }"#;
        let library = IntentLibrary::from_json_str(json).unwrap();
        assert_eq!(library.ids(), vec![IntentId::DiskUsage]);
        assert!(!library.get(IntentId::DiskUsage).unwrap().is_destructive());
    }

    #[test]
    fn test_placeholders() {
        let template = CommandTemplate {
            program: "cp".to_string(),
            args: vec!["{source}".to_string(), "--target={destination}".to_string()],
        };
        assert_eq!(template.placeholders(), vec!["source", "destination"]);
    }

    #[test]
    fn test_os_family_parse() {
        assert_eq!("Linux".parse::<OsFamily>().unwrap(), OsFamily::Unix);
        assert_eq!("windows".parse::<OsFamily>().unwrap(), OsFamily::Windows);
        assert!("beos".parse::<OsFamily>().is_err());
    }
}
