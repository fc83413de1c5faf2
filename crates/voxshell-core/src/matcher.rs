//! Utterance matcher
//!
//! Tidies an utterance, walks the library in declaration order and
//! extracts slot values for the first intent whose trigger matches. Triggers
//! and cue words match case-insensitively while slot values keep the case
//! they were spoken in. Pure: no state, safe to call from any thread.

use std::collections::BTreeMap;

use crate::intent::{CompiledIntent, IntentId, IntentLibrary, SlotRule, SlotSpec};

/// Slot name -> extracted value
pub type SlotValues = BTreeMap<String, String>;

/// Characters stripped from the end of a transcript
const TRAILING_PUNCTUATION: &[char] = &['。', '．', '.', '！', '!', '？', '?', '，', ',', '、'];

/// Quote characters stripped around slot values
const QUOTES: &[char] = &['"', '\'', '「', '」', '『', '』', '“', '”', '‘', '’'];

/// Successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMatch {
    pub intent: IntentId,
    pub slots: SlotValues,
}

/// Result of matching one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// An intent matched and all required slots were filled
    Matched(IntentMatch),
    /// An intent matched but a required slot came out empty
    MissingSlot { intent: IntentId, slot: String },
    /// No trigger matched
    NoMatch,
}

/// Case-fold, trim, collapse whitespace and drop trailing punctuation
pub fn normalize(text: &str) -> String {
    tidy(text).to_lowercase()
}

/// Trim, collapse whitespace and drop trailing punctuation, keeping case
pub fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
        .to_string()
}

/// Match an utterance against the library
pub fn match_utterance(library: &IntentLibrary, utterance: &str) -> MatchOutcome {
    let text = tidy(utterance);
    if text.is_empty() {
        return MatchOutcome::NoMatch;
    }

    for intent in library.iter() {
        let Some(captures) = intent
            .triggers()
            .iter()
            .find_map(|trigger| trigger.captures(&text))
        else {
            continue;
        };

        tracing::debug!(intent = %intent.id(), "Trigger matched: {}", text);
        return extract_slots(intent, &text, &captures);
    }

    tracing::debug!("No intent matched: {}", text);
    MatchOutcome::NoMatch
}

fn extract_slots(
    intent: &CompiledIntent,
    text: &str,
    captures: &BTreeMap<String, String>,
) -> MatchOutcome {
    let mut slots = SlotValues::new();
    for spec in &intent.definition.slots {
        match extract_slot(spec, text, captures) {
            Some(value) => {
                slots.insert(spec.name.clone(), value);
            }
            None if spec.required => {
                return MatchOutcome::MissingSlot {
                    intent: intent.id(),
                    slot: spec.name.clone(),
                };
            }
            None => {}
        }
    }

    MatchOutcome::Matched(IntentMatch {
        intent: intent.id(),
        slots,
    })
}

fn extract_slot(
    spec: &SlotSpec,
    text: &str,
    captures: &BTreeMap<String, String>,
) -> Option<String> {
    spec.rules
        .iter()
        .find_map(|rule| apply_rule(rule, text, captures))
        .or_else(|| spec.default.clone().filter(|value| !value.is_empty()))
}

fn apply_rule(rule: &SlotRule, text: &str, captures: &BTreeMap<String, String>) -> Option<String> {
    match rule {
        SlotRule::Capture { group } => captures.get(group).and_then(|v| clean(v)),
        SlotRule::Between { after, before } => after.iter().find_map(|cue| {
            let (_, start) = find_folded(text, cue)?;
            let rest = &text[start..];
            let end = before
                .iter()
                .filter_map(|stop| find_folded(rest, stop).map(|(at, _)| at))
                .min()
                .unwrap_or(rest.len());
            clean(&rest[..end])
        }),
        SlotRule::After { cues } => {
            let tokens: Vec<&str> = text.split(' ').collect();
            tokens.windows(2).find_map(|pair| {
                if cues.iter().any(|cue| cue.to_lowercase() == pair[0].to_lowercase()) {
                    clean(pair[1])
                } else {
                    None
                }
            })
        }
        SlotRule::Position { index } => text.split(' ').nth(*index).and_then(clean),
        SlotRule::Keyword { choices } => {
            let folded = text.to_lowercase();
            choices
                .iter()
                .find(|choice| {
                    choice
                        .keywords
                        .iter()
                        .any(|keyword| folded.contains(keyword.to_lowercase().as_str()))
                })
                .map(|choice| choice.value.clone())
        }
    }
}

/// Byte range of the first case-insensitive occurrence of `needle` in `haystack`
fn find_folded(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    haystack.char_indices().find_map(|(start, _)| {
        let mut expected = needle.iter();
        for (offset, c) in haystack[start..].char_indices() {
            for lower in c.to_lowercase() {
                if expected.next() != Some(&lower) {
                    return None;
                }
            }
            if expected.len() == 0 {
                return Some((start, start + offset + c.len_utf8()));
            }
        }
        None
    })
}

fn clean(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches(QUOTES).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl IntentLibrary {
    /// Convenience wrapper around [`match_utterance`]
    pub fn match_utterance(&self, utterance: &str) -> MatchOutcome {
        match_utterance(self, utterance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> IntentLibrary {
        IntentLibrary::builtin().unwrap()
    }

    fn matched(outcome: MatchOutcome) -> IntentMatch {
        match outcome {
            MatchOutcome::Matched(m) => m,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  List   FILES please。"), "list files please");
        assert_eq!(normalize("建立一個叫做  Test  的資料夾！"), "建立一個叫做 test 的資料夾");
        assert_eq!(normalize("\t\n"), "");
    }

    #[test]
    fn test_create_folder_chinese() {
        let m = matched(builtin().match_utterance("建立一個叫做 test 的資料夾"));
        assert_eq!(m.intent, IntentId::CreateFolder);
        assert_eq!(m.slots.get("name").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_create_folder_without_spaces() {
        let m = matched(builtin().match_utterance("建立一個叫做項目文檔的資料夾"));
        assert_eq!(m.intent, IntentId::CreateFolder);
        assert_eq!(m.slots["name"], "項目文檔");
    }

    #[test]
    fn test_create_folder_english_and_quotes() {
        let m = matched(builtin().match_utterance("Create a folder named \"reports\""));
        assert_eq!(m.intent, IntentId::CreateFolder);
        assert_eq!(m.slots["name"], "reports");
    }

    #[test]
    fn test_missing_required_slot_fails_match() {
        let outcome = builtin().match_utterance("建立一個資料夾");
        assert_eq!(
            outcome,
            MatchOutcome::MissingSlot {
                intent: IntentId::CreateFolder,
                slot: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_copy_extracts_two_slots() {
        let m = matched(builtin().match_utterance("複製 notes.txt 到 backup"));
        assert_eq!(m.intent, IntentId::CopyFile);
        assert_eq!(m.slots["source"], "notes.txt");
        assert_eq!(m.slots["destination"], "backup");

        let m = matched(builtin().match_utterance("copy a.txt to b.txt"));
        assert_eq!(m.intent, IntentId::CopyFile);
        assert_eq!(m.slots["source"], "a.txt");
        assert_eq!(m.slots["destination"], "b.txt");
    }

    #[test]
    fn test_optional_slot_absent() {
        let m = matched(builtin().match_utterance("列出所有檔案"));
        assert_eq!(m.intent, IntentId::ListFiles);
        assert!(m.slots.get("path").is_none());
    }

    #[test]
    fn test_keyword_slot() {
        let m = matched(builtin().match_utterance("強制刪除根目錄"));
        assert_eq!(m.intent, IntentId::PurgeDirectory);
        assert_eq!(m.slots["target"], "/");
    }

    #[test]
    fn test_first_match_wins() {
        // "強制刪除" also satisfies the folder-removal trigger, which is declared later
        let m = matched(builtin().match_utterance("強制刪除 build 整個資料夾"));
        assert_eq!(m.intent, IntentId::PurgeDirectory);
        assert_eq!(m.slots["target"], "build");
    }

    #[test]
    fn test_no_match() {
        assert_eq!(builtin().match_utterance("幫我訂一張機票"), MatchOutcome::NoMatch);
        assert_eq!(builtin().match_utterance("   "), MatchOutcome::NoMatch);
    }

    #[test]
    fn test_slot_values_keep_their_case() {
        let m = matched(builtin().match_utterance("Move Report.txt to Archive"));
        assert_eq!(m.intent, IntentId::MoveFile);
        assert_eq!(m.slots["source"], "Report.txt");
        assert_eq!(m.slots["destination"], "Archive");

        let m = matched(builtin().match_utterance("建立一個叫做 MyDocs 的資料夾"));
        assert_eq!(m.slots["name"], "MyDocs");
    }

    #[test]
    fn test_cues_match_case_insensitively() {
        let rule = SlotRule::Between {
            after: vec!["named".to_string()],
            before: vec![" please".to_string()],
        };
        let caps = BTreeMap::new();
        assert_eq!(
            apply_rule(&rule, "folder NAMED Q3 Reports PLEASE", &caps),
            Some("Q3 Reports".to_string())
        );

        let rule = SlotRule::After {
            cues: vec!["into".to_string()],
        };
        assert_eq!(apply_rule(&rule, "go INTO Src", &caps), Some("Src".to_string()));
    }

    #[test]
    fn test_find_folded() {
        assert_eq!(find_folded("List Files", "files"), Some((5, 10)));
        assert_eq!(find_folded("建立 Test", "test"), Some((7, 11)));
        assert_eq!(find_folded("abc", "x"), None);
    }

    #[test]
    fn test_current_directory_listing_is_a_listing() {
        for utterance in ["list files in the current directory", "show files of current directory", "List all files in the current folder"] {
            let m = matched(builtin().match_utterance(utterance));
            assert_eq!(m.intent, IntentId::ListFiles, "{}", utterance);
            assert_eq!(m.slots["path"], ".", "{}", utterance);
        }

        let m = matched(builtin().match_utterance("show files in docs"));
        assert_eq!(m.slots["path"], "docs");

        for utterance in ["show the current directory", "where am i", "current folder"] {
            let m = matched(builtin().match_utterance(utterance));
            assert_eq!(m.intent, IntentId::CurrentDirectory, "{}", utterance);
        }
    }

    #[test]
    fn test_position_rule() {
        let rule = SlotRule::Position { index: 1 };
        let caps = BTreeMap::new();
        assert_eq!(apply_rule(&rule, "cd src now", &caps), Some("src".to_string()));
        assert_eq!(apply_rule(&rule, "cd", &caps), None);
    }

    #[test]
    fn test_between_without_closing_cue_runs_to_end() {
        let rule = SlotRule::Between {
            after: vec!["named".to_string()],
            before: Vec::new(),
        };
        let caps = BTreeMap::new();
        assert_eq!(
            apply_rule(&rule, "folder named quarterly reports", &caps),
            Some("quarterly reports".to_string())
        );
    }
}
