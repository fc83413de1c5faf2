//! Interaction loop
//!
//! Pulls utterances from a source, runs them through the session and speaks
//! the reply. While a confirmation is pending the read is raced against the
//! deadline so an unanswered prompt expires on time.

use anyhow::Result;
use std::time::Instant;

use voxshell_core::{normalize, ReplyLanguage};

use crate::reply;
use crate::session::{Outcome, Session};
use crate::speech::{SpeechSink, UtteranceSource};

/// Words that end the loop when nothing is awaiting confirmation
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "bye", "離開", "退出", "再見"];

/// Counters reported when the loop ends
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub turns: usize,
    pub executed: usize,
    pub refused: usize,
    pub declined: usize,
}

impl LoopSummary {
    fn record(&mut self, outcome: &Outcome) {
        self.turns += 1;
        match outcome {
            Outcome::Executed { .. } | Outcome::DirectoryChanged { .. } => self.executed += 1,
            Outcome::Refused { .. } => self.refused += 1,
            Outcome::Declined { .. } => self.declined += 1,
            _ => {}
        }
    }
}

pub fn is_exit_word(utterance: &str) -> bool {
    let utterance = normalize(utterance);
    EXIT_WORDS.iter().any(|word| normalize(word) == utterance)
}

/// Run until the source closes or the user says an exit word
pub async fn run<S, K>(
    session: &mut Session,
    source: &mut S,
    sink: &mut K,
    language: ReplyLanguage,
) -> Result<LoopSummary>
where
    S: UtteranceSource + ?Sized,
    K: SpeechSink + ?Sized,
{
    let mut summary = LoopSummary::default();

    loop {
        let next = match session.deadline() {
            Some(deadline) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                match tokio::time::timeout_at(deadline, source.next_utterance()).await {
                    Ok(next) => next?,
                    Err(_) => {
                        if let Some(outcome) = session.expire(Instant::now()).await {
                            summary.record(&outcome);
                            sink.speak(&reply::render(&outcome, language)).await?;
                        }
                        continue;
                    }
                }
            }
            None => source.next_utterance().await?,
        };

        let Some(utterance) = next else {
            tracing::debug!("Input closed");
            break;
        };

        if !session.is_awaiting_confirmation() && is_exit_word(&utterance) {
            tracing::info!("Exit requested");
            break;
        }

        let outcome = session.handle(&utterance, Instant::now()).await;
        tracing::debug!(?outcome, "Turn complete");
        summary.record(&outcome);
        sink.speak(&reply::render(&outcome, language)).await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_words() {
        assert!(is_exit_word("exit"));
        assert!(is_exit_word(" 再見。"));
        assert!(!is_exit_word("exit now"));
        assert!(!is_exit_word("列出檔案"));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = LoopSummary::default();
        summary.record(&Outcome::NotUnderstood);
        summary.record(&Outcome::Silence);
        assert_eq!(summary.turns, 2);
        assert_eq!(summary.executed, 0);
    }
}
