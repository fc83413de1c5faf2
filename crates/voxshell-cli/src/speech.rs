//! Speech collaborators
//!
//! Speech recognition and synthesis live outside this crate. The loop only
//! sees a source of recognized utterances and a sink for reply text.

use anyhow::Result;
use colored::Colorize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::Instant;

/// Produces one recognized utterance per turn
#[async_trait::async_trait]
pub trait UtteranceSource: Send + std::fmt::Debug {
    /// Next utterance, `None` once the input is closed
    ///
    /// Must be cancel-safe: the loop races it against the confirmation
    /// deadline and may drop the future.
    async fn next_utterance(&mut self) -> Result<Option<String>>;
}

/// Speaks reply text back to the user
#[async_trait::async_trait]
pub trait SpeechSink: Send + std::fmt::Debug {
    async fn speak(&mut self, text: &str) -> Result<()>;
}

/// Reads utterances line by line from standard input
#[derive(Debug)]
pub struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UtteranceSource for StdinSource {
    async fn next_utterance(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}

/// Prints replies to the terminal
#[derive(Debug, Default)]
pub struct ConsoleSink;

#[async_trait::async_trait]
impl SpeechSink for ConsoleSink {
    async fn speak(&mut self, text: &str) -> Result<()> {
        println!("{} {}", "🔊".cyan(), text.bold());
        Ok(())
    }
}

/// Replays a fixed list of utterances, optionally spaced out in time
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<(Duration, String)>,
    ready_at: Option<Instant>,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = Self::default();
        for line in lines {
            source = source.then(line);
        }
        source
    }

    pub fn then(mut self, line: impl Into<String>) -> Self {
        self.script.push_back((Duration::ZERO, line.into()));
        self
    }

    /// Deliver `line` only after `delay` has passed since it was first awaited
    pub fn then_after(mut self, delay: Duration, line: impl Into<String>) -> Self {
        self.script.push_back((delay, line.into()));
        self
    }
}

#[async_trait::async_trait]
impl UtteranceSource for ScriptedSource {
    async fn next_utterance(&mut self) -> Result<Option<String>> {
        let Some((delay, _)) = self.script.front() else {
            return Ok(None);
        };
        let delay = *delay;

        // The deadline survives cancellation so a dropped call does not restart the delay
        let ready_at = *self.ready_at.get_or_insert_with(|| Instant::now() + delay);
        tokio::time::sleep_until(ready_at).await;

        self.ready_at = None;
        Ok(self.script.pop_front().map(|(_, line)| line))
    }
}

/// Keeps every reply in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    spoken: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> &[String] {
        &self.spoken
    }
}

#[async_trait::async_trait]
impl SpeechSink for RecordingSink {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.push(text.to_string());
        Ok(())
    }
}
