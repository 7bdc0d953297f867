//! Incremental "typing" reveal of a reply.
//!
//! The cursor is pure; [`reveal_stream`] paces it on a tokio task and the
//! display sink pulls frames from the channel at its own speed.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::constants;

/// The text revealed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub text: String,
    pub done: bool,
}

impl Frame {
    /// The frame as it should appear, with a caret while still typing.
    pub fn render(&self) -> String {
        if self.done {
            self.text.clone()
        } else {
            format!("{}{}", self.text, constants::TYPING_CARET)
        }
    }
}

/// Yields growing prefixes of `text`, `step` characters at a time, ending
/// with a single `done` frame holding the full text.
#[derive(Debug, Clone)]
pub struct RevealCursor {
    text: String,
    step: usize,
    // Byte offset of the revealed prefix.
    pos: usize,
    finished: bool,
}

impl RevealCursor {
    pub fn new(text: impl Into<String>, step: usize) -> Self {
        Self {
            text: text.into(),
            step: step.max(1),
            pos: 0,
            finished: false,
        }
    }
}

impl Iterator for RevealCursor {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        let advance: usize = self.text[self.pos..]
            .chars()
            .take(self.step)
            .map(char::len_utf8)
            .sum();
        self.pos += advance;
        let done = self.pos >= self.text.len();
        self.finished = done;
        Some(Frame {
            text: self.text[..self.pos].to_string(),
            done,
        })
    }
}

/// Spawns a producer that sends one frame per `delay`. Dropping the receiver
/// stops the producer.
pub fn reveal_stream(text: impl Into<String>, step: usize, delay: Duration) -> mpsc::Receiver<Frame> {
    let (tx, rx) = mpsc::channel(16);
    let cursor = RevealCursor::new(text, step);
    tokio::spawn(async move {
        for frame in cursor {
            let done = frame.done;
            if tx.send(frame).await.is_err() {
                debug!("Reveal consumer went away");
                return;
            }
            if !done && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    });
    rx
}
