//! Outbound message channel a session renders into.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use fusion_types::Participant;

use crate::view::RenderedView;

pub type ChannelFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message {0} no longer exists")]
    UnknownMessage(MessageId),
    #[error("channel closed")]
    Closed,
    #[error("channel transport failed: {0}")]
    Transport(String),
}

/// Where a session's card lives.
///
/// `send` posts the initial card, `edit` replaces it in place, and `confirm`
/// asks the participant a yes/no question privately.
pub trait MessageChannel: Send + Sync {
    fn send(&self, view: RenderedView) -> ChannelFut<'_, MessageId>;

    fn edit(&self, message: MessageId, view: RenderedView) -> ChannelFut<'_, ()>;

    fn confirm<'a>(&'a self, participant: &'a Participant, prompt: &'a str)
    -> ChannelFut<'a, bool>;
}

#[derive(Debug, Default)]
struct Recorded {
    messages: BTreeMap<MessageId, RenderedView>,
    edits: usize,
    prompts: Vec<String>,
}

/// Channel that keeps every card in memory.
///
/// Used by tests and by embedders that poll views instead of pushing them.
#[derive(Debug)]
pub struct MemoryChannel {
    recorded: Mutex<Recorded>,
    next_id: AtomicU64,
    confirm_answer: AtomicBool,
    fail_edits: AtomicBool,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self {
            recorded: Mutex::default(),
            next_id: AtomicU64::new(1),
            confirm_answer: AtomicBool::new(true),
            fail_edits: AtomicBool::new(false),
        }
    }
}

impl MemoryChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer given to every subsequent `confirm` prompt.
    pub fn set_confirm_answer(&self, answer: bool) {
        self.confirm_answer.store(answer, Ordering::SeqCst);
    }

    /// Make every subsequent `edit` fail with a transport error.
    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Latest state of the most recently sent card.
    #[must_use]
    pub fn last_view(&self) -> Option<RenderedView> {
        self.guard().messages.values().next_back().cloned()
    }

    #[must_use]
    pub fn view(&self, message: MessageId) -> Option<RenderedView> {
        self.guard().messages.get(&message).cloned()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.guard().messages.len()
    }

    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.guard().edits
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.guard().prompts.clone()
    }
}

impl MessageChannel for MemoryChannel {
    fn send(&self, view: RenderedView) -> ChannelFut<'_, MessageId> {
        Box::pin(async move {
            let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.guard().messages.insert(id, view);
            Ok(id)
        })
    }

    fn edit(&self, message: MessageId, view: RenderedView) -> ChannelFut<'_, ()> {
        Box::pin(async move {
            if self.fail_edits.load(Ordering::SeqCst) {
                return Err(ChannelError::Transport("edit rejected".to_string()));
            }
            let mut recorded = self.guard();
            let slot = recorded
                .messages
                .get_mut(&message)
                .ok_or(ChannelError::UnknownMessage(message))?;
            *slot = view;
            recorded.edits += 1;
            Ok(())
        })
    }

    fn confirm<'a>(
        &'a self,
        _participant: &'a Participant,
        prompt: &'a str,
    ) -> ChannelFut<'a, bool> {
        Box::pin(async move {
            self.guard().prompts.push(prompt.to_string());
            Ok(self.confirm_answer.load(Ordering::SeqCst))
        })
    }
}
