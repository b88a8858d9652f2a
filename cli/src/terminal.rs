//! Stdout rendering of fusion cards and stdin prompts.

use std::collections::HashMap;
use std::io::{Write, stdout};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin, stdin};
use tokio::sync::Mutex as AsyncMutex;

use fusion_engine::{ChannelError, ChannelFut, MessageChannel, MessageId, RenderedView, Tone};
use fusion_types::Participant;

/// Stdin lines shared by the command loop and confirmation prompts.
pub type SharedInput = Arc<AsyncMutex<Lines<BufReader<Stdin>>>>;

pub fn shared_stdin() -> SharedInput {
    Arc::new(AsyncMutex::new(BufReader::new(stdin()).lines()))
}

fn tone_label(tone: Tone) -> &'static str {
    match tone {
        Tone::Pending => "[pending]",
        Tone::Success => "[done]",
        Tone::Danger => "[stopped]",
        Tone::Expired => "[expired]",
    }
}

/// Plain-text rendering of a card.
pub fn format_view(view: &RenderedView) -> String {
    let mut out = String::new();
    if let Some(content) = &view.content {
        out.push_str(content);
        out.push('\n');
    }
    out.push_str(&format!("== {} == {}\n", view.title, tone_label(view.tone)));
    out.push_str(&view.description);
    out.push('\n');
    for field in &view.fields {
        if field.is_padding() {
            continue;
        }
        out.push_str(&format!("\n{}\n", field.name));
        out.push_str(&field.value);
    }
    if let Some(footer) = &view.footer {
        out.push_str(&format!("\n-- {footer}\n"));
    }
    let actions = view
        .controls
        .surface
        .actions()
        .iter()
        .map(|action| format!("[{action}]"))
        .collect::<Vec<_>>()
        .join(" ");
    if view.controls.disabled {
        out.push_str(&format!("{actions} (closed)\n"));
    } else {
        out.push_str(&format!("{actions}\n"));
    }
    out
}

/// Channel that prints cards to stdout.
///
/// Refreshes that would print an identical card are skipped.
pub struct TerminalChannel {
    input: SharedInput,
    next_id: AtomicU64,
    shown: Mutex<HashMap<MessageId, RenderedView>>,
}

impl TerminalChannel {
    pub fn new(input: SharedInput) -> Self {
        Self {
            input,
            next_id: AtomicU64::new(1),
            shown: Mutex::default(),
        }
    }

    fn shown(&self) -> MutexGuard<'_, HashMap<MessageId, RenderedView>> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn print(text: &str) -> Result<(), ChannelError> {
    let mut out = stdout().lock();
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|err| ChannelError::Transport(err.to_string()))
}

impl MessageChannel for TerminalChannel {
    fn send(&self, view: RenderedView) -> ChannelFut<'_, MessageId> {
        Box::pin(async move {
            let id = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            print(&format!("\n{}", format_view(&view)))?;
            self.shown().insert(id, view);
            Ok(id)
        })
    }

    fn edit(&self, message: MessageId, view: RenderedView) -> ChannelFut<'_, ()> {
        Box::pin(async move {
            let changed = {
                let mut shown = self.shown();
                let previous = shown
                    .get_mut(&message)
                    .ok_or(ChannelError::UnknownMessage(message))?;
                let changed = *previous != view;
                *previous = view.clone();
                changed
            };
            if changed {
                print(&format!("\n{}", format_view(&view)))?;
            }
            Ok(())
        })
    }

    fn confirm<'a>(
        &'a self,
        participant: &'a Participant,
        prompt: &'a str,
    ) -> ChannelFut<'a, bool> {
        Box::pin(async move {
            print(&format!("{}: {prompt} [y/N] ", participant.name))?;
            let line = self
                .input
                .lock()
                .await
                .next_line()
                .await
                .map_err(|err| ChannelError::Transport(err.to_string()))?
                .ok_or(ChannelError::Closed)?;
            Ok(matches!(
                line.trim().to_ascii_lowercase().as_str(),
                "y" | "yes"
            ))
        })
    }
}
