//! User-visible notification sink.
//!
//! The cache reports load failures through this seam; the LSP backend routes
//! them to `window/showMessage`, the CLI discards them. Rate limiting lives
//! in the cache, not here.

use std::sync::Mutex;

use tower_lsp::Client;
use tower_lsp::lsp_types::MessageType;

/// Display a short user-visible message.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Sends notifications through the LSP client without blocking the caller.
pub struct ClientNotifier {
    client: Client,
}

impl ClientNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl NotificationSink for ClientNotifier {
    fn notify(&self, message: &str) {
        let client = self.client.clone();
        let message = message.to_string();
        tokio::spawn(async move {
            client.show_message(MessageType::WARNING, message).await;
        });
    }
}

/// Discards notifications; used by the CLI subcommands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl NotificationSink for NullNotifier {
    fn notify(&self, _message: &str) {}
}

/// Records notifications for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
    }
}
