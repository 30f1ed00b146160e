//! User-facing progress messages.

use parking_lot::Mutex;

/// Sink for progress lines shown to the operator.
pub trait UiService: Send + Sync {
    /// Show a message.
    fn send_message(&self, message: &str);
}

/// Writes messages to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUiService;

impl UiService for ConsoleUiService {
    fn send_message(&self, message: &str) {
        println!("{}", message);
    }
}

/// Discards messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentUiService;

impl UiService for SilentUiService {
    fn send_message(&self, _message: &str) {}
}

/// Keeps messages in memory.
#[derive(Debug, Default)]
pub struct BufferedUiService {
    messages: Mutex<Vec<String>>,
}

impl BufferedUiService {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl UiService for BufferedUiService {
    fn send_message(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
