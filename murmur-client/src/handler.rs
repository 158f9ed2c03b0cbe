//! Display of chat lines and session status

use std::io::Write;

use murmur_protocol::Frame;

/// Indentation marking lines that came from other users
pub const INCOMING_INDENT: &str = "          ";

/// Connection status changes worth showing to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Reconnecting { attempt: u32, max: u32 },
    Reconnected,
    ConnectFailed(String),
    ServerClosed,
    SendBufferFull,
    RetriesExhausted,
    HistoryUnavailable,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "(Connected to server)"),
            Self::Reconnecting { attempt, max } => {
                write!(f, "(Reconnecting ({}/{})...)", attempt, max)
            }
            Self::Reconnected => write!(f, "(Reconnected to server)"),
            Self::ConnectFailed(reason) => write!(f, "({})", reason),
            Self::ServerClosed => write!(f, "Server closed the connection."),
            Self::SendBufferFull => write!(f, "Send buffer full, retrying..."),
            Self::RetriesExhausted => write!(f, "(Max retries reached, exiting...)"),
            Self::HistoryUnavailable => write!(f, "(No chat history yet)"),
        }
    }
}

/// Trait for presenting what the session produces
pub trait MessageHandler: Send {
    /// Show one chat line
    fn handle(&mut self, line: &str);

    /// Called on connection status changes
    fn on_event(&mut self, _event: &SessionEvent) {}
}

/// Render an incoming frame as a display line
///
/// Trailing line terminators in the payload are dropped; the receiver
/// delimits lines itself.
pub fn format_incoming(frame: &Frame) -> String {
    let text = String::from_utf8_lossy(frame.payload());
    format!(
        "{}user {}: {}",
        INCOMING_INDENT,
        frame.sender(),
        text.trim_end_matches(&['\r', '\n', '\0'][..])
    )
}

/// Writes chat lines and status to standard output
#[derive(Debug, Default)]
pub struct StdoutHandler;

impl StdoutHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MessageHandler for StdoutHandler {
    fn handle(&mut self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }

    fn on_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::ConnectFailed(_) | SessionEvent::RetriesExhausted => {
                let _ = writeln!(std::io::stderr().lock(), "{}", event);
            }
            _ => {
                let _ = writeln!(std::io::stdout().lock(), "{}", event);
            }
        }
    }
}

/// Simple callback-based handler; status events are ignored
pub struct CallbackHandler<F>
where
    F: FnMut(&str) + Send,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(&str) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> MessageHandler for CallbackHandler<F>
where
    F: FnMut(&str) + Send,
{
    fn handle(&mut self, line: &str) {
        (self.callback)(line);
    }
}
