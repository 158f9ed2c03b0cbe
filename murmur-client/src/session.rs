//! Chat session: send, receive and reconnection supervisor
//!
//! The three activities run on their own threads and never call into each
//! other. Everything they need to agree on goes through [`SessionState`]:
//! a failing send or receive clears `connected`, the supervisor notices and
//! dials again, and an `exit` from the user (or an exhausted retry budget)
//! sets `exit_requested`, which every loop checks at least once per poll
//! interval.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use murmur_protocol::{decode, MAX_FRAME_SIZE};
use murmur_utils::{MurmurError, Result};

use crate::config::ClientConfig;
use crate::connection::{ConnectionState, Dialer, SessionState};
use crate::handler::{format_incoming, MessageHandler, SessionEvent};
use crate::history::HistoryWriter;

/// Input line that ends the session
pub const EXIT_COMMAND: &str = "exit";

/// Everything the activities share
struct Activity {
    state: Arc<SessionState>,
    dialer: Arc<dyn Dialer>,
    handler: Mutex<Box<dyn MessageHandler>>,
    history: Arc<HistoryWriter>,
    max_retries: u32,
    retry_interval: Duration,
    poll_interval: Duration,
}

impl Activity {
    fn notify(&self, event: SessionEvent) {
        self.handler.lock().on_event(&event);
    }

    /// Sleep for `duration`, waking early on exit
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.state.exit_requested() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = self
            .dialer
            .dial()
            .map_err(|e| MurmurError::connection(format!("Connection failed: {}", e)))?;
        stream
            .set_nonblocking(true)
            .map_err(|e| MurmurError::connection(format!("Failed to set non-blocking: {}", e)))?;
        Ok(stream)
    }

    /// Write one line, retrying the same bytes while the socket would block
    fn send_line(&self, line: &str) -> Result<()> {
        let stream = match self.state.current_stream() {
            Some(stream) if self.state.is_connected() => stream,
            _ => return Err(MurmurError::NotConnected),
        };

        let mut remaining = line.as_bytes();
        while !remaining.is_empty() {
            match (&*stream).write(remaining) {
                Ok(0) => {
                    self.state.mark_lost(&stream);
                    return Err(MurmurError::ConnectionClosed);
                }
                Ok(n) => remaining = &remaining[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.state.exit_requested() {
                        return Err(MurmurError::ConnectionClosed);
                    }
                    self.notify(SessionEvent::SendBufferFull);
                    thread::sleep(self.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.state.mark_lost(&stream);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    fn deliver(&self, data: &[u8]) {
        let frame = match decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Discarding frame: {}", e);
                return;
            }
        };

        let line = format_incoming(&frame);
        self.handler.lock().handle(&line);
        self.history.append(&line);
    }
}

/// Stdin to socket
fn send_loop(activity: Arc<Activity>, input: Receiver<String>) {
    let state = &activity.state;

    while !state.exit_requested() {
        let line = match input.recv_timeout(activity.poll_interval) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Input closed, leaving");
                state.request_exit();
                break;
            }
        };

        if line == EXIT_COMMAND {
            info!("Exit requested");
            state.request_exit();
            break;
        }

        if line.is_empty() {
            continue;
        }

        match activity.send_line(&line) {
            Ok(()) => activity.history.append(&line),
            Err(e) => warn!("Send failed, message dropped: {}", e),
        }
    }

    debug!("Send activity stopped");
}

/// Socket to display and history
fn receive_loop(activity: Arc<Activity>) {
    let state = &activity.state;
    let mut buf = vec![0u8; MAX_FRAME_SIZE];

    while !state.exit_requested() {
        let stream = match state.current_stream() {
            Some(stream) if state.is_connected() => stream,
            _ => {
                thread::sleep(activity.poll_interval);
                continue;
            }
        };

        match (&*stream).read(&mut buf) {
            Ok(0) => {
                if state.exit_requested() {
                    break;
                }
                // a socket the supervisor already replaced reads as closed too
                let current = state
                    .current_stream()
                    .is_some_and(|s| Arc::ptr_eq(&s, &stream));
                if current {
                    activity.notify(SessionEvent::ServerClosed);
                    state.mark_lost(&stream);
                }
            }
            Ok(n) => activity.deliver(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(activity.poll_interval);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Receive failed: {}", e);
                state.mark_lost(&stream);
            }
        }
    }

    debug!("Receive activity stopped");
}

/// Detects a lost connection and dials again within the retry budget
fn supervise(activity: Arc<Activity>) {
    let state = &activity.state;
    let mut ever_connected = false;

    while !state.exit_requested() {
        if state.is_connected() {
            thread::sleep(activity.poll_interval);
            continue;
        }

        let failures = state.retry_count();
        if failures >= activity.max_retries {
            error!("Giving up after {} failed connection attempts", failures);
            activity.notify(SessionEvent::RetriesExhausted);
            state.request_exit();
            break;
        }

        if ever_connected || failures > 0 {
            activity.notify(SessionEvent::Reconnecting {
                attempt: failures + 1,
                max: activity.max_retries,
            });
        }

        if state.exit_requested() {
            break;
        }

        state.tear_down();
        match activity.connect() {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                if !state.install(stream) {
                    debug!("Exit requested while dialing, dropping new connection");
                    break;
                }
                if let Some(addr) = peer {
                    info!("Connected to {}", addr);
                }
                activity.notify(if ever_connected {
                    SessionEvent::Reconnected
                } else {
                    SessionEvent::Connected
                });
                ever_connected = true;
            }
            Err(e) => {
                if state.exit_requested() {
                    break;
                }
                let failures = state.record_failed_attempt();
                warn!("Attempt {} failed: {}", failures, e);
                activity.notify(SessionEvent::ConnectFailed(e.to_string()));
                activity.pause(activity.retry_interval);
            }
        }
    }

    // exit wins: the socket is released whatever the reason for stopping
    state.tear_down();
    debug!("Supervisor stopped");
}

/// Handle for requesting shutdown from outside the session
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<SessionState>,
}

impl SessionHandle {
    pub fn request_exit(&self) {
        self.state.request_exit();
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn retry_count(&self) -> u32 {
        self.state.retry_count()
    }
}

/// A running chat session
pub struct ChatSession {
    state: Arc<SessionState>,
    threads: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Start the supervisor, send and receive activities
    ///
    /// The session starts disconnected; the supervisor makes the first
    /// connection attempt, which counts against the retry budget like any
    /// other.
    pub fn start(
        config: &ClientConfig,
        dialer: Arc<dyn Dialer>,
        input: Receiver<String>,
        handler: Box<dyn MessageHandler>,
        history: Arc<HistoryWriter>,
    ) -> Result<Self> {
        let state = Arc::new(SessionState::new());
        let activity = Arc::new(Activity {
            state: Arc::clone(&state),
            dialer,
            handler: Mutex::new(handler),
            history,
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
            poll_interval: config.poll_interval(),
        });

        let mut threads = Vec::with_capacity(3);
        let spawned = spawn_activity("supervisor", &activity, supervise)
            .and_then(|t| {
                threads.push(t);
                spawn_activity("receive", &activity, receive_loop)
            })
            .and_then(|t| {
                threads.push(t);
                let activity = Arc::clone(&activity);
                thread::Builder::new()
                    .name("send".into())
                    .spawn(move || send_loop(activity, input))
                    .map_err(MurmurError::from)
            });

        match spawned {
            Ok(t) => threads.push(t),
            Err(e) => {
                // stop whatever did start before reporting
                state.request_exit();
                for t in threads {
                    let _ = t.join();
                }
                return Err(e);
            }
        }

        Ok(Self { state, threads })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    /// Wait for all activities to stop
    pub fn join(self) -> Result<ConnectionState> {
        let mut panicked = 0;
        for t in self.threads {
            if t.join().is_err() {
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(MurmurError::internal(format!(
                "{} session thread(s) panicked",
                panicked
            )));
        }

        Ok(self.state.state())
    }
}

fn spawn_activity(
    name: &str,
    activity: &Arc<Activity>,
    body: fn(Arc<Activity>),
) -> Result<JoinHandle<()>> {
    let activity = Arc::clone(activity);
    Ok(thread::Builder::new()
        .name(name.into())
        .spawn(move || body(activity))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc::{self, Sender};

    /// Fails a set number of times, then connects to a local listener
    struct FlakyDialer {
        failures: u32,
        attempts: AtomicU32,
        target: std::net::SocketAddr,
    }

    impl FlakyDialer {
        fn new(failures: u32, target: std::net::SocketAddr) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                target,
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Dialer for FlakyDialer {
        fn dial(&self) -> io::Result<TcpStream> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            TcpStream::connect(self.target)
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        lines: Arc<Mutex<Vec<String>>>,
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl MessageHandler for Recorder {
        fn handle(&mut self, line: &str) {
            self.lines.lock().push(line.to_string());
        }

        fn on_event(&mut self, event: &SessionEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig {
            max_retries: 5,
            retry_interval_ms: 10,
            poll_interval_ms: 5,
            ..ClientConfig::default()
        }
    }

    fn history(dir: &tempfile::TempDir) -> Arc<HistoryWriter> {
        Arc::new(HistoryWriter::new(dir.path().join("message.txt"), 1024, 1).unwrap())
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    struct Harness {
        session: ChatSession,
        input: Sender<String>,
        dialer: Arc<FlakyDialer>,
        recorder: Recorder,
        listener: TcpListener,
        _dir: tempfile::TempDir,
    }

    fn start(failures: u32) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dialer = Arc::new(FlakyDialer::new(failures, listener.local_addr().unwrap()));
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let (input, rx) = mpsc::channel();

        let session = ChatSession::start(
            &fast_config(),
            dialer.clone(),
            rx,
            Box::new(recorder.clone()),
            history(&dir),
        )
        .unwrap();

        Harness {
            session,
            input,
            dialer,
            recorder,
            listener,
            _dir: dir,
        }
    }

    #[test]
    fn test_connects_after_transient_failures() {
        for failures in 0..5 {
            let h = start(failures);

            assert!(wait_for(|| h.session.state() == ConnectionState::Connected));
            assert_eq!(h.session.handle().retry_count(), 0);
            assert_eq!(h.dialer.attempts(), failures + 1);

            h.input.send(EXIT_COMMAND.into()).unwrap();
            assert_eq!(h.session.join().unwrap(), ConnectionState::Terminated);
        }
    }

    #[test]
    fn test_terminates_after_retry_ceiling() {
        let h = start(u32::MAX);

        let state = h.session.join().unwrap();

        assert_eq!(state, ConnectionState::Terminated);
        assert_eq!(h.dialer.attempts(), 5);
        let events = h.recorder.events.lock();
        assert!(!events.contains(&SessionEvent::Connected));
        assert_eq!(events.last(), Some(&SessionEvent::RetriesExhausted));
    }

    #[test]
    fn test_exit_does_not_trigger_reconnect() {
        let h = start(0);
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        h.input.send(EXIT_COMMAND.into()).unwrap();
        let state = h.session.join().unwrap();

        assert_eq!(state, ConnectionState::Terminated);
        assert_eq!(h.dialer.attempts(), 1);
        assert!(!h
            .recorder
            .events
            .lock()
            .iter()
            .any(|e| matches!(e, SessionEvent::Reconnecting { .. })));
    }

    #[test]
    fn test_end_of_input_exits() {
        let h = start(0);
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        drop(h.input);
        assert_eq!(h.session.join().unwrap(), ConnectionState::Terminated);
    }

    #[test]
    fn test_peer_close_triggers_reconnect() {
        let h = start(0);
        let (first, _) = h.listener.accept().unwrap();
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        drop(first);

        let (_second, _) = h.listener.accept().unwrap();
        assert!(wait_for(|| h.dialer.attempts() == 2));
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        let events = h.recorder.events.lock().clone();
        assert!(events.contains(&SessionEvent::ServerClosed));
        assert!(events.contains(&SessionEvent::Reconnecting { attempt: 1, max: 5 }));

        h.input.send(EXIT_COMMAND.into()).unwrap();
        h.session.join().unwrap();
    }

    #[test]
    fn test_sent_lines_reach_peer_and_history() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dialer = Arc::new(FlakyDialer::new(0, listener.local_addr().unwrap()));
        let dir = tempfile::tempdir().unwrap();
        let history = history(&dir);
        let (input, rx) = mpsc::channel();

        let session = ChatSession::start(
            &fast_config(),
            dialer,
            rx,
            Box::new(Recorder::default()),
            Arc::clone(&history),
        )
        .unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        assert!(wait_for(|| session.state() == ConnectionState::Connected));

        input.send("hello".into()).unwrap();
        let mut buf = [0u8; 16];
        let n = peer.read(&mut buf).unwrap();
        // the client sends raw bytes; the relay adds the sender id
        assert_eq!(&buf[..n], b"hello");

        input.send(EXIT_COMMAND.into()).unwrap();
        session.join().unwrap();
        history.shutdown().unwrap();

        let saved = std::fs::read_to_string(dir.path().join("message.txt")).unwrap();
        assert_eq!(saved, "hello\n");
    }

    #[test]
    fn test_incoming_frames_are_displayed_and_logged() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dialer = Arc::new(FlakyDialer::new(0, listener.local_addr().unwrap()));
        let dir = tempfile::tempdir().unwrap();
        let history = history(&dir);
        let recorder = Recorder::default();
        let (input, rx) = mpsc::channel();

        let session = ChatSession::start(
            &fast_config(),
            dialer,
            rx,
            Box::new(recorder.clone()),
            Arc::clone(&history),
        )
        .unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        assert!(wait_for(|| session.state() == ConnectionState::Connected));

        peer.write_all(&[0, 0, 0, 7, b'h', b'i']).unwrap();
        assert!(wait_for(|| !recorder.lines.lock().is_empty()));
        assert_eq!(recorder.lines.lock()[0], "          user 7: hi");

        input.send(EXIT_COMMAND.into()).unwrap();
        session.join().unwrap();
        history.shutdown().unwrap();

        let saved = std::fs::read_to_string(dir.path().join("message.txt")).unwrap();
        assert_eq!(saved, "          user 7: hi\n");
    }

    /// Blocks inside `dial` until released
    struct GatedDialer {
        entered: AtomicU32,
        release: Mutex<Receiver<()>>,
        target: std::net::SocketAddr,
    }

    impl Dialer for GatedDialer {
        fn dial(&self) -> io::Result<TcpStream> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.lock().recv();
            TcpStream::connect(self.target)
        }
    }

    #[test]
    fn test_exit_during_dial_keeps_session_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (release, gate) = mpsc::channel();
        let dialer = Arc::new(GatedDialer {
            entered: AtomicU32::new(0),
            release: Mutex::new(gate),
            target: listener.local_addr().unwrap(),
        });
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let (input, rx) = mpsc::channel();

        let session = ChatSession::start(
            &fast_config(),
            dialer.clone(),
            rx,
            Box::new(recorder.clone()),
            history(&dir),
        )
        .unwrap();
        let state = Arc::clone(&session.state);

        assert!(wait_for(|| dialer.entered.load(Ordering::SeqCst) == 1));
        input.send(EXIT_COMMAND.into()).unwrap();
        assert!(wait_for(|| state.exit_requested()));

        release.send(()).unwrap();
        assert_eq!(session.join().unwrap(), ConnectionState::Terminated);

        assert!(!state.is_connected());
        assert!(state.current_stream().is_none());
        assert!(!recorder.events.lock().contains(&SessionEvent::Connected));

        // the dialed socket was dropped rather than kept
        let (mut accepted, _) = listener.accept().unwrap();
        accepted.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(accepted.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_full_send_buffer_retries_same_bytes() {
        const LEN: usize = 32 * 1024 * 1024;

        let h = start(0);
        let (mut peer, _) = h.listener.accept().unwrap();
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        // more than the socket buffers on both ends can hold while unread
        h.input.send("x".repeat(LEN)).unwrap();
        assert!(wait_for(|| h
            .recorder
            .events
            .lock()
            .contains(&SessionEvent::SendBufferFull)));

        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        while total < LEN {
            let n = peer.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed after {} bytes", total);
            assert!(buf[..n].iter().all(|&b| b == b'x'));
            total += n;
        }
        assert_eq!(total, LEN);

        h.input.send(EXIT_COMMAND.into()).unwrap();
        assert_eq!(h.session.join().unwrap(), ConnectionState::Terminated);
    }

    #[test]
    fn test_short_frame_is_discarded() {
        let h = start(0);
        let (mut peer, _) = h.listener.accept().unwrap();
        assert!(wait_for(|| h.session.state() == ConnectionState::Connected));

        peer.write_all(&[0, 7]).unwrap();
        thread::sleep(Duration::from_millis(100));
        peer.write_all(&[0, 0, 0, 7, b'o', b'k']).unwrap();

        assert!(wait_for(|| !h.recorder.lines.lock().is_empty()));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*h.recorder.lines.lock(), vec!["          user 7: ok".to_string()]);
        assert_eq!(h.session.state(), ConnectionState::Connected);

        h.input.send(EXIT_COMMAND.into()).unwrap();
        h.session.join().unwrap();
    }
}
