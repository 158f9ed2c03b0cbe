//! Chat history persistence
//!
//! [`HistoryWriter`] is a double-buffered, append-only writer. Producers
//! append lines into an in-memory active buffer under a short lock; once the
//! buffer would exceed its capacity the content is handed to the pending
//! side and a background writer thread puts it on disk. File I/O never
//! happens while the append lock is held.
//!
//! Batches carry a ticket taken at hand-off time and writers commit them in
//! ticket order, so the file always reads in append order no matter which
//! writer picks up which batch.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use murmur_utils::{MurmurError, Result};

use crate::config::HistoryConfig;
use crate::handler::{MessageHandler, SessionEvent};

#[derive(Debug, Default)]
struct Buffers {
    /// Appended to by producers
    active: String,
    /// Handed off, waiting for a writer
    pending: String,
    /// Ticket for the next batch taken out of `pending`
    next_ticket: u64,
    running: bool,
}

struct Shared {
    path: PathBuf,
    capacity: usize,
    buffers: Mutex<Buffers>,
    /// Signalled when `pending` gains content or on shutdown
    ready: Condvar,
    /// Ticket of the next batch allowed to reach the file
    committed: Mutex<u64>,
    turn: Condvar,
}

impl Shared {
    /// Take the pending batch with its ticket, if any
    fn take_pending(buffers: &mut Buffers) -> Option<(u64, String)> {
        if buffers.pending.is_empty() {
            return None;
        }
        let ticket = buffers.next_ticket;
        buffers.next_ticket += 1;
        Some((ticket, std::mem::take(&mut buffers.pending)))
    }

    /// Write a batch once every earlier ticket has been written
    fn commit(&self, ticket: u64, batch: &str) -> io::Result<()> {
        let mut committed = self.committed.lock();
        while *committed != ticket {
            self.turn.wait(&mut committed);
        }

        let result = append_to_file(&self.path, batch);

        // a failed batch must not stall later ones
        *committed += 1;
        self.turn.notify_all();
        result
    }
}

/// Background-flushed append-only history writer
pub struct HistoryWriter {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for HistoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryWriter")
            .field("path", &self.shared.path)
            .field("capacity", &self.shared.capacity)
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

impl HistoryWriter {
    /// Open the history described by `config`
    pub fn open(config: &HistoryConfig) -> Result<Self> {
        Self::new(config.path(), config.buffer_capacity, config.writers)
    }

    /// Create a writer appending to `path` with `writers` background threads
    pub fn new(path: impl Into<PathBuf>, capacity: usize, writers: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MurmurError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let shared = Arc::new(Shared {
            path,
            capacity,
            buffers: Mutex::new(Buffers {
                running: true,
                ..Buffers::default()
            }),
            ready: Condvar::new(),
            committed: Mutex::new(0),
            turn: Condvar::new(),
        });

        let workers = spawn_writers(&shared, writers.max(1), |i, shared| {
            thread::Builder::new()
                .name(format!("history-writer-{}", i))
                .spawn(move || write_loop(shared))
        })?;

        debug!(
            "History writer started on {} with {} workers",
            shared.path.display(),
            workers.len()
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Buffer one line; never touches the disk
    pub fn append(&self, line: &str) {
        let mut guard = self.shared.buffers.lock();
        let buffers = &mut *guard;

        let needed = buffers.active.len() + line.len() + 1;
        if !buffers.active.is_empty() && needed > self.shared.capacity {
            if buffers.pending.is_empty() {
                std::mem::swap(&mut buffers.active, &mut buffers.pending);
            } else {
                // writers are behind; queue after what is already pending
                buffers.pending.push_str(&buffers.active);
                buffers.active.clear();
            }
            trace!("History buffer handed off ({} bytes pending)", buffers.pending.len());
            self.shared.ready.notify_one();
        }

        buffers.active.push_str(line);
        buffers.active.push('\n');
    }

    /// Stop the writers and flush everything still buffered
    ///
    /// Safe to call more than once; lines appended after a shutdown are
    /// written by the next call (or on drop).
    pub fn shutdown(&self) -> Result<()> {
        let workers: Vec<_> = {
            self.shared.buffers.lock().running = false;
            self.shared.ready.notify_all();
            self.workers.lock().drain(..).collect()
        };

        for worker in workers {
            if worker.join().is_err() {
                warn!("History writer thread panicked");
            }
        }

        let remaining = {
            let mut buffers = self.shared.buffers.lock();
            let active = std::mem::take(&mut buffers.active);
            buffers.pending.push_str(&active);
            Shared::take_pending(&mut buffers)
        };

        if let Some((ticket, batch)) = remaining {
            self.shared
                .commit(ticket, &batch)
                .map_err(|e| MurmurError::FileWrite {
                    path: self.shared.path.clone(),
                    source: e,
                })?;
            debug!("History flushed on shutdown ({} bytes)", batch.len());
        }

        Ok(())
    }
}

impl Drop for HistoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to flush history: {}", e);
        }
    }
}

/// Start `count` writers; on failure stop and join the ones already running
fn spawn_writers<F>(
    shared: &Arc<Shared>,
    count: usize,
    mut spawn: F,
) -> Result<Vec<JoinHandle<()>>>
where
    F: FnMut(usize, Arc<Shared>) -> io::Result<JoinHandle<()>>,
{
    let mut workers = Vec::with_capacity(count);
    for i in 0..count {
        match spawn(i, Arc::clone(shared)) {
            Ok(worker) => workers.push(worker),
            Err(e) => {
                shared.buffers.lock().running = false;
                shared.ready.notify_all();
                for worker in workers {
                    let _ = worker.join();
                }
                return Err(e.into());
            }
        }
    }
    Ok(workers)
}

fn write_loop(shared: Arc<Shared>) {
    loop {
        let (ticket, batch) = {
            let mut buffers = shared.buffers.lock();
            while buffers.pending.is_empty() && buffers.running {
                shared.ready.wait(&mut buffers);
            }
            match Shared::take_pending(&mut buffers) {
                Some(taken) => taken,
                // stopped and drained
                None => return,
            }
        };

        if let Err(e) = shared.commit(ticket, &batch) {
            warn!(
                "Failed to write {} bytes of history to {}: {}",
                batch.len(),
                shared.path.display(),
                e
            );
        }
    }
}

fn append_to_file(path: &Path, batch: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(batch.as_bytes())
}

/// Show an existing history file through `handler`
///
/// A missing or unreadable file is reported as a status event.
pub fn replay(path: &Path, handler: &mut dyn MessageHandler) {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("No history at {}: {}", path.display(), e);
            handler.on_event(&SessionEvent::HistoryUnavailable);
            return;
        }
    };

    for line in BufReader::new(file).lines() {
        match line {
            Ok(line) => handler.handle(&line),
            Err(e) => {
                warn!("Stopped replaying history: {}", e);
                break;
            }
        }
    }
}
