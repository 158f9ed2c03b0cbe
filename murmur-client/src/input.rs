//! Line input for the send activity

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use tracing::{debug, warn};

use murmur_utils::Result;

/// Read lines on a dedicated thread and hand them over a channel
///
/// The channel disconnects when the reader hits end of input or an error.
/// The thread is detached: a blocked terminal read must not hold up exit.
pub fn spawn_line_reader<R>(reader: R) -> Result<Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        return;
                    }
                }
            }
            debug!("End of input");
        })?;

    Ok(rx)
}
