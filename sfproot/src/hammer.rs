//! Interrupt hammer: a background writer that repeats a payload.
//!
//! Autoboot countdowns and "press a key" menus only listen for a short
//! window, so the payload is sent every few milliseconds from a dedicated
//! thread while the owner keeps reading the console. The thread is stopped
//! and joined by [`Hammer::stop`] or, on any other exit path, by `Drop`.
//!
//! A failed write ends the thread and is kept for the owner to collect with
//! [`Hammer::take_error`] or [`Hammer::finish`].

use log::{debug, trace};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A running repeated write.
pub struct Hammer {
    stop: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<io::Error>>>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

impl Hammer {
    /// Start writing `payload` to `writer` every `period`.
    ///
    /// The first write happens immediately.
    pub fn start(
        mut writer: Box<dyn Write + Send>,
        payload: impl Into<Vec<u8>>,
        period: Duration,
    ) -> Self {
        let payload = payload.into();
        let label = format!("{:?}", String::from_utf8_lossy(&payload));
        let stop = Arc::new(AtomicBool::new(false));
        let writes = Arc::new(AtomicUsize::new(0));
        let failure = Arc::new(Mutex::new(None));

        let stop_flag = Arc::clone(&stop);
        let write_count = Arc::clone(&writes);
        let write_failure = Arc::clone(&failure);
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Acquire) {
                if let Err(e) = writer
                    .write_all(&payload)
                    .and_then(|()| writer.flush())
                {
                    debug!("Hammer write failed, stopping: {e}");
                    *write_failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(e);
                    break;
                }
                write_count.fetch_add(1, Ordering::Relaxed);
                thread::sleep(period);
            }
        });

        debug!("Hammer started: {label} every {}ms", period.as_millis());

        Self {
            stop,
            writes,
            failure,
            handle: Some(handle),
            label,
        }
    }

    /// Number of payload writes issued so far.
    pub fn writes(&self) -> usize {
        self.writes
            .load(Ordering::Relaxed)
    }

    /// Whether the background writer is still alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// The write error that ended the thread, if one did. Taken once.
    pub fn take_error(&self) -> Option<io::Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Stop the writer and wait for it to exit.
    ///
    /// No write happens after this returns. Returns the number of writes.
    pub fn stop(mut self) -> usize {
        self.shutdown();
        self.writes()
    }

    /// Like [`Hammer::stop`], but fails if a write failed along the way.
    pub fn finish(mut self) -> io::Result<usize> {
        self.shutdown();
        match self.take_error() {
            Some(e) => Err(e),
            None => Ok(self.writes()),
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self
            .handle
            .take()
        {
            self.stop
                .store(true, Ordering::Release);
            if handle
                .join()
                .is_err()
            {
                debug!("Hammer thread panicked");
            }
            trace!("Hammer {} stopped after {} writes", self.label, self.writes());
        }
    }
}

impl Drop for Hammer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
