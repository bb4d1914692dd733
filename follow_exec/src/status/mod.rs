//! # Status module
//!
//! Human readable status reporting for logging and speech. The control loop hands messages to the
//! [`StatusReporter`] without ever blocking on it: the reporter keeps a single pending message
//! and a newer message replaces one that hasn't been picked up yet. A worker thread passes
//! messages to an [`Announcer`] one at a time.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod announcer;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use serde::Deserialize;

pub use announcer::{AnnounceError, Announcer, Canceller, LogAnnouncer, SpeechAnnouncer};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Receiver of status messages. Implementations must not block.
pub trait StatusSink {
    fn report(&self, msg: &str);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StatusParams {
    /// Speak messages rather than only logging them
    pub speech: bool,

    /// Text to speech program
    pub tts_program: String,

    /// Arguments passed to the program before the message
    pub tts_args: Vec<String>,

    /// Time to wait for an in-flight message during shutdown before it is cut off.
    ///
    /// Units: seconds
    pub shutdown_grace_s: f64,
}

pub struct StatusReporter {
    tx: Option<Sender<String>>,

    /// Receiving end kept so a stale pending message can be replaced
    rx: Receiver<String>,

    /// Disconnected by the worker when it exits
    done_rx: Receiver<()>,

    worker: Option<JoinHandle<()>>,

    cancel: Canceller,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StatusReporter {
    /// Start the reporter worker with the given announcer.
    pub fn new<A: Announcer>(mut announcer: A) -> Result<Self, std::io::Error> {
        let (tx, rx) = bounded::<String>(1);
        let (done_tx, done_rx) = bounded::<()>(0);

        let cancel = announcer.canceller();
        let worker_rx = rx.clone();

        let worker = thread::Builder::new()
            .name("status".into())
            .spawn(move || {
                // Dropped on exit, which the reporter sees as a disconnect
                let _done_tx = done_tx;

                for msg in worker_rx.iter() {
                    if let Err(e) = announcer.announce(&msg) {
                        warn!("Could not announce \"{}\": {}", msg, e);
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            rx,
            done_rx,
            worker: Some(worker),
            cancel,
        })
    }

    /// Stop the reporter.
    ///
    /// Any message not yet started is discarded. A message being announced is given up to `grace`
    /// to finish, after which it is cancelled. If the worker still doesn't exit it is abandoned.
    pub fn shutdown(&mut self, grace: Duration) {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => return,
        };

        while self.rx.try_recv().is_ok() {}
        drop(tx);

        let finished = match self.done_rx.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Status announcement still running after {:?}, cancelling", grace);
                (self.cancel)();

                !matches!(
                    self.done_rx.recv_timeout(grace),
                    Err(RecvTimeoutError::Timeout)
                )
            }
            _ => true,
        };

        match (finished, self.worker.take()) {
            (true, Some(jh)) => {
                jh.join().ok();
                debug!("Status reporter stopped");
            }
            (false, Some(_)) => warn!("Status reporter did not stop, abandoning it"),
            _ => (),
        }
    }
}

impl StatusSink for StatusReporter {
    fn report(&self, msg: &str) {
        let tx = match self.tx {
            Some(ref tx) => tx,
            None => return,
        };

        match tx.try_send(msg.to_string()) {
            Ok(_) => (),
            Err(TrySendError::Full(msg)) => {
                // Replace the pending message with the newer one. If the worker takes the pending
                // message first the slot is simply empty.
                self.rx.try_recv().ok();
                tx.try_send(msg).ok();
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Status worker has stopped, message dropped")
            }
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(100));
    }
}

impl Default for StatusParams {
    fn default() -> Self {
        Self {
            speech: false,
            tts_program: String::from("espeak-ng"),
            tts_args: vec![String::from("-s"), String::from("170")],
            shutdown_grace_s: 2.0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
