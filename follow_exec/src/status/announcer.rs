//! Status announcers

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use log::{info, warn};

use super::StatusParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval at which a running speech process is checked for completion.
const SPEECH_POLL: Duration = Duration::from_millis(20);

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Aborts the announcement in progress, callable from any thread.
pub type Canceller = Box<dyn Fn() + Send + Sync>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Announcer: Send + 'static {
    /// Announce a message, blocking until it has been delivered.
    fn announce(&mut self, msg: &str) -> Result<(), AnnounceError>;

    /// Get a handle which cancels the in-flight announcement.
    fn canceller(&self) -> Canceller {
        Box::new(|| ())
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Writes messages to the log.
#[derive(Debug, Default)]
pub struct LogAnnouncer;

/// Speaks messages with an external text to speech program, one process per message.
pub struct SpeechAnnouncer {
    program: String,
    args: Vec<String>,
    current: Arc<Mutex<Option<Child>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("Could not start the speech program: {0}")]
    SpawnError(std::io::Error),

    #[error("Could not wait on the speech program: {0}")]
    WaitError(std::io::Error),

    #[error("The speech program exited with {0}")]
    SpeechFailed(std::process::ExitStatus),

    #[error("The announcement was cancelled")]
    Cancelled,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Announcer for LogAnnouncer {
    fn announce(&mut self, msg: &str) -> Result<(), AnnounceError> {
        info!("[STATUS] {}", msg);
        Ok(())
    }
}

impl SpeechAnnouncer {
    pub fn new(params: &StatusParams) -> Self {
        Self {
            program: params.tts_program.clone(),
            args: params.tts_args.clone(),
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl Announcer for SpeechAnnouncer {
    fn announce(&mut self, msg: &str) -> Result<(), AnnounceError> {
        info!("[STATUS] {}", msg);

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(msg)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(AnnounceError::SpawnError)?;

        match self.current.lock() {
            Ok(mut c) => *c = Some(child),
            Err(_) => return Err(AnnounceError::Cancelled),
        }

        // Poll rather than wait so the canceller can get at the child in between
        loop {
            let status = {
                let mut guard = self.current.lock().map_err(|_| AnnounceError::Cancelled)?;
                match guard.as_mut() {
                    Some(c) => c.try_wait().map_err(AnnounceError::WaitError)?,
                    None => return Err(AnnounceError::Cancelled),
                }
            };

            match status {
                Some(s) => {
                    self.current.lock().map(|mut c| c.take()).ok();
                    return match s.success() {
                        true => Ok(()),
                        false => Err(AnnounceError::SpeechFailed(s)),
                    };
                }
                None => thread::sleep(SPEECH_POLL),
            }
        }
    }

    fn canceller(&self) -> Canceller {
        let current = self.current.clone();

        Box::new(move || {
            if let Ok(mut c) = current.lock() {
                if let Some(mut child) = c.take() {
                    if let Err(e) = child.kill() {
                        warn!("Could not kill the speech program: {}", e);
                    }
                    child.wait().ok();
                }
            }
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
