//! # Detection Client
//!
//! Subscribes to the detection frames published by the detector process, tracks them, and keeps
//! the [`SnapshotSlot`] up to date. The detector publishes as fast as it can infer, the client
//! conflates so only the newest frame is ever processed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use log::{error, info, warn};

use comms_if::{
    eqpt::perception::DetectionFrame,
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use util::session;

use super::{SnapshotSlot, Tracker};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct DetClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DetClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not start the client thread: {0}")]
    ThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DetClient {
    /// Connect to the detector and start publishing snapshots into `slot`.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        tracker: Tracker,
        slot: SnapshotSlot,
    ) -> Result<Self, DetClientError> {
        let socket_options = SocketOptions {
            connect_timeout: 1000,
            linger: 1,
            recv_timeout: 100,
            conflate: true,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            socket_options,
            &params.detection_endpoint,
        )
        .map_err(DetClientError::SocketError)?;

        info!("Subscribed to detections on {}", params.detection_endpoint);

        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();

        let bg_jh = thread::Builder::new()
            .name("det_client".into())
            .spawn(move || bg_thread(socket, bg_run_clone, tracker, slot))
            .map_err(DetClientError::ThreadError)?;

        Ok(Self {
            bg_jh: Some(bg_jh),
            bg_run,
        })
    }
}

impl Drop for DetClient {
    fn drop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            jh.join().ok();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, publishes a snapshot every time the detector sends a frame.
fn bg_thread(socket: MonitoredSocket, run: Arc<AtomicBool>, tracker: Tracker, slot: SnapshotSlot) {
    let mut was_connected = false;

    while run.load(Ordering::Relaxed) {
        if socket.connected() != was_connected {
            was_connected = socket.connected();
            match was_connected {
                true => info!("Detector connected"),
                false => warn!("Detector disconnected"),
            }
        }

        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message from the detector");
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Error receiving message from the detector: {:?}", e);
                break;
            }
        };

        let frame: DetectionFrame = match serde_json::from_str(&msg) {
            Ok(f) => f,
            Err(e) => {
                warn!("Malformed detection frame dropped: {}", e);
                continue;
            }
        };

        slot.publish(tracker.snapshot(&frame), session::get_elapsed_seconds());
    }
}
