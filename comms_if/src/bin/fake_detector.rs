//! Fake detector publisher
//!
//! Publishes synthetic detection frames in place of the camera pipeline, for bench testing the
//! follow executable. A person walks slowly away and back across the frame while a chair sits in
//! the middle distance.

use chrono::Utc;
use comms_if::{
    eqpt::perception::{BoundingBox, Detection, DetectionFrame},
    net::{zmq, MonitoredSocket, SocketOptions},
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

/// Period between published frames, roughly the detector's inference rate.
const FRAME_PERIOD_MS: u64 = 100;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        ..Default::default()
    };

    let socket = MonitoredSocket::new(&ctx, zmq::PUB, socket_options, "tcp://*:5020")?;

    println!("Publishing fake detections on port 5020");

    let mut t: f64 = 0.0;

    loop {
        // Person size oscillates through the follow band, position sways side to side
        let scale = 0.55 + 0.25 * (t * 0.2).sin();
        let width = FRAME_WIDTH as f64 * 0.4 * scale;
        let height = FRAME_HEIGHT as f64 * scale * 1.2;
        let centre_x = FRAME_WIDTH as f64 * (0.5 + 0.3 * (t * 0.5).sin());

        let frame = DetectionFrame {
            timestamp: Utc::now(),
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            detections: vec![
                Detection {
                    label: "person".into(),
                    confidence: 0.9,
                    bbox: BoundingBox {
                        x: centre_x - width / 2.0,
                        y: (FRAME_HEIGHT as f64 - height).max(0.0),
                        width,
                        height: height.min(FRAME_HEIGHT as f64),
                    },
                },
                Detection {
                    label: "chair".into(),
                    confidence: 0.7,
                    bbox: BoundingBox {
                        x: 200.0,
                        y: 250.0,
                        width: 240.0,
                        height: 150.0,
                    },
                },
            ],
        };

        match socket.send(&serde_json::to_string(&frame)?, 0) {
            Ok(_) => (),
            Err(e) => println!("Failed to send frame: {}", e),
        }

        std::thread::sleep(std::time::Duration::from_millis(FRAME_PERIOD_MS));
        t += FRAME_PERIOD_MS as f64 / 1000.0;
    }
}
