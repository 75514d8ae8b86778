//! Message bridge between external transports and the internal [`EventBus`].
//!
//! [`SiloBridge`]:
//!
//! 1. **Ingests** detector frames and robot poses, either as typed values or
//!    as newline-delimited JSON records, and enqueues them as [`Event`]s on
//!    the pipeline's input queue. Ingest waits while the queue is full, and
//!    frames and poses keep the order they were ingested in.
//!
//! 2. **Serves** a WebSocket endpoint where clients receive every
//!    `StateImage`, `StateMap` and `Faults` event as a JSON text frame. Text
//!    frames sent by a client are ingested like NDJSON records.
//!
//! # Record format
//!
//! ```text
//! {"topic": "detections", "msg": {"detections": [...]}}
//! {"topic": "odometry",   "msg": {"position": {...}, "orientation": {...}}}
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use silo_types::{DetectionArray, Event, EventPayload, Pose, SiloError};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};
use crate::queue::QueueSender;

const DETECTIONS_SOURCE: &str = "silo-middleware::bridge/detections";
const ODOMETRY_SOURCE: &str = "silo-middleware::bridge/odometry";

/// One inbound NDJSON record.
#[derive(Debug, Deserialize)]
#[serde(tag = "topic", content = "msg", rename_all = "lowercase")]
enum InboundRecord {
    Detections(DetectionArray),
    Odometry(Pose),
}

/// Bridge between external clients, the pipeline input queue and the
/// [`EventBus`] carrying its results.
#[derive(Clone)]
pub struct SiloBridge {
    bus: Arc<EventBus>,
    inputs: QueueSender,
}

impl SiloBridge {
    /// Ingested records go to `inputs`; WebSocket clients read from `bus`.
    pub fn new(bus: Arc<EventBus>, inputs: QueueSender) -> Self {
        Self { bus, inputs }
    }

    // -----------------------------------------------------------------------
    // Ingest
    // -----------------------------------------------------------------------

    /// Enqueue one detector frame.
    ///
    /// # Errors
    ///
    /// [`SiloError::Channel`] when the pipeline has stopped.
    pub async fn ingest_detections(&self, frame: DetectionArray) -> Result<(), SiloError> {
        self.inputs
            .send(Event::new(DETECTIONS_SOURCE, EventPayload::Detections(frame)))
            .await
    }

    /// Enqueue one robot pose.
    ///
    /// # Errors
    ///
    /// [`SiloError::Channel`] when the pipeline has stopped.
    pub async fn ingest_odometry(&self, pose: Pose) -> Result<(), SiloError> {
        self.inputs
            .send(Event::new(ODOMETRY_SOURCE, EventPayload::Odometry(pose)))
            .await
    }

    /// Parse one NDJSON record and enqueue it.
    ///
    /// # Errors
    ///
    /// [`SiloError::Serialization`] for malformed records or unknown topics,
    /// [`SiloError::Channel`] when the pipeline has stopped.
    pub async fn ingest_json_line(&self, line: &str) -> Result<(), SiloError> {
        let record: InboundRecord = serde_json::from_str(line.trim())
            .map_err(|e| SiloError::Serialization(format!("invalid record: {e}")))?;
        match record {
            InboundRecord::Detections(frame) => self.ingest_detections(frame).await,
            InboundRecord::Odometry(pose) => self.ingest_odometry(pose).await,
        }
    }

    // -----------------------------------------------------------------------
    // WebSocket server
    // -----------------------------------------------------------------------

    /// Bind `addr` and serve WebSocket clients until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SiloError::Channel`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), SiloError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SiloError::Channel(format!("ws bind error on {addr}: {e}")))?;
        self.serve_ws(listener).await
    }

    /// Serve WebSocket clients on an already bound listener.
    pub async fn serve_ws(self, listener: TcpListener) -> Result<(), SiloError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "WebSocket server listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), SiloError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| SiloError::Channel(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut state_image = self.bus.subscribe_to(Topic::StateImage);
        let mut state_map = self.bus.subscribe_to(Topic::StateMap);
        let mut faults = self.bus.subscribe_to(Topic::Faults);

        loop {
            let outgoing = tokio::select! {
                event = state_image.recv_fresh() => event,
                event = state_map.recv_fresh() => event,
                event = faults.recv_fresh() => event,
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.ingest_json_line(text.as_str()).await {
                                warn!(peer = %peer, error = %e, "Dropping ws record");
                            }
                        }
                        _ => {}
                    }
                    continue;
                }
            };

            let Some(event) = outgoing else {
                break;
            };
            let json = serde_json::to_string(&event)
                .map_err(|e| SiloError::Serialization(e.to_string()))?;
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }

        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }
}
