// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-memory message bus.
//!
//! The bus carries two independent FIFO queues: inbound events headed for
//! the agent loop and outbound replies headed for the channel manager.
//! Both queues are bounded; a full queue blocks the publisher
//! (backpressure) rather than dropping messages. All operations observe a
//! [`CancellationToken`] and resolve to [`NightjarError::Canceled`] on
//! shutdown.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::NightjarError;
use crate::types::{InboundMessage, OutboundMessage};

/// Default capacity of each queue.
pub const DEFAULT_CAPACITY: usize = 256;

/// The in-memory bus shared by channel adapters, the agent loop, cron,
/// and the heartbeat.
///
/// Each message is consumed by exactly one reader. Receivers sit behind a
/// mutex so the bus itself can be shared as a plain `Arc<Bus>`.
pub struct Bus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl Bus {
    /// Create a bus with the given per-queue capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Publish an inbound event, waiting for queue space.
    pub async fn publish_inbound(
        &self,
        cancel: &CancellationToken,
        msg: InboundMessage,
    ) -> Result<(), NightjarError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(NightjarError::Canceled),
            res = self.inbound_tx.send(msg) => res.map_err(|_| NightjarError::Canceled),
        }
    }

    /// Publish an outbound reply, waiting for queue space.
    pub async fn publish_outbound(
        &self,
        cancel: &CancellationToken,
        msg: OutboundMessage,
    ) -> Result<(), NightjarError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(NightjarError::Canceled),
            res = self.outbound_tx.send(msg) => res.map_err(|_| NightjarError::Canceled),
        }
    }

    /// Receive the next inbound event.
    pub async fn consume_inbound(
        &self,
        cancel: &CancellationToken,
    ) -> Result<InboundMessage, NightjarError> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(NightjarError::Canceled),
            msg = rx.recv() => msg.ok_or(NightjarError::Canceled),
        }
    }

    /// Receive the next outbound reply.
    pub async fn consume_outbound(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OutboundMessage, NightjarError> {
        let mut rx = self.outbound_rx.lock().await;
        tokio::select! {
            _ = cancel.cancelled() => Err(NightjarError::Canceled),
            msg = rx.recv() => msg.ok_or(NightjarError::Canceled),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
