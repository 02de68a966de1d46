//! Per-connection I/O pump
//!
//! A `Link` owns the open transport of one connection epoch in a spawned
//! task: queued outbound frames are written in order, inbound text is
//! forwarded to the session as `LinkEvent`s tagged with the epoch.
//! Dropping the `Link` flushes what was queued and closes the transport.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::transport::BoxTransport;

/// Upper bound on a graceful transport close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Something that happened on the wire of epoch `epoch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One inbound text frame, not yet decoded
    Frame { epoch: u64, text: String },
    /// The peer closed the connection or the transport failed
    Closed { epoch: u64, reason: Option<String> },
}

#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<String>,
}

impl Link {
    /// Spawn the pump for `transport`, reporting into `events`
    pub fn spawn<T>(epoch: u64, transport: BoxTransport, events: mpsc::UnboundedSender<T>) -> Self
    where
        T: From<LinkEvent> + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(epoch, transport, outbound_rx, events));
        Self { outbound }
    }

    /// Queue one text frame
    ///
    /// Returns false if the pump already stopped.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }
}

async fn pump<T>(
    epoch: u64,
    mut transport: BoxTransport,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<T>,
) where
    T: From<LinkEvent> + Send + 'static,
{
    debug!("Link {} started", epoch);

    loop {
        tokio::select! {
            // Outbound first so frames queued before a release are flushed
            biased;

            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(e) = transport.send(text).await {
                            error!("Link {} send failed: {}", epoch, e);
                            let _ = events.send(T::from(LinkEvent::Closed {
                                epoch,
                                reason: Some(e.to_string()),
                            }));
                            break;
                        }
                    }
                    None => {
                        // Owner released the link
                        debug!("Link {} released, closing transport", epoch);
                        match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => debug!("Link {} close error: {}", epoch, e),
                            Err(_) => warn!("Link {} close timed out", epoch),
                        }
                        break;
                    }
                }
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if events.send(T::from(LinkEvent::Frame { epoch, text })).is_err() {
                            debug!("Session gone, ending link {}", epoch);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Link {} receive failed: {}", epoch, e);
                        let _ = events.send(T::from(LinkEvent::Closed {
                            epoch,
                            reason: Some(e.to_string()),
                        }));
                        break;
                    }
                    None => {
                        debug!("Link {} closed by server", epoch);
                        let _ = events.send(T::from(LinkEvent::Closed { epoch, reason: None }));
                        break;
                    }
                }
            }
        }
    }

    debug!("Link {} ended", epoch);
}
