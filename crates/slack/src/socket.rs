use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport fed from inside the process, e.g. by the HTTP events endpoint.
/// The stream ends once every [`EnvelopeSender`] is dropped.
pub struct ChannelTransport {
    receiver: Mutex<mpsc::Receiver<SlackEnvelope>>,
}

#[derive(Clone)]
pub struct EnvelopeSender {
    sender: mpsc::Sender<SlackEnvelope>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, EnvelopeSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { receiver: Mutex::new(receiver) }, EnvelopeSender { sender })
    }
}

impl EnvelopeSender {
    pub async fn send(&self, envelope: SlackEnvelope) -> Result<(), TransportError> {
        self.sender.send(envelope).await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl SocketTransport for ChannelTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.receiver.lock().await.close();
        Ok(())
    }
}

/// Pumps envelopes from one transport connection into the dispatcher.
/// Each envelope is handled on its own task, so a slow handler never holds up
/// the envelopes behind it. Connection open and close are logged; a dropped
/// connection is not reopened.
pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: Arc<EventDispatcher>,
}

impl SocketModeRunner {
    pub fn new(transport: Arc<dyn SocketTransport>, dispatcher: EventDispatcher) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher) }
    }

    /// Runs until the stream ends or fails, then waits for the handlers still
    /// in flight.
    pub async fn start(&self) -> Result<()> {
        let mut in_flight = JoinSet::new();
        let pumped = self.connect_and_pump(&mut in_flight).await;

        while let Some(joined) = in_flight.join_next().await {
            if let Err(error) = joined {
                warn!(
                    event_name = "ingress.slack.handler_aborted",
                    error = %error,
                    "event handler task did not complete"
                );
            }
        }

        if let Err(error) = pumped {
            warn!(
                event_name = "ingress.slack.connection_failed",
                error = %error,
                "socket mode transport failed; not reconnecting"
            );
        }
        info!(event_name = "ingress.slack.connection_closed", "socket mode connection closed");
        Ok(())
    }

    /// Dispatches the one-off installation event for `installer`.
    pub async fn announce_installation(&self, installer: Option<String>) -> HandlerResult {
        let envelope = SlackEnvelope {
            envelope_id: "startup-installation".to_owned(),
            event: SlackEvent::AppInstalled { installer },
        };
        dispatch(&self.dispatcher, &envelope).await
    }

    async fn connect_and_pump(
        &self,
        in_flight: &mut JoinSet<HandlerResult>,
    ) -> Result<(), TransportError> {
        self.transport.connect().await?;
        info!(event_name = "ingress.slack.connection_opened", "socket mode connection opened");

        loop {
            while in_flight.try_join_next().is_some() {}

            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(event_name = "ingress.slack.stream_ended", "socket mode stream ended");
                self.transport.disconnect().await?;
                return Ok(());
            };

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move { dispatch(&dispatcher, &envelope).await });
        }
    }
}

async fn dispatch(dispatcher: &EventDispatcher, envelope: &SlackEnvelope) -> HandlerResult {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    match dispatcher.dispatch(envelope, &context).await {
        Ok(result) => {
            debug!(
                event_name = "ingress.slack.dispatched",
                envelope_id = %envelope.envelope_id,
                result = ?result,
                "slack envelope handled"
            );
            result
        }
        Err(error) => {
            warn!(
                event_name = "ingress.slack.dispatch_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "event dispatch failed; continuing socket loop"
            );
            HandlerResult::Processed
        }
    }
}
