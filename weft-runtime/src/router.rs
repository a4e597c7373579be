use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::ChannelRegistry;
use crate::codec::WireEnvelope;

/// In-process router: drains the outgoing queue and hands each envelope to the
/// subscribers it is meant for.
///
/// Broadcasts go to every module subscribed to the channel; targeted envelopes only to
/// their target module. Envelopes a module cannot decode are logged and dropped.
pub struct LocalRouter {
    channels: Arc<ChannelRegistry>,
    receiver: mpsc::UnboundedReceiver<WireEnvelope>,
}

impl LocalRouter {
    pub fn new(channels: Arc<ChannelRegistry>, receiver: mpsc::UnboundedReceiver<WireEnvelope>) -> Self {
        Self { channels, receiver }
    }

    /// Route until every sender of the outgoing queue is gone.
    pub async fn run(mut self) {
        info!("Local router started");
        while let Some(envelope) = self.receiver.recv().await {
            self.route(&envelope);
        }
        info!("Local router stopped, outgoing queue closed");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Route whatever is queued right now without waiting. Returns the number of envelopes
    /// taken from the queue.
    pub fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(envelope) = self.receiver.try_recv() {
            self.route(&envelope);
            drained += 1;
        }
        drained
    }

    /// Deliver one envelope. Returns the number of subscribers it reached.
    pub fn route(&self, envelope: &WireEnvelope) -> usize {
        let targets = match envelope.target_module() {
            Some(module) => vec![module.to_string()],
            None => self.channels.subscribing_modules(envelope.channel()),
        };

        let mut delivered = 0;
        for module in targets {
            if !self.channels.is_compatible(envelope, &module) {
                warn!(
                    channel = envelope.channel(),
                    source = envelope.source_module(),
                    target = %module,
                    payload = envelope.payload().type_name(),
                    "Dropping envelope, payload does not match the subscriber's channel type"
                );
                continue;
            }

            for subscriber in self.channels.subscribers_of(envelope.channel(), &module) {
                match subscriber.on_new_data(envelope) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(
                        channel = envelope.channel(),
                        target = %module,
                        error = %e,
                        "Dropping envelope, payload could not be decoded"
                    ),
                }
            }
        }

        debug!(
            channel = envelope.channel(),
            sequence_id = envelope.sequence_id(),
            delivered,
            "Routed envelope"
        );
        delivered
    }
}
