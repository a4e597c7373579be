use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::data::ChannelData;
use crate::codec::{CodecRegistry, Payload, WireEnvelope};
use crate::dispatcher::{DispatcherHandle, Task};
use crate::error::CodecError;
use crate::schedule::Schedule;

/// Receiving side of a channel as seen by the router.
pub trait SubscriberEndpoint: Send + Sync {
    fn channel(&self) -> &str;

    fn module(&self) -> &str;

    /// Decode the payload and queue the user callback on the owning module's dispatcher.
    ///
    /// Safe to call from any thread; never blocks on the callback. A payload that fails
    /// to decode is returned as an error and nothing is queued.
    fn on_new_data(&self, envelope: &WireEnvelope) -> Result<(), CodecError>;
}

type Callback<T> = Arc<dyn Fn(ChannelData<T>) + Send + Sync>;

/// Decodes incoming envelopes of one channel for one module.
pub struct Subscriber<T> {
    module: String,
    channel: String,
    codecs: Arc<CodecRegistry>,
    dispatcher: DispatcherHandle,
    callback: Callback<T>,
}

impl<T: Payload> Subscriber<T> {
    pub fn new<F>(
        module: impl Into<String>,
        channel: impl Into<String>,
        codecs: Arc<CodecRegistry>,
        dispatcher: DispatcherHandle,
        callback: F,
    ) -> Self
    where
        F: Fn(ChannelData<T>) + Send + Sync + 'static,
    {
        Self {
            module: module.into(),
            channel: channel.into(),
            codecs,
            dispatcher,
            callback: Arc::new(callback),
        }
    }
}

impl<T: Payload> SubscriberEndpoint for Subscriber<T> {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn on_new_data(&self, envelope: &WireEnvelope) -> Result<(), CodecError> {
        let value = self.codecs.decode::<T>(envelope.payload())?;
        let data = ChannelData::new(
            value,
            envelope.timestamp(),
            envelope.source_user().map(str::to_string),
            envelope.source_module().to_string(),
            envelope.sequence_id(),
        );

        trace!(
            module = %self.module,
            channel = %self.channel,
            sequence_id = envelope.sequence_id(),
            "Queueing channel callback"
        );
        let callback = Arc::clone(&self.callback);
        let mut data = Some(data);
        self.dispatcher.add_task(Task::new(Schedule::now(), move || {
            if let Some(data) = data.take() {
                callback(data);
            }
        }));
        Ok(())
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("module", &self.module)
            .field("channel", &self.channel)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{OutgoingQueue, Publisher};
    use crate::dispatcher::Dispatcher;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn callback_runs_on_the_module_dispatcher() {
        let dispatcher = Dispatcher::new("display");
        dispatcher.start().unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let subscriber = Subscriber::new(
            "display",
            "temperature",
            Arc::new(CodecRegistry::default()),
            dispatcher.handle(),
            move |data: ChannelData<f64>| {
                let thread = std::thread::current().name().map(str::to_string);
                let _ = tx.lock().send((data.into_value(), thread));
            },
        );

        let (queue, mut outgoing) = OutgoingQueue::new();
        Publisher::new("sensor", "temperature", f64::mutator(), queue)
            .post(&19.5)
            .unwrap();
        subscriber.on_new_data(&outgoing.try_recv().unwrap()).unwrap();

        let (value, thread) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(value, 19.5);
        assert_eq!(thread.as_deref(), Some("display"));
        dispatcher.stop().unwrap();
    }

    #[test]
    fn undecodable_payload_queues_nothing() {
        let dispatcher = Dispatcher::new("display");
        let subscriber = Subscriber::new(
            "display",
            "temperature",
            Arc::new(CodecRegistry::default()),
            dispatcher.handle(),
            |_: ChannelData<f64>| panic!("must not be called"),
        );

        let (queue, mut outgoing) = OutgoingQueue::new();
        Publisher::new("sensor", "temperature", String::mutator(), queue)
            .post(&"warm".to_string())
            .unwrap();
        assert!(subscriber.on_new_data(&outgoing.try_recv().unwrap()).is_err());
        assert_eq!(dispatcher.pending(), 0);
    }
}
