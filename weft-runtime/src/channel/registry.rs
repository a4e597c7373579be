use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::channel::Channel;
use super::descriptor::{ChannelDescriptor, Direction};
use super::publisher::Publisher;
use super::queue::OutgoingQueue;
use super::subscriber::{Subscriber, SubscriberEndpoint};
use crate::codec::{CodecRegistry, CodecTag, Payload, WireEnvelope};
use crate::error::ChannelError;
use crate::module::ModuleRef;

/// Process-wide table of channel declarations and live subscriber endpoints.
///
/// The lock is only held for bookkeeping; endpoints returned from lookups are called by the
/// caller after it has been released.
pub struct ChannelRegistry {
    codecs: Arc<CodecRegistry>,
    outgoing: OutgoingQueue,
    user_id: Option<String>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    // module id -> declarations in the order they were made
    descriptors: HashMap<String, Vec<ChannelDescriptor>>,
    // (channel, module id) -> endpoints
    subscribers: HashMap<(String, String), Vec<Arc<dyn SubscriberEndpoint>>>,
}

impl Inner {
    fn record(&mut self, descriptor: ChannelDescriptor) -> Result<(), ChannelError> {
        let declared = self
            .descriptors
            .entry(descriptor.owner().to_string())
            .or_default();

        if let Some(existing) = declared
            .iter()
            .find(|d| d.channel() == descriptor.channel())
        {
            if existing.payload_type_name() != descriptor.payload_type_name() {
                return Err(ChannelError::TypeConflict {
                    module: descriptor.owner().to_string(),
                    channel: descriptor.channel().to_string(),
                    existing: existing.payload_type_name().to_string(),
                    requested: descriptor.payload_type_name().to_string(),
                    operation: match descriptor.direction() {
                        Direction::Publish => "publish",
                        Direction::Subscribe => "subscribe",
                    },
                });
            }
        }
        declared.push(descriptor);
        Ok(())
    }
}

impl ChannelRegistry {
    pub fn new(codecs: Arc<CodecRegistry>, outgoing: OutgoingQueue) -> Self {
        Self {
            codecs,
            outgoing,
            user_id: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Publishers created from now on stamp their envelopes with `user` as source user.
    pub fn with_user_id(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.outgoing
    }

    /// Declare `module` as a publisher of `channel` and return a write-only handle.
    pub fn publish<T: Payload>(&self, module: &ModuleRef, channel: &str) -> Result<Channel<T>, ChannelError> {
        let mutator = self.codecs.mutator::<T>();
        let descriptor = ChannelDescriptor::new(channel, module.id(), Direction::Publish, &mutator);
        self.inner.lock().record(descriptor)?;

        debug!(module = %module.id(), channel, payload = mutator.type_name(), "Published channel");
        let publisher = Publisher::new(module.id(), channel, mutator, self.outgoing.clone())
            .with_source_user(self.user_id.clone());
        Ok(Channel::writable(channel, Arc::new(publisher), module.clone()))
    }

    /// Declare `module` as a subscriber of `channel`, register `subscriber` for delivery and
    /// return a read-only handle.
    pub fn subscribe<T: Payload>(
        &self,
        module: &ModuleRef,
        channel: &str,
        subscriber: Subscriber<T>,
    ) -> Result<Channel<T>, ChannelError> {
        let mutator = self.codecs.mutator::<T>();
        let descriptor = ChannelDescriptor::new(channel, module.id(), Direction::Subscribe, &mutator);
        let subscriber = Arc::new(subscriber);
        {
            let mut inner = self.inner.lock();
            inner.record(descriptor)?;
            inner
                .subscribers
                .entry((channel.to_string(), module.id().to_string()))
                .or_default()
                .push(Arc::clone(&subscriber) as Arc<dyn SubscriberEndpoint>);
        }

        debug!(module = %module.id(), channel, payload = mutator.type_name(), "Subscribed to channel");
        Ok(Channel::readable(channel, subscriber, module.clone()))
    }

    /// Whether `target_module` declared `envelope`'s channel with a type its payload fits.
    ///
    /// Looks at the first declaration the module made for that channel.
    pub fn is_compatible(&self, envelope: &WireEnvelope, target_module: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .descriptors
            .get(target_module)
            .and_then(|declared| declared.iter().find(|d| d.channel() == envelope.channel()))
            .is_some_and(|descriptor| descriptor.accepts(envelope.payload()))
    }

    pub fn subscribers_of(&self, channel: &str, module: &str) -> Vec<Arc<dyn SubscriberEndpoint>> {
        self.inner
            .lock()
            .subscribers
            .get(&(channel.to_string(), module.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Modules with at least one live subscriber on `channel`, sorted by id.
    pub fn subscribing_modules(&self, channel: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut modules: Vec<String> = inner
            .subscribers
            .iter()
            .filter(|((name, _), endpoints)| name == channel && !endpoints.is_empty())
            .map(|((_, module), _)| module.clone())
            .collect();
        modules.sort_unstable();
        modules
    }

    pub fn template_descriptors_for_module(&self, module: &str) -> Vec<ChannelDescriptor> {
        self.inner
            .lock()
            .descriptors
            .get(module)
            .cloned()
            .unwrap_or_default()
    }

    pub fn payload_tag_of_channel(&self, channel: &str, module: &str) -> Option<CodecTag> {
        self.inner
            .lock()
            .descriptors
            .get(module)
            .and_then(|declared| declared.iter().find(|d| d.channel() == channel))
            .map(ChannelDescriptor::codec_tag)
    }

    /// Forget every declaration and endpoint of `module`.
    pub fn remove_module(&self, module: &str) {
        let mut inner = self.inner.lock();
        inner.descriptors.remove(module);
        inner.subscribers.retain(|(_, owner), _| owner != module);
        debug!(module, "Removed module from channel registry");
    }

    /// Check that all modules declaring a channel agree on its payload shape.
    pub fn validate_wiring(&self) -> Result<(), ChannelError> {
        let inner = self.inner.lock();
        let mut modules: Vec<&String> = inner.descriptors.keys().collect();
        modules.sort_unstable();

        let mut first_by_channel: HashMap<&str, &ChannelDescriptor> = HashMap::new();
        for module in modules {
            for descriptor in &inner.descriptors[module] {
                let first = *first_by_channel
                    .entry(descriptor.channel())
                    .or_insert(descriptor);
                if !first.agrees_with(descriptor) {
                    warn!(
                        channel = descriptor.channel(),
                        first_module = first.owner(),
                        second_module = descriptor.owner(),
                        "Channel declared with incompatible payload types"
                    );
                    return Err(ChannelError::WiringConflict {
                        channel: descriptor.channel().to_string(),
                        first_module: first.owner().to_string(),
                        first_type: first.payload_type_name().to_string(),
                        second_module: descriptor.owner().to_string(),
                        second_type: descriptor.payload_type_name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ChannelRegistry")
            .field("user_id", &self.user_id)
            .field("modules", &inner.descriptors.len())
            .field("subscriptions", &inner.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelData;
    use crate::dispatcher::Dispatcher;
    use crate::module::ModuleState;

    fn registry() -> (ChannelRegistry, tokio::sync::mpsc::UnboundedReceiver<WireEnvelope>) {
        let (queue, receiver) = OutgoingQueue::new();
        (ChannelRegistry::new(Arc::new(CodecRegistry::default()), queue), receiver)
    }

    fn module(id: &str) -> ModuleRef {
        let module = ModuleRef::new(id);
        module.set_state(ModuleState::Initializing);
        module
    }

    fn subscriber<T: Payload>(registry: &ChannelRegistry, module: &str, channel: &str, dispatcher: &Dispatcher) -> Subscriber<T> {
        Subscriber::new(module, channel, Arc::clone(registry.codecs()), dispatcher.handle(), |_: ChannelData<T>| {})
    }

    #[test]
    fn subscribe_only_handle_cannot_post() {
        let (registry, mut outgoing) = registry();
        let display = module("display");
        let dispatcher = Dispatcher::new("display");

        let channel = registry
            .subscribe::<f64>(&display, "temperature", subscriber(&registry, "display", "temperature", &dispatcher))
            .unwrap();
        assert!(matches!(channel.post(&1.0), Err(ChannelError::NotWritable { .. })));
        assert!(outgoing.try_recv().is_err());
    }

    #[test]
    fn same_module_cannot_redeclare_with_another_type() {
        let (registry, _outgoing) = registry();
        let sensor = module("sensor");
        registry.publish::<f64>(&sensor, "temperature").unwrap();
        registry.publish::<f64>(&sensor, "temperature").unwrap();

        let err = registry.publish::<String>(&sensor, "temperature").unwrap_err();
        assert!(matches!(err, ChannelError::TypeConflict { operation: "publish", .. }));
    }

    #[test]
    fn compatibility_follows_the_first_declaration() {
        let (registry, mut outgoing) = registry();
        let sensor = module("sensor");
        let display = module("display");
        let dispatcher = Dispatcher::new("display");

        let temperature = registry.publish::<f32>(&sensor, "temperature").unwrap();
        let label = registry.publish::<String>(&sensor, "label").unwrap();
        registry
            .subscribe::<f64>(&display, "temperature", subscriber(&registry, "display", "temperature", &dispatcher))
            .unwrap();

        temperature.post(&21.0).unwrap();
        label.post(&"kitchen".to_string()).unwrap();
        let number = outgoing.try_recv().unwrap();
        let text = outgoing.try_recv().unwrap();

        assert!(registry.is_compatible(&number, "display"));
        assert!(!registry.is_compatible(&text, "display"));
        assert!(!registry.is_compatible(&number, "unknown"));
        assert_eq!(registry.payload_tag_of_channel("temperature", "display"), Some(CodecTag::Number));
    }

    #[test]
    fn wiring_conflicts_are_detected_across_modules() {
        let (registry, _outgoing) = registry();
        let dispatcher = Dispatcher::new("b");
        registry.publish::<bool>(&module("a"), "door").unwrap();
        registry
            .subscribe::<bool>(&module("b"), "door", subscriber(&registry, "b", "door", &dispatcher))
            .unwrap();
        assert!(registry.validate_wiring().is_ok());

        registry.publish::<Vec<String>>(&module("c"), "door").unwrap();
        let err = registry.validate_wiring().unwrap_err();
        assert!(matches!(err, ChannelError::WiringConflict { ref second_module, .. } if second_module == "c"));
    }

    #[test]
    fn removing_a_module_drops_its_endpoints() {
        let (registry, _outgoing) = registry();
        let dispatcher = Dispatcher::new("x");
        for id in ["b", "a"] {
            registry
                .subscribe::<i64>(&module(id), "count", subscriber(&registry, id, "count", &dispatcher))
                .unwrap();
        }
        assert_eq!(registry.subscribing_modules("count"), vec!["a", "b"]);
        assert_eq!(registry.subscribers_of("count", "a").len(), 1);

        registry.remove_module("a");
        assert_eq!(registry.subscribing_modules("count"), vec!["b"]);
        assert!(registry.template_descriptors_for_module("a").is_empty());
        assert_eq!(registry.template_descriptors_for_module("b").len(), 1);
    }
}
