use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};

use super::publisher::Publisher;
use super::subscriber::Subscriber;
use crate::error::ChannelError;
use crate::module::ModuleRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRights {
    None,
    Read,
    Write,
    ReadWrite,
}

impl AccessRights {
    pub fn can_read(self) -> bool {
        matches!(self, AccessRights::Read | AccessRights::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessRights::Write | AccessRights::ReadWrite)
    }
}

enum Endpoint<T> {
    None,
    Publisher(Arc<Publisher<T>>),
    Subscriber(Arc<Subscriber<T>>),
}

impl<T> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        match self {
            Endpoint::None => Endpoint::None,
            Endpoint::Publisher(publisher) => Endpoint::Publisher(Arc::clone(publisher)),
            Endpoint::Subscriber(subscriber) => Endpoint::Subscriber(Arc::clone(subscriber)),
        }
    }
}

/// A module's handle on a named, typed channel.
///
/// Obtained from `publish` (write access) or `subscribe` (read access) while the module
/// initializes. Misuse, like posting on a read-only handle or on a channel of a module
/// that has stopped, is reported through the module and returned as an error.
pub struct Channel<T> {
    name: String,
    access: AccessRights,
    endpoint: Endpoint<T>,
    module: Option<ModuleRef>,
}

impl<T> Channel<T> {
    pub(crate) fn writable(name: &str, publisher: Arc<Publisher<T>>, module: ModuleRef) -> Self {
        Self {
            name: name.to_string(),
            access: AccessRights::Write,
            endpoint: Endpoint::Publisher(publisher),
            module: Some(module),
        }
    }

    pub(crate) fn readable(name: &str, subscriber: Arc<Subscriber<T>>, module: ModuleRef) -> Self {
        Self {
            name: name.to_string(),
            access: AccessRights::Read,
            endpoint: Endpoint::Subscriber(subscriber),
            module: Some(module),
        }
    }

    /// A handle that rejects every operation.
    pub fn invalid(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: AccessRights::None,
            endpoint: Endpoint::None,
            module: None,
        }
    }

    pub(crate) fn invalid_for(name: &str, module: ModuleRef) -> Self {
        Self {
            module: Some(module),
            ..Self::invalid(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_rights(&self) -> AccessRights {
        self.access
    }

    pub fn is_valid(&self) -> bool {
        self.access != AccessRights::None
            && self
                .module
                .as_ref()
                .is_some_and(|module| module.state().channels_usable())
    }

    pub fn can_read(&self) -> bool {
        self.access.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.access.can_write()
    }

    pub fn post(&self, value: &T) -> Result<(), ChannelError> {
        self.publisher()?.post(value)
    }

    pub fn post_at(&self, value: &T, timestamp: DateTime<Local>) -> Result<(), ChannelError> {
        self.publisher()?.post_at(value, timestamp)
    }

    pub fn post_to_module(&self, module: &str, value: &T) -> Result<(), ChannelError> {
        self.publisher()?.post_to_module(module, value)
    }

    pub fn post_to_user(&self, user: &str, value: &T) -> Result<(), ChannelError> {
        self.publisher()?.post_to_user(user, value)
    }

    fn publisher(&self) -> Result<&Publisher<T>, ChannelError> {
        let result = match (&self.endpoint, &self.module) {
            (Endpoint::None, _) | (_, None) => Err(ChannelError::InvalidChannel {
                channel: self.name.clone(),
            }),
            (_, Some(module)) if !module.state().channels_usable() => {
                Err(ChannelError::ModuleInactive {
                    module: module.id().to_string(),
                    channel: self.name.clone(),
                })
            }
            (Endpoint::Publisher(publisher), _) if self.access.can_write() => Ok(publisher.as_ref()),
            _ => Err(ChannelError::NotWritable {
                channel: self.name.clone(),
            }),
        };

        if let (Err(e), Some(module)) = (&result, &self.module) {
            module.error(format_args!("{e}"));
        }
        result
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            access: self.access,
            endpoint: self.endpoint.clone(),
            module: self.module.clone(),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("module", &self.module.as_ref().map(ModuleRef::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutgoingQueue;
    use crate::codec::Payload;
    use crate::module::ModuleState;

    #[test]
    fn posting_requires_an_active_module() {
        let (queue, mut outgoing) = OutgoingQueue::new();
        let module = ModuleRef::new("sensor");
        module.set_state(ModuleState::Running);
        let channel = Channel::writable(
            "humidity",
            Arc::new(Publisher::new("sensor", "humidity", f64::mutator(), queue)),
            module.clone(),
        );

        channel.post(&0.4).unwrap();
        assert!(outgoing.try_recv().is_ok());

        module.set_state(ModuleState::Stopped);
        assert!(!channel.is_valid());
        assert!(matches!(channel.post(&0.5), Err(ChannelError::ModuleInactive { .. })));
        assert!(outgoing.try_recv().is_err());
    }

    #[test]
    fn invalid_channel_rejects_posts() {
        let channel = Channel::<i32>::invalid("late");
        assert!(!channel.is_valid());
        assert_eq!(channel.access_rights(), AccessRights::None);
        assert!(matches!(channel.post(&1), Err(ChannelError::InvalidChannel { .. })));
    }
}
