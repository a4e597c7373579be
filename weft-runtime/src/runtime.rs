use std::sync::Arc;

use config::Config;
use tokio::sync::mpsc;
use tracing::info;

use crate::channel::{ChannelRegistry, OutgoingQueue};
use crate::codec::{CodecRegistry, SchemaMessage, TypeRegistry, WireEnvelope};
use crate::config::{load_toml_config, load_yaml_config, Properties};
use crate::error::PropertyError;

/// Process-scoped state shared by all modules: codecs, channel registry, outgoing queue
/// and configuration.
#[derive(Debug)]
pub struct Runtime {
    config: Arc<Config>,
    codecs: Arc<CodecRegistry>,
    channels: Arc<ChannelRegistry>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn outgoing(&self) -> &OutgoingQueue {
        self.channels.outgoing()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.channels.user_id()
    }

    /// The `modules.<module_id>` section of the configuration.
    pub fn properties_for(&self, module_id: &str) -> Properties {
        Properties::new(Arc::clone(&self.config), module_id)
    }
}

/// Builder for the runtime
pub struct RuntimeBuilder {
    config: Config,
    types: TypeRegistry,
    user_id: Option<String>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Create a new runtime builder with default config (empty)
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            types: TypeRegistry::new(),
            user_id: None,
        }
    }

    /// Create with TOML config file
    pub fn with_toml(path: &str) -> Result<Self, PropertyError> {
        Ok(Self::with_config(load_toml_config(path)?))
    }

    /// Create with YAML config file
    pub fn with_yaml(path: &str) -> Result<Self, PropertyError> {
        Ok(Self::with_config(load_yaml_config(path)?))
    }

    /// Create with custom config
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            types: TypeRegistry::new(),
            user_id: None,
        }
    }

    /// The user this process acts for; every published value carries it as source user.
    /// Defaults to the `user_id` key of the configuration.
    pub fn with_user_id(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    /// Make `T` decodable on `AnyMessage` channels.
    pub fn register_type<T: SchemaMessage>(self) -> Self {
        self.types.register::<T>();
        self
    }

    /// Make every `#[schema_message]` type linked into the binary decodable.
    pub fn with_linked_types(self) -> Self {
        self.types.add_linked_types();
        self
    }

    /// Build the runtime. The receiver is the draining end of the outgoing queue; hand it
    /// to a router such as [`LocalRouter`](crate::LocalRouter).
    pub fn build(self) -> (Arc<Runtime>, mpsc::UnboundedReceiver<WireEnvelope>) {
        let (outgoing, receiver) = OutgoingQueue::new();
        info!(schema_types = self.types.len(), "Building runtime");

        let codecs = Arc::new(CodecRegistry::new(self.types));
        let mut channels = ChannelRegistry::new(Arc::clone(&codecs), outgoing);
        if let Some(user) = self.user_id.or_else(|| self.config.get_string("user_id").ok()) {
            channels = channels.with_user_id(user);
        }
        let channels = Arc::new(channels);
        let runtime = Runtime {
            config: Arc::new(self.config),
            codecs,
            channels,
        };
        (Arc::new(runtime), receiver)
    }
}
