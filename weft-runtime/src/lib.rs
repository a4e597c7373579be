//! Weft Runtime - module dispatch and typed messaging engine
//!
//! Every module runs on its own dispatcher thread. Modules exchange values over named,
//! typed channels; publishers encode into [`WireEnvelope`]s, a router delivers them, and
//! subscribers decode and queue the user callback on the receiving module's dispatcher.

mod channel;
mod codec;
mod config;
mod dispatcher;
mod error;
mod module;
mod router;
mod runtime;
mod schedule;
mod time_unit;

// Re-export public API
pub use channel::{
    AccessRights, Channel, ChannelData, ChannelDescriptor, ChannelRegistry, Direction, OutgoingQueue,
    Publisher, Subscriber, SubscriberEndpoint,
};
pub use codec::{
    schema_mutator, AnyMessage, CodecRegistry, CodecTag, DynMessage, Mutator, Payload, PayloadBlob,
    SchemaMessage, SchemaRegistration, TypeRegistry, WireEnvelope, SCHEMA_TYPES,
};
pub use config::{load_toml_config, load_yaml_config, resolve_config_value, Properties};
pub use dispatcher::{Dispatcher, DispatcherHandle, Task, TaskHandle};
pub use error::{ChannelError, CodecError, DispatcherError, ModuleError, PropertyError, ScheduleError};
pub use linkme;
pub use module::{EventTracker, Module, ModuleContext, ModuleHost, ModuleRef, ModuleState};
pub use router::LocalRouter;
pub use runtime::{Runtime, RuntimeBuilder};
pub use schedule::{next_time_of_day, parse_time_of_day, Periodic, RepeatedInterval, Schedule, ScheduleOnce, TimeWindow};
pub use time_unit::TimeUnit;
