//! Typed channels and the registry that wires publishers to subscribers.

mod channel;
mod data;
mod descriptor;
mod publisher;
mod queue;
mod registry;
mod subscriber;

pub use channel::{AccessRights, Channel};
pub use data::ChannelData;
pub use descriptor::{ChannelDescriptor, Direction};
pub use publisher::Publisher;
pub use queue::OutgoingQueue;
pub use registry::ChannelRegistry;
pub use subscriber::{Subscriber, SubscriberEndpoint};
