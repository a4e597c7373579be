//! # Weft - typed publish/subscribe between independently scheduled modules
//!
//! A weft application is a set of modules. Each module runs on its own dispatcher thread
//! and talks to other modules only through named, typed channels.
//!
//! ## Features
//!
//! - **One thread per module**: all callbacks of a module, timers and channel deliveries
//!   alike, run one after another
//! - **Timers**: periodic functions, optionally only active inside a daily time window,
//!   and one-shot scheduled functions
//! - **Typed channels**: numbers, bools, strings, arrays, maps and schema messages
//! - **Dynamic messages**: `AnyMessage` channels carry any `#[schema_message]` type,
//!   resolved by name when received
//! - **Config support**: per-module properties from TOML/YAML, with `${key:default}`
//!   placeholders and `WEFT__...` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use weft::{Channel, ChannelData, LocalRouter, Module, ModuleContext, ModuleError, ModuleHost, Periodic, Properties, Runtime};
//!
//! struct Thermometer {
//!     temperature: Channel<f64>,
//! }
//!
//! impl Module for Thermometer {
//!     fn initialize(&mut self, ctx: &mut ModuleContext<Self>, props: &Properties) -> Result<(), ModuleError> {
//!         self.temperature = ctx.publish("temperature");
//!         ctx.register_periodic_function("sample", Periodic::every(props.get_duration("interval")?), |module, _| {
//!             let _ = module.temperature.post(&21.5);
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! struct Display;
//!
//! impl Module for Display {
//!     fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
//!         ctx.subscribe("temperature", |_, ctx, data: ChannelData<f64>| {
//!             ctx.module().info(format_args!("{} °C", data.value()));
//!         });
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (runtime, outgoing) = Runtime::builder().build();
//!     LocalRouter::new(runtime.channels().clone(), outgoing).spawn();
//!
//!     let mut display = ModuleHost::new("display", Display, &runtime);
//!     let mut thermometer = ModuleHost::new("thermometer", Thermometer { temperature: Channel::invalid("temperature") }, &runtime);
//!     display.start().await?;
//!     thermometer.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     thermometer.shutdown().await?;
//!     display.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Create `config/application.toml`:
//!
//! ```toml
//! [modules.thermometer]
//! interval = "500ms"
//! active = "08:00-18:00"
//! ```
//!
//! You can also use environment variables with the `WEFT__` prefix:
//!
//! ```bash
//! export WEFT__MODULES__THERMOMETER__INTERVAL=2s
//! ```

// Re-export macros
pub use weft_macro::schema_message;

// Re-export core types
pub use weft_runtime::{
    AccessRights, AnyMessage, Channel, ChannelData, ChannelError, CodecError, CodecTag, EventTracker,
    LocalRouter, Module, ModuleContext, ModuleError, ModuleHost, ModuleRef, ModuleState, Payload,
    Periodic, Properties, PropertyError, Runtime, RuntimeBuilder, Schedule, ScheduleError, SchemaMessage,
    TaskHandle, TimeUnit, TimeWindow, WireEnvelope,
};

// Make weft_runtime available for macro expansion
pub use weft_runtime;
