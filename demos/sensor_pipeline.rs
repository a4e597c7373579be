use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft::{
    schema_message, AnyMessage, Channel, ChannelData, LocalRouter, Module, ModuleContext, ModuleError, ModuleHost,
    Periodic, Properties, RuntimeBuilder,
};

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/config/sensor_pipeline.toml");

#[schema_message(name = "demo.Sample")]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    location: String,
    celsius: f64,
}

#[schema_message(name = "demo.Overheat")]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Overheat {
    celsius: f64,
}

/// Publishes a slowly rising temperature and forwards notable events to "events".
struct Thermometer {
    temperature: Channel<f64>,
    events: Channel<AnyMessage>,
    location: String,
    celsius: f64,
}

impl Module for Thermometer {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, props: &Properties) -> Result<(), ModuleError> {
        self.temperature = ctx.publish("temperature");
        self.events = ctx.publish("events");
        self.location = props.get_or("location", "unknown".to_string())?;

        let every = Periodic::every(props.get_duration("interval")?);
        ctx.register_periodic_function("sample", every, |module, ctx| {
            module.celsius += 0.75;
            if let Err(e) = module.temperature.post(&module.celsius) {
                ctx.module().warning(e);
            }

            let sample = Sample {
                location: module.location.clone(),
                celsius: module.celsius,
            };
            let _ = module.events.post(&sample.into());
            if module.celsius > 24.0 {
                let _ = module.events.post(&Overheat { celsius: module.celsius }.into());
            }
        })?;
        Ok(())
    }

    fn terminate(&mut self, ctx: &mut ModuleContext<Self>) {
        ctx.module().info(format_args!("last reading {:.2}", self.celsius));
    }
}

struct Display {
    unit: String,
}

impl Module for Display {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, props: &Properties) -> Result<(), ModuleError> {
        self.unit = props.get_or("unit", "C".to_string())?;
        ctx.subscribe("temperature", |module: &mut Self, _, data: ChannelData<f64>| {
            println!("[DISPLAY] {:.2} {} (#{})", data.value(), module.unit, data.sequence_id());
        });
        Ok(())
    }
}

/// Receives every message type on "events" and sorts them by name.
struct Logger;

impl Module for Logger {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        ctx.subscribe("events", |_: &mut Self, _, data: ChannelData<AnyMessage>| {
            let message = data.value();
            if let Some(sample) = message.downcast_ref::<Sample>() {
                println!("[LOGGER] sample from {}: {:.2}", sample.location, sample.celsius);
            } else if let Some(alarm) = message.downcast_ref::<Overheat>() {
                println!("[LOGGER] OVERHEAT {:.2}", alarm.celsius);
            } else {
                println!("[LOGGER] unhandled {}", message.type_name());
            }
        });
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Starting sensor pipeline with {CONFIG}\n");
    let (runtime, outgoing) = RuntimeBuilder::with_toml(CONFIG)?.with_linked_types().build();
    let router = LocalRouter::new(runtime.channels().clone(), outgoing).spawn();

    let mut display = ModuleHost::new(
        "display",
        Display { unit: String::new() },
        &runtime,
    );
    let mut logger = ModuleHost::new("logger", Logger, &runtime);
    let thermometer = Thermometer {
        temperature: Channel::invalid("temperature"),
        events: Channel::invalid("events"),
        location: String::new(),
        celsius: 20.0,
    };
    let mut thermometer = ModuleHost::new("thermometer", thermometer, &runtime);

    display.start().await?;
    logger.start().await?;
    thermometer.start().await?;
    runtime.channels().validate_wiring()?;

    tokio::time::sleep(Duration::from_secs(5)).await;

    thermometer.shutdown().await?;
    logger.shutdown().await?;
    display.shutdown().await?;
    router.abort();

    println!("\nPipeline stopped");
    Ok(())
}
