use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use weft::weft_runtime::{schema_mutator, Mutator, TypeRegistry};
use weft::{
    schema_message, AnyMessage, Channel, ChannelData, CodecError, CodecTag, LocalRouter, Module,
    ModuleContext, ModuleError, ModuleHost, Payload, Properties, Runtime, SchemaMessage,
};

#[schema_message(name = "test.Reading")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
}

#[schema_message]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Alarm {
    code: u32,
}

/// Implemented by hand, so never part of the linked types.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Unlinked {
    note: String,
}

impl SchemaMessage for Unlinked {
    const FULL_NAME: &'static str = "test.Unlinked";
}

impl Payload for Unlinked {
    fn mutator() -> Mutator<Self> {
        schema_mutator::<Self>()
    }
}

#[test]
fn macro_names_and_registers_types() {
    assert_eq!(Reading::FULL_NAME, "test.Reading");
    assert_eq!(Alarm::FULL_NAME, "Alarm");
    assert_eq!(Reading::mutator().codec_tag(), CodecTag::Schema);

    let types = TypeRegistry::with_linked_types();
    assert!(types.contains("test.Reading"));
    assert!(types.contains("Alarm"));
    assert!(!types.contains("test.Unlinked"));
}

#[test]
fn typed_schema_round_trip() {
    let reading = Reading {
        sensor: "hall".into(),
        value: 3.5,
    };
    let blob = Reading::mutator().encode(&reading).unwrap();
    assert_eq!(blob.type_name(), "test.Reading");
    let decoded = Reading::mutator().decode(&blob, &TypeRegistry::new()).unwrap();
    assert_eq!(decoded, reading);
}

struct Hub {
    events: Channel<AnyMessage>,
}

impl Module for Hub {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        self.events = ctx.publish("events");
        Ok(())
    }
}

struct Logger {
    seen: Arc<Mutex<Vec<AnyMessage>>>,
}

impl Module for Logger {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        ctx.subscribe("events", |module: &mut Self, _, data: ChannelData<AnyMessage>| {
            module.seen.lock().push(data.into_value());
        });
        Ok(())
    }
}

#[tokio::test]
async fn wildcard_channel_carries_heterogeneous_messages() {
    let (runtime, outgoing) = Runtime::builder().with_linked_types().build();
    let router = LocalRouter::new(Arc::clone(runtime.channels()), outgoing).spawn();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut logger = ModuleHost::new("logger", Logger { seen: Arc::clone(&seen) }, &runtime);
    let hub = Hub {
        events: Channel::invalid("events"),
    };
    let mut hub = ModuleHost::new("hub", hub, &runtime);
    logger.start().await.unwrap();
    hub.start().await.unwrap();

    hub.inspect(|m| {
        m.events
            .post(&AnyMessage::new(Reading {
                sensor: "hall".into(),
                value: 1.0,
            }))
            .unwrap();
        m.events.post(&Alarm { code: 7 }.into()).unwrap();
    });

    for _ in 0..200 {
        if seen.lock().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].type_name(), "test.Reading");
    assert_eq!(seen[0].downcast_ref::<Reading>().map(|r| r.value), Some(1.0));
    assert_eq!(seen[1].downcast_ref::<Alarm>(), Some(&Alarm { code: 7 }));
    router.abort();
}

#[tokio::test]
async fn unknown_dynamic_type_is_rejected_on_delivery() {
    let (runtime, mut outgoing) = Runtime::builder().register_type::<Reading>().build();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut logger = ModuleHost::new("logger", Logger { seen: Arc::clone(&seen) }, &runtime);
    let mut hub = ModuleHost::new("hub", Hub { events: Channel::invalid("events") }, &runtime);
    logger.start().await.unwrap();
    hub.start().await.unwrap();

    hub.inspect(|m| m.events.post(&AnyMessage::new(Unlinked { note: "?".into() })))
        .unwrap();
    let envelope = outgoing.recv().await.unwrap();
    assert_eq!(envelope.payload().type_name(), "test.Unlinked");
    assert!(runtime.channels().is_compatible(&envelope, "logger"));

    let endpoints = runtime.channels().subscribers_of("events", "logger");
    assert_eq!(endpoints.len(), 1);
    match endpoints[0].on_new_data(&envelope) {
        Err(CodecError::UnknownPayloadType { type_name }) => assert_eq!(type_name, "test.Unlinked"),
        other => panic!("expected an unknown payload type error, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(seen.lock().is_empty());
}
