use std::time::Duration;

use chrono::{Local, TimeDelta};
use weft::{Module, ModuleContext, ModuleError, ModuleHost, Periodic, Properties, Runtime, TimeWindow};

/// Ticks every 200ms, but only inside a window that opens shortly after startup and
/// closes two seconds later.
#[derive(Default)]
struct Shift {
    ticks: u32,
}

impl Module for Shift {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        let now = Local::now();
        let window = TimeWindow::new(
            (now + TimeDelta::seconds(2)).time(),
            (now + TimeDelta::seconds(4)).time(),
        )?;
        println!("Active window: {window}");

        let every = Periodic::every(Duration::from_millis(200))
            .starting_at(now + TimeDelta::seconds(1))
            .only_active_between(window);
        ctx.register_periodic_function("tick", every, |module, _| {
            module.ticks += 1;
            println!("[SHIFT] tick #{} at {}", module.ticks, Local::now().format("%H:%M:%S%.3f"));
        })?;

        ctx.register_scheduled_function("closing", now + TimeDelta::seconds(5), |module, ctx| {
            println!("[SHIFT] closing after {} ticks", module.ticks);
            ctx.unregister_all_periodic_functions();
        })?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (runtime, _outgoing) = Runtime::builder().build();
    let mut shift = ModuleHost::new("shift", Shift::default(), &runtime);
    shift.start().await?;

    tokio::time::sleep(Duration::from_secs(6)).await;
    println!("\nPending tasks: {}", shift.pending_tasks());
    shift.shutdown().await?;
    Ok(())
}
