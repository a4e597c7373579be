use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use weft::{Module, ModuleContext, ModuleError, ModuleHost, Periodic, Properties, Runtime, TimeWindow};

#[derive(Default)]
struct Tick {
    runs: Vec<DateTime<Local>>,
}

impl Module for Tick {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        let every = Periodic::every(Duration::from_millis(100)).starting_at(Local::now());
        ctx.register_periodic_function("tick", every, |module, _| module.runs.push(Local::now()))?;
        Ok(())
    }
}

#[test]
fn tick_every_100ms_for_950ms() {
    let (runtime, _outgoing) = Runtime::builder().build();
    let mut host = ModuleHost::new("ticker", Tick::default(), &runtime);
    let started = Local::now();
    host.start_blocking().unwrap();

    let elapsed = (Local::now() - started).to_std().unwrap_or_default();
    std::thread::sleep(Duration::from_millis(950).saturating_sub(elapsed));
    let runs = host.inspect(|m| m.runs.clone());
    host.shutdown_blocking().unwrap();

    assert!((9..=10).contains(&runs.len()), "got {} runs", runs.len());
    assert!(runs.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[derive(Default)]
struct Outside {
    runs: usize,
}

impl Module for Outside {
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, _: &Properties) -> Result<(), ModuleError> {
        // A one-minute window that starts two hours from now.
        let start = (Local::now() + TimeDelta::hours(2)).time();
        let stop = start + TimeDelta::minutes(1);
        let window = TimeWindow::new(start, stop)?;
        let every = Periodic::every(Duration::from_millis(5))
            .starting_at(Local::now())
            .only_active_between(window);
        ctx.register_periodic_function("gated", every, |module, _| module.runs += 1)?;
        Ok(())
    }
}

#[test]
fn windowed_function_waits_for_its_window() {
    let (runtime, _outgoing) = Runtime::builder().build();
    let mut host = ModuleHost::new("gated", Outside::default(), &runtime);
    host.start_blocking().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    // The initial due time is "now"; after that single run the window defers it.
    let runs = host.inspect(|m| m.runs);
    assert!(runs <= 1, "ran {runs} times outside its window");
    host.shutdown_blocking().unwrap();
}

#[test]
fn window_bounds_render_and_parse() {
    let window: TimeWindow = "10:00-12:00".parse().unwrap();
    assert_eq!(window.start(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(window.to_string().parse::<TimeWindow>().unwrap(), window);
}
