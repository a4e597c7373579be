use super::context::ModuleContext;
use crate::config::Properties;
use crate::error::ModuleError;

/// A unit of user logic with its own dispatcher.
///
/// All callbacks of one module, including channel deliveries and timers, run one after
/// another on that dispatcher's thread.
///
/// ```ignore
/// struct Thermometer {
///     temperature: Channel<f64>,
/// }
///
/// impl Module for Thermometer {
///     fn initialize(&mut self, ctx: &mut ModuleContext<Self>, props: &Properties) -> Result<(), ModuleError> {
///         self.temperature = ctx.publish("temperature");
///         let interval = props.get_duration("interval")?;
///         ctx.register_periodic_function("sample", Periodic::every(interval), |module, _| {
///             let _ = module.temperature.post(&read_sensor());
///         })?;
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Send + Sized + 'static {
    /// Declare channels and timers. The only place where `publish` and `subscribe` work.
    fn initialize(&mut self, ctx: &mut ModuleContext<Self>, properties: &Properties) -> Result<(), ModuleError>;

    /// Runs during shutdown, after all timers have been cancelled.
    fn terminate(&mut self, _ctx: &mut ModuleContext<Self>) {}

    fn on_pause(&mut self, _ctx: &mut ModuleContext<Self>) {}

    fn on_resume(&mut self, _ctx: &mut ModuleContext<Self>) {}
}
