/// Receives module lifecycle events, e.g. for usage analytics.
///
/// All methods default to doing nothing.
pub trait EventTracker: Send + Sync {
    fn on_module_started(&self, _module_id: &str, _module_type: &str) {}

    fn on_module_stopped(&self, _module_id: &str, _module_type: &str) {}

    fn on_module_paused(&self, _module_id: &str, _module_type: &str) {}

    fn on_module_resumed(&self, _module_id: &str, _module_type: &str) {}
}
