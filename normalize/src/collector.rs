///
/// Progress-reporting capability consulted by the Spooler and Driver as
/// packages and files are processed (§4.6 step 10, §4.7). A host application
/// can wire in a progress bar or metrics sink without the core depending on
/// any particular UI - spec.md §1 explicitly keeps "metrics collection UI"
/// out of scope, the Collector interface is what's left after that's removed.
///
pub trait Collector: Send + Sync {
    ///
    /// Report that `amount` more of `name` (e.g. "Files", "Items") has been
    /// processed since the last call.
    ///
    fn update(&self, name: &str, amount: u64);

    ///
    /// Called once per package, before normalizing it.
    ///
    fn begin(&self, description: &str) {
        let _ = description;
    }

    fn end(&self) {}
}

///
/// The default: discards every report. Matches the original's `NULL_COLLECTOR`.
///
#[derive(Default)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn update(&self, _name: &str, _amount: u64) {}
}

///
/// Routes progress through the `log` facade at debug/info level - useful for a
/// CLI entrypoint that has no progress-bar dependency of its own.
///
#[derive(Default)]
pub struct LoggingCollector;

impl Collector for LoggingCollector {
    fn update(&self, name: &str, amount: u64) {
        log::debug!("{}: +{}", name, amount);
    }

    fn begin(&self, description: &str) {
        log::info!("{}", description);
    }
}
