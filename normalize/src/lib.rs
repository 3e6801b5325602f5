pub mod collector;
pub mod config;
pub mod driver;
pub mod error;
pub mod file_naming;
pub mod grouper;
pub mod item_normalizer;
pub mod mapper;
pub mod metrics;
pub mod pool;
pub mod reconciler;
pub mod schema;
pub mod spooler;
pub mod storage;
pub mod worker;
pub mod writer_resolver;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use collector::NullCollector;
use config::{DestinationCapabilities, NormalizeConfiguration};
use driver::{Driver, RunMetrics};
use error::NormalizeError;
use pool::{InlinePool, Pool, RayonPool};

///
/// Build a `Driver` wired to filesystem-backed storages rooted per `config`,
/// size its worker pool to `config.pool_width`, and run one normalize pass
/// against whatever extracted packages currently exist. This collapses the
/// original's `Normalize(...).run(pool)` call pair into a single entrypoint
/// for the CLI binary; library callers that need a persistent `Driver` (to
/// call `get_step_info`/`get_load_package_info` after the fact, or to supply
/// their own pool/collector/cancellation flag) should construct one directly.
///
pub fn run(config: NormalizeConfiguration, caps: DestinationCapabilities) -> Result<RunMetrics, NormalizeError> {
    let pool_width = config.pool_width;
    let driver = Driver::new(config, caps, Box::new(NullCollector), Arc::new(AtomicBool::new(false)));

    let pool: Box<dyn Pool> = if pool_width > 1 {
        Box::new(RayonPool::new(pool_width).map_err(|err| NormalizeError::PoolInitFailed(err.to_string()))?)
    } else {
        Box::new(InlinePool::default())
    };

    driver.run(pool.as_ref())
}
