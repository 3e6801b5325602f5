use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use chrono::Utc;
use crate::collector::Collector;
use crate::config::{DestinationCapabilities, NormalizeConfiguration};
use crate::error::NormalizeError;
use crate::metrics::WriterMetrics;
use crate::pool::Pool;
use crate::schema::Schema;
use crate::spooler::Spooler;
use crate::storage::{LoadPackageInfo, LoadStorage, NormalizeStorage, SchemaStorage};
use crate::storage::fs::{FsLoadStorage, FsNormalizeStorage, FsSchemaStorage};

///
/// `(done, pending)` as spec.md §4.7 states: `done=true` only when there were
/// no extracted packages at all when the run started; `pending` is however
/// many packages were left in the extracted area when the run finished (an
/// extractor running concurrently may have added more).
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunMetrics {
    pub done: bool,
    pub pending: usize,
}

///
/// Accumulated reporting for one load_id, mirroring the original's
/// `_step_info_start_load_id`/`_step_info_complete_load_id` pair. Retrievable
/// after a run via `Driver::get_step_info`.
///
#[derive(Clone, Debug, Default)]
pub struct StepInfo {
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub table_metrics: HashMap<String, WriterMetrics>,
}

///
/// Enumerates extracted packages, reconciles each one's embedded schema
/// against Schema Storage, and invokes the Spooler for every non-empty
/// package (§4.7).
///
pub struct Driver {
    normalize_storage: Arc<dyn NormalizeStorage>,
    load_storage: Arc<dyn LoadStorage>,
    schema_storage: Arc<dyn SchemaStorage>,
    caps: DestinationCapabilities,
    config: NormalizeConfiguration,
    collector: Box<dyn Collector>,
    cancel: Arc<AtomicBool>,
    step_info: Mutex<HashMap<String, StepInfo>>,
}

impl Driver {
    pub fn new(config: NormalizeConfiguration, caps: DestinationCapabilities, collector: Box<dyn Collector>, cancel: Arc<AtomicBool>) -> Self {
        let normalize_storage: Arc<dyn NormalizeStorage> = Arc::new(FsNormalizeStorage::new(&config.normalize_storage_root));
        let load_storage: Arc<dyn LoadStorage> = Arc::new(FsLoadStorage::new(&config.load_storage_root));
        let schema_storage: Arc<dyn SchemaStorage> = Arc::new(FsSchemaStorage::new(&config.schema_storage_root));

        Self {
            normalize_storage,
            load_storage,
            schema_storage,
            caps,
            config,
            collector,
            cancel,
            step_info: Mutex::new(HashMap::new()),
        }
    }

    ///
    /// Wire the Driver directly to caller-supplied storages, bypassing the
    /// filesystem defaults. Used by tests that need fixture-backed or fake
    /// storages rather than real directories.
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn with_storages(
        normalize_storage: Arc<dyn NormalizeStorage>,
        load_storage: Arc<dyn LoadStorage>,
        schema_storage: Arc<dyn SchemaStorage>,
        caps: DestinationCapabilities,
        config: NormalizeConfiguration,
        collector: Box<dyn Collector>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self { normalize_storage, load_storage, schema_storage, caps, config, collector, cancel, step_info: Mutex::new(HashMap::new()) }
    }

    pub fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError> {
        match self.load_storage.get_load_package_info(load_id) {
            Ok(info) => Ok(info),
            Err(_) => self.normalize_storage.get_load_package_info(load_id),
        }
    }

    pub fn get_step_info(&self) -> HashMap<String, StepInfo> {
        self.step_info.lock().expect("step info lock poisoned").clone()
    }

    ///
    /// Enumerate extracted load-ids and normalize each one in turn, against
    /// `pool` (§5: "the pool is externally supplied; when absent, an inline
    /// null-pool executes synchronously" - callers pass `&InlinePool` for that
    /// case). Returns once every currently-extracted package has either been
    /// normalized or found empty and discarded.
    ///
    pub fn run(&self, pool: &dyn Pool) -> Result<RunMetrics, NormalizeError> {
        log::info!("Running file normalizing");

        let load_ids = self.normalize_storage.list_packages()?;
        log::info!("Found {} load packages", load_ids.len());

        if load_ids.is_empty() {
            return Ok(RunMetrics { done: true, pending: 0 });
        }

        for load_id in &load_ids {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(NormalizeError::Signalled);
            }

            let mut schema = Schema::from_snapshot(self.normalize_storage.load_schema(load_id)?);

            if let Some(stored_snapshot) = self.schema_storage.load_schema(schema.name())? {
                let stored_schema = Schema::from_snapshot(stored_snapshot);
                if stored_schema.version_hash() != schema.version_hash() {
                    log::warn!(
                        "When normalizing package {} with schema {}: the storage schema hash {} is \
                         different from the extracted package's schema hash {}. The storage schema was used.",
                        load_id, schema.name(), stored_schema.version_hash(), schema.version_hash()
                    );
                }
                schema = stored_schema;
            }

            let files = self.normalize_storage.list_new_jobs(load_id)?;
            log::info!("Found {} files in schema {} load_id {}", files.len(), schema.name(), load_id);

            if files.is_empty() {
                self.normalize_storage.delete_package(load_id, true)?;
                log::info!("Empty package {} processed", load_id);
                continue;
            }

            self.collector.begin(&format!("Normalize {} in {}", schema.name(), load_id));
            self.step_info.lock().expect("step info lock poisoned")
                .insert(load_id.clone(), StepInfo { started_at: Some(Utc::now().timestamp_millis()), ..Default::default() });

            let spooler = Spooler::new(
                self.normalize_storage.clone(),
                self.load_storage.clone(),
                self.schema_storage.clone(),
                self.caps.clone(),
                self.config.clone(),
                pool,
                self.cancel.as_ref(),
                self.collector.as_ref(),
            );

            let metrics = spooler.run(load_id, &mut schema, &files)?;

            let mut guard = self.step_info.lock().expect("step info lock poisoned");
            if let Some(info) = guard.get_mut(load_id) {
                info.finished_at = Some(Utc::now().timestamp_millis());
                info.table_metrics = metrics.table_metrics;
            }
            drop(guard);

            self.collector.end();
        }

        Ok(RunMetrics { done: false, pending: self.normalize_storage.list_packages()?.len() })
    }
}
