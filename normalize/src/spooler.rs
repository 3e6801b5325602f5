use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::collector::Collector;
use crate::config::{DestinationCapabilities, NormalizeConfiguration};
use crate::error::NormalizeError;
use crate::mapper::ParallelMapper;
use crate::metrics::WriterMetrics;
use crate::pool::{InlinePool, Pool};
use crate::schema::{merge_schema_updates, Schema};
use crate::storage::{LoadStorage, NormalizeStorage, SchemaStorage};

///
/// What one package's run produced, for the Driver's step-info bookkeeping
/// (§4.7's `table_metrics`/`job_metrics`).
///
pub struct SpoolMetrics {
    pub table_metrics: HashMap<String, WriterMetrics>,
    pub file_metrics: Vec<WriterMetrics>,
}

///
/// Per-package orchestration (§4.6): import the extracted package, run the
/// mapper (parallel, with a single-worker fallback on an unrecoverable
/// conflict), update the schema's `x-normalizer` bookkeeping, persist the
/// schema and its update manifest, and commit atomically.
///
pub struct Spooler<'a> {
    normalize_storage: Arc<dyn NormalizeStorage>,
    load_storage: Arc<dyn LoadStorage>,
    schema_storage: Arc<dyn SchemaStorage>,
    caps: DestinationCapabilities,
    config: NormalizeConfiguration,
    pool: &'a dyn Pool,
    cancel: &'a AtomicBool,
    collector: &'a dyn Collector,
}

impl<'a> Spooler<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        normalize_storage: Arc<dyn NormalizeStorage>,
        load_storage: Arc<dyn LoadStorage>,
        schema_storage: Arc<dyn SchemaStorage>,
        caps: DestinationCapabilities,
        config: NormalizeConfiguration,
        pool: &'a dyn Pool,
        cancel: &'a AtomicBool,
        collector: &'a dyn Collector,
    ) -> Self {
        Self { normalize_storage, load_storage, schema_storage, caps, config, pool, cancel, collector }
    }

    ///
    /// Import `load_id`'s extracted package fresh into the load area. Called
    /// once up front and again if the single-worker fallback needs to start
    /// from a clean slate (§4.6 steps 1-2, and again inside the fallback arm).
    ///
    fn reimport(&self, load_id: &str) -> Result<(), NormalizeError> {
        self.load_storage.delete_new_package(load_id, true)?;
        self.load_storage.import_extracted_package(load_id, self.normalize_storage.as_ref())
    }

    ///
    /// Run one package end to end. `schema` is the schema the Driver resolved
    /// for this load_id (extracted vs. storage already reconciled); on success
    /// it's replaced with the final, possibly-widened schema for this run.
    ///
    pub fn run(&self, load_id: &str, schema: &mut Schema, files: &[String]) -> Result<SpoolMetrics, NormalizeError> {
        self.reimport(load_id)?;
        log::info!("Created new load package {} on loading volume", load_id);

        let mut local_schema = schema.clone_with_fresh_naming();
        let mapper = ParallelMapper::new(self.load_storage.clone(), self.caps.clone(), self.config.clone(), self.pool, Some(self.cancel));

        let outcome = match mapper.run(load_id, &mut local_schema, files) {
            Ok(outcome) => outcome,
            Err(err) if err.is_coercion_conflict() => {
                log::warn!(
                    "Parallel schema update conflict for load {}, switching to single-worker fallback ({})",
                    load_id, err
                );
                self.reimport(load_id)?;
                local_schema = schema.clone_with_fresh_naming();
                let inline = InlinePool::default();
                let fallback = ParallelMapper::new(self.load_storage.clone(), self.caps.clone(), self.config.clone(), &inline, Some(self.cancel));
                // A second conflict in the single-worker fallback is fatal (§7): there is
                // no further recovery policy, so this propagates unchanged.
                fallback.run(load_id, &mut local_schema, files)?
            }
            Err(other) => return Err(other),
        };

        let table_metrics = outcome.table_metrics();
        self.mark_seen(&mut local_schema, table_metrics.keys(), load_id);

        if local_schema.is_modified() {
            log::info!("Saving schema {} with version {}", local_schema.name(), local_schema.version());
            self.schema_storage.save_schema(&local_schema.to_snapshot())?;
        } else {
            log::info!("Schema {} was not modified, save skipped", local_schema.name());
        }

        self.load_storage.save_schema(load_id, &local_schema.to_snapshot())?;
        let merged_updates = merge_schema_updates(&outcome.schema_updates);
        self.load_storage.save_schema_updates(load_id, &merged_updates)?;

        if self.cancel.load(Ordering::SeqCst) {
            return Err(NormalizeError::Signalled);
        }

        log::info!("Committing storage for load {}, do not kill this process", load_id);
        self.load_storage.commit_new_load_package(load_id)?;
        self.normalize_storage.delete_package(load_id, false)?;
        log::info!("Extracted package {} processed", load_id);

        self.collector.update("Files", outcome.file_metrics.len() as u64);
        self.collector.update("Items", outcome.file_metrics.iter().map(|m| m.items_count).sum());

        *schema = local_schema;

        Ok(SpoolMetrics { table_metrics, file_metrics: outcome.file_metrics })
    }

    ///
    /// For every table that produced data this run: clear the one-shot
    /// `evolve-columns-once` flag and set `seen-data` (§4.6 step 5). Logging
    /// the transition only the first time a table sees data keeps this
    /// idempotent under retries (P5).
    ///
    fn mark_seen<'t>(&self, schema: &mut Schema, table_names: impl Iterator<Item = &'t String>, load_id: &str) {
        for table_name in table_names {
            if let Some(table) = schema.tables_mut().get_mut(table_name) {
                table.x_normalizer.evolve_columns_once = None;
                if table.x_normalizer.seen_data != Some(true) {
                    log::info!("Table {} has seen data for a first time with load id {}", table_name, load_id);
                }
                table.x_normalizer.seen_data = Some(true);
            }
        }
    }
}
