use std::collections::HashMap;
use std::sync::Arc;
use crate::config::{DestinationCapabilities, NormalizeConfiguration};
use crate::error::NormalizeError;
use crate::file_naming::ParsedLoadJobFileName;
use crate::item_normalizer::{item_format_from_extension, ArrowNormalizer, ItemNormalizer, JsonLinesNormalizer};
use crate::metrics::WriterMetrics;
use crate::schema::{Schema, SchemaSnapshot, SchemaUpdate};
use crate::storage::{ItemStorage, LoadStorage};
use crate::writer_resolver::WriterResolver;

///
/// `(config_snapshot, storage_configs, stored_schema, load_id, files) ->
/// {schema_updates, file_metrics}` (§4.3), or fails with `NormalizeJobFailed`
/// carrying whatever file metrics were salvaged before the failure.
///
pub struct WorkerResult {
    pub schema_updates: SchemaUpdate,
    pub file_metrics: Vec<WriterMetrics>,
}

///
/// One worker's slice of a normalize run: a disjoint group of files, processed
/// in the order `FileGrouper` handed them over. The worker's local `Schema` is
/// read-only scaffolding - it supplies naming and "what do I already know about
/// this column" context to item normalizers, but schema deltas it produces are
/// never folded back into it. Only the `ParallelMapper`, running on the calling
/// thread via `SchemaReconciler`, ever mutates the authoritative schema.
///
pub struct WorkerJob {
    load_id: String,
    job_id: String,
    files: Vec<String>,
    schema: Schema,
    load_storage: Arc<dyn LoadStorage>,
    caps: DestinationCapabilities,
    config: NormalizeConfiguration,
    normalizers: HashMap<String, Box<dyn ItemNormalizer>>,
}

impl WorkerJob {
    pub fn new(
        load_id: impl Into<String>,
        job_id: impl Into<String>,
        files: Vec<String>,
        schema_snapshot: SchemaSnapshot,
        load_storage: Arc<dyn LoadStorage>,
        caps: DestinationCapabilities,
        config: NormalizeConfiguration,
    ) -> Self {
        Self {
            load_id: load_id.into(),
            job_id: job_id.into(),
            files,
            schema: Schema::from_snapshot(schema_snapshot),
            load_storage,
            caps,
            config,
            normalizers: HashMap::new(),
        }
    }

    ///
    /// Lazily materialize this worker's normalizer for `table_name`, resolving a
    /// writer specification and opening item storage the first time the table is
    /// seen. One normalizer instance per table per worker, matching
    /// `_get_items_normalizer`'s cache in the original.
    ///
    fn normalizer_for(&mut self, table_name: &str, item_format: &str) -> Result<&mut Box<dyn ItemNormalizer>, NormalizeError> {
        if !self.normalizers.contains_key(table_name) {
            let table_schema = self.schema.table(table_name).cloned()
                .unwrap_or_else(|| crate::schema::table::TableSchema::new(table_name));

            let spec = WriterResolver::resolve(&table_schema, item_format, &self.caps, &self.config)?;
            let item_storage: Box<dyn ItemStorage> = self.load_storage.create_item_storage(&self.load_id, table_name, &spec)?;

            let normalizer: Box<dyn ItemNormalizer> = match item_format_from_extension(&spec.item_format) {
                "arrow" => Box::new(ArrowNormalizer::new(item_storage, spec)),
                _ => Box::new(JsonLinesNormalizer::new(item_storage, spec)),
            };

            self.normalizers.insert(table_name.to_string(), normalizer);
        }

        Ok(self.normalizers.get_mut(table_name).expect("just inserted"))
    }

    pub fn run(mut self) -> Result<WorkerResult, NormalizeError> {
        let mut schema_updates: SchemaUpdate = HashMap::new();

        let outcome = (|| -> Result<(), NormalizeError> {
            for file_path in &self.files {
                let parsed = ParsedLoadJobFileName::parse(file_path)?;
                let table_name = self.schema.normalize_table_identifier(parsed.table_name());

                let normalizer = self.normalizer_for(&table_name, parsed.file_format())?;
                let partials = normalizer.normalize(std::path::Path::new(file_path), &table_name)?;

                schema_updates.entry(table_name).or_insert_with(Vec::new).extend(partials);
            }
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                let file_metrics = self.finalize_writers(false)?;
                Ok(WorkerResult { schema_updates, file_metrics })
            }
            Err(cause) => {
                // Cleanup-in-exception (§4.3 step 5): try a clean close first; if that
                // itself fails, force a close without flushing so OS handles are released,
                // then gather whatever metrics actually closed either way.
                let partial_metrics = match self.finalize_writers(false) {
                    Ok(metrics) => metrics,
                    Err(_) => self.finalize_writers(true).unwrap_or_default(),
                };

                Err(NormalizeError::NormalizeJobFailed {
                    load_id: self.load_id.clone(),
                    job_id: self.job_id.clone(),
                    cause: cause.to_string(),
                    partial_metrics,
                })
            }
        }
    }

    ///
    /// Close every open per-table writer, collect their closed-file metrics, and
    /// drop the normalizer cache. Called once on the success path and, with
    /// `skip_flush=true` as the fallback leg, on the failure path.
    ///
    fn finalize_writers(&mut self, skip_flush: bool) -> Result<Vec<WriterMetrics>, NormalizeError> {
        let mut metrics = Vec::new();

        for normalizer in self.normalizers.values_mut() {
            let storage = normalizer.item_storage_mut();
            storage.close_writers(skip_flush)?;
            metrics.extend(storage.closed_files());
            storage.remove_closed_files().ok();
        }

        Ok(metrics)
    }
}
