use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use crossbeam::channel::{Receiver, Select};
use uuid::Uuid;
use crate::config::{DestinationCapabilities, NormalizeConfiguration};
use crate::error::NormalizeError;
use crate::file_naming::ParsedLoadJobFileName;
use crate::grouper::group_worker_files;
use crate::metrics::{dedupe_by_file_path, WriterMetrics};
use crate::pool::Pool;
use crate::reconciler::SchemaReconciler;
use crate::schema::{Schema, SchemaUpdate};
use crate::storage::LoadStorage;
use crate::worker::{WorkerJob, WorkerResult};

///
/// Fallback sleep between completion sweeps when nothing is ready to `select`
/// on (§5's "≈300ms" figure - an implementation hint, not a contract).
///
const POLL_INTERVAL: Duration = Duration::from_millis(300);

///
/// A retried task re-derives its delta from the same raw files, so a conflict
/// that isn't just an artifact of completion order (two workers racing to
/// widen the same new column) will reproduce identically forever. Capping
/// retries turns that into a bounded, detectable failure - surfaced to the
/// Spooler as `CoercionConflict`, which triggers the single-worker fallback -
/// instead of a livelock. Not specified by name in spec.md; this is the
/// implementation's answer to the "what stops a genuinely unresolvable
/// conflict from retrying forever" gap.
///
const MAX_RETRIES_PER_TASK: u32 = 2;

///
/// The aggregated result of running every group of a package through the
/// worker pool: the union of every successfully-applied schema delta (kept
/// per-worker so `merge_schema_updates` can fold them into the manifest) plus
/// deduplicated writer metrics for every file actually produced.
///
pub struct MapperOutcome {
    pub schema_updates: Vec<SchemaUpdate>,
    pub file_metrics: Vec<WriterMetrics>,
}

impl MapperOutcome {
    ///
    /// Per-table metric sums, derived by parsing each file's table name out of
    /// its name (§4.5 supplement's `table_metrics`). Used by the Spooler to
    /// decide which tables saw data and by the Driver for run-level reporting.
    ///
    pub fn table_metrics(&self) -> HashMap<String, WriterMetrics> {
        let mut by_table: HashMap<String, WriterMetrics> = HashMap::new();
        for metric in &self.file_metrics {
            if let Ok(parsed) = ParsedLoadJobFileName::parse(&metric.file_path) {
                let entry = by_table.entry(parsed.table_name().to_string()).or_insert_with(WriterMetrics::zero);
                *entry = entry.combine(metric);
            }
        }
        by_table
    }
}

struct Task {
    files: Vec<String>,
    attempt: u32,
    rx: Receiver<Result<WorkerResult, NormalizeError>>,
}

///
/// Submits `WorkerJob`s to a `Pool`, awaits completion, applies each worker's
/// schema deltas through the `SchemaReconciler`, and resubmits the single
/// worker whose delta conflicts with what's already been merged (§4.5).
///
pub struct ParallelMapper<'a> {
    load_storage: Arc<dyn LoadStorage>,
    caps: DestinationCapabilities,
    config: NormalizeConfiguration,
    pool: &'a dyn Pool,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> ParallelMapper<'a> {
    pub fn new(
        load_storage: Arc<dyn LoadStorage>,
        caps: DestinationCapabilities,
        config: NormalizeConfiguration,
        pool: &'a dyn Pool,
        cancel: Option<&'a AtomicBool>,
    ) -> Self {
        Self { load_storage, caps, config, pool, cancel }
    }

    ///
    /// Submit one `WorkerJob` for `files` against a snapshot of `schema`. The
    /// task closure owns everything it needs (an `Arc` clone of the load
    /// storage, and cheap clones of the capabilities/config) so it can run on
    /// another thread with no lifetime tied back to `self`.
    ///
    fn submit(&self, load_id: &str, schema: &Schema, files: Vec<String>, attempt: u32, tasks: &mut Vec<Task>) {
        let job_id = Uuid::new_v4().to_simple().to_string();
        let snapshot = schema.to_snapshot();
        let load_storage = self.load_storage.clone();
        let caps = self.caps.clone();
        let config = self.config.clone();
        let load_id_owned = load_id.to_string();
        let group_files = files.clone();

        let rx = self.pool.submit(Box::new(move || {
            let job = WorkerJob::new(load_id_owned, job_id, group_files, snapshot, load_storage, caps, config);
            job.run()
        }));

        tasks.push(Task { files, attempt, rx });
    }

    ///
    /// Run every file in `files` through the pool, mutating `schema` in place as
    /// deltas are reconciled. Returns once every task (including retries) has
    /// completed, or propagates the first fatal error.
    ///
    pub fn run(&self, load_id: &str, schema: &mut Schema, files: &[String]) -> Result<MapperOutcome, NormalizeError> {
        let groups = group_worker_files(files, self.pool.width());

        let mut tasks: Vec<Task> = Vec::new();
        for group in groups {
            self.submit(load_id, schema, group, 0, &mut tasks);
        }

        let mut file_metrics = Vec::new();
        let mut schema_updates = Vec::new();

        while !tasks.is_empty() {
            if let Some(cancel) = self.cancel {
                if cancel.load(Ordering::SeqCst) {
                    return Err(NormalizeError::Signalled);
                }
            }

            let mut select = Select::new();
            for task in &tasks {
                select.recv(&task.rx);
            }

            // A `SelectedOperation` must be completed via `op.recv(...)` on the same
            // handle it was selected from - dropping it uncompleted panics. So finish
            // the recv while `op` (and its borrow of `tasks`) is still alive, before
            // removing the task from the vec.
            let (index, result) = match select.select_timeout(POLL_INTERVAL) {
                Ok(op) => {
                    let index = op.index();
                    let result = op.recv(&tasks[index].rx).expect("select reported this operation as ready");
                    (index, result)
                }
                Err(_) => continue, // nothing completed this sweep; loop back and recheck cancellation
            };

            let task = tasks.remove(index);

            match result {
                Ok(worker_result) => {
                    match SchemaReconciler::apply(schema, &worker_result.schema_updates) {
                        Ok(()) => {
                            file_metrics.extend(worker_result.file_metrics);
                            schema_updates.push(worker_result.schema_updates);
                        }
                        Err(err) if err.is_coercion_conflict() && task.attempt < MAX_RETRIES_PER_TASK => {
                            log::warn!(
                                "Worker's schema update for load {} conflicted with the merged schema ({}); \
                                 discarding its output and retrying against the current schema (attempt {}).",
                                load_id, err, task.attempt + 1
                            );
                            for metric in &worker_result.file_metrics {
                                let _ = std::fs::remove_file(&metric.file_path);
                            }
                            self.submit(load_id, schema, task.files, task.attempt + 1, &mut tasks);
                        }
                        Err(err) if err.is_coercion_conflict() => {
                            log::warn!(
                                "Worker's schema update for load {} still conflicts after {} retries; \
                                 giving up on the parallel run ({}).",
                                load_id, MAX_RETRIES_PER_TASK, err
                            );
                            for metric in &worker_result.file_metrics {
                                let _ = std::fs::remove_file(&metric.file_path);
                            }
                            return Err(err);
                        }
                        Err(other) => return Err(other),
                    }
                }
                Err(err) => {
                    if let Some((_, _, partial)) = err.as_job_failed() {
                        file_metrics.extend(partial.iter().cloned());
                    }
                    return Err(err);
                }
            }
        }

        Ok(MapperOutcome { schema_updates, file_metrics: dedupe_by_file_path(file_metrics) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use crate::schema::column::ColumnDefinition;
    use crate::schema::table::TableSchema;
    use crate::storage::{ItemStorage, LoadPackageInfo, NormalizeStorage};
    use crate::writer_resolver::WriterSpec;
    use normalize_core::data_type::DataType;

    ///
    /// A `Pool` that never actually runs a `WorkerJob`: it hands back pre-scripted
    /// `WorkerResult`s from a queue, in submission order, synchronously (like
    /// `InlinePool`). Lets the retry/propagation logic in `ParallelMapper::run` be
    /// exercised deterministically without racing real worker threads.
    ///
    struct ScriptedPool {
        width: usize,
        results: Mutex<std::collections::VecDeque<Result<WorkerResult, NormalizeError>>>,
    }

    impl Pool for ScriptedPool {
        fn submit(&self, _task: Box<dyn FnOnce() -> Result<WorkerResult, NormalizeError> + Send>) -> Receiver<Result<WorkerResult, NormalizeError>> {
            let (tx, rx) = crossbeam::channel::bounded(1);
            let result = self.results.lock().expect("scripted pool lock poisoned")
                .pop_front()
                .expect("ScriptedPool ran out of scripted results");
            let _ = tx.send(result);
            rx
        }

        fn width(&self) -> usize {
            self.width
        }
    }

    struct NoopLoadStorage;

    impl LoadStorage for NoopLoadStorage {
        fn delete_new_package(&self, _load_id: &str, _not_exists_ok: bool) -> Result<(), NormalizeError> { Ok(()) }
        fn import_extracted_package(&self, _load_id: &str, _source: &dyn NormalizeStorage) -> Result<(), NormalizeError> { Ok(()) }
        fn create_item_storage(&self, _load_id: &str, _table_name: &str, _spec: &WriterSpec) -> Result<Box<dyn ItemStorage>, NormalizeError> {
            unimplemented!("ScriptedPool tests never let a real WorkerJob run")
        }
        fn save_schema(&self, _load_id: &str, _schema: &crate::schema::SchemaSnapshot) -> Result<(), NormalizeError> { Ok(()) }
        fn save_schema_updates(&self, _load_id: &str, _updates: &SchemaUpdate) -> Result<(), NormalizeError> { Ok(()) }
        fn commit_new_load_package(&self, _load_id: &str) -> Result<(), NormalizeError> { Ok(()) }
        fn get_load_package_info(&self, load_id: &str) -> Result<LoadPackageInfo, NormalizeError> {
            Ok(LoadPackageInfo { load_id: load_id.to_string(), stage: crate::storage::PackageStage::New, path: std::path::PathBuf::new() })
        }
    }

    fn conflicting_result() -> Result<WorkerResult, NormalizeError> {
        let mut t = TableSchema::new("t");
        t.columns.push(ColumnDefinition::new("x", DataType::Integer));
        let mut updates: SchemaUpdate = HashMap::new();
        updates.insert("t".to_string(), vec![t]);
        Ok(WorkerResult { schema_updates: updates, file_metrics: Vec::new() })
    }

    fn mapper_with(pool: &dyn Pool) -> ParallelMapper<'_> {
        ParallelMapper::new(Arc::new(NoopLoadStorage), DestinationCapabilities::default(), NormalizeConfiguration::default(), pool, None)
    }

    #[test]
    fn a_conflict_that_keeps_recurring_is_given_up_on_after_the_retry_cap() {
        let mut schema = Schema::new("s");
        let mut existing = TableSchema::new("t");
        existing.columns.push(ColumnDefinition::new("x", DataType::Boolean));
        schema.update_table("t", &existing).unwrap();

        // One scripted result per attempt: the initial submission plus every
        // retry up to and including the one that finally gets given up on.
        let pool = ScriptedPool {
            width: 1,
            results: Mutex::new((0..=MAX_RETRIES_PER_TASK).map(|_| conflicting_result()).collect()),
        };

        let mapper = mapper_with(&pool);
        let err = mapper.run("load1", &mut schema, &["t.0.jsonl".to_string()]).unwrap_err();
        assert!(err.is_coercion_conflict());
    }

    #[test]
    fn a_fresh_column_proposal_succeeds_without_any_retry() {
        let mut schema = Schema::new("s");

        let pool = ScriptedPool {
            width: 1,
            // The schema starts with no "t" table at all, so the first (and only)
            // attempt's proposal for x:Integer creates it outright - no conflict.
            results: Mutex::new(std::collections::VecDeque::from(vec![conflicting_result()])),
        };

        let mapper = mapper_with(&pool);
        let outcome = mapper.run("load1", &mut schema, &["t.0.jsonl".to_string()]).unwrap();
        assert_eq!(schema.table("t").unwrap().column("x").unwrap().data_type, DataType::Integer);
        assert!(outcome.schema_updates.len() == 1);
    }
}
