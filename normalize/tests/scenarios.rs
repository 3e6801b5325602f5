mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use normalize::collector::NullCollector;
use normalize::error::NormalizeError;
use normalize::pool::InlinePool;
use normalize::schema::Schema;
use normalize::spooler::Spooler;
use normalize::storage::fs::{FsLoadStorage, FsNormalizeStorage, FsSchemaStorage};

///
/// §8 scenario 1: a single file into a single table normalizes to one
/// committed output file, with `seen-data` set and the right item count.
///
#[test]
fn single_file_single_table() {
    let base = common::init_base_dir("single_file_single_table");
    common::write_extracted_package(&base, "load1", "s", &[
        ("users.0.jsonl", "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n{\"id\":3,\"name\":\"c\"}\n"),
    ]);

    let driver = common::driver(&base, 1);
    let metrics = common::run(&driver, 1).expect("run should succeed");
    assert!(!metrics.done);
    assert_eq!(metrics.pending, 0);

    let committed = common::committed_package_dir(&base, "load1");
    assert!(committed.exists(), "committed package missing");
    assert!(!common::extracted_package_dir(&base, "load1").exists(), "extracted package should be removed on commit");

    let jobs = committed.join("new_jobs");
    let files = common::list_file_names(&jobs);
    assert_eq!(files.len(), 1, "expected exactly one output file, got {:?}", files);
    assert!(files[0].starts_with("users."));
    assert_eq!(common::count_jsonl_rows_for_table(&jobs, "users"), 3);

    let schema = common::read_committed_schema(&base, "load1");
    assert_eq!(schema["tables"]["users"]["x-normalizer"]["seen_data"], true);
}

///
/// §8 scenario 2: two disjoint tables processed by a two-wide pool both end up
/// present in the final schema with their own output file.
///
#[test]
fn two_disjoint_tables_parallel() {
    let base = common::init_base_dir("two_disjoint_tables_parallel");
    common::write_extracted_package(&base, "load1", "s", &[
        ("a.0.jsonl", "{\"id\":1}\n"),
        ("b.0.jsonl", "{\"id\":2}\n"),
    ]);

    let driver = common::driver(&base, 2);
    common::run(&driver, 2).expect("run should succeed");

    let committed = common::committed_package_dir(&base, "load1");
    let jobs = committed.join("new_jobs");
    let files = common::list_file_names(&jobs);
    assert_eq!(files.len(), 2, "expected one output file per table, got {:?}", files);

    let schema = common::read_committed_schema(&base, "load1");
    assert_eq!(schema["tables"]["a"]["x-normalizer"]["seen_data"], true);
    assert_eq!(schema["tables"]["b"]["x-normalizer"]["seen_data"], true);
}

///
/// §8 scenario 3: two files propose incompatible-looking but ladder-compatible
/// types (`int` vs `text`) for the same column, landing in separate workers.
/// Whichever merges first wins; the other is retried by the `ParallelMapper`
/// and coerces. Final column is `String`, and both files contribute to the
/// item count.
///
#[test]
fn conflict_then_recovers_within_the_parallel_mapper() {
    let base = common::init_base_dir("conflict_then_recovers");
    common::write_extracted_package(&base, "load1", "t", &[
        ("t.0.jsonl", "{\"x\":1}\n"),
        ("t.1.jsonl", "{\"x\":\"hello\"}\n"),
    ]);

    let driver = common::driver(&base, 2);
    common::run(&driver, 2).expect("run should succeed despite the mid-run conflict");

    let schema = common::read_committed_schema(&base, "load1");
    let types = common::column_types(&schema, "t");
    assert_eq!(types.get("x").map(String::as_str), Some("String"));

    let jobs = common::committed_package_dir(&base, "load1").join("new_jobs");
    assert_eq!(common::count_jsonl_rows_for_table(&jobs, "t"), 2);

    let info = driver.get_step_info();
    let step = info.get("load1").expect("load1 should have step info");
    assert_eq!(step.table_metrics["t"].items_count, 2);
}

///
/// §8 scenario 4: a conflict that is genuinely unresolvable (not just an
/// artifact of which worker happened to merge first) survives retrying in
/// parallel *and* the single-worker fallback, and is fatal (§7 / §4.6 step 4).
///
/// The conflict is made genuine, rather than order-dependent, by pre-seeding
/// Schema Storage (via an earlier committed run) with column `x` already typed
/// `Boolean` - a type that cannot widen to either `Integer` or `String`, so
/// every worker's proposal conflicts regardless of completion order, and the
/// single-worker fallback (which consults the same stored schema) fails
/// identically.
///
#[test]
fn unrecoverable_conflict_is_fatal_even_after_single_worker_fallback() {
    let base = common::init_base_dir("unrecoverable_conflict");

    common::write_extracted_package(&base, "load0", "t", &[("t.0.jsonl", "{\"x\":true}\n")]);
    let driver = common::driver(&base, 1);
    common::run(&driver, 1).expect("seeding run should succeed");
    assert!(common::committed_package_dir(&base, "load0").exists());

    common::write_extracted_package(&base, "load1", "t", &[
        ("t.2.jsonl", "{\"x\":42}\n"),
        ("t.3.jsonl", "{\"x\":\"hello\"}\n"),
    ]);

    let driver = common::driver(&base, 2);
    let err = common::run(&driver, 2).expect_err("a Boolean/Integer/String conflict can never resolve");
    assert!(matches!(err, NormalizeError::CoercionConflict { .. }));

    assert!(!common::committed_package_dir(&base, "load1").exists(), "no package should be committed on a fatal conflict");
    assert!(common::extracted_package_dir(&base, "load1").exists(), "the extracted package must survive a fatal failure (P4)");
}

///
/// §8 scenario 5: an extracted package with no new-jobs files is discarded
/// without producing a load package.
///
#[test]
fn empty_package_is_deleted_without_producing_a_load_package() {
    let base = common::init_base_dir("empty_package");
    common::write_extracted_package(&base, "load1", "s", &[]);

    let driver = common::driver(&base, 1);
    let metrics = common::run(&driver, 1).expect("run should succeed");
    assert_eq!(metrics.pending, 0);

    assert!(!common::extracted_package_dir(&base, "load1").exists(), "empty extracted package should be removed");
    assert!(!common::committed_package_dir(&base, "load1").exists(), "no load package should be produced");
}

///
/// §8 scenario 6: cancellation observed cooperatively (at whichever checkpoint
/// in the mapper's poll loop or the Spooler's pre-commit check fires first -
/// §4.6 step 8, §5) aborts before the commit rename. No committed package
/// appears and the extracted package is left intact for the next run.
///
#[test]
fn mid_run_cancellation_leaves_everything_uncommitted() {
    let base = common::init_base_dir("mid_run_cancellation");
    common::write_extracted_package(&base, "load1", "s", &[("users.0.jsonl", "{\"id\":1}\n")]);

    let normalize_storage = Arc::new(FsNormalizeStorage::new(base.join("extracted")));
    let load_storage = Arc::new(FsLoadStorage::new(base.join("load")));
    let schema_storage = Arc::new(FsSchemaStorage::new(base.join("schemas")));
    let pool = InlinePool::default();
    let cancel = AtomicBool::new(true);
    let collector = NullCollector;

    let spooler = Spooler::new(
        normalize_storage.clone(),
        load_storage,
        schema_storage,
        common::jsonl_caps(),
        common::config(&base, 1),
        &pool,
        &cancel,
        &collector,
    );

    let mut schema = Schema::new("s");
    let files = vec![base.join("extracted").join("load1").join("new_jobs").join("users.0.jsonl").to_string_lossy().to_string()];

    let err = spooler.run("load1", &mut schema, &files).unwrap_err();
    assert!(matches!(err, NormalizeError::Signalled));

    assert!(!common::committed_package_dir(&base, "load1").exists(), "a cancelled run must not commit");
    assert!(common::extracted_package_dir(&base, "load1").exists(), "the extracted package must survive a cancellation (P4)");
}
