pub mod column;
pub mod table;

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use normalize_core::naming::{NamingConvention, SnakeCaseNamingConvention};
use crate::error::NormalizeError;
use crate::schema::table::TableSchema;

///
/// A delta proposing new or widened columns on one or more tables. Applying a
/// delta means calling `Schema::update_table` for each table-name/partial pair
/// in insertion order.
///
pub type SchemaUpdate = HashMap<String, Vec<TableSchema>>;

///
/// Merge a list of per-worker deltas into one delta per table, combining all
/// partials proposed for the same table into a single partial (by folding them
/// with `TableSchema::update_table` against an empty table). This is the shape
/// persisted to the load package's `schema_updates.json` manifest - not the raw
/// per-worker delta list.
///
pub fn merge_schema_updates(updates: &[SchemaUpdate]) -> SchemaUpdate {
    let mut merged: SchemaUpdate = HashMap::new();

    for update in updates {
        for (table_name, partials) in update {
            let entry = merged.entry(table_name.clone()).or_insert_with(|| vec![TableSchema::new(table_name.clone())]);
            for partial in partials {
                // Safe to unwrap: a delta that was already successfully applied to the live
                // schema cannot conflict with itself when folded in isolation.
                entry[0].update_table(partial).expect("schema update manifest merge cannot conflict");
            }
        }
    }

    merged
}

///
/// A plain-data, serializable view of a `Schema`, used to hand workers an
/// immutable snapshot they hydrate a local copy from (§3: "each worker holds a
/// clone derived from a snapshot serialization").
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub name: String,
    pub version: u64,
    pub tables: HashMap<String, TableSchema>,
}

///
/// The live, in-process schema for one normalize run. Owned by the Spooler for
/// the duration of a package; mutated only on the mapper thread via
/// `SchemaReconciler::apply`.
///
pub struct Schema {
    name: String,
    version: u64,
    tables: HashMap<String, TableSchema>,
    naming: Arc<dyn NamingConvention>,
    modified: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            tables: HashMap::new(),
            naming: Arc::new(SnakeCaseNamingConvention),
            modified: false,
        }
    }

    pub fn from_snapshot(snapshot: SchemaSnapshot) -> Self {
        Self {
            name: snapshot.name,
            version: snapshot.version,
            tables: snapshot.tables,
            naming: Arc::new(SnakeCaseNamingConvention),
            modified: false,
        }
    }

    pub fn to_snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot { name: self.name.clone(), version: self.version, tables: self.tables.clone() }
    }

    ///
    /// Clone with a fresh `NamingConvention` instance, so a pipeline-configured
    /// convention always applies even if the extracted package's embedded schema
    /// pre-dates it. Used by the Spooler when importing a package (§4.6 step 3).
    ///
    pub fn clone_with_fresh_naming(&self) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version,
            tables: self.tables.clone(),
            naming: Arc::new(SnakeCaseNamingConvention),
            modified: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables_mut(&mut self) -> &mut HashMap<String, TableSchema> {
        &mut self.tables
    }

    pub fn tables(&self) -> &HashMap<String, TableSchema> {
        &self.tables
    }

    pub fn normalize_table_identifier(&self, identifier: &str) -> String {
        self.naming.normalize_identifier(identifier)
    }

    ///
    /// A content hash of the table map, used by the Driver to compare an
    /// extracted package's embedded schema against Schema Storage's copy without
    /// doing a deep structural diff (§4.7).
    ///
    pub fn version_hash(&self) -> u64 {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        let mut hasher = DefaultHasher::new();
        for name in names {
            name.hash(&mut hasher);
            if let Ok(bytes) = serde_json::to_vec(&self.tables[name]) {
                bytes.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    ///
    /// Apply a single table's delta, creating the table if this is the first
    /// data seen for it. The only mutation point for the live schema - called
    /// exclusively from `SchemaReconciler::apply` on the mapper thread.
    ///
    pub fn update_table(&mut self, table_name: &str, partial: &TableSchema) -> Result<(), NormalizeError> {
        let table = self.tables.entry(table_name.to_string()).or_insert_with(|| TableSchema::new(table_name));
        table.update_table(partial)?;
        self.modified = true;
        self.version += 1;
        Ok(())
    }
}
