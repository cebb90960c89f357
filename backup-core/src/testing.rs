//! In-memory record store used by unit tests.

use crate::envelope::SerializedRow;
use crate::groups::RecordGroup;
use crate::store::RecordStore;
use crate::utils::errors::{BackupError, Result};
use serde_json::{json, Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: RefCell<HashMap<RecordGroup, BTreeMap<i64, SerializedRow>>>,
    failing: HashSet<RecordGroup>,
}

/// `(child, field, parent)` foreign keys enforced on persist.
const FOREIGN_KEYS: &[(RecordGroup, &str, RecordGroup)] = &[
    (RecordGroup::Company, "user_id", RecordGroup::User),
    (RecordGroup::Vacancy, "company_id", RecordGroup::Company),
];

impl MemoryStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let store = Self::empty();
        let rows = [
            (RecordGroup::User, 1, json!({"username": "admin", "user_type": "admin"})),
            (RecordGroup::User, 2, json!({"username": "hr@acme", "user_type": "company"})),
            (RecordGroup::Role, 1, json!({"role_name": "Администратор"})),
            (RecordGroup::Role, 2, json!({"role_name": "Работодатель"})),
            (RecordGroup::Company, 1, json!({"user_id": 2, "name": "Acme", "status": "approved"})),
            (RecordGroup::Vacancy, 1, json!({"company_id": 1, "position": "Rust engineer"})),
            (RecordGroup::Vacancy, 2, json!({"company_id": 1, "position": "QA"})),
            (RecordGroup::Vacancy, 3, json!({"company_id": 1, "position": "DevOps"})),
        ];
        for (group, pk, fields) in rows {
            store.insert(group, pk, fields);
        }
        store
    }

    pub fn failing(mut self, group: RecordGroup) -> Self {
        self.failing.insert(group);
        self
    }

    pub fn insert(&self, group: RecordGroup, pk: i64, fields: Value) {
        let fields: Map<String, Value> = fields.as_object().cloned().unwrap_or_default();
        self.tables
            .borrow_mut()
            .entry(group)
            .or_default()
            .insert(pk, SerializedRow::new(group, pk, fields));
    }

    pub fn remove(&self, group: RecordGroup, pk: i64) {
        if let Some(table) = self.tables.borrow_mut().get_mut(&group) {
            table.remove(&pk);
        }
    }

    pub fn count(&self, group: RecordGroup) -> usize {
        self.tables.borrow().get(&group).map(|t| t.len()).unwrap_or(0)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.borrow().values().map(|t| t.len()).sum()
    }
}

impl RecordStore for MemoryStore {
    fn dump_group(&self, group: RecordGroup) -> Result<Vec<SerializedRow>> {
        if self.failing.contains(&group) {
            return Err(BackupError::Store(format!("table for {} is unreadable", group)));
        }
        Ok(self
            .tables
            .borrow()
            .get(&group)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    fn persist_row(&self, group: RecordGroup, row: &SerializedRow) -> Result<()> {
        let pk = row
            .pk
            .as_i64()
            .ok_or_else(|| BackupError::Store(format!("non-integer primary key {}", row.pk)))?;

        for (child, field, parent) in FOREIGN_KEYS {
            if *child != group {
                continue;
            }
            if let Some(parent_pk) = row.fields.get(*field).and_then(Value::as_i64) {
                let exists = self
                    .tables
                    .borrow()
                    .get(parent)
                    .map(|t| t.contains_key(&parent_pk))
                    .unwrap_or(false);
                if !exists {
                    return Err(BackupError::Store("FOREIGN KEY constraint failed".into()));
                }
            }
        }

        self.tables
            .borrow_mut()
            .entry(group)
            .or_default()
            .insert(pk, row.clone());
        Ok(())
    }

    fn approximate_size(&self) -> Result<u64> {
        Ok(self.total_rows() as u64 * 128)
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}
