use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::error::StoreError;
use super::record::{Fields, Record, RecordId};
#[cfg(test)]
use super::registry::DataDir;

/// Result of a conditional write. Only `Written` touches the file.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Written(T),
    NotFound,
    /// The record exists (or, for creates, a conflicting one does) and the
    /// condition refused the write
    Rejected,
}

impl<T> WriteOutcome<T> {
    pub fn written(self) -> Option<T> {
        match self {
            WriteOutcome::Written(value) => Some(value),
            _ => None,
        }
    }
}

/// CRUD over one named collection, persisted as a JSON array in one file.
///
/// Holds no records between calls; every operation reads the whole file.
/// Writers are serialized through a mutex shared by every handle opened via
/// [`crate::store::DataDir::collection`]. Conditional writes check and write
/// under that one guard. Each write replaces the file via temp file + rename.
#[derive(Clone, Debug)]
pub struct RecordStore {
    name: String,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl RecordStore {
    /// Standalone handle with its own lock map
    #[cfg(test)]
    pub(crate) async fn open(data_dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        DataDir::open(data_dir.as_ref()).await?.collection(name).await
    }

    pub(crate) fn new(name: String, path: PathBuf, lock: Arc<Mutex<()>>) -> Self {
        Self { name, path, lock }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn lock_handle(&self) -> Arc<Mutex<()>> {
        self.lock.clone()
    }

    /// All records in insertion order. A missing file is an empty collection.
    pub async fn find_all(&self) -> Result<Vec<Record>, StoreError> {
        self.load().await
    }

    pub async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.load().await?.into_iter().find(|r| r.id() == id))
    }

    /// First record (in insertion order) matching the predicate
    pub async fn find_first<F>(&self, predicate: F) -> Result<Option<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        Ok(self.load().await?.into_iter().find(|r| predicate(r)))
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.load().await?.len())
    }

    /// Append a record with the next id (`max + 1`, or 1 when empty)
    pub async fn create(&self, fields: Fields) -> Result<Record, StoreError> {
        self.write(|records| (self.append(records, fields), true)).await
    }

    /// Append one record per entry with sequential ids, persisting once.
    /// Nothing is written for an empty batch.
    pub async fn create_many(&self, batch: Vec<Fields>) -> Result<Vec<Record>, StoreError> {
        self.write(|records| {
            let created: Vec<Record> = batch
                .into_iter()
                .map(|fields| self.append(records, fields))
                .collect();
            let changed = !created.is_empty();
            (created, changed)
        })
        .await
    }

    /// Append unless an existing record matches `conflict`, checked under the write lock
    pub async fn create_unless<F>(
        &self,
        conflict: F,
        fields: Fields,
    ) -> Result<WriteOutcome<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        self.write(|records| {
            if records.iter().any(|r| conflict(r)) {
                return (WriteOutcome::Rejected, false);
            }
            (WriteOutcome::Written(self.append(records, fields)), true)
        })
        .await
    }

    /// Shallow-merge `fields` into the record; `None` if no such id
    pub async fn update(
        &self,
        id: RecordId,
        fields: Fields,
    ) -> Result<Option<Record>, StoreError> {
        Ok(self.update_if(id, |_| true, fields).await?.written())
    }

    /// Merge only if `allow` accepts the current record
    pub async fn update_if<F>(
        &self,
        id: RecordId,
        allow: F,
        fields: Fields,
    ) -> Result<WriteOutcome<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        self.write(|records| {
            let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
                return (WriteOutcome::NotFound, false);
            };
            if !allow(&*record) {
                return (WriteOutcome::Rejected, false);
            }
            record.merge(fields, Utc::now());
            debug!(collection = %self.name, id, "record updated");
            (WriteOutcome::Written(record.clone()), true)
        })
        .await
    }

    /// Merge unless some other record matches `conflict`
    pub async fn update_unless<F>(
        &self,
        id: RecordId,
        conflict: F,
        fields: Fields,
    ) -> Result<WriteOutcome<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        self.write(|records| {
            let Some(index) = records.iter().position(|r| r.id() == id) else {
                return (WriteOutcome::NotFound, false);
            };
            if records.iter().any(|r| r.id() != id && conflict(r)) {
                return (WriteOutcome::Rejected, false);
            }
            let record = &mut records[index];
            record.merge(fields, Utc::now());
            debug!(collection = %self.name, id, "record updated");
            (WriteOutcome::Written(record.clone()), true)
        })
        .await
    }

    /// Remove the record; `false` (and no write) if nothing matched
    pub async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.delete_if(id, |_| true).await?.written().is_some())
    }

    /// Remove only if `allow` accepts the current record; yields the removed record
    pub async fn delete_if<F>(&self, id: RecordId, allow: F) -> Result<WriteOutcome<Record>, StoreError>
    where
        F: Fn(&Record) -> bool,
    {
        self.write(|records| {
            let Some(index) = records.iter().position(|r| r.id() == id) else {
                return (WriteOutcome::NotFound, false);
            };
            if !allow(&records[index]) {
                return (WriteOutcome::Rejected, false);
            }
            let removed = records.remove(index);
            debug!(collection = %self.name, id, "record deleted");
            (WriteOutcome::Written(removed), true)
        })
        .await
    }

    /// Load, apply `op`, and persist when it reports a change, all under the collection lock
    async fn write<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<Record>) -> (T, bool),
    {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let (result, changed) = op(&mut records);
        if changed {
            self.persist(&records).await?;
        }
        Ok(result)
    }

    fn append(&self, records: &mut Vec<Record>, fields: Fields) -> Record {
        let id = next_id(records);
        let record = Record::create(id, fields, Utc::now());
        records.push(record.clone());
        debug!(collection = %self.name, id, "record created");
        record
    }

    async fn load(&self) -> Result<Vec<Record>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                error!(collection = %self.name, path = %self.path.display(), "read failed: {}", e);
                return Err(StoreError::io(&self.path, e));
            }
        };

        // An empty file is what a crashed first write leaves behind
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let items: Vec<Value> = serde_json::from_slice(&bytes).map_err(|e| {
            error!(collection = %self.name, path = %self.path.display(), "corrupt collection: {}", e);
            StoreError::corrupt(&self.path, e.to_string())
        })?;

        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                Record::from_stored(item).map_err(|reason| {
                    error!(collection = %self.name, index = i, "corrupt record: {}", reason);
                    StoreError::corrupt(&self.path, format!("element {}: {}", i, reason))
                })
            })
            .collect()
    }

    async fn persist(&self, records: &[Record]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            error!(collection = %self.name, "rename into place failed: {}", e);
            StoreError::io(&self.path, e)
        })
    }
}

fn next_id(records: &[Record]) -> RecordId {
    records.iter().map(Record::id).max().map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn fields(value: Value) -> Fields {
        Fields::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn sequential_creates_number_from_one() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "products").await?;

        let mut ids = Vec::new();
        for n in 0..5 {
            ids.push(store.create(fields(json!({ "n": n }))).await?.id());
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_empty_and_not_created_by_reads() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path().join("nested/data"), "users").await?;

        assert!(dir.path().join("nested/data").is_dir());
        assert!(store.find_all().await?.is_empty());
        assert_eq!(store.find_by_id(1).await?, None);
        assert!(!store.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn find_by_id_round_trips_created_record() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "items").await?;

        let created = store
            .create(fields(json!({ "name": "A", "meta": { "tags": ["x", "y"] } })))
            .await?;
        let found = store.find_by_id(created.id()).await?;
        assert_eq!(found, Some(created));
        Ok(())
    }

    #[tokio::test]
    async fn update_preserves_other_fields_and_advances_updated_at() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "products").await?;

        let created = store
            .create(fields(json!({ "name": "A", "price": 10, "category": "c" })))
            .await?;

        let first = store
            .update(created.id(), fields(json!({ "price": 12 })))
            .await?
            .expect("record exists");
        assert_eq!(first.get("name"), Some(&json!("A")));
        assert_eq!(first.get("category"), Some(&json!("c")));
        assert_eq!(first.get("price"), Some(&json!(12)));
        assert_eq!(first.get("createdAt"), created.get("createdAt"));

        let second = store
            .update(created.id(), fields(json!({ "price": 13 })))
            .await?
            .expect("record exists");
        assert!(second.updated_at() > first.updated_at());
        Ok(())
    }

    #[tokio::test]
    async fn update_missing_id_returns_none_without_writing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "products").await?;

        assert_eq!(store.update(42, fields(json!({ "a": 1 }))).await?, None);
        assert!(!store.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_and_reports_missing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "items").await?;

        let a = store.create(fields(json!({ "name": "A" }))).await?;
        store.create(fields(json!({ "name": "B" }))).await?;

        assert!(store.delete(a.id()).await?);
        assert_eq!(store.find_by_id(a.id()).await?, None);

        let before = tokio::fs::read(store.path()).await?;
        assert!(!store.delete(999).await?);
        let after = tokio::fs::read(store.path()).await?;
        assert_eq!(before, after);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_the_max_id_lets_it_be_reused() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "items").await?;

        store.create(fields(json!({ "n": 1 }))).await?;
        let second = store.create(fields(json!({ "n": 2 }))).await?;
        store.delete(second.id()).await?;

        let third = store.create(fields(json!({ "n": 3 }))).await?;
        assert_eq!(third.id(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn find_all_is_stable_without_writes() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "items").await?;
        store.create(fields(json!({ "name": "A" }))).await?;
        store.create(fields(json!({ "name": "B" }))).await?;

        assert_eq!(store.find_all().await?, store.find_all().await?);
        Ok(())
    }

    #[tokio::test]
    async fn crud_scenario() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "things").await?;

        let a = store.create(fields(json!({ "name": "A" }))).await?;
        assert_eq!(a.id(), 1);
        assert_eq!(a.get("name"), Some(&json!("A")));
        assert!(a.created_at().is_some());
        assert!(a.get("updatedAt").is_none());

        let b = store.create(fields(json!({ "name": "B" }))).await?;
        assert_eq!(b.id(), 2);

        let a2 = store
            .update(1, fields(json!({ "name": "A2" })))
            .await?
            .expect("record 1 exists");
        assert_eq!(a2.get("name"), Some(&json!("A2")));
        assert_eq!(a2.get("createdAt"), a.get("createdAt"));
        assert!(a2.updated_at().is_some());

        assert!(store.delete(2).await?);
        let all = store.find_all().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn on_disk_format_is_pretty_json_array() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        store.create(fields(json!({ "username": "ana" }))).await?;

        let text = tokio::fs::read_to_string(dir.path().join("users.json")).await?;
        assert!(text.starts_with("[\n  {\n    \"id\": 1,\n    \"username\": \"ana\""));
        let parsed: Value = serde_json::from_str(&text)?;
        assert!(parsed.is_array());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_fails_loudly() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        tokio::fs::write(store.path(), b"{ not json").await?;

        let err = store.find_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));

        let err = store.create(fields(json!({ "a": 1 }))).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));

        // the corrupt file is left untouched for inspection
        assert_eq!(tokio::fs::read(store.path()).await?, b"{ not json");
        Ok(())
    }

    #[tokio::test]
    async fn wrong_shape_is_corrupt() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;

        tokio::fs::write(store.path(), br#"{"id": 1}"#).await?;
        assert!(matches!(store.find_all().await, Err(StoreError::Corrupt { .. })));

        tokio::fs::write(store.path(), br#"[{"name": "no id"}]"#).await?;
        assert!(matches!(store.find_all().await, Err(StoreError::Corrupt { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn blank_file_reads_as_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        tokio::fs::write(store.path(), b"\n").await?;

        assert!(store.find_all().await?.is_empty());
        assert_eq!(store.create(Fields::new()).await?.id(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_creates_lose_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let data_dir = DataDir::open(dir.path()).await?;

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..20 {
            // separate handles, same collection: the lock is shared
            let store = data_dir.collection("items").await?;
            tasks.spawn(async move { store.create(Fields::new().with("n", n)).await });
        }

        let mut ids = Vec::new();
        while let Some(result) = tasks.join_next().await {
            ids.push(result??.id());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());

        let store = data_dir.collection("items").await?;
        assert_eq!(store.count().await?, 20);
        Ok(())
    }

    #[tokio::test]
    async fn find_first_uses_insertion_order() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        store.create(fields(json!({ "email": "a@x.io", "n": 1 }))).await?;
        store.create(fields(json!({ "email": "a@x.io", "n": 2 }))).await?;

        let found = store
            .find_first(|r| r.get_str("email") == Some("a@x.io"))
            .await?
            .expect("match");
        assert_eq!(found.get("n"), Some(&json!(1)));
        assert_eq!(store.find_first(|r| r.get_str("email") == Some("none")).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn create_unless_rejects_conflicts_without_writing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        let same_email = |r: &Record| r.get_str("email") == Some("a@x.io");

        let first = store
            .create_unless(same_email, fields(json!({ "email": "a@x.io" })))
            .await?;
        assert!(matches!(first, WriteOutcome::Written(ref r) if r.id() == 1));

        let before = tokio::fs::read(store.path()).await?;
        let second = store
            .create_unless(same_email, fields(json!({ "email": "a@x.io" })))
            .await?;
        assert_eq!(second, WriteOutcome::Rejected);
        assert_eq!(tokio::fs::read(store.path()).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_create_unless_admits_one() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let data_dir = DataDir::open(dir.path()).await?;

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..16 {
            let store = data_dir.collection("users").await?;
            tasks.spawn(async move {
                store
                    .create_unless(
                        |r| r.get_str("email") == Some("same@x.io"),
                        Fields::new().with("email", "same@x.io").with("n", n),
                    )
                    .await
            });
        }

        let mut written = 0;
        while let Some(result) = tasks.join_next().await {
            if let WriteOutcome::Written(_) = result?? {
                written += 1;
            }
        }
        assert_eq!(written, 1);
        assert_eq!(data_dir.collection("users").await?.count().await?, 1);
        Ok(())
    }

    fn owned_by(owner: u64) -> impl Fn(&Record) -> bool {
        move |r| r.get("userId").and_then(Value::as_u64) == Some(owner)
    }

    #[tokio::test]
    async fn update_if_distinguishes_missing_and_refused() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "products").await?;
        store.create(fields(json!({ "name": "Lamp", "userId": 1 }))).await?;

        let refused = store
            .update_if(1, owned_by(2), fields(json!({ "name": "Mine" })))
            .await?;
        assert_eq!(refused, WriteOutcome::Rejected);
        let unchanged = store.find_by_id(1).await?.expect("still there");
        assert_eq!(unchanged.get_str("name"), Some("Lamp"));

        let missing = store.update_if(9, owned_by(1), fields(json!({ "name": "x" }))).await?;
        assert_eq!(missing, WriteOutcome::NotFound);

        let updated = store
            .update_if(1, owned_by(1), fields(json!({ "name": "Desk lamp" })))
            .await?
            .written()
            .expect("owner may update");
        assert_eq!(updated.get_str("name"), Some("Desk lamp"));
        Ok(())
    }

    #[tokio::test]
    async fn update_unless_ignores_the_record_itself() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "users").await?;
        store.create(fields(json!({ "email": "a@x.io" }))).await?;
        store.create(fields(json!({ "email": "b@x.io" }))).await?;

        let taken = store
            .update_unless(
                1,
                |r| r.get_str("email") == Some("b@x.io"),
                fields(json!({ "email": "b@x.io" })),
            )
            .await?;
        assert_eq!(taken, WriteOutcome::Rejected);

        // re-saving its own email is not a conflict
        let same = store
            .update_unless(
                1,
                |r| r.get_str("email") == Some("a@x.io"),
                fields(json!({ "email": "a@x.io" })),
            )
            .await?;
        assert!(matches!(same, WriteOutcome::Written(_)));

        let missing = store.update_unless(7, |_| false, Fields::new()).await?;
        assert_eq!(missing, WriteOutcome::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn delete_if_keeps_refused_records() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "products").await?;
        store.create(fields(json!({ "userId": 1 }))).await?;

        assert_eq!(store.delete_if(1, |_| false).await?, WriteOutcome::Rejected);
        assert_eq!(store.count().await?, 1);
        assert_eq!(store.delete_if(5, |_| true).await?, WriteOutcome::NotFound);

        let removed = store.delete_if(1, |_| true).await?.written().expect("removed");
        assert_eq!(removed.id(), 1);
        assert_eq!(store.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn create_many_assigns_sequential_ids_in_one_write() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = RecordStore::open(dir.path(), "items").await?;
        store.create(fields(json!({ "name": "existing" }))).await?;

        let created = store
            .create_many(vec![
                fields(json!({ "name": "A" })),
                fields(json!({ "name": "B" })),
            ])
            .await?;
        assert_eq!(created.iter().map(Record::id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.count().await?, 3);

        assert!(store.create_many(Vec::new()).await?.is_empty());
        assert_eq!(store.count().await?, 3);
        Ok(())
    }
}
