use crate::schema::{AccessLogRecord, BlacklistEntry};
use crate::{AccessStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// In-process store for single-node deployments and tests.
///
/// Records are indexed by IP so window counts only touch that IP's history.
#[derive(Clone, Default)]
pub struct MemoryStore {
    access: Arc<DashMap<Uuid, AccessLogRecord>>,
    access_by_ip: Arc<DashMap<String, Vec<Uuid>>>,
    blacklist: Arc<DashMap<String, Vec<BlacklistEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every access record, oldest first.
    pub fn access_records(&self) -> Vec<AccessLogRecord> {
        let mut records: Vec<AccessLogRecord> =
            self.access.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        records
    }

    pub fn blacklist_entries(&self) -> Vec<BlacklistEntry> {
        let mut entries: Vec<BlacklistEntry> = self
            .blacklist
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub fn contains_access(&self, id: &Uuid) -> bool {
        self.access.contains_key(id)
    }

    /// Drop access records created before `cutoff`. Returns how many went.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.access.len();
        self.access.retain(|_, r| r.created_at >= cutoff);
        self.access_by_ip.retain(|_, ids| {
            ids.retain(|id| self.access.contains_key(id));
            !ids.is_empty()
        });
        before - self.access.len()
    }

    pub(crate) fn load(&self, records: Vec<AccessLogRecord>, entries: Vec<BlacklistEntry>) {
        for record in records {
            self.put_access(record);
        }
        for entry in entries {
            self.put_blacklist(entry);
        }
    }

    fn put_access(&self, record: AccessLogRecord) {
        self.access_by_ip
            .entry(record.ip.clone())
            .or_default()
            .push(record.id);
        self.access.insert(record.id, record);
    }

    fn put_blacklist(&self, entry: BlacklistEntry) {
        self.blacklist
            .entry(entry.ip.clone())
            .or_default()
            .push(entry);
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn find_active_block(
        &self,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlacklistEntry>, StoreError> {
        Ok(self
            .blacklist
            .get(ip)
            .and_then(|entries| entries.iter().find(|e| e.is_active(now)).cloned()))
    }

    async fn count_responses(
        &self,
        ip: &str,
        code: u16,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let Some(ids) = self.access_by_ip.get(ip) else {
            return Ok(0);
        };
        let count = ids
            .iter()
            .filter_map(|id| self.access.get(id))
            .filter(|r| r.response_code == code && r.created_at >= since)
            .count();
        Ok(count as u64)
    }

    async fn insert_access(&self, record: AccessLogRecord) -> Result<(), StoreError> {
        debug!(id = %record.id, ip = %record.ip, code = record.response_code, "access record inserted");
        self.put_access(record);
        Ok(())
    }

    async fn update_response_code(
        &self,
        id: Uuid,
        code: u16,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut record = self.access.get_mut(&id).ok_or(StoreError::RecordNotFound(id))?;
        record.response_code = code;
        record.updated_at = at;
        Ok(())
    }

    async fn insert_blacklist(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        self.put_blacklist(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Value;

    fn record(ip: &str, code: u16, created_at: DateTime<Utc>) -> AccessLogRecord {
        AccessLogRecord {
            id: Uuid::now_v7(),
            app: "test".into(),
            ip: ip.into(),
            real_ip: ip.into(),
            method: "GET".into(),
            path: "http://localhost/x".into(),
            response_code: code,
            body: Value::Null,
            header: Default::default(),
            request_id: Uuid::now_v7().to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn counts_by_ip_code_and_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for _ in 0..3 {
            store.insert_access(record("1.1.1.1", 403, now)).await.unwrap();
        }
        store.insert_access(record("1.1.1.1", 401, now)).await.unwrap();
        store
            .insert_access(record("1.1.1.1", 403, now - Duration::minutes(30)))
            .await
            .unwrap();
        store.insert_access(record("2.2.2.2", 403, now)).await.unwrap();

        let since = now - Duration::minutes(10);
        assert_eq!(store.count_responses("1.1.1.1", 403, since).await.unwrap(), 3);
        assert_eq!(store.count_responses("1.1.1.1", 401, since).await.unwrap(), 1);
        assert_eq!(store.count_responses("2.2.2.2", 403, since).await.unwrap(), 1);
        assert_eq!(store.count_responses("3.3.3.3", 403, since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_moves_record_between_counts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let r = record("1.1.1.1", 200, now);
        let id = r.id;
        store.insert_access(r).await.unwrap();

        let later = now + Duration::seconds(1);
        store.update_response_code(id, 401, later).await.unwrap();

        let since = now - Duration::minutes(10);
        assert_eq!(store.count_responses("1.1.1.1", 200, since).await.unwrap(), 0);
        assert_eq!(store.count_responses("1.1.1.1", 401, since).await.unwrap(), 1);
        let records = store.access_records();
        let stored = &records[0];
        assert_eq!(stored.updated_at, later);
        assert_eq!(stored.created_at, now);
    }

    #[tokio::test]
    async fn prune_drops_old_records_and_their_index() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_access(record("1.1.1.1", 403, now - Duration::days(2))).await.unwrap();
        store.insert_access(record("2.2.2.2", 403, now - Duration::days(2))).await.unwrap();
        store.insert_access(record("1.1.1.1", 403, now)).await.unwrap();

        assert_eq!(store.prune_before(now - Duration::days(1)), 2);
        assert_eq!(store.access_records().len(), 1);
        let since = now - Duration::days(3);
        assert_eq!(store.count_responses("1.1.1.1", 403, since).await.unwrap(), 1);
        assert_eq!(store.count_responses("2.2.2.2", 403, since).await.unwrap(), 0);
        assert!(!store.access_by_ip.contains_key("2.2.2.2"));
    }

    #[tokio::test]
    async fn update_of_unknown_record_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_response_code(Uuid::now_v7(), 500, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn expired_blocks_are_ignored_permanent_ones_are_not() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_blacklist(BlacklistEntry {
                ip: "9.9.9.9".into(),
                reason: "old".into(),
                created_at: now - Duration::days(2),
                expired_at: Some(now - Duration::days(1)),
            })
            .await
            .unwrap();
        assert!(store.find_active_block("9.9.9.9", now).await.unwrap().is_none());

        store
            .insert_blacklist(BlacklistEntry {
                ip: "9.9.9.9".into(),
                reason: "forever".into(),
                created_at: now,
                expired_at: None,
            })
            .await
            .unwrap();
        let hit = store.find_active_block("9.9.9.9", now).await.unwrap().unwrap();
        assert_eq!(hit.reason, "forever");
        assert_eq!(store.blacklist_entries().len(), 2);
    }
}
