use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::llm_client::ChatTurn;
use crate::normalizer::EvaluationRecord;
use crate::store::{ChatStore, ChatThread, RecordFilter, RecordStore, SortOrder, StoredRecord};

/// In-memory store for pipeline and handler tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &EvaluationRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push(StoredRecord {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn find(&self, filter: &RecordFilter, sort: SortOrder) -> Result<Vec<StoredRecord>> {
        let mut found: Vec<StoredRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| filter.matches(&stored.record))
            .cloned()
            .collect();
        found.sort_by_key(|stored| stored.record.metadata.created_at);
        if sort == SortOrder::NewestFirst {
            found.reverse();
        }
        Ok(found)
    }
}

/// In-memory chat threads keyed by username.
#[derive(Default)]
pub struct MemoryChatStore {
    pub threads: Mutex<HashMap<String, ChatThread>>,
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn load(&self, username: &str) -> Result<Option<ChatThread>> {
        Ok(self.threads.lock().unwrap().get(username).cloned())
    }

    async fn save(&self, username: &str, messages: &[ChatTurn]) -> Result<ChatThread> {
        let thread = ChatThread {
            username: username.to_string(),
            messages: messages.to_vec(),
            updated_at: Utc::now(),
        };
        self.threads
            .lock()
            .unwrap()
            .insert(username.to_string(), thread.clone());
        Ok(thread)
    }
}
