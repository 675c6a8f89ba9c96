//! Persistence seam for test records.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::entity::TestEntity;
use crate::error::EolError;

#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Store a newly created test.
    async fn save(&self, entity: &TestEntity) -> Result<(), EolError>;
    /// Replace the stored copy of an existing test.
    async fn update(&self, entity: &TestEntity) -> Result<(), EolError>;
}

/// Process-local repository, keyed by test id.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tests: Mutex<HashMap<Uuid, TestEntity>>,
    order: Mutex<Vec<Uuid>>,
    writes: Mutex<u64>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<TestEntity> {
        self.tests.lock().get(&id).cloned()
    }

    /// Every stored test, oldest first.
    pub fn all(&self) -> Vec<TestEntity> {
        let tests = self.tests.lock();
        self.order
            .lock()
            .iter()
            .filter_map(|id| tests.get(id).cloned())
            .collect()
    }

    /// Number of successful saves and updates.
    pub fn writes(&self) -> u64 {
        *self.writes.lock()
    }
}

#[async_trait]
impl TestRepository for InMemoryRepository {
    async fn save(&self, entity: &TestEntity) -> Result<(), EolError> {
        let mut tests = self.tests.lock();
        if tests.contains_key(&entity.test_id) {
            return Err(EolError::Repository(format!(
                "test {} already saved",
                entity.test_id
            )));
        }
        tests.insert(entity.test_id, entity.clone());
        self.order.lock().push(entity.test_id);
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn update(&self, entity: &TestEntity) -> Result<(), EolError> {
        let mut tests = self.tests.lock();
        let Some(slot) = tests.get_mut(&entity.test_id) else {
            return Err(EolError::Repository(format!(
                "test {} not found",
                entity.test_id
            )));
        };
        *slot = entity.clone();
        *self.writes.lock() += 1;
        Ok(())
    }
}
