/*
 * Copyright 2020 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
use super::DocumentStore;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Documents kept in process memory
///
/// Clones share the same documents, so a caller can hand one clone to a tracker and
/// inspect what it wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document: &str) -> Option<String> {
        self.lock().get(document).cloned()
    }

    pub fn insert(&self, document: &str, body: impl Into<String>) {
        self.lock().insert(document.to_owned(), body.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&mut self, document: &str) -> Result<Option<String>> {
        Ok(self.get(document))
    }

    fn write(&mut self, document: &str, body: &str) -> Result<()> {
        self.insert(document, body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::must_store_documents;

    #[test]
    fn memory_must_store() {
        let mut store = MemoryStore::new();
        must_store_documents(&mut store);
    }

    #[test]
    fn clones_share_documents() {
        let mut a = MemoryStore::new();
        let b = a.clone();
        a.write("x", "1").unwrap();
        assert_eq!(b.get("x").as_deref(), Some("1"));
    }
}
