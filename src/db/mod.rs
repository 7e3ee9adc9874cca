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
//! Durable storage for the tracker’s JSON documents
//!
//! The core is the [`DocumentStore`](trait.DocumentStore.html) trait, which represents a
//! key-value store mapping a document name to its JSON text. Each persisted type
//! implements [`Document`](trait.Document.html) to declare the name it is stored under;
//! the [`DocumentStoreExt`](trait.DocumentStoreExt.html) methods then take care of the
//! (de)serialization:
//!
//! ```rust
//! use machine_time_tracker::db::{DocumentStoreExt, MemoryStore};
//! use machine_time_tracker::production::PartRecord;
//!
//! let mut store = MemoryStore::new();
//! assert_eq!(store.load::<Vec<PartRecord>>().unwrap(), None);
//! store.store(&Vec::<PartRecord>::new()).unwrap();
//! assert_eq!(store.load::<Vec<PartRecord>>().unwrap(), Some(vec![]));
//! ```
//!
//! This scheme is extensible, you can add your own storage drivers by implementing
//! `DocumentStore`, please see the existing drivers for examples.
//!
//! # Missing and malformed documents
//!
//! A document that was never written loads as `None`, and so does a document whose JSON
//! text is `null`. Text that cannot be parsed into the document type is an error; callers
//! decide whether that means starting from scratch.
use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

mod file;
mod memory;
mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A set of named JSON documents in some kind of durable storage
pub trait DocumentStore: Send {
    /// human-readable name of the driver, used for logging
    fn name(&self) -> &'static str;
    /// read the JSON text of a document, `None` if it was never written
    fn read(&mut self, document: &str) -> Result<Option<String>>;
    /// replace the JSON text of a document
    ///
    /// Drivers must not leave a half-written document behind: after a crash either the
    /// previous or the new text is visible.
    fn write(&mut self, document: &str, body: &str) -> Result<()>;
}

/// A type persisted as one document
pub trait Document: Serialize + DeserializeOwned {
    /// name of the document within its store
    fn document_name() -> &'static str;
}

/// Typed access to a [`DocumentStore`](trait.DocumentStore.html), automatically
/// available for every store
pub trait DocumentStoreExt: DocumentStore {
    fn load<D: Document>(&mut self) -> Result<Option<D>> {
        let name = D::document_name();
        match self.read(name)? {
            Some(body) => serde_json::from_str::<Option<D>>(&body)
                .with_context(|| format!("malformed document `{}` in {}", name, self.name())),
            None => Ok(None),
        }
    }

    fn store<D: Document>(&mut self, document: &D) -> Result<()> {
        let name = D::document_name();
        let body = serde_json::to_string_pretty(document)
            .with_context(|| format!("serializing document `{}`", name))?;
        self.write(name, &body)
            .with_context(|| format!("writing document `{}` to {}", name, self.name()))
    }
}

impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn read(&mut self, document: &str) -> Result<Option<String>> {
        (**self).read(document)
    }
    fn write(&mut self, document: &str, body: &str) -> Result<()> {
        (**self).write(document, body)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct TestDoc {
        pub a: String,
        pub b: i64,
    }

    impl Document for TestDoc {
        fn document_name() -> &'static str {
            "test_doc"
        }
    }

    pub fn test_doc() -> TestDoc {
        TestDoc {
            a: "aa".to_owned(),
            b: 12,
        }
    }

    /// the behaviour every driver must show, run against a fresh, empty store
    pub fn must_store_documents(store: &mut dyn DocumentStore) {
        assert_eq!(store.load::<TestDoc>().unwrap(), None);

        store.store(&test_doc()).unwrap();
        assert_eq!(store.load::<TestDoc>().unwrap(), Some(test_doc()));

        let changed = TestDoc {
            a: "bb".to_owned(),
            b: -3,
        };
        store.store(&changed).unwrap();
        assert_eq!(store.load::<TestDoc>().unwrap(), Some(changed));

        store.write("test_doc", "null").unwrap();
        assert_eq!(store.load::<TestDoc>().unwrap(), None);

        store.write("test_doc", "{\"a\": ").unwrap();
        assert!(store.load::<TestDoc>().is_err());
    }

    #[test]
    fn boxed_store_is_a_store() {
        let mut store: Box<dyn DocumentStore> = Box::new(MemoryStore::new());
        must_store_documents(&mut store);
    }
}
