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
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, NO_PARAMS};
use std::path::Path;
use tracing::{debug, info, instrument, trace_span};

pub const DOCUMENTS_TABLE_NAME: &str = "documents";

/// Document store driver for Sqlite3, based on the rusqlite crate
///
/// All documents live in one table keyed by document name. Every write is its own
/// transaction, so a crash leaves either the old or the new document.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(db_name: impl AsRef<Path>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = trace_span!("connect").in_scope(|| -> Result<_> {
            let conn = Connection::open_with_flags(db_name.as_ref(), flags)?;

            // `PRAGMA journal_mode = WAL;` https://www.sqlite.org/wal.html
            // This PRAGMA statement returns the new journal mode, so we need to see if it succeeded
            conn.query_row("PRAGMA journal_mode = WAL;", NO_PARAMS, |row| {
                match row.get_raw(0).as_str() {
                    Ok("wal") | Ok("memory") => Ok(()),
                    _ => Err(rusqlite::Error::InvalidQuery),
                }
            })?;
            // `PRAGMA synchronous = NORMAL;` https://www.sqlite.org/pragma.html#pragma_synchronous
            conn.execute("PRAGMA synchronous = NORMAL;", NO_PARAMS)?;

            debug!("new connection");
            Ok(conn)
        })?;

        conn.execute_batch(&format!(
            "create table if not exists {} (name text primary key, body text not null);",
            DOCUMENTS_TABLE_NAME
        ))?;
        info!(path = %db_name.as_ref().display(), "initialization complete");

        Ok(Self { conn })
    }
}

impl DocumentStore for SqliteStore {
    fn name(&self) -> &'static str {
        "Sqlite3(rusqlite)"
    }

    #[instrument(skip(self), level = "trace")]
    fn read(&mut self, document: &str) -> Result<Option<String>> {
        let body = self
            .conn
            .query_row(
                &format!("select body from {} where name = ?", DOCUMENTS_TABLE_NAME),
                params![document],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    #[instrument(skip(self, body), level = "trace")]
    fn write(&mut self, document: &str, body: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "insert into {} (name, body) values (?, ?) \
                on conflict(name) do update set body = excluded.body",
                DOCUMENTS_TABLE_NAME
            ),
            params![document, body],
        )?;
        tx.commit()?;
        debug!(bytes = body.len(), "done writing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::must_store_documents;

    #[test_env_log::test]
    fn sqlite_must_store() {
        let mut db = SqliteStore::new(":memory:").unwrap();
        must_store_documents(&mut db);
    }

    #[test]
    fn sqlite_must_persist_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.sqlite");
        SqliteStore::new(&path)
            .unwrap()
            .write("doc", "{\"x\":1}")
            .unwrap();

        let mut db = SqliteStore::new(&path).unwrap();
        assert_eq!(db.read("doc").unwrap().as_deref(), Some("{\"x\":1}"));
        assert_eq!(db.read("other").unwrap(), None);
    }
}
