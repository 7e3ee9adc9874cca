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
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// One JSON file per document below a root directory
///
/// Documents are replaced by writing a sibling `.tmp` file, syncing it and renaming it
/// over the previous file.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, document: &str) -> PathBuf {
        self.root.join(format!("{}.json", document))
    }
}

impl DocumentStore for FileStore {
    fn name(&self) -> &'static str {
        "json files"
    }

    #[instrument(skip(self), level = "trace")]
    fn read(&mut self, document: &str) -> Result<Option<String>> {
        let path = self.path_of(document);
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    #[instrument(skip(self, body), level = "trace")]
    fn write(&mut self, document: &str, body: &str) -> Result<()> {
        let path = self.path_of(document);
        let tmp = path.with_extension("json.tmp");

        let mut file =
            File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("writing {}", tmp.display()))?;
        drop(file);

        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing {}", path.display()))?;
        debug!(bytes = body.len(), "written {}", path.display());
        Ok(())
    }
}
