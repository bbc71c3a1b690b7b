//! In-memory remote store: backs the tests and offline runs.

use std::collections::HashMap;

use crate::{FileId, RemoteFiles, SyncError};

#[derive(Default)]
pub struct InMemoryRemote {
    // (parent id or "" for root-level dirs, name) -> file id
    names: HashMap<(String, String), FileId>,
    contents: HashMap<FileId, String>,
    next_id: u32,
    fail_fetches: bool,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> FileId {
        self.next_id += 1;
        FileId(format!("f{}", self.next_id))
    }

    /// Pre-populate a file under a (created-on-demand) root dir.
    pub fn seed(&mut self, dir: &str, name: &str, content: &str) {
        let dir_id = match self.names.get(&(String::new(), dir.to_string())) {
            Some(id) => id.clone(),
            None => {
                let id = self.alloc();
                self.names
                    .insert((String::new(), dir.to_string()), id.clone());
                id
            }
        };
        let file_id = self.alloc();
        self.names
            .insert((dir_id.0.clone(), name.to_string()), file_id.clone());
        self.contents.insert(file_id, content.to_string());
    }

    /// Content of the uniquely-named file, wherever it lives.
    pub fn content_by_name(&self, name: &str) -> Option<String> {
        let id = self
            .names
            .iter()
            .find(|((_, n), _)| n == name)
            .map(|(_, id)| id)?;
        self.contents.get(id).cloned()
    }

    /// Make every subsequent fetch fail, for short-circuit tests.
    pub fn fail_fetches(&mut self) {
        self.fail_fetches = true;
    }
}

impl RemoteFiles for InMemoryRemote {
    fn find_file(
        &mut self,
        name: &str,
        parent: Option<&FileId>,
    ) -> Result<Option<FileId>, SyncError> {
        let parent_key = parent.map(|p| p.0.clone()).unwrap_or_default();
        Ok(self.names.get(&(parent_key, name.to_string())).cloned())
    }

    fn create_dir(&mut self, name: &str) -> Result<FileId, SyncError> {
        let id = self.alloc();
        self.names
            .insert((String::new(), name.to_string()), id.clone());
        Ok(id)
    }

    fn create_file(&mut self, name: &str, parent: &FileId) -> Result<FileId, SyncError> {
        let id = self.alloc();
        self.names
            .insert((parent.0.clone(), name.to_string()), id.clone());
        self.contents.insert(id.clone(), String::new());
        Ok(id)
    }

    fn fetch(&mut self, id: &FileId) -> Result<String, SyncError> {
        if self.fail_fetches {
            return Err(SyncError::Remote {
                step: "fetch",
                detail: "simulated failure".to_string(),
            });
        }
        Ok(self.contents.get(id).cloned().unwrap_or_default())
    }

    fn upload(&mut self, id: &FileId, content: &str) -> Result<(), SyncError> {
        self.contents.insert(id.clone(), content.to_string());
        Ok(())
    }
}
