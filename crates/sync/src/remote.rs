//! HTTP client for a Drive-style remote file store.
//!
//! Every file this client creates is tagged with the `wdfile`
//! application property, and every query filters on it, so sync can
//! never touch files some other application put in the account.

use std::time::Duration;

use serde_json::{Value, json};

use crate::{FileId, RemoteFiles, SyncError};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com";

pub struct DriveClient {
    agent: ureq::Agent,
    api_base: String,
    access_token: String,
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_api_base(access_token, DEFAULT_API_BASE)
    }

    /// Point the client somewhere else (a test server).
    pub fn with_api_base(access_token: impl Into<String>, api_base: impl Into<String>) -> Self {
        DriveClient {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(20))
                .build(),
            api_base: api_base.into(),
            access_token: access_token.into(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    fn remote_err(step: &'static str, err: ureq::Error) -> SyncError {
        SyncError::Remote {
            step,
            detail: err.to_string(),
        }
    }

    fn body_err(step: &'static str, err: std::io::Error) -> SyncError {
        SyncError::Remote {
            step,
            detail: err.to_string(),
        }
    }

    fn created_id(step: &'static str, body: Value) -> Result<FileId, SyncError> {
        body.get("id")
            .and_then(Value::as_str)
            .map(|id| FileId(id.to_string()))
            .ok_or(SyncError::Remote {
                step,
                detail: "response carried no file id".to_string(),
            })
    }
}

impl RemoteFiles for DriveClient {
    fn find_file(
        &mut self,
        name: &str,
        parent: Option<&FileId>,
    ) -> Result<Option<FileId>, SyncError> {
        let mut query = format!(
            "name = '{name}' and trashed = false and appProperties has \
             {{ key='wdfile' and value='1' }}"
        );
        if let Some(parent) = parent {
            query.push_str(&format!(" and '{}' in parents", parent.0));
        }

        let url = format!("{}/drive/v3/files", self.api_base);
        let body: Value = self
            .agent
            .get(&url)
            .set("Authorization", &self.bearer())
            .query("q", &query)
            .call()
            .map_err(|e| Self::remote_err("find", e))?
            .into_json()
            .map_err(|e| Self::body_err("find", e))?;

        let files = body.get("files").and_then(Value::as_array);
        match files.map(Vec::as_slice) {
            Some([]) | None => Ok(None),
            Some([only]) => {
                let id = only.get("id").and_then(Value::as_str).ok_or(SyncError::Remote {
                    step: "find",
                    detail: "file object carried no id".to_string(),
                })?;
                Ok(Some(FileId(id.to_string())))
            }
            Some(_) => Err(SyncError::AmbiguousQuery(query)),
        }
    }

    fn create_dir(&mut self, name: &str) -> Result<FileId, SyncError> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let body: Value = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(json!({
                "name": name,
                "mimeType": "application/vnd.google-apps.folder",
                "appProperties": { "wdfile": "1" },
            }))
            .map_err(|e| Self::remote_err("create dir", e))?
            .into_json()
            .map_err(|e| Self::body_err("create dir", e))?;
        Self::created_id("create dir", body)
    }

    fn create_file(&mut self, name: &str, parent: &FileId) -> Result<FileId, SyncError> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let body: Value = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(json!({
                "name": name,
                "parents": [parent.0],
                "appProperties": { "wdfile": "1" },
                "mimeType": "text/plain",
            }))
            .map_err(|e| Self::remote_err("create file", e))?
            .into_json()
            .map_err(|e| Self::body_err("create file", e))?;
        Self::created_id("create file", body)
    }

    fn fetch(&mut self, id: &FileId) -> Result<String, SyncError> {
        let url = format!("{}/drive/v3/files/{}", self.api_base, id.0);
        self.agent
            .get(&url)
            .set("Authorization", &self.bearer())
            .query("alt", "media")
            .call()
            .map_err(|e| Self::remote_err("fetch", e))?
            .into_string()
            .map_err(|e| Self::body_err("fetch", e))
    }

    fn upload(&mut self, id: &FileId, content: &str) -> Result<(), SyncError> {
        let url = format!("{}/upload/drive/v3/files/{}", self.api_base, id.0);
        self.agent
            .request("PATCH", &url)
            .set("Authorization", &self.bearer())
            .set("Content-Type", "text/plain; charset=utf-8")
            .send_string(content)
            .map_err(|e| Self::remote_err("upload", e))?;
        Ok(())
    }
}
