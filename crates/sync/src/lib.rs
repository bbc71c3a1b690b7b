//! Cloud vocabulary reconciliation.
//!
//! The user's vocabulary lives as a plain text file in a remote file
//! store, one lemma per line. Sync is a three-way set reconciliation:
//! the local state tracks the full set plus added/deleted deltas since
//! the last sync; the remote file is fetched, the deltas applied, and
//! the merged set uploaded and adopted locally. A backup file
//! additionally keeps the union of everything ever seen.
//!
//! Each remote step is an explicit, sequential operation returning a
//! `Result`; the first failure short-circuits the pipeline to the
//! caller's single error sink. No callbacks, no partial state: local
//! storage is only touched after the upload succeeded.

mod mem;
mod remote;

pub use mem::InMemoryRemote;
pub use remote::DriveClient;

use std::collections::BTreeSet;

/// Remote folder holding the vocabulary and backup files.
pub const SYNC_DIR_NAME: &str = "Highlighter Sync";

#[derive(Debug)]
pub enum SyncError {
    /// A remote operation failed (transport or API status).
    Remote { step: &'static str, detail: String },
    /// A name query matched more than one object; merging into an
    /// arbitrary one could destroy data.
    AmbiguousQuery(String),
}

impl SyncError {
    pub fn message(&self) -> String {
        match self {
            SyncError::Remote { step, detail } => format!("{step}: {detail}"),
            SyncError::AmbiguousQuery(query) => {
                format!("more than one object found for query: {query}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub String);

/// Outcome of a find-or-create step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Found(FileId),
    Created(FileId),
}

impl Lookup {
    pub fn id(&self) -> &FileId {
        match self {
            Lookup::Found(id) | Lookup::Created(id) => id,
        }
    }
}

/// Boundary to the remote file store. Implementations scope all
/// operations to files this application created (the Drive client tags
/// and queries an application property).
pub trait RemoteFiles {
    fn find_file(&mut self, name: &str, parent: Option<&FileId>)
    -> Result<Option<FileId>, SyncError>;
    fn create_dir(&mut self, name: &str) -> Result<FileId, SyncError>;
    fn create_file(&mut self, name: &str, parent: &FileId) -> Result<FileId, SyncError>;
    fn fetch(&mut self, id: &FileId) -> Result<String, SyncError>;
    fn upload(&mut self, id: &FileId, content: &str) -> Result<(), SyncError>;
}

/// Local sync state for one named vocabulary.
#[derive(Clone, Debug, Default)]
pub struct VocabState {
    pub name: String,
    pub all: BTreeSet<String>,
    pub added: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

/// One lemma per line; CR is tolerated, a trailing empty line ignored.
pub fn parse_vocabulary(text: &str) -> BTreeSet<String> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sorted, CRLF-joined. Sorted output keeps uploads byte-stable for
/// identical sets.
pub fn serialize_vocabulary(entries: &BTreeSet<String>) -> String {
    entries.iter().cloned().collect::<Vec<_>>().join("\r\n")
}

fn ensure_dir(remote: &mut dyn RemoteFiles, name: &str) -> Result<Lookup, SyncError> {
    match remote.find_file(name, None)? {
        Some(id) => Ok(Lookup::Found(id)),
        None => Ok(Lookup::Created(remote.create_dir(name)?)),
    }
}

fn ensure_file(
    remote: &mut dyn RemoteFiles,
    name: &str,
    parent: &FileId,
) -> Result<Lookup, SyncError> {
    match remote.find_file(name, Some(parent))? {
        Some(id) => Ok(Lookup::Found(id)),
        None => Ok(Lookup::Created(remote.create_file(name, parent)?)),
    }
}

/// Merge the union of everything we know into the backup file. The
/// backup only ever grows; deletions do not propagate into it.
fn backup(remote: &mut dyn RemoteFiles, dir: &FileId, vocab: &VocabState) -> Result<(), SyncError> {
    let backup_name = format!(".{}.backup", vocab.name);
    let file = ensure_file(remote, &backup_name, dir)?;
    let mut entries = parse_vocabulary(&remote.fetch(file.id())?);
    entries.extend(vocab.all.iter().cloned());
    entries.extend(vocab.added.iter().cloned());
    entries.extend(vocab.deleted.iter().cloned());
    remote.upload(file.id(), &serialize_vocabulary(&entries))
}

/// Fetch, apply the deltas, upload, and return the merged set. When the
/// vocabulary file did not exist yet, the full local set counts as
/// added — otherwise a fresh remote would wipe the local vocabulary.
fn merge_vocabulary(
    remote: &mut dyn RemoteFiles,
    dir: &FileId,
    vocab: &VocabState,
) -> Result<BTreeSet<String>, SyncError> {
    let file_name = format!("{}.txt", vocab.name);
    let (file, added) = match ensure_file(remote, &file_name, dir)? {
        Lookup::Found(id) => (id, vocab.added.clone()),
        Lookup::Created(id) => {
            let mut widened = vocab.all.clone();
            widened.extend(vocab.added.iter().cloned());
            (id, widened)
        }
    };

    let mut entries = parse_vocabulary(&remote.fetch(&file)?);
    entries.retain(|word| !vocab.deleted.contains(word));
    entries.extend(added);
    remote.upload(&file, &serialize_vocabulary(&entries))?;
    Ok(entries)
}

/// The full pipeline: ensure the sync folder, refresh the backup, then
/// reconcile the vocabulary file. Returns the merged set for the caller
/// to adopt locally.
pub fn full_sync(
    remote: &mut dyn RemoteFiles,
    vocab: &VocabState,
) -> Result<BTreeSet<String>, SyncError> {
    let dir = ensure_dir(remote, SYNC_DIR_NAME)?;
    backup(remote, dir.id(), vocab)?;
    let merged = merge_vocabulary(remote, dir.id(), vocab)?;
    log::info!("sync merged {} entries", merged.len());
    Ok(merged)
}
