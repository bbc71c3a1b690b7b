//! Persisted extension state.
//!
//! A JSON-object key/value store, the local-storage analogue the rest of
//! the system reads through typed accessors. The pipeline reads it once
//! per page into a [`PolicySnapshot`]; the background runtime and the
//! vocabulary operations write it. File-backed stores write through on
//! every set, in-memory stores back the tests and the driver.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use policy::{
    Dictionary, HighlightSettings, HoverSettings, OnlineDict, PolicySnapshot, default_online_dicts,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub mod keys {
    pub const DICT_WORDS: &str = "dict_words";
    pub const USER_VOCABULARY: &str = "user_vocabulary";
    pub const USER_VOCAB_ADDED: &str = "user_vocab_added";
    pub const USER_VOCAB_DELETED: &str = "user_vocab_deleted";
    pub const HIGHLIGHT_SETTINGS: &str = "highlight_settings";
    pub const HOVER_SETTINGS: &str = "hover_settings";
    pub const ONLINE_DICTS: &str = "online_dicts";
    pub const ENABLED_MODE: &str = "enabled_mode";
    pub const BLACK_LIST: &str = "black_list";
    pub const WHITE_LIST: &str = "white_list";
    pub const TTS_ENABLED: &str = "tts_enabled";
    pub const MINIMUM_RANK: &str = "minimum_rank";
    pub const SYNC_ENABLED: &str = "sync_enabled";
    pub const LAST_SYNC_ERROR: &str = "last_sync_error";
    pub const LAST_SYNC_TIME: &str = "last_sync_time";
}

/// First-run rank threshold: everything ranked more common than this is
/// assumed known.
pub const DEFAULT_MINIMUM_RANK: u32 = 6000;

/// Background sync cadence.
pub const SYNC_PERIOD_MS: u64 = 30 * 60 * 1000;

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    Malformed(serde_json::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Malformed(err)
    }
}

pub struct Storage {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Storage {
            path: None,
            values: Map::new(),
        }
    }

    /// Open a file-backed store. A missing file is an empty store; a
    /// malformed one is an error rather than a silent reset.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Storage {
            path: Some(path),
            values,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed read. Missing keys and shape mismatches both come back as
    /// `None`; the caller supplies the default.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(err) => {
                log::warn!("malformed value under {key}: {err}");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        self.persist()
    }

    fn persist(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string(&self.values)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn set_if_missing<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        if !self.contains(key) {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// First-run defaults, written only for keys that are absent. Mirrors
/// what a fresh install looks like.
pub fn init_defaults(storage: &mut Storage) -> Result<(), StorageError> {
    storage.set_if_missing(keys::HIGHLIGHT_SETTINGS, &HighlightSettings::default())?;
    storage.set_if_missing(keys::HOVER_SETTINGS, &HoverSettings::default())?;
    storage.set_if_missing(keys::ONLINE_DICTS, &default_online_dicts())?;
    storage.set_if_missing(keys::TTS_ENABLED, &false)?;
    storage.set_if_missing(keys::ENABLED_MODE, &true)?;
    storage.set_if_missing(keys::USER_VOCABULARY, &BTreeSet::<String>::new())?;
    storage.set_if_missing(keys::BLACK_LIST, &BTreeSet::<String>::new())?;
    storage.set_if_missing(keys::WHITE_LIST, &BTreeSet::<String>::new())?;
    storage.set_if_missing(keys::MINIMUM_RANK, &DEFAULT_MINIMUM_RANK)?;
    Ok(())
}

/// Load and store the frequency dictionary from `word,frequency` CSV.
pub fn load_dictionary_csv(storage: &mut Storage, csv: &str) -> Result<usize, StorageError> {
    let dict = Dictionary::from_frequency_csv(csv);
    let len = dict.len();
    storage.set(keys::DICT_WORDS, &dict)?;
    Ok(len)
}

/// Capture the per-page policy snapshot. Missing pieces fall back to the
/// same defaults `init_defaults` would write.
pub fn load_snapshot(storage: &Storage) -> PolicySnapshot {
    PolicySnapshot {
        dictionary: storage.get::<Dictionary>(keys::DICT_WORDS).unwrap_or_default(),
        vocabulary: storage
            .get::<BTreeSet<String>>(keys::USER_VOCABULARY)
            .unwrap_or_default()
            .into_iter()
            .collect(),
        highlight: storage
            .get::<HighlightSettings>(keys::HIGHLIGHT_SETTINGS)
            .unwrap_or_default(),
        hover: storage
            .get::<HoverSettings>(keys::HOVER_SETTINGS)
            .unwrap_or_default(),
        minimum_rank: storage
            .get::<u32>(keys::MINIMUM_RANK)
            .unwrap_or(DEFAULT_MINIMUM_RANK),
        online_dicts: storage
            .get::<Vec<OnlineDict>>(keys::ONLINE_DICTS)
            .unwrap_or_default(),
        tts_enabled: storage.get::<bool>(keys::TTS_ENABLED).unwrap_or(false),
    }
}

/// Site lists plus the global enabled flag, for the page verdict.
pub fn site_config(storage: &Storage) -> (bool, BTreeSet<String>, BTreeSet<String>) {
    (
        storage.get::<bool>(keys::ENABLED_MODE).unwrap_or(true),
        storage.get(keys::BLACK_LIST).unwrap_or_default(),
        storage.get(keys::WHITE_LIST).unwrap_or_default(),
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Exists,
    /// Empty, over-long, or not a dictionary word.
    Rejected,
}

/// Add a lexeme to the known vocabulary, maintaining the sync deltas.
pub fn add_lexeme(storage: &mut Storage, lexeme: &str) -> Result<AddOutcome, StorageError> {
    if lexeme.chars().count() > 100 {
        return Ok(AddOutcome::Rejected);
    }
    let lexeme = lexeme.trim();
    if lexeme.is_empty() {
        return Ok(AddOutcome::Rejected);
    }
    let dictionary = storage.get::<Dictionary>(keys::DICT_WORDS).unwrap_or_default();
    if !dictionary.contains(lexeme) {
        return Ok(AddOutcome::Rejected);
    }

    let mut vocabulary: BTreeSet<String> =
        storage.get(keys::USER_VOCABULARY).unwrap_or_default();
    if vocabulary.contains(lexeme) {
        return Ok(AddOutcome::Exists);
    }
    vocabulary.insert(lexeme.to_string());
    storage.set(keys::USER_VOCABULARY, &vocabulary)?;

    if let Some(mut added) = storage.get::<BTreeSet<String>>(keys::USER_VOCAB_ADDED) {
        added.insert(lexeme.to_string());
        storage.set(keys::USER_VOCAB_ADDED, &added)?;
    }
    if let Some(mut deleted) = storage.get::<BTreeSet<String>>(keys::USER_VOCAB_DELETED) {
        deleted.remove(lexeme);
        storage.set(keys::USER_VOCAB_DELETED, &deleted)?;
    }
    Ok(AddOutcome::Added)
}

/// Whether a periodic sync should fire at `now_ms` (unix millis).
pub fn sync_due(storage: &Storage, now_ms: u64) -> bool {
    if !storage.get::<bool>(keys::SYNC_ENABLED).unwrap_or(false) {
        return false;
    }
    if storage.get::<Option<String>>(keys::LAST_SYNC_ERROR).flatten().is_some() {
        return false;
    }
    let last = storage.get::<u64>(keys::LAST_SYNC_TIME).unwrap_or(0);
    now_ms.saturating_sub(last) >= SYNC_PERIOD_MS
}

/// Record a successful sync: the merged set becomes the vocabulary, the
/// deltas reset, the clock stamps.
pub fn apply_sync_result(
    storage: &mut Storage,
    merged: &BTreeSet<String>,
    now_ms: u64,
) -> Result<(), StorageError> {
    storage.set(keys::LAST_SYNC_ERROR, &Value::Null)?;
    storage.set(keys::USER_VOCABULARY, merged)?;
    storage.set(keys::USER_VOCAB_ADDED, &BTreeSet::<String>::new())?;
    storage.set(keys::USER_VOCAB_DELETED, &BTreeSet::<String>::new())?;
    storage.set(keys::LAST_SYNC_TIME, &now_ms)?;
    Ok(())
}

/// Record a failed sync; `sync_due` stays false until the user resolves
/// it interactively.
pub fn record_sync_failure(storage: &mut Storage, message: &str) -> Result<(), StorageError> {
    log::warn!("sync failed: {message}");
    storage.set(keys::LAST_SYNC_ERROR, &message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Storage {
        let mut storage = Storage::in_memory();
        init_defaults(&mut storage).unwrap();
        load_dictionary_csv(&mut storage, "の,10000\n学生,1234\n先生,900\n").unwrap();
        storage
    }

    #[test]
    fn defaults_cover_a_fresh_install() {
        let mut storage = Storage::in_memory();
        init_defaults(&mut storage).unwrap();
        let snap = load_snapshot(&storage);
        assert!(snap.highlight.word_params.enabled);
        assert_eq!(snap.minimum_rank, DEFAULT_MINIMUM_RANK);
        assert_eq!(snap.online_dicts.len(), 4);
        assert!(snap.vocabulary.is_empty());
        assert!(!snap.tts_enabled);
    }

    #[test]
    fn defaults_do_not_clobber_existing_values() {
        let mut storage = Storage::in_memory();
        storage.set(keys::MINIMUM_RANK, &123u32).unwrap();
        init_defaults(&mut storage).unwrap();
        assert_eq!(storage.get::<u32>(keys::MINIMUM_RANK), Some(123));
    }

    #[test]
    fn snapshot_reflects_the_loaded_dictionary() {
        let storage = seeded();
        let snap = load_snapshot(&storage);
        assert_eq!(snap.dictionary.len(), 3);
        assert_eq!(snap.dictionary.get("学生").unwrap().rank, 2);
    }

    #[test]
    fn add_lexeme_validates_then_updates_the_deltas() {
        let mut storage = seeded();
        storage
            .set(keys::USER_VOCAB_ADDED, &BTreeSet::<String>::new())
            .unwrap();
        storage
            .set(
                keys::USER_VOCAB_DELETED,
                &BTreeSet::from(["学生".to_string()]),
            )
            .unwrap();

        assert_eq!(add_lexeme(&mut storage, "学生").unwrap(), AddOutcome::Added);
        assert_eq!(add_lexeme(&mut storage, "学生").unwrap(), AddOutcome::Exists);
        assert_eq!(add_lexeme(&mut storage, "未知語").unwrap(), AddOutcome::Rejected);
        assert_eq!(add_lexeme(&mut storage, "  ").unwrap(), AddOutcome::Rejected);
        let long = "あ".repeat(101);
        assert_eq!(add_lexeme(&mut storage, &long).unwrap(), AddOutcome::Rejected);

        let added: BTreeSet<String> = storage.get(keys::USER_VOCAB_ADDED).unwrap();
        let deleted: BTreeSet<String> = storage.get(keys::USER_VOCAB_DELETED).unwrap();
        assert!(added.contains("学生"));
        assert!(!deleted.contains("学生"));
    }

    #[test]
    fn sync_due_needs_enabled_no_error_and_a_stale_stamp() {
        let mut storage = seeded();
        let now = 10 * SYNC_PERIOD_MS;
        assert!(!sync_due(&storage, now));

        storage.set(keys::SYNC_ENABLED, &true).unwrap();
        storage.set(keys::LAST_SYNC_ERROR, &Value::Null).unwrap();
        assert!(sync_due(&storage, now));

        storage.set(keys::LAST_SYNC_TIME, &(now - 1000)).unwrap();
        assert!(!sync_due(&storage, now));

        storage.set(keys::LAST_SYNC_TIME, &(now - SYNC_PERIOD_MS)).unwrap();
        assert!(sync_due(&storage, now));

        record_sync_failure(&mut storage, "offline").unwrap();
        assert!(!sync_due(&storage, now));
    }

    #[test]
    fn applying_a_sync_result_resets_the_deltas() {
        let mut storage = seeded();
        storage
            .set(keys::USER_VOCAB_ADDED, &BTreeSet::from(["a".to_string()]))
            .unwrap();
        let merged = BTreeSet::from(["学生".to_string(), "先生".to_string()]);
        apply_sync_result(&mut storage, &merged, 42).unwrap();

        let snap = load_snapshot(&storage);
        assert!(snap.vocabulary.contains("学生"));
        let added: BTreeSet<String> = storage.get(keys::USER_VOCAB_ADDED).unwrap();
        assert!(added.is_empty());
        assert_eq!(storage.get::<u64>(keys::LAST_SYNC_TIME), Some(42));
        assert_eq!(storage.get::<Option<String>>(keys::LAST_SYNC_ERROR), Some(None));
    }

    #[test]
    fn file_backed_store_roundtrips() {
        let dir = std::env::temp_dir().join(format!("ktb-storage-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        let _ = std::fs::remove_file(&path);

        {
            let mut storage = Storage::open(&path).unwrap();
            storage.set(keys::MINIMUM_RANK, &777u32).unwrap();
        }
        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.get::<u32>(keys::MINIMUM_RANK), Some(777));
        let _ = std::fs::remove_file(&path);
    }
}
