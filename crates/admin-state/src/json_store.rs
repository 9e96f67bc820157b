use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::documents::{FleetCursor, FleetList, LedgerTable};
use crate::error::StateError;
use crate::store::{StateResult, StateStore};

const CURSOR_FILE: &str = "feedstocks.json";
const FLEET_FILE: &str = "all_feedstocks.json";

/// Directory of pretty-printed JSON documents.
///
/// Layout:
/// - `<root>/<Migrator>.json`
/// - `<root>/feedstocks.json`
/// - `<root>/all_feedstocks.json`
pub struct JsonStateStore {
    root: PathBuf,
}

impl JsonStateStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StateResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ledger_path(&self, migrator: &str) -> StateResult<PathBuf> {
        let valid = !migrator.is_empty()
            && migrator
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && migrator != "feedstocks"
            && migrator != "all_feedstocks";
        if !valid {
            return Err(StateError::InvalidName(migrator.to_string()));
        }
        Ok(self.root.join(format!("{migrator}.json")))
    }

    fn read_document<T: DeserializeOwned>(path: &Path) -> StateResult<Option<T>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::Io(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StateError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn write_document<T: Serialize>(&self, path: &Path, value: &T) -> StateResult<()> {
        let mut body = serde_json::to_string_pretty(value)?;
        body.push('\n');

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(body.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(path = %path.display(), "wrote state document");
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load_ledger(&self, migrator: &str) -> StateResult<LedgerTable> {
        let path = self.ledger_path(migrator)?;
        Ok(Self::read_document(&path)?.unwrap_or_default())
    }

    fn save_ledger(&self, migrator: &str, table: &LedgerTable) -> StateResult<()> {
        let path = self.ledger_path(migrator)?;
        self.write_document(&path, table)
    }

    fn load_cursor(&self) -> StateResult<Option<FleetCursor>> {
        Self::read_document(&self.root.join(CURSOR_FILE))
    }

    fn save_cursor(&self, cursor: &FleetCursor) -> StateResult<()> {
        self.write_document(&self.root.join(CURSOR_FILE), cursor)
    }

    fn load_fleet(&self) -> StateResult<Option<FleetList>> {
        Self::read_document(&self.root.join(FLEET_FILE))
    }

    fn save_fleet(&self, fleet: &FleetList) -> StateResult<()> {
        self.write_document(&self.root.join(FLEET_FILE), fleet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, JsonStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("data")).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_ledger_is_empty() {
        let (_dir, store) = make_store();
        assert!(store.load_ledger("BranchProtection").unwrap().is_empty());
    }

    #[test]
    fn ledger_file_is_pretty_and_sorted() {
        let (_dir, store) = make_store();
        let mut table = LedgerTable::new();
        table.mark("zlib", "main");
        table.mark("abseil", "v1");
        store.save_ledger("DotConda", &table).unwrap();

        let raw = fs::read_to_string(store.root().join("DotConda.json")).unwrap();
        assert!(raw.find("abseil").unwrap() < raw.find("zlib").unwrap());
        assert!(raw.contains("\n  \"abseil\": {\n    \"v1\": true\n  }"));
    }

    #[test]
    fn ledger_name_cannot_escape_root() {
        let (_dir, store) = make_store();
        assert!(matches!(
            store.load_ledger("../secrets"),
            Err(StateError::InvalidName(_))
        ));
        assert!(matches!(
            store.load_ledger("feedstocks"),
            Err(StateError::InvalidName(_))
        ));
    }

    #[test]
    fn malformed_cursor_is_an_error() {
        let (_dir, store) = make_store();
        fs::write(store.root().join("feedstocks.json"), "[1, 2").unwrap();
        match store.load_cursor() {
            Err(StateError::Malformed { path, .. }) => {
                assert!(path.ends_with("feedstocks.json"))
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn cursor_file_uses_current_feedstock_key() {
        let (_dir, store) = make_store();
        store.save_cursor(&FleetCursor::at("numpy")).unwrap();
        let raw = fs::read_to_string(store.root().join("feedstocks.json")).unwrap();
        assert!(raw.contains("\"current_feedstock\": \"numpy\""));
    }
}
