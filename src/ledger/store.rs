use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    ledger::{
        error::{LedgerError, io_error},
        types::{DecisionRecord, DigestAlgorithm, RecordKind, StoredRecord},
    },
    types::canonicalize_json,
};

const LEDGER_KEY_CONTEXT: &str = "vigil decision ledger 2025-01 record digest";
const RECORD_EXTENSION: &str = "jsonl";

/// Content-addressed, append-only decision records. Each record lives in
/// `<kind>-<digest>.jsonl`; the digest is the barcode returned to callers.
#[derive(Clone)]
pub struct DecisionLedger {
    dir: PathBuf,
    key: Option<[u8; 32]>,
}

impl std::fmt::Debug for DecisionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLedger")
            .field("dir", &self.dir)
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

impl DecisionLedger {
    pub fn new(dir: impl Into<PathBuf>, hash_key: Option<&str>) -> Self {
        let key = hash_key
            .filter(|key| !key.is_empty())
            .map(|key| blake3::derive_key(LEDGER_KEY_CONTEXT, key.as_bytes()));
        Self {
            dir: dir.into(),
            key,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        if self.key.is_some() {
            DigestAlgorithm::Blake3Keyed
        } else {
            DigestAlgorithm::Sha256
        }
    }

    pub fn serialize(record: &DecisionRecord) -> Result<String, LedgerError> {
        let value = serde_json::to_value(record)?;
        Ok(serde_json::to_string(&canonicalize_json(&value))?)
    }

    pub fn digest(&self, serialized: &str) -> String {
        match &self.key {
            Some(key) => blake3::keyed_hash(key, serialized.as_bytes()).to_hex().to_string(),
            None => format!("{:x}", Sha256::digest(serialized.as_bytes())),
        }
    }

    fn record_path(&self, kind: RecordKind, barcode: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{barcode}.{RECORD_EXTENSION}", kind.as_str()))
    }

    /// Writes a record once and returns its barcode. Rewriting identical
    /// content returns the same barcode; a file left empty or truncated by an
    /// interrupted write is replaced.
    pub fn write(&self, record: &DecisionRecord) -> Result<String, LedgerError> {
        let serialized = Self::serialize(record)?;
        let barcode = self.digest(&serialized);
        let path = self.record_path(record.kind, &barcode);

        match fs::read_to_string(&path) {
            Ok(existing) if existing.lines().next() == Some(serialized.as_str()) => {
                tracing::debug!(
                    target: "ledger",
                    kind = record.kind.as_str(),
                    barcode = %barcode,
                    "ledger_record_exists"
                );
                return Ok(barcode);
            }
            Ok(_) => tracing::warn!(
                target: "ledger",
                kind = record.kind.as_str(),
                barcode = %barcode,
                "ledger_record_repaired"
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&path)(err)),
        }

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let tmp_path = self.dir.join(format!(
            ".{}-{barcode}.{}.tmp",
            record.kind.as_str(),
            Uuid::now_v7()
        ));
        if let Err(err) = write_synced(&tmp_path, &serialized) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&path)(err));
        }

        if let Ok(dir) = fs::File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        tracing::info!(
            target: "ledger",
            kind = record.kind.as_str(),
            decision_id = %record.decision_id,
            barcode = %barcode,
            "ledger_record_written"
        );
        Ok(barcode)
    }

    pub fn read(&self, kind: RecordKind, barcode: &str) -> Result<Option<StoredRecord>, LedgerError> {
        if barcode.is_empty() || !barcode.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(LedgerError::InvalidBarcode(barcode.to_string()));
        }
        let path = self.record_path(kind, barcode);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path)(err)),
        };
        parse_stored(barcode, &content).map(Some)
    }

    /// Linear scan of the ledger directory for every record of one decision,
    /// grouped by kind and ordered by barcode.
    pub fn find_by_decision_id(
        &self,
        decision_id: &str,
    ) -> Result<BTreeMap<RecordKind, Vec<StoredRecord>>, LedgerError> {
        let mut grouped = BTreeMap::<RecordKind, Vec<StoredRecord>>::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(grouped),
            Err(err) => return Err(io_error(&self.dir)(err)),
        };

        for entry in entries {
            let entry = entry.map_err(io_error(&self.dir))?;
            let file_name = entry.file_name();
            let Some((kind, barcode)) = file_name.to_str().and_then(parse_file_name) else {
                continue;
            };
            let Some(stored) = self.read(kind, &barcode)? else {
                continue;
            };
            if stored.record.decision_id == decision_id {
                grouped.entry(kind).or_default().push(stored);
            }
        }

        for records in grouped.values_mut() {
            records.sort_by(|lhs, rhs| lhs.barcode.cmp(&rhs.barcode));
        }
        Ok(grouped)
    }
}

fn write_synced(path: &Path, serialized: &str) -> Result<(), LedgerError> {
    let file = fs::File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(serialized.as_bytes())
        .map_err(io_error(path))?;
    writer.write_all(b"\n").map_err(io_error(path))?;
    writer.flush().map_err(io_error(path))?;
    writer.get_ref().sync_all().map_err(io_error(path))
}

fn parse_file_name(file_name: &str) -> Option<(RecordKind, String)> {
    let stem = file_name.strip_suffix(&format!(".{RECORD_EXTENSION}"))?;
    let (prefix, barcode) = stem.rsplit_once('-')?;
    let kind = RecordKind::from_file_prefix(prefix)?;
    if barcode.is_empty() || !barcode.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some((kind, barcode.to_string()))
}

fn parse_stored(barcode: &str, content: &str) -> Result<StoredRecord, LedgerError> {
    let serialized = content.lines().next().unwrap_or_default().to_string();
    if serialized.is_empty() {
        return Err(LedgerError::Corrupt {
            barcode: barcode.to_string(),
            reason: "empty record file".to_string(),
        });
    }
    let record = serde_json::from_str::<DecisionRecord>(&serialized).map_err(|err| {
        LedgerError::Corrupt {
            barcode: barcode.to_string(),
            reason: err.to_string(),
        }
    })?;
    Ok(StoredRecord {
        barcode: barcode.to_string(),
        serialized,
        record,
    })
}
