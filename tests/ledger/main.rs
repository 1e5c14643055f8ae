use std::{fs, path::PathBuf};

use serde_json::json;
use uuid::Uuid;
use vigil::ledger::{DecisionLedger, DecisionRecord, DigestAlgorithm, LedgerError, RecordKind};

fn temp_ledger_dir() -> PathBuf {
    std::env::temp_dir().join(format!("vigil-ledger-test-{}", Uuid::now_v7()))
}

fn record(kind: RecordKind, decision_id: &str) -> DecisionRecord {
    DecisionRecord {
        kind,
        decision_id: decision_id.to_string(),
        cycle_id: 7,
        recorded_at_ms: 1_700_000_000_000,
        body: json!({
            "winners": [{ "bid_id": "bid:utility:e1", "score": 1.25 }],
            "budget": { "pool_ms": 1000, "available_ms": 880 },
            "zeta": null,
            "alpha": "first",
        }),
    }
}

#[test]
fn given_written_record_when_read_back_then_bytes_and_value_are_identical() {
    let dir = temp_ledger_dir();
    let ledger = DecisionLedger::new(&dir, None);
    let original = record(RecordKind::WhyTrace, "dec-1");

    let barcode = ledger.write(&original).expect("write should succeed");
    let stored = ledger
        .read(RecordKind::WhyTrace, &barcode)
        .expect("read should succeed")
        .expect("record should exist");

    assert_eq!(
        stored.serialized,
        DecisionLedger::serialize(&original).expect("record serializes")
    );
    assert_eq!(stored.record, original);
    assert_eq!(stored.barcode, barcode);
    assert_eq!(ledger.digest(&stored.serialized), barcode);
    assert_eq!(ledger.algorithm(), DigestAlgorithm::Sha256);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn given_identical_record_when_rewritten_then_barcode_is_stable_and_one_file_exists() {
    let dir = temp_ledger_dir();
    let ledger = DecisionLedger::new(&dir, None);
    let original = record(RecordKind::ReplayCapsule, "dec-2");

    let first = ledger.write(&original).expect("first write");
    let second = ledger.write(&original.clone()).expect("second write");

    assert_eq!(first, second);
    assert_eq!(fs::read_dir(&dir).expect("ledger dir exists").count(), 1);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn given_hash_key_when_digesting_then_keyed_barcode_differs_from_plain() {
    let dir = temp_ledger_dir();
    let plain = DecisionLedger::new(&dir, None);
    let keyed = DecisionLedger::new(&dir, Some("ledger-secret"));
    let other_key = DecisionLedger::new(&dir, Some("another-secret"));
    let serialized =
        DecisionLedger::serialize(&record(RecordKind::WhyTrace, "dec-3")).expect("serializes");

    assert_eq!(keyed.algorithm(), DigestAlgorithm::Blake3Keyed);
    assert_ne!(plain.digest(&serialized), keyed.digest(&serialized));
    assert_ne!(keyed.digest(&serialized), other_key.digest(&serialized));
    assert_eq!(keyed.digest(&serialized), keyed.digest(&serialized));
}

#[test]
fn given_records_of_several_decisions_when_querying_then_only_matching_ones_return() {
    let dir = temp_ledger_dir();
    let ledger = DecisionLedger::new(&dir, Some("k"));
    ledger
        .write(&record(RecordKind::WhyTrace, "dec-a"))
        .expect("write why");
    ledger
        .write(&record(RecordKind::ReplayCapsule, "dec-a"))
        .expect("write capsule");
    ledger
        .write(&record(RecordKind::WhyTrace, "dec-b"))
        .expect("write other");

    let found = ledger.find_by_decision_id("dec-a").expect("scan succeeds");
    assert_eq!(found.get(&RecordKind::WhyTrace).map(Vec::len), Some(1));
    assert_eq!(found.get(&RecordKind::ReplayCapsule).map(Vec::len), Some(1));
    assert!(
        found
            .values()
            .flatten()
            .all(|stored| stored.record.decision_id == "dec-a")
    );

    let missing = DecisionLedger::new(temp_ledger_dir(), None)
        .find_by_decision_id("dec-a")
        .expect("missing dir is empty");
    assert!(missing.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn given_malformed_barcode_when_reading_then_it_is_rejected() {
    let ledger = DecisionLedger::new(temp_ledger_dir(), None);
    let err = ledger
        .read(RecordKind::WhyTrace, "../etc/passwd")
        .expect_err("path-like barcode must fail");
    assert!(matches!(err, LedgerError::InvalidBarcode(_)));
    assert!(
        ledger
            .read(RecordKind::WhyTrace, "abc123")
            .expect("absent record is not an error")
            .is_none()
    );
}

#[test]
fn given_truncated_record_file_when_rewritten_then_record_reads_back() {
    let dir = temp_ledger_dir();
    let ledger = DecisionLedger::new(&dir, None);
    let original = record(RecordKind::WhyTrace, "dec-4");
    let serialized = DecisionLedger::serialize(&original).expect("record serializes");
    let barcode = ledger.digest(&serialized);
    let path = dir.join(format!("why_trace-{barcode}.jsonl"));

    fs::create_dir_all(&dir).expect("ledger dir is created");
    fs::write(&path, "").expect("empty record file is created");
    assert!(ledger.read(RecordKind::WhyTrace, &barcode).is_err());

    assert_eq!(ledger.write(&original).expect("write repairs the file"), barcode);
    let stored = ledger
        .read(RecordKind::WhyTrace, &barcode)
        .expect("read should succeed")
        .expect("record should exist");
    assert_eq!(stored.record, original);
    assert_eq!(fs::read_dir(&dir).expect("ledger dir exists").count(), 1);

    fs::write(&path, &serialized[..serialized.len() / 2]).expect("partial record is written");
    ledger.write(&original).expect("write repairs a partial file");
    assert!(ledger.read(RecordKind::WhyTrace, &barcode).expect("read").is_some());

    let _ = fs::remove_dir_all(&dir);
}
