use chain_denamespace::schema::keys::{HASH_MARKERS, HEIGHT_MARKER};
use chain_denamespace::schema::{
    body_key, canonical_key, hash_to_number_key, header_key, legacy_canonical_key, receipts_key,
};
use chain_denamespace::{
    known_namespace, ContinuityOutcome, KvStore, MemoryStore, MigrationConfig, MigrationError,
    Migrator, Namespace, ParityStore, RecordType, WriteBatch,
};
use std::sync::Arc;

const NETWORK: u64 = 96369;

fn ns() -> Namespace {
    known_namespace(NETWORK).unwrap()
}

fn namespaced(suffix: u8, natural: &[u8]) -> Vec<u8> {
    let mut key = ns().as_bytes().to_vec();
    key.push(suffix);
    key.extend_from_slice(natural);
    key
}

fn block_hash(number: u64) -> [u8; 32] {
    let mut hash = [0xabu8; 32];
    hash[24..].copy_from_slice(&number.to_be_bytes());
    hash
}

/// Blocks `0..count` in the namespaced layout. Even blocks carry a normalized
/// canonical record, odd blocks the legacy suffixed form. Block `gap` has no
/// body.
fn chain_batch(count: u64, gap: Option<u64>) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for n in 0..count {
        let hash = block_hash(n);
        let num_hash = [&n.to_be_bytes()[..], &hash[..]].concat();

        batch.put(namespaced(0x68, &num_hash), format!("header {}", n).into_bytes());
        if gap != Some(n) {
            batch.put(namespaced(0x62, &num_hash), format!("body {}", n).into_bytes());
        }
        batch.put(namespaced(0x72, &num_hash), format!("receipts {}", n).into_bytes());
        batch.put(namespaced(0x48, &hash), n.to_be_bytes().to_vec());
        if n % 2 == 0 {
            batch.put(namespaced(0x6e, &n.to_be_bytes()), hash.to_vec());
        } else {
            let legacy = [&n.to_be_bytes()[..], &b"n"[..]].concat();
            batch.put(namespaced(0x68, &legacy), hash.to_vec());
        }
        batch.put(namespaced(0x26, &hash), b"account".to_vec());
    }
    batch.put(b"LastAccepted".to_vec(), block_hash(0).to_vec());
    batch
}

fn config(include_state: bool, window: Option<u64>) -> MigrationConfig {
    let mut config = MigrationConfig::for_network(NETWORK, "unused-src", "unused-dst").unwrap();
    config.include_state = include_state;
    config.integrity_window = window;
    config.batch_size = 16;
    config
}

fn memory_migrator(config: MigrationConfig, gap: Option<u64>) -> (Migrator, Arc<MemoryStore>) {
    let source = Arc::new(MemoryStore::new());
    source.commit(chain_batch(10, gap)).unwrap();
    let destination = Arc::new(MemoryStore::new());
    let migrator = Migrator::with_stores(config, source, destination.clone());
    (migrator, destination)
}

#[tokio::test]
async fn full_run_flattens_and_marks_tip() {
    let (migrator, destination) = memory_migrator(config(false, Some(4)), None);

    let report = migrator.run().await.unwrap();

    assert_eq!(report.transcode.count(RecordType::Header), 10);
    assert_eq!(report.transcode.count(RecordType::NumberToHash), 10);
    assert_eq!(report.transcode.skipped_excluded, 10);
    assert_eq!(report.transcode.skipped_unknown, 0);
    assert_eq!(report.rebuild.rebuilt, 5);
    assert_eq!(report.rebuild.already_normalized, 5);
    assert_eq!(report.rebuild.orphans, 0);

    for n in 0..10 {
        let hash = block_hash(n);
        assert_eq!(
            destination.get(&canonical_key(n)).unwrap(),
            Some(hash.to_vec())
        );
        assert_eq!(destination.get(&legacy_canonical_key(n)).unwrap(), None);
        assert!(destination.get(&header_key(n, &hash)).unwrap().is_some());
        assert_eq!(
            destination.get(&hash_to_number_key(&hash)).unwrap(),
            Some(n.to_be_bytes().to_vec())
        );
    }
    assert!(!destination.contains_prefix(b"evma").unwrap());

    let tip = report.continuity.tip().unwrap();
    assert_eq!(tip.number, 9);
    assert_eq!(
        destination.get(HEIGHT_MARKER).unwrap(),
        Some(9u64.to_be_bytes().to_vec())
    );
    for marker in HASH_MARKERS {
        assert_eq!(destination.get(marker).unwrap(), Some(block_hash(9).to_vec()));
    }

    let integrity = report.integrity.unwrap();
    assert_eq!((integrity.from, integrity.to), (5, 9));
    assert!(integrity.is_complete());
}

#[tokio::test]
async fn state_profile_and_integrity_gap() {
    let (migrator, destination) = memory_migrator(config(true, Some(100)), Some(3));

    let report = migrator.run().await.unwrap();

    assert_eq!(report.transcode.count(RecordType::Account), 10);
    assert!(destination.contains_prefix(b"evma").unwrap());

    let integrity = report.integrity.as_ref().unwrap();
    assert_eq!(integrity.from, 0);
    assert_eq!(integrity.missing_bodies, vec![3]);
    assert!(integrity.missing_headers.is_empty());
    assert!(integrity.missing_canonical.is_empty());

    let json = report.to_json_pretty().unwrap();
    assert!(json.contains("\"status\": \"tip\""));
}

#[tokio::test]
async fn chain_without_blocks_reports_empty() {
    let source = Arc::new(MemoryStore::new());
    source.insert(b"vm_state".to_vec(), b"s".to_vec());
    let destination = Arc::new(MemoryStore::new());
    let migrator = Migrator::with_stores(config(false, Some(10)), source, destination.clone());

    let report = migrator.run().await.unwrap();

    assert_eq!(report.continuity, ContinuityOutcome::EmptyChain);
    assert!(report.integrity.is_none());
    assert_eq!(destination.get(HEIGHT_MARKER).unwrap(), None);
}

#[tokio::test]
async fn rebuild_before_transcode_is_refused() {
    let (migrator, _) = memory_migrator(config(false, None), None);

    let err = migrator.rebuild_canonical().await.unwrap_err();
    assert!(matches!(err, MigrationError::InvariantViolation(_)));

    let err = migrator.scan_integrity(3, 1).await.unwrap_err();
    assert!(matches!(err, MigrationError::InvalidRange { from: 3, to: 1 }));
}

#[tokio::test]
async fn cancelled_before_start_commits_one_batch() {
    let (migrator, destination) = memory_migrator(config(false, None), None);
    migrator.cancel_flag().cancel();

    let err = migrator.transcode().await.unwrap_err();

    assert!(matches!(err, MigrationError::Cancelled { committed: 16 }));
    assert_eq!(destination.len(), 16);
}

#[tokio::test]
async fn cancelled_run_writes_no_markers() {
    let source = Arc::new(MemoryStore::new());
    source.insert(canonical_key(7), block_hash(7).to_vec());
    source.insert(header_key(7, &block_hash(7)), b"header 7".to_vec());
    let destination = Arc::new(MemoryStore::new());
    let migrator = Migrator::with_stores(config(false, Some(10)), source, destination.clone());
    migrator.cancel_flag().cancel();

    let err = migrator.run().await.unwrap_err();

    assert!(matches!(err, MigrationError::Cancelled { .. }));
    assert_eq!(destination.get(HEIGHT_MARKER).unwrap(), None);
}

#[tokio::test]
async fn cancelled_small_transcode_keeps_its_batch_and_stops() {
    let source = Arc::new(MemoryStore::new());
    source.insert(canonical_key(7), block_hash(7).to_vec());
    source.insert(header_key(7, &block_hash(7)), b"header 7".to_vec());
    let destination = Arc::new(MemoryStore::new());
    let migrator = Migrator::with_stores(config(false, None), source, destination.clone());
    migrator.cancel_flag().cancel();

    let err = migrator.transcode().await.unwrap_err();

    assert!(matches!(err, MigrationError::Cancelled { committed: 2 }));
    assert_eq!(destination.len(), 2);
    assert_eq!(destination.get(HEIGHT_MARKER).unwrap(), None);
}

#[tokio::test]
async fn parity_stores_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source");
    let destination_path = dir.path().join("destination");

    {
        let source = ParityStore::open(&source_path).unwrap();
        source.commit(chain_batch(6, None)).unwrap();
    }

    let mut config = config(false, Some(5));
    config.source_path = source_path;
    config.destination_path = destination_path;

    let migrator = Migrator::open(config).unwrap();
    let report = migrator.run().await.unwrap();

    assert_eq!(report.transcode.count(RecordType::Header), 6);
    assert_eq!(report.rebuild.rebuilt, 3);
    assert_eq!(report.continuity.tip().unwrap().number, 5);
    assert!(report.integrity.unwrap().is_complete());

    let destination = migrator.destination();
    let hash = block_hash(5);
    assert_eq!(
        destination.get(&body_key(5, &hash)).unwrap(),
        Some(b"body 5".to_vec())
    );
    assert_eq!(
        destination.get(&receipts_key(5, &hash)).unwrap(),
        Some(b"receipts 5".to_vec())
    );
    assert_eq!(destination.get(&legacy_canonical_key(1)).unwrap(), None);
}

#[test]
fn missing_source_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(false, None);
    config.source_path = dir.path().join("absent");
    config.destination_path = dir.path().join("destination");

    let err = Migrator::open(config).err().unwrap();
    assert!(matches!(err, MigrationError::OpenSource { .. }));
}
