use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::ZlibDecoder;
use statuslist::format::StatusListClaims;
use statuslist::infosec::jose::jws;
use statuslist::infosec::KeyStore;
use statuslist::{
    Allocation, Allocator, BitstringList, Config, ListConfig, ListKind, PassReport, Registry,
    Renewal, Scope,
};
use test_utils::keystore::TestKeyStore;
use test_utils::TestDir;
use tokio::sync::broadcast;

type TestRegistry = Registry<BitstringList, TestKeyStore>;

struct Fixture {
    dir: TestDir,
    keys: TestKeyStore,
    registry: Arc<TestRegistry>,
    renewal: Arc<Renewal<BitstringList, TestKeyStore>>,
}

impl Fixture {
    fn new() -> Self {
        test_utils::init_tracer();
        let dir = TestDir::new();
        let keys = TestKeyStore::new();
        let mut config = Config::new("https://status.example.com/", dir.lists(), dir.backups())
            .expect("should create config");
        config.list = ListConfig {
            capacity: 16,
            allocation: Allocation::Sequential,
        };
        let registry = Arc::new(Registry::new(&config, keys.clone()));
        let renewal = Arc::new(Renewal::new(Arc::clone(&registry), &config));
        Self {
            dir,
            keys,
            registry,
            renewal,
        }
    }

    fn generation_dir(&self, kind: ListKind, scope: &Scope, id: &str) -> std::path::PathBuf {
        self.registry.store().generation_dir(kind, scope, id)
    }
}

fn scope(country: &str) -> Scope {
    Scope::new(country, "org.iso.18013.5.1.mDL").expect("should create scope")
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("should parse date")
}

fn now() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2024-06-01 12:00:00", "%Y-%m-%d %H:%M:%S")
        .expect("should parse time")
}

// A generation expiring today is renewed, and retired the day after.
#[test]
fn expiry_day() {
    let fixture = Fixture::new();
    let pt = scope("PT");
    fixture.registry.allocate(&pt, now().date()).expect("should allocate");
    let generation = fixture.registry.current(&pt).expect("should have generation");

    let report = fixture.renewal.run_pass(now());
    assert_eq!((report.renewed, report.retired), (2, 0));
    assert_eq!(fixture.registry.current(&pt), Some(generation));

    let report = fixture.renewal.run_pass(now() + chrono::Duration::days(1));
    assert_eq!((report.renewed, report.retired), (0, 2));
    assert!(fixture.registry.current(&pt).is_none());
}

// Expired generations are removed; the rest are re-signed and backed up.
#[test]
fn retire_and_renew() {
    let fixture = Fixture::new();
    let expired = scope("PT");
    let active = scope("ES");

    fixture.registry.allocate(&expired, date("2000-01-01")).expect("should allocate");
    let expired_id = fixture.registry.current(&expired).expect("should have generation");
    fixture.registry.allocate(&active, date("2999-01-01")).expect("should allocate");
    let active_id = fixture.registry.current(&active).expect("should have generation");

    let kind = ListKind::TokenStatusList;
    let active_dir = fixture.generation_dir(kind, &active, &active_id);
    let json_before = fs::read(active_dir.join("full_list.json")).expect("should read");
    let jwt_before = fs::read(active_dir.join(kind.jwt_file())).expect("should read");

    let report = fixture.renewal.run_pass(now());
    assert_eq!(
        report,
        PassReport {
            renewed: 2,
            retired: 2,
            skipped: 0,
            failed: 0,
        }
    );

    for kind in ListKind::ALL {
        assert!(!fixture.generation_dir(kind, &expired, &expired_id).exists());
        assert!(fixture.generation_dir(kind, &active, &active_id).join(kind.cwt_file()).exists());
    }
    assert!(fixture.registry.current(&expired).is_none());
    assert_eq!(fixture.registry.current(&active), Some(active_id.clone()));

    assert_eq!(fs::read(active_dir.join("full_list.json")).expect("should read"), json_before);

    let backup = fixture
        .dir
        .backups()
        .join("2024-06-01_12-00-00")
        .join("token_status_list")
        .join("ES")
        .join("org.iso.18013.5.1.mDL")
        .join(&active_id);
    assert_eq!(fs::read(backup.join(kind.jwt_file())).expect("should read"), jwt_before);
    assert!(backup.join(kind.cwt_file()).exists());
    assert!(backup.join("full_list.json").exists());

    let token = fs::read_to_string(active_dir.join(kind.jwt_file())).expect("should read");
    let keyring = fixture.keys.lookup("ES").expect("should find key");
    jws::decode::<StatusListClaims>(&token, &keyring.verifying_key()).expect("should verify");
}

// A retired scope starts a fresh generation on its next allocation.
#[test]
fn allocate_after_retirement() {
    let fixture = Fixture::new();
    let pt = scope("PT");

    fixture.registry.allocate(&pt, date("2000-01-01")).expect("should allocate");
    let retired = fixture.registry.current(&pt).expect("should have generation");
    fixture.renewal.run_pass(now());

    assert_eq!(fixture.registry.allocate(&pt, date("2030-01-01")).expect("allocate"), 0);
    assert_ne!(fixture.registry.current(&pt), Some(retired));
}

// Revocations saved since the last signing are published by the pass.
#[test]
fn publishes_revocations() {
    let fixture = Fixture::new();
    let pt = scope("PT");

    for _ in 0..4 {
        fixture.registry.allocate(&pt, date("2030-01-01")).expect("should allocate");
    }
    let current = fixture.registry.current(&pt).expect("should have generation");
    fixture.registry.revoke(&pt, &current, 2).expect("should revoke");

    fixture.renewal.run_pass(now());

    let kind = ListKind::TokenStatusList;
    let path = fixture.generation_dir(kind, &pt, &current).join(kind.jwt_file());
    let token = fs::read_to_string(path).expect("should read");
    let keyring = fixture.keys.lookup("PT").expect("should find key");
    let jwt = jws::decode::<StatusListClaims>(&token, &keyring.verifying_key())
        .expect("should verify");

    let compressed = Base64UrlUnpadded::decode_vec(&jwt.claims.status_list.lst).expect("decode");
    let mut bits = Vec::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut bits).expect("should inflate");
    assert_eq!(bits, vec![0b0000_0100, 0]);
}

// Snapshots without URIs are skipped, unreadable ones counted as failures,
// and neither stops the pass.
#[test]
fn skip_and_fail() {
    let fixture = Fixture::new();
    let pt = scope("PT");
    fixture.registry.allocate(&pt, date("2030-01-01")).expect("should allocate");

    let legacy = fixture.dir.lists().join("token_status_list/XX/mDL/legacy");
    fs::create_dir_all(&legacy).expect("should create dir");
    let dump = BitstringList::new(&ListConfig::default()).dump().expect("should dump");
    let snapshot = serde_json::json!({
        "token_status_list": dump,
        "identifier_list": {},
        "expires": "2000-01-01",
        "rand": "legacy",
        "country": "XX",
        "doctype": "mDL"
    });
    fs::write(legacy.join("full_list.json"), snapshot.to_string()).expect("should write");

    let bad = fixture.dir.lists().join("identifier_list/XX/mDL/bad");
    fs::create_dir_all(&bad).expect("should create dir");
    fs::write(bad.join("full_list.json"), "not json").expect("should write");

    let report = fixture.renewal.run_pass(now());
    assert_eq!(report.renewed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);
    assert!(legacy.exists());
}

#[test]
fn empty_tree() {
    let fixture = Fixture::new();
    assert_eq!(fixture.renewal.run_pass(now()), PassReport::default());
}

#[tokio::test]
async fn shutdown() {
    let fixture = Fixture::new();
    let (tx, rx) = broadcast::channel(1);

    let handle = tokio::spawn(Arc::clone(&fixture.renewal).run(rx));
    tx.send(()).expect("should send");

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("should stop")
        .expect("should join");
}
