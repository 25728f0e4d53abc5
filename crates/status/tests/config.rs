use std::fs;

use chrono::NaiveDate;
use serde_json::json;
use statuslist::format::IdentifierListClaims;
use statuslist::infosec::jose::jws;
use statuslist::infosec::{certificate_key, FileKeyStore};
use statuslist::infosec::KeyError;
use statuslist::{
    Allocation, BitstringList, Config, Error, ListConfig, ListKind, Registry, Scope,
};
use test_utils::keystore::{write_country_keys, write_encrypted_country_keys};
use test_utils::TestDir;

// A configuration file drives a registry that signs with keys read from
// disk.
#[test]
fn from_file() {
    test_utils::init_tracer();
    let dir = TestDir::new();
    let keys = write_country_keys(dir.path(), "PT");

    let path = dir.path().join("config.json");
    let contents = json!({
        "service_url": "https://status.example.com",
        "status_list_dir": dir.lists(),
        "backup_dir": dir.backups(),
        "list": {"capacity": 8, "allocation": "sequential"},
        "renewal": {"at": ["00:00:00", "12:00:00"]},
        "countries": {"PT": keys}
    });
    fs::write(&path, contents.to_string()).expect("should write config");

    let config = Config::from_file(&path).expect("should load config");
    assert_eq!(config.service_url.as_str(), "https://status.example.com/");

    let registry =
        Registry::<BitstringList, _>::new(&config, FileKeyStore::new(config.countries.clone()));
    let scope = Scope::new("PT", "eu.europa.ec.eudi.pid.1").expect("should create scope");
    let expires = NaiveDate::from_ymd_opt(2030, 1, 1).expect("should create date");
    let info = registry.describe(&scope, expires).expect("should describe");

    let current = registry.current(&scope).expect("should have generation");
    let kind = ListKind::IdentifierList;
    let token = fs::read_to_string(
        registry.store().generation_dir(kind, &scope, &current).join(kind.jwt_file()),
    )
    .expect("should read token");

    let der = fs::read(&config.countries["PT"].certificate).expect("should read certificate");
    let verifying_key = certificate_key(&der).expect("should read key");
    let jwt = jws::decode::<IdentifierListClaims>(&token, &verifying_key).expect("should verify");
    assert_eq!(jwt.claims.sub, info.identifier_list.uri);
    assert_eq!(jwt.claims.identifier_list.get("0"), Some(&0));
}

#[test]
fn missing_country_key() {
    test_utils::init_tracer();
    let dir = TestDir::new();
    let config = Config::new("https://status.example.com", dir.lists(), dir.backups())
        .expect("should create config");
    let registry = Registry::<BitstringList, _>::new(&config, FileKeyStore::default());
    let scope = Scope::new("PT", "mDL").expect("should create scope");
    let expires = NaiveDate::from_ymd_opt(2030, 1, 1).expect("should create date");

    let err = registry.allocate(&scope, expires).expect_err("should fail");
    assert!(matches!(err, Error::KeyStore(_)));
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).expect("should create date")
}

// An encrypted key signs with the configured password and fails with any
// other.
#[test]
fn key_password() {
    test_utils::init_tracer();
    let dir = TestDir::new();
    let mut config = Config::new("https://status.example.com", dir.lists(), dir.backups())
        .expect("should create config");
    let keys = write_encrypted_country_keys(dir.path(), "PT", "s3cret");
    config.countries.insert("PT".to_string(), keys.clone());

    let registry =
        Registry::<BitstringList, _>::new(&config, FileKeyStore::new(config.countries.clone()));
    let pid = Scope::new("PT", "eu.europa.ec.eudi.pid.1").expect("should create scope");
    registry.allocate(&pid, date()).expect("should sign with the right password");

    let mut wrong = keys;
    wrong.password = Some("guess".to_string());
    config.countries.insert("PT".to_string(), wrong);
    let registry =
        Registry::<BitstringList, _>::new(&config, FileKeyStore::new(config.countries.clone()));

    let err = registry.allocate(&pid, date()).expect_err("should fail");
    assert!(matches!(err, Error::KeyStore(KeyError::InvalidKey { .. })), "{err}");
}

// An index whose generation could not be published is not listed once
// publishing recovers.
#[test]
fn failed_publish() {
    test_utils::init_tracer();
    let dir = TestDir::new();
    let mut config = Config::new("https://status.example.com", dir.lists(), dir.backups())
        .expect("should create config");
    config.list = ListConfig {
        capacity: 8,
        allocation: Allocation::Sequential,
    };
    let keys = write_country_keys(dir.path(), "PT");
    config.countries.insert("PT".to_string(), keys.clone());

    let certificate = fs::read(&keys.certificate).expect("should read certificate");
    fs::remove_file(&keys.certificate).expect("should remove certificate");

    let registry =
        Registry::<BitstringList, _>::new(&config, FileKeyStore::new(config.countries.clone()));
    let mdl = Scope::new("PT", "org.iso.18013.5.1.mDL").expect("should create scope");
    let err = registry.allocate(&mdl, date()).expect_err("should fail");
    assert!(matches!(err, Error::KeyStore(KeyError::Read { .. })), "{err}");

    fs::write(&keys.certificate, certificate).expect("should restore certificate");
    let info = registry.describe(&mdl, date()).expect("should describe");
    assert_eq!(info.status_list.idx, 1);

    let (_, generation) = registry
        .store()
        .load::<BitstringList>(&info.identifier_list.uri)
        .expect("should load");
    assert_eq!(generation.identifier_list.keys().collect::<Vec<_>>(), vec!["1"]);
}

#[test]
fn missing_file() {
    let dir = TestDir::new();
    let err = Config::from_file(dir.path().join("absent.json")).expect_err("should fail");
    assert!(matches!(err, Error::Io { .. }));
}
