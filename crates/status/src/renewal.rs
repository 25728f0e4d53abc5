//! # Renewal
//!
//! A recurring pass over the published tree. Generations whose `expires`
//! date has passed are deleted. Every other generation has its artifacts
//! backed up and re-signed, so the published lists always carry a recent
//! issued-at.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use statuslist_infosec::KeyStore;
use tokio::sync::broadcast;

use crate::allocator::Allocator;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Generation, ListKind, Scope};
use crate::registry::Registry;
use crate::store::{read_snapshot, SNAPSHOT_FILE};

/// Backup directory timestamp format.
pub const BACKUP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Counts of what a renewal pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Generation directories re-signed.
    pub renewed: usize,

    /// Generation directories deleted because they expired.
    pub retired: usize,

    /// Generation directories left alone because they have no published
    /// URIs.
    pub skipped: usize,

    /// Generation directories that could not be processed.
    pub failed: usize,
}

enum Outcome {
    Renewed,
    Retired,
    Skipped,
}

/// The renewal scheduler.
pub struct Renewal<A, K> {
    registry: Arc<Registry<A, K>>,
    backup_dir: PathBuf,
    at: Vec<NaiveTime>,
}

impl<A, K> Renewal<A, K>
where
    A: Allocator + 'static,
    K: KeyStore + 'static,
{
    /// Create a scheduler renewing the lists published by `registry`.
    pub fn new(registry: Arc<Registry<A, K>>, config: &Config) -> Self {
        Self {
            registry,
            backup_dir: config.backup_dir.clone(),
            at: config.renewal.at.clone(),
        }
    }

    /// Run passes at the configured times until `shutdown` fires. A pass
    /// that has started always completes.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let now = Local::now().naive_local();
            let next = next_run(now, &self.at);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next = %next, "next renewal pass");

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.recv() => {
                    tracing::info!("renewal stopped");
                    return;
                }
            }

            let renewal = Arc::clone(&self);
            let pass =
                tokio::task::spawn_blocking(move || renewal.run_pass(Local::now().naive_local()));
            match pass.await {
                Ok(report) => tracing::info!(?report, "renewal pass complete"),
                Err(e) => tracing::error!("renewal pass failed: {e}"),
            }
        }
    }

    /// Run a single pass as of `now`.
    pub fn run_pass(&self, now: NaiveDateTime) -> PassReport {
        let timestamp = now.format(BACKUP_FORMAT).to_string();
        let mut report = PassReport::default();
        let root = self.registry.store().root().to_path_buf();

        for kind in ListKind::ALL {
            let mut dirs = Vec::new();
            if let Err(e) = generation_dirs(&root.join(kind.dir()), &mut dirs) {
                tracing::error!("unable to walk {}: {e}", root.join(kind.dir()).display());
                report.failed += 1;
                continue;
            }

            for dir in dirs {
                match self.process(kind, &dir, &root, &timestamp, now) {
                    Ok(Outcome::Renewed) => report.renewed += 1,
                    Ok(Outcome::Retired) => report.retired += 1,
                    Ok(Outcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(path = %dir.display(), "renewal failed: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    fn process(
        &self, kind: ListKind, dir: &Path, root: &Path, timestamp: &str, now: NaiveDateTime,
    ) -> Result<Outcome> {
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let snapshot = read_snapshot(&snapshot_path)?;
        let scope = Scope::new(snapshot.country, snapshot.doctype)?;

        let slot = self.registry.slot(&scope);
        let mut guard = slot.lock();

        // re-read under the lock in case a revocation landed
        let snapshot = read_snapshot(&snapshot_path)?;
        if snapshot.status_list_uri.is_none() || snapshot.identifier_list_uri.is_none() {
            tracing::info!(path = %dir.display(), "no published uris, skipping");
            return Ok(Outcome::Skipped);
        }

        // a generation stays published for the whole of its expiry date
        if snapshot.expires.is_some_and(|expires| expires < now.date()) {
            fs::remove_dir_all(dir).map_err(Error::io(dir))?;
            if guard.as_ref().is_some_and(|g| g.generation_id == snapshot.generation_id) {
                *guard = None;
            }
            tracing::info!(
                country = scope.country(),
                doctype = scope.doctype(),
                generation = %snapshot.generation_id,
                path = %dir.display(),
                "retired expired generation"
            );
            return Ok(Outcome::Retired);
        }

        let relative = dir.strip_prefix(root).map_err(anyhow::Error::from)?;
        let backup = self.backup_dir.join(timestamp).join(relative);
        fs::create_dir_all(&backup).map_err(Error::io(&backup))?;
        for file in [kind.jwt_file(), kind.cwt_file(), SNAPSHOT_FILE] {
            let from = dir.join(file);
            if from.exists() {
                fs::copy(&from, backup.join(file)).map_err(Error::io(&from))?;
            }
        }

        let (scope, generation) = Generation::<A>::from_snapshot(snapshot)?;
        self.registry.store().sign(kind, &scope, &generation, dir)?;

        tracing::debug!(
            country = scope.country(),
            doctype = scope.doctype(),
            generation = %generation.generation_id,
            path = %dir.display(),
            "renewed"
        );
        Ok(Outcome::Renewed)
    }
}

/// The first configured time strictly after `now`, rolling over to the
/// next day. An empty schedule runs at midnight.
#[must_use]
pub fn next_run(now: NaiveDateTime, at: &[NaiveTime]) -> NaiveDateTime {
    let today = now.date();
    let later_today = at.iter().filter(|t| **t > now.time()).min();
    later_today.map_or_else(
        || {
            let first = at.iter().min().copied().unwrap_or(NaiveTime::MIN);
            (today + Duration::days(1)).and_time(first)
        },
        |t| today.and_time(*t),
    )
}

// Collect every directory under `dir` holding a snapshot file.
fn generation_dirs(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    if dir.join(SNAPSHOT_FILE).is_file() {
        found.push(dir.to_path_buf());
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            generation_dirs(&path, found)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rstest::rstest;

    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").expect("should parse")
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M:%S").expect("should parse")
    }

    #[rstest]
    #[case("2024-05-01 09:00:00", &["12:00:00"], "2024-05-01 12:00:00")]
    #[case("2024-05-01 12:00:00", &["12:00:00"], "2024-05-02 12:00:00")]
    #[case("2024-05-01 13:00:00", &["00:00:00", "12:00:00"], "2024-05-02 00:00:00")]
    #[case("2024-05-01 01:00:00", &["18:00:00", "06:00:00"], "2024-05-01 06:00:00")]
    #[case("2024-12-31 23:59:59", &["00:00:00"], "2025-01-01 00:00:00")]
    fn next_fire(#[case] now: &str, #[case] times: &[&str], #[case] expected: &str) {
        let times: Vec<NaiveTime> = times.iter().map(|t| time(t)).collect();
        assert_eq!(next_run(at(now), &times), at(expected));
    }

    #[test]
    fn empty_schedule() {
        let now = at("2024-05-01 10:00:00");
        let expected = NaiveDate::from_ymd_opt(2024, 5, 2).expect("date").and_time(NaiveTime::MIN);
        assert_eq!(next_run(now, &[]), expected);
    }
}
