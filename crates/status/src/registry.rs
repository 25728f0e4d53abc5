//! # List Registry
//!
//! The in-memory table of active generations, one per scope. Allocation,
//! rotation and revocation for a scope happen under that scope's lock, and
//! every change is written through to the [`Store`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use statuslist_infosec::KeyStore;

use crate::allocator::{Allocator, Take};
use crate::config::{Config, ListConfig};
use crate::error::{Error, Result};
use crate::model::{
    Generation, IdentifierListRef, Scope, StatusListInfo, StatusListRef, REVOKED, VALID,
};
use crate::store::Store;

/// A scope's active generation, if any.
pub type Slot<A> = Arc<Mutex<Option<Generation<A>>>>;

/// Active generations by scope.
pub struct Registry<A, K> {
    list: ListConfig,
    store: Store<K>,
    scopes: RwLock<HashMap<Scope, Slot<A>>>,
}

impl<A: Allocator, K: KeyStore> Registry<A, K> {
    /// Create an empty registry publishing through a [`Store`] built from
    /// `config`.
    pub fn new(config: &Config, keys: K) -> Self {
        Self {
            list: config.list.clone(),
            store: Store::new(config, keys),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &Store<K> {
        &self.store
    }

    /// The lock guarding `scope`'s generation. Anything that writes under
    /// the scope's directories must hold it.
    pub fn slot(&self, scope: &Scope) -> Slot<A> {
        if let Some(slot) = self.scopes.read().get(scope) {
            return Arc::clone(slot);
        }
        Arc::clone(self.scopes.write().entry(scope.clone()).or_default())
    }

    /// Identifier of the scope's active generation.
    pub fn current(&self, scope: &Scope) -> Option<String> {
        let slot = self.scopes.read().get(scope).cloned()?;
        let guard = slot.lock();
        guard.as_ref().map(|g| g.generation_id.clone())
    }

    /// Issue an index for a credential expiring on `expires`.
    ///
    /// Creates the scope's first generation if needed, and rotates to a new
    /// generation when the current one is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCapacity`] when lists are configured with no
    /// slots, or an error if the generation cannot be published.
    pub fn allocate(&self, scope: &Scope, expires: NaiveDate) -> Result<usize> {
        let slot = self.slot(scope);
        let mut guard = slot.lock();
        let (index, _) = self.allocate_locked(&mut guard, scope, expires)?;
        Ok(index)
    }

    /// Issue an index and return where its status is published.
    ///
    /// # Errors
    ///
    /// See [`Registry::allocate`].
    pub fn describe(&self, scope: &Scope, expires: NaiveDate) -> Result<StatusListInfo> {
        let slot = self.slot(scope);
        let mut guard = slot.lock();
        let (index, generation) = self.allocate_locked(&mut guard, scope, expires)?;

        let (Some(status_uri), Some(identifier_uri)) =
            (&generation.status_list_uri, &generation.identifier_list_uri)
        else {
            return Err(Error::InvalidUri(format!("{scope} has no published uri")));
        };

        Ok(StatusListInfo {
            status_list: StatusListRef {
                uri: status_uri.clone(),
                idx: index,
            },
            identifier_list: IdentifierListRef {
                uri: identifier_uri.clone(),
                id: index.to_string(),
            },
        })
    }

    /// Revoke `index` in the scope's current generation.
    ///
    /// The change is saved to the snapshots immediately and published by
    /// the next renewal pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleGeneration`] if `generation_id` is not the
    /// scope's current generation, or [`Error::UnknownIndex`] if the index
    /// was never issued.
    pub fn revoke(&self, scope: &Scope, generation_id: &str, index: usize) -> Result<()> {
        let slot = self.slot(scope);
        let mut guard = slot.lock();

        let Some(generation) = guard.as_mut().filter(|g| g.generation_id == generation_id) else {
            tracing::warn!(
                country = scope.country(),
                doctype = scope.doctype(),
                generation = generation_id,
                "revocation for stale generation"
            );
            return Err(Error::StaleGeneration {
                scope: scope.clone(),
                generation_id: generation_id.to_string(),
            });
        };

        let id = index.to_string();
        if !generation.identifier_list.contains_key(&id) {
            return Err(Error::UnknownIndex(index));
        }

        generation.status_list.set(index, true)?;
        generation.identifier_list.insert(id, REVOKED);
        generation.dirty = true;
        self.store.save_snapshot(generation, scope)?;

        tracing::info!(
            country = scope.country(),
            doctype = scope.doctype(),
            generation = generation_id,
            index,
            "revoked"
        );
        Ok(())
    }

    fn allocate_locked<'a>(
        &self, slot: &'a mut Option<Generation<A>>, scope: &Scope, expires: NaiveDate,
    ) -> Result<(usize, &'a Generation<A>)> {
        if self.list.capacity == 0 {
            return Err(Error::NoCapacity);
        }

        let generation = slot.get_or_insert_with(|| {
            tracing::info!(country = scope.country(), doctype = scope.doctype(), "new generation");
            Generation::new(&self.list)
        });

        let index = match generation.status_list.take() {
            Take::Index(index) => index,
            Take::Exhausted => {
                if generation.is_dirty() {
                    self.store.save(generation, scope)?;
                }
                let fresh = Generation::new(&self.list);
                tracing::info!(
                    country = scope.country(),
                    doctype = scope.doctype(),
                    from = %generation.generation_id,
                    to = %fresh.generation_id,
                    "list exhausted, rotating generation"
                );
                *generation = fresh;

                match generation.status_list.take() {
                    Take::Index(index) => index,
                    Take::Exhausted => return Err(Error::NoCapacity),
                }
            }
        };

        let id = index.to_string();
        let previous = generation.expires;
        generation.identifier_list.insert(id.clone(), VALID);
        generation.extend_expiry(expires);
        if let Err(e) = self.store.save(generation, scope) {
            // the index was never handed out, so it must not be published
            generation.identifier_list.remove(&id);
            generation.expires = previous;
            return Err(e);
        }

        tracing::debug!(
            country = scope.country(),
            doctype = scope.doctype(),
            generation = %generation.generation_id,
            index,
            expires = ?generation.expires,
            "allocated"
        );
        Ok((index, generation))
    }
}

#[cfg(test)]
mod tests {
    use test_utils::keystore::TestKeyStore;
    use test_utils::TestDir;

    use super::*;
    use crate::bitstring::BitstringList;
    use crate::config::Allocation;

    fn registry(dir: &TestDir, capacity: usize) -> Registry<BitstringList, TestKeyStore> {
        let mut config = Config::new("https://status.example.com", dir.lists(), dir.backups())
            .expect("should create config");
        config.list = ListConfig {
            capacity,
            allocation: Allocation::Sequential,
        };
        Registry::new(&config, TestKeyStore::new())
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("should parse")
    }

    #[test]
    fn lazily_creates() {
        let dir = TestDir::new();
        let registry = registry(&dir, 8);
        let scope = Scope::new("PT", "mDL").expect("scope");

        assert!(registry.current(&scope).is_none());
        assert_eq!(registry.allocate(&scope, date("2030-01-01")).expect("allocate"), 0);
        assert!(registry.current(&scope).is_some());
    }

    #[test]
    fn zero_capacity() {
        let dir = TestDir::new();
        let registry = registry(&dir, 0);
        let scope = Scope::new("PT", "mDL").expect("scope");

        let err = registry.allocate(&scope, date("2030-01-01")).expect_err("should fail");
        assert!(matches!(err, Error::NoCapacity));
        assert!(registry.current(&scope).is_none());
    }

    #[test]
    fn revoke_unknown_index() {
        let dir = TestDir::new();
        let registry = registry(&dir, 8);
        let scope = Scope::new("PT", "mDL").expect("scope");
        registry.allocate(&scope, date("2030-01-01")).expect("allocate");
        let current = registry.current(&scope).expect("current");

        let err = registry.revoke(&scope, &current, 5).expect_err("should fail");
        assert!(matches!(err, Error::UnknownIndex(5)));
    }

    #[test]
    fn revoke_marks_dirty() {
        let dir = TestDir::new();
        let registry = registry(&dir, 8);
        let scope = Scope::new("PT", "mDL").expect("scope");
        registry.allocate(&scope, date("2030-01-01")).expect("allocate");
        let current = registry.current(&scope).expect("current");

        registry.revoke(&scope, &current, 0).expect("should revoke");
        let slot = registry.slot(&scope);
        let guard = slot.lock();
        let generation = guard.as_ref().expect("generation");
        assert!(generation.is_dirty());
        assert!(generation.status_list.get(0).expect("get"));
    }
}
