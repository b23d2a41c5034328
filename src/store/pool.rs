//! Coordinator pool
//!
//! Tracks every live coordinator without keeping any alive:
//! - shared coordinators are keyed by [`StoreLocation`]; environments asking
//!   for the same location receive the same coordinator while it lives
//! - private coordinators are only remembered by path, so that no two live
//!   coordinators ever own the same file
//!
//! A shared coordinator always owns its location's path, `root/database`.
//! That path is reserved for it: private coordinators are placed at
//! `stem-N.ext` with the smallest `N >= 1` no live coordinator holds, so a
//! private environment can never displace the shared store.
//!
//! Creation runs while the pool mutex is held: racing environments never open
//! the same shared location twice, and the creation closure must not re-enter
//! the pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::coordinator::{StoreCoordinator, StoreLocation};

#[derive(Default)]
struct PoolState {
    shared: HashMap<StoreLocation, Weak<dyn StoreCoordinator>>,
    private: Vec<(PathBuf, Weak<dyn StoreCoordinator>)>,
}

impl PoolState {
    fn prune(&mut self) {
        self.shared.retain(|_, weak| weak.strong_count() > 0);
        self.private.retain(|(_, weak)| weak.strong_count() > 0);
    }

    fn is_held(&self, path: &Path) -> bool {
        self.shared
            .values()
            .filter_map(Weak::upgrade)
            .any(|c| c.path() == path)
            || self
                .private
                .iter()
                .any(|(held, weak)| held == path && weak.strong_count() > 0)
    }

    fn free_private_path(&self, base: &Path) -> PathBuf {
        let parent = base.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = base.extension().map(|e| e.to_string_lossy().into_owned());

        let mut n = 1u32;
        loop {
            let name = match &extension {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            };
            let candidate = parent.join(name);
            if !self.is_held(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Outcome of a shared lookup
pub struct SharedCoordinator {
    /// The pooled coordinator
    pub coordinator: Arc<dyn StoreCoordinator>,
    /// Whether an existing live coordinator was reused
    pub reused: bool,
}

/// Registry of live coordinators, shared and private.
#[derive(Default)]
pub struct CoordinatorPool {
    state: Mutex<PoolState>,
}

impl CoordinatorPool {
    /// Creates an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live shared coordinator for `location`, or creates one with
    /// `create`, which receives the path to open.
    pub fn fetch_or_create_shared<E, F>(
        &self,
        location: &StoreLocation,
        create: F,
    ) -> Result<SharedCoordinator, E>
    where
        F: FnOnce(&Path) -> Result<Arc<dyn StoreCoordinator>, E>,
    {
        let mut state = self.state.lock();
        state.prune();

        if let Some(existing) = state.shared.get(location).and_then(Weak::upgrade) {
            return Ok(SharedCoordinator {
                coordinator: existing,
                reused: true,
            });
        }

        let coordinator = create(&location.path())?;
        state
            .shared
            .insert(location.clone(), Arc::downgrade(&coordinator));

        Ok(SharedCoordinator {
            coordinator,
            reused: false,
        })
    }

    /// Creates a coordinator owned by a single environment. The path handed to
    /// `create` is never the location's own path and never held by another
    /// live coordinator.
    pub fn create_private<E, F>(
        &self,
        location: &StoreLocation,
        create: F,
    ) -> Result<Arc<dyn StoreCoordinator>, E>
    where
        F: FnOnce(&Path) -> Result<Arc<dyn StoreCoordinator>, E>,
    {
        let mut state = self.state.lock();
        state.prune();

        let path = state.free_private_path(&location.path());
        let coordinator = create(&path)?;
        state.private.push((path, Arc::downgrade(&coordinator)));
        Ok(coordinator)
    }

    /// Whether a live coordinator owns `path`
    pub fn is_held(&self, path: &Path) -> bool {
        self.state.lock().is_held(path)
    }

    /// Number of live shared coordinators
    pub fn shared_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.shared.len()
    }

    /// Number of live coordinators, shared and private
    pub fn live_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune();
        state.shared.len() + state.private.len()
    }
}

impl std::fmt::Debug for CoordinatorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorPool")
            .field("live", &self.live_count())
            .finish()
    }
}
