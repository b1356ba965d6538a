use crate::config::{RouteConfig, RouteUpdate};
use crate::routing::matcher::{method_matches, PathPattern};
use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};

/// A registered route with its compiled path pattern.
#[derive(Debug)]
struct RouteEntry {
    route: Arc<RouteConfig>,
    pattern: PathPattern,
}

impl RouteEntry {
    fn new(route: Arc<RouteConfig>) -> Self {
        let pattern = PathPattern::parse(&route.path);
        Self { route, pattern }
    }
}

/// Insertion-ordered set of routes.
///
/// Readers load an immutable snapshot through `ArcSwap` and never block.
/// Writers serialize on `write_mu`, copy the snapshot, and publish a new one.
pub struct RouteRegistry {
    entries: ArcSwap<Vec<Arc<RouteEntry>>>,
    write_mu: Mutex<()>,
}

/// Outcome of [`RouteRegistry::upsert`].
#[derive(Debug)]
pub enum Upserted {
    Inserted,
    Replaced(Arc<RouteConfig>),
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            write_mu: Mutex::new(()),
        }
    }
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First enabled route, in registration order, whose method and path match.
    pub fn resolve(&self, method: &str, path: &str) -> Option<Arc<RouteConfig>> {
        self.entries
            .load()
            .iter()
            .find(|e| {
                e.route.enabled
                    && method_matches(&e.route.method, method)
                    && e.pattern.matches(path)
            })
            .map(|e| e.route.clone())
    }

    pub fn get(&self, id: &str) -> Option<Arc<RouteConfig>> {
        self.entries
            .load()
            .iter()
            .find(|e| e.route.id == id)
            .map(|e| e.route.clone())
    }

    pub fn routes(&self) -> Vec<Arc<RouteConfig>> {
        self.entries.load().iter().map(|e| e.route.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a new route at the end, or replace an existing one in place.
    pub fn upsert(&self, route: RouteConfig) -> Upserted {
        let _guard = self.write_mu.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = (**self.entries.load()).clone();
        let entry = Arc::new(RouteEntry::new(Arc::new(route)));

        let result = match entries.iter_mut().find(|e| e.route.id == entry.route.id) {
            Some(existing) => {
                let previous = existing.route.clone();
                *existing = entry;
                Upserted::Replaced(previous)
            }
            None => {
                entries.push(entry);
                Upserted::Inserted
            }
        };
        self.entries.store(Arc::new(entries));
        result
    }

    /// Apply a partial update in place. `check` may veto the updated config.
    ///
    /// Returns `(previous, updated)` on success.
    pub fn update<F>(
        &self,
        id: &str,
        update: &RouteUpdate,
        check: F,
    ) -> Option<(Arc<RouteConfig>, Arc<RouteConfig>)>
    where
        F: FnOnce(&RouteConfig) -> bool,
    {
        let _guard = self.write_mu.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = (**self.entries.load()).clone();
        let existing = entries.iter_mut().find(|e| e.route.id == id)?;

        let next = update.apply(&existing.route);
        if !check(&next) {
            return None;
        }
        let previous = existing.route.clone();
        let next = Arc::new(next);
        *existing = Arc::new(RouteEntry::new(next.clone()));
        self.entries.store(Arc::new(entries));
        Some((previous, next))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<RouteConfig>> {
        let _guard = self.write_mu.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = (**self.entries.load()).clone();
        let idx = entries.iter().position(|e| e.route.id == id)?;
        let removed = entries.remove(idx);
        self.entries.store(Arc::new(entries));
        Some(removed.route.clone())
    }
}
