//! Dependency tracking scopes
//!
//! A view function receives a [`Watch`] for the duration of one full
//! rebuild. Reads through [`Watch::get`] are recorded in every scope that is
//! currently open, so a later render of the same view only has to refresh
//! the scopes whose observed keys were hit.

use rustc_hash::FxHashSet;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::hot::{HotStore, STATE_KEY};
use crate::ident::Ident;
use crate::runtime::ModelId;

new_key_type! {
    /// Identifier of a recorded tracking scope
    pub struct ScopeId;
}

/// Scopes recorded by the last full rebuild of a model
#[derive(Debug, Default)]
pub(crate) struct ScopeSet {
    scopes: SlotMap<ScopeId, FxHashSet<String>>,
}

impl ScopeSet {
    fn open(&mut self) -> ScopeId {
        self.scopes.insert(FxHashSet::default())
    }

    fn observe(&mut self, scope: ScopeId, key: &str) {
        if let Some(keys) = self.scopes.get_mut(scope) {
            if !keys.contains(key) {
                keys.insert(key.to_string());
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.scopes.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Scopes that observed at least one of `hits`
    pub(crate) fn intersecting<'a>(
        &'a self,
        hits: &'a FxHashSet<String>,
    ) -> impl Iterator<Item = (ScopeId, &'a FxHashSet<String>)> + 'a {
        self.scopes
            .iter()
            .filter(move |(_, keys)| !keys.is_disjoint(hits))
    }
}

/// Tracking read context handed to view functions
pub struct Watch<'a> {
    model: ModelId,
    state: Ident,
    hot: &'a HotStore,
    scopes: &'a mut ScopeSet,
    open: SmallVec<[ScopeId; 4]>,
}

impl<'a> Watch<'a> {
    pub(crate) fn new(
        model: ModelId,
        state: Ident,
        hot: &'a HotStore,
        scopes: &'a mut ScopeSet,
    ) -> Self {
        Self {
            model,
            state,
            hot,
            scopes,
            open: SmallVec::new(),
        }
    }

    /// Model being rendered
    pub fn model(&self) -> ModelId {
        self.model
    }

    /// State the model was in when the render started
    ///
    /// Tracked like a read of [`STATE_KEY`], so scopes that show the state
    /// are refreshed when it changes.
    pub fn state(&mut self) -> Ident {
        self.observe(STATE_KEY);
        self.state
    }

    /// Tracked read: every open scope records `key`
    pub fn get(&mut self, key: &str) -> Option<&'a Value> {
        self.observe(key);
        self.hot.get(key)
    }

    fn observe(&mut self, key: &str) {
        for &scope in &self.open {
            self.scopes.observe(scope, key);
        }
    }

    /// Read without recording a dependency
    pub fn peek(&self, key: &str) -> Option<&'a Value> {
        self.hot.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.hot.has(key)
    }

    /// Run `f` inside a new tracking scope
    ///
    /// The scope stays open (and nested scopes see it too) until `f`
    /// returns or unwinds. Its observed keys are kept until the next full
    /// rebuild.
    pub fn scope<T>(&mut self, f: impl FnOnce(&mut Watch<'a>) -> T) -> (ScopeId, T) {
        let id = self.scopes.open();
        let depth = self.open.len();
        self.open.push(id);

        let mut guard = OpenScope { watch: self, depth };
        let out = f(&mut *guard.watch);
        drop(guard);
        (id, out)
    }

    /// Number of scopes currently open
    pub fn depth(&self) -> usize {
        self.open.len()
    }
}

/// Closes a scope on drop, including when the view unwinds
struct OpenScope<'w, 'a> {
    watch: &'w mut Watch<'a>,
    depth: usize,
}

impl Drop for OpenScope<'_, '_> {
    fn drop(&mut self) {
        self.watch.open.truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Samcas;
    use serde_json::json;

    fn store() -> HotStore {
        let mut hot = HotStore::new();
        hot.set("x", json!(1));
        hot.set("y", json!(2));
        hot.clear_hits();
        hot
    }

    #[test]
    fn test_reads_outside_scopes_are_untracked() {
        let hot = store();
        let mut scopes = ScopeSet::default();
        let mut watch = Watch::new(ModelId::default(), Samcas::Virgin.into(), &hot, &mut scopes);

        assert_eq!(watch.get("x"), Some(&json!(1)));
        assert_eq!(watch.depth(), 0);
        drop(watch);
        assert_eq!(scopes.len(), 0);
    }

    #[test]
    fn test_nested_scopes_record_into_every_open_scope() {
        let hot = store();
        let mut scopes = ScopeSet::default();
        let mut watch = Watch::new(ModelId::default(), Samcas::Virgin.into(), &hot, &mut scopes);

        let (outer, inner) = watch.scope(|w| {
            w.get("x");
            let (inner, _) = w.scope(|w| {
                assert_eq!(w.depth(), 2);
                w.get("y")
            });
            inner
        });
        assert_eq!(watch.depth(), 0);
        drop(watch);

        let mut hits = FxHashSet::default();
        hits.insert("y".to_string());
        let touched: Vec<ScopeId> = scopes.intersecting(&hits).map(|(id, _)| id).collect();
        assert_eq!(touched.len(), 2);
        assert!(touched.contains(&outer));
        assert!(touched.contains(&inner));

        hits.clear();
        hits.insert("x".to_string());
        let touched: Vec<ScopeId> = scopes.intersecting(&hits).map(|(id, _)| id).collect();
        assert_eq!(touched, vec![outer]);
    }

    #[test]
    fn test_peek_does_not_record() {
        let hot = store();
        let mut scopes = ScopeSet::default();
        let mut watch = Watch::new(ModelId::default(), Samcas::Virgin.into(), &hot, &mut scopes);

        watch.scope(|w| w.peek("x").cloned());
        drop(watch);

        let mut hits = FxHashSet::default();
        hits.insert("x".to_string());
        assert_eq!(scopes.intersecting(&hits).count(), 0);
        assert_eq!(scopes.len(), 1);
    }

    #[test]
    fn test_scope_closes_when_view_unwinds() {
        let hot = store();
        let mut scopes = ScopeSet::default();
        let mut watch = Watch::new(ModelId::default(), Samcas::Virgin.into(), &hot, &mut scopes);

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            watch.scope(|w| {
                w.get("x");
                panic!("view failed");
            })
        }));
        assert!(unwound.is_err());
        assert_eq!(watch.depth(), 0);

        // Top-level read after the unwind lands in no scope
        watch.get("y");
        drop(watch);

        let mut hits = FxHashSet::default();
        hits.insert("y".to_string());
        assert_eq!(scopes.intersecting(&hits).count(), 0);
        hits.insert("x".to_string());
        assert_eq!(scopes.intersecting(&hits).count(), 1);
    }

    #[test]
    fn test_state_is_tracked_inside_scopes() {
        let hot = store();
        let mut scopes = ScopeSet::default();
        let mut watch = Watch::new(ModelId::default(), Samcas::Virgin.into(), &hot, &mut scopes);

        assert_eq!(watch.state(), Ident::from(Samcas::Virgin));
        let (scope, state) = watch.scope(|w| w.state());
        assert_eq!(state, Ident::from(Samcas::Virgin));
        drop(watch);

        let mut hits = FxHashSet::default();
        hits.insert(STATE_KEY.to_string());
        let touched: Vec<ScopeId> = scopes.intersecting(&hits).map(|(id, _)| id).collect();
        assert_eq!(touched, vec![scope]);
    }
}
