//! View table and host boundary
//!
//! Views are plain functions from a tracking [`Watch`] to whatever the
//! rendering layer consumes. The engine never inspects the output; it hands
//! it to the [`Host`] on full rebuilds and asks the host to refresh
//! individual scopes on incremental updates.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::DefinitionError;
use crate::ident::{Category, Ident, Samcas};
use crate::runtime::ModelId;
use crate::watch::{ScopeId, Watch};

/// Render-producing function
pub type ViewFn<R> = Arc<dyn Fn(&mut Watch<'_>) -> R + Send + Sync>;

/// Sentinel name of the fallback view
pub const DEFAULT_RENDER: &str = "default render";

/// Key of a view table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    State(Ident),
    Default,
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::State(id) => id.fmt(f),
            ViewKey::Default => f.write_str(DEFAULT_RENDER),
        }
    }
}

/// What the host is asked to show for a model
#[derive(Debug, Clone, PartialEq)]
pub enum Rendering<R> {
    /// Output of the resolved view function
    View(R),
    /// The model is broken; show the reason instead of content
    Broken { why: String },
    /// No view for the state and no default view
    NoView { state: Ident },
}

/// Rendering layer collaborator
pub trait Host<R> {
    /// Replace everything shown for `model`
    fn inject(&mut self, model: ModelId, rendering: Rendering<R>);

    /// Re-run the part of `model`'s view covered by `scope`
    fn refresh(&mut self, _model: ModelId, _scope: ScopeId, _observed: &FxHashSet<String>) {}
}

/// Host that discards every rendering
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl<R> Host<R> for NullHost {
    fn inject(&mut self, _model: ModelId, _rendering: Rendering<R>) {}
}

/// Outcome of view resolution for a model's current state
pub(crate) enum Resolved<R> {
    View(ViewFn<R>),
    Broken,
    Missing,
}

/// Views for one companion domain
pub struct ViewTable<R> {
    domain: &'static str,
    views: FxHashMap<ViewKey, ViewFn<R>>,
}

impl<R: 'static> ViewTable<R> {
    pub(crate) fn new(domain: &'static str) -> Self {
        Self {
            domain,
            views: FxHashMap::default(),
        }
    }

    /// Register the view for a state
    pub fn add_view<F>(&mut self, state: impl Into<Ident>, view: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut Watch<'_>) -> R + Send + Sync + 'static,
    {
        let state = state.into();
        if state.domain() != self.domain {
            return Err(DefinitionError::ForeignIdent {
                ident: state,
                expected: self.domain,
            });
        }
        if state.category() != Category::State {
            return Err(DefinitionError::WrongCategory {
                ident: state,
                expected: Category::State,
            });
        }
        self.insert(ViewKey::State(state), Arc::new(view))
    }

    /// Register the fallback view used for states without their own
    pub fn add_default_view<F>(&mut self, view: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut Watch<'_>) -> R + Send + Sync + 'static,
    {
        self.insert(ViewKey::Default, Arc::new(view))
    }

    fn insert(&mut self, key: ViewKey, view: ViewFn<R>) -> Result<(), DefinitionError> {
        if self.views.contains_key(&key) {
            return Err(DefinitionError::Duplicate {
                table: "view table",
                ident: key.to_string(),
            });
        }
        self.views.insert(key, view);
        Ok(())
    }
}

impl<R> ViewTable<R> {
    pub fn contains(&self, key: ViewKey) -> bool {
        self.views.contains_key(&key)
    }

    pub fn has_default(&self) -> bool {
        self.contains(ViewKey::Default)
    }

    /// Whether `state` has its own view or can fall back to the default
    pub fn covers(&self, state: Ident) -> bool {
        self.contains(ViewKey::State(state)) || self.has_default()
    }

    pub(crate) fn resolve(&self, state: Ident) -> Resolved<R> {
        if state == Ident::from(Samcas::Broken) {
            return Resolved::Broken;
        }
        self.views
            .get(&ViewKey::State(state))
            .or_else(|| self.views.get(&ViewKey::Default))
            .map(|view| Resolved::View(Arc::clone(view)))
            .unwrap_or(Resolved::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion;
    use crate::ident::Companion;

    companion! {
        enum Tab {
            states { Home, Settings, About }
            actions { Open }
            signals {}
        }
    }

    fn is_view<R>(resolved: &Resolved<R>, expected: &ViewFn<R>) -> bool {
        matches!(resolved, Resolved::View(view) if Arc::ptr_eq(view, expected))
    }

    #[test]
    fn test_resolution_order() {
        let mut table = ViewTable::<&'static str>::new(Tab::DOMAIN);
        table.add_view(Tab::Home, |_| "home").unwrap();

        assert!(matches!(table.resolve(Tab::Settings.into()), Resolved::Missing));
        assert!(matches!(table.resolve(Samcas::Broken.into()), Resolved::Broken));
        assert!(!table.covers(Tab::Settings.into()));

        table.add_default_view(|_| "default").unwrap();
        let home = table.views[&ViewKey::State(Tab::Home.into())].clone();
        let default = table.views[&ViewKey::Default].clone();

        assert!(is_view(&table.resolve(Tab::Home.into()), &home));
        assert!(is_view(&table.resolve(Tab::About.into()), &default));
        assert!(table.covers(Tab::Settings.into()));
        // Broken wins over the default view
        assert!(matches!(table.resolve(Samcas::Broken.into()), Resolved::Broken));
    }

    #[test]
    fn test_resolution_returns_the_same_view_each_time() {
        let mut table = ViewTable::<u8>::new(Tab::DOMAIN);
        table.add_default_view(|_| 0).unwrap();

        let (Resolved::View(a), Resolved::View(b)) =
            (table.resolve(Tab::Home.into()), table.resolve(Tab::About.into()))
        else {
            panic!("default view should resolve");
        };
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_add_view_rejections() {
        let mut table = ViewTable::<()>::new(Tab::DOMAIN);
        table.add_view(Tab::Home, |_| ()).unwrap();
        table.add_default_view(|_| ()).unwrap();

        assert!(matches!(
            table.add_view(Tab::Home, |_| ()),
            Err(DefinitionError::Duplicate { .. })
        ));
        assert_eq!(
            table.add_default_view(|_| ()),
            Err(DefinitionError::Duplicate {
                table: "view table",
                ident: DEFAULT_RENDER.to_string(),
            })
        );
        assert!(matches!(
            table.add_view(Tab::Open, |_| ()),
            Err(DefinitionError::WrongCategory { .. })
        ));
        assert!(matches!(
            table.add_view(Samcas::Virgin, |_| ()),
            Err(DefinitionError::ForeignIdent { .. })
        ));
    }
}
