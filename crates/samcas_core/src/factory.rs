//! Model factories
//!
//! A factory formats the action, transition and view tables for one
//! companion domain exactly once, then freezes them behind an `Arc`. Every
//! model it builds shares that table triple.
//!
//! ```rust
//! use samcas_core::{companion, Factory, ModelRuntime};
//!
//! companion! {
//!     pub enum Switch {
//!         states { Off, On }
//!         actions {}
//!         signals {}
//!     }
//! }
//!
//! let factory = Factory::new::<Switch>(|_, t, v| {
//!     t.add_state(Switch::Off)?.next([Switch::On]);
//!     t.add_state(Switch::On)?.next([Switch::Off]);
//!     v.add_default_view(|w| w.scope(|w| w.state().label().to_string()).1)?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let mut rt = ModelRuntime::headless();
//! let switch = factory.spawn(&mut rt, None).unwrap();
//! rt.flip_state(switch, Switch::On).unwrap();
//! assert!(rt.is_in(switch, Switch::On));
//! ```

use std::sync::Arc;

use crate::action::ActionTable;
use crate::error::{DefinitionError, Result};
use crate::ident::Companion;
use crate::proposal::Proposal;
use crate::runtime::{Ctx, ModelId, ModelRuntime, Rejector};
use crate::transition::TransitionTable;
use crate::view::ViewTable;

/// Frozen action/transition/view tables of one factory
pub struct Trifecta<R> {
    pub(crate) actions: ActionTable<R>,
    pub(crate) transitions: TransitionTable,
    pub(crate) views: ViewTable<R>,
    pub(crate) rejector: Option<Rejector<R>>,
    pub(crate) debug: bool,
}

impl<R> Trifecta<R> {
    pub fn actions(&self) -> &ActionTable<R> {
        &self.actions
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    pub fn views(&self) -> &ViewTable<R> {
        &self.views
    }

    pub fn has_rejector(&self) -> bool {
        self.rejector.is_some()
    }

    /// Default debug flag for proposals presented to this factory's models
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Configures a factory before its tables are formatted
pub struct FactoryBuilder<R> {
    rejector: Option<Rejector<R>>,
    debug: bool,
    empty: fn() -> Trifecta<R>,
}

impl<R: 'static> FactoryBuilder<R> {
    fn new<C: Companion>() -> Self {
        Self {
            rejector: None,
            debug: false,
            empty: empty_tables::<C, R>,
        }
    }

    /// Replace the default "go broken" reaction to rejected proposals
    pub fn rejector<F>(mut self, rejector: F) -> Self
    where
        F: Fn(&mut Ctx<'_, R>, &Proposal) + Send + Sync + 'static,
    {
        self.rejector = Some(Arc::new(rejector));
        self
    }

    /// Log proposal processing at debug level by default
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Fill in the tables and seal the factory
    pub fn format<F>(self, format: F) -> Result<Factory<R>, DefinitionError>
    where
        F: FnOnce(&mut ActionTable<R>, &mut TransitionTable, &mut ViewTable<R>) -> Result<(), DefinitionError>,
    {
        let mut tables = (self.empty)();
        format(&mut tables.actions, &mut tables.transitions, &mut tables.views)?;
        tables.transitions.seal();
        tables.rejector = self.rejector;
        tables.debug = self.debug;

        tracing::debug!(
            domain = tables.transitions.domain(),
            states = tables.transitions.len(),
            "factory sealed"
        );
        Ok(Factory {
            tables: Arc::new(tables),
        })
    }
}

fn empty_tables<C: Companion, R: 'static>() -> Trifecta<R> {
    Trifecta {
        actions: ActionTable::new::<C>(),
        transitions: TransitionTable::new(C::DOMAIN),
        views: ViewTable::new(C::DOMAIN),
        rejector: None,
        debug: false,
    }
}

/// Stamps out models that share one sealed table triple
pub struct Factory<R> {
    tables: Arc<Trifecta<R>>,
}

impl<R> Clone for Factory<R> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
        }
    }
}

impl<R: 'static> Factory<R> {
    /// Format a factory with default configuration
    pub fn new<C: Companion>(
        format: impl FnOnce(&mut ActionTable<R>, &mut TransitionTable, &mut ViewTable<R>) -> Result<(), DefinitionError>,
    ) -> Result<Self, DefinitionError> {
        Self::builder::<C>().format(format)
    }

    pub fn builder<C: Companion>() -> FactoryBuilder<R> {
        FactoryBuilder::new::<C>()
    }

    pub fn tables(&self) -> &Trifecta<R> {
        &self.tables
    }

    /// Insert a virgin model; call [`ModelRuntime::activate`] to start it
    pub fn build(&self, rt: &mut ModelRuntime<R>, parent: Option<ModelId>) -> Result<ModelId> {
        rt.insert(Arc::clone(&self.tables), parent)
    }

    /// Build and activate a model
    ///
    /// Validation problems leave the model broken rather than returning an
    /// error; check [`ModelRuntime::is_broken`].
    pub fn spawn(&self, rt: &mut ModelRuntime<R>, parent: Option<ModelId>) -> Result<ModelId> {
        let id = self.build(rt, parent)?;
        rt.activate(id)?;
        Ok(id)
    }
}
