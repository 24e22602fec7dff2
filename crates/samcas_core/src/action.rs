//! Action table
//!
//! Maps action and signal identifiers to handlers. Two built-in actions are
//! always present:
//! - `Samcas::Change` writes `params.value` at `params.sym` and renders
//! - `Samcas::Check` does the same, forces a full rebuild and calls the
//!   optional check callback

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::{DefinitionError, Result};
use crate::ident::{Category, Companion, Ident, Registry, Samcas};
use crate::proposal::Proposal;
use crate::runtime::Ctx;

/// Action, signal and nap handler
pub type Handler<R> = Arc<dyn Fn(&mut Ctx<'_, R>, &mut Proposal) -> Result<()> + Send + Sync>;

/// Callback invoked by `Samcas::Check` with the written symbol and value
pub type CheckCallback<R> = Arc<dyn Fn(&mut Ctx<'_, R>, &str, &Value) + Send + Sync>;

/// Handlers for one companion domain plus accepted child signal domains
pub struct ActionTable<R> {
    domain: &'static str,
    accepted: SmallVec<[&'static str; 2]>,
    registry: Registry,
    handlers: FxHashMap<Ident, Handler<R>>,
    on_check: Option<CheckCallback<R>>,
}

impl<R: 'static> ActionTable<R> {
    pub(crate) fn new<C: Companion>() -> Self {
        let mut handlers: FxHashMap<Ident, Handler<R>> = FxHashMap::default();
        handlers.insert(Samcas::Change.into(), Arc::new(change::<R>));
        handlers.insert(Samcas::Check.into(), Arc::new(check::<R>));

        Self {
            domain: C::DOMAIN,
            accepted: SmallVec::new(),
            registry: Registry::new::<C>(),
            handlers,
            on_check: None,
        }
    }

    /// Register a handler for an action or an accepted signal
    pub fn add_action<F>(&mut self, id: impl Into<Ident>, handler: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut Ctx<'_, R>, &mut Proposal) -> Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        if id.category() == Category::State {
            return Err(DefinitionError::WrongCategory {
                ident: id,
                expected: Category::Action,
            });
        }

        let own = id.domain() == self.domain || id.domain() == Samcas::DOMAIN;
        let accepted = self.accepted.contains(&id.domain());
        if !own && !accepted {
            return Err(DefinitionError::ForeignIdent {
                ident: id,
                expected: self.domain,
            });
        }
        if accepted && !own && id.category() != Category::Signal {
            return Err(DefinitionError::WrongCategory {
                ident: id,
                expected: Category::Signal,
            });
        }
        if self.handlers.contains_key(&id) {
            return Err(DefinitionError::Duplicate {
                table: "action table",
                ident: id.to_string(),
            });
        }

        self.handlers.insert(id, Arc::new(handler));
        Ok(())
    }

    /// Accept signals raised by children built from companion `C`
    pub fn accept_signals<C: Companion>(&mut self) -> &mut Self {
        if C::DOMAIN != self.domain && !self.accepted.contains(&C::DOMAIN) {
            self.accepted.push(C::DOMAIN);
            self.registry.add::<C>();
        }
        self
    }

    /// Set the callback run by `Samcas::Check`
    pub fn on_check<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&mut Ctx<'_, R>, &str, &Value) + Send + Sync + 'static,
    {
        self.on_check = Some(Arc::new(callback));
        self
    }
}

impl<R> ActionTable<R> {
    pub fn handler(&self, id: Ident) -> Option<&Handler<R>> {
        self.handlers.get(&id)
    }

    pub fn contains(&self, id: Ident) -> bool {
        self.handlers.contains_key(&id)
    }

    pub(crate) fn check_callback(&self) -> Option<&CheckCallback<R>> {
        self.on_check.as_ref()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether `id` is a member of a companion this model accepts
    pub fn knows(&self, id: Ident) -> bool {
        self.registry.members(id.domain()).contains(&id)
    }
}

/// Pull `(sym, value)` out of a change/check proposal
fn symbol(p: &Proposal) -> Option<(String, Value)> {
    let sym = p.param("sym")?.as_str()?.to_string();
    let value = p.param("value").cloned().unwrap_or(Value::Null);
    Some((sym, value))
}

fn change<R: 'static>(ctx: &mut Ctx<'_, R>, p: &mut Proposal) -> Result<()> {
    let Some((sym, value)) = symbol(p) else {
        ctx.break_with(format!("{} without sym", p.what()));
        return Ok(());
    };
    ctx.set(sym, value);
    p.request_render();
    Ok(())
}

fn check<R: 'static>(ctx: &mut Ctx<'_, R>, p: &mut Proposal) -> Result<()> {
    let Some((sym, value)) = symbol(p) else {
        ctx.break_with(format!("{} without sym", p.what()));
        return Ok(());
    };
    ctx.set(sym.clone(), value.clone());
    ctx.force_rebuild();
    p.request_render();

    if let Some(callback) = ctx.tables().actions.check_callback().cloned() {
        callback(ctx, &sym, &value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion;

    companion! {
        enum Form {
            states { Editing }
            actions { Submit }
            signals { Saved }
        }
    }

    companion! {
        enum Field {
            states { Empty }
            actions { Clear }
            signals { Filled }
        }
    }

    fn noop(_: &mut Ctx<'_, ()>, _: &mut Proposal) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_builtins_are_preregistered() {
        let table = ActionTable::<()>::new::<Form>();
        assert!(table.contains(Samcas::Change.into()));
        assert!(table.contains(Samcas::Check.into()));
        assert!(table.knows(Samcas::Virgin.into()));
        assert!(table.knows(Form::Submit.into()));
        assert!(!table.knows(Field::Filled.into()));
    }

    #[test]
    fn test_knows_checks_membership_not_just_domain() {
        let table = ActionTable::<()>::new::<Form>();
        let forged = Ident::new(Form::DOMAIN, Category::Action, "Cancel");
        assert!(!table.knows(forged));
        // Same label, wrong category
        assert!(!table.knows(Ident::new(Form::DOMAIN, Category::Signal, "Submit")));
        assert!(table.knows(Ident::new(Form::DOMAIN, Category::Action, "Submit")));
    }

    #[test]
    fn test_add_action_rules() {
        let mut table = ActionTable::<()>::new::<Form>();
        table.add_action(Form::Submit, noop).unwrap();
        table.add_action(Form::Saved, noop).unwrap();

        assert!(matches!(
            table.add_action(Form::Submit, noop),
            Err(DefinitionError::Duplicate { .. })
        ));
        assert!(matches!(
            table.add_action(Form::Editing, noop),
            Err(DefinitionError::WrongCategory { .. })
        ));
        assert!(matches!(
            table.add_action(Samcas::Change, noop),
            Err(DefinitionError::Duplicate { .. })
        ));
        assert!(matches!(
            table.add_action(Field::Filled, noop),
            Err(DefinitionError::ForeignIdent { .. })
        ));
    }

    #[test]
    fn test_accepted_signals() {
        let mut table = ActionTable::<()>::new::<Form>();
        table.accept_signals::<Field>();
        assert!(table.knows(Field::Filled.into()));

        table.add_action(Field::Filled, noop).unwrap();
        // Only the signals of an accepted companion are legal
        assert!(matches!(
            table.add_action(Field::Clear, noop),
            Err(DefinitionError::WrongCategory {
                expected: Category::Signal,
                ..
            })
        ));
    }
}
