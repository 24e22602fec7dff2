//! Proposals submitted to a model

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::ident::{Category, Ident};
use crate::runtime::ModelId;

/// Free-form proposal parameters
pub type Params = FxHashMap<String, Value>;

/// A requested state step, action or signal
#[derive(Debug, Clone)]
pub struct Proposal {
    pub(crate) expected: Ident,
    pub(crate) what: Ident,
    pub(crate) params: Params,
    pub(crate) origin: Option<ModelId>,
    pub(crate) nap: bool,
    pub(crate) raise: bool,
    pub(crate) render: bool,
    pub(crate) queue: bool,
    pub(crate) debug: bool,
    pub(crate) stale: bool,
    pub(crate) rejection: Option<String>,
}

impl Proposal {
    /// Create a proposal with default flags
    ///
    /// State steps render by default; actions and signals only render if
    /// their handler asks for it.
    pub fn new(expected: impl Into<Ident>, what: impl Into<Ident>, params: Params) -> Self {
        let what = what.into();
        Self {
            expected: expected.into(),
            what,
            params,
            origin: None,
            nap: true,
            raise: true,
            render: what.category() == Category::State,
            queue: true,
            debug: false,
            stale: false,
            rejection: None,
        }
    }

    /// Skip the nap handler of the state this proposal enters
    pub fn without_nap(mut self) -> Self {
        self.nap = false;
        self
    }

    /// Do not relay entry signals to the parent
    pub fn without_signals(mut self) -> Self {
        self.raise = false;
        self
    }

    pub fn without_render(mut self) -> Self {
        self.render = false;
        self
    }

    /// Run immediately even if the model is busy
    pub fn unqueued(mut self) -> Self {
        self.queue = false;
        self
    }

    /// Log this proposal's processing at debug level
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub(crate) fn from_child(mut self, child: ModelId) -> Self {
        self.origin = Some(child);
        self
    }

    pub fn expected(&self) -> Ident {
        self.expected
    }

    pub fn what(&self) -> Ident {
        self.what
    }

    pub fn category(&self) -> Category {
        self.what.category()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Child model that raised this signal
    pub fn origin(&self) -> Option<ModelId> {
        self.origin
    }

    /// True when the model was not in the expected state
    ///
    /// Handlers still run for stale proposals; the proposal is dropped or
    /// rejected afterwards.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn wants_render(&self) -> bool {
        self.render
    }

    /// Ask for a render once the handler returns
    pub fn request_render(&mut self) {
        self.render = true;
    }

    /// Reject this proposal; the model's rejector runs after the handler
    pub fn reject(&mut self, reason: impl Into<String>) {
        if self.rejection.is_none() {
            self.rejection = Some(reason.into());
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Samcas;
    use serde_json::json;

    #[test]
    fn test_default_flags() {
        let step = Proposal::new(Samcas::Virgin, Samcas::Broken, Params::default());
        assert!(step.wants_render());
        assert!(step.nap && step.raise && step.queue);

        let change = Proposal::new(Samcas::Virgin, Samcas::Change, Params::default());
        assert!(!change.wants_render());
        assert_eq!(change.category(), Category::Action);
    }

    #[test]
    fn test_first_rejection_wins() {
        let mut p = Proposal::new(Samcas::Virgin, Samcas::Change, Params::default())
            .with_param("sym", json!("x"));
        assert_eq!(p.param("sym"), Some(&json!("x")));

        p.reject("first");
        p.reject("second");
        assert!(p.is_rejected());
        assert_eq!(p.rejection(), Some("first"));
    }
}
