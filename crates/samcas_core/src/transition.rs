//! Transition table
//!
//! Declarative per-state definitions:
//! - permitted successor states (none means terminal)
//! - actions allowed even when the proposer's expected state is stale
//! - actions silently ignored when stale
//! - an entry handler ("nap") run after the state is entered
//! - a signal (mandatory parent) and a weak signal (optional parent)

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::DefinitionError;
use crate::ident::{Category, Ident, Samcas};

type IdentSet = SmallVec<[Ident; 4]>;

/// Definition of a single state
#[derive(Debug, Clone)]
pub struct StateDef {
    id: Ident,
    next: Option<IdentSet>,
    allow: IdentSet,
    ignore: IdentSet,
    nap: Option<Ident>,
    signal: Option<Ident>,
    weak_signal: Option<Ident>,
}

impl StateDef {
    fn new(id: Ident) -> Self {
        Self {
            id,
            next: None,
            allow: SmallVec::new(),
            ignore: SmallVec::new(),
            nap: None,
            signal: None,
            weak_signal: None,
        }
    }

    /// Add permitted successor states
    pub fn next<I>(&mut self, states: impl IntoIterator<Item = I>) -> &mut Self
    where
        I: Into<Ident>,
    {
        let next = self.next.get_or_insert_with(SmallVec::new);
        extend_unique(next, states);
        self
    }

    /// Proposals accepted even when their expected state is stale
    pub fn allow<I>(&mut self, idents: impl IntoIterator<Item = I>) -> &mut Self
    where
        I: Into<Ident>,
    {
        extend_unique(&mut self.allow, idents);
        self
    }

    /// Proposals silently dropped when their expected state is stale
    pub fn ignore<I>(&mut self, idents: impl IntoIterator<Item = I>) -> &mut Self
    where
        I: Into<Ident>,
    {
        extend_unique(&mut self.ignore, idents);
        self
    }

    /// Action handler run on entry
    pub fn nap(&mut self, action: impl Into<Ident>) -> &mut Self {
        self.nap = Some(action.into());
        self
    }

    /// Signal relayed to the parent on entry; fatal without a parent
    pub fn signal(&mut self, signal: impl Into<Ident>) -> &mut Self {
        self.signal = Some(signal.into());
        self
    }

    /// Signal relayed to the parent on entry if there is one
    pub fn weak_signal(&mut self, signal: impl Into<Ident>) -> &mut Self {
        self.weak_signal = Some(signal.into());
        self
    }

    pub fn id(&self) -> Ident {
        self.id
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }

    pub fn can_step_to(&self, state: Ident) -> bool {
        self.next.as_ref().is_some_and(|next| next.contains(&state))
    }

    pub fn next_states(&self) -> &[Ident] {
        self.next.as_deref().unwrap_or(&[])
    }

    pub fn allows(&self, ident: Ident) -> bool {
        self.allow.contains(&ident)
    }

    pub fn ignores(&self, ident: Ident) -> bool {
        self.ignore.contains(&ident)
    }

    pub fn allowed(&self) -> &[Ident] {
        &self.allow
    }

    pub fn ignored(&self) -> &[Ident] {
        &self.ignore
    }

    pub fn nap_action(&self) -> Option<Ident> {
        self.nap
    }

    pub fn entry_signal(&self) -> Option<Ident> {
        self.signal
    }

    pub fn weak_entry_signal(&self) -> Option<Ident> {
        self.weak_signal
    }
}

fn extend_unique<I: Into<Ident>>(set: &mut IdentSet, idents: impl IntoIterator<Item = I>) {
    for ident in idents {
        let ident = ident.into();
        if !set.contains(&ident) {
            set.push(ident);
        }
    }
}

/// State definitions for one companion domain
#[derive(Debug, Clone)]
pub struct TransitionTable {
    domain: &'static str,
    states: FxHashMap<Ident, StateDef>,
    order: Vec<Ident>,
    virgin: Option<StateDef>,
}

impl TransitionTable {
    pub(crate) fn new(domain: &'static str) -> Self {
        Self {
            domain,
            states: FxHashMap::default(),
            order: Vec::new(),
            virgin: None,
        }
    }

    /// Register a new state definition
    ///
    /// The first state added becomes the initial state.
    pub fn add_state(&mut self, id: impl Into<Ident>) -> Result<&mut StateDef, DefinitionError> {
        let id = id.into();
        if id.domain() != self.domain {
            return Err(DefinitionError::ForeignIdent {
                ident: id,
                expected: self.domain,
            });
        }
        if id.category() != Category::State {
            return Err(DefinitionError::WrongCategory {
                ident: id,
                expected: Category::State,
            });
        }
        if self.states.contains_key(&id) {
            return Err(DefinitionError::Duplicate {
                table: "transition table",
                ident: id.to_string(),
            });
        }

        self.order.push(id);
        Ok(self.states.entry(id).or_insert_with(|| StateDef::new(id)))
    }

    /// Wire the implicit `Virgin -> first` step
    pub(crate) fn seal(&mut self) {
        self.virgin = self.first().map(|first| {
            let mut virgin = StateDef::new(Samcas::Virgin.into());
            virgin.next([first]);
            virgin
        });
    }

    /// Companion domain whose states this table defines
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn first(&self) -> Option<Ident> {
        self.order.first().copied()
    }

    pub fn get(&self, id: Ident) -> Option<&StateDef> {
        if id == Ident::from(Samcas::Virgin) {
            return self.virgin.as_ref();
        }
        self.states.get(&id)
    }

    pub fn contains(&self, id: Ident) -> bool {
        self.states.contains_key(&id)
    }

    /// Declared states in registration order
    pub fn states(&self) -> impl Iterator<Item = &StateDef> {
        self.order.iter().filter_map(|id| self.states.get(id))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
