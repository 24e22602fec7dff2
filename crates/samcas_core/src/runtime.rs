//! Proposal engine
//!
//! [`ModelRuntime`] owns every model instance in a slot map, the same way a
//! single-threaded UI runtime owns its state machines. A model only changes
//! through proposals: each one is validated, dispatched to a handler or a
//! state step, rendered, and followed by entry effects (nap, signals).
//!
//! Proposals that arrive while a model is busy are parked in its inbox and
//! drained in FIFO order once the in-flight proposal has fully completed,
//! including any renders and signals it caused.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::error::{Result, SamcasError};
use crate::factory::Trifecta;
use crate::hot::{HotStore, STATE_KEY};
use crate::ident::{Category, Ident, Samcas};
use crate::proposal::{Params, Proposal};
use crate::view::{Host, NullHost, Rendering, Resolved, ViewFn};
use crate::watch::{ScopeSet, Watch};

new_key_type! {
    /// Unique identifier for a model instance
    pub struct ModelId;
}

/// Called instead of the default "go broken" when a proposal is rejected
pub type Rejector<R> = Arc<dyn Fn(&mut Ctx<'_, R>, &Proposal) + Send + Sync>;

fn virgin() -> Ident {
    Samcas::Virgin.into()
}

fn broken() -> Ident {
    Samcas::Broken.into()
}

struct Node<R> {
    tables: Arc<Trifecta<R>>,
    state: Ident,
    parent: Option<ModelId>,
    children: SmallVec<[ModelId; 4]>,
    hot: HotStore,
    busy: bool,
    inbox: VecDeque<Proposal>,
    scopes: ScopeSet,
    last_view: Option<ViewFn<R>>,
    /// Set after the first full rebuild; signals to a parent that is not
    /// ready yet are dropped.
    ready: bool,
    why_broken: Option<String>,
    history: Vec<(Ident, Ident)>,
}

/// Runtime that manages all model instances
pub struct ModelRuntime<R> {
    nodes: SlotMap<ModelId, Node<R>>,
    host: Box<dyn Host<R>>,
}

impl<R: 'static> ModelRuntime<R> {
    pub fn new(host: impl Host<R> + 'static) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            host: Box::new(host),
        }
    }

    /// Runtime whose renderings go nowhere
    pub fn headless() -> Self {
        Self::new(NullHost)
    }

    pub fn host(&self) -> &dyn Host<R> {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn Host<R> {
        self.host.as_mut()
    }

    /// Insert a virgin model wired to `parent`
    pub(crate) fn insert(
        &mut self,
        tables: Arc<Trifecta<R>>,
        parent: Option<ModelId>,
    ) -> Result<ModelId> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(SamcasError::UnknownModel);
            }
        }

        let mut hot = HotStore::new();
        hot.set(STATE_KEY, Value::String(virgin().to_string()));

        let id = self.nodes.insert(Node {
            tables,
            state: virgin(),
            parent,
            children: SmallVec::new(),
            hot,
            busy: false,
            inbox: VecDeque::new(),
            scopes: ScopeSet::default(),
            last_view: None,
            ready: false,
            why_broken: None,
            history: Vec::new(),
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(id);
        }
        Ok(id)
    }

    /// Remove a model, detaching it from its parent and children
    pub fn remove(&mut self, id: ModelId) -> Result<()> {
        let node = self.nodes.get(id).ok_or(SamcasError::UnknownModel)?;
        if node.busy {
            return Err(SamcasError::Busy);
        }
        let Some(node) = self.nodes.remove(id) else {
            return Err(SamcasError::UnknownModel);
        };

        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|child| *child != id);
        }
        for child in node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn contains(&self, id: ModelId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn state(&self, id: ModelId) -> Option<Ident> {
        self.nodes.get(id).map(|node| node.state)
    }

    pub fn is_in(&self, id: ModelId, state: impl Into<Ident>) -> bool {
        self.state(id) == Some(state.into())
    }

    pub fn is_broken(&self, id: ModelId) -> bool {
        self.state(id) == Some(broken())
    }

    /// Reason the model went broken
    pub fn why_broken(&self, id: ModelId) -> Option<&str> {
        self.nodes.get(id)?.why_broken.as_deref()
    }

    /// Read-only view of a model's hot store
    pub fn hot(&self, id: ModelId) -> Option<&HotStore> {
        self.nodes.get(id).map(|node| &node.hot)
    }

    pub fn parent(&self, id: ModelId) -> Option<ModelId> {
        self.nodes.get(id)?.parent
    }

    pub fn children(&self, id: ModelId) -> &[ModelId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_busy(&self, id: ModelId) -> bool {
        self.nodes.get(id).is_some_and(|node| node.busy)
    }

    /// Whether the model has completed its first full render
    pub fn is_ready(&self, id: ModelId) -> bool {
        self.nodes.get(id).is_some_and(|node| node.ready)
    }

    /// Number of proposals waiting in the model's inbox
    pub fn queued(&self, id: ModelId) -> usize {
        self.nodes.get(id).map_or(0, |node| node.inbox.len())
    }

    /// State transitions taken so far, as `(from, to)` pairs
    pub fn history(&self, id: ModelId) -> &[(Ident, Ident)] {
        self.nodes
            .get(id)
            .map(|node| node.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn clear_history(&mut self, id: ModelId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.history.clear();
        }
    }

    /// Map a textual identifier onto a member the model accepts
    pub fn resolve(&self, id: ModelId, text: &str) -> Result<Ident> {
        let node = self.nodes.get(id).ok_or(SamcasError::UnknownModel)?;
        node.tables.actions.registry().resolve(text)
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Validate the model's tables and step it into its first state
    ///
    /// Table problems do not produce an error: the model goes broken with
    /// every problem listed in its reason.
    pub fn activate(&mut self, id: ModelId) -> Result<()> {
        let node = self.nodes.get(id).ok_or(SamcasError::UnknownModel)?;
        if node.state != virgin() {
            if self.break_with(id, "activate called on an active model") {
                self.render(id);
            }
            return Err(SamcasError::AlreadyActivated);
        }
        let tables = Arc::clone(&node.tables);

        let Some(first) = tables.transitions.first() else {
            self.break_with(id, "no states defined");
            self.render(id);
            return Ok(());
        };

        let problems = validate(&tables);
        if !problems.is_empty() {
            self.break_with(id, problems.join("; "));
            self.render(id);
            return Ok(());
        }

        tracing::debug!(model = ?id, first = %first, "activating model");
        let proposal = Proposal::new(virgin(), first, Params::default()).debug(tables.debug);
        self.submit(id, proposal)
    }

    // =========================================================================
    // Proposals
    // =========================================================================

    /// Present a proposal built with the factory's default flags
    pub fn present(
        &mut self,
        id: ModelId,
        expected: impl Into<Ident>,
        what: impl Into<Ident>,
        params: Params,
    ) -> Result<()> {
        let node = self.nodes.get(id).ok_or(SamcasError::UnknownModel)?;
        let proposal = Proposal::new(expected, what, params).debug(node.tables.debug);
        self.submit(id, proposal)
    }

    /// Present with the model's current state as the expected state
    pub fn present_now(&mut self, id: ModelId, what: impl Into<Ident>, params: Params) -> Result<()> {
        let state = self.state(id).ok_or(SamcasError::UnknownModel)?;
        self.present(id, state, what, params)
    }

    /// Present using textual identifiers such as `"Door.ssOpen"`
    pub fn present_named(
        &mut self,
        id: ModelId,
        expected: &str,
        what: &str,
        params: Params,
    ) -> Result<()> {
        let expected = self.resolve(id, expected)?;
        let what = self.resolve(id, what)?;
        self.present(id, expected, what, params)
    }

    /// Step into `target` unless the model is already there
    pub fn flip_state(&mut self, id: ModelId, target: impl Into<Ident>) -> Result<()> {
        let target = target.into();
        let state = self.state(id).ok_or(SamcasError::UnknownModel)?;
        if state == target {
            return Ok(());
        }
        self.present(id, state, target, Params::default())
    }

    /// Propose a `Samcas::Change` write of `value` at `sym`
    pub fn change(&mut self, id: ModelId, sym: &str, value: Value) -> Result<()> {
        self.present_now(id, Samcas::Change, symbol_params(sym, value))
    }

    /// Propose a `Samcas::Check` write of `value` at `sym`
    pub fn check(&mut self, id: ModelId, sym: &str, value: Value) -> Result<()> {
        self.present_now(id, Samcas::Check, symbol_params(sym, value))
    }

    /// Submit a fully built proposal
    ///
    /// Identifier problems are returned immediately and nothing is queued.
    /// While the model is busy the proposal waits in the inbox, unless it
    /// was marked [`unqueued`](Proposal::unqueued).
    pub fn submit(&mut self, id: ModelId, proposal: Proposal) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(SamcasError::UnknownModel)?;

        for ident in [proposal.expected, proposal.what] {
            if !node.tables.actions.knows(ident) {
                return Err(SamcasError::Unregistered(ident));
            }
        }
        if !proposal.expected.is_state() {
            return Err(SamcasError::NotAState(proposal.expected));
        }

        if node.busy {
            if !proposal.queue {
                return self.step(id, proposal);
            }
            tracing::trace!(model = ?id, what = %proposal.what, "model busy, queueing proposal");
            node.inbox.push_back(proposal);
            return Ok(());
        }

        node.busy = true;
        let drained = panic::catch_unwind(AssertUnwindSafe(|| self.drain(id, proposal)));
        if let Some(node) = self.nodes.get_mut(id) {
            node.busy = false;
        }
        match drained {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.break_with(id, "panicked while processing a proposal");
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run `first`, then every queued proposal, until the inbox is empty
    fn drain(&mut self, id: ModelId, first: Proposal) -> Result<()> {
        let mut next = Some(first);
        while let Some(proposal) = next {
            if let Err(err) = self.step(id, proposal) {
                if self.break_with(id, err.to_string()) {
                    self.render(id);
                }
                return Err(err);
            }
            next = self.nodes.get_mut(id).and_then(|node| node.inbox.pop_front());
        }
        Ok(())
    }

    /// Process one proposal to completion
    fn step(&mut self, id: ModelId, mut p: Proposal) -> Result<()> {
        let node = self.nodes.get(id).ok_or(SamcasError::UnknownModel)?;
        let tables = Arc::clone(&node.tables);
        let before = node.state;

        if before == broken() {
            tracing::trace!(model = ?id, what = %p.what, "model is broken, dropping proposal");
            return Ok(());
        }
        if p.debug {
            tracing::debug!(model = ?id, state = %before, expected = %p.expected, what = %p.what, "processing proposal");
        } else {
            tracing::trace!(model = ?id, state = %before, expected = %p.expected, what = %p.what, "processing proposal");
        }

        let current = tables.transitions.get(before);
        let allowed = current.is_some_and(|def| def.allows(p.what));
        if p.expected != before && !allowed {
            p.stale = true;
            if p.what.category() != Category::State {
                if let Some(handler) = tables.actions.handler(p.what).cloned() {
                    handler(&mut Ctx::new(self, id), &mut p)?;
                }
            }
            if current.is_some_and(|def| def.ignores(p.what)) {
                tracing::debug!(model = ?id, what = %p.what, "ignoring stale proposal");
                p.render = false;
            } else {
                p.reject(format!(
                    "{} expected {} but the model is in {}",
                    p.what, p.expected, before
                ));
            }
        } else {
            self.dispatch(id, &tables, before, &mut p)?;
        }

        self.settle(id, &tables, before, p)
    }

    fn dispatch(
        &mut self,
        id: ModelId,
        tables: &Trifecta<R>,
        before: Ident,
        p: &mut Proposal,
    ) -> Result<()> {
        match p.what.category() {
            Category::Action | Category::Signal => {
                let Some(handler) = tables.actions.handler(p.what).cloned() else {
                    self.break_with(id, format!("function not defined: {}", p.what));
                    return Ok(());
                };
                handler(&mut Ctx::new(self, id), p)
            }
            Category::State => {
                let Some(current) = tables.transitions.get(before) else {
                    self.break_with(id, format!("cannot step from undefined state {before}"));
                    return Ok(());
                };
                if !current.can_step_to(p.what) {
                    self.break_with(id, format!("cannot step from {before} to {}", p.what));
                    return Ok(());
                }
                if !tables.transitions.contains(p.what) {
                    self.break_with(id, format!("lost state definition {}", p.what));
                    return Ok(());
                }
                self.commit(id, p.what);
                Ok(())
            }
        }
    }

    /// Reject, render, then run entry effects if the state changed
    fn settle(&mut self, id: ModelId, tables: &Trifecta<R>, before: Ident, mut p: Proposal) -> Result<()> {
        let mut rendered = false;
        if p.is_rejected() {
            match tables.rejector.as_ref() {
                Some(rejector) => rejector(&mut Ctx::new(self, id), &p),
                None => {
                    let reason = p.rejection.clone().unwrap_or_default();
                    self.break_with(id, reason);
                }
            }
        } else if p.render {
            self.render(id);
            rendered = true;
        }

        let Some(after) = self.state(id) else {
            return Ok(());
        };
        if after == before {
            return Ok(());
        }
        if after == broken() {
            if !rendered {
                self.render(id);
            }
            return Ok(());
        }

        let Some(def) = tables.transitions.get(after) else {
            self.break_with(id, format!("reached undefined state {after}"));
            self.render(id);
            return Ok(());
        };

        if p.nap {
            if let Some(nap) = def.nap_action() {
                let Some(handler) = tables.actions.handler(nap).cloned() else {
                    self.break_with(id, format!("function not defined: {nap}"));
                    self.render(id);
                    return Ok(());
                };
                handler(&mut Ctx::new(self, id), &mut p)?;
                if self.is_broken(id) {
                    self.render(id);
                    return Ok(());
                }
            }
        }

        if p.raise {
            if let Some(signal) = def.entry_signal() {
                self.raise_signal(id, signal, &p)?;
            }
            if let Some(signal) = def.weak_entry_signal() {
                if self.parent(id).is_some() {
                    self.raise_signal(id, signal, &p)?;
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, id: ModelId, to: Ident) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.history.push((node.state, to));
        node.state = to;
        node.hot.set(STATE_KEY, Value::String(to.to_string()));
    }

    /// Move the model into `Samcas::Broken`
    ///
    /// Returns false if it was already broken; the first reason is kept.
    pub(crate) fn break_with(&mut self, id: ModelId, reason: impl Into<String>) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.state == broken() {
            return false;
        }

        let reason = reason.into();
        tracing::warn!(model = ?id, state = %node.state, reason = %reason, "model broken");
        node.history.push((node.state, broken()));
        node.state = broken();
        node.why_broken = Some(reason);
        node.inbox.clear();
        node.hot.set(STATE_KEY, Value::String(broken().to_string()));
        true
    }

    /// Relay an entry signal to the parent model
    fn raise_signal(&mut self, child: ModelId, signal: Ident, p: &Proposal) -> Result<()> {
        let parent = self
            .parent(child)
            .filter(|parent| self.nodes.contains_key(*parent))
            .ok_or(SamcasError::NoParent { signal })?;

        let node = &self.nodes[parent];
        if !node.ready {
            tracing::debug!(child = ?child, parent = ?parent, signal = %signal, "parent not ready, dropping signal");
            return Ok(());
        }

        tracing::debug!(child = ?child, parent = ?parent, signal = %signal, "relaying signal");
        let proposal = Proposal::new(node.state, signal, p.params.clone())
            .from_child(child)
            .debug(p.debug);
        self.submit(parent, proposal)
    }

    /// Render the model's current state
    ///
    /// Reuses the previous view when it resolves to the same function and
    /// only refreshes scopes that observed a hit key; otherwise rebuilds.
    fn render(&mut self, id: ModelId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };

        match node.tables.views.resolve(node.state) {
            Resolved::Broken => {
                let why = node.why_broken.clone().unwrap_or_default();
                node.last_view = None;
                node.scopes.clear();
                node.ready = true;
                self.host.inject(id, Rendering::Broken { why });
            }
            Resolved::Missing => {
                node.last_view = None;
                node.scopes.clear();
                node.ready = true;
                self.host.inject(id, Rendering::NoView { state: node.state });
            }
            Resolved::View(view) => {
                let smart = node
                    .last_view
                    .as_ref()
                    .is_some_and(|last| Arc::ptr_eq(last, &view));

                if smart {
                    for (scope, observed) in node.scopes.intersecting(node.hot.hits()) {
                        self.host.refresh(id, scope, observed);
                    }
                } else {
                    node.scopes.clear();
                    let output = {
                        let mut watch = Watch::new(id, node.state, &node.hot, &mut node.scopes);
                        view(&mut watch)
                    };
                    node.last_view = Some(view);
                    node.ready = true;
                    self.host.inject(id, Rendering::View(output));
                }
            }
        }
        node.hot.clear_hits();
    }
}

fn symbol_params(sym: &str, value: Value) -> Params {
    let mut params = Params::default();
    params.insert("sym".to_string(), Value::String(sym.to_string()));
    params.insert("value".to_string(), value);
    params
}

/// Static checks run once per activation
fn validate<R>(tables: &Trifecta<R>) -> Vec<String> {
    let transitions = &tables.transitions;
    let actions = &tables.actions;
    let mut problems = Vec::new();

    for &member in actions.registry().members(transitions.domain()) {
        match member.category() {
            Category::State => {
                if !transitions.contains(member) {
                    problems.push(format!("missing state definition for {member}"));
                }
                if !tables.views.covers(member) {
                    problems.push(format!("missing view for {member}"));
                }
            }
            Category::Action => {
                if !actions.contains(member) {
                    problems.push(format!("missing action handler for {member}"));
                }
            }
            Category::Signal => {}
        }
    }

    let resolves = |ident: Ident| match ident.category() {
        Category::State => transitions.contains(ident),
        Category::Action | Category::Signal => actions.contains(ident),
    };

    for def in transitions.states() {
        let state = def.id();
        for &next in def.next_states() {
            if !next.is_state() || !transitions.contains(next) {
                problems.push(format!("{state}: next state {next} is not defined"));
            }
        }
        if let Some(nap) = def.nap_action() {
            if nap.is_state() || !actions.contains(nap) {
                problems.push(format!("{state}: nap {nap} is not defined"));
            }
        }
        for &allowed in def.allowed() {
            if !resolves(allowed) {
                problems.push(format!("{state}: allowed {allowed} is not defined"));
            }
        }
        for &ignored in def.ignored() {
            if !resolves(ignored) {
                problems.push(format!("{state}: ignored {ignored} is not defined"));
            }
        }
        for signal in [def.entry_signal(), def.weak_entry_signal()].into_iter().flatten() {
            if signal.category() != Category::Signal || signal.domain() != transitions.domain() {
                problems.push(format!("{state}: {signal} is not a signal of {}", transitions.domain()));
            }
        }
    }
    problems
}

/// Handle given to handlers, naps, rejectors and check callbacks
///
/// Gives write access to the model's hot store and lets the handler present
/// further proposals. Proposals to the model itself are queued until the
/// current one completes.
pub struct Ctx<'a, R> {
    rt: &'a mut ModelRuntime<R>,
    id: ModelId,
}

impl<'a, R: 'static> Ctx<'a, R> {
    pub(crate) fn new(rt: &'a mut ModelRuntime<R>, id: ModelId) -> Self {
        Self { rt, id }
    }

    fn node(&self) -> &Node<R> {
        &self.rt.nodes[self.id]
    }

    fn node_mut(&mut self) -> &mut Node<R> {
        &mut self.rt.nodes[self.id]
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn state(&self) -> Ident {
        self.node().state
    }

    pub fn hot(&self) -> &HotStore {
        &self.node().hot
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.hot().get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.hot().has(key)
    }

    /// Write to the hot store; returns whether the value changed
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        self.node_mut().hot.set(key, value)
    }

    pub fn parent(&self) -> Option<ModelId> {
        self.node().parent
    }

    pub fn children(&self) -> &[ModelId] {
        &self.node().children
    }

    pub fn present(
        &mut self,
        expected: impl Into<Ident>,
        what: impl Into<Ident>,
        params: Params,
    ) -> Result<()> {
        self.rt.present(self.id, expected, what, params)
    }

    pub fn present_now(&mut self, what: impl Into<Ident>, params: Params) -> Result<()> {
        self.rt.present_now(self.id, what, params)
    }

    /// Step into `target` once the current proposal completes
    pub fn flip_state(&mut self, target: impl Into<Ident>) -> Result<()> {
        self.rt.flip_state(self.id, target)
    }

    /// Present to another model, e.g. a child
    pub fn present_to(
        &mut self,
        model: ModelId,
        expected: impl Into<Ident>,
        what: impl Into<Ident>,
        params: Params,
    ) -> Result<()> {
        self.rt.present(model, expected, what, params)
    }

    pub fn submit(&mut self, proposal: Proposal) -> Result<()> {
        self.rt.submit(self.id, proposal)
    }

    /// Move the model into `Samcas::Broken`
    pub fn break_with(&mut self, reason: impl Into<String>) {
        self.rt.break_with(self.id, reason);
    }

    /// Make the next render a full rebuild
    pub fn force_rebuild(&mut self) {
        self.node_mut().last_view = None;
    }

    /// The runtime itself, e.g. to spawn child models
    pub fn runtime(&mut self) -> &mut ModelRuntime<R> {
        &mut *self.rt
    }

    pub(crate) fn tables(&self) -> &Arc<Trifecta<R>> {
        &self.node().tables
    }
}
