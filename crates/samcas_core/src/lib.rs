//! SAMCAS Core Runtime
//!
//! A State-Action-Model engine for UI models:
//!
//! - **Companion identifiers**: closed enumerations of states, actions and signals
//! - **Table triple**: declarative transitions, action handlers and views per domain
//! - **Proposal engine**: serialized FIFO processing with stale-proposal handling
//! - **Hot store**: tracked key/value state with scoped, incremental view refresh
//! - **Signal relay**: child models report state entries to their parent
//!
//! # Example
//!
//! ```rust
//! use samcas_core::{companion, Factory, ModelRuntime, Params};
//! use serde_json::json;
//!
//! companion! {
//!     pub enum Counter {
//!         states { Idle, Counting }
//!         actions { Bump }
//!         signals {}
//!     }
//! }
//!
//! let factory = Factory::new::<Counter>(|a, t, v| {
//!     t.add_state(Counter::Idle)?.next([Counter::Counting]);
//!     t.add_state(Counter::Counting)?.allow([Counter::Bump]);
//!     a.add_action(Counter::Bump, |ctx, p| {
//!         let n = ctx.get("n").and_then(|n| n.as_i64()).unwrap_or(0);
//!         ctx.set("n", json!(n + 1));
//!         p.request_render();
//!         ctx.flip_state(Counter::Counting)
//!     })?;
//!     v.add_default_view(|w| format!("n = {}", w.get("n").cloned().unwrap_or(json!(0))))?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! let mut rt = ModelRuntime::headless();
//! let counter = factory.spawn(&mut rt, None).unwrap();
//!
//! rt.present_now(counter, Counter::Bump, Params::default()).unwrap();
//! rt.present_now(counter, Counter::Bump, Params::default()).unwrap();
//!
//! assert!(rt.is_in(counter, Counter::Counting));
//! assert_eq!(rt.hot(counter).unwrap().get("n"), Some(&json!(2)));
//! ```

pub mod action;
pub mod error;
pub mod factory;
pub mod hot;
pub mod ident;
pub mod proposal;
pub mod runtime;
pub mod transition;
pub mod view;
pub mod watch;

pub use action::{ActionTable, CheckCallback, Handler};
pub use error::{DefinitionError, Result, SamcasError};
pub use factory::{Factory, FactoryBuilder, Trifecta};
pub use hot::{HotStore, STATE_KEY};
pub use ident::{Category, Companion, Ident, Samcas};
pub use proposal::{Params, Proposal};
pub use runtime::{Ctx, ModelId, ModelRuntime, Rejector};
pub use transition::{StateDef, TransitionTable};
pub use view::{Host, NullHost, Rendering, ViewFn, ViewKey, ViewTable, DEFAULT_RENDER};
pub use watch::{ScopeId, Watch};

pub use serde_json::Value;
