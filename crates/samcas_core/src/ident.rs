//! Companion identifiers
//!
//! Every state, action and signal a model understands belongs to a closed
//! "companion" enumeration. Each member converts into an [`Ident`] that
//! carries its owning domain and its [`Category`] as plain fields, so the
//! engine never has to guess what kind of proposal it is looking at.
//!
//! The textual form `<Domain>.<prefix><Label>` (prefixes `ss`, `sa`, `sg`)
//! is kept for diagnostics and for hosts that only have strings to offer.
//!
//! ```rust
//! use samcas_core::{companion, Category, Ident};
//!
//! companion! {
//!     pub enum Door {
//!         states { Closed, Open }
//!         actions { Knock }
//!         signals { Opened }
//!     }
//! }
//!
//! let open: Ident = Door::Open.into();
//! assert_eq!(open.category(), Category::State);
//! assert_eq!(open.to_string(), "Door.ssOpen");
//! ```

use std::fmt;

use crate::error::{Result, SamcasError};

/// Kind of identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    State,
    Action,
    Signal,
}

impl Category {
    /// Textual prefix used in the `<Domain>.<prefix><Label>` form
    pub fn prefix(self) -> &'static str {
        match self {
            Category::State => "ss",
            Category::Action => "sa",
            Category::Signal => "sg",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "ss" => Some(Category::State),
            "sa" => Some(Category::Action),
            "sg" => Some(Category::Signal),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::State => "state",
            Category::Action => "action",
            Category::Signal => "signal",
        };
        f.write_str(name)
    }
}

/// A tagged state/action/signal identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident {
    domain: &'static str,
    category: Category,
    label: &'static str,
}

impl Ident {
    pub const fn new(domain: &'static str, category: Category, label: &'static str) -> Self {
        Self {
            domain,
            category,
            label,
        }
    }

    /// Name of the companion enumeration this identifier belongs to
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_state(&self) -> bool {
        self.category == Category::State
    }

    /// Split a textual identifier into `(domain, category, label)`.
    ///
    /// Only the shape is checked here; mapping the result back onto a
    /// registered companion member is the runtime's job.
    pub fn parse(text: &str) -> Result<(&str, Category, &str)> {
        let malformed = || SamcasError::MalformedIdent(text.to_string());

        let (domain, rest) = text.split_once('.').ok_or_else(malformed)?;
        if domain.is_empty() || rest.len() <= 2 || !rest.is_char_boundary(2) {
            return Err(malformed());
        }
        let (prefix, label) = rest.split_at(2);
        let category = Category::from_prefix(prefix).ok_or_else(malformed)?;
        Ok((domain, category, label))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.domain, self.category.prefix(), self.label)
    }
}

/// A closed enumeration of states, actions and signals
///
/// Implemented by the [`companion!`](crate::companion) macro; hand-written
/// impls must keep `members()` exhaustive.
pub trait Companion: Copy + 'static {
    /// Domain name used in textual identifiers
    const DOMAIN: &'static str;

    /// Every member of the enumeration
    fn members() -> &'static [Self];

    /// Convert a member into its tagged identifier
    fn ident(self) -> Ident;

    /// All members as identifiers
    fn idents() -> Vec<Ident> {
        Self::members().iter().map(|m| m.ident()).collect()
    }
}

/// Declare a companion enumeration
///
/// Variants are grouped by category; the enum name becomes the domain.
#[macro_export]
macro_rules! companion {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            states { $($state:ident),* $(,)? }
            actions { $($action:ident),* $(,)? }
            signals { $($signal:ident),* $(,)? }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($state,)*
            $($action,)*
            $($signal,)*
        }

        impl $crate::Companion for $name {
            const DOMAIN: &'static str = stringify!($name);

            fn members() -> &'static [Self] {
                &[$($name::$state,)* $($name::$action,)* $($name::$signal,)*]
            }

            fn ident(self) -> $crate::Ident {
                match self {
                    $($name::$state => $crate::Ident::new(
                        stringify!($name),
                        $crate::Category::State,
                        stringify!($state),
                    ),)*
                    $($name::$action => $crate::Ident::new(
                        stringify!($name),
                        $crate::Category::Action,
                        stringify!($action),
                    ),)*
                    $($name::$signal => $crate::Ident::new(
                        stringify!($name),
                        $crate::Category::Signal,
                        stringify!($signal),
                    ),)*
                }
            }
        }

        impl From<$name> for $crate::Ident {
            fn from(member: $name) -> Self {
                $crate::Companion::ident(member)
            }
        }
    };
}

companion! {
    /// Library-internal states and actions, legal in every model
    pub enum Samcas {
        states { Virgin, Broken }
        actions { Change, Check }
        signals {}
    }
}

/// Resolved membership lists for every domain a model accepts
#[derive(Debug, Clone, Default)]
pub(crate) struct Registry {
    domains: Vec<(&'static str, Vec<Ident>)>,
}

impl Registry {
    pub(crate) fn new<C: Companion>() -> Self {
        let mut registry = Self::default();
        registry.add::<Samcas>();
        registry.add::<C>();
        registry
    }

    pub(crate) fn add<C: Companion>(&mut self) {
        if !self.knows_domain(C::DOMAIN) {
            self.domains.push((C::DOMAIN, C::idents()));
        }
    }

    pub(crate) fn knows_domain(&self, domain: &str) -> bool {
        self.domains.iter().any(|(d, _)| *d == domain)
    }

    pub(crate) fn members(&self, domain: &str) -> &[Ident] {
        self.domains
            .iter()
            .find(|(d, _)| *d == domain)
            .map(|(_, members)| members.as_slice())
            .unwrap_or(&[])
    }

    /// Map a textual identifier onto a registered member
    pub(crate) fn resolve(&self, text: &str) -> Result<Ident> {
        let (domain, category, label) = Ident::parse(text)?;
        self.members(domain)
            .iter()
            .find(|id| id.category() == category && id.label() == label)
            .copied()
            .ok_or_else(|| SamcasError::UnknownIdent(text.to_string()))
    }
}
