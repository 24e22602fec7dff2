//! SAMCAS error types

use thiserror::Error;

use crate::ident::{Category, Ident};

/// Table construction failures
///
/// Any of these means the table triple being formatted must not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Identifier registered twice in the same table
    #[error("{table} already defines {ident}")]
    Duplicate { table: &'static str, ident: String },

    /// Identifier does not belong to a companion the table accepts
    #[error("{ident} does not belong to {expected}")]
    ForeignIdent { ident: Ident, expected: &'static str },

    /// Identifier has the wrong category for this registration
    #[error("{ident} is not a {expected}")]
    WrongCategory { ident: Ident, expected: Category },
}

/// Runtime protocol errors
///
/// State-machine level failures (missing handler, undefined target state,
/// expected-state mismatch) are not errors: they move the model into
/// `Samcas::Broken`. These variants cover programmer mistakes at the
/// boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamcasError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("unknown model")]
    UnknownModel,

    /// Proposal names a domain the model does not accept
    #[error("{0} is not registered with this model")]
    Unregistered(Ident),

    /// Expected state of a proposal is not a state
    #[error("{0} is not a state")]
    NotAState(Ident),

    /// Textual identifier does not match `<Domain>.<ss|sa|sg><Label>`
    #[error("malformed identifier: {0}")]
    MalformedIdent(String),

    /// Well-formed textual identifier with no registered member
    #[error("unknown identifier: {0}")]
    UnknownIdent(String),

    /// A signal was raised by a model without a parent
    #[error("cannot raise {signal}: model has no parent")]
    NoParent { signal: Ident },

    #[error("model has already been activated")]
    AlreadyActivated,

    /// Operation not permitted while the model processes a proposal
    #[error("model is busy")]
    Busy,
}

/// Result type for SAMCAS operations
pub type Result<T, E = SamcasError> = std::result::Result<T, E>;
