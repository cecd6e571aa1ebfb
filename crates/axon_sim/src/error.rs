//! Simulation error types.
//!
//! Every recoverable failure is a [`SimError`] variant matching one of the
//! simulator's error kinds. Usage, resolution, domain, and state errors are
//! recovered at the command boundary without disturbing kernel state;
//! warnings are not errors and flow through the kernel's warning policy
//! instead.

use std::io;

/// Errors that can occur during simulator construction or execution.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Bad argument count or form at the command boundary.
    #[error("{0}")]
    Usage(String),

    /// Identifier not found, array index missing or out of bounds, or an
    /// operation applied to a slot of the wrong kind.
    #[error("{0}")]
    Resolution(String),

    /// A value outside a slot's domain (negative integer, width overflow,
    /// non-ternary Boolean literal).
    #[error("{0}")]
    TypeDomain(String),

    /// Operation not valid in the current phase (e.g. `skip-comm` on an
    /// idle channel, `goto` with multiple live threads).
    #[error("{0}")]
    StateIllegal(String),

    /// Division by zero during expression evaluation.
    #[error("division by zero")]
    DivisionByZero,

    /// An I/O error while writing logs or trace files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A kernel invariant was violated; unrecoverable.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SimError {
    /// A [`SimError::Usage`] with the given message.
    pub fn usage(msg: impl Into<String>) -> Self {
        SimError::Usage(msg.into())
    }

    /// A [`SimError::Resolution`] with the given message.
    pub fn resolution(msg: impl Into<String>) -> Self {
        SimError::Resolution(msg.into())
    }

    /// A [`SimError::TypeDomain`] with the given message.
    pub fn type_domain(msg: impl Into<String>) -> Self {
        SimError::TypeDomain(msg.into())
    }

    /// A [`SimError::StateIllegal`] with the given message.
    pub fn state_illegal(msg: impl Into<String>) -> Self {
        SimError::StateIllegal(msg.into())
    }

    /// A [`SimError::Fatal`] with the given message.
    pub fn fatal(msg: impl Into<String>) -> Self {
        SimError::Fatal(msg.into())
    }
}
