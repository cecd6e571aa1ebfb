//! Shared foundational types for the axon asynchronous-circuit simulator.
//!
//! This crate provides the two value types the whole simulator is built on:
//! ternary logic values ([`Tri`]) for circuit nodes and arbitrary-precision
//! unsigned integers ([`BigInt`]) for data values and simulation time.

#![warn(missing_docs)]

pub mod bigint;
pub mod tri;

pub use bigint::{BigInt, ParseBigIntError};
pub use tri::Tri;
