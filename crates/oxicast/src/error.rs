//! Error types for the `oxicast` runtime.
//!
//! This module defines the errors returned by registry and construction
//! operations: duplicate registrations, descriptors of the wrong kind, arena
//! exhaustion and bad configuration values.
//!
//! Cast outcomes are not errors in this sense. A failed cast is reported as a
//! [`CastFailure`](crate::runtime::CastFailure) by the dispatcher and turned
//! into `false` or a fatal report depending on the cast flags.

use crate::runtime::Kind;
use std::fmt;

/// Errors that can occur in the `oxicast` runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A nominal type with this qualified name is already registered.
    TypeAlreadyExists {
        /// The qualified name.
        name: String,
    },

    /// A protocol with this qualified name is already registered.
    ProtocolAlreadyExists {
        /// The qualified name.
        name: String,
    },

    /// The type already has a conformance to the protocol.
    ConformanceAlreadyRegistered {
        /// Rendered name of the conforming type.
        type_name: String,
        /// Name of the protocol.
        protocol: String,
    },

    /// A bridge witness is already registered for the type.
    BridgeAlreadyRegistered {
        /// Rendered name of the bridged type.
        type_name: String,
    },

    /// A descriptor of the wrong kind was supplied.
    KindMismatch {
        /// What the operation accepts.
        expected: &'static str,
        /// The kind that was supplied.
        found: Kind,
    },

    /// The metadata arena could not grow.
    ArenaAllocationFailed {
        /// The requested allocation size.
        requested: usize,
    },

    /// A configuration value could not be parsed.
    InvalidConfiguration {
        /// The configuration key.
        key: String,
        /// The rejected value.
        value: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeAlreadyExists { name } => {
                write!(f, "Type '{name}' already exists in registry")
            }
            Error::ProtocolAlreadyExists { name } => {
                write!(f, "Protocol '{name}' already exists in registry")
            }
            Error::ConformanceAlreadyRegistered {
                type_name,
                protocol,
            } => {
                write!(
                    f,
                    "Conformance of '{type_name}' to '{protocol}' is already registered"
                )
            }
            Error::BridgeAlreadyRegistered { type_name } => {
                write!(f, "Bridge for '{type_name}' is already registered")
            }
            Error::KindMismatch { expected, found } => {
                write!(f, "Kind mismatch: expected {expected}, found {found:?}")
            }
            Error::ArenaAllocationFailed { requested } => {
                write!(f, "Metadata arena failed to allocate {requested} bytes")
            }
            Error::InvalidConfiguration { key, value } => {
                write!(f, "Invalid configuration value for {key}: '{value}'")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `oxicast` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
