//! Cast failures and fatal reporting.
//!
//! The dispatcher reports a failed cast as a [`CastFailure`]. A conditional
//! cast turns it into `false`; an unconditional cast renders it as a
//! [`CastFailureReport`] and hands it to the configured [`DiagnosticSink`],
//! which never returns.

use crate::runtime::metadata::Type;
use crate::runtime::names::type_name;
use oxicast_log::error;
use std::fmt;

/// Why a cast failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastFailureKind {
    /// No rule relates the source and target types.
    CastImpossible,
    /// The target is an existential and the dynamic type lacks one of its
    /// protocols.
    ConformanceMissing,
}

/// A failed cast, as returned through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastFailure {
    /// Why the cast failed.
    pub kind: CastFailureKind,
    /// The type named as the source in reports.
    pub source: Type,
    /// The requested target type.
    pub target: Type,
    /// Extra detail appended to the report.
    pub message: Option<&'static str>,
}

impl CastFailure {
    /// No rule relates `source` and `target`.
    #[must_use]
    pub fn impossible(source: Type, target: Type) -> Self {
        CastFailure {
            kind: CastFailureKind::CastImpossible,
            source,
            target,
            message: None,
        }
    }

    /// `source` does not conform to every protocol of `target`.
    #[must_use]
    pub fn missing(source: Type, target: Type) -> Self {
        CastFailure {
            kind: CastFailureKind::ConformanceMissing,
            source,
            target,
            message: None,
        }
    }

    /// Attaches an auxiliary message.
    #[must_use]
    pub fn with_message(self, message: &'static str) -> Self {
        CastFailure {
            message: Some(message),
            ..self
        }
    }

    /// Renders the fatal report for this failure.
    #[must_use]
    pub fn report(&self) -> CastFailureReport {
        CastFailureReport::new(self)
    }
}

impl fmt::Display for CastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.report(), f)
    }
}

impl std::error::Error for CastFailure {}

/// The rendered form of a fatal cast failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastFailureReport {
    /// The failure being reported.
    pub kind: CastFailureKind,
    /// Qualified name of the source type.
    pub source_name: &'static str,
    /// Descriptor address of the source type.
    pub source_addr: usize,
    /// Qualified name of the target type.
    pub target_name: &'static str,
    /// Descriptor address of the target type.
    pub target_addr: usize,
    /// Auxiliary message.
    pub message: Option<&'static str>,
}

impl CastFailureReport {
    /// Renders `failure` through the name cache.
    #[must_use]
    pub fn new(failure: &CastFailure) -> Self {
        CastFailureReport {
            kind: failure.kind,
            source_name: type_name(failure.source, true),
            source_addr: failure.source.addr(),
            target_name: type_name(failure.target, true),
            target_addr: failure.target.addr(),
            message: failure.message,
        }
    }
}

impl fmt::Display for CastFailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not cast value of type '{}' ({:#x}) to '{}' ({:#x})",
            self.source_name, self.source_addr, self.target_name, self.target_addr
        )?;

        match self.message {
            Some(message) => write!(f, ": {message}"),
            None => f.write_str("."),
        }
    }
}

/// Receives unconditional cast failures. Never returns.
pub trait DiagnosticSink: Send + Sync {
    /// Reports `report` and terminates the calling thread or process.
    fn fatal(&self, report: &CastFailureReport) -> !;
}

/// Logs the report at error level and aborts the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortSink;

impl DiagnosticSink for AbortSink {
    fn fatal(&self, report: &CastFailureReport) -> ! {
        #[cfg(feature = "fatal-backtrace")]
        {
            let backtrace = backtrace::Backtrace::new();
            error!("{report}\n{backtrace:?}");
        }

        #[cfg(not(feature = "fatal-backtrace"))]
        error!("{report}");

        std::process::abort()
    }
}

/// Panics with the report as the message. Lets tests observe fatal paths
/// with `#[should_panic]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicSink;

impl DiagnosticSink for PanicSink {
    fn fatal(&self, report: &CastFailureReport) -> ! {
        panic!("{report}")
    }
}
