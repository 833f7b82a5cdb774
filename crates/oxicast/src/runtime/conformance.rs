//! Protocol conformance: witness tables, the resolver seam and the
//! conformance check used when building existentials.
//!
//! # Policies
//!
//! [`conforms`] answers "does `ty` conform to `protocol`" by trying, in order:
//!
//! 1. `AnyObject`, satisfied by class-family types and class-bounded
//!    existentials.
//! 2. Protocols that need a witness table, answered by the
//!    [`ConformanceResolver`].
//! 3. Foreign marker protocols, answered by the [`ObjectBridge`] from the live
//!    object when one is available and from the static class otherwise.
//!
//! # Example
//!
//! ```
//! use oxicast::runtime::{ConformanceRegistry, ConformanceResolver, Protocol, Type, Value};
//!
//! fn describe(_: &Value) -> Value {
//!     Value::Bits(1)
//! }
//!
//! let base = Type::new_class("Docs.ConformBase", None).unwrap();
//! let derived = Type::new_class("Docs.ConformDerived", Some(base)).unwrap();
//! let printable = Protocol::new("Docs.ConformPrintable", &["describe"]).unwrap();
//!
//! let registry = ConformanceRegistry::new();
//! registry.register(base, printable, &[describe]).unwrap();
//!
//! // Subclasses inherit conformances.
//! let table = registry.resolve(derived, printable).unwrap();
//! assert_eq!(table.conforming_type(), base);
//! ```

use crate::error::{Error, Result};
use crate::runtime::bridge::ObjectBridge;
use crate::runtime::metadata::{ExistentialRepresentation, Metadata, Type};
use crate::runtime::object::Object;
use crate::runtime::protocol::{Protocol, SpecialProtocol};
use crate::runtime::value::Value;
use fxhash::FxHashMap;
use oxicast_log::debug;
use oxicast_mem::global_arena;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// One witness table entry.
pub type WitnessFn = fn(&Value) -> Value;

struct WitnessTableInner {
    protocol: Protocol,
    conforming_type: Type,
    entries: Vec<WitnessFn>,
}

/// Identity-compared handle to an immutable witness table.
#[derive(Clone, Copy)]
pub struct WitnessTable {
    inner: &'static WitnessTableInner,
}

impl WitnessTable {
    /// Allocates a table recording that `ty` conforms to `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArenaAllocationFailed`] if the arena cannot grow.
    pub fn new(protocol: Protocol, ty: Type, entries: &[WitnessFn]) -> Result<Self> {
        let inner = global_arena()
            .try_alloc(WitnessTableInner {
                protocol,
                conforming_type: ty,
                entries: entries.to_vec(),
            })
            .map_err(|err| Error::ArenaAllocationFailed {
                requested: err.requested,
            })?;

        Ok(WitnessTable { inner })
    }

    /// The protocol this table witnesses.
    #[must_use]
    pub fn protocol(self) -> Protocol {
        self.inner.protocol
    }

    /// The type the conformance was declared on. For inherited conformances
    /// this is the ancestor, not the queried subclass.
    #[must_use]
    pub fn conforming_type(self) -> Type {
        self.inner.conforming_type
    }

    /// Number of entries.
    #[must_use]
    pub fn len(self) -> usize {
        self.inner.entries.len()
    }

    /// True if the table has no entries.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Entry at `index`.
    #[must_use]
    pub fn entry(self, index: usize) -> Option<WitnessFn> {
        self.inner.entries.get(index).copied()
    }

    /// Calls entry `index` on `value`.
    #[must_use]
    pub fn invoke(self, index: usize, value: &Value) -> Option<Value> {
        self.entry(index).map(|entry| entry(value))
    }

    /// Calls the entry for the named requirement on `value`.
    #[must_use]
    pub fn invoke_requirement(self, requirement: &str, value: &Value) -> Option<Value> {
        self.invoke(self.protocol().requirement_index(requirement)?, value)
    }
}

impl PartialEq for WitnessTable {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for WitnessTable {}

impl fmt::Debug for WitnessTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WitnessTable")
            .field("protocol", &self.protocol().name())
            .field("conforming_type", &self.conforming_type())
            .field("entries", &self.len())
            .finish()
    }
}

/// Finds the witness table proving that a type conforms to a protocol.
pub trait ConformanceResolver: Send + Sync {
    /// Returns the table for `ty: protocol`, or `None` if `ty` does not
    /// conform.
    fn resolve(&self, ty: Type, protocol: Protocol) -> Option<WitnessTable>;
}

/// In-process conformance table keyed by `(type, protocol)`.
///
/// Lookups for classes walk the superclass chain; class wrappers resolve
/// through the class they wrap.
pub struct ConformanceRegistry {
    tables: RwLock<FxHashMap<(Type, Protocol), WitnessTable>>,
}

impl ConformanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        ConformanceRegistry {
            tables: RwLock::new(FxHashMap::default()),
        }
    }

    /// Builds and records a witness table for `ty: protocol`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConformanceAlreadyRegistered`] if `ty` already conforms
    /// - [`Error::ArenaAllocationFailed`] if the arena cannot grow
    pub fn register(
        &self,
        ty: Type,
        protocol: Protocol,
        entries: &[WitnessFn],
    ) -> Result<WitnessTable> {
        let mut tables = self.tables.write().unwrap();

        if tables.contains_key(&(ty, protocol)) {
            return Err(Error::ConformanceAlreadyRegistered {
                type_name: ty.to_string(),
                protocol: protocol.name().to_string(),
            });
        }

        let table = WitnessTable::new(protocol, ty, entries)?;
        tables.insert((ty, protocol), table);
        debug!("registered conformance {ty}: {}", protocol.name());

        Ok(table)
    }

    /// Records `ty: protocol` with an empty table.
    ///
    /// # Errors
    ///
    /// Same as [`ConformanceRegistry::register`].
    pub fn declare(&self, ty: Type, protocol: Protocol) -> Result<WitnessTable> {
        self.register(ty, protocol, &[])
    }

    /// Returns the table declared directly on `ty`, without inheritance.
    #[must_use]
    pub fn lookup_exact(&self, ty: Type, protocol: Protocol) -> Option<WitnessTable> {
        self.tables.read().unwrap().get(&(ty, protocol)).copied()
    }

    /// Number of declared conformances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap().len()
    }

    /// True if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConformanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConformanceResolver for ConformanceRegistry {
    fn resolve(&self, ty: Type, protocol: Protocol) -> Option<WitnessTable> {
        let mut current = Some(ty);

        while let Some(candidate) = current {
            if let Some(table) = self.lookup_exact(candidate, protocol) {
                return Some(table);
            }
            current = match candidate.metadata() {
                Metadata::ClassWrapper(wrapper) => Some(wrapper.class()),
                _ => candidate.superclass_link(),
            };
        }

        None
    }
}

/// Returns the process-wide conformance registry.
pub fn global_conformances() -> Arc<ConformanceRegistry> {
    static GLOBAL: OnceLock<Arc<ConformanceRegistry>> = OnceLock::new();
    GLOBAL
        .get_or_init(|| Arc::new(ConformanceRegistry::new()))
        .clone()
}

/// Evidence that a type conforms to one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conformance {
    /// Conformance without a table (`AnyObject` and foreign markers).
    Marker,
    /// Conformance through a witness table.
    Witnessed(WitnessTable),
}

/// Checks whether `ty` conforms to `protocol`.
///
/// `instance` is the live object when the value being cast is one; foreign
/// marker protocols prefer it over the static class.
pub fn conforms(
    resolver: &dyn ConformanceResolver,
    bridge: &dyn ObjectBridge,
    instance: Option<&Object>,
    ty: Type,
    protocol: Protocol,
) -> Option<Conformance> {
    if protocol.special() == SpecialProtocol::AnyObject {
        let is_object = match ty.metadata() {
            Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => true,
            Metadata::Existential(existential) => {
                existential.representation() == ExistentialRepresentation::Class
            }
            _ => false,
        };
        return is_object.then_some(Conformance::Marker);
    }

    if protocol.needs_witness_table() {
        return resolver.resolve(ty, protocol).map(Conformance::Witnessed);
    }

    let marked = match ty.metadata() {
        Metadata::Class(_) | Metadata::ClassWrapper(_) => match instance {
            Some(object) => bridge.object_conforms_to(object, protocol),
            None => bridge.class_conforms_to(ty.unwrap_class_wrapper(), protocol),
        },
        Metadata::ForeignClass(_) => {
            instance.is_some_and(|object| bridge.object_conforms_to(object, protocol))
        }
        _ => false,
    };

    marked.then_some(Conformance::Marker)
}

/// Checks every protocol in declaration order, stopping at the first
/// failure.
///
/// Returns the tables of the protocols that need one, in order.
pub fn conforms_all(
    resolver: &dyn ConformanceResolver,
    bridge: &dyn ObjectBridge,
    instance: Option<&Object>,
    ty: Type,
    protocols: &[Protocol],
) -> Option<Vec<WitnessTable>> {
    let mut tables = Vec::with_capacity(protocols.len());

    for protocol in protocols {
        match conforms(resolver, bridge, instance, ty, *protocol)? {
            Conformance::Witnessed(table) => tables.push(table),
            Conformance::Marker => {}
        }
    }

    Some(tables)
}
