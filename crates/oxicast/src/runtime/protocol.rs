//! Protocol descriptors.
//!
//! A [`Protocol`] names a requirement that existential containers may impose
//! on the values they hold. Protocols are globally registered by qualified
//! name, allocated in the metadata arena and compared by identity.
//!
//! # Dispatch strategies
//!
//! - [`DispatchStrategy::WitnessTable`]: conforming types supply a witness
//!   table, which the conformance check retrieves from the resolver.
//! - [`DispatchStrategy::ForeignMarker`]: a tag defined by the foreign
//!   object system. Conformance is answered by the object bridge and no
//!   table is stored in containers.
//!
//! Two special protocols exist outside the name registry:
//! [`Protocol::any_object`] and [`Protocol::error`].
//!
//! # Example
//!
//! ```
//! use oxicast::runtime::Protocol;
//!
//! let shape = Protocol::new("Docs.ProtocolShape", &["area"]).unwrap();
//!
//! assert_eq!(shape.name(), "ProtocolShape");
//! assert!(shape.needs_witness_table());
//! assert!(!shape.is_class_bound());
//! ```

use crate::error::{Error, Result};
use fxhash::FxHashMap;
use oxicast_log::debug;
use oxicast_mem::global_arena;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, RwLock};

/// How conformance to a protocol is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchStrategy {
    /// Conformance is a witness table returned by the resolver.
    #[default]
    WitnessTable,
    /// Conformance is a tag answered by the foreign object system.
    ForeignMarker,
}

/// Protocols with built-in meaning to the cast engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecialProtocol {
    /// An ordinary protocol.
    #[default]
    None,
    /// Satisfied by every class instance.
    AnyObject,
    /// The error protocol; a sole `Error` requirement selects the error-box
    /// existential layout.
    Error,
}

/// Static properties of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProtocolFlags {
    /// Conforming values must be class instances.
    pub class_bound: bool,
    /// How conformance is established.
    pub dispatch: DispatchStrategy,
    /// Built-in role, if any.
    pub special: SpecialProtocol,
}

pub(crate) struct ProtocolInner {
    name: &'static str,
    module: Option<&'static str>,
    flags: ProtocolFlags,
    requirements: Vec<&'static str>,
}

/// Identity-compared handle to a protocol descriptor.
#[derive(Clone, Copy)]
pub struct Protocol {
    inner: &'static ProtocolInner,
}

struct ProtocolRegistry {
    protocols: RwLock<FxHashMap<String, Protocol>>,
}

static REGISTRY: OnceLock<ProtocolRegistry> = OnceLock::new();
static ANY_OBJECT: OnceLock<Protocol> = OnceLock::new();
static ERROR: OnceLock<Protocol> = OnceLock::new();

fn registry() -> &'static ProtocolRegistry {
    REGISTRY.get_or_init(|| ProtocolRegistry {
        protocols: RwLock::new(FxHashMap::default()),
    })
}

impl Protocol {
    /// Registers a protocol conformed to through witness tables.
    ///
    /// `requirements` names the witness table entries in slot order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolAlreadyExists`] if the name is taken.
    pub fn new(name: &str, requirements: &[&str]) -> Result<Protocol> {
        Self::with_flags(name, ProtocolFlags::default(), requirements)
    }

    /// Registers a class-bound protocol conformed to through witness tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolAlreadyExists`] if the name is taken.
    pub fn new_class_bound(name: &str, requirements: &[&str]) -> Result<Protocol> {
        let flags = ProtocolFlags {
            class_bound: true,
            ..ProtocolFlags::default()
        };
        Self::with_flags(name, flags, requirements)
    }

    /// Registers a foreign marker protocol. Marker protocols are always
    /// class-bound and never carry witness tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolAlreadyExists`] if the name is taken.
    pub fn new_foreign(name: &str) -> Result<Protocol> {
        let flags = ProtocolFlags {
            class_bound: true,
            dispatch: DispatchStrategy::ForeignMarker,
            special: SpecialProtocol::None,
        };
        Self::with_flags(name, flags, &[])
    }

    /// Registers a protocol with explicit flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolAlreadyExists`] if the name is taken.
    pub fn with_flags(
        name: &str,
        flags: ProtocolFlags,
        requirements: &[&str],
    ) -> Result<Protocol> {
        let registry = registry();

        if registry.protocols.read().unwrap().contains_key(name) {
            return Err(Error::ProtocolAlreadyExists {
                name: name.to_string(),
            });
        }

        let mut protocols = registry.protocols.write().unwrap();
        if protocols.contains_key(name) {
            return Err(Error::ProtocolAlreadyExists {
                name: name.to_string(),
            });
        }

        let protocol = Self::allocate(name, flags, requirements)?;
        protocols.insert(name.to_string(), protocol);
        debug!("registered protocol {name}");

        Ok(protocol)
    }

    fn allocate(
        name: &str,
        flags: ProtocolFlags,
        requirements: &[&str],
    ) -> Result<Protocol> {
        let arena = global_arena();
        let (module, short) = match name.rsplit_once('.') {
            Some((module, short)) if !module.is_empty() && !short.is_empty() => {
                (Some(arena.alloc_str(module)), arena.alloc_str(short))
            }
            _ => (None, arena.alloc_str(name)),
        };

        let inner = arena
            .try_alloc(ProtocolInner {
                name: short,
                module,
                flags,
                requirements: requirements
                    .iter()
                    .map(|r| arena.alloc_str(r))
                    .collect(),
            })
            .map_err(|err| Error::ArenaAllocationFailed {
                requested: err.requested,
            })?;

        Ok(Protocol { inner })
    }

    fn special_singleton(
        cell: &'static OnceLock<Protocol>,
        name: &str,
        flags: ProtocolFlags,
    ) -> Protocol {
        *cell.get_or_init(|| match Self::allocate(name, flags, &[]) {
            Ok(protocol) => protocol,
            Err(err) => panic!("{err}"),
        })
    }

    /// The `AnyObject` protocol: class-bound, no witness table.
    #[must_use]
    pub fn any_object() -> Protocol {
        Self::special_singleton(
            &ANY_OBJECT,
            "AnyObject",
            ProtocolFlags {
                class_bound: true,
                dispatch: DispatchStrategy::ForeignMarker,
                special: SpecialProtocol::AnyObject,
            },
        )
    }

    /// The `Error` protocol.
    #[must_use]
    pub fn error() -> Protocol {
        Self::special_singleton(
            &ERROR,
            "Error",
            ProtocolFlags {
                class_bound: false,
                dispatch: DispatchStrategy::WitnessTable,
                special: SpecialProtocol::Error,
            },
        )
    }

    /// Looks up a registered protocol by qualified name.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Protocol> {
        registry().protocols.read().unwrap().get(name).copied()
    }

    /// Unqualified name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.inner.name
    }

    /// Defining module, if any.
    #[must_use]
    pub fn module(self) -> Option<&'static str> {
        self.inner.module
    }

    /// Static flags.
    #[must_use]
    pub fn flags(self) -> ProtocolFlags {
        self.inner.flags
    }

    /// Witness table slot names in order.
    #[must_use]
    pub fn requirements(self) -> &'static [&'static str] {
        &self.inner.requirements
    }

    /// Slot index of a requirement.
    #[must_use]
    pub fn requirement_index(self, requirement: &str) -> Option<usize> {
        self.inner
            .requirements
            .iter()
            .position(|r| *r == requirement)
    }

    /// Whether conformance produces a witness table.
    #[must_use]
    pub fn needs_witness_table(self) -> bool {
        self.inner.flags.dispatch == DispatchStrategy::WitnessTable
    }

    /// Whether conforming values must be class instances.
    #[must_use]
    pub fn is_class_bound(self) -> bool {
        self.inner.flags.class_bound
    }

    /// Built-in role.
    #[must_use]
    pub fn special(self) -> SpecialProtocol {
        self.inner.flags.special
    }

    fn addr(self) -> usize {
        std::ptr::from_ref(self.inner).addr()
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Protocol {}

impl Hash for Protocol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("name", &self.name())
            .field("flags", &self.flags())
            .finish()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
