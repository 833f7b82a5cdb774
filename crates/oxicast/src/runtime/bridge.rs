//! The seam to the foreign object system.
//!
//! Value types may be *bridged*: converted to an object of a foreign class
//! and back. Each bridged type supplies a [`BridgeWitness`]. The
//! [`ObjectBridge`] collects the witnesses and also answers the questions
//! only the foreign system can answer, namely marker-protocol conformance and
//! conversion of native errors to the foreign error class.
//!
//! [`BridgeRegistry`] is the in-process implementation used by default.

use crate::error::{Error, Result};
use crate::runtime::metadata::Type;
use crate::runtime::object::Object;
use crate::runtime::protocol::Protocol;
use crate::runtime::value::{ErrorBox, Value};
use fxhash::{FxHashMap, FxHashSet};
use oxicast_log::debug;
use std::sync::{Arc, OnceLock, RwLock};

/// Conversions between one bridged value type and its foreign class.
pub trait BridgeWitness: Send + Sync {
    /// The foreign class values of `ty` bridge to.
    fn foreign_class(&self, ty: Type) -> Type;

    /// Whether `ty` is currently bridged. Generic bridged types may answer
    /// per instantiation.
    fn is_bridged(&self, _ty: Type) -> bool {
        true
    }

    /// Converts a value to a new object. The value is borrowed.
    fn bridge_to_object(&self, value: &Value, ty: Type) -> Object;

    /// Converts an object back to a value.
    ///
    /// # Panics
    ///
    /// Implementations panic if the object cannot represent a `ty`.
    fn force_bridge_from_object(&self, object: &Object, ty: Type) -> Value;

    /// Converts an object back to a value, or returns `None` if the object
    /// cannot represent a `ty`.
    fn conditionally_bridge_from_object(&self, object: &Object, ty: Type) -> Option<Value>;
}

/// Everything the cast engine asks of the foreign object system.
pub trait ObjectBridge: Send + Sync {
    /// The bridge witness for `ty`, if `ty` is a bridged value type.
    fn witness(&self, ty: Type) -> Option<Arc<dyn BridgeWitness>>;

    /// Marker-protocol conformance of a live object.
    fn object_conforms_to(&self, object: &Object, protocol: Protocol) -> bool;

    /// Marker-protocol conformance of a class.
    fn class_conforms_to(&self, class: Type, protocol: Protocol) -> bool;

    /// The foreign class native errors convert to, if any.
    fn foreign_error_class(&self) -> Option<Type>;

    /// Converts a boxed native error to an instance of the foreign error
    /// class.
    fn bridge_error(&self, error: ErrorBox) -> Option<Object>;
}

/// Converts a boxed error to a foreign error object.
pub type ErrorBridgeFn = fn(ErrorBox) -> Option<Object>;

/// In-process [`ObjectBridge`].
pub struct BridgeRegistry {
    witnesses: RwLock<FxHashMap<Type, Arc<dyn BridgeWitness>>>,
    markers: RwLock<FxHashSet<(Type, Protocol)>>,
    error_bridge: RwLock<Option<(Type, ErrorBridgeFn)>>,
}

impl BridgeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        BridgeRegistry {
            witnesses: RwLock::new(FxHashMap::default()),
            markers: RwLock::new(FxHashSet::default()),
            error_bridge: RwLock::new(None),
        }
    }

    /// Registers the bridge witness for a value type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BridgeAlreadyRegistered`] if `ty` already has one.
    pub fn register(&self, ty: Type, witness: Arc<dyn BridgeWitness>) -> Result<()> {
        let mut witnesses = self.witnesses.write().unwrap();

        if witnesses.contains_key(&ty) {
            return Err(Error::BridgeAlreadyRegistered {
                type_name: ty.to_string(),
            });
        }

        debug!("bridging {ty} to {}", witness.foreign_class(ty));
        witnesses.insert(ty, witness);
        Ok(())
    }

    /// Records that instances of `class` (and its subclasses) carry the
    /// marker `protocol`.
    pub fn declare_marker_conformance(&self, class: Type, protocol: Protocol) {
        self.markers
            .write()
            .unwrap()
            .insert((class.unwrap_class_wrapper(), protocol));
    }

    /// Installs the conversion used for casts to the foreign error class.
    pub fn set_error_bridge(&self, class: Type, convert: ErrorBridgeFn) {
        *self.error_bridge.write().unwrap() = Some((class, convert));
    }

    fn marked(&self, class: Type, protocol: Protocol) -> bool {
        let markers = self.markers.read().unwrap();
        let mut current = Some(class.unwrap_class_wrapper());

        while let Some(candidate) = current {
            if markers.contains(&(candidate, protocol)) {
                return true;
            }
            current = candidate.superclass_link();
        }

        false
    }
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBridge for BridgeRegistry {
    fn witness(&self, ty: Type) -> Option<Arc<dyn BridgeWitness>> {
        self.witnesses.read().unwrap().get(&ty).cloned()
    }

    fn object_conforms_to(&self, object: &Object, protocol: Protocol) -> bool {
        self.marked(object.class(), protocol)
    }

    fn class_conforms_to(&self, class: Type, protocol: Protocol) -> bool {
        self.marked(class, protocol)
    }

    fn foreign_error_class(&self) -> Option<Type> {
        let bridge = *self.error_bridge.read().unwrap();
        bridge.map(|(class, _)| class)
    }

    fn bridge_error(&self, error: ErrorBox) -> Option<Object> {
        let bridge = *self.error_bridge.read().unwrap();
        let (_, convert) = bridge?;
        convert(error)
    }
}

/// Returns the process-wide bridge registry.
pub fn global_bridges() -> Arc<BridgeRegistry> {
    static GLOBAL: OnceLock<Arc<BridgeRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Arc::new(BridgeRegistry::new())).clone()
}
