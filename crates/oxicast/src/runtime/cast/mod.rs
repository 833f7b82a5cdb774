//! The dynamic cast engine.
//!
//! [`Caster::dynamic_cast`] converts a value held in a source [`Slot`] from
//! its declared type to a requested target type, writing the result to a
//! destination slot. The cast may unwrap optionals, open and build
//! existential containers, compare metatypes, check function signatures and
//! bridge between value types and foreign classes.
//!
//! # Dispatch Algorithm
//!
//! Resolution is a pure function of the source value and the two types. It
//! picks exactly one rule:
//!
//! 1. Identical types succeed immediately
//! 2. An optional source is wrapped into an existential target if it can
//!    be, otherwise unwrapped (`none` only reaches an optional target)
//! 3. An optional target is built from a cast to its payload
//! 4. Class, existential, metatype, existential-metatype and function
//!    targets each have a dedicated rule
//! 5. Everything else is a value-type target, reachable by opening an
//!    existential source or by bridging from a foreign object
//!
//! The result is a disposition naming the part of the source (or new
//! value) that becomes the result. Only after that does the engine touch the
//! source, as the [`DynamicCastFlags`] say.
//!
//! # Thread Safety
//!
//! A [`Caster`] is `Send + Sync`. All type, conformance and bridge state it
//! reads lives in registries guarded by `RwLock`s; concurrent casts only
//! contend on first-time registration.

mod bridging;
mod class;
mod existential;
mod function;
mod metatype;
mod optional;

pub use function::is_function_compatible;
pub use metatype::cast_metatype_type;

use crate::config::{FatalMode, RuntimeConfig};
use crate::runtime::bridge::{ObjectBridge, global_bridges};
use crate::runtime::conformance::{Conformance, ConformanceResolver, conforms, global_conformances};
use crate::runtime::diagnostics::{AbortSink, CastFailure, DiagnosticSink, PanicSink};
use crate::runtime::flags::DynamicCastFlags;
use crate::runtime::memory::{MemoryManager, NativeMemoryManager};
use crate::runtime::metadata::{Kind, Metadata, Type};
use crate::runtime::object::Object;
use crate::runtime::ownership::{Disposition, transfer_failure, transfer_success};
use crate::runtime::projection::project;
use crate::runtime::protocol::Protocol;
use crate::runtime::value::{Slot, Value, ValueRef};
use oxicast_log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The cast engine and its collaborators.
///
/// # Example
///
/// ```
/// use oxicast::runtime::{Caster, DynamicCastFlags, Object, Slot, Type, Value};
///
/// let view = Type::new_class("Docs.CastView", None).unwrap();
/// let button = Type::new_class("Docs.CastButton", Some(view)).unwrap();
///
/// let caster = Caster::new();
/// let mut src = Slot::new(Value::Object(Object::new(button).unwrap()));
/// let mut dest = Slot::empty();
///
/// assert!(caster.dynamic_cast(&mut dest, &mut src, view, button, DynamicCastFlags::NONE));
/// assert!(!src.is_empty());
/// assert!(dest.get().and_then(Value::as_object).is_some());
/// ```
pub struct Caster {
    resolver: Arc<dyn ConformanceResolver>,
    memory: Arc<dyn MemoryManager>,
    bridge: Arc<dyn ObjectBridge>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Caster {
    /// A caster over the global registries that aborts on fatal failures.
    #[must_use]
    pub fn new() -> Self {
        Caster::builder().build()
    }

    /// Starts a builder with every collaborator at its default.
    #[must_use]
    pub fn builder() -> CasterBuilder {
        CasterBuilder::default()
    }

    /// A caster over the global registries with the fatal sink chosen by
    /// `config`.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let sink: Arc<dyn DiagnosticSink> = match config.fatal_mode {
            FatalMode::Abort => Arc::new(AbortSink),
            FatalMode::Panic => Arc::new(PanicSink),
        };
        Caster::builder().sink(sink).build()
    }

    /// Casts the value in `src`, declared as `src_ty`, to `target`.
    ///
    /// On success `dest` is initialized and `true` is returned. With
    /// `TAKE_ON_SUCCESS` the source slot is consumed, otherwise it is left
    /// untouched. On failure `dest` is left empty and `false` is returned;
    /// `DESTROY_ON_FAILURE` consumes the source first. With `UNCONDITIONAL`
    /// a failure is reported to the diagnostic sink and does not return.
    ///
    /// # Panics
    ///
    /// Panics if `src` is empty.
    pub fn dynamic_cast(
        &self,
        dest: &mut Slot,
        src: &mut Slot,
        src_ty: Type,
        target: Type,
        flags: DynamicCastFlags,
    ) -> bool {
        trace!("dynamic_cast {src_ty} -> {target} ({flags:?})");

        let verdict = match src.get() {
            Some(value) => self.resolve(ValueRef::Value(value), src_ty, target),
            None => panic!("dynamic_cast called with an empty source slot"),
        };

        match verdict {
            Ok(disposition) => {
                transfer_success(dest, src, src_ty, disposition, flags, &*self.memory)
            }
            Err(failure) => {
                debug!("{failure}");
                transfer_failure(src, src_ty, &failure, flags, &*self.memory, &*self.sink)
            }
        }
    }

    /// Decides whether `value` would cast to `target` without touching it.
    ///
    /// # Errors
    ///
    /// Returns the failure a conditional cast would have reported.
    pub fn check_cast(&self, value: &Value, src_ty: Type, target: Type) -> Result<(), CastFailure> {
        self.resolve(ValueRef::Value(value), src_ty, target)
            .map(|_| ())
    }

    /// Casts an object to a class by reference. Returns a new reference on
    /// success.
    #[must_use]
    pub fn cast_class(&self, object: &Object, target: Type) -> Option<Object> {
        (target.kind().is_class_family() && object.class().is_subclass_of(target))
            .then(|| self.memory.retain(object))
    }

    /// Like [`Caster::cast_class`], but a failure is fatal.
    pub fn cast_class_unconditional(&self, object: &Object, target: Type) -> Object {
        match self.cast_class(object, target) {
            Some(object) => object,
            None => self.fatal(CastFailure::impossible(object.dynamic_type(), target)),
        }
    }

    /// Casts a metatype to the metatype of `target`.
    #[must_use]
    pub fn cast_metatype(&self, source: Type, target: Type) -> Option<Type> {
        cast_metatype_type(source, target)
    }

    /// Like [`Caster::cast_metatype`], but a failure is fatal.
    pub fn cast_metatype_unconditional(&self, source: Type, target: Type) -> Type {
        match cast_metatype_type(source, target) {
            Some(ty) => ty,
            None => self.fatal(CastFailure::impossible(source, target)),
        }
    }

    /// The class object standing for `ty`, or `None` if `ty` is not a class.
    #[must_use]
    pub fn metatype_to_object(&self, ty: Type) -> Option<Object> {
        Object::class_object(ty)
    }

    /// Like [`Caster::metatype_to_object`], but a failure is fatal.
    pub fn metatype_to_object_unconditional(&self, ty: Type) -> Object {
        match Object::class_object(ty) {
            Some(object) => object,
            None => self.fatal(
                CastFailure::impossible(Type::metatype(ty), Type::any_object())
                    .with_message("only class metatypes can be converted to AnyObject"),
            ),
        }
    }

    /// The dynamic type of `value`, opening any existential it is held in.
    #[must_use]
    pub fn dynamic_type(&self, value: &Value, ty: Type) -> Type {
        project(ValueRef::Value(value), ty).ty
    }

    /// Checks whether the dynamic type of `value` conforms to `protocol`.
    #[must_use]
    pub fn conforms_to(&self, value: &Value, ty: Type, protocol: Protocol) -> Option<Conformance> {
        let projection = project(ValueRef::Value(value), ty);
        conforms(
            &*self.resolver,
            &*self.bridge,
            projection.value.as_object(),
            projection.ty,
            protocol,
        )
    }

    /// Forces `object` back into a value of bridged type `ty`. Returns
    /// `None` if `ty` is not bridged.
    ///
    /// # Panics
    ///
    /// The bridge witness panics if the object cannot represent a `ty`.
    #[must_use]
    pub fn bridge_from_object(&self, object: &Object, ty: Type) -> Option<Value> {
        let witness = self.bridge.witness(ty).filter(|witness| witness.is_bridged(ty))?;
        Some(witness.force_bridge_from_object(object, ty))
    }

    /// True if values of `ty` bridge to a foreign class.
    #[must_use]
    pub fn is_bridged_to_object(&self, ty: Type) -> bool {
        if ty.kind().is_class_family() {
            return true;
        }
        self.bridge
            .witness(ty)
            .is_some_and(|witness| witness.is_bridged(ty))
    }

    /// The foreign class `ty` bridges to. Classes bridge to themselves.
    #[must_use]
    pub fn bridged_object_type(&self, ty: Type) -> Option<Type> {
        if ty.kind().is_class_family() {
            return Some(ty);
        }
        self.bridge
            .witness(ty)
            .filter(|witness| witness.is_bridged(ty))
            .map(|witness| witness.foreign_class(ty))
    }

    fn fatal(&self, failure: CastFailure) -> ! {
        self.sink.fatal(&failure.report())
    }

    /// Decides a cast without touching the source.
    pub(crate) fn resolve(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        if src_ty == target {
            return Ok(Disposition::identity(src_ty));
        }

        if src_ty.kind() == Kind::Optional {
            return self.from_optional(value, src_ty, target);
        }

        match target.metadata() {
            Metadata::Optional(_) => self.to_optional(value, src_ty, target),
            Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => {
                self.to_class(value, src_ty, target)
            }
            Metadata::Existential(_) => self.to_existential(value, src_ty, target),
            Metadata::Metatype(_) => self.to_metatype(value, src_ty, target),
            Metadata::ExistentialMetatype(_) => {
                self.to_existential_metatype(value, src_ty, target)
            }
            Metadata::Function(_) => self.to_function(value, src_ty, target),
            _ => self.to_value_type(value, src_ty, target),
        }
    }

    /// Struct, enum, tuple and opaque targets.
    fn to_value_type(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        match (src_ty.metadata(), target.metadata()) {
            (
                Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_),
                Metadata::Struct(_) | Metadata::Enum(_),
            ) => self.bridge_object_to_value(value, src_ty, target),
            (Metadata::Existential(_), _) => self.from_existential(value, src_ty, target),
            _ => Err(CastFailure::impossible(src_ty, target)),
        }
    }
}

impl Default for Caster {
    fn default() -> Self {
        Caster::new()
    }
}

impl fmt::Debug for Caster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caster").finish_non_exhaustive()
    }
}

/// Builds a [`Caster`] with replaced collaborators.
#[derive(Default)]
pub struct CasterBuilder {
    resolver: Option<Arc<dyn ConformanceResolver>>,
    memory: Option<Arc<dyn MemoryManager>>,
    bridge: Option<Arc<dyn ObjectBridge>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl CasterBuilder {
    /// Conformance lookup. Defaults to [`global_conformances`].
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn ConformanceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Value lifetime operations. Defaults to [`NativeMemoryManager`].
    #[must_use]
    pub fn memory(mut self, memory: Arc<dyn MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Foreign object bridge. Defaults to [`global_bridges`].
    #[must_use]
    pub fn bridge(mut self, bridge: Arc<dyn ObjectBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Fatal failure reporting. Defaults to [`AbortSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn build(self) -> Caster {
        let resolver: Arc<dyn ConformanceResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => global_conformances(),
        };
        let memory: Arc<dyn MemoryManager> = match self.memory {
            Some(memory) => memory,
            None => Arc::new(NativeMemoryManager),
        };
        let bridge: Arc<dyn ObjectBridge> = match self.bridge {
            Some(bridge) => bridge,
            None => global_bridges(),
        };
        let sink: Arc<dyn DiagnosticSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(AbortSink),
        };

        Caster {
            resolver,
            memory,
            bridge,
            sink,
        }
    }
}

static DEFAULT_CASTER: OnceLock<Caster> = OnceLock::new();

/// The process-wide caster used by the free functions of this module.
///
/// Built on first use from the environment (see [`RuntimeConfig::from_env`]).
/// An invalid environment value is logged and the defaults are used.
pub fn default_caster() -> &'static Caster {
    DEFAULT_CASTER.get_or_init(|| {
        let config = RuntimeConfig::from_env().unwrap_or_else(|err| {
            warn!("{err}; using default runtime configuration");
            RuntimeConfig::default()
        });
        Caster::from_config(&config)
    })
}

/// [`Caster::dynamic_cast`] on the default caster.
pub fn dynamic_cast(
    dest: &mut Slot,
    src: &mut Slot,
    src_ty: Type,
    target: Type,
    flags: DynamicCastFlags,
) -> bool {
    default_caster().dynamic_cast(dest, src, src_ty, target, flags)
}

/// [`Caster::cast_class`] on the default caster.
#[must_use]
pub fn cast_class(object: &Object, target: Type) -> Option<Object> {
    default_caster().cast_class(object, target)
}

/// [`Caster::cast_class_unconditional`] on the default caster.
pub fn cast_class_unconditional(object: &Object, target: Type) -> Object {
    default_caster().cast_class_unconditional(object, target)
}

/// [`Caster::cast_metatype`] on the default caster.
#[must_use]
pub fn cast_metatype(source: Type, target: Type) -> Option<Type> {
    default_caster().cast_metatype(source, target)
}

/// [`Caster::cast_metatype_unconditional`] on the default caster.
pub fn cast_metatype_unconditional(source: Type, target: Type) -> Type {
    default_caster().cast_metatype_unconditional(source, target)
}

/// [`Caster::metatype_to_object`] on the default caster.
#[must_use]
pub fn metatype_to_object(ty: Type) -> Option<Object> {
    default_caster().metatype_to_object(ty)
}

/// [`Caster::metatype_to_object_unconditional`] on the default caster.
pub fn metatype_to_object_unconditional(ty: Type) -> Object {
    default_caster().metatype_to_object_unconditional(ty)
}

/// [`Caster::dynamic_type`] on the default caster.
#[must_use]
pub fn dynamic_type(value: &Value, ty: Type) -> Type {
    default_caster().dynamic_type(value, ty)
}

/// [`Caster::conforms_to`] on the default caster.
#[must_use]
pub fn conforms_to(value: &Value, ty: Type, protocol: Protocol) -> Option<Conformance> {
    default_caster().conforms_to(value, ty, protocol)
}

/// [`Caster::bridge_from_object`] on the default caster.
#[must_use]
pub fn bridge_from_object(object: &Object, ty: Type) -> Option<Value> {
    default_caster().bridge_from_object(object, ty)
}

/// [`Caster::is_bridged_to_object`] on the default caster.
#[must_use]
pub fn is_bridged_to_object(ty: Type) -> bool {
    default_caster().is_bridged_to_object(ty)
}

/// [`Caster::bridged_object_type`] on the default caster.
#[must_use]
pub fn bridged_object_type(ty: Type) -> Option<Type> {
    default_caster().bridged_object_type(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::diagnostics::CastFailureKind;

    fn panicking() -> Caster {
        Caster::builder().sink(Arc::new(PanicSink)).build()
    }

    #[test]
    fn test_identity_cast_copies() {
        let int = Type::new_struct("CastTest.Int").unwrap();
        let mut src = Slot::new(Value::Bits(7));
        let mut dest = Slot::empty();

        assert!(Caster::new().dynamic_cast(&mut dest, &mut src, int, int, DynamicCastFlags::NONE));
        assert_eq!(dest.get(), Some(&Value::Bits(7)));
        assert_eq!(src.get(), Some(&Value::Bits(7)));
    }

    #[test]
    fn test_unrelated_structs_fail() {
        let a = Type::new_struct("CastTest.A").unwrap();
        let b = Type::new_struct("CastTest.B").unwrap();
        let caster = Caster::new();

        let failure = caster.check_cast(&Value::Bits(1), a, b).unwrap_err();
        assert_eq!(failure.kind, CastFailureKind::CastImpossible);
        assert_eq!(failure.source, a);
        assert_eq!(failure.target, b);

        let mut src = Slot::new(Value::Bits(1));
        let mut dest = Slot::empty();
        assert!(!caster.dynamic_cast(&mut dest, &mut src, a, b, DynamicCastFlags::NONE));
        assert!(dest.is_empty());
        assert!(!src.is_empty());
    }

    #[test]
    fn test_cast_class_by_reference() {
        let base = Type::new_class("CastTest.Base", None).unwrap();
        let derived = Type::new_class("CastTest.Derived", Some(base)).unwrap();
        let other = Type::new_class("CastTest.Other", None).unwrap();
        let object = Object::new(derived).unwrap();
        let caster = Caster::new();

        let cast = caster.cast_class(&object, base).unwrap();
        assert_eq!(cast, object);
        assert_eq!(object.refcount(), 2);
        assert!(caster.cast_class(&object, other).is_none());
    }

    #[test]
    #[should_panic(expected = "Could not cast value of type 'CastTest.Lonely'")]
    fn test_cast_class_unconditional_failure() {
        let lonely = Type::new_class("CastTest.Lonely", None).unwrap();
        let target = Type::new_class("CastTest.Elsewhere", None).unwrap();
        let object = Object::new(lonely).unwrap();

        let _ = panicking().cast_class_unconditional(&object, target);
    }

    #[test]
    fn test_metatype_to_object() {
        let class = Type::new_class("CastTest.Meta", None).unwrap();
        let value = Type::new_struct("CastTest.MetaValue").unwrap();
        let caster = Caster::new();

        let object = caster.metatype_to_object(class).unwrap();
        assert_eq!(object.represented_class(), Some(class));
        assert_eq!(caster.metatype_to_object(class).unwrap(), object);
        assert!(caster.metatype_to_object(value).is_none());
    }

    #[test]
    #[should_panic(expected = "only class metatypes can be converted to AnyObject")]
    fn test_metatype_to_object_unconditional_failure() {
        let value = Type::new_struct("CastTest.NotAClass").unwrap();
        let _ = panicking().metatype_to_object_unconditional(value);
    }

    #[test]
    fn test_dynamic_type_opens_existentials() {
        let int = Type::new_struct("CastTest.Opened").unwrap();
        let boxed = Value::Existential(crate::runtime::value::Existential::opaque(
            int,
            Value::Bits(3),
            Vec::new(),
        ));

        assert_eq!(Caster::new().dynamic_type(&boxed, Type::any()), int);
        assert_eq!(Caster::new().dynamic_type(&Value::Bits(3), int), int);
    }

    #[test]
    fn test_from_config_selects_sink() {
        let config = RuntimeConfig {
            fatal_mode: FatalMode::Panic,
            ..RuntimeConfig::default()
        };
        let caster = Caster::from_config(&config);
        let class = Type::new_class("CastTest.Configured", None).unwrap();
        let target = Type::new_class("CastTest.Unrelated", None).unwrap();
        let object = Object::new(class).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            caster.cast_class_unconditional(&object, target)
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_classes_bridge_to_themselves() {
        let class = Type::new_class("CastTest.SelfBridged", None).unwrap();
        let plain = Type::new_struct("CastTest.Unbridged").unwrap();
        let caster = Caster::new();

        assert!(caster.is_bridged_to_object(class));
        assert_eq!(caster.bridged_object_type(class), Some(class));
        assert!(!caster.is_bridged_to_object(plain));
        assert_eq!(caster.bridged_object_type(plain), None);
    }
}
