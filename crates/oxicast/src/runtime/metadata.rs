//! Runtime type descriptors.
//!
//! Every runtime type is described by exactly one immutable [`Metadata`]
//! record allocated in the global metadata arena. Records are handled
//! through the copyable [`Type`] handle, whose equality is pointer identity.
//!
//! # Kinds
//!
//! [`Metadata`] is a sum type with one variant per [`Kind`]. Each variant
//! carries only the fields that make sense for it, so code inside the cast
//! engine reaches kind-specific data by pattern matching. The checked
//! accessors on [`Type`] (for example [`Type::superclass`]) exist for callers
//! that already know the kind; using one on the wrong kind is a broken
//! invariant and panics with a corrupt-descriptor message.
//!
//! # Uniquing
//!
//! Structural types (optionals, tuples, functions, existentials, metatypes,
//! class wrappers) are uniqued through a process-wide registry, so building
//! the same structure twice yields the identical descriptor. Nominal types
//! (classes, structs, enums, foreign classes, opaque types) are registered by
//! qualified name and creating one twice is an error.
//!
//! # Example
//!
//! ```
//! use oxicast::runtime::{Kind, Type};
//!
//! let shape = Type::new_class("Docs.MetadataShape", None).unwrap();
//! let circle = Type::new_class("Docs.MetadataCircle", Some(shape)).unwrap();
//!
//! assert_eq!(circle.kind(), Kind::Class);
//! assert_eq!(circle.superclass(), Some(shape));
//! assert_eq!(Type::optional(circle), Type::optional(circle));
//! ```

use crate::error::{Error, Result};
use crate::runtime::protocol::{Protocol, SpecialProtocol};
use fxhash::FxHashMap;
use oxicast_log::debug;
use oxicast_mem::global_arena;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, RwLock};

/// Closed set of type-representation kinds.
///
/// The discriminants are the raw tag values used at the external boundary;
/// see [`Kind::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Kind {
    /// A native class.
    Class = 0,
    /// A struct.
    Struct = 0x200,
    /// A non-optional enum.
    Enum = 0x201,
    /// The optional enum.
    Optional = 0x202,
    /// An externally defined reference type.
    ForeignClass = 0x203,
    /// A type with no further structure known to the runtime.
    Opaque = 0x300,
    /// A tuple.
    Tuple = 0x301,
    /// A function type.
    Function = 0x302,
    /// A protocol existential.
    Existential = 0x303,
    /// The type of a type.
    Metatype = 0x304,
    /// A class of the foreign object system presented as type metadata.
    ClassWrapper = 0x305,
    /// An existential metatype (`P.Type`).
    ExistentialMetatype = 0x306,
    /// A heap box for a captured local variable.
    HeapLocalVariable = 0x400,
    /// A heap box for a captured local variable of generic type.
    HeapGenericLocalVariable = 0x500,
    /// The native error box object.
    ErrorObject = 0x501,
}

impl Kind {
    const ALL: [Kind; 15] = [
        Kind::Class,
        Kind::Struct,
        Kind::Enum,
        Kind::Optional,
        Kind::ForeignClass,
        Kind::Opaque,
        Kind::Tuple,
        Kind::Function,
        Kind::Existential,
        Kind::Metatype,
        Kind::ClassWrapper,
        Kind::ExistentialMetatype,
        Kind::HeapLocalVariable,
        Kind::HeapGenericLocalVariable,
        Kind::ErrorObject,
    ];

    /// Maps a raw tag value to a kind, or `None` if the tag is not part of
    /// the closed set.
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Kind> {
        Self::ALL.into_iter().find(|kind| *kind as u32 == raw)
    }

    /// Maps a raw tag value to a kind.
    ///
    /// # Panics
    ///
    /// Panics with a corrupt-descriptor message if `raw` is not a known tag.
    /// An unknown tag means the descriptor memory is broken, which no caller
    /// can recover from.
    #[must_use]
    pub fn from_raw_checked(raw: u32) -> Kind {
        match Self::from_raw(raw) {
            Some(kind) => kind,
            None => panic!("corrupt type descriptor: unknown kind tag {raw:#x}"),
        }
    }

    /// Returns the raw tag value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Class, class wrapper or foreign class.
    #[must_use]
    pub const fn is_class_family(self) -> bool {
        matches!(self, Kind::Class | Kind::ClassWrapper | Kind::ForeignClass)
    }
}

/// Where a class was defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClassOrigin {
    /// Defined by this runtime.
    #[default]
    Native,
    /// Defined by the foreign object system. Instances report the class
    /// wrapper as their dynamic type.
    Foreign,
}

/// Fields of a class descriptor.
#[derive(Debug)]
pub struct ClassMetadata {
    name: &'static str,
    module: Option<&'static str>,
    superclass: Option<Type>,
    origin: ClassOrigin,
}

impl ClassMetadata {
    /// Unqualified class name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Defining module, if any.
    #[must_use]
    pub fn module(&self) -> Option<&'static str> {
        self.module
    }

    /// Direct superclass, or `None` for a root class.
    #[must_use]
    pub fn superclass(&self) -> Option<Type> {
        self.superclass
    }

    /// Where the class was defined.
    #[must_use]
    pub fn origin(&self) -> ClassOrigin {
        self.origin
    }
}

/// Fields shared by struct and enum descriptors.
#[derive(Debug)]
pub struct NominalMetadata {
    name: &'static str,
    module: Option<&'static str>,
    generic_args: Vec<Type>,
}

impl NominalMetadata {
    /// Unqualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Defining module, if any.
    #[must_use]
    pub fn module(&self) -> Option<&'static str> {
        self.module
    }

    /// Generic arguments in declaration order.
    #[must_use]
    pub fn generic_args(&self) -> &[Type] {
        &self.generic_args
    }
}

/// Fields of an optional descriptor.
#[derive(Debug)]
pub struct OptionalMetadata {
    payload: Type,
}

impl OptionalMetadata {
    /// The wrapped type.
    #[must_use]
    pub fn payload(&self) -> Type {
        self.payload
    }
}

/// Fields of a foreign class descriptor.
#[derive(Debug)]
pub struct ForeignClassMetadata {
    name: &'static str,
    superclass: Option<Type>,
}

impl ForeignClassMetadata {
    /// Class name as known to the foreign system.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct superclass, or `None` for a root class.
    #[must_use]
    pub fn superclass(&self) -> Option<Type> {
        self.superclass
    }
}

/// Fields of an opaque descriptor.
#[derive(Debug)]
pub struct OpaqueMetadata {
    name: &'static str,
}

impl OpaqueMetadata {
    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Fields of a tuple descriptor.
#[derive(Debug)]
pub struct TupleMetadata {
    elements: Vec<Type>,
}

impl TupleMetadata {
    /// Element types in order.
    #[must_use]
    pub fn elements(&self) -> &[Type] {
        &self.elements
    }
}

/// Calling convention of a function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunctionConvention {
    /// Thick native function with a context.
    #[default]
    Native,
    /// Native function without a context.
    Thin,
    /// Foreign block object.
    Block,
    /// Bare C function pointer.
    CFunctionPointer,
}

/// One parameter of a function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionParam {
    /// Parameter type.
    pub ty: Type,
    /// Whether the parameter is passed `inout`.
    pub inout: bool,
}

impl FunctionParam {
    /// A by-value parameter.
    #[must_use]
    pub fn value(ty: Type) -> Self {
        FunctionParam { ty, inout: false }
    }

    /// An `inout` parameter.
    #[must_use]
    pub fn inout(ty: Type) -> Self {
        FunctionParam { ty, inout: true }
    }
}

/// Fields of a function descriptor.
#[derive(Debug)]
pub struct FunctionMetadata {
    convention: FunctionConvention,
    throws: bool,
    params: Vec<FunctionParam>,
    result: Type,
}

impl FunctionMetadata {
    /// Calling convention.
    #[must_use]
    pub fn convention(&self) -> FunctionConvention {
        self.convention
    }

    /// Whether the function may throw.
    #[must_use]
    pub fn throws(&self) -> bool {
        self.throws
    }

    /// Parameters in order.
    #[must_use]
    pub fn params(&self) -> &[FunctionParam] {
        &self.params
    }

    /// Result type.
    #[must_use]
    pub fn result(&self) -> Type {
        self.result
    }
}

/// Physical layout of an existential container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExistentialRepresentation {
    /// One object reference plus witness tables.
    Class,
    /// A value buffer, the stored type and witness tables.
    Opaque,
    /// A single shared error box.
    ErrorBox,
}

/// Fields of an existential descriptor.
#[derive(Debug)]
pub struct ExistentialMetadata {
    protocols: Vec<Protocol>,
    representation: ExistentialRepresentation,
}

impl ExistentialMetadata {
    fn new(protocols: Vec<Protocol>) -> Self {
        let representation = match protocols.as_slice() {
            [only] if only.special() == SpecialProtocol::Error => {
                ExistentialRepresentation::ErrorBox
            }
            list if list.iter().any(|p| p.is_class_bound()) => {
                ExistentialRepresentation::Class
            }
            _ => ExistentialRepresentation::Opaque,
        };

        ExistentialMetadata {
            protocols,
            representation,
        }
    }

    /// Required protocols in declaration order.
    #[must_use]
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    /// Container layout, fixed by the protocol list.
    #[must_use]
    pub fn representation(&self) -> ExistentialRepresentation {
        self.representation
    }

    /// Number of witness tables a container of this type carries.
    #[must_use]
    pub fn witness_table_count(&self) -> usize {
        self.protocols
            .iter()
            .filter(|p| p.needs_witness_table())
            .count()
    }

    /// True for a class-bounded existential composed only of foreign
    /// marker protocols (and possibly `AnyObject`).
    #[must_use]
    pub fn is_foreign_object_existential(&self) -> bool {
        self.representation == ExistentialRepresentation::Class
            && self
                .protocols
                .iter()
                .all(|p| !p.needs_witness_table())
    }
}

/// Fields of a metatype descriptor.
#[derive(Debug)]
pub struct MetatypeMetadata {
    instance: Type,
}

impl MetatypeMetadata {
    /// The type this metatype describes.
    #[must_use]
    pub fn instance(&self) -> Type {
        self.instance
    }
}

/// Fields of a class wrapper descriptor.
#[derive(Debug)]
pub struct ClassWrapperMetadata {
    class: Type,
}

impl ClassWrapperMetadata {
    /// The wrapped class descriptor.
    #[must_use]
    pub fn class(&self) -> Type {
        self.class
    }
}

/// Fields of an existential metatype descriptor.
#[derive(Debug)]
pub struct ExistentialMetatypeMetadata {
    instance: Type,
}

impl ExistentialMetatypeMetadata {
    /// The existential (or nested existential metatype) this describes.
    #[must_use]
    pub fn instance(&self) -> Type {
        self.instance
    }
}

/// A runtime type descriptor.
#[derive(Debug)]
pub enum Metadata {
    Class(ClassMetadata),
    Struct(NominalMetadata),
    Enum(NominalMetadata),
    Optional(OptionalMetadata),
    ForeignClass(ForeignClassMetadata),
    Opaque(OpaqueMetadata),
    Tuple(TupleMetadata),
    Function(FunctionMetadata),
    Existential(ExistentialMetadata),
    Metatype(MetatypeMetadata),
    ClassWrapper(ClassWrapperMetadata),
    ExistentialMetatype(ExistentialMetatypeMetadata),
    HeapLocalVariable,
    HeapGenericLocalVariable,
    ErrorObject,
}

impl Metadata {
    /// The kind tag of this descriptor.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Metadata::Class(_) => Kind::Class,
            Metadata::Struct(_) => Kind::Struct,
            Metadata::Enum(_) => Kind::Enum,
            Metadata::Optional(_) => Kind::Optional,
            Metadata::ForeignClass(_) => Kind::ForeignClass,
            Metadata::Opaque(_) => Kind::Opaque,
            Metadata::Tuple(_) => Kind::Tuple,
            Metadata::Function(_) => Kind::Function,
            Metadata::Existential(_) => Kind::Existential,
            Metadata::Metatype(_) => Kind::Metatype,
            Metadata::ClassWrapper(_) => Kind::ClassWrapper,
            Metadata::ExistentialMetatype(_) => Kind::ExistentialMetatype,
            Metadata::HeapLocalVariable => Kind::HeapLocalVariable,
            Metadata::HeapGenericLocalVariable => Kind::HeapGenericLocalVariable,
            Metadata::ErrorObject => Kind::ErrorObject,
        }
    }
}

/// Identity-compared handle to a runtime type descriptor.
#[derive(Clone, Copy)]
pub struct Type {
    inner: &'static Metadata,
}

impl Type {
    // ====================================================================
    // Nominal constructors
    // ====================================================================

    /// Registers a native class. `name` may be qualified as `Module.Name`.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeAlreadyExists`] if the qualified name is taken
    /// - [`Error::KindMismatch`] if `superclass` is not a native class
    pub fn new_class(name: &str, superclass: Option<Type>) -> Result<Type> {
        Self::register_class(name, superclass, ClassOrigin::Native)
    }

    /// Registers a class owned by the foreign object system.
    ///
    /// # Errors
    ///
    /// Same as [`Type::new_class`].
    pub fn new_foreign_object_class(
        name: &str,
        superclass: Option<Type>,
    ) -> Result<Type> {
        Self::register_class(name, superclass, ClassOrigin::Foreign)
    }

    fn register_class(
        name: &str,
        superclass: Option<Type>,
        origin: ClassOrigin,
    ) -> Result<Type> {
        if let Some(parent) = superclass {
            expect_kind(parent, Kind::Class)?;
        }

        let (module, short) = split_qualified(name);
        registry().register(TypeKey::Nominal(name.to_string(), Vec::new()), || {
            Metadata::Class(ClassMetadata {
                name: short,
                module,
                superclass,
                origin,
            })
        })
    }

    /// Registers an externally defined reference type.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeAlreadyExists`] if the name is taken
    /// - [`Error::KindMismatch`] if `superclass` is not a foreign class
    pub fn new_foreign_class(name: &str, superclass: Option<Type>) -> Result<Type> {
        if let Some(parent) = superclass {
            expect_kind(parent, Kind::ForeignClass)?;
        }

        let short = intern_str(name);
        registry().register(TypeKey::Nominal(name.to_string(), Vec::new()), || {
            Metadata::ForeignClass(ForeignClassMetadata {
                name: short,
                superclass,
            })
        })
    }

    /// Registers a non-generic struct.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeAlreadyExists`] if the qualified name is taken.
    pub fn new_struct(name: &str) -> Result<Type> {
        Self::new_generic_struct(name, &[])
    }

    /// Registers a struct instantiated with `generic_args`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeAlreadyExists`] if the same name and arguments
    /// were already registered.
    pub fn new_generic_struct(name: &str, generic_args: &[Type]) -> Result<Type> {
        let (module, short) = split_qualified(name);
        registry().register(
            TypeKey::Nominal(name.to_string(), generic_args.to_vec()),
            || {
                Metadata::Struct(NominalMetadata {
                    name: short,
                    module,
                    generic_args: generic_args.to_vec(),
                })
            },
        )
    }

    /// Registers a non-optional enum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeAlreadyExists`] if the qualified name is taken.
    pub fn new_enum(name: &str) -> Result<Type> {
        let (module, short) = split_qualified(name);
        registry().register(TypeKey::Nominal(name.to_string(), Vec::new()), || {
            Metadata::Enum(NominalMetadata {
                name: short,
                module,
                generic_args: Vec::new(),
            })
        })
    }

    /// Registers an opaque type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeAlreadyExists`] if the name is taken.
    pub fn new_opaque(name: &str) -> Result<Type> {
        let short = intern_str(name);
        registry().register(TypeKey::Nominal(name.to_string(), Vec::new()), || {
            Metadata::Opaque(OpaqueMetadata { name: short })
        })
    }

    /// Looks up a registered non-generic nominal type by qualified name.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Type> {
        registry().lookup(&TypeKey::Nominal(name.to_string(), Vec::new()))
    }

    // ====================================================================
    // Structural constructors (uniqued)
    // ====================================================================

    /// `Optional<payload>`.
    #[must_use]
    pub fn optional(payload: Type) -> Type {
        registry().intern(TypeKey::Optional(payload), || {
            Metadata::Optional(OptionalMetadata { payload })
        })
    }

    /// A tuple of `elements`.
    #[must_use]
    pub fn tuple(elements: &[Type]) -> Type {
        registry().intern(TypeKey::Tuple(elements.to_vec()), || {
            Metadata::Tuple(TupleMetadata {
                elements: elements.to_vec(),
            })
        })
    }

    /// A function type.
    #[must_use]
    pub fn function(
        convention: FunctionConvention,
        params: &[FunctionParam],
        result: Type,
        throws: bool,
    ) -> Type {
        let key = TypeKey::Function {
            convention,
            throws,
            params: params.to_vec(),
            result,
        };
        registry().intern(key, || {
            Metadata::Function(FunctionMetadata {
                convention,
                throws,
                params: params.to_vec(),
                result,
            })
        })
    }

    /// An existential over `protocols`, in declaration order.
    #[must_use]
    pub fn existential(protocols: &[Protocol]) -> Type {
        registry().intern(TypeKey::Existential(protocols.to_vec()), || {
            Metadata::Existential(ExistentialMetadata::new(protocols.to_vec()))
        })
    }

    /// The empty existential, `Any`.
    #[must_use]
    pub fn any() -> Type {
        Self::existential(&[])
    }

    /// The `AnyObject` existential.
    #[must_use]
    pub fn any_object() -> Type {
        Self::existential(&[Protocol::any_object()])
    }

    /// The `Error` existential (error-box representation).
    #[must_use]
    pub fn error_existential() -> Type {
        Self::existential(&[Protocol::error()])
    }

    /// The metatype of `instance`.
    #[must_use]
    pub fn metatype(instance: Type) -> Type {
        registry().intern(TypeKey::Metatype(instance), || {
            Metadata::Metatype(MetatypeMetadata { instance })
        })
    }

    /// The existential metatype whose instance is `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] unless `instance` is an existential or
    /// another existential metatype.
    pub fn existential_metatype(instance: Type) -> Result<Type> {
        match instance.kind() {
            Kind::Existential | Kind::ExistentialMetatype => {
                Ok(registry().intern(TypeKey::ExistentialMetatype(instance), || {
                    Metadata::ExistentialMetatype(ExistentialMetatypeMetadata {
                        instance,
                    })
                }))
            }
            found => Err(Error::KindMismatch {
                expected: "existential or existential metatype",
                found,
            }),
        }
    }

    /// The wrapper presenting a foreign-object class as type metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] unless `class` is a class.
    pub fn class_wrapper(class: Type) -> Result<Type> {
        expect_kind(class, Kind::Class)?;
        Ok(registry().intern(TypeKey::ClassWrapper(class), || {
            Metadata::ClassWrapper(ClassWrapperMetadata { class })
        }))
    }

    /// The native error box object type.
    #[must_use]
    pub fn error_object() -> Type {
        registry().intern(TypeKey::Singleton(Kind::ErrorObject), || {
            Metadata::ErrorObject
        })
    }

    /// Heap box for a captured local variable.
    #[must_use]
    pub fn heap_local_variable() -> Type {
        registry().intern(TypeKey::Singleton(Kind::HeapLocalVariable), || {
            Metadata::HeapLocalVariable
        })
    }

    /// Heap box for a captured generic local variable.
    #[must_use]
    pub fn heap_generic_local_variable() -> Type {
        registry().intern(
            TypeKey::Singleton(Kind::HeapGenericLocalVariable),
            || Metadata::HeapGenericLocalVariable,
        )
    }

    // ====================================================================
    // Identity and kind
    // ====================================================================

    /// The descriptor this handle refers to.
    #[must_use]
    pub fn metadata(self) -> &'static Metadata {
        self.inner
    }

    /// The kind tag.
    #[must_use]
    pub fn kind(self) -> Kind {
        self.inner.kind()
    }

    /// Descriptor address, used in diagnostics.
    #[must_use]
    pub fn addr(self) -> usize {
        std::ptr::from_ref(self.inner).addr()
    }

    // ====================================================================
    // Checked accessors
    // ====================================================================

    /// Superclass of a class or foreign class. A class wrapper answers for
    /// its wrapped class.
    ///
    /// # Panics
    ///
    /// Panics on any other kind.
    #[must_use]
    pub fn superclass(self) -> Option<Type> {
        match self.inner {
            Metadata::Class(class) => class.superclass,
            Metadata::ForeignClass(class) => class.superclass,
            Metadata::ClassWrapper(wrapper) => wrapper.class.superclass(),
            _ => self.wrong_kind("superclass"),
        }
    }

    /// Payload of an optional.
    ///
    /// # Panics
    ///
    /// Panics unless this is an optional.
    #[must_use]
    pub fn payload(self) -> Type {
        match self.inner {
            Metadata::Optional(optional) => optional.payload,
            _ => self.wrong_kind("payload"),
        }
    }

    /// Elements of a tuple.
    ///
    /// # Panics
    ///
    /// Panics unless this is a tuple.
    #[must_use]
    pub fn elements(self) -> &'static [Type] {
        match self.inner {
            Metadata::Tuple(tuple) => &tuple.elements,
            _ => self.wrong_kind("elements"),
        }
    }

    /// Protocols of an existential.
    ///
    /// # Panics
    ///
    /// Panics unless this is an existential.
    #[must_use]
    pub fn protocols(self) -> &'static [Protocol] {
        match self.inner {
            Metadata::Existential(existential) => &existential.protocols,
            _ => self.wrong_kind("protocols"),
        }
    }

    /// Container layout of an existential.
    ///
    /// # Panics
    ///
    /// Panics unless this is an existential.
    #[must_use]
    pub fn representation(self) -> ExistentialRepresentation {
        match self.inner {
            Metadata::Existential(existential) => existential.representation,
            _ => self.wrong_kind("representation"),
        }
    }

    /// Instance type of a metatype or existential metatype.
    ///
    /// # Panics
    ///
    /// Panics on any other kind.
    #[must_use]
    pub fn instance_type(self) -> Type {
        match self.inner {
            Metadata::Metatype(metatype) => metatype.instance,
            Metadata::ExistentialMetatype(metatype) => metatype.instance,
            _ => self.wrong_kind("instance_type"),
        }
    }

    /// Class wrapped by a class wrapper.
    ///
    /// # Panics
    ///
    /// Panics unless this is a class wrapper.
    #[must_use]
    pub fn wrapped_class(self) -> Type {
        match self.inner {
            Metadata::ClassWrapper(wrapper) => wrapper.class,
            _ => self.wrong_kind("wrapped_class"),
        }
    }

    /// Signature of a function type.
    ///
    /// # Panics
    ///
    /// Panics unless this is a function type.
    #[must_use]
    pub fn signature(self) -> &'static FunctionMetadata {
        match self.inner {
            Metadata::Function(function) => function,
            _ => self.wrong_kind("signature"),
        }
    }

    #[cold]
    fn wrong_kind(self, accessor: &str) -> ! {
        panic!(
            "corrupt type descriptor: {accessor} requested from {:?} metadata at {:#x}",
            self.kind(),
            self.addr()
        )
    }

    // ====================================================================
    // Class helpers
    // ====================================================================

    /// Strips a class wrapper, returning the class it wraps. Every other
    /// type is returned unchanged.
    #[must_use]
    pub fn unwrap_class_wrapper(self) -> Type {
        match self.inner {
            Metadata::ClassWrapper(wrapper) => wrapper.class,
            _ => self,
        }
    }

    /// Superclass link used by ancestry walks, or `None` for kinds that have
    /// no superclass.
    pub(crate) fn superclass_link(self) -> Option<Type> {
        match self.inner {
            Metadata::Class(class) => class.superclass,
            Metadata::ForeignClass(class) => class.superclass,
            _ => None,
        }
    }

    /// True if `self` is `ancestor` or inherits from it. Class wrappers on
    /// either side are looked through.
    #[must_use]
    pub fn is_subclass_of(self, ancestor: Type) -> bool {
        let ancestor = ancestor.unwrap_class_wrapper();
        let mut current = Some(self.unwrap_class_wrapper());

        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = class.superclass_link();
        }

        false
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type({} @ {:#x})",
            crate::runtime::names::type_name(*self, true),
            self.addr()
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::runtime::names::type_name(*self, false))
    }
}

/// True if `ty` is a class, class wrapper or foreign class.
#[must_use]
pub fn is_class_type(ty: Type) -> bool {
    ty.kind().is_class_family()
}

/// True if `ty` is an optional.
#[must_use]
pub fn is_optional_type(ty: Type) -> bool {
    ty.kind() == Kind::Optional
}

/// True if values of `ty` are always single object references: class-family
/// types, foreign-object existentials and block functions.
#[must_use]
pub fn is_class_or_object_existential_type(ty: Type) -> bool {
    match ty.metadata() {
        Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => {
            true
        }
        Metadata::Existential(existential) => {
            existential.is_foreign_object_existential()
        }
        Metadata::Function(function) => {
            function.convention == FunctionConvention::Block
        }
        _ => false,
    }
}

/// Superclass of a class-family type, or `None` for roots and non-classes.
#[must_use]
pub fn class_superclass(ty: Type) -> Option<Type> {
    ty.unwrap_class_wrapper().superclass_link()
}

// ========================================================================
// Registry
// ========================================================================

#[derive(Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Nominal(String, Vec<Type>),
    Optional(Type),
    Tuple(Vec<Type>),
    Function {
        convention: FunctionConvention,
        throws: bool,
        params: Vec<FunctionParam>,
        result: Type,
    },
    Existential(Vec<Protocol>),
    Metatype(Type),
    ExistentialMetatype(Type),
    ClassWrapper(Type),
    Singleton(Kind),
}

/// Process-wide descriptor registry. Append-only; lives for the process.
struct TypeRegistry {
    types: RwLock<FxHashMap<TypeKey, Type>>,
}

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

fn registry() -> &'static TypeRegistry {
    REGISTRY.get_or_init(|| TypeRegistry {
        types: RwLock::new(FxHashMap::default()),
    })
}

impl TypeRegistry {
    fn lookup(&self, key: &TypeKey) -> Option<Type> {
        self.types.read().unwrap().get(key).copied()
    }

    /// Returns the descriptor for `key`, building it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the metadata arena cannot grow.
    fn intern(&self, key: TypeKey, build: impl FnOnce() -> Metadata) -> Type {
        if let Some(ty) = self.lookup(&key) {
            return ty;
        }

        let mut types = self.types.write().unwrap();

        // Another thread may have built it while we waited for the lock.
        if let Some(ty) = types.get(&key) {
            return *ty;
        }

        let ty = Type {
            inner: global_arena().alloc(build()),
        };
        types.insert(key, ty);
        ty
    }

    fn register(
        &self,
        key: TypeKey,
        build: impl FnOnce() -> Metadata,
    ) -> Result<Type> {
        let mut types = self.types.write().unwrap();

        if types.contains_key(&key) {
            let name = match &key {
                TypeKey::Nominal(name, _) => name.clone(),
                _ => String::new(),
            };
            return Err(Error::TypeAlreadyExists { name });
        }

        let metadata = build();
        let inner = global_arena()
            .try_alloc(metadata)
            .map_err(|err| Error::ArenaAllocationFailed {
                requested: err.requested,
            })?;
        let ty = Type { inner };

        debug!("registered {:?} type {:#x}", ty.kind(), ty.addr());
        types.insert(key, ty);
        Ok(ty)
    }
}

fn expect_kind(ty: Type, expected: Kind) -> Result<()> {
    if ty.kind() == expected {
        Ok(())
    } else {
        Err(Error::KindMismatch {
            expected: kind_label(expected),
            found: ty.kind(),
        })
    }
}

fn kind_label(kind: Kind) -> &'static str {
    match kind {
        Kind::Class => "class",
        Kind::ForeignClass => "foreign class",
        _ => "type",
    }
}

fn intern_str(text: &str) -> &'static str {
    global_arena().alloc_str(text)
}

/// Splits `Module.Name` at the last dot.
fn split_qualified(name: &str) -> (Option<&'static str>, &'static str) {
    match name.rsplit_once('.') {
        Some((module, short)) if !module.is_empty() && !short.is_empty() => {
            (Some(intern_str(module)), intern_str(short))
        }
        _ => (None, intern_str(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn unique(prefix: &str) -> String {
        format!("MetaTest.{prefix}{}", NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn test_kind_raw_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(Kind::from_raw(0xdead), None);
    }

    #[test]
    #[should_panic(expected = "corrupt type descriptor")]
    fn test_unknown_raw_kind_is_fatal() {
        let _ = Kind::from_raw_checked(0x7777);
    }

    #[test]
    fn test_class_family() {
        assert!(Kind::Class.is_class_family());
        assert!(Kind::ClassWrapper.is_class_family());
        assert!(Kind::ForeignClass.is_class_family());
        assert!(!Kind::Struct.is_class_family());
        assert!(!Kind::Existential.is_class_family());
    }

    #[test]
    fn test_duplicate_nominal_is_error() {
        let name = unique("Dup");
        Type::new_struct(&name).unwrap();

        assert_eq!(
            Type::new_struct(&name),
            Err(Error::TypeAlreadyExists { name: name.clone() })
        );
        assert!(Type::lookup(&name).is_some());
    }

    #[test]
    fn test_qualified_name_split() {
        let ty = Type::new_struct(&unique("Point")).unwrap();
        match ty.metadata() {
            Metadata::Struct(nominal) => {
                assert_eq!(nominal.module(), Some("MetaTest"));
                assert!(nominal.name().starts_with("Point"));
            }
            other => panic!("unexpected metadata {other:?}"),
        }
    }

    #[test]
    fn test_structural_uniquing() {
        let int = Type::new_struct(&unique("Int")).unwrap();
        let text = Type::new_struct(&unique("Text")).unwrap();

        assert_eq!(Type::optional(int), Type::optional(int));
        assert_ne!(Type::optional(int), Type::optional(text));
        assert_eq!(Type::tuple(&[int, text]), Type::tuple(&[int, text]));
        assert_ne!(Type::tuple(&[int, text]), Type::tuple(&[text, int]));
        assert_eq!(Type::metatype(int), Type::metatype(int));

        let plain = Type::function(
            FunctionConvention::Native,
            &[FunctionParam::value(int)],
            text,
            false,
        );
        let throwing = Type::function(
            FunctionConvention::Native,
            &[FunctionParam::value(int)],
            text,
            true,
        );
        assert_ne!(plain, throwing);
        assert!(throwing.signature().throws());
    }

    #[test]
    fn test_superclass_must_be_class() {
        let value = Type::new_struct(&unique("NotAClass")).unwrap();
        assert_eq!(
            Type::new_class(&unique("Child"), Some(value)),
            Err(Error::KindMismatch {
                expected: "class",
                found: Kind::Struct,
            })
        );
    }

    #[test]
    fn test_ancestry() {
        let a = Type::new_class(&unique("A"), None).unwrap();
        let b = Type::new_class(&unique("B"), Some(a)).unwrap();
        let c = Type::new_class(&unique("C"), Some(b)).unwrap();

        assert!(c.is_subclass_of(a));
        assert!(c.is_subclass_of(b));
        assert!(c.is_subclass_of(c));
        assert!(!a.is_subclass_of(b));
        assert_eq!(class_superclass(c), Some(b));
        assert_eq!(class_superclass(a), None);
    }

    #[test]
    fn test_class_wrapper_is_transparent_for_ancestry() {
        let base = Type::new_foreign_object_class(&unique("FBase"), None).unwrap();
        let derived =
            Type::new_foreign_object_class(&unique("FDerived"), Some(base)).unwrap();
        let wrapper = Type::class_wrapper(derived).unwrap();

        assert_eq!(wrapper.kind(), Kind::ClassWrapper);
        assert_eq!(wrapper.wrapped_class(), derived);
        assert!(wrapper.is_subclass_of(base));
        assert_eq!(wrapper.superclass(), Some(base));
        assert!(Type::class_wrapper(Type::any()).is_err());
    }

    #[test]
    fn test_existential_representation() {
        let plain = Protocol::new(&unique("Plain"), &[]).unwrap();
        let bound = Protocol::new_class_bound(&unique("Bound"), &[]).unwrap();

        assert_eq!(Type::any().representation(), ExistentialRepresentation::Opaque);
        assert_eq!(
            Type::any_object().representation(),
            ExistentialRepresentation::Class
        );
        assert_eq!(
            Type::error_existential().representation(),
            ExistentialRepresentation::ErrorBox
        );
        assert_eq!(
            Type::existential(&[plain]).representation(),
            ExistentialRepresentation::Opaque
        );
        assert_eq!(
            Type::existential(&[plain, bound]).representation(),
            ExistentialRepresentation::Class
        );
        assert_eq!(
            Type::existential(&[Protocol::error(), plain]).representation(),
            ExistentialRepresentation::Opaque
        );
    }

    #[test]
    fn test_existential_metatype_requires_existential() {
        let int = Type::new_struct(&unique("EmInt")).unwrap();
        assert!(Type::existential_metatype(int).is_err());

        let any_type = Type::existential_metatype(Type::any()).unwrap();
        let any_type_type = Type::existential_metatype(any_type).unwrap();
        assert_eq!(any_type_type.instance_type(), any_type);
    }

    #[test]
    #[should_panic(expected = "corrupt type descriptor")]
    fn test_wrong_kind_accessor_panics() {
        let ty = Type::new_struct(&unique("Wrong")).unwrap();
        let _ = ty.payload();
    }

    #[test]
    fn test_queries() {
        let class = Type::new_class(&unique("Q"), None).unwrap();
        let value = Type::new_struct(&unique("QS")).unwrap();
        let block = Type::function(FunctionConvention::Block, &[], value, false);

        assert!(is_class_type(class));
        assert!(!is_class_type(value));
        assert!(is_optional_type(Type::optional(value)));
        assert!(is_class_or_object_existential_type(class));
        assert!(is_class_or_object_existential_type(Type::any_object()));
        assert!(is_class_or_object_existential_type(block));
        assert!(!is_class_or_object_existential_type(Type::any()));
    }

    #[test]
    fn test_concurrent_interning_yields_one_descriptor() {
        let base = Type::new_struct(&unique("Conc")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || Type::optional(Type::tuple(&[base, base]))))
            .collect();

        let first = Type::optional(Type::tuple(&[base, base]));
        for handle in handles {
            assert_eq!(handle.join().unwrap(), first);
        }
    }
}
