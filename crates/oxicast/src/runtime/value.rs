//! Runtime values and storage slots.
//!
//! A [`Value`] is the erased representation of an instance of some runtime
//! [`Type`]. Which variant is used follows the declared type's kind: structs
//! and tuples are records, classes are objects, protocol existentials are
//! containers in one of three layouts, and so on. The value itself does not
//! know its type; every operation that interprets a value is handed the type
//! alongside it.
//!
//! Values live in [`Slot`]s. An empty slot is uninitialized or moved-from
//! storage, which is how a cast with `TAKE_ON_SUCCESS` reports that the
//! source has been consumed.

use crate::runtime::conformance::WitnessTable;
use crate::runtime::metadata::Type;
use crate::runtime::object::Object;
use std::fmt;
use std::sync::Arc;

/// An erased runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Trivially copyable scalar bits.
    Bits(u64),
    /// Struct fields or tuple elements in order.
    Record(Vec<Value>),
    /// A non-optional enum case with an optional payload.
    Variant {
        /// Case index.
        case: u32,
        /// Associated value, if the case has one.
        payload: Option<Box<Value>>,
    },
    /// An optional: `None` or `Some(payload)`.
    Optional(Option<Box<Value>>),
    /// A reference to a heap object.
    Object(Object),
    /// A function value.
    Function(FunctionValue),
    /// A type used as a value.
    Metatype(Type),
    /// A protocol existential container.
    Existential(Existential),
    /// An existential metatype value.
    ExistentialMetatype(ExistentialMetatypeValue),
}

impl Value {
    /// An empty optional.
    #[must_use]
    pub fn none() -> Value {
        Value::Optional(None)
    }

    /// A populated optional.
    #[must_use]
    pub fn some(payload: Value) -> Value {
        Value::Optional(Some(Box::new(payload)))
    }

    /// Borrows the object if this is an object reference.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Borrows the container if this is an existential.
    #[must_use]
    pub fn as_existential(&self) -> Option<&Existential> {
        match self {
            Value::Existential(existential) => Some(existential),
            _ => None,
        }
    }

    /// The stored type if this is a metatype or existential metatype value.
    #[must_use]
    pub fn as_metatype(&self) -> Option<Type> {
        match self {
            Value::Metatype(ty) => Some(*ty),
            Value::ExistentialMetatype(metatype) => Some(metatype.ty),
            _ => None,
        }
    }
}

/// Entry point of a function value.
pub type FunctionEntry = fn(&[Value]) -> Value;

/// A function value: an entry point and an optional captured context.
#[derive(Clone)]
pub struct FunctionValue {
    /// The code to run.
    pub entry: FunctionEntry,
    /// Captured context object for thick functions.
    pub context: Option<Object>,
}

impl FunctionValue {
    /// A function without captured context.
    #[must_use]
    pub fn thin(entry: FunctionEntry) -> Self {
        FunctionValue {
            entry,
            context: None,
        }
    }

    /// Calls the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.entry)(args)
    }
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.entry, other.entry) && self.context == other.context
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("entry", &format_args!("{:p}", self.entry as *const ()))
            .field("context", &self.context)
            .finish()
    }
}

/// A protocol existential container.
///
/// The variant always matches the representation of the existential type the
/// container was built for.
#[derive(Debug, Clone, PartialEq)]
pub enum Existential {
    /// Class-bounded: one object reference plus witness tables.
    Class(ClassExistential),
    /// Opaque: a value, its concrete type and witness tables.
    Opaque(Box<OpaqueExistential>),
    /// Error: a shared error box.
    Error(ErrorBox),
}

impl Existential {
    /// Builds a class-bounded container.
    #[must_use]
    pub fn class(object: Object, witnesses: Vec<WitnessTable>) -> Self {
        Existential::Class(ClassExistential { object, witnesses })
    }

    /// Builds an opaque container.
    #[must_use]
    pub fn opaque(ty: Type, value: Value, witnesses: Vec<WitnessTable>) -> Self {
        Existential::Opaque(Box::new(OpaqueExistential {
            ty,
            value,
            witnesses,
        }))
    }

    /// Witness tables carried by the container, in protocol order.
    #[must_use]
    pub fn witnesses(&self) -> &[WitnessTable] {
        match self {
            Existential::Class(class) => &class.witnesses,
            Existential::Opaque(opaque) => &opaque.witnesses,
            Existential::Error(error) => match &error.inner.witness {
                Some(witness) => std::slice::from_ref(witness),
                None => &[],
            },
        }
    }
}

/// Contents of a class-bounded container.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassExistential {
    /// The stored object.
    pub object: Object,
    /// One table per protocol that needs one.
    pub witnesses: Vec<WitnessTable>,
}

/// Contents of an opaque container.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueExistential {
    /// Concrete type of the stored value.
    pub ty: Type,
    /// The stored value.
    pub value: Value,
    /// One table per protocol that needs one.
    pub witnesses: Vec<WitnessTable>,
}

/// Payload of an error box.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorPayload {
    /// A native value of the boxed type.
    Native(Value),
    /// An object of the foreign object system.
    Foreign(Object),
}

#[derive(Debug)]
struct ErrorBoxInner {
    ty: Type,
    witness: Option<WitnessTable>,
    payload: ErrorPayload,
}

/// A shared, reference-counted error box.
///
/// Cloning shares the box. Two boxes compare equal only if they are the same
/// allocation.
#[derive(Debug, Clone)]
pub struct ErrorBox {
    inner: Arc<ErrorBoxInner>,
}

impl ErrorBox {
    /// Allocates a box holding `payload` of type `ty`.
    #[must_use]
    pub fn new(ty: Type, witness: Option<WitnessTable>, payload: ErrorPayload) -> Self {
        ErrorBox {
            inner: Arc::new(ErrorBoxInner {
                ty,
                witness,
                payload,
            }),
        }
    }

    /// Concrete type of the boxed payload.
    #[must_use]
    pub fn ty(&self) -> Type {
        self.inner.ty
    }

    /// The `Error` witness table of the boxed type.
    #[must_use]
    pub fn witness(&self) -> Option<WitnessTable> {
        self.inner.witness
    }

    /// The boxed payload.
    #[must_use]
    pub fn payload(&self) -> &ErrorPayload {
        &self.inner.payload
    }

    /// Number of live references to this box.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl PartialEq for ErrorBox {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Value of an existential metatype (`P.Type`).
#[derive(Debug, Clone, PartialEq)]
pub struct ExistentialMetatypeValue {
    /// The stored concrete type.
    pub ty: Type,
    /// Witness tables of `ty` for the existential's protocols.
    pub witnesses: Vec<WitnessTable>,
}

/// A storage cell for one value.
#[derive(Debug, Default, PartialEq)]
pub struct Slot {
    value: Option<Value>,
}

impl Slot {
    /// A slot initialized with `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Slot { value: Some(value) }
    }

    /// An uninitialized slot.
    #[must_use]
    pub fn empty() -> Self {
        Slot { value: None }
    }

    /// True if the slot holds no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Borrows the stored value.
    #[must_use]
    pub fn get(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Moves the value out, leaving the slot empty.
    pub fn take(&mut self) -> Option<Value> {
        self.value.take()
    }

    /// Initializes the slot. Any previous value is dropped.
    pub(crate) fn init(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Consumes the slot, returning its value.
    #[must_use]
    pub fn into_inner(self) -> Option<Value> {
        self.value
    }
}

/// A borrowed view of a value during a cast.
///
/// Projection steps can land on an object stored inside a container, or on a
/// type recovered from a class object; neither is a standalone [`Value`], so
/// the dispatcher works on this view instead.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ValueRef<'a> {
    Value(&'a Value),
    Object(&'a Object),
    Metatype(Type),
}

impl<'a> ValueRef<'a> {
    pub(crate) fn as_object(self) -> Option<&'a Object> {
        match self {
            ValueRef::Value(Value::Object(object)) | ValueRef::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The type this view stands for as a metatype value. Class objects count
    /// as the metatype of the class they represent.
    pub(crate) fn as_metatype(self) -> Option<Type> {
        match self {
            ValueRef::Metatype(ty) => Some(ty),
            ValueRef::Value(value) => value
                .as_metatype()
                .or_else(|| value.as_object().and_then(Object::represented_class)),
            ValueRef::Object(object) => object.represented_class(),
        }
    }

    pub(crate) fn as_value(self) -> Option<&'a Value> {
        match self {
            ValueRef::Value(value) => Some(value),
            _ => None,
        }
    }
}
