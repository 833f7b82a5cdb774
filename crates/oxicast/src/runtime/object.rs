//! Reference-counted heap objects.
//!
//! Class instances and class objects are [`Object`]s: a heap allocation
//! holding an isa type, an atomic reference count and an optional payload.
//!
//! # Reference counting
//!
//! - `Object::clone` retains, `Drop` releases
//! - The allocation is freed when the count reaches zero
//! - Retain and release use `AcqRel` ordering, so objects are `Send + Sync`
//!
//! # Class objects
//!
//! Every class has one uniqued class object, obtained with
//! [`Object::class_object`]. Its isa is the class's metatype, which lets the
//! cast engine convert between class metatypes and object references.

use crate::error::{Error, Result};
use crate::runtime::metadata::{ClassOrigin, Kind, Metadata, Type};
use fxhash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{OnceLock, RwLock};

enum Payload {
    Empty,
    Data(Box<dyn Any + Send + Sync>),
    ClassObject(Type),
}

/// Heap representation of an object. Not arena-allocated: each object has
/// its own lifetime controlled by the reference count.
struct RawObject {
    isa: Type,
    refcount: AtomicU32,
    payload: Payload,
}

/// A reference to a heap object.
///
/// # Example
///
/// ```
/// use oxicast::runtime::{Object, Type};
///
/// let class = Type::new_class("Docs.ObjectWidget", None).unwrap();
/// let widget = Object::with_payload(class, 7u32).unwrap();
/// let alias = widget.clone();
///
/// assert_eq!(widget.refcount(), 2);
/// assert_eq!(alias.payload::<u32>(), Some(&7));
/// assert_eq!(widget, alias);
/// ```
pub struct Object {
    ptr: NonNull<RawObject>,
}

impl Object {
    /// Allocates an instance of `class` with refcount 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] unless `class` is a class or foreign
    /// class.
    pub fn new(class: Type) -> Result<Self> {
        Self::allocate(class, Payload::Empty)
    }

    /// Allocates an instance of `class` carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindMismatch`] unless `class` is a class or foreign
    /// class.
    pub fn with_payload<T: Any + Send + Sync>(class: Type, payload: T) -> Result<Self> {
        Self::allocate(class, Payload::Data(Box::new(payload)))
    }

    fn allocate(isa: Type, payload: Payload) -> Result<Self> {
        match isa.kind() {
            Kind::Class | Kind::ForeignClass => Ok(Self::from_raw(isa, payload)),
            found => Err(Error::KindMismatch {
                expected: "class or foreign class",
                found,
            }),
        }
    }

    fn from_raw(isa: Type, payload: Payload) -> Self {
        let raw = Box::new(RawObject {
            isa,
            refcount: AtomicU32::new(1),
            payload,
        });

        Object {
            ptr: NonNull::from(Box::leak(raw)),
        }
    }

    /// Returns the uniqued class object for `class`, or `None` if `class`
    /// is not a class or foreign class (class wrappers are looked through).
    ///
    /// Class objects are never freed: the registry keeps one reference.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn class_object(class: Type) -> Option<Object> {
        static CLASS_OBJECTS: OnceLock<RwLock<FxHashMap<Type, Object>>> =
            OnceLock::new();

        let class = class.unwrap_class_wrapper();
        if !matches!(class.kind(), Kind::Class | Kind::ForeignClass) {
            return None;
        }

        let objects =
            CLASS_OBJECTS.get_or_init(|| RwLock::new(FxHashMap::default()));

        if let Some(object) = objects.read().unwrap().get(&class) {
            return Some(object.clone());
        }

        let mut objects = objects.write().unwrap();
        let object = objects.entry(class).or_insert_with(|| {
            Self::from_raw(Type::metatype(class), Payload::ClassObject(class))
        });
        Some(object.clone())
    }

    pub(crate) fn retain(&self) {
        let old = self.raw().refcount.fetch_add(1, Ordering::AcqRel);
        if old == u32::MAX {
            panic!("Reference count overflow in Object::retain");
        }
    }

    fn release(&self) {
        let old = self.raw().refcount.fetch_sub(1, Ordering::AcqRel);
        if old == 1 {
            // SAFETY: ptr came from Box::leak and this was the last reference.
            unsafe {
                drop(Box::from_raw(self.ptr.as_ptr()));
            }
        }
    }

    fn raw(&self) -> &RawObject {
        // SAFETY: ptr stays valid while any Object referencing it is alive.
        unsafe { self.ptr.as_ref() }
    }

    /// The isa type: the class the object was allocated with, or the
    /// metatype for a class object.
    #[must_use]
    pub fn class(&self) -> Type {
        self.raw().isa
    }

    /// The type the object reports at runtime.
    ///
    /// Instances of foreign-origin classes report the class wrapper.
    #[must_use]
    pub fn dynamic_type(&self) -> Type {
        let isa = self.class();
        match isa.metadata() {
            Metadata::Class(class) if class.origin() == ClassOrigin::Foreign => {
                Type::class_wrapper(isa).unwrap_or(isa)
            }
            _ => isa,
        }
    }

    /// For a class object, the class it stands for.
    #[must_use]
    pub fn represented_class(&self) -> Option<Type> {
        match self.raw().payload {
            Payload::ClassObject(class) => Some(class),
            _ => None,
        }
    }

    /// Borrows the payload if it has type `T`.
    #[must_use]
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match &self.raw().payload {
            Payload::Data(data) => data.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Current reference count. Useful for tests; may change concurrently.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.raw().refcount.load(Ordering::Acquire)
    }

    /// Heap address, used in diagnostics.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr().addr()
    }
}

// SAFETY: the refcount is atomic, the isa is immutable and the payload is
// Send + Sync by construction.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

impl Clone for Object {
    fn clone(&self) -> Self {
        self.retain();
        Object { ptr: self.ptr }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.release();
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class())
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("refcount", &self.refcount())
            .finish()
    }
}
