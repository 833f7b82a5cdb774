//! Ownership transfer after the dispatcher has decided a cast.
//!
//! The dispatcher only inspects the source. What it decides is captured in a
//! [`Disposition`]: which part of the source becomes the result (or which new
//! value does), and which containers to wrap it in. [`transfer_success`] and
//! [`transfer_failure`] then copy, move or destroy the source according to
//! the cast flags. They are the only code that reads those flags.

use crate::runtime::conformance::WitnessTable;
use crate::runtime::diagnostics::{CastFailure, DiagnosticSink};
use crate::runtime::flags::DynamicCastFlags;
use crate::runtime::memory::MemoryManager;
use crate::runtime::metadata::{Kind, Type};
use crate::runtime::projection::{Path, Step};
use crate::runtime::value::{
    ErrorPayload, Existential, ExistentialMetatypeValue, Slot, Value, ValueRef,
};

/// Where the result of a cast comes from.
#[derive(Debug, Clone)]
pub(crate) enum Origin {
    /// A part of the source, reached by `path`, whose type is `ty`.
    Projected { path: Path, ty: Type },
    /// A value built by the dispatcher. The source is only consumed.
    Produced(Value),
}

/// A container to wrap the result in, innermost first.
#[derive(Debug, Clone)]
pub(crate) enum Wrap {
    Some,
    ClassExistential(Vec<WitnessTable>),
    OpaqueExistential { ty: Type, witnesses: Vec<WitnessTable> },
    ErrorBox { ty: Type, witness: Option<WitnessTable> },
}

/// The dispatcher's verdict for a successful cast.
#[derive(Debug, Clone)]
pub(crate) struct Disposition {
    pub(crate) origin: Origin,
    pub(crate) wraps: Vec<Wrap>,
}

impl Disposition {
    /// The whole source, unchanged.
    pub(crate) fn identity(ty: Type) -> Self {
        Disposition {
            origin: Origin::Projected {
                path: Path::identity(),
                ty,
            },
            wraps: Vec::new(),
        }
    }

    /// The part of the source reached by `path`, of type `ty`.
    pub(crate) fn projected(path: Path, ty: Type) -> Self {
        Disposition {
            origin: Origin::Projected { path, ty },
            wraps: Vec::new(),
        }
    }

    pub(crate) fn produced(value: Value) -> Self {
        Disposition {
            origin: Origin::Produced(value),
            wraps: Vec::new(),
        }
    }

    /// Re-roots a disposition computed for an inner value at its container.
    pub(crate) fn within(mut self, step: Step, can_take: bool) -> Self {
        if let Origin::Projected { path, .. } = &mut self.origin {
            path.prepend(step, can_take);
        }
        self
    }

    /// Re-roots a disposition computed for a projected value at the value it
    /// was projected from.
    pub(crate) fn within_path(mut self, outer: &Path) -> Self {
        if let Origin::Projected { path, .. } = &mut self.origin {
            path.nest_in(outer);
        }
        self
    }

    pub(crate) fn wrapped(mut self, wrap: Wrap) -> Self {
        self.wraps.push(wrap);
        self
    }
}

fn copy_ref(value: ValueRef<'_>, ty: Type, memory: &dyn MemoryManager) -> Value {
    match value {
        ValueRef::Value(value) => memory.copy_value(value, ty),
        ValueRef::Object(object) => Value::Object(memory.retain(object)),
        ValueRef::Metatype(stored) => Value::Metatype(stored),
    }
}

fn apply_wraps(mut value: Value, wraps: Vec<Wrap>, memory: &dyn MemoryManager) -> Value {
    for wrap in wraps {
        value = match wrap {
            Wrap::Some => Value::some(value),
            Wrap::ClassExistential(witnesses) => match value {
                Value::Object(object) => Value::Existential(Existential::class(object, witnesses)),
                other => panic!("class existential payload is not an object: {other:?}"),
            },
            Wrap::OpaqueExistential { ty, witnesses } => {
                Value::Existential(Existential::opaque(ty, value, witnesses))
            }
            Wrap::ErrorBox { ty, witness } => {
                let payload = match value {
                    Value::Object(object) if object.class().kind() == Kind::ForeignClass => {
                        ErrorPayload::Foreign(object)
                    }
                    value => ErrorPayload::Native(value),
                };
                Value::Existential(Existential::Error(memory.alloc_error_box(ty, witness, payload)))
            }
        };
    }
    value
}

fn missing_path() -> ! {
    panic!("projection path does not match the value it was computed from")
}

/// Copies the projected part of `root` without consuming it.
fn copy_projected(root: &Value, path: &Path, ty: Type, memory: &dyn MemoryManager) -> Value {
    match path.follow(ValueRef::Value(root)) {
        Some(part) => copy_ref(part, ty, memory),
        None => missing_path(),
    }
}

/// Materializes the result from an owned source, consuming it.
fn materialize_owned(
    source: Value,
    source_ty: Type,
    origin: Origin,
    memory: &dyn MemoryManager,
) -> Value {
    match origin {
        Origin::Projected { path, .. } if path.can_take() => match path.take(source, memory) {
            Some(value) => value,
            None => missing_path(),
        },
        Origin::Projected { path, ty } => {
            let value = copy_projected(&source, &path, ty, memory);
            memory.destroy_value(source, source_ty);
            value
        }
        Origin::Produced(value) => {
            memory.destroy_value(source, source_ty);
            value
        }
    }
}

/// Completes a successful cast: initializes `dest` and treats `src` as the
/// flags say. Always returns `true`.
///
/// # Panics
///
/// Panics if `src` is empty.
pub(crate) fn transfer_success(
    dest: &mut Slot,
    src: &mut Slot,
    src_ty: Type,
    disposition: Disposition,
    flags: DynamicCastFlags,
    memory: &dyn MemoryManager,
) -> bool {
    let Disposition { origin, wraps } = disposition;

    let value = if flags.contains(DynamicCastFlags::TAKE_ON_SUCCESS) {
        let source = match &origin {
            Origin::Projected { path, .. } if path.can_take() => memory.take_value(src, src_ty),
            _ => src.take(),
        };
        let Some(source) = source else {
            panic!("dynamic cast source slot is empty");
        };
        materialize_owned(source, src_ty, origin, memory)
    } else {
        match origin {
            Origin::Projected { path, ty } => match src.get() {
                Some(root) => copy_projected(root, &path, ty, memory),
                None => panic!("dynamic cast source slot is empty"),
            },
            Origin::Produced(value) => value,
        }
    };

    dest.init(apply_wraps(value, wraps, memory));
    true
}

/// Completes a failed cast. Returns `false`, or does not return at all when
/// the cast is unconditional.
pub(crate) fn transfer_failure(
    src: &mut Slot,
    src_ty: Type,
    failure: &CastFailure,
    flags: DynamicCastFlags,
    memory: &dyn MemoryManager,
    sink: &dyn DiagnosticSink,
) -> bool {
    if flags.contains(DynamicCastFlags::UNCONDITIONAL) {
        sink.fatal(&failure.report());
    }

    if flags.contains(DynamicCastFlags::DESTROY_ON_FAILURE) {
        if let Some(value) = src.take() {
            memory.destroy_value(value, src_ty);
        }
    }

    false
}

/// Consumes a temporary owned by the engine, producing the result the
/// disposition describes.
pub(crate) fn consume(
    temporary: Value,
    ty: Type,
    disposition: Disposition,
    memory: &dyn MemoryManager,
) -> Value {
    let Disposition { origin, wraps } = disposition;
    let value = materialize_owned(temporary, ty, origin, memory);
    apply_wraps(value, wraps, memory)
}

/// Builds the value of an existential metatype.
pub(crate) fn existential_metatype_value(ty: Type, witnesses: Vec<WitnessTable>) -> Value {
    Value::ExistentialMetatype(ExistentialMetatypeValue { ty, witnesses })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::diagnostics::PanicSink;
    use crate::runtime::memory::NativeMemoryManager;
    use crate::runtime::object::Object;

    fn object_value(name: &str) -> (Object, Value) {
        let class = Type::new_class(name, None).unwrap();
        let object = Object::new(class).unwrap();
        (object.clone(), Value::Object(object))
    }

    #[test]
    fn test_copy_leaves_source() {
        let (object, value) = object_value("OwnTest.Copy");
        let ty = object.class();
        let mut src = Slot::new(value);
        let mut dest = Slot::empty();

        assert!(transfer_success(
            &mut dest,
            &mut src,
            ty,
            Disposition::identity(ty),
            DynamicCastFlags::NONE,
            &NativeMemoryManager,
        ));

        assert!(!src.is_empty());
        assert_eq!(dest.get(), src.get());
        assert_eq!(object.refcount(), 3);
    }

    #[test]
    fn test_take_moves_source() {
        let (object, value) = object_value("OwnTest.Take");
        let ty = object.class();
        let mut src = Slot::new(value);
        let mut dest = Slot::empty();

        transfer_success(
            &mut dest,
            &mut src,
            ty,
            Disposition::identity(ty).wrapped(Wrap::Some),
            DynamicCastFlags::TAKE_ON_SUCCESS,
            &NativeMemoryManager,
        );

        assert!(src.is_empty());
        assert_eq!(dest.get(), Some(&Value::some(Value::Object(object.clone()))));
        assert_eq!(object.refcount(), 2);
    }

    #[test]
    fn test_take_of_shared_part_copies_then_destroys() {
        let failure = Type::new_struct("OwnTest.Failure").unwrap();
        let (object, payload) = object_value("OwnTest.Payload");
        let boxed = crate::runtime::value::ErrorBox::new(failure, None, ErrorPayload::Native(payload));
        let mut src = Slot::new(Value::Existential(Existential::Error(boxed)));
        let mut dest = Slot::empty();

        let disposition = Disposition::identity(failure).within(Step::ErrorPayload, false);
        transfer_success(
            &mut dest,
            &mut src,
            Type::error_existential(),
            disposition,
            DynamicCastFlags::TAKE_ON_SUCCESS,
            &NativeMemoryManager,
        );

        assert!(src.is_empty());
        assert_eq!(dest.get(), Some(&Value::Object(object.clone())));
        // The box is gone; only `object` and `dest` remain.
        assert_eq!(object.refcount(), 2);
    }

    #[test]
    fn test_produced_with_take_destroys_source() {
        let (object, value) = object_value("OwnTest.Produced");
        let ty = object.class();
        let mut src = Slot::new(value);
        let mut dest = Slot::empty();

        transfer_success(
            &mut dest,
            &mut src,
            ty,
            Disposition::produced(Value::Metatype(ty)),
            DynamicCastFlags::TAKE_ON_SUCCESS,
            &NativeMemoryManager,
        );

        assert!(src.is_empty());
        assert_eq!(dest.get(), Some(&Value::Metatype(ty)));
        assert_eq!(object.refcount(), 1);
    }

    #[test]
    fn test_failure_flags() {
        let (object, value) = object_value("OwnTest.Failure2");
        let ty = object.class();
        let failure = CastFailure::impossible(ty, Type::any_object());

        let mut kept = Slot::new(value.clone());
        assert!(!transfer_failure(
            &mut kept,
            ty,
            &failure,
            DynamicCastFlags::NONE,
            &NativeMemoryManager,
            &PanicSink,
        ));
        assert!(!kept.is_empty());

        let mut destroyed = Slot::new(value);
        assert!(!transfer_failure(
            &mut destroyed,
            ty,
            &failure,
            DynamicCastFlags::DESTROY_ON_FAILURE,
            &NativeMemoryManager,
            &PanicSink,
        ));
        assert!(destroyed.is_empty());
        assert_eq!(object.refcount(), 2);
    }

    #[test]
    #[should_panic(expected = "Could not cast value of type 'OwnTest.Fatal'")]
    fn test_unconditional_failure_is_fatal() {
        let ty = Type::new_struct("OwnTest.Fatal").unwrap();
        let mut src = Slot::new(Value::Bits(0));

        transfer_failure(
            &mut src,
            ty,
            &CastFailure::impossible(ty, Type::any_object()),
            DynamicCastFlags::UNCONDITIONAL | DynamicCastFlags::DESTROY_ON_FAILURE,
            &NativeMemoryManager,
            &PanicSink,
        );
    }

    #[test]
    fn test_consume_wraps_temporary() {
        let (object, value) = object_value("OwnTest.Temporary");
        let ty = object.class();

        let result = consume(
            value,
            ty,
            Disposition::identity(ty).wrapped(Wrap::ClassExistential(Vec::new())),
            &NativeMemoryManager,
        );

        assert_eq!(
            result,
            Value::Existential(Existential::class(object.clone(), Vec::new()))
        );
        assert_eq!(object.refcount(), 2);
    }
}
