//! Existential projection.
//!
//! Projection finds the value a cast actually operates on: the object inside
//! a class-bounded container, the buffer of an opaque container, the payload
//! of an error box, or the type stored in a metatype. It records how it got
//! there as a [`Path`] of steps so the ownership helpers can later copy or
//! move exactly that part of the source.

use crate::runtime::memory::MemoryManager;
use crate::runtime::metadata::{Metadata, Type};
use crate::runtime::value::{ErrorPayload, Existential, Value, ValueRef};

/// One step from a value into a part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Into the payload of a populated optional.
    OptionalPayload,
    /// Into the object of a class-bounded container.
    ClassPayload,
    /// Into the buffer of an opaque container.
    OpaqueValue,
    /// Into the payload of an error box.
    ErrorPayload,
    /// Reinterprets a class object or existential metatype as a plain
    /// metatype value.
    AsMetatype,
}

/// A sequence of steps from a root value, and whether the part it reaches
/// can be moved out of the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Path {
    steps: Vec<Step>,
    can_take: bool,
}

impl Path {
    pub(crate) fn identity() -> Self {
        Path {
            steps: Vec::new(),
            can_take: true,
        }
    }

    pub(crate) fn can_take(&self) -> bool {
        self.can_take
    }

    /// Adds `step` in front of the existing steps.
    pub(crate) fn prepend(&mut self, step: Step, can_take: bool) {
        self.steps.insert(0, step);
        self.can_take &= can_take;
    }

    /// Puts `outer` in front of this path.
    pub(crate) fn nest_in(&mut self, outer: &Path) {
        self.steps.splice(0..0, outer.steps.iter().copied());
        self.can_take &= outer.can_take;
    }

    /// Follows the path by reference.
    pub(crate) fn follow<'a>(&self, root: ValueRef<'a>) -> Option<ValueRef<'a>> {
        self.steps
            .iter()
            .try_fold(root, |current, step| follow_step(current, *step))
    }

    /// Follows the path by value, consuming the root. Returns `None` for an
    /// error-box step, whose payload is shared.
    ///
    /// A class object reinterpreted as its metatype is released through
    /// `memory`. The shells left by the other steps own no storage: a class
    /// container keeps only witness tables, which live in the arena.
    pub(crate) fn take(&self, root: Value, memory: &dyn MemoryManager) -> Option<Value> {
        self.steps
            .iter()
            .try_fold(root, |current, step| take_step(current, *step, memory))
    }
}

fn follow_step(current: ValueRef<'_>, step: Step) -> Option<ValueRef<'_>> {
    match (step, current) {
        (Step::OptionalPayload, ValueRef::Value(Value::Optional(Some(payload)))) => {
            Some(ValueRef::Value(payload))
        }
        (Step::ClassPayload, ValueRef::Value(Value::Existential(Existential::Class(class)))) => {
            Some(ValueRef::Object(&class.object))
        }
        (Step::OpaqueValue, ValueRef::Value(Value::Existential(Existential::Opaque(opaque)))) => {
            Some(ValueRef::Value(&opaque.value))
        }
        (Step::ErrorPayload, ValueRef::Value(Value::Existential(Existential::Error(error)))) => {
            Some(match error.payload() {
                ErrorPayload::Native(value) => ValueRef::Value(value),
                ErrorPayload::Foreign(object) => ValueRef::Object(object),
            })
        }
        (Step::AsMetatype, current) => current.as_metatype().map(ValueRef::Metatype),
        _ => None,
    }
}

fn take_step(current: Value, step: Step, memory: &dyn MemoryManager) -> Option<Value> {
    match (step, current) {
        (Step::OptionalPayload, Value::Optional(Some(payload))) => Some(*payload),
        (Step::ClassPayload, Value::Existential(Existential::Class(class))) => {
            Some(Value::Object(class.object))
        }
        (Step::OpaqueValue, Value::Existential(Existential::Opaque(opaque))) => {
            Some(opaque.value)
        }
        (Step::AsMetatype, current) => {
            let stored = ValueRef::Value(&current).as_metatype()?;
            if let Value::Object(object) = current {
                memory.release(object);
            }
            Some(Value::Metatype(stored))
        }
        _ => None,
    }
}

/// The result of projecting a value: what it is at runtime and how to reach
/// it.
#[derive(Debug, Clone)]
pub(crate) struct Projection<'a> {
    pub(crate) value: ValueRef<'a>,
    pub(crate) ty: Type,
    pub(crate) path: Path,
}

impl<'a> Projection<'a> {
    fn identity(value: ValueRef<'a>, ty: Type) -> Self {
        Projection {
            value,
            ty,
            path: Path::identity(),
        }
    }

    fn within(mut self, step: Step, can_take: bool) -> Self {
        self.path.prepend(step, can_take);
        self
    }
}

/// Projects `value`, declared as `ty`, to its dynamic value and type.
///
/// Recursion follows container nesting and always terminates: every
/// recursive call descends into a strictly smaller part of the value.
pub(crate) fn project(value: ValueRef<'_>, ty: Type) -> Projection<'_> {
    match ty.metadata() {
        Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => {
            let Some(object) = value.as_object() else {
                return Projection::identity(value, ty);
            };

            match object.represented_class() {
                Some(class) => Projection {
                    value: ValueRef::Metatype(class),
                    ty: Type::metatype(class),
                    path: Path::identity(),
                }
                .within(Step::AsMetatype, true),
                None => Projection::identity(value, object.dynamic_type()),
            }
        }
        Metadata::Metatype(_) | Metadata::ExistentialMetatype(_) => {
            let Some(stored) = value.as_metatype() else {
                return Projection::identity(value, ty);
            };

            let plain = matches!(
                value,
                ValueRef::Metatype(_) | ValueRef::Value(Value::Metatype(_))
            );
            let projection = Projection::identity(ValueRef::Metatype(stored), Type::metatype(stored));
            if plain {
                Projection { value, ..projection }
            } else {
                projection.within(Step::AsMetatype, true)
            }
        }
        Metadata::Existential(_) => match value {
            ValueRef::Value(Value::Existential(Existential::Class(class))) => {
                project(ValueRef::Object(&class.object), class.object.class())
                    .within(Step::ClassPayload, true)
            }
            ValueRef::Value(Value::Existential(Existential::Opaque(opaque))) => {
                project(ValueRef::Value(&opaque.value), opaque.ty).within(Step::OpaqueValue, true)
            }
            ValueRef::Value(Value::Existential(Existential::Error(error))) => {
                let inner = match error.payload() {
                    ErrorPayload::Native(payload) => project(ValueRef::Value(payload), error.ty()),
                    ErrorPayload::Foreign(object) => {
                        project(ValueRef::Object(object), object.class())
                    }
                };
                inner.within(Step::ErrorPayload, false)
            }
            _ => Projection::identity(value, ty),
        },
        _ => Projection::identity(value, ty),
    }
}
