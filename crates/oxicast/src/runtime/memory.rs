//! Value lifetime operations used by the cast engine.
//!
//! The engine never copies, moves or drops a source value directly. It goes
//! through a [`MemoryManager`] so that embedders (and tests) can observe or
//! replace the value-witness operations.

use crate::runtime::conformance::WitnessTable;
use crate::runtime::metadata::Type;
use crate::runtime::object::Object;
use crate::runtime::value::{ErrorBox, ErrorPayload, Slot, Value};

/// Copy, move and destroy operations over typed values.
pub trait MemoryManager: Send + Sync {
    /// Returns an independent copy of `value`, retaining any objects it
    /// references.
    fn copy_value(&self, value: &Value, ty: Type) -> Value;

    /// Moves the value out of `slot`, leaving it empty.
    fn take_value(&self, slot: &mut Slot, ty: Type) -> Option<Value>;

    /// Destroys `value`, releasing any objects it references.
    fn destroy_value(&self, value: Value, ty: Type);

    /// Retains `object`, returning the new reference.
    fn retain(&self, object: &Object) -> Object {
        object.clone()
    }

    /// Releases `object`.
    fn release(&self, object: Object) {
        drop(object);
    }

    /// Allocates an error box holding `payload`.
    fn alloc_error_box(
        &self,
        ty: Type,
        witness: Option<WitnessTable>,
        payload: ErrorPayload,
    ) -> ErrorBox {
        ErrorBox::new(ty, witness, payload)
    }
}

/// The default manager: copies are `Clone`, destruction is `Drop`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeMemoryManager;

impl MemoryManager for NativeMemoryManager {
    fn copy_value(&self, value: &Value, _ty: Type) -> Value {
        value.clone()
    }

    fn take_value(&self, slot: &mut Slot, _ty: Type) -> Option<Value> {
        slot.take()
    }

    fn destroy_value(&self, value: Value, _ty: Type) {
        drop(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_retains_objects() {
        let class = Type::new_class("MemTest.Retained", None).unwrap();
        let object = Object::new(class).unwrap();
        let value = Value::Record(vec![Value::Object(object.clone()), Value::Bits(1)]);
        let manager = NativeMemoryManager;

        let copy = manager.copy_value(&value, class);
        assert_eq!(object.refcount(), 3);

        manager.destroy_value(copy, class);
        assert_eq!(object.refcount(), 2);
    }

    #[test]
    fn test_take_empties_slot() {
        let ty = Type::new_struct("MemTest.Taken").unwrap();
        let mut slot = Slot::new(Value::Bits(5));

        assert_eq!(NativeMemoryManager.take_value(&mut slot, ty), Some(Value::Bits(5)));
        assert!(slot.is_empty());
        assert_eq!(NativeMemoryManager.take_value(&mut slot, ty), None);
    }

    #[test]
    fn test_retain_release() {
        let class = Type::new_class("MemTest.Counted", None).unwrap();
        let object = Object::new(class).unwrap();

        let extra = NativeMemoryManager.retain(&object);
        assert_eq!(object.refcount(), 2);

        NativeMemoryManager.release(extra);
        assert_eq!(object.refcount(), 1);
    }

    #[test]
    fn test_alloc_error_box() {
        let ty = Type::new_struct("MemTest.Failure").unwrap();
        let boxed =
            NativeMemoryManager.alloc_error_box(ty, None, ErrorPayload::Native(Value::Bits(2)));

        assert_eq!(boxed.ty(), ty);
        assert_eq!(boxed.payload(), &ErrorPayload::Native(Value::Bits(2)));
    }
}
