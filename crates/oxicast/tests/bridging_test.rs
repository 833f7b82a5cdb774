//! Bridging tests
//!
//! Value types converted to and from objects of a foreign class, and native
//! errors converted to the foreign error class.
//!
//! Run with: `cargo test --test bridging_test`

mod common;

use common::{new_struct, unique};
use oxicast::runtime::{
    BridgeRegistry, BridgeWitness, Caster, ConformanceRegistry, DynamicCastFlags, ErrorBox,
    ErrorPayload, Existential, Object, PanicSink, Protocol, Slot, Type, Value,
};
use std::sync::Arc;

/// Bridges `Bits` values to foreign objects carrying a `u64` payload.
struct NumberWitness {
    class: Type,
}

impl BridgeWitness for NumberWitness {
    fn foreign_class(&self, _ty: Type) -> Type {
        self.class
    }

    fn bridge_to_object(&self, value: &Value, _ty: Type) -> Object {
        match value {
            Value::Bits(bits) => Object::with_payload(self.class, *bits).unwrap(),
            other => panic!("cannot bridge {other:?}"),
        }
    }

    fn force_bridge_from_object(&self, object: &Object, ty: Type) -> Value {
        match self.conditionally_bridge_from_object(object, ty) {
            Some(value) => value,
            None => panic!("object does not hold a number"),
        }
    }

    fn conditionally_bridge_from_object(&self, object: &Object, _ty: Type) -> Option<Value> {
        object.payload::<u64>().map(|bits| Value::Bits(*bits))
    }
}

/// Never bridged, whatever the instantiation.
struct DisabledWitness {
    class: Type,
}

impl BridgeWitness for DisabledWitness {
    fn foreign_class(&self, _ty: Type) -> Type {
        self.class
    }

    fn is_bridged(&self, _ty: Type) -> bool {
        false
    }

    fn bridge_to_object(&self, _value: &Value, _ty: Type) -> Object {
        unreachable!("disabled bridge")
    }

    fn force_bridge_from_object(&self, _object: &Object, _ty: Type) -> Value {
        unreachable!("disabled bridge")
    }

    fn conditionally_bridge_from_object(&self, _object: &Object, _ty: Type) -> Option<Value> {
        None
    }
}

struct Fixture {
    caster: Caster,
    bridges: Arc<BridgeRegistry>,
    int: Type,
    number: Type,
    base: Type,
}

fn fixture() -> Fixture {
    let int = new_struct("Int");
    let base = Type::new_foreign_class(&unique("NSObject"), None).unwrap();
    let number = Type::new_foreign_class(&unique("NSNumber"), Some(base)).unwrap();
    let bridges = Arc::new(BridgeRegistry::new());
    bridges
        .register(int, Arc::new(NumberWitness { class: number }))
        .unwrap();

    let caster = Caster::builder()
        .bridge(bridges.clone())
        .sink(Arc::new(PanicSink))
        .build();

    Fixture {
        caster,
        bridges,
        int,
        number,
        base,
    }
}

#[test]
fn test_value_to_foreign_superclass() {
    let f = fixture();
    let mut src = Slot::new(Value::Bits(11));
    let mut dest = Slot::empty();

    assert!(f.caster.dynamic_cast(&mut dest, &mut src, f.int, f.base, DynamicCastFlags::TAKE_ON_SUCCESS));
    assert!(src.is_empty());

    let object = dest.get().and_then(Value::as_object).unwrap();
    assert_eq!(object.class(), f.number);
    assert_eq!(object.payload::<u64>(), Some(&11));
}

#[test]
fn test_value_to_any_object_and_back() {
    let f = fixture();
    let mut src = Slot::new(Value::Bits(8));
    let mut boxed = Slot::empty();
    assert!(f.caster.dynamic_cast(&mut boxed, &mut src, f.int, Type::any_object(), DynamicCastFlags::NONE));

    let Some(Value::Existential(Existential::Class(stored))) = boxed.get() else {
        panic!("expected a class container, got {boxed:?}");
    };
    assert_eq!(stored.object.class(), f.number);

    let mut back = Slot::empty();
    assert!(f.caster.dynamic_cast(&mut back, &mut boxed, Type::any_object(), f.int, DynamicCastFlags::NONE));
    assert_eq!(back.into_inner(), Some(Value::Bits(8)));
}

#[test]
fn test_optional_value_bridges_its_payload() {
    let f = fixture();
    let mut src = Slot::new(Value::some(Value::Bits(2)));
    let mut dest = Slot::empty();

    assert!(f.caster.dynamic_cast(
        &mut dest,
        &mut src,
        Type::optional(f.int),
        Type::any_object(),
        DynamicCastFlags::NONE
    ));
    assert_eq!(f.caster.dynamic_type(dest.get().unwrap(), Type::any_object()), f.number);
}

#[test]
fn test_conditional_bridge_rejects_wrong_payload() {
    let f = fixture();
    let wrong = Value::Object(Object::with_payload(f.number, String::from("nan")).unwrap());
    let unrelated = Type::new_foreign_class(&unique("NSData"), None).unwrap();
    let other = Value::Object(Object::new(unrelated).unwrap());

    assert!(f.caster.check_cast(&wrong, f.number, f.int).is_err());
    assert!(f.caster.check_cast(&other, unrelated, f.int).is_err());

    let mut src = Slot::new(wrong);
    let mut dest = Slot::empty();
    assert!(!f.caster.dynamic_cast(
        &mut dest,
        &mut src,
        f.number,
        f.int,
        DynamicCastFlags::DESTROY_ON_FAILURE
    ));
    assert!(src.is_empty());
}

#[test]
fn test_bridge_queries() {
    let f = fixture();
    let plain = new_struct("Plain");
    let disabled = new_struct("Disabled");
    f.bridges
        .register(disabled, Arc::new(DisabledWitness { class: f.number }))
        .unwrap();

    assert!(f.caster.is_bridged_to_object(f.int));
    assert_eq!(f.caster.bridged_object_type(f.int), Some(f.number));
    assert!(!f.caster.is_bridged_to_object(plain));
    assert!(!f.caster.is_bridged_to_object(disabled));
    assert_eq!(f.caster.bridged_object_type(disabled), None);
    assert!(f.caster.check_cast(&Value::Bits(1), disabled, f.number).is_err());

    let object = Object::with_payload(f.number, 5_u64).unwrap();
    assert_eq!(f.caster.bridge_from_object(&object, f.int), Some(Value::Bits(5)));
    assert_eq!(f.caster.bridge_from_object(&object, plain), None);
}

#[test]
#[should_panic(expected = "object does not hold a number")]
fn test_forced_bridge_panics_on_wrong_payload() {
    let f = fixture();
    let wrong = Object::new(f.number).unwrap();
    let _ = f.caster.bridge_from_object(&wrong, f.int);
}

#[test]
fn test_duplicate_bridge_is_rejected() {
    let f = fixture();
    let err = f
        .bridges
        .register(f.int, Arc::new(NumberWitness { class: f.number }))
        .unwrap_err();
    assert!(matches!(err, oxicast::Error::BridgeAlreadyRegistered { .. }));
}

fn wrap_error(error: ErrorBox) -> Option<Object> {
    let class = Type::lookup("BridgeTests.NSError")?;
    Object::with_payload(class, error).ok()
}

#[test]
fn test_error_bridges_to_foreign_error_class() {
    let failure = new_struct("Failure");
    let unrelated = new_struct("NotAnError");
    let ns_error = Type::new_foreign_class("BridgeTests.NSError", None).unwrap();
    let conformances = Arc::new(ConformanceRegistry::new());
    conformances.declare(failure, Protocol::error()).unwrap();
    let bridges = Arc::new(BridgeRegistry::new());
    bridges.set_error_bridge(ns_error, wrap_error);
    let caster = Caster::builder()
        .resolver(conformances)
        .bridge(bridges)
        .sink(Arc::new(PanicSink))
        .build();

    let mut src = Slot::new(Value::Bits(7));
    let mut dest = Slot::empty();
    assert!(caster.dynamic_cast(&mut dest, &mut src, failure, ns_error, DynamicCastFlags::TAKE_ON_SUCCESS));
    assert!(src.is_empty());

    let object = dest.get().and_then(Value::as_object).unwrap();
    let boxed = object.payload::<ErrorBox>().unwrap();
    assert_eq!(boxed.ty(), failure);
    assert_eq!(boxed.payload(), &ErrorPayload::Native(Value::Bits(7)));

    assert!(caster.check_cast(&Value::Bits(1), unrelated, ns_error).is_err());
}
