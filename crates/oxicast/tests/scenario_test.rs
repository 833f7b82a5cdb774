//! End-to-end cast scenarios
//!
//! A `Circle` value moved into a `Shape` existential, called through its
//! witness table, and cast back out.
//!
//! Run with: `cargo test --test scenario_test`

mod common;

use common::{counting_caster, shape_fixture};
use oxicast::runtime::{DynamicCastFlags, Existential, Slot, Type, Value};

#[test]
fn test_circle_into_shape_with_take() {
    let fixture = shape_fixture();
    let (caster, memory) = counting_caster(fixture.conformances.clone());
    let shape_type = Type::existential(&[fixture.shape]);

    let mut src = Slot::new(Value::Bits(2));
    let mut dest = Slot::empty();
    assert!(caster.dynamic_cast(
        &mut dest,
        &mut src,
        fixture.circle,
        shape_type,
        DynamicCastFlags::TAKE_ON_SUCCESS
    ));

    assert!(src.is_empty(), "source must be consumed");
    assert_eq!(memory.takes(), 1);
    assert_eq!(memory.copies(), 0);

    let boxed = dest.get().unwrap();
    assert_eq!(caster.dynamic_type(boxed, shape_type), fixture.circle);

    let Value::Existential(Existential::Opaque(stored)) = boxed else {
        panic!("expected an opaque container, got {boxed:?}");
    };
    assert_eq!(stored.ty, fixture.circle);
    assert_eq!(stored.witnesses.len(), 1);
    assert_eq!(
        stored.witnesses[0].invoke_requirement("area", &stored.value),
        Some(Value::Bits(12))
    );
}

#[test]
fn test_shape_back_to_circle() {
    let fixture = shape_fixture();
    let (caster, _) = counting_caster(fixture.conformances.clone());
    let shape_type = Type::existential(&[fixture.shape]);

    let mut value = Slot::new(Value::Bits(5));
    let mut shape = Slot::empty();
    assert!(caster.dynamic_cast(
        &mut shape,
        &mut value,
        fixture.circle,
        shape_type,
        DynamicCastFlags::TAKE_ON_SUCCESS
    ));

    let mut circle = Slot::empty();
    assert!(caster.dynamic_cast(
        &mut circle,
        &mut shape,
        shape_type,
        fixture.circle,
        DynamicCastFlags::TAKE_ON_SUCCESS
    ));
    assert_eq!(circle.into_inner(), Some(Value::Bits(5)));
    assert!(shape.is_empty());
}

#[test]
fn test_optional_circle_into_any_shape() {
    let fixture = shape_fixture();
    let (caster, _) = counting_caster(fixture.conformances.clone());
    let shape_type = Type::existential(&[fixture.shape]);
    let optional = Type::optional(fixture.circle);

    let mut src = Slot::new(Value::some(Value::Bits(1)));
    let mut dest = Slot::empty();
    assert!(caster.dynamic_cast(&mut dest, &mut src, optional, shape_type, DynamicCastFlags::NONE));
    assert_eq!(caster.dynamic_type(dest.get().unwrap(), shape_type), fixture.circle);

    let mut none = Slot::new(Value::none());
    let mut dest = Slot::empty();
    assert!(!caster.dynamic_cast(&mut dest, &mut none, optional, shape_type, DynamicCastFlags::NONE));
    assert!(dest.is_empty());
}
