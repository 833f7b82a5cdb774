//! Function type tests
//!
//! Function values cast only between compatible signatures. A throwing
//! target accepts non-throwing functions, never the reverse.
//!
//! Run with: `cargo test --test function_test`

mod common;

use common::{caster_with_panic_sink, new_struct};
use oxicast::runtime::{
    DynamicCastFlags, Existential, FunctionConvention, FunctionParam, FunctionValue, Object, Slot,
    Type, Value, is_function_compatible,
};

fn double(args: &[Value]) -> Value {
    match args {
        [Value::Bits(n)] => Value::Bits(n * 2),
        _ => Value::Bits(0),
    }
}

#[test]
fn test_non_throwing_to_throwing() {
    let int = new_struct("Int");
    let params = [FunctionParam::value(int)];
    let plain = Type::function(FunctionConvention::Native, &params, int, false);
    let throwing = Type::function(FunctionConvention::Native, &params, int, true);
    let caster = caster_with_panic_sink();

    let mut src = Slot::new(Value::Function(FunctionValue::thin(double)));
    let mut dest = Slot::empty();
    assert!(caster.dynamic_cast(&mut dest, &mut src, plain, throwing, DynamicCastFlags::NONE));

    let Some(Value::Function(function)) = dest.get() else {
        panic!("expected a function, got {dest:?}");
    };
    assert_eq!(function.call(&[Value::Bits(21)]), Value::Bits(42));

    let mut dest = Slot::empty();
    assert!(!caster.dynamic_cast(&mut dest, &mut src, throwing, plain, DynamicCastFlags::NONE));
}

#[test]
fn test_context_is_retained() {
    let int = new_struct("Int");
    let context_class = Type::new_class(&common::unique("Context"), None).unwrap();
    let context = Object::new(context_class).unwrap();
    let fn_ty = Type::function(FunctionConvention::Native, &[], int, false);
    let function = FunctionValue {
        entry: double,
        context: Some(context.clone()),
    };
    let caster = caster_with_panic_sink();

    let mut src = Slot::new(Value::Function(function));
    let mut dest = Slot::empty();
    assert!(caster.dynamic_cast(&mut dest, &mut src, fn_ty, Type::any(), DynamicCastFlags::NONE));
    assert!(matches!(dest.get(), Some(Value::Existential(Existential::Opaque(_)))));
    assert_eq!(context.refcount(), 3);
}

#[test]
fn test_compatibility_rules() {
    let int = new_struct("Int");
    let text = new_struct("Text");
    let make = |convention, params: &[FunctionParam], result, throws| {
        Type::function(convention, params, result, throws).signature()
    };

    let base = make(FunctionConvention::Native, &[FunctionParam::value(int)], int, false);

    assert!(is_function_compatible(base, base));
    assert!(!is_function_compatible(
        base,
        make(FunctionConvention::Native, &[FunctionParam::inout(int)], int, false)
    ));
    assert!(!is_function_compatible(
        base,
        make(FunctionConvention::Native, &[FunctionParam::value(text)], int, false)
    ));
    assert!(!is_function_compatible(
        base,
        make(FunctionConvention::Native, &[], int, false)
    ));
    assert!(!is_function_compatible(
        base,
        make(FunctionConvention::Thin, &[FunctionParam::value(int)], int, false)
    ));
    assert!(!is_function_compatible(
        base,
        make(FunctionConvention::Native, &[FunctionParam::value(int)], text, false)
    ));
}

#[test]
fn test_non_function_source_fails() {
    let int = new_struct("Int");
    let fn_ty = Type::function(FunctionConvention::Native, &[], int, false);
    let caster = caster_with_panic_sink();

    assert!(caster.check_cast(&Value::Bits(1), int, fn_ty).is_err());
}
