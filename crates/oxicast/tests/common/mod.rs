// Common test utilities for integration tests
//
// Shared fixtures: unique type names, a memory manager that counts the
// operations a cast performs, and casters that panic instead of aborting.

#![allow(dead_code)]

use oxicast::runtime::{
    Caster, ConformanceRegistry, MemoryManager, Object, PanicSink, Protocol, Slot, Type, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Returns `prefix` qualified with a module and a process-unique suffix.
pub fn unique(prefix: &str) -> String {
    let id = TEST_ID.fetch_add(1, Ordering::SeqCst);
    format!("Tests.{prefix}_{id}")
}

pub fn new_class(prefix: &str, superclass: Option<Type>) -> Type {
    Type::new_class(&unique(prefix), superclass).expect("Failed to create test class")
}

pub fn new_struct(prefix: &str) -> Type {
    Type::new_struct(&unique(prefix)).expect("Failed to create test struct")
}

pub fn new_protocol(prefix: &str, requirements: &[&str]) -> Protocol {
    Protocol::new(&unique(prefix), requirements).expect("Failed to create test protocol")
}

/// Counts every value-lifetime operation a cast performs.
#[derive(Debug, Default)]
pub struct CountingMemoryManager {
    pub copies: AtomicUsize,
    pub takes: AtomicUsize,
    pub destroys: AtomicUsize,
    pub error_boxes: AtomicUsize,
}

impl CountingMemoryManager {
    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn takes(&self) -> usize {
        self.takes.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn error_boxes(&self) -> usize {
        self.error_boxes.load(Ordering::SeqCst)
    }
}

impl MemoryManager for CountingMemoryManager {
    fn copy_value(&self, value: &Value, _ty: Type) -> Value {
        self.copies.fetch_add(1, Ordering::SeqCst);
        value.clone()
    }

    fn take_value(&self, slot: &mut Slot, _ty: Type) -> Option<Value> {
        self.takes.fetch_add(1, Ordering::SeqCst);
        slot.take()
    }

    fn destroy_value(&self, value: Value, _ty: Type) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        drop(value);
    }

    fn alloc_error_box(
        &self,
        ty: Type,
        witness: Option<oxicast::runtime::WitnessTable>,
        payload: oxicast::runtime::ErrorPayload,
    ) -> oxicast::runtime::ErrorBox {
        self.error_boxes.fetch_add(1, Ordering::SeqCst);
        oxicast::runtime::ErrorBox::new(ty, witness, payload)
    }
}

/// A caster over the global registries whose fatal failures panic.
pub fn caster_with_panic_sink() -> Caster {
    Caster::builder().sink(Arc::new(PanicSink)).build()
}

/// A panicking caster with private conformances and a counting memory
/// manager.
pub fn counting_caster(
    conformances: Arc<ConformanceRegistry>,
) -> (Caster, Arc<CountingMemoryManager>) {
    let memory = Arc::new(CountingMemoryManager::default());
    let caster = Caster::builder()
        .resolver(conformances)
        .memory(memory.clone())
        .sink(Arc::new(PanicSink))
        .build();
    (caster, memory)
}

/// `Shape` with an `area` requirement, and a `Circle` struct conforming to
/// it. Circles store their radius as bits; `area` returns `3 * r * r`.
pub struct ShapeFixture {
    pub shape: Protocol,
    pub circle: Type,
    pub conformances: Arc<ConformanceRegistry>,
}

fn circle_area(value: &Value) -> Value {
    match value {
        Value::Bits(radius) => Value::Bits(3 * radius * radius),
        other => panic!("not a circle: {other:?}"),
    }
}

pub fn shape_fixture() -> ShapeFixture {
    let shape = new_protocol("Shape", &["area"]);
    let circle = new_struct("Circle");
    let conformances = Arc::new(ConformanceRegistry::new());
    conformances
        .register(circle, shape, &[circle_area])
        .expect("Failed to register Circle: Shape");

    ShapeFixture {
        shape,
        circle,
        conformances,
    }
}

/// A fresh object of `class` wrapped in a value.
pub fn object_value(class: Type) -> (Object, Value) {
    let object = Object::new(class).expect("Failed to allocate test object");
    (object.clone(), Value::Object(object))
}
