//! `oxicast`: a runtime dynamic cast engine.
//!
//! `oxicast` decides at runtime whether a value of one type may be viewed as
//! another and performs the conversion. It provides:
//!
//! - **Type Descriptors** for classes, value types, optionals, tuples,
//!   functions, existentials and metatypes, uniqued in an arena
//! - **Existential Containers** in class-bounded, opaque and error-box
//!   layouts, with witness tables from a pluggable conformance resolver
//! - **Dynamic Casts** with explicit ownership control over the source
//! - **Bridging** between value types and classes of a foreign object system
//! - **Diagnostics** with memoized type names and fatal failure reports
//!
//! # Architecture
//!
//! - **Public API Layer**: [`runtime::Caster`] and the free functions over
//!   the default caster
//! - **Runtime Layer**: descriptors, values, conformance and the dispatcher
//! - **Memory Layer**: the `oxicast-mem` metadata arena
//!
//! # Example
//!
//! ```rust
//! use oxicast::runtime::{
//!     Caster, ConformanceRegistry, DynamicCastFlags, Existential, Protocol, Slot, Type, Value,
//! };
//! use std::sync::Arc;
//!
//! fn area(_: &Value) -> Value {
//!     Value::Bits(314)
//! }
//!
//! let circle = Type::new_struct("Docs.Circle").unwrap();
//! let shape = Protocol::new("Docs.Shape", &["area"]).unwrap();
//!
//! let conformances = Arc::new(ConformanceRegistry::new());
//! conformances.register(circle, shape, &[area]).unwrap();
//! let caster = Caster::builder().resolver(conformances).build();
//!
//! let mut src = Slot::new(Value::Bits(1));
//! let mut dest = Slot::empty();
//! let cast = caster.dynamic_cast(
//!     &mut dest,
//!     &mut src,
//!     circle,
//!     Type::existential(&[shape]),
//!     DynamicCastFlags::TAKE_ON_SUCCESS,
//! );
//!
//! assert!(cast);
//! assert!(src.is_empty());
//!
//! let Some(Value::Existential(Existential::Opaque(stored))) = dest.get() else {
//!     panic!("expected an opaque existential");
//! };
//! assert_eq!(stored.ty, circle);
//! assert_eq!(stored.witnesses[0].invoke_requirement("area", &stored.value), Some(Value::Bits(314)));
//! ```

pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::{FatalMode, RuntimeConfig};
pub use error::{Error, Result};
pub use runtime::{
    Caster, CastFailure, DynamicCastFlags, Object, Protocol, Slot, Type, Value, dynamic_cast,
    type_name,
};
