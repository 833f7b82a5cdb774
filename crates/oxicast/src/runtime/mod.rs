//! The `oxicast` runtime.
//!
//! # Architecture
//!
//! The runtime is organized into several modules:
//!
//! - [`metadata`]: type descriptors and the type registry
//! - [`protocol`]: protocol descriptors
//! - [`object`]: reference-counted class instances and class objects
//! - [`value`]: the value model, existential containers and cast slots
//! - [`conformance`]: witness tables and conformance checks
//! - [`memory`]: copy, move and destroy operations used by casts
//! - [`bridge`]: the seam to the foreign object system
//! - [`names`]: memoized human-readable type names
//! - [`diagnostics`]: cast failures and fatal reporting
//! - [`flags`]: dynamic cast flags
//! - [`cast`]: the cast engine
//!
//! Projection of existentials and the ownership rules applied after a cast
//! are internal to the engine.
//!
//! # Global State
//!
//! Type descriptors, protocols, witness tables and rendered names are
//! allocated in the process-lifetime metadata arena (see
//! [`oxicast_mem::global_arena`]) and never freed. Handles to them are
//! `Copy` and compare by identity.

pub mod bridge;
pub mod cast;
pub mod conformance;
pub mod diagnostics;
pub mod flags;
pub mod memory;
pub mod metadata;
pub mod names;
pub mod object;
pub mod protocol;
pub mod value;

mod ownership;
mod projection;

pub use bridge::{BridgeRegistry, BridgeWitness, ErrorBridgeFn, ObjectBridge, global_bridges};
pub use cast::{
    Caster, CasterBuilder, bridge_from_object, bridged_object_type, cast_class,
    cast_class_unconditional, cast_metatype, cast_metatype_type, cast_metatype_unconditional, conforms_to,
    default_caster, dynamic_cast, dynamic_type, is_bridged_to_object, is_function_compatible,
    metatype_to_object, metatype_to_object_unconditional,
};
pub use conformance::{
    Conformance, ConformanceRegistry, ConformanceResolver, WitnessFn, WitnessTable, conforms,
    conforms_all, global_conformances,
};
pub use diagnostics::{
    AbortSink, CastFailure, CastFailureKind, CastFailureReport, DiagnosticSink, PanicSink,
};
pub use flags::DynamicCastFlags;
pub use memory::{MemoryManager, NativeMemoryManager};
pub use metadata::{
    ClassOrigin, ExistentialRepresentation, FunctionConvention, FunctionParam, Kind, Metadata,
    Type, class_superclass, is_class_or_object_existential_type, is_class_type,
    is_optional_type,
};
pub use names::{INVALID_TYPE_NAME, type_name};
pub use object::Object;
pub use protocol::{DispatchStrategy, Protocol, ProtocolFlags, SpecialProtocol};
pub use value::{
    ClassExistential, ErrorBox, ErrorPayload, Existential, ExistentialMetatypeValue,
    FunctionEntry, FunctionValue, OpaqueExistential, Slot, Value,
};
