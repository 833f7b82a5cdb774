//! Casts that cross into or out of the foreign object system.

use super::Caster;
use crate::runtime::conformance::{Conformance, conforms};
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::Type;
use crate::runtime::ownership::{Disposition, consume};
use crate::runtime::projection::Projection;
use crate::runtime::protocol::Protocol;
use crate::runtime::value::{ErrorPayload, Value, ValueRef};
use oxicast_log::trace;

impl Caster {
    /// A struct or enum source into a class target: either a native error
    /// becoming the foreign error class, or a bridged value becoming its
    /// foreign object.
    pub(super) fn bridge_value_to_class(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let Some(source) = value.as_value() else {
            return Err(CastFailure::impossible(src_ty, target));
        };

        if let Some(disposition) = self.bridge_error_to_class(value, src_ty, target) {
            return Ok(disposition);
        }

        let Some(witness) = self.bridge.witness(src_ty).filter(|w| w.is_bridged(src_ty)) else {
            return Err(CastFailure::impossible(src_ty, target));
        };

        let object = witness.bridge_to_object(source, src_ty);
        if object.class().is_subclass_of(target) {
            trace!("bridged {src_ty} to {}", object.class());
            Ok(Disposition::produced(Value::Object(object)))
        } else {
            Err(CastFailure::impossible(src_ty, target))
        }
    }

    /// Boxes an `Error`-conforming source and converts the box to the
    /// bridge's foreign error class. Applies to value and object sources
    /// alike, when `target` is that class.
    pub(super) fn bridge_error_to_class(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Option<Disposition> {
        let error_class = self.bridge.foreign_error_class()?;
        if error_class.unwrap_class_wrapper() != target.unwrap_class_wrapper() {
            return None;
        }

        let Conformance::Witnessed(witness) = conforms(
            &*self.resolver,
            &*self.bridge,
            value.as_object(),
            src_ty,
            Protocol::error(),
        )?
        else {
            return None;
        };

        let payload = match value {
            ValueRef::Value(source) => self.memory.copy_value(source, src_ty),
            ValueRef::Object(object) => Value::Object(self.memory.retain(object)),
            ValueRef::Metatype(_) => return None,
        };
        let error = self
            .memory
            .alloc_error_box(src_ty, Some(witness), ErrorPayload::Native(payload));
        let object = self.bridge.bridge_error(error)?;

        object
            .class()
            .is_subclass_of(target)
            .then(|| Disposition::produced(Value::Object(object)))
    }

    /// A struct, enum or optional value into a class-bounded existential,
    /// through its foreign object.
    pub(super) fn bridge_into_class_existential(
        &self,
        projection: Projection<'_>,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let dynamic = projection.ty;
        let Some(source) = projection.value.as_value() else {
            return Err(CastFailure::impossible(dynamic, target));
        };
        let Some(witness) = self.bridge.witness(dynamic).filter(|w| w.is_bridged(dynamic)) else {
            return Err(CastFailure::impossible(dynamic, target));
        };

        let object = witness.bridge_to_object(source, dynamic);
        let object_ty = object.class();
        let inner = self
            .to_existential(ValueRef::Object(&object), object_ty, target)
            .map_err(|failure| CastFailure {
                source: dynamic,
                ..failure
            })?;

        let value = consume(Value::Object(object), object_ty, inner, &*self.memory);
        Ok(Disposition::produced(value))
    }

    /// A foreign object into the value type it bridges from.
    pub(super) fn bridge_object_to_value(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let Some(object) = value.as_object() else {
            return Err(CastFailure::impossible(src_ty, target));
        };
        let failure = || CastFailure::impossible(object.dynamic_type(), target);

        let Some(witness) = self.bridge.witness(target).filter(|w| w.is_bridged(target)) else {
            return Err(failure());
        };
        if !object.class().is_subclass_of(witness.foreign_class(target)) {
            return Err(failure());
        }

        witness
            .conditionally_bridge_from_object(object, target)
            .map(Disposition::produced)
            .ok_or_else(failure)
    }
}
