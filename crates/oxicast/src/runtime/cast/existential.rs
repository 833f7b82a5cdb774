//! Opening and building existential containers.
//!
//! Casting *out of* an existential projects the stored value and casts that.
//! Casting *into* one checks every protocol of the target against the
//! dynamic type and records the container to build around the result.
//!
//! A class-bounded target needs an object. A class metatype becomes its
//! class object; a bridged value type is first converted to its foreign
//! object.

use super::Caster;
use crate::runtime::conformance::{WitnessTable, conforms_all};
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::{ExistentialRepresentation, Metadata, Type};
use crate::runtime::object::Object;
use crate::runtime::ownership::{Disposition, Wrap};
use crate::runtime::projection::{Projection, project};
use crate::runtime::value::{Value, ValueRef};

impl Caster {
    /// Opens an existential source and casts its contents to `target`.
    pub(super) fn from_existential(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let projection = project(value, src_ty);

        // An empty or malformed container projects to itself.
        if projection.ty == src_ty {
            return Err(CastFailure::impossible(src_ty, target));
        }

        let path = projection.path;
        self.resolve(projection.value, projection.ty, target)
            .map(|disposition| disposition.within_path(&path))
    }

    /// Any source into an existential target.
    pub(super) fn to_existential(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let projection = project(value, src_ty);
        let dynamic = projection.ty;

        match target.representation() {
            ExistentialRepresentation::Class => self.to_class_existential(projection, target),
            ExistentialRepresentation::Opaque => {
                let witnesses =
                    self.witnesses_for(projection.value.as_object(), dynamic, target)?;
                Ok(Disposition::projected(projection.path, dynamic)
                    .wrapped(Wrap::OpaqueExistential { ty: dynamic, witnesses }))
            }
            ExistentialRepresentation::ErrorBox => {
                let witnesses =
                    self.witnesses_for(projection.value.as_object(), dynamic, target)?;
                Ok(Disposition::projected(projection.path, dynamic).wrapped(Wrap::ErrorBox {
                    ty: dynamic,
                    witness: witnesses.first().copied(),
                }))
            }
        }
    }

    fn to_class_existential(
        &self,
        projection: Projection<'_>,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let dynamic = projection.ty;

        match dynamic.metadata() {
            Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => {
                let Some(object) = projection.value.as_object() else {
                    return Err(CastFailure::impossible(dynamic, target));
                };
                let witnesses = self.witnesses_for(Some(object), dynamic, target)?;
                Ok(Disposition::projected(projection.path, dynamic)
                    .wrapped(Wrap::ClassExistential(witnesses)))
            }
            Metadata::Metatype(metatype) => {
                let stored = metatype.instance();
                let Some(class_object) = Object::class_object(stored) else {
                    return Err(CastFailure::impossible(dynamic, target));
                };
                let witnesses = self.witnesses_for(None, stored, target)?;
                Ok(Disposition::produced(Value::Object(class_object))
                    .wrapped(Wrap::ClassExistential(witnesses)))
            }
            Metadata::Struct(_) | Metadata::Enum(_) | Metadata::Optional(_) => {
                self.bridge_into_class_existential(projection, target)
            }
            _ => Err(CastFailure::impossible(dynamic, target)),
        }
    }

    /// Checks every protocol of `target` against `ty`.
    pub(super) fn witnesses_for(
        &self,
        instance: Option<&Object>,
        ty: Type,
        target: Type,
    ) -> Result<Vec<WitnessTable>, CastFailure> {
        conforms_all(
            &*self.resolver,
            &*self.bridge,
            instance,
            ty,
            target.protocols(),
        )
        .ok_or_else(|| CastFailure::missing(ty, target))
    }
}
