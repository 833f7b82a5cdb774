//! Metatype and existential-metatype targets.

use super::Caster;
use crate::runtime::conformance::{WitnessTable, conforms_all};
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::{Metadata, Type};
use crate::runtime::ownership::{Disposition, existential_metatype_value};
use crate::runtime::projection::project;
use crate::runtime::value::{Value, ValueRef};

/// Casts the type `source` to the type `target`, both taken as metatype
/// values.
///
/// A class-family target accepts any class that descends from it. Every
/// other target only accepts itself.
///
/// # Example
///
/// ```
/// use oxicast::runtime::{Type, cast_metatype_type};
///
/// let base = Type::new_class("Docs.MetaBase", None).unwrap();
/// let derived = Type::new_class("Docs.MetaDerived", Some(base)).unwrap();
///
/// assert_eq!(cast_metatype_type(derived, base), Some(derived));
/// assert_eq!(cast_metatype_type(base, derived), None);
/// ```
#[must_use]
pub fn cast_metatype_type(source: Type, target: Type) -> Option<Type> {
    let accepted = if target.kind().is_class_family() {
        source.kind().is_class_family() && source.is_subclass_of(target)
    } else {
        source == target
    };

    accepted.then_some(source)
}

impl Caster {
    pub(super) fn to_metatype(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let projection = project(value, src_ty);
        let Some(stored) = projection.value.as_metatype() else {
            return Err(CastFailure::impossible(projection.ty, target));
        };

        match cast_metatype_type(stored, target.instance_type()) {
            Some(stored) => Ok(Disposition::produced(Value::Metatype(stored))),
            None => Err(CastFailure::impossible(projection.ty, target)),
        }
    }

    pub(super) fn to_existential_metatype(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        let projection = project(value, src_ty);
        let Some(stored) = projection.value.as_metatype() else {
            return Err(CastFailure::impossible(projection.ty, target));
        };

        let witnesses = self.existential_metatype_witnesses(stored, target, projection.ty, target)?;
        Ok(Disposition::produced(existential_metatype_value(stored, witnesses)))
    }

    /// Witness tables for storing `stored` in `target`. Nested existential
    /// metatypes peel one metatype level off both sides per step. A stored
    /// type of the wrong shape is cast-impossible; only a failed protocol
    /// lookup is a missing conformance. Failures name `source` and
    /// `requested`.
    fn existential_metatype_witnesses(
        &self,
        stored: Type,
        target: Type,
        source: Type,
        requested: Type,
    ) -> Result<Vec<WitnessTable>, CastFailure> {
        let instance = target.instance_type();

        match instance.metadata() {
            Metadata::Existential(existential) => conforms_all(
                &*self.resolver,
                &*self.bridge,
                None,
                stored,
                existential.protocols(),
            )
            .ok_or_else(|| CastFailure::missing(source, requested)),
            Metadata::ExistentialMetatype(_) => match stored.metadata() {
                Metadata::Metatype(metatype) => self.existential_metatype_witnesses(
                    metatype.instance(),
                    instance,
                    source,
                    requested,
                ),
                _ => Err(CastFailure::impossible(source, requested)),
            },
            _ => Err(CastFailure::impossible(source, requested)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::conformance::ConformanceRegistry;
    use crate::runtime::diagnostics::CastFailureKind;
    use crate::runtime::flags::DynamicCastFlags;
    use crate::runtime::protocol::Protocol;
    use crate::runtime::value::{ExistentialMetatypeValue, Slot};
    use std::sync::Arc;

    #[test]
    fn test_class_metatype_upcast() {
        let base = Type::new_class("MetaCast.Base", None).unwrap();
        let derived = Type::new_class("MetaCast.Derived", Some(base)).unwrap();
        let caster = Caster::new();

        let mut src = Slot::new(Value::Metatype(derived));
        let mut dest = Slot::empty();
        assert!(caster.dynamic_cast(
            &mut dest,
            &mut src,
            Type::metatype(derived),
            Type::metatype(base),
            DynamicCastFlags::NONE
        ));
        assert_eq!(dest.get(), Some(&Value::Metatype(derived)));

        assert!(caster
            .check_cast(&Value::Metatype(base), Type::metatype(base), Type::metatype(derived))
            .is_err());
    }

    #[test]
    fn test_value_metatypes_need_identity() {
        let a = Type::new_struct("MetaCast.A").unwrap();
        let b = Type::new_struct("MetaCast.B").unwrap();

        assert_eq!(cast_metatype_type(a, a), Some(a));
        assert_eq!(cast_metatype_type(a, b), None);
    }

    #[test]
    fn test_metatype_out_of_any() {
        let int = Type::new_struct("MetaCast.Int").unwrap();
        let boxed = Value::Existential(crate::runtime::value::Existential::opaque(
            Type::metatype(int),
            Value::Metatype(int),
            Vec::new(),
        ));

        let caster = Caster::new();
        assert!(caster.check_cast(&boxed, Type::any(), Type::metatype(int)).is_ok());
    }

    #[test]
    fn test_existential_metatype_collects_witnesses() {
        let registry = Arc::new(ConformanceRegistry::new());
        let shape = Type::new_struct("MetaCast.Square").unwrap();
        let drawable = Protocol::new("MetaCast.Drawable", &[]).unwrap();
        let table = registry.declare(shape, drawable).unwrap();
        let caster = Caster::builder().resolver(registry).build();

        let drawable_type = Type::existential_metatype(Type::existential(&[drawable])).unwrap();
        let mut src = Slot::new(Value::Metatype(shape));
        let mut dest = Slot::empty();
        assert!(caster.dynamic_cast(
            &mut dest,
            &mut src,
            Type::metatype(shape),
            drawable_type,
            DynamicCastFlags::NONE
        ));
        assert_eq!(
            dest.get(),
            Some(&Value::ExistentialMetatype(ExistentialMetatypeValue {
                ty: shape,
                witnesses: vec![table],
            }))
        );
    }

    #[test]
    fn test_nested_existential_metatype() {
        let registry = Arc::new(ConformanceRegistry::new());
        let shape = Type::new_struct("MetaCast.Circle").unwrap();
        let drawable = Protocol::new("MetaCast.Round", &[]).unwrap();
        registry.declare(shape, drawable).unwrap();
        let caster = Caster::builder().resolver(registry).build();

        let drawable_type = Type::existential_metatype(Type::existential(&[drawable])).unwrap();
        let drawable_type_type = Type::existential_metatype(drawable_type).unwrap();
        let stored = Type::metatype(shape);

        assert!(caster
            .check_cast(&Value::Metatype(stored), Type::metatype(stored), drawable_type_type)
            .is_ok());
        assert!(caster
            .check_cast(&Value::Metatype(shape), Type::metatype(shape), drawable_type_type)
            .is_err());
    }

    #[test]
    fn test_existential_metatype_failure_kinds() {
        let registry = Arc::new(ConformanceRegistry::new());
        let point = Type::new_struct("MetaCast.Point").unwrap();
        let plottable = Protocol::new("MetaCast.Plottable", &[]).unwrap();
        let caster = Caster::builder().resolver(registry).build();

        let plottable_type = Type::existential_metatype(Type::existential(&[plottable])).unwrap();
        let plottable_type_type = Type::existential_metatype(plottable_type).unwrap();

        let missing = caster
            .check_cast(&Value::Metatype(point), Type::metatype(point), plottable_type)
            .unwrap_err();
        assert_eq!(missing.kind, CastFailureKind::ConformanceMissing);

        let nested = caster
            .check_cast(&Value::Metatype(point), Type::metatype(point), plottable_type_type)
            .unwrap_err();
        assert_eq!(nested.kind, CastFailureKind::CastImpossible);
        assert_eq!(nested.source, Type::metatype(point));

        let not_a_type = caster
            .check_cast(&Value::Bits(1), point, plottable_type)
            .unwrap_err();
        assert_eq!(not_a_type.kind, CastFailureKind::CastImpossible);
    }
}
