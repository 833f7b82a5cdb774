//! Class targets.

use super::Caster;
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::{Metadata, Type};
use crate::runtime::ownership::Disposition;
use crate::runtime::value::ValueRef;

impl Caster {
    /// Casts to a class, class wrapper or foreign class.
    ///
    /// Objects pass if their class descends from the target. Otherwise an
    /// `Error`-conforming object may still become the foreign error class.
    /// Existentials are opened first. Structs and enums may reach a class by
    /// bridging.
    pub(super) fn to_class(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        match src_ty.metadata() {
            Metadata::Class(_) | Metadata::ClassWrapper(_) | Metadata::ForeignClass(_) => {
                let Some(object) = value.as_object() else {
                    return Err(CastFailure::impossible(src_ty, target));
                };

                if object.class().is_subclass_of(target) {
                    return Ok(Disposition::identity(src_ty));
                }

                self.bridge_error_to_class(value, object.class(), target)
                    .ok_or_else(|| CastFailure::impossible(object.dynamic_type(), target))
            }
            Metadata::Existential(_) => self.from_existential(value, src_ty, target),
            Metadata::Struct(_) | Metadata::Enum(_) => {
                self.bridge_value_to_class(value, src_ty, target)
            }
            _ => Err(CastFailure::impossible(src_ty, target)),
        }
    }
}
