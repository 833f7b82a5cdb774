//! Optional sources and targets.

use super::Caster;
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::{Kind, Type};
use crate::runtime::ownership::{Disposition, Wrap};
use crate::runtime::projection::Step;
use crate::runtime::value::{Value, ValueRef};

impl Caster {
    /// An optional source. An existential target may take the optional as
    /// it is; otherwise the payload is cast and `none` only survives into
    /// another optional.
    pub(super) fn from_optional(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        if target.kind() == Kind::Existential {
            if let Ok(disposition) = self.to_existential(value, src_ty, target) {
                return Ok(disposition);
            }
        }

        match value.as_value() {
            Some(Value::Optional(None)) if target.kind() == Kind::Optional => {
                Ok(Disposition::identity(src_ty))
            }
            Some(Value::Optional(Some(payload))) => self
                .resolve(ValueRef::Value(payload), src_ty.payload(), target)
                .map(|disposition| disposition.within(Step::OptionalPayload, true)),
            _ => Err(CastFailure::impossible(src_ty, target)),
        }
    }

    /// A non-optional source into an optional target.
    pub(super) fn to_optional(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        if src_ty.kind() == Kind::Existential {
            return self.from_existential(value, src_ty, target);
        }

        self.resolve(value, src_ty, target.payload())
            .map(|disposition| disposition.wrapped(Wrap::Some))
    }
}
