//! Function targets.

use super::Caster;
use crate::runtime::diagnostics::CastFailure;
use crate::runtime::metadata::{FunctionMetadata, Metadata, Type};
use crate::runtime::ownership::Disposition;
use crate::runtime::value::ValueRef;

/// True if a function of type `source` may be used as `target` unchanged:
/// same convention, same result, identical parameters (including `inout`),
/// and a non-throwing target only accepts non-throwing sources.
#[must_use]
pub fn is_function_compatible(source: &FunctionMetadata, target: &FunctionMetadata) -> bool {
    source.convention() == target.convention()
        && (target.throws() || !source.throws())
        && source.result() == target.result()
        && source.params() == target.params()
}

impl Caster {
    pub(super) fn to_function(
        &self,
        value: ValueRef<'_>,
        src_ty: Type,
        target: Type,
    ) -> Result<Disposition, CastFailure> {
        match src_ty.metadata() {
            Metadata::Function(source) if is_function_compatible(source, target.signature()) => {
                Ok(Disposition::identity(src_ty))
            }
            Metadata::Existential(_) => self.from_existential(value, src_ty, target),
            _ => Err(CastFailure::impossible(src_ty, target)),
        }
    }
}
