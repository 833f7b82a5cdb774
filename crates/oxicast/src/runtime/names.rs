//! Human-readable type names.
//!
//! [`type_name`] renders a descriptor once and memoizes the result for the
//! life of the process. Rendered strings are stored in the metadata arena,
//! so the returned `&'static str` never dangles.
//!
//! The cache is append-only. A reader takes the shared lock. On a miss the
//! names of the component types are looked up first (each through this same
//! cache), then the exclusive lock is taken and the entry checked again; the
//! name is composed and published only if it is still missing.

use crate::runtime::metadata::{FunctionConvention, Metadata, Type};
use crate::runtime::protocol::{Protocol, SpecialProtocol};
use fxhash::FxHashMap;
use oxicast_mem::global_arena;
use std::sync::{OnceLock, RwLock};

/// Placeholder for types that have no printable form.
pub const INVALID_TYPE_NAME: &str = "<<<invalid type>>>";

const OPAQUE_TYPE_NAME: &str = "<<<opaque type>>>";

type NameCache = RwLock<FxHashMap<(Type, bool), &'static str>>;

static NAMES: OnceLock<NameCache> = OnceLock::new();

fn cache() -> &'static NameCache {
    NAMES.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Returns the display name of `ty`. With `qualified`, nominal types are
/// prefixed by their module.
///
/// # Example
///
/// ```
/// use oxicast::runtime::{Type, type_name};
///
/// let int = Type::new_struct("Docs.NamesInt").unwrap();
///
/// assert_eq!(type_name(Type::optional(int), false), "Optional<NamesInt>");
/// assert_eq!(type_name(int, true), "Docs.NamesInt");
/// ```
#[must_use]
pub fn type_name(ty: Type, qualified: bool) -> &'static str {
    let key = (ty, qualified);

    if let Some(name) = cache().read().unwrap().get(&key).copied() {
        return name;
    }

    let parts = component_names(ty, qualified);

    let mut names = cache().write().unwrap();
    if let Some(name) = names.get(&key).copied() {
        return name;
    }

    let name = global_arena().alloc_str(&compose(ty, qualified, &parts));
    names.insert(key, name);
    name
}

/// Names of the types `ty` is built from, in the order [`compose`] reads
/// them.
fn component_names(ty: Type, qualified: bool) -> Vec<&'static str> {
    let names = |types: &[Type]| -> Vec<&'static str> {
        types.iter().map(|ty| type_name(*ty, qualified)).collect()
    };

    match ty.metadata() {
        Metadata::Struct(nominal_type) | Metadata::Enum(nominal_type) => {
            names(nominal_type.generic_args())
        }
        Metadata::Optional(optional) => names(&[optional.payload()]),
        Metadata::Tuple(tuple) => names(tuple.elements()),
        Metadata::Function(function) => {
            let mut parts: Vec<&'static str> = function
                .params()
                .iter()
                .map(|param| type_name(param.ty, qualified))
                .collect();
            parts.push(type_name(function.result(), qualified));
            parts
        }
        Metadata::Metatype(metatype) => names(&[metatype.instance()]),
        Metadata::ExistentialMetatype(metatype) => names(&[metatype.instance()]),
        Metadata::ClassWrapper(wrapper) => names(&[wrapper.class()]),
        _ => Vec::new(),
    }
}

fn nominal(module: Option<&str>, name: &str, qualified: bool) -> String {
    match module {
        Some(module) if qualified => format!("{module}.{name}"),
        _ => name.to_string(),
    }
}

fn protocol_name(protocol: Protocol, qualified: bool) -> String {
    match protocol.special() {
        SpecialProtocol::None => nominal(protocol.module(), protocol.name(), qualified),
        _ => protocol.name().to_string(),
    }
}

/// Formats `ty` from the already rendered names of its components. Never
/// touches the cache.
fn compose(ty: Type, qualified: bool, parts: &[&'static str]) -> String {
    match ty.metadata() {
        Metadata::Class(class) => nominal(class.module(), class.name(), qualified),
        Metadata::Struct(nominal_type) | Metadata::Enum(nominal_type) => {
            let base = nominal(nominal_type.module(), nominal_type.name(), qualified);
            if parts.is_empty() {
                base
            } else {
                format!("{base}<{}>", parts.join(", "))
            }
        }
        Metadata::Optional(_) => format!("Optional<{}>", parts[0]),
        Metadata::ForeignClass(class) => class.name().to_string(),
        Metadata::Opaque(_) => OPAQUE_TYPE_NAME.to_string(),
        Metadata::Tuple(_) => format!("({})", parts.join(", ")),
        Metadata::Function(function) => {
            let convention = match function.convention() {
                FunctionConvention::Native => "",
                FunctionConvention::Thin => "@convention(thin) ",
                FunctionConvention::Block => "@convention(block) ",
                FunctionConvention::CFunctionPointer => "@convention(c) ",
            };
            let (result, params) = match parts.split_last() {
                Some((result, params)) => (*result, params),
                None => (INVALID_TYPE_NAME, parts),
            };
            let params = function
                .params()
                .iter()
                .zip(params)
                .map(|(param, name)| {
                    if param.inout {
                        format!("inout {name}")
                    } else {
                        (*name).to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            let throws = if function.throws() { " throws" } else { "" };

            format!("{convention}({params}){throws} -> {result}")
        }
        Metadata::Existential(existential) => match existential.protocols() {
            [] => "Any".to_string(),
            [only] => protocol_name(*only, qualified),
            protocols => {
                let names = protocols
                    .iter()
                    .map(|protocol| protocol_name(*protocol, qualified))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("protocol<{names}>")
            }
        },
        Metadata::Metatype(metatype) => {
            let name = parts[0];
            match metatype.instance().metadata() {
                Metadata::Existential(_) => format!("({name}).Protocol"),
                Metadata::Function(_) => format!("({name}).Type"),
                _ => format!("{name}.Type"),
            }
        }
        Metadata::ExistentialMetatype(_) => format!("{}.Type", parts[0]),
        Metadata::ClassWrapper(_) => parts[0].to_string(),
        Metadata::HeapLocalVariable
        | Metadata::HeapGenericLocalVariable
        | Metadata::ErrorObject => INVALID_TYPE_NAME.to_string(),
    }
}
