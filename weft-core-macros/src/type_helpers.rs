use quote::ToTokens;
use syn::{GenericArgument, PathArguments, Type};

/// 路径类型的最后一段
fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(type_path) if type_path.qself.is_none() => type_path.path.segments.last(),
        _ => None,
    }
}

/// 第一个泛型参数
fn first_generic(segment: &syn::PathSegment) -> Option<&Type> {
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}

/// `Arc<T>` 中的 `T`
pub(crate) fn arc_inner(ty: &Type) -> Option<&Type> {
    last_segment(ty)
        .filter(|segment| segment.ident == "Arc")
        .and_then(first_generic)
}

/// `Result<T, ..>` 中的 `T`
pub(crate) fn result_inner(ty: &Type) -> Option<&Type> {
    last_segment(ty)
        .filter(|segment| segment.ident == "Result")
        .and_then(first_generic)
}

pub(crate) fn is_named(ty: &Type, name: &str) -> bool {
    last_segment(ty).map_or(false, |segment| segment.ident == name)
}

pub(crate) fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

/// 描述符中使用的类型名：按源码书写，路径分隔符换成 `.`
///
/// `String` -> `"String"`，`std::vec::Vec<u8>` -> `"std.vec.Vec<u8>"`
pub(crate) fn type_label(ty: &Type) -> String {
    ty.to_token_stream()
        .to_string()
        .replace(' ', "")
        .replace("::", ".")
}
