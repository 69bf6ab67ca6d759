use proc_macro2::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Attribute, Error, Ident, LitStr, Meta, Result, Token};

fn attributes<'a>(attrs: &'a [Attribute], name: &'a str) -> impl Iterator<Item = &'a Attribute> + 'a {
    attrs.iter().filter(move |attr| attr.path().is_ident(name))
}

/// `#[name]` 返回 None，`#[name("value")]` 返回该值
fn optional_string(attr: &Attribute) -> Result<Option<LitStr>> {
    match &attr.meta {
        Meta::Path(_) => Ok(None),
        _ => attr.parse_args::<LitStr>().map(Some),
    }
}

/// 从 `#[component("name")]` 或 `#[component(name = "name")]` 中提取类型名称
pub(crate) fn get_component_name(attrs: &[Attribute]) -> Result<Option<LitStr>> {
    let mut found = None;
    for attr in attributes(attrs, "component") {
        if found.is_some() {
            return Err(Error::new_spanned(attr, "duplicate #[component] attribute"));
        }
        if let Ok(name) = attr.parse_args::<LitStr>() {
            found = Some(name);
            continue;
        }
        let mut name = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        })?;
        found = name;
    }
    Ok(found)
}

/// `#[extends("a", "b")]`，可以出现多次
pub(crate) fn get_supertypes(attrs: &[Attribute]) -> Result<Vec<LitStr>> {
    list_of_strings(attrs, "extends")
}

/// `#[annotate("com.acme.Tagged")]`，可以出现多次
pub(crate) fn get_annotations(attrs: &[Attribute]) -> Result<Vec<LitStr>> {
    list_of_strings(attrs, "annotate")
}

fn list_of_strings(attrs: &[Attribute], name: &str) -> Result<Vec<LitStr>> {
    let mut values = Vec::new();
    for attr in attributes(attrs, name) {
        let list = attr.parse_args_with(Punctuated::<LitStr, Token![,]>::parse_terminated)?;
        values.extend(list);
    }
    Ok(values)
}

/// `#[scope("singleton")]` 或 `#[scope("prototype")]`
pub(crate) fn get_scope(attrs: &[Attribute]) -> Result<Option<TokenStream>> {
    let mut scopes = attributes(attrs, "scope");
    let Some(attr) = scopes.next() else {
        return Ok(None);
    };
    if let Some(duplicate) = scopes.next() {
        return Err(Error::new_spanned(duplicate, "a component declares at most one #[scope]"));
    }
    let scope = attr.parse_args::<LitStr>()?;
    match scope.value().as_str() {
        "singleton" => Ok(Some(quote! { ::weft_core::Scope::Singleton })),
        "prototype" => Ok(Some(quote! { ::weft_core::Scope::Prototype })),
        other => Err(Error::new_spanned(
            &scope,
            format!("unknown scope '{}', expected \"singleton\" or \"prototype\"", other),
        )),
    }
}

pub(crate) fn get_lazy(attrs: &[Attribute]) -> bool {
    attributes(attrs, "lazy").next().is_some()
}

/// `#[init]` 调用 `init`，`#[init("start")]` 调用 `start`
pub(crate) fn get_init_method(attrs: &[Attribute]) -> Result<Option<Ident>> {
    match attributes(attrs, "init").next() {
        None => Ok(None),
        Some(attr) => {
            let name = match optional_string(attr)? {
                Some(lit) => lit.parse::<Ident>()?,
                None => Ident::new("init", proc_macro2::Span::call_site()),
            };
            Ok(Some(name))
        }
    }
}

/// 字段上的 `#[autowired]` / `#[autowired("com.acme.Type")]`
///
/// 外层 None 表示不是注入点，内层是显式的字段类型
pub(crate) fn get_autowired(attrs: &[Attribute]) -> Result<Option<Option<LitStr>>> {
    match attributes(attrs, "autowired").next() {
        None => Ok(None),
        Some(attr) => optional_string(attr).map(Some),
    }
}
