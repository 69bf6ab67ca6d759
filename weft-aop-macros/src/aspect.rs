//! `#[aspect]` 宏实现

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::{Error, FnArg, ImplItem, ImplItemFn, ItemImpl, LitInt, LitStr, Result};

/// 从通知方法上取下 `#[around]` 与 `#[privilege]`
fn take_advice_attributes(method: &mut ImplItemFn) -> Result<(Vec<LitStr>, Option<LitInt>)> {
    let mut expressions = Vec::new();
    let mut privilege: Option<LitInt> = None;
    let mut kept = Vec::new();

    for attr in std::mem::take(&mut method.attrs) {
        if attr.path().is_ident("around") {
            expressions.push(attr.parse_args::<LitStr>()?);
        } else if attr.path().is_ident("privilege") {
            if privilege.is_some() {
                return Err(Error::new_spanned(attr, "duplicate #[privilege]"));
            }
            privilege = Some(attr.parse_args::<LitInt>()?);
        } else {
            kept.push(attr);
        }
    }
    method.attrs = kept;
    Ok((expressions, privilege))
}

/// `#[aspect(privilege = N)]`
fn aspect_privilege(attr: TokenStream) -> Result<Option<LitInt>> {
    let mut privilege = None;
    if attr.is_empty() {
        return Ok(privilege);
    }
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("privilege") {
            privilege = Some(meta.value()?.parse::<LitInt>()?);
            Ok(())
        } else {
            Err(meta.error("expected `privilege = <integer>`"))
        }
    });
    parser.parse2(attr)?;
    Ok(privilege)
}

fn check_signature(method: &ImplItemFn) -> Result<()> {
    let mut inputs = method.sig.inputs.iter();
    let by_ref = matches!(
        inputs.next(),
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none()
    );
    let one_more = matches!(inputs.next(), Some(FnArg::Typed(_))) && inputs.next().is_none();
    if by_ref && one_more && method.sig.asyncness.is_none() {
        Ok(())
    } else {
        Err(Error::new_spanned(
            &method.sig,
            "advice methods take `&self` and a `&JoinPoint<'_>` and return `anyhow::Result<Value>`",
        ))
    }
}

pub(crate) fn impl_aspect(attr: TokenStream, mut input: ItemImpl) -> Result<TokenStream> {
    if input.trait_.is_some() || !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.self_ty,
            "#[aspect] goes on a non-generic inherent impl block",
        ));
    }
    let type_privilege = aspect_privilege(attr)?.map(|level| quote! { .privilege(#level) });
    let self_ty = input.self_ty.clone();

    let mut advices = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else { continue };
        let (expressions, privilege) = take_advice_attributes(method)?;
        if expressions.is_empty() {
            if let Some(privilege) = privilege {
                return Err(Error::new_spanned(privilege, "#[privilege] needs at least one #[around]"));
            }
            continue;
        }
        check_signature(method)?;

        let ident = &method.sig.ident;
        let name = ident.to_string();
        let privilege = privilege.map(|level| quote! { .privilege(#level) });
        advices.push(quote! {
            .around(
                ::weft_core::MethodDescriptor::advice(#name)
                    #(.around(#expressions))*
                    #privilege,
                |this: &#self_ty, jp: &::weft_aop::JoinPoint<'_>| this.#ident(jp),
            )
        });
    }

    if advices.is_empty() {
        return Err(Error::new_spanned(
            &input.self_ty,
            "#[aspect] impl block declares no #[around] advice",
        ));
    }

    Ok(quote! {
        #input

        impl #self_ty {
            #[doc(hidden)]
            fn __weft_aspect_definition() -> ::weft_aop::AspectDefinition {
                ::weft_aop::AspectDefinition::from_component(
                    <#self_ty as ::weft_core::Component>::definition(),
                )
                #type_privilege
                #(#advices)*
            }
        }

        ::weft_aop::inventory::submit! {
            ::weft_aop::AspectRegistration::new(
                <#self_ty as ::weft_core::Component>::NAME,
                <#self_ty>::__weft_aspect_definition,
            )
        }
    })
}
