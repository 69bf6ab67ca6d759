use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Error, FnArg, ImplItem, ImplItemFn, ItemImpl, Result, ReturnType, Type, Visibility};

use crate::type_helpers::{arc_inner, is_named, is_unit, result_inner, type_label};

/// 由容器声明的方法，不能再作为普通方法出现
const RESERVED: [&str; 2] = ["new", "init"];

/// 返回值的类型名与转换
fn returns(ty: Option<&Type>) -> (TokenStream, TokenStream) {
    match ty {
        None => (
            quote! { ::weft_core::constants::UNIT_TYPE_NAME },
            quote! { ::core::result::Result::Ok(::weft_core::utils::values::unit()) },
        ),
        Some(ty) if is_unit(ty) => returns(None),
        Some(ty) if is_named(ty, "Value") => (
            quote! { ::weft_core::constants::VALUE_TYPE_NAME },
            quote! { ::core::result::Result::Ok(result) },
        ),
        Some(ty) => (
            {
                let label = type_label(ty);
                quote! { #label }
            },
            quote! { ::core::result::Result::Ok(::weft_core::utils::values::value(result)) },
        ),
    }
}

fn declare_method(self_ty: &Type, method: &ImplItemFn) -> Result<TokenStream> {
    let ident = &method.sig.ident;
    let name = ident.to_string();
    if method.sig.asyncness.is_some() {
        return Err(Error::new_spanned(&method.sig, "component methods cannot be async"));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(Error::new_spanned(&method.sig.generics, "component methods cannot be generic"));
    }

    let modifiers = match method.vis {
        Visibility::Public(_) => quote! { ::weft_core::Modifiers::PUBLIC },
        _ => quote! { ::weft_core::Modifiers::PRIVATE },
    };

    let mut params = Vec::new();
    let mut bindings = Vec::new();
    let mut arguments = Vec::new();
    for (index, input) in method.sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(typed) = input else { continue };
        let ty = &*typed.ty;
        let argument = format_ident!("arg{}", index);
        match arc_inner(ty) {
            Some(inner) => {
                params.push(type_label(inner));
                bindings.push(quote! {
                    let #argument = ::weft_core::utils::values::downcast_value::<#inner>(&args[#index])?;
                });
            }
            None => {
                if matches!(ty, Type::Reference(_)) {
                    return Err(Error::new_spanned(ty, "take `Arc<T>` or an owned value instead of a reference"));
                }
                params.push(type_label(ty));
                bindings.push(quote! {
                    let #argument: #ty = ::core::clone::Clone::clone(
                        &*::weft_core::utils::values::downcast_value::<#ty>(&args[#index])?,
                    );
                });
            }
        }
        arguments.push(argument);
    }
    let arity = arguments.len();

    let call = quote! { this.#ident(#(#arguments),*) };
    let (output, call) = match &method.sig.output {
        ReturnType::Default => (None, call),
        ReturnType::Type(_, ty) => match result_inner(ty) {
            Some(inner) => (Some(inner), quote! { #call? }),
            None => (Some(&**ty), call),
        },
    };
    let (return_type, convert) = returns(output);
    let body = if output.map_or(true, is_unit) {
        quote! { #call; #convert }
    } else {
        quote! { let result = #call; #convert }
    };

    Ok(quote! {
        .with_method(
            ::weft_core::MethodDescriptor::new(#name)
                .modifiers(#modifiers)
                .returns(#return_type)
                #(.param(#params))*,
            |this: &#self_ty, args: &[::weft_core::Value]| {
                if args.len() != #arity {
                    return ::core::result::Result::Err(::weft_core::ContainerError::ArgumentCount {
                        method: ::std::format!("{}.{}", <#self_ty as ::weft_core::Component>::NAME, #name),
                        expected: #arity,
                        actual: args.len(),
                    }
                    .into());
                }
                #(#bindings)*
                #body
            },
        )
    })
}

pub(crate) fn component_methods_impl(input: ItemImpl) -> Result<TokenStream> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(Error::new_spanned(path, "#[component_methods] goes on an inherent impl block"));
    }
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(&input.generics, "#[component_methods] does not support generic impls"));
    }
    let self_ty = &*input.self_ty;

    let mut declarations = Vec::new();
    for item in &input.items {
        let ImplItem::Fn(method) = item else { continue };
        // 只声明 `&self` 方法
        let Some(FnArg::Receiver(receiver)) = method.sig.inputs.first() else {
            continue;
        };
        if receiver.reference.is_none() || receiver.mutability.is_some() {
            continue;
        }
        if RESERVED.contains(&method.sig.ident.to_string().as_str()) {
            continue;
        }
        declarations.push(declare_method(self_ty, method)?);
    }

    Ok(quote! {
        #input

        impl #self_ty {
            #[doc(hidden)]
            fn __weft_declare_methods(
                definition: ::weft_core::ComponentDefinition,
            ) -> ::weft_core::ComponentDefinition {
                definition #(#declarations)*
            }
        }

        ::weft_core::inventory::submit! {
            ::weft_core::MethodRegistration {
                component: <#self_ty as ::weft_core::Component>::NAME,
                declare: <#self_ty>::__weft_declare_methods,
            }
        }
    })
}
