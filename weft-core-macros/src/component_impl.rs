use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Result};

use crate::attribute_helpers::{
    get_annotations, get_autowired, get_component_name, get_init_method, get_lazy, get_scope,
    get_supertypes,
};
use crate::type_helpers::{arc_inner, is_named};

pub(crate) fn derive_component_impl(input: &DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "#[derive(Component)] does not support generic types",
        ));
    }

    // 默认使用结构体名（空包）
    let type_name = match get_component_name(&input.attrs)? {
        Some(lit) => quote! { #lit },
        None => {
            let simple = name.to_string();
            quote! { #simple }
        }
    };

    let fields: Vec<_> = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    &data.fields,
                    "#[derive(Component)] needs named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                input,
                "#[derive(Component)] only supports structs",
            ))
        }
    };

    let mut field_descriptors = Vec::new();
    let mut initializers = Vec::new();
    for field in fields {
        let Some(ident) = &field.ident else { continue };
        let key = ident.to_string();

        let Some(explicit) = get_autowired(&field.attrs)? else {
            initializers.push(quote! { #ident: ::core::default::Default::default() });
            continue;
        };

        let inner = arc_inner(&field.ty).ok_or_else(|| {
            Error::new_spanned(&field.ty, "#[autowired] fields must be `Arc<T>`")
        })?;
        let by_handle = is_named(inner, "ComponentRef");
        let field_type = match (explicit, by_handle) {
            (Some(lit), _) => quote! { #lit },
            (None, false) => quote! { <#inner as ::weft_core::Component>::NAME },
            (None, true) => {
                return Err(Error::new_spanned(
                    &field.ty,
                    "`Arc<ComponentRef>` fields need the component type: #[autowired(\"com.acme.Repository\")]",
                ))
            }
        };

        field_descriptors.push(quote! {
            .field(::weft_core::FieldDescriptor::new(#key, #field_type))
        });
        initializers.push(if by_handle {
            quote! { #ident: wiring.component(#key)? }
        } else {
            quote! { #ident: wiring.get::<#inner>(#key)? }
        });
    }

    let supertypes = get_supertypes(&input.attrs)?;
    let annotations = get_annotations(&input.attrs)?;
    let scope = get_scope(&input.attrs)?.map(|scope| quote! { .with_scope(#scope) });
    let lazy = get_lazy(&input.attrs).then(|| quote! { .with_lazy(true) });
    let init = get_init_method(&input.attrs)?.map(|method| {
        quote! { .with_init(|this: &Self| this.#method()) }
    });

    Ok(quote! {
        impl ::weft_core::Component for #name {
            const NAME: &'static str = #type_name;

            fn descriptor() -> ::weft_core::TypeDescriptor {
                ::weft_core::TypeDescriptor::new(<Self as ::weft_core::Component>::NAME)
                    #(.extends(#supertypes))*
                    #(.annotate(::weft_core::Annotation::new(#annotations)))*
                    #(#field_descriptors)*
            }

            #[allow(unused_variables)]
            fn allocate(wiring: &::weft_core::Wiring) -> ::weft_core::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#initializers),*
                })
            }

            fn configure(definition: ::weft_core::ComponentDefinition) -> ::weft_core::ComponentDefinition {
                definition #scope #lazy #init
            }
        }

        ::weft_core::inventory::submit! {
            ::weft_core::ComponentRegistration {
                name: <#name as ::weft_core::Component>::NAME,
                create: <#name as ::weft_core::Component>::definition,
            }
        }
    })
}
