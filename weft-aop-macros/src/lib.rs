//! Weft AOP 过程宏
//!
//! - `#[aspect]`：把 impl 块中带 `#[around("...")]` 的方法声明为通知，并提交切面注册
//! - `#[around]` / `#[privilege]`：只在 `#[aspect]` 块中有意义

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

mod aspect;

/// `#[aspect]` 宏
///
/// 切面类型本身用 `#[derive(Component)]` 声明；通知方法的签名是
/// `fn(&self, &JoinPoint<'_>) -> anyhow::Result<Value>`。
///
/// 使用示例：
/// ```ignore
/// #[derive(Component)]
/// #[component("com.acme.Timing")]
/// struct Timing;
///
/// #[aspect(privilege = 10)]
/// impl Timing {
///     #[around("execution(* com.acme.*.*(..))")]
///     #[privilege(1)]
///     fn time(&self, jp: &JoinPoint<'_>) -> anyhow::Result<Value> {
///         jp.proceed()
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn aspect(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemImpl);
    aspect::impl_aspect(attr.into(), input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// 通知的切点表达式，可以出现多次
#[proc_macro_attribute]
pub fn around(_attr: TokenStream, item: TokenStream) -> TokenStream {
    misplaced("#[around]", item)
}

/// 通知的优先级，数字越小越靠外
#[proc_macro_attribute]
pub fn privilege(_attr: TokenStream, item: TokenStream) -> TokenStream {
    misplaced("#[privilege]", item)
}

fn misplaced(attribute: &str, item: TokenStream) -> TokenStream {
    let item = proc_macro2::TokenStream::from(item);
    let error = syn::Error::new_spanned(
        &item,
        format!("{} is only allowed on methods inside an #[aspect] impl block", attribute),
    )
    .to_compile_error();
    quote::quote!(#error #item).into()
}
