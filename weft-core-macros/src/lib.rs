//! Weft 核心过程宏
//!
//! - `#[derive(Component)]`：从结构体生成类型描述符、分配函数并提交组件注册
//! - `#[component_methods]`：把 impl 块中的 `&self` 方法声明为可分派的方法

mod attribute_helpers;
mod component_impl;
mod methods_impl;
mod type_helpers;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput, ItemImpl};

/// Component 派生宏
///
/// 用法：
/// ```ignore
/// #[derive(Component)]
/// #[component("com.acme.Service")]      // 可选：类型名称，默认是结构体名
/// // 或
/// #[component(name = "com.acme.Service")]
/// #[extends("com.acme.Store")]          // 可选：父类型，可以有多个
/// #[annotate("com.acme.Tagged")]        // 可选：类型注解
/// #[scope("prototype")]                 // 可选：singleton / prototype
/// #[lazy]                               // 可选：延迟初始化
/// #[init]                               // 可选：初始化回调（默认调用 init 方法）
/// #[init("start")]                      // 可选：自定义初始化方法名
/// struct Service {
///     #[autowired]                      // Arc<T>，T 也是 Component
///     repo: Arc<Repository>,
///     #[autowired("com.acme.Clock")]    // 显式指定字段类型
///     clock: Arc<ComponentRef>,
///     hits: AtomicU32,                  // 其它字段使用 Default
/// }
/// ```
#[proc_macro_derive(Component, attributes(component, extends, annotate, scope, lazy, init, autowired))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    component_impl::derive_component_impl(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// 方法声明宏
///
/// 每个 `&self` 方法（`init` 除外）成为组件的一个方法连接点：
/// `pub` 方法是 public，其它是 private（不可拦截）。
/// 参数按位置从调用参数中取出，`Arc<T>` 参数直接传递，其它类型克隆。
/// 返回 `Result<T, E>` 时错误原样传出。
///
/// ```ignore
/// #[component_methods]
/// impl Service {
///     pub fn save(&self, id: String) -> anyhow::Result<String> { ... }
/// }
/// ```
///
/// 每个类型只能有一个 `#[component_methods]` 块。
#[proc_macro_attribute]
pub fn component_methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[component_methods] takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    let input = parse_macro_input!(item as ItemImpl);
    methods_impl::component_methods_impl(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
