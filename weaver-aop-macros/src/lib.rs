//! Weaver AOP 过程宏
//!
//! 提供生成代理类型的过程宏：
//! - `#[aop_interface]` - 接口代理：为 trait 生成方法描述、分派和代理视图
//! - `#[aop_class]` - 子类代理：为具体类型生成 super 调用表和代理视图

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl, ItemTrait};

mod class;
mod interface;
mod utils;

/// `#[aop_interface]` 宏
///
/// 将 trait 标记为可代理的接口
///
/// 使用示例：
/// ```ignore
/// use weaver_aop::prelude::*;
///
/// #[aop_interface]
/// pub trait UserService: Send + Sync {
///     fn find_user(&self, id: u64) -> anyhow::Result<String>;
/// }
///
/// // 生成 `UserServiceProxy`，它实现了 `UserService`
/// let users: UserServiceProxy = factory.proxy()?;
/// ```
///
/// 方法要求：`&self` 接收者、拥有所有权的参数、返回 `Result`
#[proc_macro_attribute]
pub fn aop_interface(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[aop_interface] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let item = parse_macro_input!(item as ItemTrait);
    interface::impl_aop_interface(item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// `#[aop_class]` 宏
///
/// 放在具体类型的 inherent impl 上，使其支持子类代理
///
/// 使用示例：
/// ```ignore
/// #[aop_class(interfaces(UserService))]
/// impl UserServiceImpl {
///     pub fn rename(&self, id: u64, name: String) -> anyhow::Result<()> { ... }
///
///     #[aop_final]
///     pub fn version(&self) -> anyhow::Result<String> { ... }
/// }
/// ```
///
/// 参数：
/// - `interfaces(A, B)` - 该类型实现的 `#[aop_interface]` trait
/// - `sealed` - 类型不可被子类代理
#[proc_macro_attribute]
pub fn aop_class(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = class::ClassArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);

    let item = parse_macro_input!(item as ItemImpl);
    class::impl_aop_class(args, item)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
