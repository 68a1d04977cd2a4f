//! `#[aop_class]` 实现
//!
//! 作用在具体类型的 inherent impl 上，生成子类代理所需的一切：
//! - 类型描述常量 `__WEAVER_CLASS`
//! - 每个候选方法的 "super" 调用 `__weaver_super_<name>`
//! - `ProxyTarget` / `ClassProxyable` 实现
//! - `TypeProxy` 代理视图，暴露与原类型相同的方法
//!
//! 候选方法：`pub` 且以 `&self` 为接收者的方法。标注 `#[aop_final]` 的方法不可被覆盖，
//! advisor 匹配到它时代理创建失败。

use crate::utils::{has_attr, proxy_ident, ProxyMethod};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{FnArg, ImplItem, ItemImpl, Path, Type, Visibility};

const MACRO: &str = "aop_class";

/// `#[aop_class(...)]` 参数
#[derive(Default)]
pub struct ClassArgs {
    /// 不可被子类代理的类型
    sealed: bool,
    interfaces: Vec<Path>,
}

impl ClassArgs {
    pub fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("sealed") {
            self.sealed = true;
            Ok(())
        } else if meta.path.is_ident("interfaces") {
            meta.parse_nested_meta(|nested| {
                self.interfaces.push(nested.path);
                Ok(())
            })
        } else {
            Err(meta.error("unsupported #[aop_class] argument, expected `sealed` or `interfaces(...)`"))
        }
    }
}

pub fn impl_aop_class(args: ClassArgs, mut item: ItemImpl) -> syn::Result<TokenStream> {
    if item.trait_.is_some() {
        return Err(syn::Error::new_spanned(
            &item.self_ty,
            "#[aop_class] must be placed on an inherent impl block",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[aop_class] does not support generic types",
        ));
    }

    let self_ty = (*item.self_ty).clone();
    let type_ident = match &self_ty {
        Type::Path(type_path) => match type_path.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(syn::Error::new_spanned(&self_ty, "expected a type name")),
        },
        other => return Err(syn::Error::new_spanned(other, "expected a type name")),
    };
    let type_name = type_ident.to_string();

    let mut methods = Vec::new();
    for impl_item in &mut item.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        let is_candidate = matches!(method.vis, Visibility::Public(_))
            && matches!(method.sig.inputs.first(), Some(FnArg::Receiver(_)));
        if is_candidate {
            methods.push(ProxyMethod::parse(&method.sig, &method.attrs, MACRO)?);
        } else if has_attr(&method.attrs, "aop_final") {
            return Err(syn::Error::new_spanned(
                &method.sig,
                "#[aop_final] only applies to public `&self` methods",
            ));
        }
        // 标记属性不会留在输出中
        method.attrs.retain(|attr| !attr.path().is_ident("aop_final"));
    }

    let sealed = args.sealed;
    let interfaces = &args.interfaces;
    let descriptors = methods.iter().map(|m| m.descriptor(&type_name));

    let super_idents: Vec<_> = methods
        .iter()
        .map(|m| format_ident!("__weaver_super_{}", m.ident))
        .collect();

    let super_fns = methods.iter().zip(&super_idents).enumerate().map(|(index, (m, super_ident))| {
        let ident = &m.ident;
        let unpack = m.unpack_args();
        let args = m.arg_idents();
        quote! {
            #[doc(hidden)]
            #[allow(non_snake_case, unused_variables)]
            fn #super_ident(
                &self,
                args: &::weaver_aop::Args,
            ) -> ::weaver_aop::InvocationResult {
                let method: &::weaver_aop::Method = &Self::__WEAVER_CLASS.methods()[#index];
                #unpack
                let __ret = Self::#ident(self #(, #args)*)
                    .map_err(::weaver_aop::__private::into_throwable)?;
                ::std::result::Result::Ok(::weaver_aop::ReturnValue::new(__ret))
            }
        }
    });

    let names: Vec<String> = methods.iter().map(|m| m.name()).collect();
    let indexes: Vec<usize> = (0..methods.len()).collect();

    let proxy = proxy_ident(&type_ident);
    let proxy_methods = methods.iter().enumerate().map(|(index, m)| {
        let signature = m.proxy_signature();
        let body = m.forward_to_proxy(quote! {
            &<#self_ty>::__WEAVER_CLASS.methods()[#index]
        });
        quote! {
            pub #signature {
                #body
            }
        }
    });
    let proxy_doc = format!("`{type_name}` 的子类代理视图，调用经过拦截器链");

    Ok(quote! {
        #item

        impl #self_ty {
            #[doc(hidden)]
            pub const __WEAVER_CLASS: &'static ::weaver_aop::TargetClass =
                &::weaver_aop::TargetClass::new(
                    #type_name,
                    &[#(<dyn #interfaces as ::weaver_aop::ProxyInterface>::INTERFACE),*],
                    &[#(#descriptors),*],
                    #sealed,
                );

            #(#super_fns)*
        }

        impl ::weaver_aop::ProxyTarget for #self_ty {
            fn target_class(&self) -> &'static ::weaver_aop::TargetClass {
                Self::__WEAVER_CLASS
            }

            #[allow(unused_variables)]
            fn invoke_method(
                &self,
                method: &::weaver_aop::Method,
                args: &::weaver_aop::Args,
            ) -> ::weaver_aop::InvocationResult {
                #(
                    if method.declaring_type()
                        == <dyn #interfaces as ::weaver_aop::ProxyInterface>::INTERFACE.name()
                    {
                        return <dyn #interfaces as ::weaver_aop::ProxyInterface>::dispatch(
                            self, method, args,
                        );
                    }
                )*
                if method.declaring_type() == #type_name {
                    match method.name() {
                        #(#names => return self.#super_idents(args),)*
                        _ => {}
                    }
                }
                ::std::result::Result::Err(
                    ::weaver_aop::AopError::no_such_method(#type_name, method).into(),
                )
            }
        }

        impl ::weaver_aop::ClassProxyable for #self_ty {
            fn super_methods() -> ::std::vec::Vec<::weaver_aop::SuperMethod<Self>> {
                ::std::vec![
                    #(
                        ::weaver_aop::SuperMethod::new(
                            &Self::__WEAVER_CLASS.methods()[#indexes],
                            Self::#super_idents,
                        ),
                    )*
                ]
            }
        }

        #[doc = #proxy_doc]
        #[derive(Clone)]
        pub struct #proxy {
            proxy: ::std::sync::Arc<dyn ::weaver_aop::AopProxy>,
        }

        impl #proxy {
            /// 底层的动态代理
            pub fn aop_proxy(&self) -> &::std::sync::Arc<dyn ::weaver_aop::AopProxy> {
                &self.proxy
            }

            #(#proxy_methods)*
        }

        impl ::std::fmt::Debug for #proxy {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!(#proxy))
                    .field("proxy", &self.proxy)
                    .finish()
            }
        }

        impl ::weaver_aop::ProxyView for #proxy {
            fn from_proxy(
                proxy: ::std::sync::Arc<dyn ::weaver_aop::AopProxy>,
            ) -> ::weaver_aop::AopResult<Self> {
                if proxy.strategy() != ::weaver_aop::ProxyStrategy::Subclass
                    || proxy.target_class().name() != #type_name
                {
                    return ::std::result::Result::Err(::weaver_aop::AopError::IllegalState(
                        ::std::format!(
                            "{} requires a subclass proxy of {}, got {} proxy of '{}'",
                            stringify!(#proxy),
                            #type_name,
                            proxy.strategy(),
                            proxy.target_class().name(),
                        ),
                    ));
                }
                ::std::result::Result::Ok(Self { proxy })
            }
        }
    })
}
