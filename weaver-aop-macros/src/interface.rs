//! `#[aop_interface]` 实现
//!
//! 为 trait 生成：
//! - `impl ProxyInterface for dyn Trait`：接口描述和按方法名的分派
//! - `TraitProxy`：实现该 trait 的代理视图，每个方法都经过拦截器链

use crate::utils::{proxy_ident, ProxyMethod};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemTrait, TraitItem};

const MACRO: &str = "aop_interface";

pub fn impl_aop_interface(item: ItemTrait) -> syn::Result<TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[aop_interface] does not support generic traits",
        ));
    }

    let mut methods = Vec::new();
    for trait_item in &item.items {
        match trait_item {
            TraitItem::Fn(method) => methods.push(ProxyMethod::parse(&method.sig, &[], MACRO)?),
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "#[aop_interface] traits may only contain methods",
                ))
            }
        }
    }

    let trait_ident = &item.ident;
    let trait_name = trait_ident.to_string();
    let vis = &item.vis;
    let proxy = proxy_ident(trait_ident);

    let descriptors = methods.iter().map(|m| m.descriptor(&trait_name));

    let dispatch_arms = methods.iter().map(|m| {
        let name = m.name();
        let ident = &m.ident;
        let unpack = m.unpack_args();
        let args = m.arg_idents();
        quote! {
            #name => {
                #unpack
                let __ret = target
                    .#ident(#(#args),*)
                    .map_err(::weaver_aop::__private::into_throwable)?;
                ::std::result::Result::Ok(::weaver_aop::ReturnValue::new(__ret))
            }
        }
    });

    let proxy_methods = methods.iter().enumerate().map(|(index, m)| {
        let signature = m.proxy_signature();
        let body = m.forward_to_proxy(quote! {
            &<dyn #trait_ident as ::weaver_aop::ProxyInterface>::INTERFACE.methods()[#index]
        });
        quote! {
            #signature {
                #body
            }
        }
    });

    let proxy_doc = format!("`{trait_name}` 的代理视图，调用经过拦截器链");

    Ok(quote! {
        #item

        impl ::weaver_aop::ProxyInterface for dyn #trait_ident {
            const INTERFACE: &'static ::weaver_aop::InterfaceInfo = &::weaver_aop::InterfaceInfo::new(
                #trait_name,
                &[#(#descriptors),*],
            );

            #[allow(unused_variables)]
            fn dispatch(
                target: &Self,
                method: &::weaver_aop::Method,
                args: &::weaver_aop::Args,
            ) -> ::weaver_aop::InvocationResult {
                match method.name() {
                    #(#dispatch_arms)*
                    _ => ::std::result::Result::Err(
                        ::weaver_aop::AopError::no_such_method(#trait_name, method).into(),
                    ),
                }
            }
        }

        #[doc = #proxy_doc]
        #[derive(Clone)]
        #vis struct #proxy {
            proxy: ::std::sync::Arc<dyn ::weaver_aop::AopProxy>,
        }

        impl #proxy {
            /// 底层的动态代理
            pub fn aop_proxy(&self) -> &::std::sync::Arc<dyn ::weaver_aop::AopProxy> {
                &self.proxy
            }
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
                if !proxy.target_class().implements(#trait_name) {
                    return ::std::result::Result::Err(::weaver_aop::AopError::IllegalState(
                        ::std::format!(
                            "proxy target '{}' does not implement {}",
                            proxy.target_class().name(),
                            #trait_name,
                        ),
                    ));
                }
                ::std::result::Result::Ok(Self { proxy })
            }
        }

        impl #trait_ident for #proxy {
            #(#proxy_methods)*
        }
    })
}
