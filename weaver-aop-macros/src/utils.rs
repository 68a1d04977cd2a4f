//! 宏辅助工具函数

use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{Attribute, FnArg, GenericArgument, Ident, PathArguments, ReturnType, Signature, Type};

/// 可以被代理的方法
pub struct ProxyMethod {
    pub ident: Ident,
    pub arg_types: Vec<Type>,
    pub output: Type,
    pub is_final: bool,
}

impl ProxyMethod {
    /// 校验签名：`&self` 接收者、拥有所有权的参数、返回 `Result`、非泛型、非 async
    pub fn parse(sig: &Signature, attrs: &[Attribute], macro_name: &str) -> syn::Result<Self> {
        if sig.asyncness.is_some() {
            return Err(syn::Error::new_spanned(
                sig.asyncness,
                format!("#[{macro_name}] does not support async methods"),
            ));
        }
        if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
            return Err(syn::Error::new_spanned(
                &sig.generics,
                format!("#[{macro_name}] does not support generic methods"),
            ));
        }

        let mut inputs = sig.inputs.iter();
        match inputs.next() {
            Some(FnArg::Receiver(receiver))
                if receiver.reference.is_some()
                    && receiver.mutability.is_none()
                    && receiver.colon_token.is_none() => {}
            _ => {
                return Err(syn::Error::new_spanned(
                    sig,
                    format!("#[{macro_name}] methods must take `&self`"),
                ))
            }
        }

        let mut arg_types = Vec::new();
        for input in inputs {
            let FnArg::Typed(pat_type) = input else {
                return Err(syn::Error::new_spanned(input, "unexpected receiver"));
            };
            if matches!(*pat_type.ty, Type::Reference(_) | Type::ImplTrait(_)) {
                return Err(syn::Error::new_spanned(
                    &pat_type.ty,
                    format!(
                        "#[{macro_name}] arguments must be owned `Clone + Send + Sync + 'static` values"
                    ),
                ));
            }
            arg_types.push((*pat_type.ty).clone());
        }

        let output = match &sig.output {
            ReturnType::Type(_, ty) => {
                check_return_type(ty, macro_name)?;
                (**ty).clone()
            }
            ReturnType::Default => {
                return Err(syn::Error::new_spanned(
                    sig,
                    format!("#[{macro_name}] methods must return {SUPPORTED_RETURNS}"),
                ))
            }
        };

        Ok(Self {
            ident: sig.ident.clone(),
            arg_types,
            output,
            is_final: has_attr(attrs, "aop_final"),
        })
    }

    pub fn name(&self) -> String {
        self.ident.to_string()
    }

    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    pub fn arg_idents(&self) -> Vec<Ident> {
        (0..self.arity())
            .map(|i| format_ident!("__arg{}", i, span = Span::call_site()))
            .collect()
    }

    /// `Method::new(declaring, name, arity)` 常量表达式
    pub fn descriptor(&self, declaring_type: &str) -> TokenStream {
        let name = self.name();
        let arity = self.arity();
        if self.is_final {
            quote! { ::weaver_aop::Method::new(#declaring_type, #name, #arity).as_final() }
        } else {
            quote! { ::weaver_aop::Method::new(#declaring_type, #name, #arity) }
        }
    }

    /// 从 `args` 中取出各个参数，绑定到 `__argN`
    ///
    /// 生成代码中需要存在 `method: &Method` 和 `args: &Args`
    pub fn unpack_args(&self) -> TokenStream {
        let idents = self.arg_idents();
        let types = &self.arg_types;
        let indexes = 0..self.arity();
        quote! {
            #(
                let #idents: #types = args
                    .cloned::<#types>(#indexes)
                    .map_err(|e| ::weaver_aop::AopError::invocation(method, e))?;
            )*
        }
    }

    /// 代理方法体：打包参数并交给 `AopProxy::invoke`
    pub fn forward_to_proxy(&self, method_expr: TokenStream) -> TokenStream {
        let idents = self.arg_idents();
        quote! {
            let __method: &'static ::weaver_aop::Method = #method_expr;
            let __args = ::weaver_aop::Args::builder()
                #(.arg(#idents))*
                .build();
            self.proxy
                .invoke(__method, __args)
                .and_then(|__value| ::weaver_aop::__private::unpack_return(__value, __method))
                .map_err(::weaver_aop::__private::recover_error)
        }
    }

    /// 代理方法签名，参数统一改名为 `__argN`
    pub fn proxy_signature(&self) -> TokenStream {
        let ident = &self.ident;
        let idents = self.arg_idents();
        let types = &self.arg_types;
        let output = &self.output;
        quote! { fn #ident(&self #(, #idents: #types)*) -> #output }
    }
}

const SUPPORTED_RETURNS: &str = "`Result<T, E>` (with `E: From<anyhow::Error>`) or `anyhow::Result<T>`";

/// 校验返回类型：`Result<T, E>` 或 `anyhow::Result<T>`
///
/// 其它 `Result` 别名（如 `io::Result<T>`）无法从 `anyhow::Error` 还原错误，直接拒绝
pub fn check_return_type(ty: &Type, macro_name: &str) -> syn::Result<()> {
    let unsupported = || {
        syn::Error::new_spanned(
            ty,
            format!("#[{macro_name}] methods must return {SUPPORTED_RETURNS}"),
        )
    };

    let Type::Path(type_path) = ty else {
        return Err(unsupported());
    };
    let segments = &type_path.path.segments;
    let Some(last) = segments.last() else {
        return Err(unsupported());
    };
    if last.ident != "Result" {
        return Err(unsupported());
    }
    let PathArguments::AngleBracketed(generics) = &last.arguments else {
        return Err(unsupported());
    };

    let type_args = generics
        .args
        .iter()
        .filter(|arg| matches!(arg, GenericArgument::Type(_)))
        .count();
    let is_anyhow = segments.len() >= 2 && segments[segments.len() - 2].ident == "anyhow";
    match type_args {
        2 => Ok(()),
        1 if is_anyhow => Ok(()),
        _ => Err(unsupported()),
    }
}

pub fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// 代理视图的类型名
pub fn proxy_ident(ident: &Ident) -> Ident {
    format_ident!("{}Proxy", ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_supported_return_types() {
        let accepted: [Type; 3] = [
            parse_quote!(Result<Order, OrderError>),
            parse_quote!(std::result::Result<(), OrderError>),
            parse_quote!(anyhow::Result<u64>),
        ];
        for ty in &accepted {
            assert!(check_return_type(ty, "aop_interface").is_ok());
        }
    }

    #[test]
    fn test_rejected_return_types() {
        let rejected: [Type; 4] = [
            parse_quote!(io::Result<u64>),
            parse_quote!(Result<u64>),
            parse_quote!(AopResult<u64>),
            parse_quote!(Option<u64>),
        ];
        for ty in &rejected {
            let err = check_return_type(ty, "aop_class").unwrap_err();
            assert!(err.to_string().contains("anyhow::Result<T>"));
        }
    }
}
