//! 代理目标
//!
//! - [`ProxyTarget`]：按方法身份分派调用（接口代理的"反射调用"）
//! - [`ProxyInterface`]：由 `#[aop_interface]` 为 `dyn Trait` 生成的接口描述与分派
//! - [`ClassProxyable`]：由 `#[aop_class]` 生成，暴露具体类型自身方法的函数指针表（子类代理的"super 调用"）

use crate::error::AopResult;
use crate::invocation::InvocationResult;
use crate::method::{InterfaceInfo, Method, TargetClass};
use crate::proxy::{AopProxy, ClassProxy, ProxyConfig};
use crate::value::Args;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 以 `&dyn Any` 访问 trait 对象背后的具体值
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// 可被代理的目标对象
pub trait ProxyTarget: AsAny {
    /// 目标类型描述
    fn target_class(&self) -> &'static TargetClass;

    /// 按方法身份调用目标上的真实方法
    fn invoke_method(&self, method: &Method, args: &Args) -> InvocationResult;
}

/// 被代理的接口
///
/// 为 `dyn Trait` 实现：接口描述 + 在任意实现者上分派该接口的方法
pub trait ProxyInterface {
    const INTERFACE: &'static InterfaceInfo;

    fn dispatch(target: &Self, method: &Method, args: &Args) -> InvocationResult;
}

/// 可以生成"子类"代理的具体类型
pub trait ClassProxyable: ProxyTarget + Sized {
    /// 自身方法的直接调用表
    fn super_methods() -> Vec<SuperMethod<Self>>;
}

/// 子类代理的终端调用：直接调用具体类型上的原始实现
pub struct SuperMethod<T> {
    method: &'static Method,
    call: fn(&T, &Args) -> InvocationResult,
}

impl<T> SuperMethod<T> {
    pub fn new(method: &'static Method, call: fn(&T, &Args) -> InvocationResult) -> Self {
        Self { method, call }
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn call(&self, target: &T, args: &Args) -> InvocationResult {
        (self.call)(target, args)
    }
}

impl<T> Clone for SuperMethod<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SuperMethod<T> {}

type ClassProxyBuilder = dyn Fn(Arc<ProxyConfig>) -> AopResult<Arc<dyn AopProxy>> + Send + Sync;

/// 交给代理工厂的目标
///
/// 通过 [`TargetSource::class`] 创建时同时携带生成子类代理的能力
#[derive(Clone)]
pub struct TargetSource {
    target: Arc<dyn ProxyTarget>,
    class_proxy: Option<Arc<ClassProxyBuilder>>,
}

impl TargetSource {
    /// 只能使用接口代理的目标
    pub fn new<T: ProxyTarget>(target: Arc<T>) -> Self {
        Self {
            target,
            class_proxy: None,
        }
    }

    /// 同时支持接口代理和子类代理的目标
    pub fn class<T: ClassProxyable>(target: Arc<T>) -> Self {
        let concrete = Arc::clone(&target);
        let builder = move |config: Arc<ProxyConfig>| -> AopResult<Arc<dyn AopProxy>> {
            let proxy = ClassProxy::create(Arc::clone(&concrete), config)?;
            Ok(Arc::new(proxy))
        };
        Self {
            target,
            class_proxy: Some(Arc::new(builder)),
        }
    }

    pub fn target(&self) -> &Arc<dyn ProxyTarget> {
        &self.target
    }

    pub fn target_class(&self) -> &'static TargetClass {
        self.target.target_class()
    }

    pub fn supports_class_proxy(&self) -> bool {
        self.class_proxy.is_some()
    }

    pub(crate) fn build_class_proxy(
        &self,
        config: Arc<ProxyConfig>,
    ) -> Option<AopResult<Arc<dyn AopProxy>>> {
        self.class_proxy.as_ref().map(|build| build(config))
    }
}

impl fmt::Debug for TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetSource")
            .field("target_class", &self.target_class().name())
            .field("supports_class_proxy", &self.supports_class_proxy())
            .finish()
    }
}

/// 为只通过接口暴露方法的类型实现 [`ProxyTarget`]
///
/// ```ignore
/// weaver_aop::aop_target!(UserServiceImpl => UserService);
/// ```
#[macro_export]
macro_rules! aop_target {
    ($ty:ty => $($iface:path),+ $(,)?) => {
        impl $crate::ProxyTarget for $ty {
            fn target_class(&self) -> &'static $crate::TargetClass {
                const CLASS: &'static $crate::TargetClass = &$crate::TargetClass::new(
                    stringify!($ty),
                    &[$(<dyn $iface as $crate::ProxyInterface>::INTERFACE),+],
                    &[],
                    false,
                );
                CLASS
            }

            fn invoke_method(
                &self,
                method: &$crate::Method,
                args: &$crate::Args,
            ) -> $crate::InvocationResult {
                $(
                    if method.declaring_type()
                        == <dyn $iface as $crate::ProxyInterface>::INTERFACE.name()
                    {
                        return <dyn $iface as $crate::ProxyInterface>::dispatch(self, method, args);
                    }
                )+
                Err($crate::AopError::no_such_method(stringify!($ty), method).into())
            }
        }
    };
}
