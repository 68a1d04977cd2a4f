//! Weaver AOP - 方法拦截与代理引擎
//!
//! 在不修改目标代码的前提下，把横切行为（日志、校验、审计、事务……）织入方法调用：
//! - 切点（Pointcut）：类过滤器 + 方法匹配器，支持惰性编译的表达式切点
//! - 通知（Advice）：Before、After、AfterReturning、AfterThrowing、Around，以及自定义通知
//! - 适配器注册表：把所有通知规范化为环绕拦截器
//! - 拦截器链：递归的 `proceed()` 协议，可跳过、重复、包装、短路
//! - 代理工厂：接口代理与子类代理两种策略，对调用方透明
//!
//! 代理类型在编译期由 `#[aop_interface]` / `#[aop_class]` 生成。
//!
//! ```ignore
//! use weaver_aop::prelude::*;
//!
//! #[aop_interface]
//! pub trait UserService: Send + Sync {
//!     fn find_user(&self, id: u64) -> anyhow::Result<String>;
//! }
//!
//! let mut factory = ProxyFactory::new();
//! factory
//!     .set_target(Arc::new(UserServiceImpl))?
//!     .add_advice(TracingInterceptor::new().into_advice())?;
//! let users: UserServiceProxy = factory.proxy()?;
//! users.find_user(7)?;
//! ```

// 生成代码以 `::weaver_aop` 引用本 crate，crate 内部使用宏时同样可以解析
extern crate self as weaver_aop;

pub mod adapter;
pub mod advice;
pub mod advisor;
pub mod auto_proxy;
pub mod config;
pub mod error;
pub mod error_info;
pub mod expression;
pub mod interceptors;
pub mod invocation;
pub mod joinpoint;
pub mod logging;
pub mod method;
pub mod pointcut;
pub mod proxy;
pub mod target;
pub mod value;

// 重新导出核心类型
pub use adapter::{AdvisorAdapter, AdvisorAdapterRegistry};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, CustomAdvice, MethodBeforeAdvice,
    MethodInterceptor, ThrowsAdvice,
};
pub use advisor::Advisor;
pub use auto_proxy::AutoProxyCreator;
pub use config::{AopProperties, AutoProxyProperties, WeaverConfig};
pub use error::{AopError, AopResult, DispatchError};
pub use error_info::ErrorInfo;
pub use expression::{
    CompiledExpression, ExpressionPointcut, PatternExpressionEngine, PointcutExpression,
    PointcutExpressionEngine, ShadowMatch,
};
pub use interceptors::{
    ErrorLoggingAdvice, PerformanceMonitorInterceptor, RetryInterceptor, TracingInterceptor,
};
pub use invocation::{InterceptorChain, InvocationResult, MethodInvocation};
pub use joinpoint::JoinPoint;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use method::{InterfaceInfo, Method, TargetClass};
pub use pointcut::{
    can_apply, ClassFilter, ComposablePointcut, DynamicMethodMatcherPointcut, MethodMatcher,
    NameMatchMethodPointcut, Pointcut, RegexpMethodPointcut, StaticMethodMatcherPointcut,
    TrueClassFilter, TrueMethodMatcher, TruePointcut,
};
pub use proxy::{AopProxy, ClassProxy, InterfaceProxy, ProxyConfig, ProxyFactory, ProxyStrategy, ProxyView};
pub use target::{AsAny, ClassProxyable, ProxyInterface, ProxyTarget, SuperMethod, TargetSource};
pub use value::{Args, ArgsBuilder, ReturnValue};

// 代理类型生成宏
pub use weaver_aop_macros::{aop_class, aop_interface};

/// 预导入模块
pub mod prelude {
    pub use crate::adapter::AdvisorAdapterRegistry;
    pub use crate::advice::*;
    pub use crate::advisor::Advisor;
    pub use crate::auto_proxy::AutoProxyCreator;
    pub use crate::error::{AopError, AopResult};
    pub use crate::expression::ExpressionPointcut;
    pub use crate::interceptors::*;
    pub use crate::invocation::{InvocationResult, MethodInvocation};
    pub use crate::joinpoint::JoinPoint;
    pub use crate::pointcut::{ComposablePointcut, NameMatchMethodPointcut, Pointcut};
    pub use crate::proxy::{AopProxy, ProxyFactory, ProxyStrategy, ProxyView};
    pub use crate::target::{ProxyTarget, TargetSource};
    pub use crate::value::{Args, ReturnValue};
    pub use crate::{aop_class, aop_interface, aop_target, args};
    pub use std::sync::Arc;
}

/// 构建参数列表
///
/// ```ignore
/// let args = weaver_aop::args!["alice".to_string(), 42u32];
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::builder()$(.arg($value))+.build()
    };
}

/// 生成代码使用的辅助函数，不属于公开 API
#[doc(hidden)]
pub mod __private {
    use crate::error::AopError;
    use crate::method::Method;
    use crate::value::ReturnValue;
    use std::any::Any;
    use std::fmt::{Debug, Display};

    pub use std::sync::Arc;

    /// 目标方法返回的错误转为链上传播的错误
    pub fn into_throwable<E>(error: E) -> anyhow::Error
    where
        anyhow::Error: From<E>,
    {
        anyhow::Error::from(error)
    }

    /// 把链条的返回值还原为方法声明的返回类型
    pub fn unpack_return<T: Any>(value: ReturnValue, method: &Method) -> anyhow::Result<T> {
        value
            .downcast::<T>()
            .map_err(|e| AopError::invocation(method, e).into())
    }

    /// 还原方法声明的错误类型
    ///
    /// 目标或拦截器抛出的原始错误原样取回，其余错误经由 `From<anyhow::Error>` 转换
    pub fn recover_error<E>(error: anyhow::Error) -> E
    where
        E: From<anyhow::Error> + Display + Debug + Send + Sync + 'static,
    {
        match error.downcast::<E>() {
            Ok(original) => original,
            Err(error) => E::from(error),
        }
    }
}
