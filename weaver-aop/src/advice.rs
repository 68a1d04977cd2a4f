//! 通知（Advice）定义
//!
//! 通知是带能力标签的横切行为单元。除了 `Around` 以外，其余形态都要经过
//! [`AdvisorAdapterRegistry`](crate::AdvisorAdapterRegistry) 统一适配成 [`MethodInterceptor`]。

use crate::invocation::{InvocationResult, MethodInvocation};
use crate::joinpoint::JoinPoint;
use crate::target::AsAny;
use crate::value::ReturnValue;
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 需要自定义适配器的通知
    Custom,
}

/// 环绕拦截器
///
/// 所有通知最终都被规范化为这一种能力：拿到调用对象，
/// 自行决定是否、何时、调用几次 `proceed()`
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult;
}

impl<F> MethodInterceptor for F
where
    F: Fn(&MethodInvocation<'_>) -> InvocationResult + Send + Sync,
{
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        self(invocation)
    }
}

/// 前置通知
///
/// 返回错误时目标方法不会执行
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()>;
}

impl<F> MethodBeforeAdvice for F
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        self(join_point)
    }
}

/// 后置通知（finally 语义）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()>;
}

impl<F> AfterAdvice for F
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn after(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        self(join_point)
    }
}

/// 返回后通知
///
/// 钩子自身失败时，该错误会替换掉原本成功的返回值向上传播
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        return_value: &ReturnValue,
        join_point: &JoinPoint<'_>,
    ) -> anyhow::Result<()>;
}

impl<F> AfterReturningAdvice for F
where
    F: Fn(&ReturnValue, &JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(
        &self,
        return_value: &ReturnValue,
        join_point: &JoinPoint<'_>,
    ) -> anyhow::Result<()> {
        self(return_value, join_point)
    }
}

/// 异常通知
///
/// 钩子执行完后原始错误继续向上传播
pub trait ThrowsAdvice: Send + Sync {
    fn after_throwing(&self, error: &anyhow::Error, join_point: &JoinPoint<'_>)
        -> anyhow::Result<()>;
}

impl<F> ThrowsAdvice for F
where
    F: Fn(&anyhow::Error, &JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn after_throwing(
        &self,
        error: &anyhow::Error,
        join_point: &JoinPoint<'_>,
    ) -> anyhow::Result<()> {
        self(error, join_point)
    }
}

/// 框架不认识的通知形态，只能由用户注册的适配器处理
pub trait CustomAdvice: AsAny + Send + Sync {
    fn name(&self) -> &str;
}

/// 通知
///
/// 构造后不可变；克隆只复制引用
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn MethodBeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    Around(Arc<dyn MethodInterceptor>),
    Custom(Arc<dyn CustomAdvice>),
}

impl Advice {
    pub fn before(advice: impl MethodBeforeAdvice + 'static) -> Self {
        Self::Before(Arc::new(advice))
    }

    pub fn after(advice: impl AfterAdvice + 'static) -> Self {
        Self::After(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        Self::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl ThrowsAdvice + 'static) -> Self {
        Self::AfterThrowing(Arc::new(advice))
    }

    pub fn around(interceptor: impl MethodInterceptor + 'static) -> Self {
        Self::Around(Arc::new(interceptor))
    }

    pub fn custom(advice: impl CustomAdvice + 'static) -> Self {
        Self::Custom(Arc::new(advice))
    }

    /// 获取通知类型
    pub fn advice_type(&self) -> AdviceType {
        match self {
            Self::Before(_) => AdviceType::Before,
            Self::After(_) => AdviceType::After,
            Self::AfterReturning(_) => AdviceType::AfterReturning,
            Self::AfterThrowing(_) => AdviceType::AfterThrowing,
            Self::Around(_) => AdviceType::Around,
            Self::Custom(_) => AdviceType::Custom,
        }
    }

    /// 获取通知名称（用于日志和错误信息）
    pub fn name(&self) -> String {
        match self {
            Self::Custom(custom) => custom.name().to_string(),
            other => format!("{:?}", other.advice_type()),
        }
    }

    /// 如果本身就具备环绕拦截能力，直接返回
    pub fn as_interceptor(&self) -> Option<&Arc<dyn MethodInterceptor>> {
        match self {
            Self::Around(interceptor) => Some(interceptor),
            _ => None,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advice")
            .field("type", &self.advice_type())
            .field("name", &self.name())
            .finish()
    }
}
