//! 通知适配器注册表
//!
//! 把各种形态的 [`Advice`] 统一规范化为 [`MethodInterceptor`]。
//! 注册表是普通的值，由代理工厂按引用持有，不存在进程级单例。

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
use crate::error::{AopError, AopResult};
use crate::invocation::{InvocationResult, MethodInvocation};
use std::fmt;
use std::sync::Arc;

/// 通知适配器
pub trait AdvisorAdapter: Send + Sync {
    /// 适配器名称
    fn name(&self) -> &str;

    fn supports_advice(&self, advice: &Advice) -> bool;

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>>;
}

/// 通知适配器注册表
pub struct AdvisorAdapterRegistry {
    adapters: Vec<Arc<dyn AdvisorAdapter>>,
}

impl AdvisorAdapterRegistry {
    /// 创建包含内置适配器的注册表
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_adapter(Arc::new(BeforeAdviceAdapter));
        registry.register_adapter(Arc::new(AfterReturningAdviceAdapter));
        registry.register_adapter(Arc::new(AfterAdviceAdapter));
        registry.register_adapter(Arc::new(ThrowsAdviceAdapter));
        registry
    }

    /// 不含任何适配器的注册表，只能处理环绕通知
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// 注册适配器，按注册顺序参与匹配
    pub fn register_adapter(&mut self, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advisor adapter: {}", adapter.name());
        self.adapters.push(adapter);
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// 把通知包装为拦截器
    ///
    /// 环绕通知原样返回；否则使用第一个支持该通知的适配器
    pub fn wrap(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        if let Some(interceptor) = advice.as_interceptor() {
            return Ok(Arc::clone(interceptor));
        }

        match self.adapters.iter().find(|a| a.supports_advice(advice)) {
            Some(adapter) => {
                tracing::trace!(
                    advice = %advice.name(),
                    adapter = adapter.name(),
                    "Wrapping advice"
                );
                adapter.interceptor(advice)
            }
            None => Err(unsupported(advice)),
        }
    }

    /// 返回该通知所有适用的拦截器
    pub fn get_interceptors(&self, advice: &Advice) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let mut interceptors = Vec::new();
        if let Some(interceptor) = advice.as_interceptor() {
            interceptors.push(Arc::clone(interceptor));
        }
        for adapter in self.adapters.iter().filter(|a| a.supports_advice(advice)) {
            interceptors.push(adapter.interceptor(advice)?);
        }

        if interceptors.is_empty() {
            return Err(unsupported(advice));
        }
        Ok(interceptors)
    }
}

impl Default for AdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisorAdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
        f.debug_struct("AdvisorAdapterRegistry")
            .field("adapters", &names)
            .finish()
    }
}

fn unsupported(advice: &Advice) -> AopError {
    AopError::UnsupportedAdvice {
        advice: advice.name(),
    }
}

fn mismatch(adapter: &str, advice: &Advice) -> AopError {
    AopError::IllegalState(format!(
        "adapter '{adapter}' cannot wrap {} advice",
        advice.name()
    ))
}

// ============================================================================
// 内置适配器
// ============================================================================

/// 前置通知适配器
#[derive(Debug, Default)]
pub struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn name(&self) -> &str {
        "BeforeAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::Before(hook) => Ok(Arc::new(BeforeAdviceInterceptor(Arc::clone(hook)))),
            other => Err(mismatch(self.name(), other)),
        }
    }
}

struct BeforeAdviceInterceptor(Arc<dyn MethodBeforeAdvice>);

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        self.0.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

/// 返回后通知适配器
#[derive(Debug, Default)]
pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn name(&self) -> &str {
        "AfterReturningAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterReturning(hook) => {
                Ok(Arc::new(AfterReturningAdviceInterceptor(Arc::clone(hook))))
            }
            other => Err(mismatch(self.name(), other)),
        }
    }
}

struct AfterReturningAdviceInterceptor(Arc<dyn AfterReturningAdvice>);

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        let value = invocation.proceed()?;
        // 钩子失败时丢弃原本的返回值
        self.0.after_returning(&value, &invocation.join_point())?;
        Ok(value)
    }
}

/// 后置通知适配器
#[derive(Debug, Default)]
pub struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn name(&self) -> &str {
        "AfterAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::After(_))
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::After(hook) => Ok(Arc::new(AfterAdviceInterceptor(Arc::clone(hook)))),
            other => Err(mismatch(self.name(), other)),
        }
    }
}

struct AfterAdviceInterceptor(Arc<dyn AfterAdvice>);

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        let result = invocation.proceed();
        self.0.after(&invocation.join_point())?;
        result
    }
}

/// 异常通知适配器
#[derive(Debug, Default)]
pub struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn name(&self) -> &str {
        "ThrowsAdviceAdapter"
    }

    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterThrowing(_))
    }

    fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advice {
            Advice::AfterThrowing(hook) => Ok(Arc::new(ThrowsAdviceInterceptor(Arc::clone(hook)))),
            other => Err(mismatch(self.name(), other)),
        }
    }
}

struct ThrowsAdviceInterceptor(Arc<dyn ThrowsAdvice>);

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        invocation.proceed().or_else(|error| {
            self.0.after_throwing(&error, &invocation.join_point())?;
            Err(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::CustomAdvice;
    use crate::invocation::InterceptorChain;
    use crate::joinpoint::JoinPoint;
    use crate::method::{Method, TargetClass};
    use crate::value::{Args, ReturnValue};
    use parking_lot::Mutex;

    static SAVE: Method = Method::new("Repository", "save", 0);
    static REPOSITORY: TargetClass = TargetClass::new("Repository", &[], &[], false);

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Failure(&'static str);

    /// 在只含一个拦截器的链条上调用
    fn call(
        interceptor: Arc<dyn MethodInterceptor>,
        terminal: impl Fn(&Args) -> InvocationResult,
    ) -> InvocationResult {
        let chain = InterceptorChain::new(vec![crate::invocation::ChainEntry::Static(interceptor)]);
        let target = ();
        MethodInvocation::new(&SAVE, Args::empty(), &target, &REPOSITORY, &chain, &terminal)
            .proceed()
    }

    struct Audit;

    impl CustomAdvice for Audit {
        fn name(&self) -> &str {
            "Audit"
        }
    }

    struct AuditAdapter(Arc<Mutex<Vec<&'static str>>>);

    impl AdvisorAdapter for AuditAdapter {
        fn name(&self) -> &str {
            "AuditAdapter"
        }

        fn supports_advice(&self, advice: &Advice) -> bool {
            matches!(advice, Advice::Custom(c) if c.name() == "Audit")
        }

        fn interceptor(&self, _advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
            let log = Arc::clone(&self.0);
            Ok(Arc::new(move |inv: &MethodInvocation<'_>| {
                log.lock().push("audit");
                inv.proceed()
            }))
        }
    }

    #[test]
    fn test_around_advice_is_returned_unchanged() {
        let interceptor: Arc<dyn MethodInterceptor> =
            Arc::new(|inv: &MethodInvocation<'_>| inv.proceed());
        let advice = Advice::Around(Arc::clone(&interceptor));

        let registry = AdvisorAdapterRegistry::new();
        let wrapped = registry.wrap(&advice).unwrap();
        assert!(Arc::ptr_eq(&wrapped, &interceptor));

        // 空注册表同样可以处理环绕通知
        assert!(AdvisorAdapterRegistry::empty().wrap(&advice).is_ok());
    }

    #[test]
    fn test_unsupported_advice() {
        let registry = AdvisorAdapterRegistry::new();
        let err = registry.wrap(&Advice::custom(Audit)).err().unwrap();
        assert!(matches!(err, AopError::UnsupportedAdvice { ref advice } if advice == "Audit"));

        let err = registry.get_interceptors(&Advice::custom(Audit)).err().unwrap();
        assert!(matches!(err, AopError::UnsupportedAdvice { .. }));
    }

    #[test]
    fn test_register_custom_adapter() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = AdvisorAdapterRegistry::new();
        registry.register_adapter(Arc::new(AuditAdapter(Arc::clone(&log))));
        assert_eq!(registry.adapter_count(), 5);

        let interceptor = registry.wrap(&Advice::custom(Audit)).unwrap();
        call(interceptor, |_| Ok(ReturnValue::unit())).unwrap();
        assert_eq!(*log.lock(), vec!["audit"]);
    }

    #[test]
    fn test_get_interceptors_returns_every_match() {
        struct AroundAuditAdapter;

        impl AdvisorAdapter for AroundAuditAdapter {
            fn name(&self) -> &str {
                "AroundAuditAdapter"
            }

            fn supports_advice(&self, advice: &Advice) -> bool {
                matches!(advice, Advice::Around(_))
            }

            fn interceptor(&self, advice: &Advice) -> AopResult<Arc<dyn MethodInterceptor>> {
                advice
                    .as_interceptor()
                    .cloned()
                    .ok_or_else(|| AopError::IllegalState("not an interceptor".to_string()))
            }
        }

        let mut registry = AdvisorAdapterRegistry::new();
        registry.register_adapter(Arc::new(AroundAuditAdapter));

        let around = Advice::around(|inv: &MethodInvocation<'_>| inv.proceed());
        assert_eq!(registry.get_interceptors(&around).unwrap().len(), 2);

        let before = Advice::before(|_: &JoinPoint<'_>| -> anyhow::Result<()> { Ok(()) });
        assert_eq!(registry.get_interceptors(&before).unwrap().len(), 1);
    }

    #[test]
    fn test_before_advice_failure_skips_target() {
        let registry = AdvisorAdapterRegistry::new();
        let advice = Advice::before(|_: &JoinPoint<'_>| -> anyhow::Result<()> {
            Err(Failure("invalid").into())
        });

        let called = Mutex::new(false);
        let err = call(registry.wrap(&advice).unwrap(), |_| {
            *called.lock() = true;
            Ok(ReturnValue::unit())
        })
        .unwrap_err();

        assert_eq!(err.to_string(), "invalid");
        assert!(!*called.lock());
    }

    #[test]
    fn test_after_returning_sees_value_and_can_replace_it_with_error() {
        let registry = AdvisorAdapterRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_by_hook = Arc::clone(&seen);
        let advice = Advice::after_returning(
            move |value: &ReturnValue, _: &JoinPoint<'_>| -> anyhow::Result<()> {
                *seen_by_hook.lock() = value.downcast_ref::<u32>().copied();
                Ok(())
            },
        );
        let value = call(registry.wrap(&advice).unwrap(), |_| Ok(ReturnValue::new(42u32))).unwrap();
        assert_eq!(value.downcast::<u32>().unwrap(), 42);
        assert_eq!(*seen.lock(), Some(42));

        let failing = Advice::after_returning(
            |_: &ReturnValue, _: &JoinPoint<'_>| -> anyhow::Result<()> {
                Err(Failure("audit failed").into())
            },
        );
        let err = call(registry.wrap(&failing).unwrap(), |_| Ok(ReturnValue::new(42u32)))
            .unwrap_err();
        assert_eq!(err.to_string(), "audit failed");
    }

    #[test]
    fn test_after_advice_runs_on_both_outcomes() {
        let registry = AdvisorAdapterRegistry::new();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let advice = Advice::after(move |_: &JoinPoint<'_>| -> anyhow::Result<()> {
            *counter.lock() += 1;
            Ok(())
        });
        let interceptor = registry.wrap(&advice).unwrap();

        call(Arc::clone(&interceptor), |_| Ok(ReturnValue::unit())).unwrap();
        let err = call(interceptor, |_| Err(Failure("boom").into())).unwrap_err();
        assert!(err.downcast_ref::<Failure>().is_some());
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_throws_advice_rethrows_original_error() {
        let registry = AdvisorAdapterRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let advice = Advice::after_throwing(
            move |error: &anyhow::Error, jp: &JoinPoint<'_>| -> anyhow::Result<()> {
                recorder.lock().push(format!("{} failed: {error}", jp.method_name()));
                Ok(())
            },
        );
        let interceptor = registry.wrap(&advice).unwrap();

        let err = call(Arc::clone(&interceptor), |_| Err(Failure("disk full").into())).unwrap_err();
        assert_eq!(err.downcast_ref::<Failure>().map(|f| f.0), Some("disk full"));
        assert_eq!(*seen.lock(), vec!["save failed: disk full"]);

        call(interceptor, |_| Ok(ReturnValue::unit())).unwrap();
        assert_eq!(seen.lock().len(), 1);
    }
}
