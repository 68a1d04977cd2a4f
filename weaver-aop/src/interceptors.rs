//! 内置拦截器
//!
//! 常用横切行为的现成实现，可直接作为 `Advice::around` / `Advice::after_throwing` 使用

use crate::advice::{Advice, MethodInterceptor, ThrowsAdvice};
use crate::error_info::ErrorInfo;
use crate::invocation::{InvocationResult, MethodInvocation};
use crate::joinpoint::JoinPoint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 日志拦截器 - 记录方法进入和退出
#[derive(Debug, Clone, Default)]
pub struct TracingInterceptor {
    log_args: bool,
    log_result: bool,
}

impl TracingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }

    pub fn with_result(mut self) -> Self {
        self.log_result = true;
        self
    }

    pub fn into_advice(self) -> Advice {
        Advice::around(self)
    }
}

impl MethodInterceptor for TracingInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        let signature = invocation.method().signature();
        if self.log_args {
            tracing::info!("→ Entering: {} with {:?}", signature, invocation.args());
        } else {
            tracing::info!("→ Entering: {}", signature);
        }

        let start = Instant::now();
        let result = invocation.proceed();
        let elapsed = start.elapsed();

        match &result {
            Ok(value) if self.log_result => {
                tracing::info!("← Exiting: {} -> {:?} (took {:?})", signature, value, elapsed)
            }
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", signature, elapsed),
            Err(e) => tracing::warn!("← Failed: {} after {:?}: {}", signature, elapsed, e),
        }
        result
    }
}

/// 单个方法的调用统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodStats {
    pub calls: u64,
    pub slow_calls: u64,
    pub total: Duration,
    pub max: Duration,
}

/// 性能监控拦截器
///
/// 超过阈值的调用记录警告日志
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
    stats: Mutex<HashMap<String, MethodStats>>,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 按方法签名查询统计
    pub fn stats(&self, signature: &str) -> Option<MethodStats> {
        self.stats.lock().get(signature).copied()
    }

    fn record(&self, signature: String, elapsed: Duration) {
        let slow = elapsed > self.threshold;
        if slow {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {:?} (threshold: {:?})",
                signature,
                elapsed,
                self.threshold
            );
        }

        let mut stats = self.stats.lock();
        let entry = stats.entry(signature).or_default();
        entry.calls += 1;
        entry.slow_calls += u64::from(slow);
        entry.total += elapsed;
        entry.max = entry.max.max(elapsed);
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        let start = Instant::now();
        let result = invocation.proceed();
        self.record(invocation.method().signature(), start.elapsed());
        result
    }
}

impl fmt::Debug for PerformanceMonitorInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitorInterceptor")
            .field("threshold", &self.threshold)
            .field("methods", &self.stats.lock().len())
            .finish()
    }
}

type RetryPredicate = dyn Fn(&anyhow::Error) -> bool + Send + Sync;

/// 重试拦截器
///
/// 失败时再次调用 `proceed()`，最多 `max_attempts` 次
#[derive(Clone)]
pub struct RetryInterceptor {
    max_attempts: u32,
    retry_if: Option<Arc<RetryPredicate>>,
}

impl RetryInterceptor {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_if: None,
        }
    }

    /// 只重试满足条件的错误
    pub fn retry_if(
        mut self,
        predicate: impl Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn should_retry(&self, error: &anyhow::Error) -> bool {
        self.retry_if.as_ref().map_or(true, |p| p(error))
    }
}

impl MethodInterceptor for RetryInterceptor {
    fn invoke(&self, invocation: &MethodInvocation<'_>) -> InvocationResult {
        let mut attempt = 1;
        loop {
            match invocation.proceed() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && self.should_retry(&e) => {
                    tracing::debug!(
                        method = %invocation.method(),
                        attempt,
                        error = %e,
                        "Retrying failed invocation"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl fmt::Debug for RetryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor")
            .field("max_attempts", &self.max_attempts)
            .field("conditional", &self.retry_if.is_some())
            .finish()
    }
}

/// 异常日志通知
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorLoggingAdvice;

impl ErrorLoggingAdvice {
    pub fn into_advice(self) -> Advice {
        Advice::after_throwing(self)
    }
}

impl ThrowsAdvice for ErrorLoggingAdvice {
    fn after_throwing(&self, error: &anyhow::Error, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        let info = ErrorInfo::from_anyhow(error);
        tracing::error!(
            error_type = %info.error_type,
            "❌ Exception in {}: {}",
            join_point.signature(),
            info.full_description()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{ChainEntry, InterceptorChain};
    use crate::method::{Method, TargetClass};
    use crate::value::{Args, ReturnValue};
    use std::sync::atomic::{AtomicU32, Ordering};

    static FETCH: Method = Method::new("Inventory", "fetch", 0);
    static INVENTORY: TargetClass = TargetClass::new("Inventory", &[], &[], false);

    #[derive(Debug, thiserror::Error)]
    enum FetchError {
        #[error("timeout")]
        Timeout,
        #[error("not found")]
        NotFound,
    }

    fn call(
        interceptor: Arc<dyn MethodInterceptor>,
        terminal: impl Fn(&Args) -> InvocationResult,
    ) -> InvocationResult {
        let chain = InterceptorChain::new(vec![ChainEntry::Static(interceptor)]);
        let target = ();
        MethodInvocation::new(&FETCH, Args::empty(), &target, &INVENTORY, &chain, &terminal)
            .proceed()
    }

    #[test]
    fn test_retry_until_success() {
        let attempts = AtomicU32::new(0);
        let value = call(Arc::new(RetryInterceptor::new(3)), |_| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FetchError::Timeout.into())
            } else {
                Ok(ReturnValue::new(7u32))
            }
        })
        .unwrap();

        assert_eq!(value.downcast::<u32>().unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_gives_up_with_last_error() {
        let attempts = AtomicU32::new(0);
        let err = call(Arc::new(RetryInterceptor::new(2)), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Timeout.into())
        })
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retry_predicate() {
        let retry = RetryInterceptor::new(5)
            .retry_if(|e| matches!(e.downcast_ref::<FetchError>(), Some(FetchError::Timeout)));
        let attempts = AtomicU32::new(0);
        call(Arc::new(retry), |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::NotFound.into())
        })
        .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_performance_monitor_records_stats() {
        let monitor = Arc::new(PerformanceMonitorInterceptor::new(Duration::ZERO));
        call(monitor.clone(), |_| {
            std::thread::sleep(Duration::from_millis(1));
            Ok(ReturnValue::unit())
        })
        .unwrap();
        call(monitor.clone(), |_| Err(FetchError::NotFound.into())).unwrap_err();

        let stats = monitor.stats("Inventory::fetch").unwrap();
        assert_eq!(stats.calls, 2);
        assert!(stats.max >= Duration::from_millis(1));
        assert!(monitor.stats("Inventory::missing").is_none());
    }

    #[test]
    fn test_tracing_interceptor_is_transparent() {
        let interceptor = TracingInterceptor::new().with_args().with_result();
        let value = call(Arc::new(interceptor), |_| Ok(ReturnValue::new("ok"))).unwrap();
        assert_eq!(value.downcast::<&str>().unwrap(), "ok");
    }

    #[test]
    fn test_error_logging_advice_does_not_swallow() {
        let advice = ErrorLoggingAdvice.into_advice();
        let interceptor = crate::adapter::AdvisorAdapterRegistry::new()
            .wrap(&advice)
            .unwrap();
        let err = call(interceptor, |_| Err(FetchError::NotFound.into())).unwrap_err();
        assert!(matches!(err.downcast_ref::<FetchError>(), Some(FetchError::NotFound)));
    }
}
