//! 方法调用与拦截器链
//!
//! 每次调用创建一个 [`MethodInvocation`]，它持有本次调用匹配到的只读拦截器链和一个私有游标。
//! `proceed()` 每次都在游标的副本上前进，因此拦截器可以零次、一次或多次调用它（跳过、重试），
//! 并发调用之间互不干扰。

use crate::advice::MethodInterceptor;
use crate::joinpoint::JoinPoint;
use crate::method::{Method, TargetClass};
use crate::pointcut::Pointcut;
use crate::value::{Args, ReturnValue};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 调用结果：成功的返回值，或者沿链条向上传播的原始错误
pub type InvocationResult = anyhow::Result<ReturnValue>;

/// 终端调用：真正执行目标方法
pub type Terminal<'a> = &'a (dyn Fn(&Args) -> InvocationResult + 'a);

pub(crate) enum ChainEntry {
    Static(Arc<dyn MethodInterceptor>),
    /// 需要在每次调用时用实际参数重新匹配的拦截器
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        pointcuts: Vec<Arc<dyn Pointcut>>,
    },
}

/// 一个方法的拦截器链
///
/// 顺序与 advisor 注册顺序一致；构建完成后只读
#[derive(Default)]
pub struct InterceptorChain {
    entries: Vec<ChainEntry>,
}

impl InterceptorChain {
    pub(crate) fn new(entries: Vec<ChainEntry>) -> Self {
        Self { entries }
    }

    /// 链条长度，包含末尾调用目标方法的终端步骤
    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    /// 匹配到的拦截器数量
    pub fn interceptor_count(&self) -> usize {
        self.entries.len()
    }

    /// 没有任何拦截器，只剩终端调用
    pub fn is_terminal_only(&self) -> bool {
        self.entries.is_empty()
    }

    /// 需要运行时参数匹配的拦截器数量
    pub fn runtime_checked_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ChainEntry::Dynamic { .. }))
            .count()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptor_count())
            .field("runtime_checked", &self.runtime_checked_count())
            .finish()
    }
}

/// 一次方法调用
///
/// 只属于当前这一次调用，从不跨调用共享
#[derive(Clone)]
pub struct MethodInvocation<'a> {
    method: &'static Method,
    args: Args,
    target: &'a (dyn Any + Send + Sync),
    target_class: &'static TargetClass,
    chain: &'a InterceptorChain,
    cursor: usize,
    terminal: Terminal<'a>,
}

impl<'a> MethodInvocation<'a> {
    pub(crate) fn new(
        method: &'static Method,
        args: Args,
        target: &'a (dyn Any + Send + Sync),
        target_class: &'static TargetClass,
        chain: &'a InterceptorChain,
        terminal: Terminal<'a>,
    ) -> Self {
        Self {
            method,
            args,
            target,
            target_class,
            chain,
            cursor: 0,
            terminal,
        }
    }

    /// 继续执行链条中的下一个拦截器；链条走完后调用目标方法
    pub fn proceed(&self) -> InvocationResult {
        let Some(entry) = self.chain.entries.get(self.cursor) else {
            tracing::trace!(method = %self.method, "Invoking target method");
            return (self.terminal)(&self.args);
        };

        let next = self.advance();
        match entry {
            ChainEntry::Static(interceptor) => interceptor.invoke(&next),
            ChainEntry::Dynamic {
                interceptor,
                pointcuts,
            } => {
                if self.matches_runtime(pointcuts)? {
                    interceptor.invoke(&next)
                } else {
                    tracing::trace!(
                        method = %self.method,
                        position = self.cursor,
                        "Runtime match failed, skipping interceptor"
                    );
                    next.proceed()
                }
            }
        }
    }

    /// 用新的参数继续执行链条的剩余部分
    pub fn proceed_with_args(&self, args: Args) -> InvocationResult {
        let mut replaced = self.clone();
        replaced.args = args;
        replaced.proceed()
    }

    fn advance(&self) -> Self {
        let mut next = self.clone();
        next.cursor += 1;
        next
    }

    fn matches_runtime(&self, pointcuts: &[Arc<dyn Pointcut>]) -> anyhow::Result<bool> {
        for pointcut in pointcuts {
            let matcher = pointcut.method_matcher();
            if !matcher.matches_runtime(self.method, self.target_class, &self.args)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn target_class(&self) -> &'static TargetClass {
        self.target_class
    }

    pub fn target<T: Any>(&self) -> Option<&'a T> {
        self.target.downcast_ref::<T>()
    }

    /// 下一个将要执行的链条位置
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint::new(self.method, &self.args, self.target, self.target_class)
    }
}

impl fmt::Debug for MethodInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.signature())
            .field("args", &self.args)
            .field("position", &self.cursor)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::DynamicMethodMatcherPointcut;
    use parking_lot::Mutex;

    static GREET: Method = Method::new("Greeter", "greet", 1);
    static GREETER: TargetClass = TargetClass::new("Greeter", &[], &[], false);

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn MethodInterceptor> {
        let log = Arc::clone(log);
        Arc::new(move |inv: &MethodInvocation<'_>| {
            log.lock().push(format!("{name}:before"));
            let result = inv.proceed();
            log.lock().push(format!("{name}:after"));
            result
        })
    }

    fn run(chain: &InterceptorChain, args: Args, log: &Arc<Mutex<Vec<String>>>) -> InvocationResult {
        let target = ();
        let log = Arc::clone(log);
        let terminal = move |args: &Args| -> InvocationResult {
            log.lock().push("target".to_string());
            let name = args.cloned::<String>(0)?;
            Ok(ReturnValue::new(format!("hello {name}")))
        };
        MethodInvocation::new(&GREET, args, &target, &GREETER, chain, &terminal).proceed()
    }

    #[test]
    fn test_terminal_only_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::default();
        assert_eq!(chain.len(), 1);
        assert!(chain.is_terminal_only());

        let value = run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(value.downcast::<String>().unwrap(), "hello bob");
        assert_eq!(*log.lock(), vec!["target"]);
    }

    #[test]
    fn test_chain_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            ChainEntry::Static(recording(&log, "outer")),
            ChainEntry::Static(recording(&log, "inner")),
        ]);
        assert_eq!(chain.len(), 3);

        run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "target", "inner:after", "outer:after"]
        );
    }

    #[test]
    fn test_proceed_multiple_times() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let retry: Arc<dyn MethodInterceptor> = Arc::new(|inv: &MethodInvocation<'_>| {
            assert_eq!(inv.position(), 1);
            inv.proceed()?;
            inv.proceed()
        });
        let chain = InterceptorChain::new(vec![
            ChainEntry::Static(retry),
            ChainEntry::Static(recording(&log, "inner")),
        ]);

        run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                "inner:before",
                "target",
                "inner:after",
                "inner:before",
                "target",
                "inner:after"
            ]
        );
    }

    #[test]
    fn test_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cached: Arc<dyn MethodInterceptor> =
            Arc::new(|_: &MethodInvocation<'_>| -> InvocationResult {
                Ok(ReturnValue::new("cached".to_string()))
            });
        let chain = InterceptorChain::new(vec![
            ChainEntry::Static(cached),
            ChainEntry::Static(recording(&log, "inner")),
        ]);

        let value = run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(value.downcast::<String>().unwrap(), "cached");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_proceed_with_args() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let upper: Arc<dyn MethodInterceptor> = Arc::new(|inv: &MethodInvocation<'_>| {
            let name = inv.args().cloned::<String>(0)?;
            inv.proceed_with_args(Args::builder().arg(name.to_uppercase()).build())
        });
        let chain = InterceptorChain::new(vec![ChainEntry::Static(upper)]);

        let value = run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(value.downcast::<String>().unwrap(), "hello BOB");
    }

    #[test]
    fn test_dynamic_entry_skipped_when_args_do_not_match() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let only_admin: Arc<dyn Pointcut> = Arc::new(DynamicMethodMatcherPointcut::new(
            |_: &Method, _: &TargetClass| true,
            |_: &Method, _: &TargetClass, args: &Args| {
                args.get::<String>(0).map(|n| n == "admin").unwrap_or(false)
            },
        ));
        let chain = InterceptorChain::new(vec![ChainEntry::Dynamic {
            interceptor: recording(&log, "audit"),
            pointcuts: vec![only_admin],
        }]);
        assert_eq!(chain.runtime_checked_count(), 1);

        run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap();
        assert_eq!(*log.lock(), vec!["target"]);

        log.lock().clear();
        run(&chain, Args::builder().arg("admin".to_string()).build(), &log).unwrap();
        assert_eq!(*log.lock(), vec!["audit:before", "target", "audit:after"]);
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn MethodInterceptor> =
            Arc::new(|_: &MethodInvocation<'_>| -> InvocationResult { Err(Boom.into()) });
        let chain = InterceptorChain::new(vec![
            ChainEntry::Static(recording(&log, "outer")),
            ChainEntry::Static(failing),
        ]);

        let err = run(&chain, Args::builder().arg("bob".to_string()).build(), &log).unwrap_err();
        assert!(err.downcast_ref::<Boom>().is_some());
        assert_eq!(*log.lock(), vec!["outer:before", "outer:after"]);
    }
}
