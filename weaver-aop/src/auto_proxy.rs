//! 自动代理
//!
//! 容器在对象初始化后调用 [`AutoProxyCreator::wrap_if_necessary`]：
//! 名称符合模式、且至少有一个 advisor 能作用于目标类型时，返回包装好的代理。

use crate::adapter::AdvisorAdapterRegistry;
use crate::advisor::Advisor;
use crate::config::AopProperties;
use crate::error::AopResult;
use crate::method::TargetClass;
use crate::pointcut::{can_apply, GlobPattern};
use crate::proxy::{AopProxy, ProxyFactory};
use crate::target::TargetSource;
use std::fmt;
use std::sync::Arc;

pub struct AutoProxyCreator {
    /// 是否启用自动代理
    enabled: bool,
    name_patterns: Vec<GlobPattern>,
    advisors: Vec<Advisor>,
    registry: Arc<AdvisorAdapterRegistry>,
    proxy_target_class: bool,
    opaque: bool,
}

impl AutoProxyCreator {
    /// 默认策略：名称以 "Service" 结尾的对象会被代理
    pub fn new(registry: Arc<AdvisorAdapterRegistry>) -> AopResult<Self> {
        Ok(Self {
            enabled: true,
            name_patterns: vec![GlobPattern::new("*Service")?],
            advisors: Vec::new(),
            registry,
            proxy_target_class: false,
            opaque: false,
        })
    }

    /// 创建禁用的自动代理器
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            name_patterns: Vec::new(),
            advisors: Vec::new(),
            registry: Arc::new(AdvisorAdapterRegistry::new()),
            proxy_target_class: false,
            opaque: false,
        }
    }

    pub fn from_properties(
        properties: &AopProperties,
        registry: Arc<AdvisorAdapterRegistry>,
    ) -> AopResult<Self> {
        let mut creator = Self::new(registry)?.with_name_patterns(&properties.auto_proxy.name_patterns)?;
        creator.enabled = properties.auto_proxy.enabled;
        creator.proxy_target_class = properties.proxy_target_class;
        creator.opaque = properties.opaque;
        Ok(creator)
    }

    /// 替换名称模式
    pub fn with_name_patterns<I, S>(mut self, patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.name_patterns = patterns
            .into_iter()
            .map(|p| GlobPattern::new(p.as_ref()))
            .collect::<AopResult<_>>()?;
        Ok(self)
    }

    pub fn add_advisor(&mut self, advisor: Advisor) -> AopResult<&mut Self> {
        self.registry.wrap(advisor.advice())?;
        self.advisors.push(advisor);
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 检查名称是否应该应用 AOP
    pub fn should_proxy(&self, name: &str) -> bool {
        self.enabled && self.name_patterns.iter().any(|p| p.matches(name))
    }

    /// 能够作用于该类型的 advisor，保持注册顺序
    pub fn eligible_advisors(&self, class: &TargetClass) -> AopResult<Vec<Advisor>> {
        let mut eligible = Vec::new();
        for advisor in &self.advisors {
            if can_apply(advisor.pointcut().as_ref(), class)? {
                eligible.push(advisor.clone());
            }
        }
        Ok(eligible)
    }

    /// 需要时为目标生成代理；不需要时返回 `None`，调用方继续使用原始对象
    pub fn wrap_if_necessary(
        &self,
        name: &str,
        source: TargetSource,
    ) -> AopResult<Option<Arc<dyn AopProxy>>> {
        if !self.should_proxy(name) {
            tracing::trace!("'{}' does not match auto-proxy patterns, skipping", name);
            return Ok(None);
        }

        let advisors = self.eligible_advisors(source.target_class())?;
        if advisors.is_empty() {
            tracing::trace!("No advisor applies to '{}', skipping", name);
            return Ok(None);
        }

        let mut factory = ProxyFactory::with_registry(Arc::clone(&self.registry));
        factory
            .set_target_source(source)?
            .set_proxy_target_class(self.proxy_target_class)?
            .set_opaque(self.opaque)?;
        for advisor in advisors {
            factory.add_advisor(advisor)?;
        }

        let proxy = factory.get_proxy()?;
        tracing::info!(
            "🔷 [AOP] '{}' wrapped with {} proxy ({} advisor(s))",
            name,
            proxy.strategy(),
            factory.advisors().len()
        );
        Ok(Some(proxy))
    }
}

impl fmt::Debug for AutoProxyCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoProxyCreator")
            .field("enabled", &self.enabled)
            .field("name_patterns", &self.name_patterns)
            .field("advisors", &self.advisors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::config::AutoProxyProperties;
    use crate::error::AopError;
    use crate::invocation::{InvocationResult, MethodInvocation};
    use crate::method::{InterfaceInfo, Method};
    use crate::pointcut::NameMatchMethodPointcut;
    use crate::target::{ProxyInterface, ProxyTarget};
    use crate::value::{Args, ReturnValue};

    trait Ping: Send + Sync {
        fn ping(&self) -> anyhow::Result<String>;
    }

    static PING: InterfaceInfo = InterfaceInfo::new("Ping", &[Method::new("Ping", "ping", 0)]);

    impl ProxyInterface for dyn Ping {
        const INTERFACE: &'static InterfaceInfo = &PING;

        fn dispatch(target: &Self, method: &Method, _args: &Args) -> InvocationResult {
            match method.name() {
                "ping" => Ok(ReturnValue::new(target.ping()?)),
                _ => Err(AopError::no_such_method("Ping", method).into()),
            }
        }
    }

    struct PingService;

    impl Ping for PingService {
        fn ping(&self) -> anyhow::Result<String> {
            Ok("pong".to_string())
        }
    }

    crate::aop_target!(PingService => Ping);

    fn shouting() -> Advice {
        Advice::around(|inv: &MethodInvocation<'_>| -> InvocationResult {
            let value = inv.proceed()?.downcast::<String>()?;
            Ok(ReturnValue::new(value.to_uppercase()))
        })
    }

    #[test]
    fn test_should_proxy() {
        let creator = AutoProxyCreator::new(Arc::new(AdvisorAdapterRegistry::new())).unwrap();

        assert!(creator.should_proxy("userService"));
        assert!(creator.should_proxy("orderService"));
        assert!(!creator.should_proxy("userController"));
        assert!(!creator.should_proxy("repository"));
    }

    #[test]
    fn test_disabled_creator() {
        let creator = AutoProxyCreator::disabled();
        assert!(!creator.should_proxy("userService"));
        assert!(creator
            .wrap_if_necessary("userService", TargetSource::new(Arc::new(PingService)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_wrap_if_necessary() {
        let mut creator = AutoProxyCreator::new(Arc::new(AdvisorAdapterRegistry::new())).unwrap();
        creator.add_advisor(Advisor::for_all(shouting())).unwrap();

        let proxy = creator
            .wrap_if_necessary("pingService", TargetSource::new(Arc::new(PingService)))
            .unwrap()
            .expect("should be proxied");
        let value = proxy.invoke_by_name("ping", Args::empty()).unwrap();
        assert_eq!(value.downcast::<String>().unwrap(), "PONG");

        // 名称不匹配
        assert!(creator
            .wrap_if_necessary("pingClient", TargetSource::new(Arc::new(PingService)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_no_eligible_advisor() {
        let mut creator = AutoProxyCreator::new(Arc::new(AdvisorAdapterRegistry::new())).unwrap();
        creator
            .add_advisor(Advisor::new(
                Arc::new(NameMatchMethodPointcut::new(["save*"]).unwrap()),
                shouting(),
            ))
            .unwrap();

        assert!(creator.eligible_advisors(PingService.target_class()).unwrap().is_empty());
        assert!(creator
            .wrap_if_necessary("pingService", TargetSource::new(Arc::new(PingService)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_from_properties() {
        let properties = AopProperties {
            auto_proxy: AutoProxyProperties {
                enabled: true,
                name_patterns: vec!["ping*".to_string()],
            },
            ..AopProperties::default()
        };
        let creator =
            AutoProxyCreator::from_properties(&properties, Arc::new(AdvisorAdapterRegistry::new()))
                .unwrap();

        assert!(creator.should_proxy("pingClient"));
        assert!(!creator.should_proxy("orderService"));
    }
}
