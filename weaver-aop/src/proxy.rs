//! 代理构建
//!
//! [`ProxyFactory`] 收集目标、advisor 和全局切点，`get_proxy()` 时把它们冻结成一份
//! 不可变的 [`ProxyConfig`] 快照，并根据一次性的策略判断生成代理：
//!
//! - 接口代理 [`InterfaceProxy`]：终端通过目标的 `invoke_method` 按方法身份分派
//! - 子类代理 [`ClassProxy`]：终端直接调用具体类型自身的原始实现（"super" 调用）
//!
//! `proxy_target_class == true` 或目标没有任何接口时使用子类代理。

use crate::adapter::AdvisorAdapterRegistry;
use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::Advisor;
use crate::config::AopProperties;
use crate::error::{AopError, AopResult, DispatchError};
use crate::invocation::{ChainEntry, InterceptorChain, InvocationResult, MethodInvocation};
use crate::method::{Method, TargetClass};
use crate::pointcut::{matches_statically, Pointcut};
use crate::target::{ClassProxyable, ProxyTarget, SuperMethod, TargetSource};
use crate::value::Args;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyStrategy {
    /// 基于接口的代理
    Interface,
    /// 基于子类的代理
    Subclass,
}

impl fmt::Display for ProxyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interface => write!(f, "interface"),
            Self::Subclass => write!(f, "subclass"),
        }
    }
}

// ============================================================================
// ProxyConfig
// ============================================================================

struct ResolvedAdvisor {
    advisor: Advisor,
    interceptor: Arc<dyn MethodInterceptor>,
    class_matches: bool,
}

type MethodKey = (&'static str, &'static str);

/// 代理配置快照
///
/// 构建后只读；唯一的内部可变状态是按方法缓存的拦截器链
pub struct ProxyConfig {
    target: Arc<dyn ProxyTarget>,
    advisors: Vec<ResolvedAdvisor>,
    pointcut: Option<Arc<dyn Pointcut>>,
    proxy_target_class: bool,
    opaque: bool,
    chains: RwLock<HashMap<MethodKey, Arc<InterceptorChain>>>,
}

impl ProxyConfig {
    fn new(
        target: Arc<dyn ProxyTarget>,
        advisors: &[Advisor],
        pointcut: Option<Arc<dyn Pointcut>>,
        registry: &AdvisorAdapterRegistry,
        proxy_target_class: bool,
        opaque: bool,
    ) -> AopResult<Self> {
        let class = target.target_class();

        // 类过滤器在构建时就求值，表达式错误不会拖到第一次调用
        if let Some(pointcut) = &pointcut {
            pointcut.class_filter().matches(class)?;
        }

        let mut resolved = Vec::with_capacity(advisors.len());
        for advisor in advisors {
            resolved.push(ResolvedAdvisor {
                interceptor: registry.wrap(advisor.advice())?,
                class_matches: advisor.pointcut().class_filter().matches(class)?,
                advisor: advisor.clone(),
            });
        }

        Ok(Self {
            target,
            advisors: resolved,
            pointcut,
            proxy_target_class,
            opaque,
            chains: RwLock::new(HashMap::new()),
        })
    }

    pub fn target(&self) -> &Arc<dyn ProxyTarget> {
        &self.target
    }

    pub fn target_class(&self) -> &'static TargetClass {
        self.target.target_class()
    }

    /// 按注册顺序排列的 advisor
    pub fn advisors(&self) -> impl Iterator<Item = &Advisor> {
        self.advisors.iter().map(|r| &r.advisor)
    }

    pub fn advisor_count(&self) -> usize {
        self.advisors.len()
    }

    /// 作用于所有 advisor 的全局切点
    pub fn pointcut(&self) -> Option<&Arc<dyn Pointcut>> {
        self.pointcut.as_ref()
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// 获取方法的拦截器链，第一次调用时构建并缓存
    pub fn chain_for(&self, method: &'static Method) -> AopResult<Arc<InterceptorChain>> {
        let key = (method.declaring_type(), method.name());
        if let Some(chain) = self.chains.read().get(&key) {
            return Ok(Arc::clone(chain));
        }

        let chain = Arc::new(self.build_chain(method)?);
        let mut chains = self.chains.write();
        Ok(Arc::clone(chains.entry(key).or_insert(chain)))
    }

    /// 是否有 advisor 静态匹配到该方法（不考虑运行时检查）
    fn advises(&self, method: &Method) -> AopResult<bool> {
        if !self.global_matches(method)? {
            return Ok(false);
        }
        for resolved in &self.advisors {
            if resolved.class_matches
                && resolved
                    .advisor
                    .pointcut()
                    .method_matcher()
                    .matches(method, self.target_class())?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn global_matches(&self, method: &Method) -> AopResult<bool> {
        match &self.pointcut {
            Some(pointcut) => matches_statically(pointcut.as_ref(), method, self.target_class()),
            None => Ok(true),
        }
    }

    fn build_chain(&self, method: &'static Method) -> AopResult<InterceptorChain> {
        let class = self.target_class();
        if !self.global_matches(method)? {
            tracing::trace!(method = %method, "Method excluded by proxy pointcut");
            return Ok(InterceptorChain::default());
        }

        let global_runtime = self
            .pointcut
            .as_ref()
            .filter(|p| p.method_matcher().is_runtime());

        let mut entries = Vec::new();
        for resolved in &self.advisors {
            let pointcut = resolved.advisor.pointcut();
            if !resolved.class_matches || !pointcut.method_matcher().matches(method, class)? {
                continue;
            }

            let mut runtime_checks: Vec<Arc<dyn Pointcut>> = global_runtime.cloned().into_iter().collect();
            if pointcut.method_matcher().is_runtime() {
                runtime_checks.push(Arc::clone(pointcut));
            }

            let interceptor = Arc::clone(&resolved.interceptor);
            entries.push(if runtime_checks.is_empty() {
                ChainEntry::Static(interceptor)
            } else {
                ChainEntry::Dynamic {
                    interceptor,
                    pointcuts: runtime_checks,
                }
            });
        }

        tracing::trace!(
            method = %method,
            interceptors = entries.len(),
            "Built interceptor chain"
        );
        Ok(InterceptorChain::new(entries))
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("target_class", &self.target_class().name())
            .field("advisors", &self.advisors().collect::<Vec<_>>())
            .field("has_pointcut", &self.pointcut.is_some())
            .field("proxy_target_class", &self.proxy_target_class)
            .field("opaque", &self.opaque)
            .finish()
    }
}

// ============================================================================
// AopProxy
// ============================================================================

/// `get_proxy()` 的结果：对外呈现目标的契约，调用经过拦截器链
pub trait AopProxy: Send + Sync {
    fn invoke(&self, method: &'static Method, args: Args) -> InvocationResult;

    /// 按名称查找代理暴露的方法
    fn find_method(&self, name: &str) -> Option<&'static Method>;

    fn strategy(&self) -> ProxyStrategy;

    fn target_class(&self) -> &'static TargetClass;

    /// 访问代理背后的配置；opaque 代理拒绝访问
    fn advised(&self) -> AopResult<&ProxyConfig>;

    /// 按名称调用
    fn invoke_by_name(&self, name: &str, args: Args) -> InvocationResult {
        let method = self.find_method(name).ok_or_else(|| DispatchError::NoSuchMethod {
            target: self.target_class().name().to_string(),
            method: name.to_string(),
        })?;
        self.invoke(method, args)
    }
}

impl fmt::Debug for dyn AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy")
            .field("target_class", &self.target_class().name())
            .field("strategy", &self.strategy())
            .finish()
    }
}

fn advised_config(config: &ProxyConfig) -> AopResult<&ProxyConfig> {
    if config.is_opaque() {
        return Err(AopError::IllegalState(format!(
            "proxy for '{}' is opaque and cannot be introspected",
            config.target_class().name()
        )));
    }
    Ok(config)
}

/// 基于接口的代理
pub struct InterfaceProxy {
    config: Arc<ProxyConfig>,
}

impl InterfaceProxy {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }
}

impl AopProxy for InterfaceProxy {
    fn invoke(&self, method: &'static Method, args: Args) -> InvocationResult {
        let class = self.config.target_class();
        let declared = class.implements(method.declaring_type())
            && class.resolve(method.declaring_type(), method.name()).is_some();
        if !declared {
            return Err(AopError::no_such_method(class.name(), method).into());
        }

        let chain = self.config.chain_for(method)?;
        let target: &dyn ProxyTarget = &*self.config.target;
        let terminal = |args: &Args| target.invoke_method(method, args);
        MethodInvocation::new(method, args, target.as_any(), class, &chain, &terminal).proceed()
    }

    fn find_method(&self, name: &str) -> Option<&'static Method> {
        self.config
            .target_class()
            .interfaces()
            .iter()
            .find_map(|i| i.find_method(name))
    }

    fn strategy(&self) -> ProxyStrategy {
        ProxyStrategy::Interface
    }

    fn target_class(&self) -> &'static TargetClass {
        self.config.target_class()
    }

    fn advised(&self) -> AopResult<&ProxyConfig> {
        advised_config(&self.config)
    }
}

/// 基于子类的代理
///
/// 持有具体类型，终端直接调用其原始方法实现
pub struct ClassProxy<T: ClassProxyable> {
    target: Arc<T>,
    config: Arc<ProxyConfig>,
    super_methods: HashMap<&'static str, SuperMethod<T>>,
}

impl<T: ClassProxyable> ClassProxy<T> {
    /// final 类型，或者被 advisor 匹配到的 final 方法，都无法生成子类代理
    pub fn create(target: Arc<T>, config: Arc<ProxyConfig>) -> AopResult<Self> {
        let class = target.target_class();
        if class.is_final() {
            return Err(AopError::proxy_creation(
                class.name(),
                "type is final and cannot be subclassed",
            ));
        }

        for method in class.methods().iter().filter(|m| m.is_final()) {
            if config.advises(method)? {
                return Err(AopError::proxy_creation(
                    class.name(),
                    format!("advised method '{}' is final and cannot be overridden", method.name()),
                ));
            }
        }

        let super_methods = T::super_methods()
            .into_iter()
            .map(|m| (m.method().name(), m))
            .collect();

        Ok(Self {
            target,
            config,
            super_methods,
        })
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }
}

impl<T: ClassProxyable> AopProxy for ClassProxy<T> {
    fn invoke(&self, method: &'static Method, args: Args) -> InvocationResult {
        let class = self.target.target_class();
        let target: &T = &self.target;

        let super_method = if method.declaring_type() == class.name() {
            let found = self.super_methods.get(method.name()).copied();
            Some(found.ok_or_else(|| AopError::no_such_method(class.name(), method))?)
        } else if class.resolve(method.declaring_type(), method.name()).is_some() {
            None
        } else {
            return Err(AopError::no_such_method(class.name(), method).into());
        };

        let chain = self.config.chain_for(method)?;
        let terminal = |args: &Args| match &super_method {
            Some(super_method) => super_method.call(target, args),
            None => target.invoke_method(method, args),
        };
        MethodInvocation::new(method, args, target.as_any(), class, &chain, &terminal).proceed()
    }

    /// 自身方法优先
    fn find_method(&self, name: &str) -> Option<&'static Method> {
        let class = self.target.target_class();
        class
            .methods()
            .iter()
            .find(|m| m.name() == name)
            .or_else(|| class.find_method(name))
    }

    fn strategy(&self) -> ProxyStrategy {
        ProxyStrategy::Subclass
    }

    fn target_class(&self) -> &'static TargetClass {
        self.target.target_class()
    }

    fn advised(&self) -> AopResult<&ProxyConfig> {
        advised_config(&self.config)
    }
}

/// 代理的类型化视图
///
/// 由 `#[aop_interface]` / `#[aop_class]` 生成，把动态的 [`AopProxy`] 包装成
/// 与目标相同的 Rust API
pub trait ProxyView: Sized {
    fn from_proxy(proxy: Arc<dyn AopProxy>) -> AopResult<Self>;
}

// ============================================================================
// ProxyFactory
// ============================================================================

/// 代理工厂
pub struct ProxyFactory {
    target: Option<TargetSource>,
    advisors: Vec<Advisor>,
    pointcut: Option<Arc<dyn Pointcut>>,
    proxy_target_class: bool,
    opaque: bool,
    frozen: bool,
    /// 第一次生成代理后自动冻结
    freeze_on_proxy: bool,
    proxied: AtomicBool,
    registry: Arc<AdvisorAdapterRegistry>,
}

impl ProxyFactory {
    /// 使用内置适配器的工厂
    pub fn new() -> Self {
        Self::with_registry(Arc::new(AdvisorAdapterRegistry::new()))
    }

    pub fn with_registry(registry: Arc<AdvisorAdapterRegistry>) -> Self {
        Self {
            target: None,
            advisors: Vec::new(),
            pointcut: None,
            proxy_target_class: false,
            opaque: false,
            frozen: false,
            freeze_on_proxy: false,
            proxied: AtomicBool::new(false),
            registry,
        }
    }

    /// 从 `[aop]` 配置创建
    ///
    /// `frozen = true` 不会立即冻结：目标和 advisor 仍可以配置，第一次 `get_proxy` 之后才拒绝修改
    pub fn from_properties(
        properties: &AopProperties,
        registry: Arc<AdvisorAdapterRegistry>,
    ) -> Self {
        let mut factory = Self::with_registry(registry);
        factory.proxy_target_class = properties.proxy_target_class;
        factory.opaque = properties.opaque;
        factory.freeze_on_proxy = properties.frozen;
        factory
    }

    fn ensure_mutable(&self, action: &str) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigFrozen(action.to_string()));
        }
        Ok(())
    }

    /// 只支持接口代理的目标
    pub fn set_target<T: ProxyTarget>(&mut self, target: Arc<T>) -> AopResult<&mut Self> {
        self.set_target_source(TargetSource::new(target))
    }

    /// 同时支持子类代理的目标
    pub fn set_class_target<T: ClassProxyable>(&mut self, target: Arc<T>) -> AopResult<&mut Self> {
        self.set_target_source(TargetSource::class(target))
    }

    pub fn set_target_source(&mut self, source: TargetSource) -> AopResult<&mut Self> {
        self.ensure_mutable("change target")?;
        tracing::debug!("Proxy target set to {}", source.target_class().name());
        self.target = Some(source);
        Ok(self)
    }

    /// 添加作用于所有方法的通知
    ///
    /// 通知立即经过适配器注册表校验，不支持的通知在这里就失败
    pub fn add_advice(&mut self, advice: Advice) -> AopResult<&mut Self> {
        self.add_advisor(Advisor::for_all(advice))
    }

    pub fn add_advisor(&mut self, advisor: Advisor) -> AopResult<&mut Self> {
        self.ensure_mutable("add advisor")?;
        self.registry.wrap(advisor.advice())?;
        tracing::debug!(
            advice = %advisor.advice().name(),
            position = self.advisors.len(),
            "Advisor added"
        );
        self.advisors.push(advisor);
        Ok(self)
    }

    /// 设置全局切点：只有它匹配的方法才会经过 advisor
    pub fn set_pointcut(&mut self, pointcut: Arc<dyn Pointcut>) -> AopResult<&mut Self> {
        self.ensure_mutable("set pointcut")?;
        self.pointcut = Some(pointcut);
        Ok(self)
    }

    pub fn set_proxy_target_class(&mut self, proxy_target_class: bool) -> AopResult<&mut Self> {
        self.ensure_mutable("change proxy strategy")?;
        self.proxy_target_class = proxy_target_class;
        Ok(self)
    }

    pub fn set_opaque(&mut self, opaque: bool) -> AopResult<&mut Self> {
        self.ensure_mutable("change opaque flag")?;
        self.opaque = opaque;
        Ok(self)
    }

    /// 冻结标志本身总是可以修改
    pub fn set_frozen(&mut self, frozen: bool) -> &mut Self {
        self.frozen = frozen;
        if !frozen {
            self.freeze_on_proxy = false;
        }
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen || (self.freeze_on_proxy && self.proxied.load(Ordering::Acquire))
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class
    }

    pub fn advisors(&self) -> &[Advisor] {
        &self.advisors
    }

    pub fn registry(&self) -> &Arc<AdvisorAdapterRegistry> {
        &self.registry
    }

    /// 将要使用的代理策略
    pub fn strategy(&self) -> Option<ProxyStrategy> {
        self.target.as_ref().map(|source| {
            if self.proxy_target_class || !source.target_class().has_interfaces() {
                ProxyStrategy::Subclass
            } else {
                ProxyStrategy::Interface
            }
        })
    }

    /// 根据当前配置的快照生成代理
    pub fn get_proxy(&self) -> AopResult<Arc<dyn AopProxy>> {
        let source = self
            .target
            .as_ref()
            .ok_or_else(|| AopError::IllegalState("no target set on proxy factory".to_string()))?;
        let class = source.target_class();

        let config = Arc::new(ProxyConfig::new(
            Arc::clone(source.target()),
            &self.advisors,
            self.pointcut.clone(),
            &self.registry,
            self.proxy_target_class,
            self.opaque,
        )?);

        let strategy = self.strategy().unwrap_or(ProxyStrategy::Interface);
        let proxy: Arc<dyn AopProxy> = match strategy {
            ProxyStrategy::Interface => Arc::new(InterfaceProxy::new(config)),
            ProxyStrategy::Subclass => match source.build_class_proxy(config) {
                Some(proxy) => proxy?,
                None if class.has_interfaces() => {
                    return Err(AopError::proxy_creation(
                        class.name(),
                        "class proxying was requested but the target does not support it",
                    ))
                }
                None => {
                    return Err(AopError::proxy_creation(
                        class.name(),
                        "target implements no interfaces and does not support class proxying",
                    ))
                }
            },
        };

        tracing::debug!(
            target_class = class.name(),
            strategy = %strategy,
            advisors = self.advisors.len(),
            "Created AOP proxy"
        );
        if self.freeze_on_proxy && !self.proxied.swap(true, Ordering::AcqRel) {
            tracing::debug!(target_class = class.name(), "Proxy configuration frozen");
        }
        Ok(proxy)
    }

    /// 生成代理并转换为类型化视图
    pub fn proxy<V: ProxyView>(&self) -> AopResult<V> {
        V::from_proxy(self.get_proxy()?)
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("target", &self.target)
            .field("advisors", &self.advisors)
            .field("has_pointcut", &self.pointcut.is_some())
            .field("proxy_target_class", &self.proxy_target_class)
            .field("opaque", &self.opaque)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
