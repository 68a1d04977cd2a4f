//! 切点（Pointcut）
//!
//! 切点 = 类过滤器（ClassFilter）+ 方法匹配器（MethodMatcher）。
//! 静态匹配在构建拦截器链时执行一次；`is_runtime()` 为 true 的匹配器会在每次调用时用实际参数再匹配一次。
//! 匹配是可失败的：表达式切点编译失败时返回错误，而不是静默地返回 false。

use crate::error::{AopError, AopResult};
use crate::method::{Method, TargetClass};
use crate::value::Args;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 类过滤器
pub trait ClassFilter: Send + Sync {
    fn matches(&self, class: &TargetClass) -> AopResult<bool>;
}

impl<F> ClassFilter for F
where
    F: Fn(&TargetClass) -> bool + Send + Sync,
{
    fn matches(&self, class: &TargetClass) -> AopResult<bool> {
        Ok(self(class))
    }
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool>;

    /// 是否需要在每次调用时用实际参数再次匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时匹配，只在静态匹配成功且 `is_runtime()` 为 true 时调用
    fn matches_runtime(&self, _method: &Method, _class: &TargetClass, _args: &Args) -> AopResult<bool> {
        Ok(true)
    }
}

impl<F> MethodMatcher for F
where
    F: Fn(&Method, &TargetClass) -> bool + Send + Sync,
{
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok(self(method, class))
    }
}

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    fn class_filter(&self) -> &dyn ClassFilter;

    fn method_matcher(&self) -> &dyn MethodMatcher;
}

/// 静态匹配：类过滤器和方法匹配器都通过
pub fn matches_statically(
    pointcut: &dyn Pointcut,
    method: &Method,
    class: &TargetClass,
) -> AopResult<bool> {
    Ok(pointcut.class_filter().matches(class)? && pointcut.method_matcher().matches(method, class)?)
}

/// 切点是否可能作用于该类型的任意一个方法
pub fn can_apply(pointcut: &dyn Pointcut, class: &TargetClass) -> AopResult<bool> {
    if !pointcut.class_filter().matches(class)? {
        return Ok(false);
    }
    let matcher = pointcut.method_matcher();
    for method in class.all_methods() {
        if matcher.matches(method, class)? {
            return Ok(true);
        }
    }
    Ok(false)
}

// ============================================================================
// 恒真切点
// ============================================================================

/// 匹配所有类型
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &TargetClass) -> AopResult<bool> {
        Ok(true)
    }
}

/// 匹配所有方法
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _class: &TargetClass) -> AopResult<bool> {
        Ok(true)
    }
}

/// 匹配一切的恒等切点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        &TrueMethodMatcher
    }
}

// ============================================================================
// 通配符
// ============================================================================

/// 简单的通配符模式（支持 `*`）
///
/// - `*` - 匹配任意字符串
/// - `User*` - 以 User 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    regex: Option<Regex>,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> AopResult<Self> {
        if pattern == "*" || !pattern.contains('*') {
            return Ok(Self {
                source: pattern.to_string(),
                regex: None,
            });
        }

        let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
        let regex = Regex::new(&format!("^{}$", escaped.join(".*")))
            .map_err(|e| AopError::expression_compile(pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex: Some(regex),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(text),
            None => self.source == "*" || self.source == text,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobPattern({})", self.source)
    }
}

// ============================================================================
// 按方法名 / 正则匹配
// ============================================================================

/// 按方法名匹配（支持 `*` 通配符）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodPointcut {
    names: Vec<GlobPattern>,
}

impl NameMatchMethodPointcut {
    pub fn new<I, S>(names: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| GlobPattern::new(n.as_ref()))
            .collect::<AopResult<Vec<_>>>()?;
        Ok(Self { names })
    }

    pub fn add_method_name(mut self, name: &str) -> AopResult<Self> {
        self.names.push(GlobPattern::new(name)?);
        Ok(self)
    }
}

impl MethodMatcher for NameMatchMethodPointcut {
    fn matches(&self, method: &Method, _class: &TargetClass) -> AopResult<bool> {
        Ok(self.names.iter().any(|n| n.matches(method.name())))
    }
}

impl Pointcut for NameMatchMethodPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

/// 正则匹配 `Type::method`
///
/// 声明类型和目标类型两种签名都会尝试，命中排除模式的方法不匹配
#[derive(Debug, Clone, Default)]
pub struct RegexpMethodPointcut {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexpMethodPointcut {
    pub fn new<I, S>(patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: compile_all(patterns)?,
            excluded: Vec::new(),
        })
    }

    pub fn exclude<I, S>(mut self, patterns: I) -> AopResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded.extend(compile_all(patterns)?);
        Ok(self)
    }

    fn matches_signature(&self, signature: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(signature))
            && !self.excluded.iter().any(|p| p.is_match(signature))
    }
}

fn compile_all<I, S>(patterns: I) -> AopResult<Vec<Regex>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| {
            Regex::new(p.as_ref())
                .map_err(|e| AopError::expression_compile(p.as_ref(), e.to_string()))
        })
        .collect()
}

impl MethodMatcher for RegexpMethodPointcut {
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        let declared = method.signature();
        let on_target = format!("{}::{}", class.name(), method.name());
        Ok(self.matches_signature(&declared) || self.matches_signature(&on_target))
    }
}

impl Pointcut for RegexpMethodPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

// ============================================================================
// 闭包切点
// ============================================================================

/// 只做静态匹配的闭包切点
pub struct StaticMethodMatcherPointcut<F> {
    matcher: F,
}

impl<F> StaticMethodMatcherPointcut<F>
where
    F: Fn(&Method, &TargetClass) -> bool + Send + Sync,
{
    pub fn new(matcher: F) -> Self {
        Self { matcher }
    }
}

impl<F> MethodMatcher for StaticMethodMatcherPointcut<F>
where
    F: Fn(&Method, &TargetClass) -> bool + Send + Sync,
{
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok((self.matcher)(method, class))
    }
}

impl<F> Pointcut for StaticMethodMatcherPointcut<F>
where
    F: Fn(&Method, &TargetClass) -> bool + Send + Sync,
{
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

/// 需要运行时参数检查的闭包切点
pub struct DynamicMethodMatcherPointcut<S, R> {
    static_match: S,
    runtime_match: R,
}

impl<S, R> DynamicMethodMatcherPointcut<S, R>
where
    S: Fn(&Method, &TargetClass) -> bool + Send + Sync,
    R: Fn(&Method, &TargetClass, &Args) -> bool + Send + Sync,
{
    pub fn new(static_match: S, runtime_match: R) -> Self {
        Self {
            static_match,
            runtime_match,
        }
    }
}

impl<S, R> MethodMatcher for DynamicMethodMatcherPointcut<S, R>
where
    S: Fn(&Method, &TargetClass) -> bool + Send + Sync,
    R: Fn(&Method, &TargetClass, &Args) -> bool + Send + Sync,
{
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok((self.static_match)(method, class))
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> AopResult<bool> {
        Ok((self.runtime_match)(method, class, args))
    }
}

impl<S, R> Pointcut for DynamicMethodMatcherPointcut<S, R>
where
    S: Fn(&Method, &TargetClass) -> bool + Send + Sync,
    R: Fn(&Method, &TargetClass, &Args) -> bool + Send + Sync,
{
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

// ============================================================================
// 组合切点
// ============================================================================

/// 可组合切点：与（intersection）/ 或（union）
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    /// 从恒真切点开始组合
    pub fn new() -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn from_parts(class_filter: Arc<dyn ClassFilter>, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    /// 包装任意切点
    pub fn from_pointcut(pointcut: Arc<dyn Pointcut>) -> Self {
        Self {
            class_filter: Arc::new(DelegatingClassFilter(Arc::clone(&pointcut))),
            method_matcher: Arc::new(DelegatingMethodMatcher(pointcut)),
        }
    }

    pub fn intersection_class_filter(mut self, filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = Arc::new(IntersectionClassFilter(self.class_filter, filter));
        self
    }

    pub fn union_class_filter(mut self, filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = Arc::new(UnionClassFilter(self.class_filter, filter));
        self
    }

    pub fn intersection_method_matcher(mut self, matcher: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = Arc::new(IntersectionMethodMatcher(self.method_matcher, matcher));
        self
    }

    /// 与另一个切点做交集
    pub fn intersection(self, other: Arc<dyn Pointcut>) -> Self {
        let other = Self::from_pointcut(other);
        Self {
            class_filter: Arc::new(IntersectionClassFilter(self.class_filter, other.class_filter)),
            method_matcher: Arc::new(IntersectionMethodMatcher(
                self.method_matcher,
                other.method_matcher,
            )),
        }
    }

    /// 与另一个切点做并集
    ///
    /// 方法匹配时各自带上自己的类过滤器，避免 A 的方法匹配器借用 B 的类过滤结果
    pub fn union(self, other: Arc<dyn Pointcut>) -> Self {
        let other = Self::from_pointcut(other);
        Self {
            class_filter: Arc::new(UnionClassFilter(
                Arc::clone(&self.class_filter),
                Arc::clone(&other.class_filter),
            )),
            method_matcher: Arc::new(UnionMethodMatcher {
                left: (self.class_filter, self.method_matcher),
                right: (other.class_filter, other.method_matcher),
            }),
        }
    }
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self.method_matcher.as_ref()
    }
}

struct DelegatingClassFilter(Arc<dyn Pointcut>);

impl ClassFilter for DelegatingClassFilter {
    fn matches(&self, class: &TargetClass) -> AopResult<bool> {
        self.0.class_filter().matches(class)
    }
}

struct DelegatingMethodMatcher(Arc<dyn Pointcut>);

impl MethodMatcher for DelegatingMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        self.0.method_matcher().matches(method, class)
    }

    fn is_runtime(&self) -> bool {
        self.0.method_matcher().is_runtime()
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> AopResult<bool> {
        self.0.method_matcher().matches_runtime(method, class, args)
    }
}

struct IntersectionClassFilter(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>);

impl ClassFilter for IntersectionClassFilter {
    fn matches(&self, class: &TargetClass) -> AopResult<bool> {
        Ok(self.0.matches(class)? && self.1.matches(class)?)
    }
}

struct UnionClassFilter(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>);

impl ClassFilter for UnionClassFilter {
    fn matches(&self, class: &TargetClass) -> AopResult<bool> {
        Ok(self.0.matches(class)? || self.1.matches(class)?)
    }
}

struct IntersectionMethodMatcher(Arc<dyn MethodMatcher>, Arc<dyn MethodMatcher>);

impl MethodMatcher for IntersectionMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok(self.0.matches(method, class)? && self.1.matches(method, class)?)
    }

    fn is_runtime(&self) -> bool {
        self.0.is_runtime() || self.1.is_runtime()
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> AopResult<bool> {
        let left = !self.0.is_runtime() || self.0.matches_runtime(method, class, args)?;
        Ok(left && (!self.1.is_runtime() || self.1.matches_runtime(method, class, args)?))
    }
}

type FilteredMatcher = (Arc<dyn ClassFilter>, Arc<dyn MethodMatcher>);

struct UnionMethodMatcher {
    left: FilteredMatcher,
    right: FilteredMatcher,
}

impl UnionMethodMatcher {
    fn side_matches(side: &FilteredMatcher, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok(side.0.matches(class)? && side.1.matches(method, class)?)
    }

    fn side_matches_runtime(
        side: &FilteredMatcher,
        method: &Method,
        class: &TargetClass,
        args: &Args,
    ) -> AopResult<bool> {
        if !Self::side_matches(side, method, class)? {
            return Ok(false);
        }
        Ok(!side.1.is_runtime() || side.1.matches_runtime(method, class, args)?)
    }
}

impl MethodMatcher for UnionMethodMatcher {
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        Ok(Self::side_matches(&self.left, method, class)?
            || Self::side_matches(&self.right, method, class)?)
    }

    fn is_runtime(&self) -> bool {
        self.left.1.is_runtime() || self.right.1.is_runtime()
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> AopResult<bool> {
        Ok(Self::side_matches_runtime(&self.left, method, class, args)?
            || Self::side_matches_runtime(&self.right, method, class, args)?)
    }
}
