//! 表达式切点
//!
//! [`ExpressionPointcut`] 把文本表达式交给可插拔的 [`PointcutExpressionEngine`] 编译，
//! 编译在第一次匹配时惰性进行且只成功一次。默认引擎 [`PatternExpressionEngine`] 支持：
//!
//! - `execution(* UserService.find_user(..))` - 返回类型只支持 `*`，可省略；类型部分可省略。
//!   参数列表里的 `*`、`..` 只约束参数个数，具体类型名（如 `u64`）和 `args` 一样在运行时检查
//! - `within(*Service)` - 目标类型名
//! - `args(String, ..)` - 实际参数类型（运行时检查）
//! - `&&`、`||`、`!` 以及括号

use crate::error::{AopError, AopResult};
use crate::method::{Method, TargetClass};
use crate::pointcut::{ClassFilter, GlobPattern, MethodMatcher, Pointcut};
use crate::value::Args;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// 静态匹配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMatch {
    /// 总是匹配
    Always,
    /// 绝不匹配
    Never,
    /// 需要运行时检查
    Maybe,
}

impl ShadowMatch {
    fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Never, _) | (_, Self::Never) => Self::Never,
            (Self::Always, Self::Always) => Self::Always,
            _ => Self::Maybe,
        }
    }

    fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Always, _) | (_, Self::Always) => Self::Always,
            (Self::Never, Self::Never) => Self::Never,
            _ => Self::Maybe,
        }
    }

    fn not(self) -> Self {
        match self {
            Self::Always => Self::Never,
            Self::Never => Self::Always,
            Self::Maybe => Self::Maybe,
        }
    }

    fn from_bool(matched: bool) -> Self {
        if matched {
            Self::Always
        } else {
            Self::Never
        }
    }
}

/// 切点表达式引擎
pub trait PointcutExpressionEngine: Send + Sync {
    fn compile(&self, expression: &str) -> AopResult<Arc<dyn CompiledExpression>>;
}

/// 编译后的切点表达式
pub trait CompiledExpression: Send + Sync + fmt::Debug {
    /// 该类型的某些方法是否可能匹配
    fn could_match(&self, class: &TargetClass) -> bool;

    /// 方法执行的静态匹配
    fn matches_execution(&self, method: &Method, class: &TargetClass) -> ShadowMatch;

    /// 是否包含需要运行时检查的部分
    fn may_need_runtime_test(&self) -> bool;

    /// 使用实际参数的完整匹配
    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> bool;
}

/// 基于表达式的切点
pub struct ExpressionPointcut {
    expression: Option<String>,
    engine: Arc<dyn PointcutExpressionEngine>,
    compiled: OnceCell<Arc<dyn CompiledExpression>>,
}

impl ExpressionPointcut {
    /// 使用默认引擎
    pub fn new(expression: impl Into<String>) -> Self {
        Self::with_engine(expression, Arc::new(PatternExpressionEngine))
    }

    pub fn with_engine(
        expression: impl Into<String>,
        engine: Arc<dyn PointcutExpressionEngine>,
    ) -> Self {
        Self {
            expression: Some(expression.into()),
            engine,
            compiled: OnceCell::new(),
        }
    }

    /// 尚未设置表达式的切点，匹配时返回 IllegalState
    pub fn unset(engine: Arc<dyn PointcutExpressionEngine>) -> Self {
        Self {
            expression: None,
            engine,
            compiled: OnceCell::new(),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    fn compiled(&self) -> AopResult<&Arc<dyn CompiledExpression>> {
        self.compiled.get_or_try_init(|| {
            let expression = self.expression.as_deref().ok_or_else(|| {
                AopError::IllegalState("expression pointcut has no expression set".to_string())
            })?;
            tracing::debug!(expression, "Compiling pointcut expression");
            self.engine.compile(expression)
        })
    }
}

impl ClassFilter for ExpressionPointcut {
    fn matches(&self, class: &TargetClass) -> AopResult<bool> {
        Ok(self.compiled()?.could_match(class))
    }
}

impl MethodMatcher for ExpressionPointcut {
    fn matches(&self, method: &Method, class: &TargetClass) -> AopResult<bool> {
        let shadow = self.compiled()?.matches_execution(method, class);
        Ok(shadow != ShadowMatch::Never)
    }

    /// 只有在编译完成后才可能为 true；构建拦截器链时静态匹配总是先于它执行
    fn is_runtime(&self) -> bool {
        self.compiled
            .get()
            .map(|c| c.may_need_runtime_test())
            .unwrap_or(false)
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> AopResult<bool> {
        Ok(self.compiled()?.matches_runtime(method, class, args))
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionPointcut")
            .field("expression", &self.expression)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

// ============================================================================
// 默认引擎
// ============================================================================

/// 自带的表达式引擎，不依赖外部解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExpressionEngine;

impl PointcutExpressionEngine for PatternExpressionEngine {
    fn compile(&self, expression: &str) -> AopResult<Arc<dyn CompiledExpression>> {
        let compiled = PointcutExpression::parse(expression)?;
        Ok(Arc::new(compiled))
    }
}

/// 参数列表模式：`..` 表示任意个参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPattern {
    Any,
    Rest,
    Type(String),
}

/// 编译后的切点表达式
#[derive(Clone)]
pub enum PointcutExpression {
    /// execution(* Type.method(params))
    Execution {
        type_pattern: Option<GlobPattern>,
        method_pattern: GlobPattern,
        params: Vec<ArgPattern>,
    },

    /// within(TypePattern)
    Within(GlobPattern),

    /// args(types)
    Args(Vec<ArgPattern>),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    pub fn parse(expression: &str) -> AopResult<Self> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            expression,
            tokens,
            pos: 0,
        };
        let parsed = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected token {token:?}")));
        }
        Ok(parsed)
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn class_match(&self, class: &TargetClass) -> ShadowMatch {
        match self {
            Self::Execution { type_pattern, .. } => match type_pattern {
                None => ShadowMatch::Maybe,
                Some(pattern) => {
                    let reachable = pattern.matches(class.name())
                        || class.interfaces().iter().any(|i| pattern.matches(i.name()));
                    if reachable {
                        ShadowMatch::Maybe
                    } else {
                        ShadowMatch::Never
                    }
                }
            },
            Self::Within(pattern) => ShadowMatch::from_bool(pattern.matches(class.name())),
            Self::Args(_) => ShadowMatch::Maybe,
            Self::And(l, r) => l.class_match(class).and(r.class_match(class)),
            Self::Or(l, r) => l.class_match(class).or(r.class_match(class)),
            Self::Not(e) => e.class_match(class).not(),
        }
    }

    fn shadow_match(&self, method: &Method, class: &TargetClass) -> ShadowMatch {
        match self {
            Self::Execution { params, .. } => {
                if !self.static_matches(method, class) {
                    ShadowMatch::Never
                } else if has_type_constraints(params) {
                    ShadowMatch::Maybe
                } else {
                    ShadowMatch::Always
                }
            }
            Self::Within(_) => ShadowMatch::from_bool(self.static_matches(method, class)),
            Self::Args(patterns) => {
                if arity_compatible(patterns, method.arity()) {
                    ShadowMatch::Maybe
                } else {
                    ShadowMatch::Never
                }
            }
            Self::And(l, r) => l.shadow_match(method, class).and(r.shadow_match(method, class)),
            Self::Or(l, r) => l.shadow_match(method, class).or(r.shadow_match(method, class)),
            Self::Not(e) => e.shadow_match(method, class).not(),
        }
    }

    fn static_matches(&self, method: &Method, class: &TargetClass) -> bool {
        match self {
            Self::Execution {
                type_pattern,
                method_pattern,
                params,
            } => {
                let type_ok = type_pattern.as_ref().map_or(true, |p| {
                    p.matches(method.declaring_type()) || p.matches(class.name())
                });
                type_ok && method_pattern.matches(method.name()) && arity_compatible(params, method.arity())
            }
            Self::Within(pattern) => pattern.matches(class.name()),
            _ => false,
        }
    }

    fn evaluate(&self, method: &Method, class: &TargetClass, args: &Args) -> bool {
        match self {
            Self::Execution { params, .. } => {
                self.static_matches(method, class)
                    && (!has_type_constraints(params) || runtime_args_match(params, args))
            }
            Self::Within(_) => self.static_matches(method, class),
            Self::Args(patterns) => runtime_args_match(patterns, args),
            Self::And(l, r) => l.evaluate(method, class, args) && r.evaluate(method, class, args),
            Self::Or(l, r) => l.evaluate(method, class, args) || r.evaluate(method, class, args),
            Self::Not(e) => !e.evaluate(method, class, args),
        }
    }

    fn contains_args(&self) -> bool {
        match self {
            Self::Args(_) => true,
            Self::Execution { params, .. } => has_type_constraints(params),
            Self::Within(_) => false,
            Self::And(l, r) | Self::Or(l, r) => l.contains_args() || r.contains_args(),
            Self::Not(e) => e.contains_args(),
        }
    }
}

impl CompiledExpression for PointcutExpression {
    fn could_match(&self, class: &TargetClass) -> bool {
        self.class_match(class) != ShadowMatch::Never
    }

    fn matches_execution(&self, method: &Method, class: &TargetClass) -> ShadowMatch {
        self.shadow_match(method, class)
    }

    fn may_need_runtime_test(&self) -> bool {
        self.contains_args()
    }

    fn matches_runtime(&self, method: &Method, class: &TargetClass, args: &Args) -> bool {
        self.evaluate(method, class, args)
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution {
                type_pattern,
                method_pattern,
                params,
            } => {
                write!(f, "Execution(")?;
                if let Some(p) = type_pattern {
                    write!(f, "{}.", p.as_str())?;
                }
                write!(f, "{}({}))", method_pattern.as_str(), render_args(params))
            }
            Self::Within(p) => write!(f, "Within({})", p.as_str()),
            Self::Args(patterns) => write!(f, "Args({})", render_args(patterns)),
            Self::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            Self::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            Self::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

fn render_args(patterns: &[ArgPattern]) -> String {
    patterns
        .iter()
        .map(|p| match p {
            ArgPattern::Any => "*".to_string(),
            ArgPattern::Rest => "..".to_string(),
            ArgPattern::Type(t) => t.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn arity_compatible(patterns: &[ArgPattern], arity: usize) -> bool {
    let fixed = patterns.iter().filter(|p| **p != ArgPattern::Rest).count();
    if patterns.contains(&ArgPattern::Rest) {
        arity >= fixed
    } else {
        arity == fixed
    }
}

fn has_type_constraints(patterns: &[ArgPattern]) -> bool {
    patterns.iter().any(|p| matches!(p, ArgPattern::Type(_)))
}

fn runtime_args_match(patterns: &[ArgPattern], args: &Args) -> bool {
    let names: Vec<&str> = args.type_names().collect();
    args_match(patterns, &names)
}

fn args_match(patterns: &[ArgPattern], type_names: &[&str]) -> bool {
    match patterns.split_first() {
        None => type_names.is_empty(),
        Some((ArgPattern::Rest, rest)) => {
            (0..=type_names.len()).any(|skip| args_match(rest, &type_names[skip..]))
        }
        Some((pattern, rest)) => match type_names.split_first() {
            None => false,
            Some((name, remaining)) => type_matches(pattern, name) && args_match(rest, remaining),
        },
    }
}

fn type_matches(pattern: &ArgPattern, type_name: &str) -> bool {
    match pattern {
        ArgPattern::Any | ArgPattern::Rest => true,
        ArgPattern::Type(expected) => {
            let base = type_name.split('<').next().unwrap_or(type_name);
            let short = base.rsplit("::").next().unwrap_or(base);
            expected == type_name || expected == short
        }
    }
}

// ============================================================================
// 词法 / 语法分析
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LParen,
    RParen,
    Dot,
    DotDot,
    Comma,
    And,
    Or,
    Not,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '*' | ':' | '<' | '>')
}

fn tokenize(expression: &str) -> AopResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '.' => {
                chars.next();
                if chars.peek() == Some(&'.') {
                    chars.next();
                    tokens.push(Token::DotDot);
                } else {
                    tokens.push(Token::Dot);
                }
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(AopError::expression_compile(
                        expression,
                        format!("expected '{c}{c}'"),
                    ));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(AopError::expression_compile(
                    expression,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }

    if tokens.is_empty() {
        return Err(AopError::expression_compile(expression, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> AopResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of expression"))),
        }
    }

    fn word(&mut self) -> AopResult<String> {
        match self.next() {
            Some(Token::Word(word)) => Ok(word),
            Some(token) => Err(self.error(format!("expected a name pattern, found {token:?}"))),
            None => Err(self.error("expected a name pattern, found end of expression")),
        }
    }

    fn error(&self, reason: impl Into<String>) -> AopError {
        AopError::expression_compile(self.expression, reason)
    }

    fn glob(&self, pattern: &str) -> AopResult<GlobPattern> {
        GlobPattern::new(pattern).map_err(|_| self.error(format!("invalid pattern '{pattern}'")))
    }

    fn parse_or(&mut self) -> AopResult<PointcutExpression> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> AopResult<PointcutExpression> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> AopResult<PointcutExpression> {
        if self.eat(&Token::Not) {
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AopResult<PointcutExpression> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let designator = self.word()?;
        match designator.as_str() {
            "execution" => self.parse_execution(),
            "within" => {
                self.expect(Token::LParen)?;
                let pattern = self.word()?;
                self.expect(Token::RParen)?;
                Ok(PointcutExpression::Within(self.glob(&pattern)?))
            }
            "args" => {
                self.expect(Token::LParen)?;
                let patterns = self.parse_arg_list()?;
                Ok(PointcutExpression::Args(patterns))
            }
            other => Err(self.error(format!("unknown designator '{other}'"))),
        }
    }

    fn parse_execution(&mut self) -> AopResult<PointcutExpression> {
        self.expect(Token::LParen)?;

        let first = self.word()?;
        let name_part = if matches!(self.peek(), Some(Token::Word(_))) {
            if first != "*" {
                return Err(self.error(format!(
                    "return type pattern '{first}' is not supported, use '*'"
                )));
            }
            self.word()?
        } else {
            first
        };

        let (type_pattern, method_pattern) = if self.eat(&Token::Dot) {
            let method = self.word()?;
            (Some(self.glob(&name_part)?), self.glob(&method)?)
        } else {
            (None, self.glob(&name_part)?)
        };

        self.expect(Token::LParen)?;
        let params = self.parse_arg_list()?;
        self.expect(Token::RParen)?;

        Ok(PointcutExpression::Execution {
            type_pattern,
            method_pattern,
            params,
        })
    }

    /// 解析到右括号为止（包含右括号）
    fn parse_arg_list(&mut self) -> AopResult<Vec<ArgPattern>> {
        let mut patterns = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(patterns);
        }
        loop {
            let pattern = match self.next() {
                Some(Token::DotDot) => ArgPattern::Rest,
                Some(Token::Word(w)) if w == "*" => ArgPattern::Any,
                Some(Token::Word(w)) => ArgPattern::Type(w),
                Some(token) => {
                    return Err(self.error(format!("unexpected {token:?} in parameter list")))
                }
                None => return Err(self.error("unterminated parameter list")),
            };
            patterns.push(pattern);

            if self.eat(&Token::RParen) {
                return Ok(patterns);
            }
            self.expect(Token::Comma)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::InterfaceInfo;

    static USER_SERVICE: InterfaceInfo = InterfaceInfo::new(
        "UserService",
        &[
            Method::new("UserService", "find_user", 1),
            Method::new("UserService", "list_users", 0),
            Method::new("UserService", "rename_user", 2),
        ],
    );

    static USER_SERVICE_IMPL: TargetClass =
        TargetClass::new("UserServiceImpl", &[&USER_SERVICE], &[], false);

    static ORDER_REPOSITORY: TargetClass = TargetClass::new(
        "OrderRepository",
        &[],
        &[Method::new("OrderRepository", "save", 1)],
        false,
    );

    fn method(name: &str) -> &'static Method {
        USER_SERVICE.find_method(name).unwrap()
    }

    fn static_match(expression: &str, method: &Method, class: &TargetClass) -> bool {
        let pointcut = ExpressionPointcut::new(expression);
        ClassFilter::matches(&pointcut, class).unwrap()
            && MethodMatcher::matches(&pointcut, method, class).unwrap()
    }

    #[test]
    fn test_execution_expression() {
        let expr = "execution(* UserService.find_user(..))";
        assert!(static_match(expr, method("find_user"), &USER_SERVICE_IMPL));
        assert!(!static_match(expr, method("list_users"), &USER_SERVICE_IMPL));

        // 类型部分可以写实现类名
        let expr = "execution(* UserServiceImpl.*(..))";
        assert!(static_match(expr, method("list_users"), &USER_SERVICE_IMPL));

        // 省略返回类型和类型部分
        assert!(static_match("execution(find_*(..))", method("find_user"), &USER_SERVICE_IMPL));
    }

    #[test]
    fn test_execution_params() {
        assert!(static_match("execution(* *.*())", method("list_users"), &USER_SERVICE_IMPL));
        assert!(!static_match("execution(* *.*())", method("find_user"), &USER_SERVICE_IMPL));
        assert!(static_match("execution(* *.*(*, *))", method("rename_user"), &USER_SERVICE_IMPL));
        assert!(static_match("execution(* *.*(*, ..))", method("rename_user"), &USER_SERVICE_IMPL));
        assert!(!static_match("execution(* *.*(*, ..))", method("list_users"), &USER_SERVICE_IMPL));
    }

    #[test]
    fn test_execution_param_types_checked_at_runtime() {
        let pointcut = ExpressionPointcut::new("execution(* UserService.find_user(u64))");
        let find_user = method("find_user");

        // 参数个数相同，类型只能在调用时确定
        assert!(MethodMatcher::matches(&pointcut, find_user, &USER_SERVICE_IMPL).unwrap());
        assert!(pointcut.is_runtime());

        let by_id = Args::builder().arg(7u64).build();
        let by_name = Args::builder().arg("alice".to_string()).build();
        assert!(pointcut.matches_runtime(find_user, &USER_SERVICE_IMPL, &by_id).unwrap());
        assert!(!pointcut.matches_runtime(find_user, &USER_SERVICE_IMPL, &by_name).unwrap());

        // 只有通配符的参数列表不需要运行时检查
        let wildcard = ExpressionPointcut::new("execution(* UserService.find_user(*))");
        assert!(MethodMatcher::matches(&wildcard, find_user, &USER_SERVICE_IMPL).unwrap());
        assert!(!wildcard.is_runtime());
    }

    #[test]
    fn test_class_filter() {
        let pointcut = ExpressionPointcut::new("execution(* *Service.*(..))");
        assert!(ClassFilter::matches(&pointcut, &USER_SERVICE_IMPL).unwrap());
        assert!(!ClassFilter::matches(&pointcut, &ORDER_REPOSITORY).unwrap());

        let pointcut = ExpressionPointcut::new("within(*Repository)");
        assert!(ClassFilter::matches(&pointcut, &ORDER_REPOSITORY).unwrap());
        assert!(!ClassFilter::matches(&pointcut, &USER_SERVICE_IMPL).unwrap());

        let pointcut = ExpressionPointcut::new("!within(*Repository)");
        assert!(!ClassFilter::matches(&pointcut, &ORDER_REPOSITORY).unwrap());
    }

    #[test]
    fn test_boolean_operators() {
        let expr = "execution(* UserService.*(..)) && !execution(* *.list_*(..))";
        assert!(static_match(expr, method("find_user"), &USER_SERVICE_IMPL));
        assert!(!static_match(expr, method("list_users"), &USER_SERVICE_IMPL));

        let expr = "(within(OrderRepository) || execution(* *.list_users(..)))";
        assert!(static_match(expr, method("list_users"), &USER_SERVICE_IMPL));
        assert!(!static_match(expr, method("find_user"), &USER_SERVICE_IMPL));
    }

    #[test]
    fn test_args_needs_runtime_check() {
        let pointcut = ExpressionPointcut::new("execution(* *.*(..)) && args(String, ..)");
        let find_user = method("find_user");

        assert!(!pointcut.is_runtime());
        assert!(MethodMatcher::matches(&pointcut, find_user, &USER_SERVICE_IMPL).unwrap());
        assert!(pointcut.is_runtime());

        let by_name = Args::builder().arg("alice".to_string()).build();
        let by_id = Args::builder().arg(7u64).build();
        assert!(pointcut.matches_runtime(find_user, &USER_SERVICE_IMPL, &by_name).unwrap());
        assert!(!pointcut.matches_runtime(find_user, &USER_SERVICE_IMPL, &by_id).unwrap());

        // 参数个数不可能匹配时静态匹配就已失败
        assert!(!MethodMatcher::matches(&pointcut, method("list_users"), &USER_SERVICE_IMPL).unwrap());
    }

    #[test]
    fn test_args_patterns() {
        let names = ["u64", "alloc::string::String", "alloc::vec::Vec<u8>"];
        let parse = |s: &str| match PointcutExpression::parse(s).unwrap() {
            PointcutExpression::Args(patterns) => patterns,
            other => panic!("Expected Args, got {other:?}"),
        };

        assert!(args_match(&parse("args(u64, String, Vec)"), &names));
        assert!(args_match(&parse("args(.., Vec)"), &names));
        assert!(args_match(&parse("args(*, ..)"), &names));
        assert!(!args_match(&parse("args(String, ..)"), &names));
        assert!(!args_match(&parse("args()"), &names));
    }

    #[test]
    fn test_compile_is_lazy_and_errors_surface() {
        let pointcut = ExpressionPointcut::new("execution(* UserService.find_user(..)");
        assert!(!pointcut.is_compiled());

        let err = ClassFilter::matches(&pointcut, &USER_SERVICE_IMPL).unwrap_err();
        assert!(matches!(err, AopError::ExpressionCompile { .. }));
        assert!(!pointcut.is_compiled());

        let pointcut = ExpressionPointcut::new("within(UserServiceImpl)");
        assert!(!pointcut.is_compiled());
        assert!(ClassFilter::matches(&pointcut, &USER_SERVICE_IMPL).unwrap());
        assert!(pointcut.is_compiled());
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in [
            "",
            "execution",
            "bean(userService)",
            "execution(String UserService.find(..))",
            "within(A) & within(B)",
            "within(A) within(B)",
            "execution(* A.b(..)",
            "args(#)",
        ] {
            let err = PointcutExpression::parse(expr).unwrap_err();
            assert!(
                matches!(err, AopError::ExpressionCompile { .. }),
                "expected compile error for {expr:?}"
            );
        }
    }

    #[test]
    fn test_missing_expression_is_illegal_state() {
        let pointcut = ExpressionPointcut::unset(Arc::new(PatternExpressionEngine));
        let err = MethodMatcher::matches(&pointcut, method("find_user"), &USER_SERVICE_IMPL)
            .unwrap_err();
        assert!(matches!(err, AopError::IllegalState(_)));
    }

    #[test]
    fn test_pluggable_engine() {
        #[derive(Debug)]
        struct Everything;

        impl CompiledExpression for Everything {
            fn could_match(&self, _class: &TargetClass) -> bool {
                true
            }
            fn matches_execution(&self, _method: &Method, _class: &TargetClass) -> ShadowMatch {
                ShadowMatch::Always
            }
            fn may_need_runtime_test(&self) -> bool {
                false
            }
            fn matches_runtime(&self, _: &Method, _: &TargetClass, _: &Args) -> bool {
                true
            }
        }

        struct EverythingEngine;

        impl PointcutExpressionEngine for EverythingEngine {
            fn compile(&self, _expression: &str) -> AopResult<Arc<dyn CompiledExpression>> {
                Ok(Arc::new(Everything))
            }
        }

        let pointcut = ExpressionPointcut::with_engine("anything goes", Arc::new(EverythingEngine));
        assert!(static_match_with(&pointcut, method("find_user"), &ORDER_REPOSITORY));
    }

    fn static_match_with(pointcut: &ExpressionPointcut, method: &Method, class: &TargetClass) -> bool {
        ClassFilter::matches(pointcut, class).unwrap()
            && MethodMatcher::matches(pointcut, method, class).unwrap()
    }
}
