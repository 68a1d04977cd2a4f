//! 错误类型
//!
//! 配置期错误（通知无法适配、代理无法创建、表达式非法）通过 [`AopError`] 立即返回；
//! 调用期错误统一以 `anyhow::Error` 沿拦截器链向上传播，
//! 目标方法或拦截器抛出的原始错误可以通过 `downcast` 原样取回。

use crate::method::Method;
use thiserror::Error;

/// 拦截引擎的配置期 / 调度错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 适配器注册表中没有任何适配器支持该通知
    #[error("unsupported advice '{advice}': no registered adapter supports this advice type")]
    UnsupportedAdvice { advice: String },

    /// 无法为目标创建代理（final 类 / final 方法 / 没有接口且不支持类代理）
    #[error("cannot create proxy for '{target}': {reason}")]
    ProxyCreation { target: String, reason: String },

    /// 底层调用机制失败，保留原始原因
    #[error("invocation of '{method}' failed")]
    Invocation {
        method: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// 切点表达式非法（在第一次匹配时惰性抛出）
    #[error("malformed pointcut expression '{expression}': {reason}")]
    ExpressionCompile { expression: String, reason: String },

    /// 非法状态，例如表达式切点未设置表达式
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// 代理配置已冻结
    #[error("proxy configuration is frozen, cannot {0}")]
    ConfigFrozen(String),

    /// 配置加载失败
    #[error("configuration error: {0}")]
    Config(String),
}

impl AopError {
    pub fn proxy_creation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProxyCreation {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn invocation<E>(method: &Method, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Invocation {
            method: method.signature(),
            source: Box::new(source),
        }
    }

    pub fn expression_compile(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExpressionCompile {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// 目标上不存在该方法
    pub fn no_such_method(target: &str, method: &Method) -> Self {
        Self::invocation(
            method,
            DispatchError::NoSuchMethod {
                target: target.to_string(),
                method: method.signature(),
            },
        )
    }
}

/// 统一的配置期结果类型
pub type AopResult<T> = Result<T, AopError>;

/// 动态分派失败的具体原因
///
/// 作为 [`AopError::Invocation`] 的 source 出现
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("'{target}' has no method '{method}'")]
    NoSuchMethod { target: String, method: String },

    #[error("argument #{index} is missing (got {len} argument(s))")]
    MissingArgument { index: usize, len: usize },

    #[error("argument #{index} has type '{actual}', expected '{expected}'")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("return value has type '{actual}', expected '{expected}'")]
    ReturnType {
        expected: &'static str,
        actual: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invocation_error_keeps_source() {
        let method = Method::new("UserService", "find_user", 1);
        let err = AopError::invocation(
            &method,
            DispatchError::MissingArgument { index: 0, len: 0 },
        );

        assert_eq!(err.to_string(), "invocation of 'UserService::find_user' failed");
        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "argument #0 is missing (got 0 argument(s))");
    }

    #[test]
    fn test_no_such_method() {
        let method = Method::new("UserService", "delete_user", 1);
        let err = AopError::no_such_method("UserServiceImpl", &method);

        match err {
            AopError::Invocation { method, source } => {
                assert_eq!(method, "UserService::delete_user");
                assert!(source.to_string().contains("UserServiceImpl"));
            }
            other => panic!("Expected Invocation error, got {other:?}"),
        }
    }
}
