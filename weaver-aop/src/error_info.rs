//! 错误信息结构
//!
//! 提供结构化的错误信息给异常通知使用

use crate::error::{AopError, DispatchError};

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从沿拦截器链传播的错误创建 ErrorInfo
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let error_type = if let Some(aop) = error.downcast_ref::<AopError>() {
            format!("AopError::{}", aop_kind(aop))
        } else if error.downcast_ref::<DispatchError>().is_some() {
            "DispatchError".to_string()
        } else {
            "anyhow::Error".to_string()
        };

        Self {
            message: error.to_string(),
            error_type,
            source_chain: error.chain().skip(1).map(|e| e.to_string()).collect(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

fn aop_kind(error: &AopError) -> &'static str {
    match error {
        AopError::UnsupportedAdvice { .. } => "UnsupportedAdvice",
        AopError::ProxyCreation { .. } => "ProxyCreation",
        AopError::Invocation { .. } => "Invocation",
        AopError::ExpressionCompile { .. } => "ExpressionCompile",
        AopError::IllegalState(_) => "IllegalState",
        AopError::ConfigFrozen(_) => "ConfigFrozen",
        AopError::Config(_) => "Config",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn test_from_anyhow_keeps_cause_chain() {
        let method = Method::new("OrderService", "create_order", 1);
        let err: anyhow::Error = AopError::invocation(
            &method,
            DispatchError::MissingArgument { index: 0, len: 0 },
        )
        .into();

        let info = ErrorInfo::from_anyhow(&err);
        assert_eq!(info.error_type, "AopError::Invocation");
        assert_eq!(info.message, "invocation of 'OrderService::create_order' failed");
        assert_eq!(info.source_chain, vec!["argument #0 is missing (got 0 argument(s))"]);
        assert!(info.full_description().contains("Caused by:"));
    }

    #[test]
    fn test_context_becomes_part_of_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to save order");
        let info = ErrorInfo::from_anyhow(&err);

        assert_eq!(info.error_type, "anyhow::Error");
        assert_eq!(info.message, "failed to save order");
        assert_eq!(info.source_chain, vec!["connection refused"]);
    }

    #[test]
    fn test_dispatch_error_without_cause() {
        let err: anyhow::Error = DispatchError::MissingArgument { index: 1, len: 1 }.into();
        let info = ErrorInfo::from_anyhow(&err);

        assert_eq!(info.error_type, "DispatchError");
        assert!(info.source_chain.is_empty());
        assert_eq!(info.full_description(), info.message);
    }
}
