//! 配置加载
//!
//! ```toml
//! [aop]
//! proxy_target_class = false
//! opaque = false
//! frozen = false
//!
//! [aop.auto_proxy]
//! enabled = true
//! name_patterns = ["*Service"]
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```
//!
//! 环境变量 `WEAVER_AOP_PROXY_TARGET_CLASS`、`WEAVER_AOP_OPAQUE`、`WEAVER_AOP_FROZEN`
//! 覆盖文件中的值，`WEAVER_LOG_*` / `RUST_LOG` 覆盖日志配置。

use crate::error::{AopError, AopResult};
use crate::logging::LoggingConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    pub aop: AopProperties,
    pub logging: LoggingConfig,
}

/// `[aop]` 配置段
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AopProperties {
    /// 强制使用子类代理
    pub proxy_target_class: bool,

    /// 代理拒绝 `advised()` 访问
    pub opaque: bool,

    /// 工厂生成第一个代理后冻结，之后拒绝修改通知与目标
    pub frozen: bool,

    pub auto_proxy: AutoProxyProperties,
}

/// `[aop.auto_proxy]` 配置段
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoProxyProperties {
    pub enabled: bool,

    /// 需要自动代理的名称模式（`*` 通配）
    pub name_patterns: Vec<String>,
}

impl Default for AutoProxyProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            name_patterns: vec!["*Service".to_string()],
        }
    }
}

impl WeaverConfig {
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        toml::from_str(content).map_err(|e| AopError::Config(format!("invalid TOML: {e}")))
    }

    /// 从文件加载，文件不存在时使用默认配置
    pub fn from_file(path: impl AsRef<Path>) -> AopResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AopError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// 加载文件并应用环境变量覆盖
    pub fn load(path: impl AsRef<Path>) -> AopResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> AopResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数应用覆盖
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AopResult<()> {
        let aop = &mut self.aop;
        for (key, field) in [
            ("WEAVER_AOP_PROXY_TARGET_CLASS", &mut aop.proxy_target_class),
            ("WEAVER_AOP_OPAQUE", &mut aop.opaque),
            ("WEAVER_AOP_FROZEN", &mut aop.frozen),
        ] {
            if let Some(value) = lookup(key) {
                *field = parse_bool(&value)
                    .ok_or_else(|| AopError::Config(format!("{key}: invalid boolean '{value}'")))?;
            }
        }
        self.logging.apply_env(&lookup);
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WeaverConfig::from_toml_str("").unwrap();
        assert_eq!(config, WeaverConfig::default());
        assert!(config.aop.auto_proxy.enabled);
        assert_eq!(config.aop.auto_proxy.name_patterns, vec!["*Service"]);
    }

    #[test]
    fn test_parse_toml() {
        let config = WeaverConfig::from_toml_str(
            r#"
            [aop]
            proxy_target_class = true
            opaque = true

            [aop.auto_proxy]
            name_patterns = ["order*", "*Repository"]

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.aop.proxy_target_class);
        assert!(config.aop.opaque);
        assert!(!config.aop.frozen);
        assert_eq!(config.aop.auto_proxy.name_patterns, vec!["order*", "*Repository"]);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_toml() {
        let err = WeaverConfig::from_toml_str("[aop]\nopaque = \"sometimes\"").unwrap_err();
        assert!(matches!(err, AopError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WEAVER_AOP_PROXY_TARGET_CLASS", "yes"),
            ("WEAVER_AOP_FROZEN", "1"),
            ("WEAVER_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let mut config = WeaverConfig::default();
        config.apply_overrides(lookup).unwrap();

        assert!(config.aop.proxy_target_class);
        assert!(config.aop.frozen);
        assert!(!config.aop.opaque);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_env_boolean() {
        let mut config = WeaverConfig::default();
        let err = config
            .apply_overrides(|key| (key == "WEAVER_AOP_OPAQUE").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WEAVER_AOP_OPAQUE"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = WeaverConfig::from_file("/nonexistent/weaver.toml").unwrap();
        assert_eq!(config, WeaverConfig::default());
    }
}
