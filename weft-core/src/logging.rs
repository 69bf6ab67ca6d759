//! 日志初始化
//!
//! 织入摘要在 info 级别输出，每个匹配的连接点在 debug 级别输出，
//! 拦截链的分派在 trace 级别输出。`weaving` 单独控制 `weft_aop` 的级别，
//! 便于只打开匹配细节。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{ContainerError, ContainerResult};

/// 指定额外过滤指令的环境变量，语法同 `RUST_LOG`
pub const LOG_ENV: &str = "WEFT_LOG";

/// 指定输出格式的环境变量
pub const LOG_FORMAT_ENV: &str = "WEFT_LOG_FORMAT";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: [(LogLevel, &'static str); 5] = [
        (LogLevel::Trace, "trace"),
        (LogLevel::Debug, "debug"),
        (LogLevel::Info, "info"),
        (LogLevel::Warn, "warn"),
        (LogLevel::Error, "error"),
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map_or("info", |(_, name)| *name)
    }
}

impl FromStr for LogLevel {
    type Err = ContainerError;

    fn from_str(s: &str) -> ContainerResult<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let lower = if lower == "warning" { "warn" } else { lower.as_str() };
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == lower)
            .map(|(level, _)| *level)
            .ok_or_else(|| ContainerError::Config(format!("unknown log level '{}'", s)))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 单行输出
    #[default]
    Compact,
    /// 带线程名的完整输出
    Full,
    /// 每个事件一个 JSON 对象
    Json,
}

impl FromStr for LogFormat {
    type Err = ContainerError;

    fn from_str(s: &str) -> ContainerResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            _ => Err(ContainerError::Config(format!("unknown log format '{}'", s))),
        }
    }
}

/// 日志配置，对应配置文件中的 `[logging]` 表
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// 全局级别
    pub level: LogLevel,

    /// 织入层（`weft_aop`）的级别，未设置时跟随全局级别
    pub weaving: Option<LogLevel>,

    pub format: LogFormat,

    /// 是否输出模块路径
    pub show_target: bool,

    /// 追加在最后的过滤指令，例如 `"weft_core::container=trace"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            weaving: None,
            format: LogFormat::Compact,
            show_target: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn weaving(mut self, level: LogLevel) -> Self {
        self.weaving = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 用 [`LOG_ENV`] 与 [`LOG_FORMAT_ENV`] 覆盖当前配置；格式无法识别时保持原值
    pub fn with_env(mut self) -> Self {
        if let Ok(filter) = std::env::var(LOG_ENV) {
            if !filter.trim().is_empty() {
                self.filter = Some(filter);
            }
        }
        if let Some(format) = std::env::var(LOG_FORMAT_ENV).ok().and_then(|f| f.parse().ok()) {
            self.format = format;
        }
        self
    }

    /// 默认配置叠加环境变量
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// 从配置文件的 `[logging]` 表读取；没有该表时返回默认值
    pub fn from_toml(content: &str) -> ContainerResult<Self> {
        #[derive(Deserialize, Default)]
        struct Root {
            #[serde(default)]
            logging: LoggingConfig,
        }

        toml::from_str::<Root>(content)
            .map(|root| root.logging)
            .map_err(|e| ContainerError::Config(format!("invalid [logging] table: {}", e)))
    }

    /// 生成 `EnvFilter` 指令：全局级别、织入层级别、自定义过滤，后者覆盖前者
    pub fn directives(&self) -> String {
        let mut directives = vec![self.level.to_string()];
        if let Some(weaving) = self.weaving {
            directives.push(format!("weft_aop={}", weaving));
        }
        if let Some(filter) = self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            directives.push(filter.to_string());
        }
        directives.join(",")
    }

    /// 安装全局订阅者；重复安装或过滤指令非法时返回错误
    pub fn init(&self) -> ContainerResult<()> {
        let directives = self.directives();
        let filter = EnvFilter::try_new(&directives)
            .map_err(|e| ContainerError::Config(format!("invalid log filter '{}': {}", directives, e)))?;

        let output = match self.format {
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .compact()
                .with_target(self.show_target)
                .boxed(),
            LogFormat::Full => tracing_subscriber::fmt::layer()
                .with_target(self.show_target)
                .with_thread_names(true)
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(self.show_target)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(output.with_filter(filter))
            .try_init()
            .map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))?;

        tracing::debug!("Logging initialized with '{}'", directives);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_names() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert!(matches!("loud".parse::<LogLevel>(), Err(ContainerError::Config(_))));
        assert!("pretty".parse::<LogFormat>().is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_directives_layering() {
        assert_eq!(LoggingConfig::new().directives(), "info");

        let config = LoggingConfig::new()
            .level(LogLevel::Warn)
            .weaving(LogLevel::Debug)
            .filter("weft_core::container=trace");
        assert_eq!(config.directives(), "warn,weft_aop=debug,weft_core::container=trace");

        assert_eq!(LoggingConfig::new().filter("  ").directives(), "info");
    }

    #[test]
    fn test_logging_config_from_toml() {
        let config = LoggingConfig::from_toml(
            r#"
            [logging]
            level = "error"
            weaving = "trace"
            format = "full"
            show-target = true
            "#,
        )
        .unwrap();

        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.weaving, Some(LogLevel::Trace));
        assert_eq!(config.format, LogFormat::Full);
        assert!(config.show_target);
        assert_eq!(config.directives(), "error,weft_aop=trace");

        assert_eq!(LoggingConfig::from_toml("").unwrap().level, LogLevel::Info);
        assert!(matches!(
            LoggingConfig::from_toml("[logging]\nlevel = \"loud\""),
            Err(ContainerError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        let err = LoggingConfig::new().filter("weft_aop=loudest").init().unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));
    }
}
