//! 织入配置
//!
//! ```toml
//! [weft.aop]
//! enabled = true
//! fail-on-dummy-advice = false
//! trace-dispatch = false
//! ```

use serde::Deserialize;
use weft_core::{ContainerError, Environment};

use crate::error::AopResult;

pub const ENABLED_KEY: &str = "weft.aop.enabled";
pub const FAIL_ON_DUMMY_ADVICE_KEY: &str = "weft.aop.fail-on-dummy-advice";
pub const TRACE_DISPATCH_KEY: &str = "weft.aop.trace-dispatch";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AopConfig {
    /// 关闭后容器不生成任何代理（默认：true）
    pub enabled: bool,

    /// 没有匹配任何连接点的通知视为错误（默认：false，只输出警告）
    pub fail_on_dummy_advice: bool,

    /// 每次经过拦截链的调用输出 debug 日志（默认：false）
    pub trace_dispatch: bool,
}

impl Default for AopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_on_dummy_advice: false,
            trace_dispatch: false,
        }
    }
}

impl AopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn fail_on_dummy_advice(mut self, fail: bool) -> Self {
        self.fail_on_dummy_advice = fail;
        self
    }

    pub fn trace_dispatch(mut self, trace: bool) -> Self {
        self.trace_dispatch = trace;
        self
    }

    /// 从环境读取，开关值支持 `on` / `off` 等写法
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            enabled: env.get_switch_or(ENABLED_KEY, defaults.enabled),
            fail_on_dummy_advice: env.get_switch_or(FAIL_ON_DUMMY_ADVICE_KEY, defaults.fail_on_dummy_advice),
            trace_dispatch: env.get_switch_or(TRACE_DISPATCH_KEY, defaults.trace_dispatch),
        }
    }

    /// 从 `[weft.aop]` 表读取配置
    pub fn from_toml(content: &str) -> AopResult<Self> {
        #[derive(Deserialize, Default)]
        struct Weft {
            #[serde(default)]
            aop: AopConfig,
        }

        #[derive(Deserialize, Default)]
        struct Root {
            #[serde(default)]
            weft: Weft,
        }

        toml::from_str::<Root>(content)
            .map(|root| root.weft.aop)
            .map_err(|e| ContainerError::Config(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{ConfigValue, MapPropertySource};

    #[test]
    fn test_defaults() {
        let config = AopConfig::default();
        assert!(config.enabled);
        assert!(!config.fail_on_dummy_advice);
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn test_from_toml() {
        let config = AopConfig::from_toml(
            r#"
            [weft.aop]
            fail-on-dummy-advice = true
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert!(config.fail_on_dummy_advice);

        assert_eq!(AopConfig::from_toml("").unwrap(), AopConfig::default());
        assert!(AopConfig::from_toml("[weft.aop]\nenabled = \"maybe\"").is_err());
    }

    #[test]
    fn test_from_environment_switches() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(ENABLED_KEY, ConfigValue::String("OFF".into()))
                .with_property(TRACE_DISPATCH_KEY, ConfigValue::String("enabled".into())),
        ));

        let config = AopConfig::from_environment(&env);
        assert!(!config.enabled);
        assert!(config.trace_dispatch);
        assert!(!config.fail_on_dummy_advice);
    }
}
