//! 注入钩子
//!
//! `autowiring_by` 用格式化模板生成切点表达式，对每个匹配的连接点返回一个钩子。
//! 钩子可以调用任意多次：方法钩子通过组件句柄调用方法（经过代理），
//! 字段钩子解析字段的依赖（经过注入链）。

use std::fmt::{self, Display};
use std::sync::{Arc, Weak};

use weft_core::{ContainerError, Container, Value};

use crate::chain::AutowireChain;
use crate::error::{AopError, AopResult};
use crate::joinpoint::{FieldJoint, MethodJoint};

/// 格式化切点模板
///
/// 支持 `%s` 与 `%d` 占位符，`%%` 表示 `%` 本身；参数个数必须与占位符个数一致
pub fn format_template(template: &str, args: &[&dyn Display]) -> AopResult<String> {
    let error = |reason: String| AopError::Template {
        template: template.to_string(),
        reason,
    };

    let mut result = String::with_capacity(template.len());
    let mut remaining = args.iter();
    let mut used = 0;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => result.push('%'),
            Some('s') | Some('d') => {
                let arg = remaining
                    .next()
                    .ok_or_else(|| error(format!("missing argument #{}", used + 1)))?;
                result.push_str(&arg.to_string());
                used += 1;
            }
            Some(other) => return Err(error(format!("unknown placeholder '%{}'", other))),
            None => return Err(error("dangling '%' at the end".to_string())),
        }
    }

    if used != args.len() {
        return Err(error(format!(
            "{} placeholder(s) but {} argument(s)",
            used,
            args.len()
        )));
    }
    Ok(result)
}

enum Target {
    Method {
        component: String,
        method: String,
    },
    Field {
        field_type: String,
        chain: Option<Arc<AutowireChain>>,
    },
}

/// 连接点钩子
pub struct AutowiringHook {
    container: Weak<Container>,
    target: Target,
}

impl AutowiringHook {
    pub(crate) fn for_method(container: Weak<Container>, joint: &MethodJoint) -> Self {
        Self {
            container,
            target: Target::Method {
                component: joint.declaring_type().to_string(),
                method: joint.name().to_string(),
            },
        }
    }

    pub(crate) fn for_field(container: Weak<Container>, joint: &FieldJoint, chain: Option<Arc<AutowireChain>>) -> Self {
        Self {
            container,
            target: Target::Field {
                field_type: joint.field_type().to_string(),
                chain,
            },
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.target, Target::Method { .. })
    }

    /// 调用钩子：方法钩子使用 `args` 调用方法，字段钩子忽略 `args` 并返回解析到的依赖
    pub fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        match &self.target {
            Target::Method { component, method } => {
                let container = self.container.upgrade().ok_or(ContainerError::ContainerDropped)?;
                container.get(component)?.invoke(None, method, args)
            }
            Target::Field { chain: Some(chain), .. } => chain.resolve(),
            Target::Field { field_type, chain: None } => {
                let container = self.container.upgrade().ok_or(ContainerError::ContainerDropped)?;
                Ok(container.get(field_type)? as Value)
            }
        }
    }
}

impl fmt::Debug for AutowiringHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Method { component, method } => write!(f, "AutowiringHook({}.{})", component, method),
            Target::Field { field_type, chain } => write!(
                f,
                "AutowiringHook({}, woven: {})",
                field_type,
                chain.is_some()
            ),
        }
    }
}
