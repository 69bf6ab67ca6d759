//! 通知（Advice）描述
//!
//! 一个通知由切面类型上的一个 `@Around` 方法产生：切点决定它拦截哪些连接点，
//! 提供者在调用时取得切面实例，优先级决定它在拦截链中的位置。

use std::fmt;
use std::sync::Arc;

use weft_core::{constants, Provider, TypeDescriptor, Value};

use crate::error::{AopError, AopResult};
use crate::joinpoint::JoinPoint;
use crate::pointcut::Pointcut;

/// 未声明 `@Privilege` 时的优先级
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// 通知的实现：`(切面实例, 连接点) -> 结果`
pub type AdviceFn = Arc<dyn Fn(&Value, &JoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync>;

pub struct AdviceDescriptor {
    aspect: String,
    method: String,
    pointcut: Arc<Pointcut>,
    provider: Arc<dyn Provider>,
    body: AdviceFn,
    privilege: i32,
}

impl AdviceDescriptor {
    pub fn new(
        aspect: impl Into<String>,
        method: impl Into<String>,
        pointcut: Arc<Pointcut>,
        provider: Arc<dyn Provider>,
        body: AdviceFn,
        privilege: i32,
    ) -> Self {
        Self {
            aspect: aspect.into(),
            method: method.into(),
            pointcut,
            provider,
            body,
            privilege,
        }
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// `Aspect.method`
    pub fn name(&self) -> String {
        format!("{}.{}", self.aspect, self.method)
    }

    pub fn pointcut(&self) -> &Arc<Pointcut> {
        &self.pointcut
    }

    /// 数字越小优先级越高，在拦截链中越靠外
    pub fn privilege(&self) -> i32 {
        self.privilege
    }

    /// 取得切面实例并执行通知
    pub fn advise(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<Value> {
        let aspect = self.provider.get()?;
        (self.body)(&aspect, join_point)
    }
}

impl fmt::Debug for AdviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceDescriptor")
            .field("advice", &self.name())
            .field("pointcut", &self.pointcut.to_string())
            .field("privilege", &self.privilege)
            .finish()
    }
}

/// 通知的优先级：方法上的 `@Privilege` 优先，其次是切面类型上的，都没有时为最低
pub fn privilege_of(aspect: &TypeDescriptor, method: &str) -> AopResult<i32> {
    let annotation = aspect
        .find_method(method)
        .and_then(|m| m.annotations_of(constants::PRIVILEGE_ANNOTATION).next())
        .or_else(|| aspect.annotations_of(constants::PRIVILEGE_ANNOTATION).next());

    let Some(annotation) = annotation else {
        return Ok(LOWEST_PRIORITY);
    };

    let text = annotation.value().unwrap_or_default();
    text.trim().parse().map_err(|_| AopError::IllegalAdvice {
        advice: format!("{}.{}", aspect.name, method),
        reason: format!("privilege '{}' is not an integer", text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{Annotation, MethodDescriptor};

    fn aspect() -> TypeDescriptor {
        TypeDescriptor::new("com.acme.Audit")
            .annotate(Annotation::new(constants::PRIVILEGE_ANNOTATION).with_value("7"))
            .method(MethodDescriptor::advice("first").privilege(1))
            .method(MethodDescriptor::advice("second"))
            .method(
                MethodDescriptor::advice("broken")
                    .annotate(Annotation::new(constants::PRIVILEGE_ANNOTATION).with_value("high")),
            )
    }

    #[test]
    fn test_privilege_lookup() {
        let aspect = aspect();
        assert_eq!(privilege_of(&aspect, "first").unwrap(), 1);
        assert_eq!(privilege_of(&aspect, "second").unwrap(), 7);
        assert!(matches!(
            privilege_of(&aspect, "broken"),
            Err(AopError::IllegalAdvice { .. })
        ));
        assert_eq!(
            privilege_of(&TypeDescriptor::new("com.acme.Plain"), "any").unwrap(),
            LOWEST_PRIORITY
        );
    }
}
