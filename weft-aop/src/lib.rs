//! Weft AOP - 切点匹配与通知织入
//!
//! 在 `weft-core` 容器之上提供：
//! - 切点表达式（`execution`、`autowire`、`within`、`@target` 等）及其代数组合
//! - 通知分类与形状检查
//! - 连接点匹配与按优先级排序的拦截链
//! - 方法调用、构造、初始化与依赖注入的代理分派

// 宏展开使用 `::weft_aop` 路径，本 crate 的测试也需要
extern crate self as weft_aop;

pub mod advice;
pub mod advisor;
pub mod aspect;
pub mod chain;
pub mod classifier;
pub mod config;
pub mod container;
pub mod error;
pub mod hook;
pub mod joinpoint;
pub mod layer;
pub mod pointcut;
pub mod proxy;

#[cfg(test)]
mod testing;

// 重新导出核心类型
pub use advice::{privilege_of, AdviceDescriptor, AdviceFn, LOWEST_PRIORITY};
pub use advisor::{Advisor, AdvisorSet, AutowireAdvisor, ExecutionAdvisor};
pub use aspect::{get_all_aspect_registrations, AspectCatalog, AspectDefinition, AspectRegistration};
pub use chain::{AutowireChain, AutowireInterceptor, Invocation, MethodChain, MethodInterceptor, Original};
pub use classifier::AdviceClassifier;
pub use config::AopConfig;
pub use container::{WovenContainer, WovenContainerBuilder};
pub use error::{AopError, AopResult, PointcutSyntaxError};
pub use hook::{format_template, AutowiringHook};
pub use joinpoint::{AutowireJoinPoint, FieldJoint, JoinPoint, Joint, MethodJoint, ProceedingJoinPoint};
pub use layer::{is_interceptable, AdvisementLayer, WeaveSummary};
pub use pointcut::{parse, Pointcut, PointcutCache};
pub use proxy::{ComponentProxy, ProxyFactory, ProxyTable, WeavingInstantiator};

// 过程宏
pub use weft_aop_macros::{around, aspect, privilege};

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::aspect::{AspectDefinition, AspectRegistration};
    pub use crate::config::AopConfig;
    pub use crate::container::{WovenContainer, WovenContainerBuilder};
    pub use crate::error::{AopError, AopResult};
    pub use crate::joinpoint::{AutowireJoinPoint, JoinPoint, ProceedingJoinPoint};
    pub use crate::submit_aspect;
    pub use weft_aop_macros::{around, aspect, privilege};
}

/// 把手写的切面定义提交到 inventory，由 [`WovenContainerBuilder::auto_register`] 加载
///
/// 用 `#[aspect]` 声明的切面会自动提交，不需要这个宏。
///
/// ```ignore
/// use weft_aop::submit_aspect;
///
/// fn audit() -> AspectDefinition {
///     AspectDefinition::new(TypeDescriptor::new("com.acme.Audit"), |_| Ok(Audit))
///         .around(MethodDescriptor::advice("record").around("execution(* save(..))"), |_: &Audit, jp| jp.proceed())
/// }
///
/// submit_aspect!("com.acme.Audit", audit);
/// ```
#[macro_export]
macro_rules! submit_aspect {
    ($name:expr, $create:path) => {
        $crate::inventory::submit! {
            $crate::AspectRegistration::new($name, $create)
        }
    };
}
