//! 拦截链
//!
//! 拦截链在织入时一次性构建，之后只读。构建从最内层的原始调用开始，
//! 由优先级最低的通知到最高的通知依次向外包装，最外层就是代理分派的入口。
//!
//! ```text
//! privilege 1 ─► privilege 5 ─► LOWEST ─► 原始方法
//! ```

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use weft_core::utils::values::{downcast_value, unit};
use weft_core::{Allocator, ContainerError, Initializer, MethodBody, Provider, Value, Wiring};

use crate::advisor::{AdvisorSet, AutowireAdvisor, ExecutionAdvisor};
use crate::joinpoint::{AutowireJoinPoint, FieldJoint, JoinPoint, MethodJoint, ProceedingJoinPoint};

/// 一次方法调用的参数
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// 调用方类型
    pub caller: Option<&'a str>,

    /// 目标实例，`new` 没有目标
    pub target: Option<&'a Value>,

    pub args: &'a [Value],
}

/// 方法拦截链中的一环
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, joint: &MethodJoint, invocation: &Invocation<'_>) -> anyhow::Result<Value>;
}

/// 字段注入链中的一环
pub trait AutowireInterceptor: Send + Sync {
    fn resolve(&self, joint: &FieldJoint) -> anyhow::Result<Value>;
}

/// 连接点背后的原始实现
#[derive(Clone)]
pub enum Original {
    /// 普通方法，需要目标实例
    Method(MethodBody),
    /// 分配：唯一参数为 [`Wiring`]，返回新实例
    New(Allocator),
    /// 初始化：作用于目标实例
    Init(Initializer),
}

impl fmt::Debug for Original {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Original::Method(_) => write!(f, "Original::Method"),
            Original::New(_) => write!(f, "Original::New"),
            Original::Init(_) => write!(f, "Original::Init"),
        }
    }
}

struct InvokeOriginal {
    original: Original,
}

impl InvokeOriginal {
    fn target<'a>(joint: &MethodJoint, invocation: &Invocation<'a>) -> anyhow::Result<&'a Value> {
        invocation
            .target
            .ok_or_else(|| anyhow!("{} was invoked without a target", joint.signature()))
    }
}

impl MethodInterceptor for InvokeOriginal {
    fn invoke(&self, joint: &MethodJoint, invocation: &Invocation<'_>) -> anyhow::Result<Value> {
        match &self.original {
            Original::Method(body) => body(Self::target(joint, invocation)?, invocation.args),
            Original::New(allocator) => {
                let wiring = invocation
                    .args
                    .first()
                    .ok_or_else(|| anyhow!("{} was invoked without wiring", joint.signature()))?;
                let wiring = downcast_value::<Wiring>(wiring)?;
                allocator(&wiring)
            }
            Original::Init(init) => {
                init(Self::target(joint, invocation)?)?;
                Ok(unit())
            }
        }
    }
}

/// 无条件执行通知
struct AdvisedStep {
    advisor: ExecutionAdvisor,
    next: Arc<dyn MethodInterceptor>,
}

impl MethodInterceptor for AdvisedStep {
    fn invoke(&self, joint: &MethodJoint, invocation: &Invocation<'_>) -> anyhow::Result<Value> {
        let pjp = ProceedingJoinPoint::new(joint, invocation, self.next.as_ref());
        self.advisor.advise(&JoinPoint::Execution(&pjp))
    }
}

/// 按调用方决定是否执行通知
struct GuardedStep {
    advisor: ExecutionAdvisor,
    next: Arc<dyn MethodInterceptor>,
}

impl MethodInterceptor for GuardedStep {
    fn invoke(&self, joint: &MethodJoint, invocation: &Invocation<'_>) -> anyhow::Result<Value> {
        if !self.advisor.matches(invocation.caller, joint) {
            return self.next.invoke(joint, invocation);
        }
        let pjp = ProceedingJoinPoint::new(joint, invocation, self.next.as_ref());
        self.advisor.advise(&JoinPoint::Execution(&pjp))
    }
}

/// 方法连接点的拦截链
pub struct MethodChain {
    joint: MethodJoint,
    head: Arc<dyn MethodInterceptor>,
    len: usize,
}

impl MethodChain {
    /// `advisors` 按优先级升序排列，第一个通知器成为最外层
    pub fn build(joint: MethodJoint, original: Original, advisors: &AdvisorSet<ExecutionAdvisor>) -> Self {
        let mut head: Arc<dyn MethodInterceptor> = Arc::new(InvokeOriginal { original });
        for advisor in advisors.iter().rev() {
            let advisor = advisor.clone();
            head = if advisor.is_within_guard() {
                Arc::new(GuardedStep { advisor, next: head })
            } else {
                Arc::new(AdvisedStep { advisor, next: head })
            };
        }

        Self {
            joint,
            head,
            len: advisors.len(),
        }
    }

    pub fn joint(&self) -> &MethodJoint {
        &self.joint
    }

    /// 通知器个数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn invoke(&self, caller: Option<&str>, target: Option<&Value>, args: &[Value]) -> anyhow::Result<Value> {
        let invocation = Invocation { caller, target, args };
        self.head.invoke(&self.joint, &invocation)
    }
}

impl fmt::Debug for MethodChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodChain")
            .field("joint", &self.joint.signature())
            .field("advisors", &self.len)
            .finish()
    }
}

/// 通过提供者解析原始依赖
struct ResolveDependency {
    provider: Arc<dyn Provider>,
}

impl AutowireInterceptor for ResolveDependency {
    fn resolve(&self, _joint: &FieldJoint) -> anyhow::Result<Value> {
        self.provider.get()
    }
}

/// 没有提供者的依赖：只有通知调用 `proceed()` 时才报错，通知可以直接给出替代值
struct MissingDependency;

impl AutowireInterceptor for MissingDependency {
    fn resolve(&self, joint: &FieldJoint) -> anyhow::Result<Value> {
        Err(ContainerError::ComponentNotFound(joint.field_type().to_string()).into())
    }
}

struct AutowireStep {
    advisor: AutowireAdvisor,
    next: Arc<dyn AutowireInterceptor>,
}

impl AutowireInterceptor for AutowireStep {
    fn resolve(&self, joint: &FieldJoint) -> anyhow::Result<Value> {
        let jp = AutowireJoinPoint::new(joint, self.next.as_ref());
        self.advisor.advise(&JoinPoint::Autowire(&jp))
    }
}

/// 字段连接点的注入链
pub struct AutowireChain {
    joint: FieldJoint,
    head: Arc<dyn AutowireInterceptor>,
    len: usize,
}

impl AutowireChain {
    /// `provider` 为 None 时依赖在容器中不存在
    pub fn build(
        joint: FieldJoint,
        provider: Option<Arc<dyn Provider>>,
        advisors: &AdvisorSet<AutowireAdvisor>,
    ) -> Self {
        let mut head: Arc<dyn AutowireInterceptor> = match provider {
            Some(provider) => Arc::new(ResolveDependency { provider }),
            None => Arc::new(MissingDependency),
        };
        for advisor in advisors.iter().rev() {
            head = Arc::new(AutowireStep {
                advisor: advisor.clone(),
                next: head,
            });
        }

        Self {
            joint,
            head,
            len: advisors.len(),
        }
    }

    pub fn joint(&self) -> &FieldJoint {
        &self.joint
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 解析要写入字段的值
    pub fn resolve(&self) -> anyhow::Result<Value> {
        self.head.resolve(&self.joint)
    }
}

impl fmt::Debug for AutowireChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutowireChain")
            .field("joint", &self.joint.signature())
            .field("advisors", &self.len)
            .finish()
    }
}
