//! 通知器（Advisor）
//!
//! 把通知包装成可以针对某一种连接点匹配的对象，并按优先级保存在每个连接点的集合里。

use std::fmt;
use std::sync::Arc;

use weft_core::{TypeSet, Value};

use crate::advice::AdviceDescriptor;
use crate::joinpoint::{FieldJoint, JoinPoint, MethodJoint};

/// 可以排序的通知器
pub trait Advisor {
    fn privilege_level(&self) -> i32;
}

/// 方法执行通知器
#[derive(Clone)]
pub struct ExecutionAdvisor {
    advice: Arc<AdviceDescriptor>,
    types: Arc<TypeSet>,
}

impl ExecutionAdvisor {
    pub fn new(advice: Arc<AdviceDescriptor>, types: Arc<TypeSet>) -> Self {
        Self { advice, types }
    }

    pub fn advice(&self) -> &Arc<AdviceDescriptor> {
        &self.advice
    }

    /// 调用时匹配，`caller` 为调用方类型
    pub fn matches(&self, caller: Option<&str>, joint: &MethodJoint) -> bool {
        self.advice.pointcut().matches_method(&self.types, caller, joint)
    }

    /// 织入时匹配
    pub fn may_match(&self, joint: &MethodJoint) -> bool {
        self.advice.pointcut().may_match_method(&self.types, joint)
    }

    /// 是否需要在每次调用时根据调用方重新判断
    pub fn is_within_guard(&self) -> bool {
        self.advice.pointcut().is_within_guard()
    }

    pub fn advise(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<Value> {
        self.advice.advise(join_point)
    }
}

impl Advisor for ExecutionAdvisor {
    fn privilege_level(&self) -> i32 {
        self.advice.privilege()
    }
}

impl fmt::Debug for ExecutionAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionAdvisor({}, {})", self.advice.name(), self.advice.privilege())
    }
}

/// 字段注入通知器
#[derive(Clone)]
pub struct AutowireAdvisor {
    advice: Arc<AdviceDescriptor>,
    types: Arc<TypeSet>,
}

impl AutowireAdvisor {
    pub fn new(advice: Arc<AdviceDescriptor>, types: Arc<TypeSet>) -> Self {
        Self { advice, types }
    }

    pub fn advice(&self) -> &Arc<AdviceDescriptor> {
        &self.advice
    }

    pub fn matches(&self, joint: &FieldJoint) -> bool {
        self.advice.pointcut().matches_field(&self.types, joint)
    }

    pub fn advise(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<Value> {
        self.advice.advise(join_point)
    }
}

impl Advisor for AutowireAdvisor {
    fn privilege_level(&self) -> i32 {
        self.advice.privilege()
    }
}

impl fmt::Debug for AutowireAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AutowireAdvisor({}, {})", self.advice.name(), self.advice.privilege())
    }
}

/// 按优先级升序排列的通知器集合，同优先级保持加入顺序
#[derive(Debug, Clone)]
pub struct AdvisorSet<A> {
    advisors: Vec<A>,
}

impl<A> Default for AdvisorSet<A> {
    fn default() -> Self {
        Self {
            advisors: Vec::new(),
        }
    }
}

impl<A: Advisor> AdvisorSet<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, advisor: A) {
        let level = advisor.privilege_level();
        let at = self
            .advisors
            .partition_point(|existing| existing.privilege_level() <= level);
        self.advisors.insert(at, advisor);
    }

    /// 从最外层（优先级最高）到最内层
    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        self.advisors.iter()
    }

    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }
}

impl<'a, A: Advisor> IntoIterator for &'a AdvisorSet<A> {
    type Item = &'a A;
    type IntoIter = std::slice::Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
