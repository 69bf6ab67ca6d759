//! 连接点（JoinPoint）定义
//!
//! - [`MethodJoint`] / [`FieldJoint`]：织入时确定的静态连接点，按声明类型与成员名比较
//! - [`ProceedingJoinPoint`]：方法执行时传给通知的连接点，`proceed()` 调用内层链
//! - [`AutowireJoinPoint`]：字段注入时传给通知的连接点，`proceed()` 解析原始依赖

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use weft_core::utils::values::downcast_value;
use weft_core::{Annotation, FieldDescriptor, MethodDescriptor, MethodKind, Modifiers, TypeDescriptor, Value};

use crate::chain::{AutowireInterceptor, Invocation, MethodInterceptor};

/// 方法连接点
#[derive(Clone)]
pub struct MethodJoint {
    declaring: Arc<TypeDescriptor>,
    index: usize,
}

impl MethodJoint {
    /// `index` 为方法在声明类型中的位置
    ///
    /// # Panics
    /// `index` 越界时在访问方法时 panic
    pub fn new(declaring: Arc<TypeDescriptor>, index: usize) -> Self {
        debug_assert!(index < declaring.methods.len());
        Self { declaring, index }
    }

    /// 按方法名查找
    pub fn find(declaring: &Arc<TypeDescriptor>, name: &str) -> Option<Self> {
        declaring
            .method_index(name)
            .map(|index| Self::new(Arc::clone(declaring), index))
    }

    pub fn declaring(&self) -> &TypeDescriptor {
        &self.declaring
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring.name
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.declaring.methods[self.index]
    }

    pub fn name(&self) -> &str {
        &self.method().name
    }

    pub fn kind(&self) -> MethodKind {
        self.method().kind
    }

    pub fn modifiers(&self) -> Modifiers {
        self.method().modifiers
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.method().annotations
    }

    /// `Type.method`
    pub fn signature(&self) -> String {
        format!("{}.{}", self.declaring.name, self.name())
    }
}

impl PartialEq for MethodJoint {
    fn eq(&self, other: &Self) -> bool {
        self.declaring.name == other.declaring.name && self.name() == other.name()
    }
}

impl Eq for MethodJoint {}

impl Hash for MethodJoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring.name.hash(state);
        self.name().hash(state);
    }
}

impl PartialOrd for MethodJoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MethodJoint {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.declaring_type(), self.name()).cmp(&(other.declaring_type(), other.name()))
    }
}

impl fmt::Debug for MethodJoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodJoint({})", self.signature())
    }
}

impl fmt::Display for MethodJoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method();
        write!(
            f,
            "{} {}.{}({})",
            method.return_type,
            self.declaring.name,
            method.name,
            method.params.join(", ")
        )
    }
}

/// 字段连接点
#[derive(Clone)]
pub struct FieldJoint {
    declaring: Arc<TypeDescriptor>,
    index: usize,
}

impl FieldJoint {
    pub fn new(declaring: Arc<TypeDescriptor>, index: usize) -> Self {
        debug_assert!(index < declaring.fields.len());
        Self { declaring, index }
    }

    pub fn find(declaring: &Arc<TypeDescriptor>, name: &str) -> Option<Self> {
        declaring
            .field_index(name)
            .map(|index| Self::new(Arc::clone(declaring), index))
    }

    pub fn declaring(&self) -> &TypeDescriptor {
        &self.declaring
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring.name
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.declaring.fields[self.index]
    }

    pub fn name(&self) -> &str {
        &self.field().name
    }

    pub fn field_type(&self) -> &str {
        &self.field().field_type
    }

    pub fn modifiers(&self) -> Modifiers {
        self.field().modifiers
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.field().annotations
    }

    pub fn signature(&self) -> String {
        format!("{}.{}", self.declaring.name, self.name())
    }
}

impl PartialEq for FieldJoint {
    fn eq(&self, other: &Self) -> bool {
        self.declaring.name == other.declaring.name && self.name() == other.name()
    }
}

impl Eq for FieldJoint {}

impl Hash for FieldJoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring.name.hash(state);
        self.name().hash(state);
    }
}

impl PartialOrd for FieldJoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldJoint {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.declaring_type(), self.name()).cmp(&(other.declaring_type(), other.name()))
    }
}

impl fmt::Debug for FieldJoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldJoint({})", self.signature())
    }
}

impl fmt::Display for FieldJoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.field_type(), self.declaring.name, self.name())
    }
}

/// 静态连接点：方法或字段
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Joint {
    Method(MethodJoint),
    Field(FieldJoint),
}

impl Joint {
    pub fn declaring_type(&self) -> &str {
        match self {
            Joint::Method(joint) => joint.declaring_type(),
            Joint::Field(joint) => joint.declaring_type(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Joint::Method(joint) => joint.name(),
            Joint::Field(joint) => joint.name(),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            Joint::Method(joint) => joint.signature(),
            Joint::Field(joint) => joint.signature(),
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Joint::Method(joint) => joint.fmt(f),
            Joint::Field(joint) => joint.fmt(f),
        }
    }
}

/// 方法执行连接点
///
/// `proceed()` 可以调用任意多次（例如重试），每次都会重新执行内层链
pub struct ProceedingJoinPoint<'a> {
    joint: &'a MethodJoint,
    invocation: &'a Invocation<'a>,
    next: &'a dyn MethodInterceptor,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(
        joint: &'a MethodJoint,
        invocation: &'a Invocation<'a>,
        next: &'a dyn MethodInterceptor,
    ) -> Self {
        Self {
            joint,
            invocation,
            next,
        }
    }

    pub fn joint(&self) -> &MethodJoint {
        self.joint
    }

    /// 调用方类型，未知时为 None
    pub fn caller(&self) -> Option<&str> {
        self.invocation.caller
    }

    /// 目标实例，`new` 连接点没有目标
    pub fn target(&self) -> Option<&Value> {
        self.invocation.target
    }

    /// 目标实例的具体类型
    pub fn this<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        let target = self
            .invocation
            .target
            .ok_or_else(|| anyhow::anyhow!("join point {} has no target", self.joint.signature()))?;
        Ok(downcast_value::<T>(target)?)
    }

    pub fn args(&self) -> &[Value] {
        self.invocation.args
    }

    /// 第 `index` 个参数的具体类型
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        let value = self.invocation.args.get(index).ok_or_else(|| {
            anyhow::anyhow!("join point {} has no argument #{}", self.joint.signature(), index)
        })?;
        Ok(downcast_value::<T>(value)?)
    }

    /// 使用原始参数继续执行
    pub fn proceed(&self) -> anyhow::Result<Value> {
        self.next.invoke(self.joint, self.invocation)
    }

    /// 使用替换后的参数继续执行
    pub fn proceed_with(&self, args: &[Value]) -> anyhow::Result<Value> {
        let invocation = Invocation {
            caller: self.invocation.caller,
            target: self.invocation.target,
            args,
        };
        self.next.invoke(self.joint, &invocation)
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("joint", &self.joint.signature())
            .field("caller", &self.invocation.caller)
            .field("args", &self.invocation.args.len())
            .finish()
    }
}

/// 字段注入连接点
///
/// `proceed()` 最多解析一次原始依赖，之后返回缓存的值
pub struct AutowireJoinPoint<'a> {
    joint: &'a FieldJoint,
    next: &'a dyn AutowireInterceptor,
    resolved: OnceCell<Value>,
}

impl<'a> AutowireJoinPoint<'a> {
    pub(crate) fn new(joint: &'a FieldJoint, next: &'a dyn AutowireInterceptor) -> Self {
        Self {
            joint,
            next,
            resolved: OnceCell::new(),
        }
    }

    pub fn joint(&self) -> &FieldJoint {
        self.joint
    }

    pub fn field_type(&self) -> &str {
        self.joint.field_type()
    }

    /// 解析原始依赖
    pub fn proceed(&self) -> anyhow::Result<Value> {
        self.resolved
            .get_or_try_init(|| self.next.resolve(self.joint))
            .map(Arc::clone)
    }

    /// 原始依赖是否已经解析
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl fmt::Debug for AutowireJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutowireJoinPoint")
            .field("joint", &self.joint.signature())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// 传给通知的连接点
#[derive(Debug, Clone, Copy)]
pub enum JoinPoint<'a> {
    Execution(&'a ProceedingJoinPoint<'a>),
    Autowire(&'a AutowireJoinPoint<'a>),
}

impl<'a> JoinPoint<'a> {
    /// 继续执行：方法连接点调用内层链，字段连接点解析原始依赖
    pub fn proceed(&self) -> anyhow::Result<Value> {
        match self {
            JoinPoint::Execution(jp) => jp.proceed(),
            JoinPoint::Autowire(jp) => jp.proceed(),
        }
    }

    pub fn declaring_type(&self) -> &str {
        match self {
            JoinPoint::Execution(jp) => jp.joint().declaring_type(),
            JoinPoint::Autowire(jp) => jp.joint().declaring_type(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            JoinPoint::Execution(jp) => jp.joint().name(),
            JoinPoint::Autowire(jp) => jp.joint().name(),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            JoinPoint::Execution(jp) => jp.joint().signature(),
            JoinPoint::Autowire(jp) => jp.joint().signature(),
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match self {
            JoinPoint::Execution(jp) => jp.joint().annotations(),
            JoinPoint::Autowire(jp) => jp.joint().annotations(),
        }
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, JoinPoint::Execution(_))
    }

    pub fn as_execution(&self) -> Option<&'a ProceedingJoinPoint<'a>> {
        match self {
            JoinPoint::Execution(jp) => Some(jp),
            JoinPoint::Autowire(_) => None,
        }
    }

    pub fn as_autowire(&self) -> Option<&'a AutowireJoinPoint<'a>> {
        match self {
            JoinPoint::Autowire(jp) => Some(jp),
            JoinPoint::Execution(_) => None,
        }
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinPoint::Execution(jp) => jp.joint().fmt(f),
            JoinPoint::Autowire(jp) => jp.joint().fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use weft_core::utils::values::value;

    fn service() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("com.acme.Service")
                .method(MethodDescriptor::new("save").param("String"))
                .field(weft_core::FieldDescriptor::new("repo", "com.acme.Repository")),
        )
    }

    #[test]
    fn test_joint_identity() {
        let first = MethodJoint::find(&service(), "save").unwrap();
        let second = MethodJoint::find(&service(), "save").unwrap();
        assert_eq!(first, second);

        let mut set = HashSet::new();
        set.insert(Joint::Method(first.clone()));
        assert!(set.contains(&Joint::Method(second)));
        assert_eq!(first.to_string(), "() com.acme.Service.save(String)");
        assert_eq!(first.signature(), "com.acme.Service.save");
        assert!(MethodJoint::find(&service(), "missing").is_none());
    }

    struct Echo;

    impl MethodInterceptor for Echo {
        fn invoke(&self, _joint: &MethodJoint, invocation: &Invocation<'_>) -> anyhow::Result<Value> {
            Ok(Arc::clone(&invocation.args[0]))
        }
    }

    #[test]
    fn test_proceed_with_replaced_args() {
        let joint = MethodJoint::find(&service(), "save").unwrap();
        let args = [value("original".to_string())];
        let invocation = Invocation {
            caller: Some("com.acme.Caller"),
            target: None,
            args: &args,
        };
        let jp = ProceedingJoinPoint::new(&joint, &invocation, &Echo);

        assert_eq!(jp.caller(), Some("com.acme.Caller"));
        assert_eq!(*jp.arg::<String>(0).unwrap(), "original");
        assert!(jp.arg::<String>(1).is_err());
        assert!(jp.this::<String>().is_err());

        let first = jp.proceed().unwrap();
        let again = jp.proceed().unwrap();
        assert_eq!(first.downcast_ref::<String>(), again.downcast_ref::<String>());

        let replaced = jp.proceed_with(&[value("replaced".to_string())]).unwrap();
        assert_eq!(replaced.downcast_ref::<String>().unwrap(), "replaced");
    }

    struct Counting(AtomicUsize);

    impl AutowireInterceptor for Counting {
        fn resolve(&self, _joint: &FieldJoint) -> anyhow::Result<Value> {
            Ok(value(self.0.fetch_add(1, AtomicOrdering::SeqCst)))
        }
    }

    #[test]
    fn test_autowire_proceed_resolves_once() {
        let joint = FieldJoint::find(&service(), "repo").unwrap();
        let counting = Counting(AtomicUsize::new(0));
        let jp = AutowireJoinPoint::new(&joint, &counting);

        assert!(!jp.is_resolved());
        let first = jp.proceed().unwrap();
        let second = jp.proceed().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counting.0.load(AtomicOrdering::SeqCst), 1);

        let as_join_point = JoinPoint::Autowire(&jp);
        assert!(!as_join_point.is_execution());
        assert_eq!(as_join_point.signature(), "com.acme.Service.repo");
    }
}
