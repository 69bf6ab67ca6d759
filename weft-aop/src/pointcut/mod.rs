//! 切点（Pointcut）
//!
//! 切点是不可变的谓词，分为两个域：
//! - 执行域：匹配 `(调用方类型, 方法)`
//! - 注入域：匹配 `(声明类型, 字段)`
//!
//! 同域的切点可以用 AND / OR / NOT 组合；跨域组合只能通过 [`Pointcut::divergent_or`]。

mod cache;
mod lexer;
mod parser;
mod pattern;

use std::fmt;
use std::sync::Arc;

use weft_core::{Annotation, TypeSet};

use crate::error::{AopError, AopResult};
use crate::joinpoint::{FieldJoint, MethodJoint};

pub use cache::PointcutCache;
pub use parser::parse;
pub use pattern::{FieldPattern, MethodPattern, NamePattern, ParamPattern, TypePattern};

/// 切点所属的域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Execution,
    Autowire,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Execution => write!(f, "execution"),
            Domain::Autowire => write!(f, "autowire"),
        }
    }
}

/// 三值逻辑：织入时没有调用方信息，`within` 的结果未知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Unknown,
        }
    }

    fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Unknown,
        }
    }

    fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

/// 求值时的调用方信息
#[derive(Debug, Clone, Copy)]
enum Caller<'a> {
    /// 织入时：调用方尚不可知
    Unknown,
    /// 调用时没有调用方（外部调用或容器内部调用）
    Absent,
    Type(&'a str),
}

impl<'a> From<Option<&'a str>> for Caller<'a> {
    fn from(caller: Option<&'a str>) -> Self {
        caller.map_or(Caller::Absent, Caller::Type)
    }
}

impl From<bool> for Truth {
    fn from(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }
}

#[derive(Debug)]
enum Node {
    Execution(MethodPattern),
    Autowire(FieldPattern),
    Within(TypePattern),
    AtWithin(TypePattern),
    AtExecution(TypePattern),
    AtAutowire(TypePattern),
    /// 声明类型匹配，域由标志位决定
    Target(TypePattern),
    AtTarget(TypePattern),
    And(Arc<Pointcut>, Arc<Pointcut>),
    Or(Arc<Pointcut>, Arc<Pointcut>),
    Not(Arc<Pointcut>),
    Divergent {
        execution: Arc<Pointcut>,
        autowire: Arc<Pointcut>,
    },
}

/// 切点
#[derive(Debug)]
pub struct Pointcut {
    node: Node,
    execution: bool,
    autowire: bool,
    within_guard: bool,
    divergent: bool,
}

fn annotated(annotations: &[Annotation], pattern: &TypePattern) -> bool {
    annotations.iter().any(|a| pattern.matches_name(&a.type_name))
}

impl Pointcut {
    fn leaf(node: Node, domain: Domain) -> Self {
        Self {
            node,
            execution: domain == Domain::Execution,
            autowire: domain == Domain::Autowire,
            within_guard: false,
            divergent: false,
        }
    }

    // ========== 叶子 ==========

    /// `execution(<返回类型> [类型.]<方法名>(<参数>))`
    pub fn execution(pattern: MethodPattern) -> Self {
        Self::leaf(Node::Execution(pattern), Domain::Execution)
    }

    /// `autowire(<字段类型> [字段名])`
    pub fn autowire(pattern: FieldPattern) -> Self {
        Self::leaf(Node::Autowire(pattern), Domain::Autowire)
    }

    /// `within(T)`：调用方类型匹配 `T`
    pub fn within(pattern: TypePattern) -> Self {
        let guard = !pattern.is_trivial();
        let mut pointcut = Self::leaf(Node::Within(pattern), Domain::Execution);
        pointcut.within_guard = guard;
        pointcut
    }

    /// `@within(A)`：调用方类型带有注解 `A`
    pub fn at_within(pattern: TypePattern) -> Self {
        let guard = !pattern.is_trivial();
        let mut pointcut = Self::leaf(Node::AtWithin(pattern), Domain::Execution);
        pointcut.within_guard = guard;
        pointcut
    }

    /// `@execution(A)`：方法带有注解 `A`
    pub fn at_execution(pattern: TypePattern) -> Self {
        Self::leaf(Node::AtExecution(pattern), Domain::Execution)
    }

    /// `@autowire(A)`：字段带有注解 `A`
    pub fn at_autowire(pattern: TypePattern) -> Self {
        Self::leaf(Node::AtAutowire(pattern), Domain::Autowire)
    }

    /// `target(T)`：声明类型匹配 `T`
    pub fn target(pattern: TypePattern, domain: Domain) -> Self {
        Self::leaf(Node::Target(pattern), domain)
    }

    /// 执行域的 `target(T)`
    pub fn execution_target(pattern: TypePattern) -> Self {
        Self::target(pattern, Domain::Execution)
    }

    /// 注入域的 `target(T)`
    pub fn autowire_target(pattern: TypePattern) -> Self {
        Self::target(pattern, Domain::Autowire)
    }

    /// `@target(A)`：声明类型带有注解 `A`
    pub fn at_target(pattern: TypePattern, domain: Domain) -> Self {
        Self::leaf(Node::AtTarget(pattern), domain)
    }

    // ========== 组合 ==========

    fn require(pointcut: &Pointcut, domain: Domain, operation: &str) -> AopResult<()> {
        let ok = match domain {
            Domain::Execution => pointcut.execution && !pointcut.autowire,
            Domain::Autowire => pointcut.autowire && !pointcut.execution,
        };
        if ok && !pointcut.divergent {
            Ok(())
        } else {
            Err(AopError::DivergentCrosscut(format!(
                "{} requires {} pointcuts, got '{}'",
                operation, domain, pointcut
            )))
        }
    }

    fn binary(
        left: Arc<Pointcut>,
        right: Arc<Pointcut>,
        domain: Domain,
        operation: &str,
        node: fn(Arc<Pointcut>, Arc<Pointcut>) -> Node,
    ) -> AopResult<Self> {
        Self::require(&left, domain, operation)?;
        Self::require(&right, domain, operation)?;
        let within_guard = left.within_guard || right.within_guard;
        let mut pointcut = Self::leaf(node(left, right), domain);
        pointcut.within_guard = within_guard;
        Ok(pointcut)
    }

    pub fn execution_and(left: impl Into<Arc<Pointcut>>, right: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::binary(left.into(), right.into(), Domain::Execution, "AND", Node::And)
    }

    pub fn execution_or(left: impl Into<Arc<Pointcut>>, right: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::binary(left.into(), right.into(), Domain::Execution, "OR", Node::Or)
    }

    pub fn autowire_and(left: impl Into<Arc<Pointcut>>, right: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::binary(left.into(), right.into(), Domain::Autowire, "AND", Node::And)
    }

    pub fn autowire_or(left: impl Into<Arc<Pointcut>>, right: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::binary(left.into(), right.into(), Domain::Autowire, "OR", Node::Or)
    }

    fn negate(inner: Arc<Pointcut>, domain: Domain) -> AopResult<Self> {
        Self::require(&inner, domain, "NOT")?;
        let within_guard = inner.within_guard;
        let mut pointcut = Self::leaf(Node::Not(inner), domain);
        pointcut.within_guard = within_guard;
        Ok(pointcut)
    }

    pub fn negate_execution(inner: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::negate(inner.into(), Domain::Execution)
    }

    pub fn negate_autowire(inner: impl Into<Arc<Pointcut>>) -> AopResult<Self> {
        Self::negate(inner.into(), Domain::Autowire)
    }

    /// 跨域 OR：执行连接点用执行域一侧匹配，字段用注入域一侧匹配
    pub fn divergent_or(
        execution: impl Into<Arc<Pointcut>>,
        autowire: impl Into<Arc<Pointcut>>,
    ) -> AopResult<Self> {
        let (execution, autowire) = (execution.into(), autowire.into());
        Self::require(&execution, Domain::Execution, "divergent OR")?;
        Self::require(&autowire, Domain::Autowire, "divergent OR")?;
        Ok(Self {
            within_guard: execution.within_guard,
            node: Node::Divergent { execution, autowire },
            execution: true,
            autowire: true,
            divergent: true,
        })
    }

    // ========== 标志 ==========

    pub fn is_execution(&self) -> bool {
        self.execution
    }

    pub fn is_autowire(&self) -> bool {
        self.autowire
    }

    pub fn is_within_guard(&self) -> bool {
        self.within_guard
    }

    pub fn is_divergent(&self) -> bool {
        self.divergent
    }

    /// 两个切点是否同域（都只属于执行域，或都只属于注入域）
    pub fn is_convergent_with(&self, other: &Pointcut) -> bool {
        !self.divergent
            && !other.divergent
            && self.execution == other.execution
            && self.autowire == other.autowire
    }

    // ========== 匹配 ==========

    fn eval_method(&self, types: &TypeSet, caller: Caller<'_>, joint: &MethodJoint) -> Truth {
        let declaring = joint.declaring();
        let method = joint.method();
        match &self.node {
            Node::Execution(pattern) => pattern.matches(types, declaring, method).into(),
            Node::Within(pattern) if pattern.is_trivial() => Truth::True,
            Node::Within(pattern) => match caller {
                Caller::Type(caller) => pattern.matches(types, caller).into(),
                Caller::Absent => Truth::False,
                Caller::Unknown => Truth::Unknown,
            },
            Node::AtWithin(pattern) if pattern.is_trivial() => Truth::True,
            Node::AtWithin(pattern) => match caller {
                Caller::Type(caller) => types
                    .get(caller)
                    .map_or(false, |t| annotated(&t.annotations, pattern))
                    .into(),
                Caller::Absent => Truth::False,
                Caller::Unknown => Truth::Unknown,
            },
            Node::AtExecution(pattern) => annotated(&method.annotations, pattern).into(),
            Node::Target(pattern) => pattern.matches(types, &declaring.name).into(),
            Node::AtTarget(pattern) => annotated(&declaring.annotations, pattern).into(),
            Node::Autowire(_) | Node::AtAutowire(_) => Truth::False,
            Node::And(left, right) => left
                .eval_method(types, caller, joint)
                .and(right.eval_method(types, caller, joint)),
            Node::Or(left, right) => left
                .eval_method(types, caller, joint)
                .or(right.eval_method(types, caller, joint)),
            Node::Not(inner) => inner.eval_method(types, caller, joint).not(),
            Node::Divergent { execution, .. } => execution.eval_method(types, caller, joint),
        }
    }

    /// 调用时匹配方法连接点
    ///
    /// `caller` 为 None 表示没有调用方：非平凡的 `within` / `@within` 不成立，
    /// 它们的否定成立。
    pub fn matches_method(&self, types: &TypeSet, caller: Option<&str>, joint: &MethodJoint) -> bool {
        self.execution && self.eval_method(types, caller.into(), joint) == Truth::True
    }

    /// 织入时匹配方法连接点：除非切点一定不成立，否则视为候选
    pub fn may_match_method(&self, types: &TypeSet, joint: &MethodJoint) -> bool {
        self.execution && self.eval_method(types, Caller::Unknown, joint) != Truth::False
    }

    /// 匹配字段连接点
    pub fn matches_field(&self, types: &TypeSet, joint: &FieldJoint) -> bool {
        if !self.autowire {
            return false;
        }
        let declaring = joint.declaring();
        let field = joint.field();
        match &self.node {
            Node::Autowire(pattern) => pattern.matches(types, &field.field_type, &field.name),
            Node::AtAutowire(pattern) => annotated(&field.annotations, pattern),
            Node::Target(pattern) => pattern.matches(types, &declaring.name),
            Node::AtTarget(pattern) => annotated(&declaring.annotations, pattern),
            Node::Execution(_) | Node::Within(_) | Node::AtWithin(_) | Node::AtExecution(_) => false,
            Node::And(left, right) => left.matches_field(types, joint) && right.matches_field(types, joint),
            Node::Or(left, right) => left.matches_field(types, joint) || right.matches_field(types, joint),
            Node::Not(inner) => !inner.matches_field(types, joint),
            Node::Divergent { autowire, .. } => autowire.matches_field(types, joint),
        }
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Execution(pattern) => write!(f, "execution({})", pattern),
            Node::Autowire(pattern) => write!(f, "autowire({})", pattern),
            Node::Within(pattern) => write!(f, "within({})", pattern),
            Node::AtWithin(pattern) => write!(f, "@within({})", pattern),
            Node::AtExecution(pattern) => write!(f, "@execution({})", pattern),
            Node::AtAutowire(pattern) => write!(f, "@autowire({})", pattern),
            Node::Target(pattern) => write!(f, "target({})", pattern),
            Node::AtTarget(pattern) => write!(f, "@target({})", pattern),
            Node::And(left, right) => write!(f, "({} && {})", left, right),
            Node::Or(left, right) => write!(f, "({} || {})", left, right),
            Node::Not(inner) => write!(f, "!{}", inner),
            Node::Divergent { execution, autowire } => write!(f, "{} || {}", execution, autowire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::{FieldDescriptor, MethodDescriptor, Modifiers, TypeDescriptor};

    fn universe() -> (TypeSet, Vec<MethodJoint>, Vec<FieldJoint>) {
        let service = Arc::new(
            TypeDescriptor::new("com.acme.Service")
                .annotate(Annotation::new("com.acme.Tagged"))
                .method(MethodDescriptor::new("save").param("String"))
                .method(MethodDescriptor::new("find").returns("String"))
                .method(MethodDescriptor::new("audit").modifiers(Modifiers::PUBLIC | Modifiers::FINAL))
                .field(FieldDescriptor::new("repo", "com.acme.Repository"))
                .field(FieldDescriptor::new("name", "String")),
        );
        let caller = Arc::new(TypeDescriptor::new("com.acme.Caller"));
        let mut types = TypeSet::new();
        types.insert(Arc::clone(&service));
        types.insert(caller);

        let methods = (0..service.methods.len())
            .map(|i| MethodJoint::new(Arc::clone(&service), i))
            .collect();
        let fields = (0..service.fields.len())
            .map(|i| FieldJoint::new(Arc::clone(&service), i))
            .collect();
        (types, methods, fields)
    }

    fn p(expression: &str) -> Arc<Pointcut> {
        parse(expression).unwrap()
    }

    const CALLERS: [Option<&str>; 3] = [None, Some("com.acme.Caller"), Some("com.acme.Other")];

    #[test]
    fn test_or_and_laws_per_domain() {
        let (types, methods, fields) = universe();
        let a = p("execution(* save(..))");
        let b = p("execution(String *(..)) && within(com.acme.Caller)");

        let or = Pointcut::execution_or(Arc::clone(&a), Arc::clone(&b)).unwrap();
        let and = Pointcut::execution_and(Arc::clone(&a), Arc::clone(&b)).unwrap();
        assert!(or.is_within_guard());
        assert!(and.is_within_guard());

        for joint in &methods {
            for caller in CALLERS {
                let left = a.matches_method(&types, caller, joint);
                let right = b.matches_method(&types, caller, joint);
                assert_eq!(or.matches_method(&types, caller, joint), left || right);
                assert_eq!(and.matches_method(&types, caller, joint), left && right);
            }
        }

        let x = p("autowire(com.acme.Repository)");
        let y = p("autowire(* name)");
        let or = Pointcut::autowire_or(Arc::clone(&x), Arc::clone(&y)).unwrap();
        let and = Pointcut::autowire_and(Arc::clone(&x), Arc::clone(&y)).unwrap();
        for joint in &fields {
            let left = x.matches_field(&types, joint);
            let right = y.matches_field(&types, joint);
            assert_eq!(or.matches_field(&types, joint), left || right);
            assert_eq!(and.matches_field(&types, joint), left && right);
        }
    }

    #[test]
    fn test_negation_law() {
        let (types, methods, fields) = universe();
        let pointcut = p("execution(* s*(..)) && within(com.acme.Caller)");
        let negated = Pointcut::negate_execution(Arc::clone(&pointcut)).unwrap();
        assert!(negated.is_within_guard());
        assert!(negated.is_execution());

        for joint in &methods {
            for caller in CALLERS {
                assert_eq!(
                    negated.matches_method(&types, caller, joint),
                    !pointcut.matches_method(&types, caller, joint)
                );
            }
        }

        let field = p("autowire(com.acme.Repository)");
        let negated = Pointcut::negate_autowire(Arc::clone(&field)).unwrap();
        for joint in &fields {
            assert_eq!(negated.matches_field(&types, joint), !field.matches_field(&types, joint));
        }
    }

    #[test]
    fn test_cross_domain_combination() {
        let (types, methods, fields) = universe();
        let exec = p("execution(* save(..))");
        let wire = p("autowire(com.acme.Repository)");

        assert!(matches!(
            Pointcut::execution_and(Arc::clone(&exec), Arc::clone(&wire)),
            Err(AopError::DivergentCrosscut(_))
        ));
        assert!(matches!(
            Pointcut::autowire_or(Arc::clone(&exec), Arc::clone(&wire)),
            Err(AopError::DivergentCrosscut(_))
        ));
        assert!(!exec.is_convergent_with(&wire));

        let both = Arc::new(Pointcut::divergent_or(Arc::clone(&exec), Arc::clone(&wire)).unwrap());
        assert!(both.is_divergent());
        assert!(both.matches_method(&types, None, &methods[0]));
        assert!(both.matches_field(&types, &fields[0]));
        assert!(!both.matches_field(&types, &fields[1]));

        // 跨域切点不能再参与组合
        assert!(Pointcut::execution_or(Arc::clone(&both), Arc::clone(&exec)).is_err());
        assert!(Pointcut::negate_execution(both).is_err());
    }

    #[test]
    fn test_within_three_valued() {
        let (types, methods, _) = universe();
        let guarded = p("execution(* com.acme.Service.save(..)) && within(com.acme.Caller)");
        let save = &methods[0];
        let find = &methods[1];

        assert!(guarded.is_within_guard());
        assert!(guarded.may_match_method(&types, save));
        assert!(!guarded.may_match_method(&types, find));
        assert!(!guarded.matches_method(&types, None, save));
        assert!(guarded.matches_method(&types, Some("com.acme.Caller"), save));
        assert!(!guarded.matches_method(&types, Some("com.acme.Other"), save));

        let negated = p("execution(* save(..)) && !within(com.acme.Caller)");
        assert!(negated.may_match_method(&types, save));
        assert!(negated.matches_method(&types, Some("com.acme.Other"), save));
        assert!(!negated.matches_method(&types, Some("com.acme.Caller"), save));
    }

    #[test]
    fn test_negated_within_holds_without_caller() {
        let (types, methods, _) = universe();
        let save = &methods[0];

        let negated = p("execution(* save(..)) && !within(com.acme.Caller)");
        assert!(negated.matches_method(&types, None, save));

        let negated = p("execution(* save(..)) && !@within(com.acme.Tagged)");
        assert!(negated.matches_method(&types, None, save));
        assert!(!p("execution(* save(..)) && @within(com.acme.Tagged)").matches_method(&types, None, save));

        // 织入时仍然是候选
        assert!(negated.may_match_method(&types, save));
    }

    #[test]
    fn test_trivial_within_is_not_a_guard() {
        assert!(!p("execution(* *(..)) && within(*.*)").is_within_guard());
        assert!(!p("execution(* *(..)) && @within(*)").is_within_guard());
        assert!(p("execution(* *(..)) && @within(com.acme.Tagged)").is_within_guard());
    }

    #[test]
    fn test_annotation_guards() {
        let (types, methods, fields) = universe();
        assert!(p("execution(* *(..)) && @target(com.acme.Tagged)").matches_method(&types, None, &methods[0]));
        assert!(!p("execution(* *(..)) && @target(Tagged)").matches_method(&types, None, &methods[0]));
        assert!(p("autowire(*) && @target(*.Tagged)").matches_field(&types, &fields[0]));
        assert!(p("autowire(*) && target(com.acme.*)").matches_field(&types, &fields[1]));
    }
}
