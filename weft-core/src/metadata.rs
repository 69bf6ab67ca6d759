//! 组件元数据
//!
//! Rust 没有运行时反射，织入层需要的类型信息（方法、字段、修饰符、注解、继承关系）
//! 由组件在注册时以描述符表的形式提供。类型名称统一使用以 `.` 分隔的全限定名，
//! 例如 `com.acme.Service`，最后一段为简单名，其余部分为包名。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::constants;

/// 把 Rust 类型路径转换为点分隔的类型名，例如 `app::service::UserService` -> `app.service.UserService`
pub fn type_name_of<T: ?Sized>() -> String {
    std::any::type_name::<T>().replace("::", ".")
}

/// 类型名的包部分，没有包时返回空字符串
pub fn package_of(type_name: &str) -> &str {
    type_name.rsplit_once('.').map(|(package, _)| package).unwrap_or("")
}

/// 类型名的简单名部分
pub fn simple_name_of(type_name: &str) -> &str {
    type_name.rsplit_once('.').map(|(_, name)| name).unwrap_or(type_name)
}

/// 成员修饰符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const PUBLIC: Modifiers = Modifiers(1);
    pub const PRIVATE: Modifiers = Modifiers(1 << 1);
    pub const STATIC: Modifiers = Modifiers(1 << 2);
    pub const FINAL: Modifiers = Modifiers(1 << 3);
    pub const ABSTRACT: Modifiers = Modifiers(1 << 4);
    pub const BRIDGE: Modifiers = Modifiers(1 << 5);
    pub const SYNTHETIC: Modifiers = Modifiers(1 << 6);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: Modifiers) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers(self.0 | rhs.0)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::ABSTRACT, "abstract"),
            (Self::BRIDGE, "bridge"),
            (Self::SYNTHETIC, "synthetic"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// 注解
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    /// 注解类型的全限定名
    pub type_name: String,

    /// 注解参数
    pub values: Vec<String>,
}

impl Annotation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    /// 第一个参数
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn package(&self) -> &str {
        package_of(&self.type_name)
    }

    pub fn simple_name(&self) -> &str {
        simple_name_of(&self.type_name)
    }

    pub fn is(&self, type_name: &str) -> bool {
        self.type_name == type_name
    }
}

/// 方法种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// 普通实例方法
    Method,
    /// 分配实例（替代原始构造）
    New,
    /// 分配之后的初始化
    Init,
}

/// 方法描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub kind: MethodKind,
    pub modifiers: Modifiers,
    pub return_type: String,
    pub params: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl MethodDescriptor {
    /// 创建公共实例方法，默认无参数、无返回值
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Method,
            modifiers: Modifiers::PUBLIC,
            return_type: constants::UNIT_TYPE_NAME.to_string(),
            params: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// 分配连接点：唯一参数为注入结果，返回组件自身
    pub fn allocation(type_name: impl Into<String>) -> Self {
        Self {
            name: constants::NEW_METHOD_NAME.to_string(),
            kind: MethodKind::New,
            modifiers: Modifiers::PUBLIC,
            return_type: type_name.into(),
            params: vec![constants::WIRING_TYPE_NAME.to_string()],
            annotations: Vec::new(),
        }
    }

    /// 初始化连接点
    pub fn initialization() -> Self {
        Self {
            name: constants::INIT_METHOD_NAME.to_string(),
            kind: MethodKind::Init,
            modifiers: Modifiers::PUBLIC,
            return_type: constants::UNIT_TYPE_NAME.to_string(),
            params: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// 形状正确的通知方法：接收一个连接点，返回通用对象
    pub fn advice(name: impl Into<String>) -> Self {
        Self::new(name)
            .returns(constants::VALUE_TYPE_NAME)
            .param("weft.aop.JoinPoint")
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn param(mut self, param_type: impl Into<String>) -> Self {
        self.params.push(param_type.into());
        self
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// 追加一个 `@Around` 注解
    pub fn around(self, expression: impl Into<String>) -> Self {
        self.annotate(Annotation::new(constants::AROUND_ANNOTATION).with_value(expression))
    }

    /// 追加一个 `@Privilege` 注解
    pub fn privilege(self, level: i32) -> Self {
        self.annotate(Annotation::new(constants::PRIVILEGE_ANNOTATION).with_value(level.to_string()))
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        self.annotations.iter().any(|a| a.is(type_name))
    }

    pub fn annotations_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.annotations.iter().filter(move |a| a.is(type_name))
    }

    pub fn is_constructor(&self) -> bool {
        self.kind != MethodKind::Method
    }
}

/// 字段描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: String,
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            modifiers: Modifiers::PRIVATE,
            annotations: Vec::new(),
        }
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// 是否为注入点：非 static、非 final
    pub fn is_injection_point(&self) -> bool {
        !self.modifiers.is_static() && !self.modifiers.is_final()
    }
}

/// 类型描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub supertypes: Vec<String>,
    pub modifiers: Modifiers,
    pub annotations: Vec<Annotation>,
    pub methods: Vec<MethodDescriptor>,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            modifiers: Modifiers::PUBLIC,
            annotations: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// 以 Rust 类型路径命名
    pub fn of<T: ?Sized>() -> Self {
        Self::new(type_name_of::<T>())
    }

    /// 声明父类型（trait 或抽象类型）
    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    pub fn simple_name(&self) -> &str {
        simple_name_of(&self.name)
    }

    pub fn has_annotation(&self, type_name: &str) -> bool {
        self.annotations.iter().any(|a| a.is(type_name))
    }

    pub fn annotations_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.annotations.iter().filter(move |a| a.is(type_name))
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn is_aspect(&self) -> bool {
        self.has_annotation(constants::ASPECT_ANNOTATION)
    }
}

/// 候选类型集合
///
/// 保留插入顺序，保证织入结果可复现；同时负责类型之间的可赋值判断
#[derive(Debug, Default, Clone)]
pub struct TypeSet {
    types: Vec<Arc<TypeDescriptor>>,
    index: HashMap<String, usize>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入类型，同名类型已存在时返回 false
    pub fn insert(&mut self, descriptor: Arc<TypeDescriptor>) -> bool {
        if self.index.contains_key(&descriptor.name) {
            return false;
        }
        self.index.insert(descriptor.name.clone(), self.types.len());
        self.types.push(descriptor);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// `name` 的全部父类型（传递闭包，不含自身），按广度优先顺序
    pub fn supertypes_of(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(name.to_string());
        let mut queue = vec![name.to_string()];
        while !queue.is_empty() {
            let mut next = Vec::new();
            for current in &queue {
                if let Some(descriptor) = self.get(current) {
                    for supertype in &descriptor.supertypes {
                        if seen.insert(supertype.clone()) {
                            result.push(supertype.clone());
                            next.push(supertype.clone());
                        }
                    }
                }
            }
            queue = next;
        }
        result
    }

    /// `declared` 是否可以由 `actual` 赋值：两者相同，或 `declared` 是 `actual` 的父类型
    pub fn is_assignable(&self, declared: &str, actual: &str) -> bool {
        declared == actual || self.supertypes_of(actual).iter().any(|s| s == declared)
    }

    /// 所有可以赋值给 `declared` 的类型（包括自身）
    pub fn assignable_to(&self, declared: &str) -> Vec<&Arc<TypeDescriptor>> {
        self.types
            .iter()
            .filter(|t| self.is_assignable(declared, &t.name))
            .collect()
    }
}
