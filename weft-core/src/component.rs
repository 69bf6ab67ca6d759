//! 组件定义
//!
//! 组件由三部分组成：描述符（织入层做匹配用的元数据）、分配函数（根据注入结果创建实例）
//! 以及方法体表（代理分派时调用的原始实现）。

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::constants;
use crate::container::ComponentRef;
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::{Annotation, FieldDescriptor, MethodDescriptor, MethodKind, TypeDescriptor};
use crate::utils::values::{downcast_value, unit};
use crate::Scope;

/// 容器中流转的通用对象
pub type Value = Arc<dyn Any + Send + Sync>;

/// 方法原始实现：`(this, args) -> result`
pub type MethodBody = Arc<dyn Fn(&Value, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// 分配函数：根据注入结果创建实例
pub type Allocator = Arc<dyn Fn(&Wiring) -> anyhow::Result<Value> + Send + Sync>;

/// 初始化回调（类似 @PostConstruct）
pub type Initializer = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// 注入结果：字段名 -> 已解析的依赖
#[derive(Clone, Default)]
pub struct Wiring {
    values: HashMap<String, Value>,
}

impl Wiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn raw(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// 取出字段的值并转换为具体类型
    ///
    /// 值是组件句柄时返回句柄背后的原始实例，之后的调用不经过代理
    pub fn get<T: Any + Send + Sync>(&self, field: &str) -> ContainerResult<Arc<T>> {
        let value = self
            .values
            .get(field)
            .ok_or_else(|| ContainerError::FieldNotWired(field.to_string()))?;
        match value.downcast_ref::<ComponentRef>() {
            Some(handle) if !value.is::<T>() => handle.target::<T>(),
            _ => downcast_value::<T>(value),
        }
    }

    /// 取出字段对应的组件句柄，通过句柄的调用会经过代理
    pub fn component(&self, field: &str) -> ContainerResult<Arc<ComponentRef>> {
        let value = self
            .values
            .get(field)
            .ok_or_else(|| ContainerError::FieldNotWired(field.to_string()))?;
        Arc::clone(value)
            .downcast::<ComponentRef>()
            .map_err(|_| ContainerError::TypeMismatch("ComponentRef".to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Wiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<&String> = self.values.keys().collect();
        fields.sort();
        f.debug_struct("Wiring").field("fields", &fields).finish()
    }
}

/// 组件定义 - 描述如何创建和调用组件
pub struct ComponentDefinition {
    descriptor: TypeDescriptor,
    scope: Scope,
    lazy: bool,
    allocator: Allocator,
    initializer: Option<Initializer>,
    methods: HashMap<String, MethodBody>,
}

impl ComponentDefinition {
    /// 创建组件定义
    ///
    /// 描述符会自动补上 `new` 连接点
    pub fn new<T, F>(descriptor: TypeDescriptor, allocator: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Wiring) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let allocator: Allocator = Arc::new(move |wiring: &Wiring| -> anyhow::Result<Value> {
            let instance = allocator(wiring)?;
            Ok(Arc::new(instance) as Value)
        });
        Self::with_allocator(descriptor, allocator)
    }

    /// 使用原始分配函数创建组件定义
    pub fn with_allocator(mut descriptor: TypeDescriptor, allocator: Allocator) -> Self {
        let allocation = MethodDescriptor::allocation(descriptor.name.clone());
        descriptor.methods.insert(0, allocation);
        Self {
            descriptor,
            scope: Scope::default(),
            lazy: false,
            allocator,
            initializer: None,
            methods: HashMap::new(),
        }
    }

    /// 已经存在的实例作为单例组件
    pub fn instance<T: Any + Send + Sync>(descriptor: TypeDescriptor, instance: Arc<T>) -> Self {
        let value: Value = instance;
        Self::with_allocator(
            descriptor,
            Arc::new(move |_: &Wiring| -> anyhow::Result<Value> { Ok(Arc::clone(&value)) }),
        )
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// 设置延迟初始化（仅对单例有效）
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// 给类型加注解
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.descriptor.annotations.push(annotation);
        self
    }

    /// 声明注入字段
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.descriptor.fields.push(field);
        self
    }

    /// 设置初始化回调，同时声明 `init` 连接点
    pub fn with_init<T, F>(mut self, init: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(move |this: &Value| {
            let this = downcast_value::<T>(this)?;
            init(this.as_ref())
        }));
        if self.descriptor.find_method(constants::INIT_METHOD_NAME).is_none() {
            self.descriptor.methods.push(MethodDescriptor::initialization());
        }
        self
    }

    /// 声明方法及其实现
    pub fn with_method<T, F>(self, method: MethodDescriptor, body: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let body: MethodBody = Arc::new(move |this: &Value, args: &[Value]| {
            let this = downcast_value::<T>(this)?;
            body(this.as_ref(), args)
        });
        self.with_raw_method(method, body)
    }

    /// 声明没有返回值的方法
    pub fn with_procedure<T, F>(self, method: MethodDescriptor, body: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_method(method, move |this: &T, args: &[Value]| {
            body(this, args)?;
            Ok(unit())
        })
    }

    /// 声明方法及其原始实现
    pub fn with_raw_method(mut self, method: MethodDescriptor, body: MethodBody) -> Self {
        self.methods.insert(method.name.clone(), body);
        self.descriptor.methods.push(method);
        self
    }

    /// 只声明方法，不提供实现（例如由织入层另行保存实现的通知方法）
    pub fn declare_method(mut self, method: MethodDescriptor) -> Self {
        self.descriptor.methods.push(method);
        self
    }

    /// 组件名称（类型全限定名）
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    pub fn method_body(&self, name: &str) -> Option<&MethodBody> {
        self.methods.get(name)
    }

    /// 需要注入的字段
    pub fn injection_points(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.descriptor.fields.iter().filter(|f| f.is_injection_point())
    }

    /// 校验定义并根据 `@Scope` 注解确定作用域
    pub fn validate(&mut self) -> ContainerResult<()> {
        let name = self.descriptor.name.clone();

        let mut methods = HashSet::new();
        for method in &self.descriptor.methods {
            if !methods.insert(method.name.as_str()) {
                return Err(ContainerError::ContractViolation {
                    component: name,
                    reason: format!("method '{}' is declared more than once", method.name),
                });
            }
            let reserved = method.name == constants::NEW_METHOD_NAME
                || method.name == constants::INIT_METHOD_NAME;
            if reserved && method.kind == MethodKind::Method {
                return Err(ContainerError::ContractViolation {
                    component: name,
                    reason: format!("method name '{}' is reserved", method.name),
                });
            }
        }

        let mut fields = HashSet::new();
        for field in &self.descriptor.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(ContainerError::ContractViolation {
                    component: name,
                    reason: format!("field '{}' is declared more than once", field.name),
                });
            }
        }

        let scopes: Vec<_> = self
            .descriptor
            .annotations_of(constants::SCOPE_ANNOTATION)
            .collect();
        match scopes.as_slice() {
            [] => {}
            [annotation] => {
                let text = annotation.value().unwrap_or_default();
                self.scope = text.parse().map_err(|_| ContainerError::UnknownScope {
                    component: name.clone(),
                    scope: text.to_string(),
                })?;
            }
            _ => return Err(ContainerError::DuplicateScope(name)),
        }

        Ok(())
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.descriptor.name)
            .field("scope", &self.scope)
            .field("lazy", &self.lazy)
            .field("methods", &self.descriptor.methods.len())
            .field("fields", &self.descriptor.fields.len())
            .finish()
    }
}

/// 组件注册器 - 用于 inventory 收集
pub struct ComponentRegistration {
    pub name: &'static str,
    pub create: fn() -> ComponentDefinition,
}

inventory::collect!(ComponentRegistration);

/// 获取所有通过 inventory 提交的组件注册器
pub fn get_all_component_registrations() -> impl Iterator<Item = &'static ComponentRegistration> {
    inventory::iter::<ComponentRegistration>()
}

/// 方法注册器，由 `#[component_methods]` 提交，在 [`Component::definition`] 中合并
pub struct MethodRegistration {
    pub component: &'static str,
    pub declare: fn(ComponentDefinition) -> ComponentDefinition,
}

inventory::collect!(MethodRegistration);

pub fn get_all_method_registrations() -> impl Iterator<Item = &'static MethodRegistration> {
    inventory::iter::<MethodRegistration>()
}

/// 由 `#[derive(Component)]` 实现的组件 trait
///
/// ```ignore
/// #[derive(Component)]
/// #[component("com.acme.Service")]
/// struct Service {
///     #[autowired]
///     repo: Arc<Repository>,
/// }
///
/// #[component_methods]
/// impl Service {
///     pub fn save(&self, id: String) -> anyhow::Result<String> { ... }
/// }
/// ```
pub trait Component: Any + Send + Sync + Sized {
    /// 组件类型名称
    const NAME: &'static str;

    /// 类型描述符：名称、父类型与注入字段
    fn descriptor() -> TypeDescriptor;

    /// 根据注入结果创建实例
    fn allocate(wiring: &Wiring) -> anyhow::Result<Self>;

    /// 作用域、延迟初始化与初始化回调
    fn configure(definition: ComponentDefinition) -> ComponentDefinition {
        definition
    }

    /// 完整的组件定义，包括所有 `#[component_methods]` 声明的方法
    fn definition() -> ComponentDefinition {
        let definition = Self::configure(ComponentDefinition::new(Self::descriptor(), Self::allocate));
        get_all_method_registrations()
            .filter(|registration| registration.component == Self::NAME)
            .fold(definition, |definition, registration| (registration.declare)(definition))
    }
}
