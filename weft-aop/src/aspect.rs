//! 切面（Aspect）定义
//!
//! 切面本身也是容器中的组件：通知方法在描述符中声明（带 `@Around`），
//! 实现则保存在 [`AspectCatalog`] 中，织入时按 `(切面类型, 方法名)` 取出。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_core::utils::values::downcast_value;
use weft_core::{constants, Annotation, ComponentDefinition, FieldDescriptor, MethodDescriptor, Scope, TypeDescriptor, Value, Wiring};

use crate::advice::AdviceFn;
use crate::joinpoint::JoinPoint;

/// 切面定义
pub struct AspectDefinition {
    component: ComponentDefinition,
    advices: HashMap<String, AdviceFn>,
}

fn mark_aspect(descriptor: TypeDescriptor) -> TypeDescriptor {
    if descriptor.is_aspect() {
        descriptor
    } else {
        descriptor.annotate(Annotation::new(constants::ASPECT_ANNOTATION))
    }
}

impl AspectDefinition {
    /// 创建切面，描述符缺少 `@Aspect` 时自动补上
    pub fn new<T, F>(descriptor: TypeDescriptor, allocator: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Wiring) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self {
            component: ComponentDefinition::new(mark_aspect(descriptor), allocator),
            advices: HashMap::new(),
        }
    }

    /// 已经存在的实例作为切面
    pub fn instance<T: Any + Send + Sync>(descriptor: TypeDescriptor, instance: Arc<T>) -> Self {
        Self {
            component: ComponentDefinition::instance(mark_aspect(descriptor), instance),
            advices: HashMap::new(),
        }
    }

    /// 由已有的组件定义（例如 `#[derive(Component)]` 生成的）创建切面
    pub fn from_component(component: ComponentDefinition) -> Self {
        let component = if component.descriptor().is_aspect() {
            component
        } else {
            component.annotate(Annotation::new(constants::ASPECT_ANNOTATION))
        };
        Self {
            component,
            advices: HashMap::new(),
        }
    }

    /// 切面级别的优先级，通知方法没有 `@Privilege` 时使用
    pub fn privilege(mut self, level: i32) -> Self {
        self.component = self
            .component
            .annotate(Annotation::new(constants::PRIVILEGE_ANNOTATION).with_value(level.to_string()));
        self
    }

    /// 声明一个通知方法及其实现
    ///
    /// `method` 通常由 [`MethodDescriptor::advice`] 创建并带有一个或多个 `@Around`
    pub fn around<A, F>(mut self, method: MethodDescriptor, body: F) -> Self
    where
        A: Any + Send + Sync,
        F: Fn(&A, &JoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let body: AdviceFn = Arc::new(move |aspect: &Value, jp: &JoinPoint<'_>| {
            let aspect = downcast_value::<A>(aspect)?;
            body(aspect.as_ref(), jp)
        });
        self.advices.insert(method.name.clone(), body);
        self.component = self.component.declare_method(method);
        self
    }

    /// 切面自身的注入字段
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.component = self.component.with_field(field);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.component = self.component.with_scope(scope);
        self
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn into_parts(self) -> (ComponentDefinition, HashMap<String, AdviceFn>) {
        (self.component, self.advices)
    }
}

impl fmt::Debug for AspectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut advices: Vec<&String> = self.advices.keys().collect();
        advices.sort();
        f.debug_struct("AspectDefinition")
            .field("name", &self.component.name())
            .field("advices", &advices)
            .finish()
    }
}

/// 切面类型 -> 通知方法名 -> 实现
#[derive(Default)]
pub struct AspectCatalog {
    bodies: HashMap<String, HashMap<String, AdviceFn>>,
}

impl AspectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, aspect: impl Into<String>, advices: HashMap<String, AdviceFn>) {
        self.bodies.entry(aspect.into()).or_default().extend(advices);
    }

    pub fn body(&self, aspect: &str, method: &str) -> Option<&AdviceFn> {
        self.bodies.get(aspect)?.get(method)
    }

    pub fn contains(&self, aspect: &str) -> bool {
        self.bodies.contains_key(aspect)
    }

    /// 切面个数
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl fmt::Debug for AspectCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut aspects: Vec<&String> = self.bodies.keys().collect();
        aspects.sort();
        f.debug_struct("AspectCatalog").field("aspects", &aspects).finish()
    }
}

/// 切面注册器
///
/// 用于 inventory 自动收集切面，与组件的 `ComponentRegistration` 对应
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面定义的函数
    pub create: fn() -> AspectDefinition,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, create: fn() -> AspectDefinition) -> Self {
        Self { name, create }
    }

    pub fn definition(&self) -> AspectDefinition {
        (self.create)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::utils::values::value;

    struct Audit {
        prefix: &'static str,
    }

    fn audit() -> AspectDefinition {
        AspectDefinition::new(TypeDescriptor::new("com.acme.Audit"), |_| Ok(Audit { prefix: "audit" }))
            .around(
                MethodDescriptor::advice("record").around("execution(* save(..))"),
                |this: &Audit, jp| Ok(value(format!("{}:{}", this.prefix, jp.name()))),
            )
    }

    #[test]
    fn test_aspect_is_marked_and_declared() {
        let (component, advices) = audit().into_parts();
        assert!(component.descriptor().is_aspect());
        assert!(component.method_body("record").is_none());
        let record = component.descriptor().find_method("record").unwrap();
        assert!(record.has_annotation(constants::AROUND_ANNOTATION));
        assert!(advices.contains_key("record"));
    }

    #[test]
    fn test_existing_annotation_is_kept() {
        let descriptor = TypeDescriptor::new("com.acme.Marked").annotate(Annotation::new(constants::ASPECT_ANNOTATION));
        let (component, _) = AspectDefinition::instance(descriptor, Arc::new(())).into_parts();
        assert_eq!(component.descriptor().annotations_of(constants::ASPECT_ANNOTATION).count(), 1);
    }

    #[test]
    fn test_catalog_lookup() {
        let definition = audit();
        let name = definition.name().to_string();
        let (_, advices) = definition.into_parts();

        let mut catalog = AspectCatalog::new();
        catalog.insert(name, advices);
        assert!(catalog.contains("com.acme.Audit"));
        assert!(catalog.body("com.acme.Audit", "record").is_some());
        assert!(catalog.body("com.acme.Audit", "missing").is_none());
        assert_eq!(catalog.len(), 1);
    }
}
