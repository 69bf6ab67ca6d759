//! 依赖注入容器
//!
//! 容器本身只负责作用域、循环依赖检测和按类型解析；
//! 组件如何被创建（是否经过代理）由可替换的 [`Instantiator`] 决定。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::Context;
use once_cell::sync::OnceCell;

use crate::component::{ComponentDefinition, Value, Wiring};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::TypeSet;
use crate::registry::ComponentRegistry;
use crate::utils::dependency::CreationTracker;
use crate::Scope;

/// 依赖提供者
pub trait Provider: Send + Sync {
    /// 获取实例，单例作用域返回同一个实例
    fn get(&self) -> anyhow::Result<Value>;

    /// 提供的组件类型名称
    fn type_name(&self) -> &str;
}

/// 按类型名称查找提供者
pub trait ProviderSource: Send + Sync {
    fn get_provider(&self, type_name: &str) -> ContainerResult<Arc<dyn Provider>>;
}

/// 方法分派
pub trait Dispatcher: Send + Sync {
    /// 在 `target` 上调用 `method`，`caller` 为调用方类型（未知时为 None）
    fn dispatch(
        &self,
        caller: Option<&str>,
        target: &Value,
        method: &str,
        args: &[Value],
    ) -> anyhow::Result<Value>;
}

/// 直接调用方法原始实现的分派器
pub struct DirectDispatcher {
    definition: Arc<ComponentDefinition>,
}

impl DirectDispatcher {
    pub fn new(definition: Arc<ComponentDefinition>) -> Self {
        Self { definition }
    }
}

impl Dispatcher for DirectDispatcher {
    fn dispatch(
        &self,
        _caller: Option<&str>,
        target: &Value,
        method: &str,
        args: &[Value],
    ) -> anyhow::Result<Value> {
        let body = self
            .definition
            .method_body(method)
            .ok_or_else(|| ContainerError::MethodNotFound {
                component: self.definition.name().to_string(),
                method: method.to_string(),
            })?;
        body(target, args)
    }
}

/// 组件句柄
///
/// 所有对组件方法的调用都经过句柄中的分派器，织入后的组件由此进入拦截链
pub struct ComponentRef {
    type_name: String,
    target: Value,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ComponentRef {
    pub fn new(type_name: impl Into<String>, target: Value, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            type_name: type_name.into(),
            target,
            dispatcher,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 原始实例
    pub fn target_value(&self) -> &Value {
        &self.target
    }

    /// 原始实例的具体类型
    pub fn target<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        Arc::clone(&self.target)
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch(std::any::type_name::<T>().to_string()))
    }

    /// 以 `caller` 的身份调用方法
    pub fn invoke(&self, caller: Option<&str>, method: &str, args: &[Value]) -> anyhow::Result<Value> {
        tracing::trace!("Invoking {}.{} from {:?}", self.type_name, method, caller);
        self.dispatcher.dispatch(caller, &self.target, method, args)
    }

    /// 调用方未知时调用方法
    pub fn call(&self, method: &str, args: &[Value]) -> anyhow::Result<Value> {
        self.invoke(None, method, args)
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// 实例化策略
pub trait Instantiator: Send + Sync {
    fn instantiate(
        &self,
        definition: &Arc<ComponentDefinition>,
        providers: &dyn ProviderSource,
    ) -> anyhow::Result<ComponentRef>;
}

/// 默认实例化策略：注入字段 -> 分配 -> 初始化，方法直接分派
#[derive(Debug, Default)]
pub struct PlainInstantiator;

impl Instantiator for PlainInstantiator {
    fn instantiate(
        &self,
        definition: &Arc<ComponentDefinition>,
        providers: &dyn ProviderSource,
    ) -> anyhow::Result<ComponentRef> {
        let mut wiring = Wiring::new();
        for field in definition.injection_points() {
            let provider = providers.get_provider(&field.field_type)?;
            wiring.insert(field.name.clone(), provider.get()?);
        }

        let target = (definition.allocator())(&wiring)?;
        if let Some(init) = definition.initializer() {
            init(&target)?;
        }

        Ok(ComponentRef::new(
            definition.name(),
            target,
            Arc::new(DirectDispatcher::new(Arc::clone(definition))),
        ))
    }
}

/// 容器内组件的提供者
///
/// 只持有容器的弱引用，容器释放后调用返回 [`ContainerError::ContainerDropped`]
struct ContainerProvider {
    container: Weak<Container>,
    name: String,
}

impl Provider for ContainerProvider {
    fn get(&self) -> anyhow::Result<Value> {
        let container = self.container.upgrade().ok_or(ContainerError::ContainerDropped)?;
        let component = container.get(&self.name)?;
        Ok(component as Value)
    }

    fn type_name(&self) -> &str {
        &self.name
    }
}

/// 依赖注入容器
pub struct Container {
    registry: ComponentRegistry,
    types: TypeSet,
    singletons: HashMap<String, OnceCell<Arc<ComponentRef>>>,
    creation_tracker: CreationTracker,
    instantiator: OnceCell<Arc<dyn Instantiator>>,
    self_ref: Weak<Container>,
}

impl Container {
    /// 使用默认实例化策略创建容器
    pub fn new(registry: ComponentRegistry) -> Arc<Self> {
        let container = Self::empty(registry);
        let _ = container.instantiator.set(Arc::new(PlainInstantiator));
        container
    }

    /// 创建容器，实例化策略由 `factory` 根据容器本身构建
    ///
    /// `factory` 可以通过 [`ProviderSource`] 获取提供者，但不能在其中请求组件
    pub fn with_instantiator<F, E>(registry: ComponentRegistry, factory: F) -> Result<Arc<Self>, E>
    where
        F: FnOnce(&Arc<Self>) -> Result<Arc<dyn Instantiator>, E>,
        E: From<ContainerError>,
    {
        let container = Self::empty(registry);
        let instantiator = factory(&container)?;
        container
            .instantiator
            .set(instantiator)
            .map_err(|_| ContainerError::AlreadyInitialized)?;
        Ok(container)
    }

    fn empty(registry: ComponentRegistry) -> Arc<Self> {
        let types = registry.type_set();
        let singletons = registry
            .iter()
            .filter(|d| d.scope() == Scope::Singleton)
            .map(|d| (d.name().to_string(), OnceCell::new()))
            .collect();

        Arc::new_cyclic(|self_ref| Self {
            registry,
            types,
            singletons,
            creation_tracker: CreationTracker::new(),
            instantiator: OnceCell::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// 所有已注册组件的类型集合
    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// 把类型名称解析为组件名称
    pub fn resolve_name(&self, type_name: &str) -> ContainerResult<&str> {
        self.registry
            .resolve(&self.types, type_name)
            .map(|definition| definition.name())
    }

    /// 获取组件
    pub fn get(&self, type_name: &str) -> anyhow::Result<Arc<ComponentRef>> {
        let definition = Arc::clone(self.registry.resolve(&self.types, type_name)?);
        let name = definition.name();

        match definition.scope() {
            Scope::Singleton => {
                let cell = self
                    .singletons
                    .get(name)
                    .ok_or_else(|| ContainerError::ComponentNotFound(name.to_string()))?;
                if let Some(component) = cell.get() {
                    tracing::trace!("Returning cached instance of singleton '{}'", name);
                    return Ok(Arc::clone(component));
                }
                // 先检查循环依赖，再进入 OnceCell，避免同一线程重入初始化
                let _guard = self.enter_creation(name)?;
                let component = cell.get_or_try_init(|| {
                    tracing::debug!("Creating shared instance of singleton '{}'", name);
                    self.create(&definition).map(Arc::new)
                })?;
                Ok(Arc::clone(component))
            }
            Scope::Prototype => {
                let _guard = self.enter_creation(name)?;
                tracing::debug!("Creating new instance of prototype '{}'", name);
                self.create(&definition).map(Arc::new)
            }
        }
    }

    /// 获取组件的原始实例
    pub fn get_typed<T: Any + Send + Sync>(&self, type_name: &str) -> anyhow::Result<Arc<T>> {
        Ok(self.get(type_name)?.target::<T>()?)
    }

    /// 预先创建所有非延迟的单例
    pub fn initialize(&self) -> anyhow::Result<()> {
        let eager: Vec<String> = self
            .registry
            .iter()
            .filter(|d| d.scope() == Scope::Singleton && !d.is_lazy())
            .map(|d| d.name().to_string())
            .collect();

        tracing::info!("Pre-instantiating {} singleton(s)", eager.len());
        for name in &eager {
            self.get(name)?;
        }
        Ok(())
    }

    fn create(&self, definition: &Arc<ComponentDefinition>) -> anyhow::Result<ComponentRef> {
        let instantiator = self
            .instantiator
            .get()
            .ok_or(ContainerError::InstantiatorMissing)?;
        instantiator
            .instantiate(definition, self)
            .with_context(|| format!("failed to create component '{}'", definition.name()))
    }

    fn enter_creation(&self, name: &str) -> ContainerResult<CreationGuard<'_>> {
        self.creation_tracker
            .start_creating(name)
            .map_err(|cycle| ContainerError::CircularDependency(cycle.join(" -> ")))?;
        Ok(CreationGuard {
            tracker: &self.creation_tracker,
            name: name.to_string(),
        })
    }
}

impl ProviderSource for Container {
    fn get_provider(&self, type_name: &str) -> ContainerResult<Arc<dyn Provider>> {
        let name = self.resolve_name(type_name)?;
        Ok(Arc::new(ContainerProvider {
            container: self.self_ref.clone(),
            name: name.to_string(),
        }))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("components", &self.registry.len())
            .field("initialized", &self.instantiator.get().is_some())
            .finish()
    }
}

// 使用 RAII 模式确保在任何情况下都会清理标记
struct CreationGuard<'a> {
    tracker: &'a CreationTracker,
    name: String,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_creating(&self.name);
    }
}
