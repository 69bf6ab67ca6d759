//! 组件注册表
//!
//! 保存所有组件定义，并提供候选类型集合给织入层

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{get_all_component_registrations, ComponentDefinition};
use crate::error::{ContainerError, ContainerResult};
use crate::metadata::TypeSet;

/// 组件注册表
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    definitions: Vec<Arc<ComponentDefinition>>,
    index: HashMap<String, usize>,
}

impl ComponentRegistry {
    /// 创建新的组件注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册组件
    pub fn register(&mut self, mut definition: ComponentDefinition) -> ContainerResult<()> {
        definition.validate()?;
        let name = definition.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ContainerError::DuplicateComponent(name));
        }
        tracing::debug!("Registering component: {} ({:?})", name, definition.scope());
        self.index.insert(name, self.definitions.len());
        self.definitions.push(Arc::new(definition));
        Ok(())
    }

    /// 从 inventory 自动加载所有注册的组件
    pub fn auto_register(&mut self) -> ContainerResult<usize> {
        let mut count = 0;
        for registration in get_all_component_registrations() {
            tracing::debug!("  ├─ Loading component: {}", registration.name);
            self.register((registration.create)())?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ComponentDefinition>> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ComponentDefinition>> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// 候选类型集合，顺序与注册顺序一致
    pub fn type_set(&self) -> TypeSet {
        let mut types = TypeSet::new();
        for definition in &self.definitions {
            types.insert(Arc::new(definition.descriptor().clone()));
        }
        types
    }

    /// 按类型名解析组件：先精确匹配，再在子类型中查找唯一候选
    pub fn resolve(&self, types: &TypeSet, type_name: &str) -> ContainerResult<&Arc<ComponentDefinition>> {
        if let Some(definition) = self.get(type_name) {
            return Ok(definition);
        }

        let candidates: Vec<&Arc<ComponentDefinition>> = types
            .assignable_to(type_name)
            .into_iter()
            .filter_map(|t| self.get(&t.name))
            .collect();

        match candidates.as_slice() {
            [] => Err(ContainerError::ComponentNotFound(type_name.to_string())),
            [single] => Ok(single),
            many => Err(ContainerError::AmbiguousComponent {
                requested: type_name.to_string(),
                candidates: many.iter().map(|d| d.name().to_string()).collect(),
            }),
        }
    }
}
