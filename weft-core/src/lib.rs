// weft-core: 组件元数据与依赖注入容器
//
// 为织入层提供：
// - 组件描述符（类型、方法、字段、修饰符、注解）
// - 组件注册表与按类型解析
// - 单例 / 原型作用域、循环依赖检测
// - 可替换的实例化策略与方法分派
// - 配置与日志

// 宏展开使用 `::weft_core` 路径，本 crate 的测试也需要
extern crate self as weft_core;

pub mod component;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod registry;
pub mod scope;
pub mod utils;

// 重新导出常用类型
pub use component::{
    get_all_component_registrations, get_all_method_registrations, Allocator, Component,
    ComponentDefinition, ComponentRegistration, Initializer, MethodBody, MethodRegistration, Value,
    Wiring,
};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use container::{
    ComponentRef, Container, DirectDispatcher, Dispatcher, Instantiator, PlainInstantiator,
    Provider, ProviderSource,
};
pub use error::{ContainerError, ContainerResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig, LOG_ENV, LOG_FORMAT_ENV};
pub use metadata::{
    Annotation, FieldDescriptor, MethodDescriptor, MethodKind, Modifiers, TypeDescriptor, TypeSet,
};
pub use registry::ComponentRegistry;
pub use scope::Scope;

// 过程宏
pub use weft_core_macros::{component_methods, Component};

// 导出 inventory，供组件与切面的静态注册使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::component::{ComponentDefinition, Value, Wiring};
    pub use crate::{component_methods, Component};
    pub use crate::container::{ComponentRef, Container, Provider, ProviderSource};
    pub use crate::error::{ContainerError, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::metadata::{
        Annotation, FieldDescriptor, MethodDescriptor, Modifiers, TypeDescriptor,
    };
    pub use crate::registry::ComponentRegistry;
    pub use crate::scope::Scope;
    pub use crate::utils::values::{downcast_value, unit, value};
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
