//! 统一的错误处理类型
//!
//! 结构性错误（重复注册、找不到组件、循环依赖等）使用 [`ContainerError`]；
//! 组件创建与方法调用过程中用户代码抛出的错误统一使用 `anyhow::Error`，
//! 通过 `.context()` 添加上下文，原始错误可以通过 `downcast_ref` 取回。

use thiserror::Error;

pub use anyhow::Result;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 组件未注册
    #[error("component '{0}' is not registered")]
    ComponentNotFound(String),

    /// 组件重复注册
    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    /// 按类型查找时存在多个候选
    #[error("component type '{requested}' is ambiguous, candidates: {}", .candidates.join(", "))]
    AmbiguousComponent {
        requested: String,
        candidates: Vec<String>,
    },

    /// 组件声明了多个作用域注解
    #[error("component '{0}' declares more than one scope annotation")]
    DuplicateScope(String),

    /// 无法识别的作用域
    #[error("component '{component}' declares unknown scope '{scope}'")]
    UnknownScope { component: String, scope: String },

    /// 组件元数据违反约定
    #[error("contract violation in '{component}': {reason}")]
    ContractViolation { component: String, reason: String },

    /// 循环依赖
    #[error("circular dependency detected: {0}")]
    CircularDependency(String),

    /// 方法不存在
    #[error("component '{component}' has no method '{method}'")]
    MethodNotFound { component: String, method: String },

    /// 方法调用的参数个数不符
    #[error("method '{method}' expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// 注入点尚未装配
    #[error("field '{0}' was not wired")]
    FieldNotWired(String),

    /// 值的类型与期望不符
    #[error("value is not of type '{0}'")]
    TypeMismatch(String),

    /// 容器已被释放
    #[error("container has been dropped")]
    ContainerDropped,

    /// 容器已完成初始化，不能重复安装实例化策略
    #[error("container instantiator is already installed")]
    AlreadyInitialized,

    /// 实例化策略尚未安装（例如在织入过程中请求组件）
    #[error("container instantiator is not installed yet")]
    InstantiatorMissing,

    /// 日志初始化失败
    #[error("failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 配置读取失败
    #[error("failed to load configuration: {0}")]
    Config(String),
}

/// 容器结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;
