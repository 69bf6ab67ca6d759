//! 织入层错误类型
//!
//! 织入阶段的错误（语法错误、契约违反、空通知）在容器构建时立即返回；
//! 调用阶段由通知或原始方法产生的错误不经过这里，原样以 `anyhow::Error` 传播。

use thiserror::Error;
use weft_core::ContainerError;

/// 切点表达式语法错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position} in pointcut '{expression}'")]
pub struct PointcutSyntaxError {
    /// 出错的表达式
    pub expression: String,

    /// 错误描述
    pub message: String,

    /// 出错位置（字符偏移）
    pub position: usize,
}

impl PointcutSyntaxError {
    pub fn new(expression: impl Into<String>, message: impl Into<String>, position: usize) -> Self {
        Self {
            expression: expression.into(),
            message: message.into(),
            position,
        }
    }
}

/// 织入错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 切点表达式语法错误
    #[error(transparent)]
    Syntax(#[from] PointcutSyntaxError),

    /// 执行域与注入域的切点被普通 AND / OR / NOT 组合
    #[error("divergent crosscut: {0}")]
    DivergentCrosscut(String),

    /// 通知声明的切点无效
    #[error("invalid advice '{advice}': {source}")]
    InvalidAdvice {
        advice: String,
        #[source]
        source: Box<AopError>,
    },

    /// 通知方法的形状不符合约定
    #[error("illegal advice '{advice}': {reason}")]
    IllegalAdvice { advice: String, reason: String },

    /// 通知没有匹配任何连接点（仅在配置要求时作为错误）
    #[error("dummy advice '{0}' matches no join point")]
    DummyAdvice(String),

    /// 切点模板格式化失败
    #[error("invalid pointcut template '{template}': {reason}")]
    Template { template: String, reason: String },

    /// 容器错误
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// 组件创建过程中的错误
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl AopError {
    /// 是否为契约违反
    pub fn is_contract_violation(&self) -> bool {
        match self {
            AopError::DivergentCrosscut(_)
            | AopError::IllegalAdvice { .. }
            | AopError::DummyAdvice(_)
            | AopError::Container(ContainerError::DuplicateComponent(_))
            | AopError::Container(ContainerError::DuplicateScope(_))
            | AopError::Container(ContainerError::ContractViolation { .. }) => true,
            AopError::InvalidAdvice { source, .. } => source.is_contract_violation(),
            _ => false,
        }
    }
}

/// 织入结果类型
pub type AopResult<T> = std::result::Result<T, AopError>;
