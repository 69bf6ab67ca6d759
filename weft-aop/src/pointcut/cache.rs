//! 切点缓存
//!
//! 以表达式原文为键，同一表达式只解析一次。缓存由织入上下文持有，随上下文一起释放。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{parse, Pointcut};
use crate::error::AopResult;

#[derive(Debug, Default)]
pub struct PointcutCache {
    entries: RwLock<HashMap<String, Arc<Pointcut>>>,
}

impl PointcutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已解析的切点，不存在时解析并缓存
    ///
    /// 解析在锁外进行；并发解析同一表达式时保留先写入的结果
    pub fn get_or_parse(&self, expression: &str) -> AopResult<Arc<Pointcut>> {
        if let Some(pointcut) = self.entries.read().get(expression) {
            tracing::trace!("Pointcut cache hit: {}", expression);
            return Ok(Arc::clone(pointcut));
        }

        let parsed = parse(expression)?;
        tracing::debug!("Parsed pointcut: {} -> {}", expression, parsed);

        let mut entries = self.entries.write();
        let pointcut = entries.entry(expression.to_string()).or_insert(parsed);
        Ok(Arc::clone(pointcut))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
