//! 单元测试共用的构造函数

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use weft_core::{Provider, Value};

use crate::advice::{AdviceDescriptor, AdviceFn};
use crate::joinpoint::JoinPoint;
use crate::pointcut::parse;

/// 总是返回同一个值的提供者
pub(crate) struct FixedProvider {
    type_name: String,
    value: Value,
}

impl FixedProvider {
    pub(crate) fn new(type_name: &str, value: Value) -> Self {
        Self {
            type_name: type_name.to_string(),
            value,
        }
    }
}

impl Provider for FixedProvider {
    fn get(&self) -> anyhow::Result<Value> {
        Ok(Arc::clone(&self.value))
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// 不依赖切面实例的通知
pub(crate) fn advice<F>(name: &str, expression: &str, privilege: i32, body: F) -> Arc<AdviceDescriptor>
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    let pointcut = parse(expression).unwrap();
    let body: AdviceFn = Arc::new(move |_: &Value, jp: &JoinPoint<'_>| body(jp));
    Arc::new(AdviceDescriptor::new(
        "test.Aspect",
        name,
        pointcut,
        Arc::new(FixedProvider::new("test.Aspect", Arc::new(()))),
        body,
        privilege,
    ))
}

struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 在当前线程上运行 `f`，返回其结果与期间输出的 WARN 及以上日志
pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || LogBuffer(Arc::clone(&sink)))
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
    (result, output)
}
