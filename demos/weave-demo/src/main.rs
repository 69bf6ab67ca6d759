use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use weft_aop::prelude::*;
use weft_core::prelude::*;
use weft_core::{Environment, EnvironmentPropertySource};

// ==================== 业务组件 ====================

#[derive(Debug, Error)]
#[error("order '{0}' does not exist")]
struct OrderNotFound(String);

#[derive(Component)]
#[component("shop.OrderRepository")]
struct OrderRepository;

#[component_methods]
impl OrderRepository {
    pub fn find(&self, id: String) -> Result<String, OrderNotFound> {
        if id.starts_with('x') {
            return Err(OrderNotFound(id));
        }
        Ok(format!("order {} (2 items)", id))
    }
}

#[derive(Component)]
#[component("shop.OrderService")]
struct OrderService {
    #[autowired("shop.OrderRepository")]
    repository: Arc<ComponentRef>,
}

#[component_methods]
impl OrderService {
    pub fn describe(&self, id: String) -> anyhow::Result<Value> {
        self.repository
            .invoke(Some(<Self as Component>::NAME), "find", &[value(id)])
    }
}

// ==================== 切面 ====================

struct Timing;

fn timing() -> AspectDefinition {
    AspectDefinition::new(TypeDescriptor::new("shop.Timing"), |_| Ok(Timing)).around(
        MethodDescriptor::advice("measure")
            .around("execution(* shop.*.*(..))")
            .privilege(1),
        |_: &Timing, jp| {
            let started = Instant::now();
            let result = jp.proceed();
            tracing::info!("{} took {:?}", jp.signature(), started.elapsed());
            result
        },
    )
}

#[derive(Component)]
#[component("shop.Audit")]
struct Audit;

#[aspect]
impl Audit {
    #[around("execution(* shop.OrderRepository.find(..)) && within(shop.OrderService)")]
    fn record(&self, jp: &JoinPoint<'_>) -> anyhow::Result<Value> {
        let id = jp
            .as_execution()
            .map(|pjp| pjp.arg::<String>(0))
            .transpose()?;
        tracing::info!("Audit: {} looks up {:?}", jp.signature(), id);
        jp.proceed()
    }
}

submit_aspect!("shop.Timing", timing);

fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().init()?;

    let env = Environment::new();
    env.add_property_source(Box::new(EnvironmentPropertySource::new("")));

    let container = WovenContainerBuilder::new()
        .environment(&env)
        .auto_register()?
        .build()?;
    tracing::info!("{}", container.summary());

    let service = container.get("shop.OrderService")?;
    let order = service.call("describe", &[value("42".to_string())])?;
    tracing::info!("Result: {:?}", order.downcast_ref::<String>());

    match service.call("describe", &[value("x-1".to_string())]) {
        Err(err) if err.downcast_ref::<OrderNotFound>().is_some() => tracing::warn!("Lookup failed: {}", err),
        other => tracing::error!("Unexpected result: {:?}", other.map(|_| ())),
    }

    let hooks = container.autowiring_by("execution(* %s.find(..))", &[&"shop.OrderRepository"])?;
    for (joint, hook) in &hooks {
        let direct = hook.invoke(&[value("7".to_string())])?;
        tracing::info!("Hook {} returned {:?}", joint, direct.downcast_ref::<String>());
    }

    Ok(())
}
