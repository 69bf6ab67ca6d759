//! 织入容器
//!
//! 在 `weft_core::Container` 之上安装 [`WeavingInstantiator`]：容器构建时
//! 分类通知、匹配连接点、生成分派表，然后关闭织入层并预先创建单例。
//!
//! ```ignore
//! let container = WovenContainerBuilder::new()
//!     .component(repository())?
//!     .component(service())?
//!     .aspect(audit())?
//!     .build()?;
//!
//! let service = container.get("com.acme.Service")?;
//! service.call("save", &[value("order-1".to_string())])?;
//! ```

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;

use weft_core::{
    get_all_component_registrations, ComponentDefinition, ComponentRef, ComponentRegistry, Container,
    Environment, Instantiator,
};

use crate::aspect::{get_all_aspect_registrations, AspectCatalog, AspectDefinition};
use crate::classifier::AdviceClassifier;
use crate::config::AopConfig;
use crate::error::AopResult;
use crate::hook::{format_template, AutowiringHook};
use crate::joinpoint::{FieldJoint, Joint, MethodJoint};
use crate::layer::{is_interceptable, AdvisementLayer, WeaveSummary};
use crate::pointcut::PointcutCache;
use crate::proxy::{ProxyFactory, ProxyTable, WeavingInstantiator};

/// 织入容器构建器
#[derive(Debug)]
pub struct WovenContainerBuilder {
    registry: ComponentRegistry,
    catalog: AspectCatalog,
    config: AopConfig,
}

impl WovenContainerBuilder {
    pub fn new() -> Self {
        Self {
            registry: ComponentRegistry::new(),
            catalog: AspectCatalog::new(),
            config: AopConfig::default(),
        }
    }

    /// 注册组件
    pub fn component(mut self, definition: ComponentDefinition) -> AopResult<Self> {
        self.registry.register(definition)?;
        Ok(self)
    }

    /// 注册切面，切面同时作为组件注册
    pub fn aspect(mut self, aspect: AspectDefinition) -> AopResult<Self> {
        let (component, advices) = aspect.into_parts();
        let name = component.name().to_string();
        self.registry.register(component)?;
        tracing::debug!("Registered aspect {} with {} advice(s)", name, advices.len());
        self.catalog.insert(name, advices);
        Ok(self)
    }

    pub fn config(mut self, config: AopConfig) -> Self {
        self.config = config;
        self
    }

    /// 从环境读取织入配置
    pub fn environment(mut self, env: &Environment) -> Self {
        self.config = AopConfig::from_environment(env);
        self
    }

    /// 加入所有通过 inventory 提交的组件与切面
    ///
    /// 同名的组件注册与切面注册只按切面加载一次
    pub fn auto_register(mut self) -> AopResult<Self> {
        let aspects: Vec<_> = get_all_aspect_registrations().collect();
        let components: Vec<_> = get_all_component_registrations()
            .filter(|registration| !aspects.iter().any(|aspect| aspect.name == registration.name))
            .collect();
        tracing::info!("Auto-registering {} component(s)", components.len());
        for registration in components {
            tracing::debug!("  ├─ Loading component: {}", registration.name);
            self = self.component((registration.create)())?;
        }

        tracing::info!("Auto-loading {} aspect(s)", aspects.len());
        for registration in aspects {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            self = self.aspect(registration.definition())?;
        }
        Ok(self)
    }

    /// 织入并创建容器，织入阶段的任何错误都会中止构建
    pub fn build(self) -> AopResult<WovenContainer> {
        let Self {
            registry,
            catalog,
            config,
        } = self;

        let cache = PointcutCache::new();
        let mut woven: Option<(AdvisementLayer, Arc<ProxyTable>)> = None;

        let container = Container::with_instantiator(registry, |container| -> AopResult<Arc<dyn Instantiator>> {
            let types = Arc::new(container.types().clone());
            let advices = if config.enabled {
                AdviceClassifier::new(&cache, &catalog).classify(&types, &**container)?
            } else {
                Vec::new()
            };

            let layer = AdvisementLayer::weave(types, &advices, &config)?;
            let table = Arc::new(ProxyFactory::synthesize(
                &layer,
                container.registry(),
                &**container,
                config.trace_dispatch,
            )?);
            woven = Some((layer, Arc::clone(&table)));
            Ok(Arc::new(WeavingInstantiator::new(table)))
        })?;

        let (mut layer, table) = woven.ok_or(weft_core::ContainerError::InstantiatorMissing)?;
        layer.close();
        let summary = layer.summary().clone();

        container.initialize()?;
        tracing::info!("Woven container is ready: {}", summary);

        Ok(WovenContainer {
            container,
            layer,
            table,
            cache,
            summary,
        })
    }
}

impl Default for WovenContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 织入后的容器
pub struct WovenContainer {
    container: Arc<Container>,
    layer: AdvisementLayer,
    table: Arc<ProxyTable>,
    cache: PointcutCache,
    summary: WeaveSummary,
}

impl WovenContainer {
    pub fn builder() -> WovenContainerBuilder {
        WovenContainerBuilder::new()
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn summary(&self) -> &WeaveSummary {
        &self.summary
    }

    /// 获取组件句柄，方法调用经过代理
    pub fn get(&self, type_name: &str) -> anyhow::Result<Arc<ComponentRef>> {
        self.container.get(type_name)
    }

    /// 获取组件的原始实例
    pub fn get_typed<T: Any + Send + Sync>(&self, type_name: &str) -> anyhow::Result<Arc<T>> {
        self.container.get_typed::<T>(type_name)
    }

    pub fn is_aspect(&self, type_name: &str) -> bool {
        self.layer.is_aspect(type_name)
    }

    pub fn is_proxy(&self, type_name: &str) -> bool {
        self.layer.is_proxy(type_name)
    }

    pub fn is_init_proxy(&self, type_name: &str) -> bool {
        self.layer.is_init_proxy(type_name)
    }

    pub fn is_new_proxy(&self, type_name: &str) -> bool {
        self.layer.is_new_proxy(type_name)
    }

    pub fn is_wire_proxy(&self, type_name: &str) -> bool {
        self.layer.is_wire_proxy(type_name)
    }

    /// 类型的注入点：字段名 -> 字段
    pub fn get_autowiring(&self, type_name: &str) -> BTreeMap<String, FieldJoint> {
        self.layer.get_autowiring(type_name)
    }

    /// 用模板生成切点，为每个匹配的连接点返回钩子
    ///
    /// 切面类型不参与匹配。钩子调用时没有调用方，方法连接点按没有调用方的
    /// 调用时语义确定匹配：非平凡的 `within` 不成立，`!within(..)` 成立。
    pub fn autowiring_by(&self, template: &str, args: &[&dyn Display]) -> AopResult<HashMap<Joint, AutowiringHook>> {
        let expression = format_template(template, args)?;
        let pointcut = self.cache.get_or_parse(&expression)?;
        let types = self.layer.types();

        let mut hooks = HashMap::new();
        for declaring in types.iter().filter(|t| !t.is_aspect()) {
            if pointcut.is_execution() {
                for (index, method) in declaring.methods.iter().enumerate() {
                    if method.is_constructor() || !is_interceptable(method) {
                        continue;
                    }
                    let joint = MethodJoint::new(Arc::clone(declaring), index);
                    if pointcut.matches_method(types, None, &joint) {
                        let hook = AutowiringHook::for_method(Arc::downgrade(&self.container), &joint);
                        hooks.insert(Joint::Method(joint), hook);
                    }
                }
            }

            if pointcut.is_autowire() {
                for (index, field) in declaring.fields.iter().enumerate() {
                    if !field.is_injection_point() {
                        continue;
                    }
                    let joint = FieldJoint::new(Arc::clone(declaring), index);
                    if pointcut.matches_field(types, &joint) {
                        let chain = self
                            .table
                            .get(&declaring.name)
                            .and_then(|proxy| proxy.wire_chain(&field.name))
                            .cloned();
                        let hook = AutowiringHook::for_field(Arc::downgrade(&self.container), &joint, chain);
                        hooks.insert(Joint::Field(joint), hook);
                    }
                }
            }
        }

        tracing::debug!("Pointcut '{}' produced {} hook(s)", expression, hooks.len());
        Ok(hooks)
    }
}

impl std::fmt::Debug for WovenContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WovenContainer")
            .field("container", &self.container)
            .field("summary", &self.summary)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use thiserror::Error;
    use weft_core::utils::values::{downcast_value, value};
    use weft_core::{ContainerError, DirectDispatcher, FieldDescriptor, MethodDescriptor, TypeDescriptor, Value};

    use crate::error::AopError;

    #[derive(Debug, Error, PartialEq)]
    #[error("record '{0}' not found")]
    struct NotFound(String);

    struct Repository;

    fn find(args: &[Value], prefix: &str) -> anyhow::Result<Value> {
        let id = downcast_value::<String>(args.first().ok_or_else(|| anyhow::anyhow!("missing id"))?)?;
        if id.as_str() == "missing" {
            return Err(NotFound(id.to_string()).into());
        }
        Ok(value(format!("{}:{}", prefix, id)))
    }

    fn repository() -> ComponentDefinition {
        ComponentDefinition::new(TypeDescriptor::new("com.acme.Repository"), |_| Ok(Repository)).with_method(
            MethodDescriptor::new("find").returns("String").param("String"),
            |_: &Repository, args: &[Value]| find(args, "record"),
        )
    }

    /// 不在容器中注册的替身，由注入通知直接返回
    fn stub_repository() -> ComponentRef {
        let definition = ComponentDefinition::new(TypeDescriptor::new("com.acme.StubRepository"), |_| Ok(Repository))
            .with_method(
                MethodDescriptor::new("find").returns("String").param("String"),
                |_: &Repository, args: &[Value]| find(args, "stub"),
            );
        ComponentRef::new(
            "com.acme.StubRepository",
            value(Repository),
            Arc::new(DirectDispatcher::new(Arc::new(definition))),
        )
    }

    struct Service {
        repo: Arc<ComponentRef>,
    }

    fn service() -> ComponentDefinition {
        ComponentDefinition::new(TypeDescriptor::new("com.acme.Service"), |wiring| {
            Ok(Service {
                repo: wiring.component("repo")?,
            })
        })
        .with_field(FieldDescriptor::new("repo", "com.acme.Repository"))
        .with_method(
            MethodDescriptor::new("save").returns("String").param("String"),
            |this: &Service, args: &[Value]| this.repo.invoke(Some("com.acme.Service"), "find", args),
        )
    }

    struct Client {
        name: &'static str,
        service: Arc<ComponentRef>,
    }

    fn client(name: &'static str) -> ComponentDefinition {
        ComponentDefinition::new(TypeDescriptor::new(name), move |wiring| {
            Ok(Client {
                name,
                service: wiring.component("service")?,
            })
        })
        .with_field(FieldDescriptor::new("service", "com.acme.Service"))
        .with_method(
            MethodDescriptor::new("run").returns("String").param("String"),
            |this: &Client, args: &[Value]| this.service.invoke(Some(this.name), "save", args),
        )
    }

    struct Plain;

    fn plain() -> ComponentDefinition {
        ComponentDefinition::new(TypeDescriptor::new("com.acme.Plain"), |_| Ok(Plain))
            .with_method(MethodDescriptor::new("ping").returns("String"), |_: &Plain, _: &[Value]| {
                Ok(value("pong".to_string()))
            })
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Audit {
        log: Log,
    }

    fn audit(log: &Log, expression: &str) -> AspectDefinition {
        AspectDefinition::instance(TypeDescriptor::new("com.acme.Audit"), Arc::new(Audit { log: Arc::clone(log) }))
            .around(MethodDescriptor::advice("record").around(expression), |this: &Audit, jp| {
                this.log.lock().push(format!("record:{}", jp.name()));
                jp.proceed()
            })
    }

    fn tracing_aspect(log: &Log) -> AspectDefinition {
        let around = |tag: &'static str| {
            move |this: &Audit, jp: &crate::joinpoint::JoinPoint<'_>| -> anyhow::Result<Value> {
                this.log.lock().push(format!("{}:before", tag));
                let result = jp.proceed();
                this.log.lock().push(format!("{}:after", tag));
                result
            }
        };
        let pointcut = "execution(* com.acme.Repository.find(..))";
        AspectDefinition::instance(TypeDescriptor::new("com.acme.Tracing"), Arc::new(Audit { log: Arc::clone(log) }))
            .around(MethodDescriptor::advice("inner").around(pointcut).privilege(5), around("inner"))
            .around(MethodDescriptor::advice("outer").around(pointcut).privilege(1), around("outer"))
    }

    struct Mocking;

    fn mocking() -> AspectDefinition {
        AspectDefinition::instance(TypeDescriptor::new("com.acme.Mocking"), Arc::new(Mocking)).around(
            MethodDescriptor::advice("stub").around("autowire(com.acme.Repository)"),
            |_: &Mocking, _| Ok(Arc::new(stub_repository()) as Value),
        )
    }

    fn build(aspects: Vec<AspectDefinition>, config: AopConfig) -> AopResult<WovenContainer> {
        let mut builder = WovenContainerBuilder::new()
            .config(config)
            .component(repository())?
            .component(service())?
            .component(client("com.acme.Caller"))?
            .component(client("com.acme.Other"))?
            .component(plain())?;
        for aspect in aspects {
            builder = builder.aspect(aspect)?;
        }
        builder.build()
    }

    fn text(result: Value) -> String {
        result.downcast_ref::<String>().cloned().unwrap()
    }

    fn run(container: &WovenContainer, client: &str, id: &str) -> anyhow::Result<Value> {
        container.get(client)?.call("run", &[value(id.to_string())])
    }

    #[test]
    fn test_within_guard_depends_on_caller() {
        let log = Log::default();
        let expression = "execution(* com.acme.Service.save(..)) && within(com.acme.Caller)";
        let container = build(vec![audit(&log, expression)], AopConfig::default()).unwrap();

        assert!(container.is_proxy("com.acme.Service"));
        assert!(container.is_aspect("com.acme.Audit"));
        assert_eq!(container.summary().aspects, 1);
        assert_eq!(container.summary().advices, 1);

        assert_eq!(text(run(&container, "com.acme.Caller", "a").unwrap()), "record:a");
        assert_eq!(*log.lock(), vec!["record:save"]);

        assert_eq!(text(run(&container, "com.acme.Other", "b").unwrap()), "record:b");
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_privilege_orders_nested_advice() {
        let log = Log::default();
        let container = build(vec![tracing_aspect(&log)], AopConfig::default()).unwrap();

        assert_eq!(text(run(&container, "com.acme.Caller", "7").unwrap()), "record:7");
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[test]
    fn test_autowire_advice_substitutes_dependency() {
        let container = build(vec![mocking()], AopConfig::default()).unwrap();

        assert!(container.is_wire_proxy("com.acme.Service"));
        assert!(!container.is_proxy("com.acme.Repository"));
        assert!(container.get_autowiring("com.acme.Service").contains_key("repo"));
        assert_eq!(text(run(&container, "com.acme.Caller", "x").unwrap()), "stub:x");
    }

    #[test]
    fn test_unadvised_component_dispatches_directly() {
        let log = Log::default();
        let container = build(vec![audit(&log, "execution(* com.acme.Service.save(..))")], AopConfig::default()).unwrap();

        assert!(!container.is_proxy("com.acme.Plain"));
        let pong = container.get("com.acme.Plain").unwrap().call("ping", &[]).unwrap();
        assert_eq!(text(pong), "pong");
        assert!(log.lock().is_empty());
        assert!(container.get_typed::<Plain>("com.acme.Plain").is_ok());
    }

    #[test]
    fn test_errors_pass_through_unchanged() {
        let log = Log::default();
        let container = build(vec![audit(&log, "execution(* com.acme.Service.save(..))")], AopConfig::default()).unwrap();

        let err = run(&container, "com.acme.Caller", "missing").unwrap_err();
        assert_eq!(err.downcast_ref::<NotFound>(), Some(&NotFound("missing".to_string())));
        assert_eq!(*log.lock(), vec!["record:save"]);
    }

    #[test]
    fn test_disabled_weaving_leaves_components_plain() {
        let log = Log::default();
        let config = AopConfig::new().enabled(false);
        let container = build(vec![audit(&log, "execution(* com.acme.Service.save(..))")], config).unwrap();

        assert!(!container.is_proxy("com.acme.Service"));
        assert_eq!(container.summary().advices, 0);
        assert_eq!(text(run(&container, "com.acme.Caller", "a").unwrap()), "record:a");
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_build_errors() {
        let log = Log::default();
        let dummy = build(
            vec![audit(&log, "execution(* com.acme.Nothing.save(..))")],
            AopConfig::new().fail_on_dummy_advice(true),
        )
        .unwrap_err();
        assert!(matches!(dummy, AopError::DummyAdvice(_)));

        let divergent = build(
            vec![audit(&log, "execution(* save(..)) && autowire(com.acme.Repository)")],
            AopConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(divergent, AopError::InvalidAdvice { .. }));

        let duplicate = WovenContainerBuilder::new()
            .component(plain())
            .and_then(|builder| builder.component(plain()))
            .unwrap_err();
        assert!(matches!(duplicate, AopError::Container(ContainerError::DuplicateComponent(_))));
        assert!(duplicate.is_contract_violation());
    }

    #[test]
    fn test_method_hooks() {
        let log = Log::default();
        let expression = "execution(* com.acme.Service.save(..)) && within(com.acme.Caller)";
        let container = build(vec![audit(&log, expression)], AopConfig::default()).unwrap();

        // 钩子调用没有调用方，非平凡的 within 不会匹配
        let hooks = container
            .autowiring_by("execution(* %s.save(..)) && within(%s)", &[&"com.acme.Service", &"com.acme.Caller"])
            .unwrap();
        assert!(hooks.is_empty());

        let hooks = container
            .autowiring_by("execution(* %s.save(..)) && !within(%s)", &[&"com.acme.Service", &"com.acme.Caller"])
            .unwrap();
        assert_eq!(hooks.len(), 1);
        let (joint, hook) = hooks.iter().next().unwrap();
        assert_eq!(joint.signature(), "com.acme.Service.save");
        assert!(hook.is_method());

        // 带 within 的通知同样不会介入
        assert_eq!(text(hook.invoke(&[value("h".to_string())]).unwrap()), "record:h");
        assert_eq!(text(hook.invoke(&[value("i".to_string())]).unwrap()), "record:i");
        assert!(log.lock().is_empty());

        assert!(container.autowiring_by("execution(* %s.save(..))", &[]).is_err());
    }

    #[test]
    fn test_negated_within_advice_applies_without_caller() {
        let log = Log::default();
        let expression = "execution(* com.acme.Service.save(..)) && !within(com.acme.Caller)";
        let container = build(vec![audit(&log, expression)], AopConfig::default()).unwrap();

        let service = container.get("com.acme.Service").unwrap();
        assert_eq!(text(service.call("save", &[value("a".to_string())]).unwrap()), "record:a");
        assert_eq!(*log.lock(), vec!["record:save".to_string()]);

        log.lock().clear();
        run(&container, "com.acme.Caller", "b").unwrap();
        assert!(log.lock().is_empty());

        run(&container, "com.acme.Other", "c").unwrap();
        assert_eq!(*log.lock(), vec!["record:save".to_string()]);
    }

    #[test]
    fn test_field_hooks() {
        let container = build(vec![mocking()], AopConfig::default()).unwrap();

        let hooks = container.autowiring_by("autowire(%s)", &[&"com.acme.Repository"]).unwrap();
        assert_eq!(hooks.len(), 1);
        let hook = hooks.values().next().unwrap();
        assert!(!hook.is_method());

        let repo = hook.invoke(&[]).unwrap();
        let repo = repo.downcast_ref::<ComponentRef>().unwrap();
        assert_eq!(text(repo.call("find", &[value("y".to_string())]).unwrap()), "stub:y");

        let plain = build(Vec::new(), AopConfig::default()).unwrap();
        let hooks = plain.autowiring_by("autowire(%s)", &[&"com.acme.Repository"]).unwrap();
        let repo = hooks.values().next().unwrap().invoke(&[]).unwrap();
        let repo = repo.downcast_ref::<ComponentRef>().unwrap();
        assert_eq!(text(repo.call("find", &[value("z".to_string())]).unwrap()), "record:z");
    }
}

#[cfg(test)]
mod declared_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use weft_core::utils::values::value;
    use weft_core::{component_methods, Component, ComponentRef, Value};

    use crate::aspect;
    use crate::container::WovenContainerBuilder;
    use crate::joinpoint::JoinPoint;

    #[derive(Component)]
    #[component("shop.Inventory")]
    struct Inventory {
        stock: Mutex<u32>,
    }

    #[component_methods]
    impl Inventory {
        pub fn reserve(&self, count: u32) -> anyhow::Result<u32> {
            if count > 10 {
                anyhow::bail!("only 10 items per order");
            }
            let mut stock = self.stock.lock();
            *stock += count;
            Ok(*stock)
        }
    }

    #[derive(Component)]
    #[component("shop.Checkout")]
    struct Checkout {
        #[autowired("shop.Inventory")]
        inventory: Arc<ComponentRef>,
    }

    #[component_methods]
    impl Checkout {
        pub fn order(&self, count: u32) -> anyhow::Result<Value> {
            self.inventory
                .invoke(Some(<Self as Component>::NAME), "reserve", &[value(count)])
        }
    }

    #[derive(Component)]
    #[component("shop.Metering")]
    struct Metering {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[aspect(privilege = 3)]
    impl Metering {
        #[around("execution(* shop.Inventory.reserve(..)) && within(shop.Checkout)")]
        fn count(&self, jp: &JoinPoint<'_>) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            jp.proceed()
        }

        #[around("execution(u32 reserve(u32))")]
        #[privilege(1)]
        fn record(&self, jp: &JoinPoint<'_>) -> anyhow::Result<Value> {
            self.seen.lock().push(jp.name().to_string());
            jp.proceed()
        }
    }

    #[test]
    fn test_declared_components_and_aspects() {
        let container = WovenContainerBuilder::new()
            .auto_register()
            .unwrap()
            .build()
            .unwrap();
        assert!(container.is_aspect("shop.Metering"));
        assert!(container.is_proxy("shop.Inventory"));
        assert!(!container.is_proxy("shop.Checkout"));
        assert_eq!(container.summary().aspects, 1);
        assert_eq!(container.summary().advices, 2);

        let checkout = container.get("shop.Checkout").unwrap();
        let stock = checkout.call("order", &[value(2u32)]).unwrap();
        assert_eq!(*stock.downcast_ref::<u32>().unwrap(), 2);

        // 直接调用没有调用方，带 within 的通知不介入
        let inventory = container.get("shop.Inventory").unwrap();
        inventory.call("reserve", &[value(3u32)]).unwrap();

        let metering = container.get_typed::<Metering>("shop.Metering").unwrap();
        assert_eq!(metering.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*metering.seen.lock(), vec!["reserve", "reserve"]);

        let err = checkout.call("order", &[value(11u32)]).unwrap_err();
        assert_eq!(err.to_string(), "only 10 items per order");
    }
}
