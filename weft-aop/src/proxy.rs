//! 代理分派
//!
//! 为每个有连接点被拦截的组件类型生成一张分派表：被拦截的方法经过拦截链，
//! 其余方法直接调用原始实现。`new` / `init` / 注入字段三种拦截相互独立。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_core::utils::values::value;
use weft_core::{
    ComponentDefinition, ComponentRef, ComponentRegistry, ContainerError, Dispatcher, Instantiator,
    MethodBody, MethodKind, PlainInstantiator, ProviderSource, Value, Wiring,
};

use crate::chain::{AutowireChain, MethodChain, Original};
use crate::error::AopResult;
use crate::joinpoint::{FieldJoint, MethodJoint};
use crate::layer::AdvisementLayer;

enum Route {
    Direct(MethodBody),
    Woven(Arc<MethodChain>),
}

/// 一个组件类型的分派表
pub struct ComponentProxy {
    definition: Arc<ComponentDefinition>,
    routes: HashMap<String, Route>,
    new_chain: Option<Arc<MethodChain>>,
    init_chain: Option<Arc<MethodChain>>,
    wire_chains: HashMap<String, Arc<AutowireChain>>,
    trace: bool,
}

impl ComponentProxy {
    pub fn definition(&self) -> &Arc<ComponentDefinition> {
        &self.definition
    }

    /// 方法是否经过拦截链
    pub fn is_woven(&self, method: &str) -> bool {
        matches!(self.routes.get(method), Some(Route::Woven(_)))
    }

    pub fn is_new_proxy(&self) -> bool {
        self.new_chain.is_some()
    }

    pub fn is_init_proxy(&self) -> bool {
        self.init_chain.is_some()
    }

    pub fn is_wire_proxy(&self) -> bool {
        !self.wire_chains.is_empty()
    }

    pub fn wire_chain(&self, field: &str) -> Option<&Arc<AutowireChain>> {
        self.wire_chains.get(field)
    }

    /// 注入 -> 分配 -> 初始化，三步分别经过各自的拦截链（如果有）
    pub fn instantiate(self: &Arc<Self>, providers: &dyn ProviderSource) -> anyhow::Result<ComponentRef> {
        let name = self.definition.name();

        let mut wiring = Wiring::new();
        for field in self.definition.injection_points() {
            let resolved = match self.wire_chains.get(&field.name) {
                Some(chain) => chain.resolve()?,
                None => providers.get_provider(&field.field_type)?.get()?,
            };
            wiring.insert(field.name.clone(), resolved);
        }

        let target = match &self.new_chain {
            Some(chain) => chain.invoke(None, None, &[value(wiring)])?,
            None => (self.definition.allocator())(&wiring)?,
        };

        match (&self.init_chain, self.definition.initializer()) {
            (Some(chain), _) => {
                chain.invoke(None, Some(&target), &[])?;
            }
            (None, Some(init)) => init(&target)?,
            (None, None) => {}
        }

        tracing::trace!("Instantiated proxied component '{}'", name);
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(self) as Arc<dyn Dispatcher>;
        Ok(ComponentRef::new(name, target, dispatcher))
    }
}

impl Dispatcher for ComponentProxy {
    fn dispatch(
        &self,
        caller: Option<&str>,
        target: &Value,
        method: &str,
        args: &[Value],
    ) -> anyhow::Result<Value> {
        match self.routes.get(method) {
            Some(Route::Direct(body)) => body(target, args),
            Some(Route::Woven(chain)) => {
                if self.trace {
                    tracing::debug!(
                        "Dispatching {} through {} advisor(s), caller {:?}",
                        chain.joint().signature(),
                        chain.len(),
                        caller
                    );
                }
                chain.invoke(caller, Some(target), args)
            }
            None => Err(ContainerError::MethodNotFound {
                component: self.definition.name().to_string(),
                method: method.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Debug for ComponentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut woven: Vec<&String> = self
            .routes
            .iter()
            .filter(|(_, route)| matches!(route, Route::Woven(_)))
            .map(|(name, _)| name)
            .collect();
        woven.sort();
        f.debug_struct("ComponentProxy")
            .field("component", &self.definition.name())
            .field("woven", &woven)
            .field("new", &self.new_chain.is_some())
            .field("init", &self.init_chain.is_some())
            .field("wired", &self.wire_chains.len())
            .finish()
    }
}

/// 组件类型 -> 分派表
#[derive(Debug, Default)]
pub struct ProxyTable {
    proxies: HashMap<String, Arc<ComponentProxy>>,
}

impl ProxyTable {
    pub fn get(&self, type_name: &str) -> Option<&Arc<ComponentProxy>> {
        self.proxies.get(type_name)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// 根据织入层生成分派表
pub struct ProxyFactory;

impl ProxyFactory {
    pub fn synthesize(
        layer: &AdvisementLayer,
        registry: &ComponentRegistry,
        providers: &dyn ProviderSource,
        trace: bool,
    ) -> AopResult<ProxyTable> {
        let mut proxies = HashMap::new();
        for definition in registry.iter() {
            if !layer.is_proxy(definition.name()) {
                continue;
            }
            let proxy = Self::synthesize_one(layer, definition, providers, trace)?;
            tracing::debug!("Synthesized proxy {:?}", proxy);
            proxies.insert(definition.name().to_string(), Arc::new(proxy));
        }
        Ok(ProxyTable { proxies })
    }

    fn synthesize_one(
        layer: &AdvisementLayer,
        definition: &Arc<ComponentDefinition>,
        providers: &dyn ProviderSource,
        trace: bool,
    ) -> AopResult<ComponentProxy> {
        let name = definition.name();
        let descriptor = layer
            .types()
            .get(name)
            .ok_or_else(|| ContainerError::ComponentNotFound(name.to_string()))?;

        let mut routes = HashMap::new();
        let mut new_chain = None;
        let mut init_chain = None;

        for (index, method) in descriptor.methods.iter().enumerate() {
            let joint = MethodJoint::new(Arc::clone(descriptor), index);
            let advisors = layer.advisors_for_method(&joint);
            match method.kind {
                MethodKind::Method => {
                    let Some(body) = definition.method_body(&method.name) else {
                        continue;
                    };
                    let route = match advisors {
                        Some(advisors) => Route::Woven(Arc::new(MethodChain::build(
                            joint,
                            Original::Method(Arc::clone(body)),
                            advisors,
                        ))),
                        None => Route::Direct(Arc::clone(body)),
                    };
                    routes.insert(method.name.clone(), route);
                }
                MethodKind::New => {
                    if let Some(advisors) = advisors {
                        let original = Original::New(Arc::clone(definition.allocator()));
                        new_chain = Some(Arc::new(MethodChain::build(joint, original, advisors)));
                    }
                }
                MethodKind::Init => {
                    if let (Some(advisors), Some(init)) = (advisors, definition.initializer()) {
                        let original = Original::Init(Arc::clone(init));
                        init_chain = Some(Arc::new(MethodChain::build(joint, original, advisors)));
                    }
                }
            }
        }

        let mut wire_chains = HashMap::new();
        for (index, field) in descriptor.fields.iter().enumerate() {
            let joint = FieldJoint::new(Arc::clone(descriptor), index);
            let Some(advisors) = layer.advisors_for_field(&joint) else {
                continue;
            };
            let provider = match providers.get_provider(&field.field_type) {
                Ok(provider) => Some(provider),
                Err(ContainerError::ComponentNotFound(_)) => {
                    tracing::debug!("No provider for {}, advice must supply the value", joint);
                    None
                }
                Err(e) => return Err(e.into()),
            };
            wire_chains.insert(
                field.name.clone(),
                Arc::new(AutowireChain::build(joint, provider, advisors)),
            );
        }

        Ok(ComponentProxy {
            definition: Arc::clone(definition),
            routes,
            new_chain,
            init_chain,
            wire_chains,
            trace,
        })
    }
}

/// 有分派表的组件经过代理创建，其余组件按默认方式创建
pub struct WeavingInstantiator {
    table: Arc<ProxyTable>,
}

impl WeavingInstantiator {
    pub fn new(table: Arc<ProxyTable>) -> Self {
        Self { table }
    }
}

impl Instantiator for WeavingInstantiator {
    fn instantiate(
        &self,
        definition: &Arc<ComponentDefinition>,
        providers: &dyn ProviderSource,
    ) -> anyhow::Result<ComponentRef> {
        match self.table.get(definition.name()) {
            Some(proxy) => proxy.instantiate(providers),
            None => PlainInstantiator.instantiate(definition, providers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AopConfig;
    use crate::testing::{advice, FixedProvider};
    use parking_lot::Mutex;
    use weft_core::{ContainerResult, FieldDescriptor, MethodDescriptor, Provider, TypeDescriptor};

    struct Greeter {
        greeting: Arc<String>,
    }

    fn registry(log: &Arc<Mutex<Vec<String>>>) -> ComponentRegistry {
        let init_log = Arc::clone(log);
        let mut registry = ComponentRegistry::new();
        registry
            .register(
                ComponentDefinition::new(TypeDescriptor::new("com.acme.Greeter"), |wiring| {
                    Ok(Greeter {
                        greeting: wiring.get::<String>("greeting")?,
                    })
                })
                .with_field(FieldDescriptor::new("greeting", "com.acme.Greeting"))
                .with_init(move |_: &Greeter| {
                    init_log.lock().push("init".to_string());
                    Ok(())
                })
                .with_method(MethodDescriptor::new("greet").returns("String"), |this: &Greeter, _| {
                    Ok(value(format!("{}!", this.greeting)))
                })
                .with_method(MethodDescriptor::new("plain").returns("String"), |_: &Greeter, _| {
                    Ok(value("plain".to_string()))
                }),
            )
            .unwrap();
        registry
    }

    struct Greetings;

    impl ProviderSource for Greetings {
        fn get_provider(&self, type_name: &str) -> ContainerResult<Arc<dyn Provider>> {
            match type_name {
                "com.acme.Greeting" => Ok(Arc::new(FixedProvider::new(type_name, value("hello".to_string())))),
                other => Err(ContainerError::ComponentNotFound(other.to_string())),
            }
        }
    }

    fn table(registry: &ComponentRegistry, advices: &[Arc<crate::advice::AdviceDescriptor>]) -> ProxyTable {
        let types = Arc::new(registry.type_set());
        let layer = AdvisementLayer::weave(types, advices, &AopConfig::default()).unwrap();
        ProxyFactory::synthesize(&layer, registry, &Greetings, true).unwrap()
    }

    #[test]
    fn test_woven_and_direct_routes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);
        let shout = advice("shout", "execution(String greet())", 1, |jp| {
            let greeting = jp.proceed()?;
            let text = greeting.downcast_ref::<String>().cloned().unwrap_or_default();
            Ok(value(text.to_uppercase()))
        });
        let table = table(&registry, &[shout]);
        let proxy = table.get("com.acme.Greeter").unwrap();
        assert!(proxy.is_woven("greet"));
        assert!(!proxy.is_woven("plain"));

        let component = proxy.instantiate(&Greetings).unwrap();
        let greeting = component.call("greet", &[]).unwrap();
        assert_eq!(greeting.downcast_ref::<String>().unwrap(), "HELLO!");
        let plain = component.call("plain", &[]).unwrap();
        assert_eq!(plain.downcast_ref::<String>().unwrap(), "plain");
        assert!(component.call("missing", &[]).is_err());
        assert_eq!(*log.lock(), vec!["init"]);
    }

    #[test]
    fn test_new_init_and_wire_interception() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);
        let init_log = Arc::clone(&log);
        let advices = [
            advice("wire", "autowire(com.acme.Greeting)", 1, |_| Ok(value("hi".to_string()))),
            advice("init", "execution(* init(..))", 1, move |jp| {
                init_log.lock().push("before-init".to_string());
                jp.proceed()
            }),
            advice("alloc", "execution(* new(..))", 1, |jp| jp.proceed()),
        ];
        let table = table(&registry, &advices);
        let proxy = table.get("com.acme.Greeter").unwrap();
        assert!(proxy.is_new_proxy());
        assert!(proxy.is_init_proxy());
        assert!(proxy.is_wire_proxy());
        assert!(!proxy.is_woven("greet"));

        let component = proxy.instantiate(&Greetings).unwrap();
        let greeting = component.call("greet", &[]).unwrap();
        assert_eq!(greeting.downcast_ref::<String>().unwrap(), "hi!");
        assert_eq!(*log.lock(), vec!["before-init", "init"]);
    }

    #[test]
    fn test_unadvised_types_use_plain_instantiation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log);
        let table = Arc::new(table(&registry, &[]));
        assert!(table.is_empty());

        let instantiator = WeavingInstantiator::new(table);
        let definition = registry.get("com.acme.Greeter").unwrap();
        let component = instantiator.instantiate(definition, &Greetings).unwrap();
        assert_eq!(component.call("greet", &[]).unwrap().downcast_ref::<String>().unwrap(), "hello!");
    }
}
