//! 织入层（AdvisementLayer）
//!
//! 每次构建容器时创建一次：把所有通知与所有候选连接点逐一匹配，
//! 得到每个连接点按优先级排列的通知器集合，并据此把组件类型划分为
//! 方法代理、`new` 代理、`init` 代理和注入代理。代理生成完成后调用
//! [`AdvisementLayer::close`] 释放通知器集合，只保留查询所需的分类结果。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use weft_core::{MethodDescriptor, MethodKind, Modifiers, TypeDescriptor, TypeSet};

use crate::advice::AdviceDescriptor;
use crate::advisor::{AdvisorSet, AutowireAdvisor, ExecutionAdvisor};
use crate::config::AopConfig;
use crate::error::{AopError, AopResult};
use crate::joinpoint::{FieldJoint, MethodJoint};

/// 可以被拦截的方法：非 final、static、private、abstract、bridge、synthetic
pub fn is_interceptable(method: &MethodDescriptor) -> bool {
    !method.modifiers.intersects(
        Modifiers::FINAL
            | Modifiers::STATIC
            | Modifiers::PRIVATE
            | Modifiers::ABSTRACT
            | Modifiers::BRIDGE
            | Modifiers::SYNTHETIC,
    )
}

/// 织入结果摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaveSummary {
    pub aspects: usize,
    pub advices: usize,
    pub dummy_advices: usize,
    pub proxies: usize,
    pub intercepted_methods: usize,
    pub intercepted_fields: usize,
}

impl fmt::Display for WeaveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} aspect(s), {} advice(s) ({} dummy), {} proxied type(s), {} method(s) and {} field(s) intercepted",
            self.aspects,
            self.advices,
            self.dummy_advices,
            self.proxies,
            self.intercepted_methods,
            self.intercepted_fields
        )
    }
}

pub struct AdvisementLayer {
    types: Arc<TypeSet>,
    aspects: BTreeSet<String>,
    proxies: BTreeSet<String>,
    new_proxies: BTreeSet<String>,
    init_proxies: BTreeSet<String>,
    wire_proxies: BTreeSet<String>,
    autowiring: BTreeMap<String, BTreeMap<String, FieldJoint>>,
    method_advisors: BTreeMap<MethodJoint, AdvisorSet<ExecutionAdvisor>>,
    field_advisors: BTreeMap<FieldJoint, AdvisorSet<AutowireAdvisor>>,
    summary: WeaveSummary,
    closed: bool,
}

impl AdvisementLayer {
    /// 匹配全部通知
    ///
    /// 切面类型自身不作为候选；没有匹配任何连接点的通知按配置输出警告或返回错误
    pub fn weave(
        types: Arc<TypeSet>,
        advices: &[Arc<AdviceDescriptor>],
        config: &AopConfig,
    ) -> AopResult<Self> {
        let aspects: BTreeSet<String> = types
            .iter()
            .filter(|t| t.is_aspect())
            .map(|t| t.name.clone())
            .collect();
        let autowiring = types
            .iter()
            .map(|t| (t.name.clone(), injection_points(t)))
            .collect();

        let mut layer = Self {
            types,
            aspects,
            proxies: BTreeSet::new(),
            new_proxies: BTreeSet::new(),
            init_proxies: BTreeSet::new(),
            wire_proxies: BTreeSet::new(),
            autowiring,
            method_advisors: BTreeMap::new(),
            field_advisors: BTreeMap::new(),
            summary: WeaveSummary::default(),
            closed: false,
        };
        layer.summary.aspects = layer.aspects.len();

        if !config.enabled {
            tracing::info!("AOP is disabled, {} advice(s) ignored", advices.len());
            return Ok(layer);
        }

        let candidates: Vec<Arc<TypeDescriptor>> = layer
            .types
            .iter()
            .filter(|t| !t.is_aspect())
            .cloned()
            .collect();

        for advice in advices {
            let matched = layer.match_advice(advice, &candidates);
            layer.summary.advices += 1;
            if matched == 0 {
                layer.summary.dummy_advices += 1;
                if config.fail_on_dummy_advice {
                    return Err(AopError::DummyAdvice(advice.name()));
                }
                tracing::warn!("Dummy advice {} matches no join point: {}", advice.name(), advice.pointcut());
            }
        }

        layer.classify_proxies();
        tracing::info!("Weaving finished: {}", layer.summary);
        Ok(layer)
    }

    fn match_advice(&mut self, advice: &Arc<AdviceDescriptor>, candidates: &[Arc<TypeDescriptor>]) -> usize {
        let pointcut = advice.pointcut();
        let mut matched = 0;

        for declaring in candidates {
            if pointcut.is_execution() {
                for (index, method) in declaring.methods.iter().enumerate() {
                    if !is_interceptable(method) {
                        continue;
                    }
                    let joint = MethodJoint::new(Arc::clone(declaring), index);
                    let advisor = ExecutionAdvisor::new(Arc::clone(advice), Arc::clone(&self.types));
                    if advisor.may_match(&joint) {
                        tracing::debug!("  ├─ {} advises {}", advice.name(), joint.signature());
                        self.method_advisors.entry(joint).or_default().insert(advisor);
                        matched += 1;
                    }
                }
            }

            if pointcut.is_autowire() {
                for (index, field) in declaring.fields.iter().enumerate() {
                    if !field.is_injection_point() {
                        continue;
                    }
                    let joint = FieldJoint::new(Arc::clone(declaring), index);
                    let advisor = AutowireAdvisor::new(Arc::clone(advice), Arc::clone(&self.types));
                    if advisor.matches(&joint) {
                        tracing::debug!("  ├─ {} advises {}", advice.name(), joint.signature());
                        self.field_advisors.entry(joint).or_default().insert(advisor);
                        matched += 1;
                    }
                }
            }
        }

        matched
    }

    fn classify_proxies(&mut self) {
        for joint in self.method_advisors.keys() {
            let name = joint.declaring_type().to_string();
            match joint.kind() {
                MethodKind::New => {
                    self.new_proxies.insert(name.clone());
                }
                MethodKind::Init => {
                    self.init_proxies.insert(name.clone());
                }
                MethodKind::Method => {}
            }
            self.proxies.insert(name);
        }
        for joint in self.field_advisors.keys() {
            let name = joint.declaring_type().to_string();
            self.wire_proxies.insert(name.clone());
            self.proxies.insert(name);
        }

        self.summary.proxies = self.proxies.len();
        self.summary.intercepted_methods = self.method_advisors.len();
        self.summary.intercepted_fields = self.field_advisors.len();
    }

    pub fn types(&self) -> &Arc<TypeSet> {
        &self.types
    }

    pub fn is_aspect(&self, type_name: &str) -> bool {
        self.aspects.contains(type_name)
    }

    /// 至少有一个连接点被拦截
    pub fn is_proxy(&self, type_name: &str) -> bool {
        self.proxies.contains(type_name)
    }

    /// `new` 被拦截
    pub fn is_new_proxy(&self, type_name: &str) -> bool {
        self.new_proxies.contains(type_name)
    }

    /// `init` 被拦截
    pub fn is_init_proxy(&self, type_name: &str) -> bool {
        self.init_proxies.contains(type_name)
    }

    /// 至少有一个字段被拦截
    pub fn is_wire_proxy(&self, type_name: &str) -> bool {
        self.wire_proxies.contains(type_name)
    }

    /// 类型的注入点：字段名 -> 字段
    pub fn get_autowiring(&self, type_name: &str) -> BTreeMap<String, FieldJoint> {
        self.autowiring.get(type_name).cloned().unwrap_or_default()
    }

    pub fn advisors_for_method(&self, joint: &MethodJoint) -> Option<&AdvisorSet<ExecutionAdvisor>> {
        self.method_advisors.get(joint)
    }

    pub fn advisors_for_field(&self, joint: &FieldJoint) -> Option<&AdvisorSet<AutowireAdvisor>> {
        self.field_advisors.get(joint)
    }

    pub fn summary(&self) -> &WeaveSummary {
        &self.summary
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 释放通知器集合，分类结果仍然可以查询
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.method_advisors.clear();
        self.field_advisors.clear();
        self.closed = true;
        tracing::debug!("Advisement layer closed");
    }
}

impl fmt::Debug for AdvisementLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisementLayer")
            .field("aspects", &self.aspects)
            .field("proxies", &self.proxies)
            .field("closed", &self.closed)
            .finish()
    }
}

fn injection_points(declaring: &Arc<TypeDescriptor>) -> BTreeMap<String, FieldJoint> {
    declaring
        .fields
        .iter()
        .enumerate()
        .filter(|(_, field)| field.is_injection_point())
        .map(|(index, field)| (field.name.clone(), FieldJoint::new(Arc::clone(declaring), index)))
        .collect()
}
