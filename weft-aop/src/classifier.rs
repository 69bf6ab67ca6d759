//! 通知分类
//!
//! 扫描带有 `@Aspect` 的类型，把每个 `@Around` 方法变成一个 [`AdviceDescriptor`]：
//! 校验方法形状，解析（并缓存）切点表达式，多个表达式按域合并，取得切面实例的提供者。

use std::sync::Arc;

use weft_core::{constants, MethodDescriptor, MethodKind, ProviderSource, TypeDescriptor, TypeSet};

use crate::advice::{privilege_of, AdviceDescriptor};
use crate::aspect::AspectCatalog;
use crate::error::{AopError, AopResult};
use crate::pointcut::{Pointcut, PointcutCache};

const PROCEEDING_JOIN_POINT: &str = "weft.aop.ProceedingJoinPoint";
const AUTOWIRE_JOIN_POINT: &str = "weft.aop.AutowireJoinPoint";

pub struct AdviceClassifier<'a> {
    cache: &'a PointcutCache,
    catalog: &'a AspectCatalog,
}

impl<'a> AdviceClassifier<'a> {
    pub fn new(cache: &'a PointcutCache, catalog: &'a AspectCatalog) -> Self {
        Self { cache, catalog }
    }

    /// 按类型顺序、方法声明顺序返回全部通知
    pub fn classify(
        &self,
        types: &TypeSet,
        providers: &dyn ProviderSource,
    ) -> AopResult<Vec<Arc<AdviceDescriptor>>> {
        let mut advices = Vec::new();
        for aspect in types.iter().filter(|t| t.is_aspect()) {
            let mut count = 0;
            for method in &aspect.methods {
                if !method.has_annotation(constants::AROUND_ANNOTATION) {
                    continue;
                }
                advices.push(Arc::new(self.classify_advice(aspect, method, providers)?));
                count += 1;
            }
            tracing::debug!("Aspect {} declares {} advice(s)", aspect.name, count);
        }
        Ok(advices)
    }

    fn classify_advice(
        &self,
        aspect: &TypeDescriptor,
        method: &MethodDescriptor,
        providers: &dyn ProviderSource,
    ) -> AopResult<AdviceDescriptor> {
        let name = format!("{}.{}", aspect.name, method.name);
        check_shape(&name, method)?;

        let pointcut = self.pointcut_of(&name, method).map_err(|source| match source {
            illegal @ AopError::IllegalAdvice { .. } => illegal,
            source => AopError::InvalidAdvice {
                advice: name.clone(),
                source: Box::new(source),
            },
        })?;
        check_join_point_kind(&name, method, &pointcut)?;

        let body = self
            .catalog
            .body(&aspect.name, &method.name)
            .cloned()
            .ok_or_else(|| AopError::IllegalAdvice {
                advice: name.clone(),
                reason: "no advice implementation is registered".to_string(),
            })?;
        let provider = providers.get_provider(&aspect.name)?;
        let privilege = privilege_of(aspect, &method.name)?;

        tracing::debug!("Advice {} -> {} (privilege {})", name, pointcut, privilege);
        Ok(AdviceDescriptor::new(
            aspect.name.clone(),
            method.name.clone(),
            pointcut,
            provider,
            body,
            privilege,
        ))
    }

    /// 多个 `@Around` 表达式按 OR 合并，只允许同域
    fn pointcut_of(&self, name: &str, method: &MethodDescriptor) -> AopResult<Arc<Pointcut>> {
        let mut pointcuts = Vec::new();
        for annotation in method.annotations_of(constants::AROUND_ANNOTATION) {
            let expression = annotation.value().ok_or_else(|| AopError::IllegalAdvice {
                advice: name.to_string(),
                reason: "@Around requires a pointcut expression".to_string(),
            })?;
            pointcuts.push(self.cache.get_or_parse(expression)?);
        }

        let mut pointcuts = pointcuts.into_iter();
        let Some(mut merged) = pointcuts.next() else {
            return Err(AopError::IllegalAdvice {
                advice: name.to_string(),
                reason: "@Around requires a pointcut expression".to_string(),
            });
        };

        for next in pointcuts {
            if merged.is_divergent() || next.is_divergent() {
                return Err(AopError::DivergentCrosscut(format!(
                    "divergent pointcut '{}' must be the only expression of its advice",
                    if merged.is_divergent() { &merged } else { &next }
                )));
            }
            if !merged.is_convergent_with(&next) {
                return Err(AopError::DivergentCrosscut(format!(
                    "'{}' and '{}' belong to different domains",
                    merged, next
                )));
            }
            merged = Arc::new(if merged.is_execution() {
                Pointcut::execution_or(merged, next)?
            } else {
                Pointcut::autowire_or(merged, next)?
            });
        }
        Ok(merged)
    }
}

fn illegal(name: &str, reason: impl Into<String>) -> AopError {
    AopError::IllegalAdvice {
        advice: name.to_string(),
        reason: reason.into(),
    }
}

/// 通知方法：非 static、非 abstract 的普通方法，返回通用对象，唯一参数为连接点
fn check_shape(name: &str, method: &MethodDescriptor) -> AopResult<()> {
    if method.kind != MethodKind::Method {
        return Err(illegal(name, "constructors cannot be advice"));
    }
    if method.modifiers.is_static() {
        return Err(illegal(name, "advice must not be static"));
    }
    if method.modifiers.is_abstract() {
        return Err(illegal(name, "advice must not be abstract"));
    }
    if method.return_type != constants::VALUE_TYPE_NAME {
        return Err(illegal(
            name,
            format!(
                "advice must return '{}', found '{}'",
                constants::VALUE_TYPE_NAME,
                method.return_type
            ),
        ));
    }
    match method.params.as_slice() {
        [param] if constants::is_join_point_type_name(param) => Ok(()),
        params => Err(illegal(
            name,
            format!(
                "advice must take exactly one join point parameter, found ({})",
                params.join(", ")
            ),
        )),
    }
}

/// 专用的连接点参数类型只能用于对应的域
fn check_join_point_kind(name: &str, method: &MethodDescriptor, pointcut: &Pointcut) -> AopResult<()> {
    let param = method.params.first().map(String::as_str);
    if param == Some(PROCEEDING_JOIN_POINT) && pointcut.is_autowire() {
        return Err(illegal(name, "ProceedingJoinPoint cannot receive autowire join points"));
    }
    if param == Some(AUTOWIRE_JOIN_POINT) && pointcut.is_execution() {
        return Err(illegal(name, "AutowireJoinPoint cannot receive execution join points"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceFn, LOWEST_PRIORITY};
    use crate::joinpoint::JoinPoint;
    use crate::testing::FixedProvider;
    use std::collections::HashMap;
    use weft_core::utils::values::unit;
    use weft_core::{Annotation, ContainerError, ContainerResult, Modifiers, Provider, Value};

    struct Providers;

    impl ProviderSource for Providers {
        fn get_provider(&self, type_name: &str) -> ContainerResult<Arc<dyn Provider>> {
            Ok(Arc::new(FixedProvider::new(type_name, unit())))
        }
    }

    fn catalog(aspect: &str, methods: &[&str]) -> AspectCatalog {
        let body: AdviceFn = Arc::new(|_: &Value, jp: &JoinPoint<'_>| jp.proceed());
        let advices: HashMap<String, AdviceFn> = methods
            .iter()
            .map(|m| (m.to_string(), Arc::clone(&body)))
            .collect();
        let mut catalog = AspectCatalog::new();
        catalog.insert(aspect, advices);
        catalog
    }

    fn classify(aspect: TypeDescriptor, methods: &[&str]) -> AopResult<Vec<Arc<AdviceDescriptor>>> {
        let cache = PointcutCache::new();
        let catalog = catalog(&aspect.name, methods);
        let mut types = TypeSet::new();
        types.insert(Arc::new(aspect));
        AdviceClassifier::new(&cache, &catalog).classify(&types, &Providers)
    }

    fn aspect() -> TypeDescriptor {
        TypeDescriptor::new("com.acme.Audit").annotate(Annotation::new(constants::ASPECT_ANNOTATION))
    }

    #[test]
    fn test_classify_advices() {
        let advices = classify(
            aspect()
                .method(MethodDescriptor::advice("log").around("execution(* save(..))").privilege(3))
                .method(
                    MethodDescriptor::advice("both")
                        .around("execution(* save(..))")
                        .around("execution(* find(..))"),
                )
                .method(MethodDescriptor::new("helper")),
            &["log", "both"],
        )
        .unwrap();

        assert_eq!(advices.len(), 2);
        assert_eq!(advices[0].name(), "com.acme.Audit.log");
        assert_eq!(advices[0].privilege(), 3);
        assert_eq!(advices[1].privilege(), LOWEST_PRIORITY);
        assert!(advices[1].pointcut().is_execution());
        assert_eq!(
            advices[1].pointcut().to_string(),
            "(execution(* save(..)) || execution(* find(..)))"
        );
    }

    #[test]
    fn test_non_aspect_types_are_ignored() {
        let cache = PointcutCache::new();
        let catalog = AspectCatalog::new();
        let mut types = TypeSet::new();
        types.insert(Arc::new(
            TypeDescriptor::new("com.acme.Plain").method(MethodDescriptor::advice("log").around("execution(* *(..))")),
        ));
        let advices = AdviceClassifier::new(&cache, &catalog).classify(&types, &Providers).unwrap();
        assert!(advices.is_empty());
    }

    #[test]
    fn test_illegal_shapes() {
        let cases = [
            MethodDescriptor::advice("a").around("execution(* *(..))").modifiers(Modifiers::STATIC),
            MethodDescriptor::advice("a").around("execution(* *(..))").modifiers(Modifiers::ABSTRACT),
            MethodDescriptor::advice("a").around("execution(* *(..))").returns("String"),
            MethodDescriptor::new("a").returns(constants::VALUE_TYPE_NAME).around("execution(* *(..))"),
            MethodDescriptor::advice("a").param("String").around("execution(* *(..))"),
            MethodDescriptor::new("a")
                .returns(constants::VALUE_TYPE_NAME)
                .param("weft.aop.AutowireJoinPoint")
                .around("execution(* *(..))"),
            MethodDescriptor::advice("a").annotate(Annotation::new(constants::AROUND_ANNOTATION)),
        ];
        for method in cases {
            let err = classify(aspect().method(method.clone()), &["a"]).unwrap_err();
            assert!(
                matches!(err, AopError::IllegalAdvice { .. }),
                "{:?} -> {}",
                method,
                err
            );
            assert!(err.is_contract_violation());
        }
    }

    #[test]
    fn test_missing_body() {
        let err = classify(aspect().method(MethodDescriptor::advice("a").around("autowire(*)")), &[]).unwrap_err();
        assert!(matches!(err, AopError::IllegalAdvice { .. }));
    }

    #[test]
    fn test_syntax_error_names_advice() {
        let err = classify(aspect().method(MethodDescriptor::advice("broken").around("execution(")), &["broken"])
            .unwrap_err();
        match err {
            AopError::InvalidAdvice { advice, source } => {
                assert_eq!(advice, "com.acme.Audit.broken");
                assert!(matches!(*source, AopError::Syntax(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_mixed_domains_across_annotations() {
        let err = classify(
            aspect().method(
                MethodDescriptor::advice("mixed")
                    .around("execution(* save(..))")
                    .around("autowire(com.acme.Repository)"),
            ),
            &["mixed"],
        )
        .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(matches!(
            err,
            AopError::InvalidAdvice { ref source, .. } if matches!(**source, AopError::DivergentCrosscut(_))
        ));

        let divergent = classify(
            aspect().method(
                MethodDescriptor::advice("divergent").around("execution(* save(..)) || autowire(com.acme.Repository)"),
            ),
            &["divergent"],
        )
        .unwrap();
        assert!(divergent[0].pointcut().is_divergent());

        let err = classify(
            aspect().method(
                MethodDescriptor::advice("twice")
                    .around("execution(* save(..)) || autowire(com.acme.Repository)")
                    .around("execution(* find(..))"),
            ),
            &["twice"],
        )
        .unwrap_err();
        assert!(err.is_contract_violation());
    }

    struct NoProviders;

    impl ProviderSource for NoProviders {
        fn get_provider(&self, type_name: &str) -> ContainerResult<Arc<dyn Provider>> {
            Err(ContainerError::ComponentNotFound(type_name.to_string()))
        }
    }

    #[test]
    fn test_aspect_must_be_provided() {
        let cache = PointcutCache::new();
        let catalog = catalog("com.acme.Audit", &["a"]);
        let mut types = TypeSet::new();
        types.insert(Arc::new(aspect().method(MethodDescriptor::advice("a").around("execution(* *(..))"))));
        let err = AdviceClassifier::new(&cache, &catalog)
            .classify(&types, &NoProviders)
            .unwrap_err();
        assert!(matches!(err, AopError::Container(ContainerError::ComponentNotFound(_))));
    }
}
