//! 切点表达式中的名称、类型、参数模式
//!
//! 通配符 `*` 可以出现在名称的任意位置（`save*`、`*Service`、`com.acme.*`），
//! 在解析时编译为锚定的正则表达式。

use std::fmt;

use regex::Regex;
use weft_core::metadata::{package_of, simple_name_of, MethodKind};
use weft_core::{MethodDescriptor, TypeDescriptor, TypeSet};

/// 名称模式
#[derive(Debug, Clone)]
pub enum NamePattern {
    /// `*`
    Any,
    /// 不含通配符的名称
    Exact(String),
    /// 含通配符的名称
    Wildcard { text: String, regex: Regex },
}

impl NamePattern {
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        if text == "*" {
            return Ok(NamePattern::Any);
        }
        if !text.contains('*') {
            return Ok(NamePattern::Exact(text.to_string()));
        }

        let body = text
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Ok(NamePattern::Wildcard {
            text: text.to_string(),
            regex: Regex::new(&format!("^{}$", body))?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(expected) => expected == name,
            NamePattern::Wildcard { regex, .. } => regex.is_match(name),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, NamePattern::Any)
    }

    /// 不含通配符时的字面名称
    pub fn literal(&self) -> Option<&str> {
        match self {
            NamePattern::Exact(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NamePattern::Any => "*",
            NamePattern::Exact(name) => name,
            NamePattern::Wildcard { text, .. } => text,
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 类型模式（也用于注解）
///
/// 在最后一个 `.` 处拆分为包和简单名，两部分分别匹配：
/// - `*` 匹配任意类型
/// - `com.acme.Service` 要求包名和简单名都相同
/// - `Service` 只匹配没有包名的类型，任意包中的 `Service` 写作 `*.Service`
/// - 末尾的 `+` 表示该类型或其任意子类型
#[derive(Debug, Clone)]
pub struct TypePattern {
    text: String,
    package: NamePattern,
    name: NamePattern,
    covariant: bool,
}

impl TypePattern {
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        let (base, covariant) = match text.strip_suffix('+') {
            Some(base) => (base, true),
            None => (text, false),
        };

        let (package, name) = if base == "*" {
            (NamePattern::Any, NamePattern::Any)
        } else {
            match base.rsplit_once('.') {
                Some((package, name)) => (NamePattern::parse(package)?, NamePattern::parse(name)?),
                None => (NamePattern::Exact(String::new()), NamePattern::parse(base)?),
            }
        };

        Ok(Self {
            text: text.to_string(),
            package,
            name,
            covariant,
        })
    }

    /// 匹配任意类型：`*` 或 `*.*`
    pub fn is_trivial(&self) -> bool {
        self.package.is_any() && self.name.is_any()
    }

    pub fn is_covariant(&self) -> bool {
        self.covariant
    }

    /// 只按名称匹配，不考虑子类型
    pub fn matches_name(&self, type_name: &str) -> bool {
        self.package.matches(package_of(type_name)) && self.name.matches(simple_name_of(type_name))
    }

    /// 按名称匹配；协变模式下，`actual` 的任一父类型匹配即可
    pub fn matches(&self, types: &TypeSet, actual: &str) -> bool {
        if self.matches_name(actual) {
            return true;
        }
        self.covariant
            && types
                .supertypes_of(actual)
                .iter()
                .any(|supertype| self.matches_name(supertype))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// 参数模式
#[derive(Debug, Clone)]
pub enum ParamPattern {
    /// `..`：剩余的任意个参数
    Rest,
    /// 恰好一个参数，`*` 匹配任意类型
    Type(TypePattern),
}

impl fmt::Display for ParamPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamPattern::Rest => f.write_str(".."),
            ParamPattern::Type(pattern) => pattern.fmt(f),
        }
    }
}

fn params_match(patterns: &[ParamPattern], params: &[String], types: &TypeSet) -> bool {
    match patterns.split_first() {
        None => params.is_empty(),
        Some((ParamPattern::Rest, rest)) => {
            (0..=params.len()).any(|skip| params_match(rest, &params[skip..], types))
        }
        Some((ParamPattern::Type(pattern), rest)) => match params.split_first() {
            Some((first, tail)) => pattern.matches(types, first) && params_match(rest, tail, types),
            None => false,
        },
    }
}

/// `execution(...)` 中的方法签名：`<返回类型> [声明类型.]<方法名>(<参数>)`
#[derive(Debug, Clone)]
pub struct MethodPattern {
    pub return_type: TypePattern,
    pub declaring_type: Option<TypePattern>,
    pub name: NamePattern,
    pub params: Vec<ParamPattern>,
}

impl MethodPattern {
    pub fn matches(&self, types: &TypeSet, declaring: &TypeDescriptor, method: &MethodDescriptor) -> bool {
        // 构造连接点只能被字面名称选中
        if method.kind != MethodKind::Method && self.name.literal() != Some(method.name.as_str()) {
            return false;
        }

        self.name.matches(&method.name)
            && self
                .declaring_type
                .as_ref()
                .map_or(true, |pattern| pattern.matches(types, &declaring.name))
            && self.return_type.matches(types, &method.return_type)
            && params_match(&self.params, &method.params, types)
    }
}

impl fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.return_type)?;
        if let Some(declaring) = &self.declaring_type {
            write!(f, "{}.", declaring)?;
        }
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, params.join(", "))
    }
}

/// `autowire(...)` 中的字段模式：`<字段类型> [字段名]`
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub field_type: TypePattern,
    pub name: Option<NamePattern>,
}

impl FieldPattern {
    pub fn matches(&self, types: &TypeSet, field_type: &str, field_name: &str) -> bool {
        self.field_type.matches(types, field_type)
            && self.name.as_ref().map_or(true, |name| name.matches(field_name))
    }
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} {}", self.field_type, name),
            None => write!(f, "{}", self.field_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn types() -> TypeSet {
        let mut types = TypeSet::new();
        types.insert(Arc::new(TypeDescriptor::new("com.acme.JdbcRepository").extends("com.acme.Repository")));
        types
    }

    #[test]
    fn test_name_wildcards() {
        let prefix = NamePattern::parse("save*").unwrap();
        assert!(prefix.matches("save"));
        assert!(prefix.matches("saveAll"));
        assert!(!prefix.matches("resave"));

        let dotted = NamePattern::parse("com.*").unwrap();
        assert!(dotted.matches("com.acme"));
        assert!(!dotted.matches("comXacme"));
    }

    #[test]
    fn test_type_pattern_parts() {
        let exact = TypePattern::parse("com.acme.Service").unwrap();
        assert!(exact.matches_name("com.acme.Service"));
        assert!(!exact.matches_name("org.acme.Service"));

        let any_package = TypePattern::parse("*.Service").unwrap();
        assert!(any_package.matches_name("org.acme.Service"));

        let bare = TypePattern::parse("String").unwrap();
        assert!(bare.matches_name("String"));
        assert!(!bare.matches_name("com.acme.String"));

        assert!(TypePattern::parse("*").unwrap().is_trivial());
        assert!(TypePattern::parse("*.*").unwrap().is_trivial());
        assert!(!TypePattern::parse("com.acme.*").unwrap().is_trivial());
    }

    #[test]
    fn test_covariant_type() {
        let types = types();
        let plain = TypePattern::parse("com.acme.Repository").unwrap();
        let covariant = TypePattern::parse("com.acme.Repository+").unwrap();
        assert!(!plain.matches(&types, "com.acme.JdbcRepository"));
        assert!(covariant.matches(&types, "com.acme.JdbcRepository"));
        assert!(covariant.matches(&types, "com.acme.Repository"));
    }

    #[test]
    fn test_params_backtracking() {
        let types = types();
        let string = || ParamPattern::Type(TypePattern::parse("String").unwrap());
        let params = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let leading = vec![ParamPattern::Rest, string()];
        assert!(params_match(&leading, &params(&["u32", "String"]), &types));
        assert!(params_match(&leading, &params(&["String"]), &types));
        assert!(!params_match(&leading, &params(&["String", "u32"]), &types));

        let exact_one = vec![ParamPattern::Type(TypePattern::parse("*").unwrap())];
        assert!(params_match(&exact_one, &params(&["u32"]), &types));
        assert!(!params_match(&exact_one, &params(&[]), &types));

        assert!(params_match(&[], &params(&[]), &types));
        assert!(params_match(&[ParamPattern::Rest], &params(&["a", "b"]), &types));
    }
}
