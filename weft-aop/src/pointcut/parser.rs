//! 切点表达式解析
//!
//! 语法：
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | primary
//! primary := "(" or ")"
//!          | "execution" "(" <返回类型> <[类型.]方法名> "(" <参数, ...> ")" ")"
//!          | "autowire" "(" <字段类型> [字段名] ")"
//!          | "within" "(" <类型> ")" | "target" "(" <类型> ")"
//!          | "@within" | "@target" | "@execution" | "@autowire" "(" <注解> ")"
//! ```
//!
//! `target` / `@target` 本身不属于任何域，由相邻的 `execution` / `autowire` 决定。
//! 顶层 `||` 的各分支可以分属两个域，此时按域分组后用跨域 OR 连接；
//! 其它位置混用两个域是契约违反。

use std::sync::Arc;

use super::lexer::{tokenize, Token, TokenKind};
use super::pattern::{FieldPattern, MethodPattern, NamePattern, ParamPattern, TypePattern};
use super::{Domain, Pointcut};
use crate::error::{AopError, AopResult, PointcutSyntaxError};

#[derive(Debug)]
enum Leaf {
    Execution(MethodPattern),
    Autowire(FieldPattern),
    Within(TypePattern),
    AtWithin(TypePattern),
    AtExecution(TypePattern),
    AtAutowire(TypePattern),
    Target(TypePattern),
    AtTarget(TypePattern),
}

impl Leaf {
    fn domain(&self) -> Option<Domain> {
        match self {
            Leaf::Execution(_) | Leaf::Within(_) | Leaf::AtWithin(_) | Leaf::AtExecution(_) => {
                Some(Domain::Execution)
            }
            Leaf::Autowire(_) | Leaf::AtAutowire(_) => Some(Domain::Autowire),
            Leaf::Target(_) | Leaf::AtTarget(_) => None,
        }
    }
}

#[derive(Debug)]
enum Ast {
    Leaf(Leaf),
    And(Box<Ast>, Box<Ast>, usize),
    Or(Box<Ast>, Box<Ast>, usize),
    Not(Box<Ast>),
}

/// 括号与 `!` 的最大嵌套层数
pub const MAX_NESTING: usize = 64;

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str) -> Result<Self, PointcutSyntaxError> {
        Ok(Self {
            expression,
            tokens: tokenize(expression)?,
            pos: 0,
            end: expression.chars().count(),
            depth: 0,
        })
    }

    fn error(&self, message: impl Into<String>, position: usize) -> PointcutSyntaxError {
        PointcutSyntaxError::new(self.expression, message, position)
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |t| t.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> PointcutSyntaxError {
        match self.peek() {
            Some(kind) => self.error(
                format!("expected {}, found {}", expected, kind.describe()),
                self.position(),
            ),
            None => self.error(format!("expected {}, found end of expression", expected), self.end),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), PointcutSyntaxError> {
        if self.peek() == Some(&kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn word(&mut self, expected: &str) -> Result<(String, usize), PointcutSyntaxError> {
        match self.peek() {
            Some(TokenKind::Word(_)) => match self.advance() {
                Some(Token {
                    kind: TokenKind::Word(word),
                    position,
                }) => Ok((word, position)),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn parse(mut self) -> Result<Ast, PointcutSyntaxError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty pointcut expression", 0));
        }
        let ast = self.parse_or()?;
        if self.pos < self.tokens.len() {
            return Err(self.unexpected("'&&', '||' or end of expression"));
        }
        Ok(ast)
    }

    fn parse_or(&mut self) -> Result<Ast, PointcutSyntaxError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&TokenKind::OrOr) {
            let position = self.position();
            self.pos += 1;
            let right = self.parse_and()?;
            left = Ast::Or(Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Ast, PointcutSyntaxError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&TokenKind::AndAnd) {
            let position = self.position();
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Ast::And(Box::new(left), Box::new(right), position);
        }
        Ok(left)
    }

    /// 进入一层嵌套，超过 [`MAX_NESTING`] 时报错
    fn nest<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, PointcutSyntaxError>,
    ) -> Result<T, PointcutSyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(
                format!("expression nests deeper than {} levels", MAX_NESTING),
                self.position(),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_unary(&mut self) -> Result<Ast, PointcutSyntaxError> {
        if self.peek() == Some(&TokenKind::Not) {
            let inner = self.nest(|parser| {
                parser.pos += 1;
                parser.parse_unary()
            })?;
            return Ok(Ast::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast, PointcutSyntaxError> {
        match self.peek() {
            Some(TokenKind::LParen) => self.nest(|parser| {
                parser.pos += 1;
                let inner = parser.parse_or()?;
                parser.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }),
            Some(TokenKind::At) => {
                self.pos += 1;
                let (designator, position) = self.word("annotation designator")?;
                self.expect(TokenKind::LParen, "'('")?;
                let pattern = self.type_pattern("annotation type", false)?;
                self.expect(TokenKind::RParen, "')'")?;
                let leaf = match designator.as_str() {
                    "within" => Leaf::AtWithin(pattern),
                    "target" => Leaf::AtTarget(pattern),
                    "execution" => Leaf::AtExecution(pattern),
                    "autowire" => Leaf::AtAutowire(pattern),
                    other => {
                        return Err(self.error(format!("unknown designator '@{}'", other), position));
                    }
                };
                Ok(Ast::Leaf(leaf))
            }
            Some(TokenKind::Word(_)) => {
                let (designator, position) = self.word("designator")?;
                self.expect(TokenKind::LParen, "'('")?;
                let leaf = match designator.as_str() {
                    "execution" => Leaf::Execution(self.method_pattern()?),
                    "autowire" => Leaf::Autowire(self.field_pattern()?),
                    "within" => Leaf::Within(self.type_pattern("type", true)?),
                    "target" => Leaf::Target(self.type_pattern("type", true)?),
                    other => {
                        return Err(self.error(format!("unknown designator '{}'", other), position));
                    }
                };
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Ast::Leaf(leaf))
            }
            _ => Err(self.unexpected("pointcut designator")),
        }
    }

    fn name_pattern(&self, text: &str, position: usize) -> Result<NamePattern, PointcutSyntaxError> {
        NamePattern::parse(text).map_err(|e| self.error(format!("invalid name pattern: {}", e), position))
    }

    fn type_from(
        &self,
        text: &str,
        position: usize,
        covariance: bool,
    ) -> Result<TypePattern, PointcutSyntaxError> {
        if text.contains("..") {
            return Err(self.error(format!("'..' is not allowed in type pattern '{}'", text), position));
        }
        if let Some(offset) = text.find('+') {
            if !covariance || offset + 1 != text.len() {
                return Err(self.error("unexpected covariance marker '+'", position + text[..offset].chars().count()));
            }
        }
        TypePattern::parse(text).map_err(|e| self.error(format!("invalid type pattern: {}", e), position))
    }

    fn type_pattern(&mut self, expected: &str, covariance: bool) -> Result<TypePattern, PointcutSyntaxError> {
        let (text, position) = self.word(expected)?;
        self.type_from(&text, position, covariance)
    }

    fn method_pattern(&mut self) -> Result<MethodPattern, PointcutSyntaxError> {
        let return_type = self.type_pattern("return type", true)?;
        let (qualified, position) = self.word("method name")?;

        let (declaring_type, name) = match qualified.rsplit_once('.') {
            Some((declaring, name)) => {
                let declaring = self.type_from(declaring, position, true)?;
                let name_position = position + declaring.as_str().chars().count() + 1;
                (Some(declaring), self.checked_name(name, name_position)?)
            }
            None => (None, self.checked_name(&qualified, position)?),
        };

        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != Some(&TokenKind::RParen) {
            loop {
                let (text, position) = self.word("parameter type")?;
                if text == ".." {
                    params.push(ParamPattern::Rest);
                } else {
                    params.push(ParamPattern::Type(self.type_from(&text, position, true)?));
                }
                if self.peek() == Some(&TokenKind::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;

        Ok(MethodPattern {
            return_type,
            declaring_type,
            name,
            params,
        })
    }

    fn checked_name(&self, name: &str, position: usize) -> Result<NamePattern, PointcutSyntaxError> {
        if name.is_empty() || name.contains('+') {
            return Err(self.error(format!("invalid method name '{}'", name), position));
        }
        self.name_pattern(name, position)
    }

    fn field_pattern(&mut self) -> Result<FieldPattern, PointcutSyntaxError> {
        let field_type = self.type_pattern("field type", true)?;
        let name = match self.peek() {
            Some(TokenKind::Word(_)) => {
                let (text, position) = self.word("field name")?;
                if text.contains(['.', '+']) {
                    return Err(self.error(format!("invalid field name '{}'", text), position));
                }
                Some(self.name_pattern(&text, position)?)
            }
            _ => None,
        };
        Ok(FieldPattern { field_type, name })
    }
}

// ========== 编译为切点 ==========

fn divergent(expression: &str, position: usize) -> AopError {
    AopError::DivergentCrosscut(format!(
        "'{}' mixes execution and autowire designators at position {}",
        expression, position
    ))
}

/// 推断子树所属的域，None 表示只含 `target` / `@target`
fn infer(ast: &Ast, expression: &str) -> AopResult<Option<Domain>> {
    match ast {
        Ast::Leaf(leaf) => Ok(leaf.domain()),
        Ast::Not(inner) => infer(inner, expression),
        Ast::And(left, right, position) | Ast::Or(left, right, position) => {
            match (infer(left, expression)?, infer(right, expression)?) {
                (Some(a), Some(b)) if a != b => Err(divergent(expression, *position)),
                (Some(a), _) | (None, Some(a)) => Ok(Some(a)),
                (None, None) => Ok(None),
            }
        }
    }
}

fn build(ast: &Ast, domain: Domain) -> AopResult<Arc<Pointcut>> {
    let pointcut = match ast {
        Ast::Leaf(leaf) => match leaf {
            Leaf::Execution(pattern) => Pointcut::execution(pattern.clone()),
            Leaf::Autowire(pattern) => Pointcut::autowire(pattern.clone()),
            Leaf::Within(pattern) => Pointcut::within(pattern.clone()),
            Leaf::AtWithin(pattern) => Pointcut::at_within(pattern.clone()),
            Leaf::AtExecution(pattern) => Pointcut::at_execution(pattern.clone()),
            Leaf::AtAutowire(pattern) => Pointcut::at_autowire(pattern.clone()),
            Leaf::Target(pattern) => Pointcut::target(pattern.clone(), domain),
            Leaf::AtTarget(pattern) => Pointcut::at_target(pattern.clone(), domain),
        },
        Ast::And(left, right, _) => {
            let (left, right) = (build(left, domain)?, build(right, domain)?);
            match domain {
                Domain::Execution => Pointcut::execution_and(left, right)?,
                Domain::Autowire => Pointcut::autowire_and(left, right)?,
            }
        }
        Ast::Or(left, right, _) => {
            let (left, right) = (build(left, domain)?, build(right, domain)?);
            match domain {
                Domain::Execution => Pointcut::execution_or(left, right)?,
                Domain::Autowire => Pointcut::autowire_or(left, right)?,
            }
        }
        Ast::Not(inner) => {
            let inner = build(inner, domain)?;
            match domain {
                Domain::Execution => Pointcut::negate_execution(inner)?,
                Domain::Autowire => Pointcut::negate_autowire(inner)?,
            }
        }
    };
    Ok(Arc::new(pointcut))
}

fn flatten_or<'t>(ast: &'t Ast, out: &mut Vec<&'t Ast>) {
    match ast {
        Ast::Or(left, right, _) => {
            flatten_or(left, out);
            flatten_or(right, out);
        }
        other => out.push(other),
    }
}

fn fold(branches: &[&Ast], domain: Domain) -> AopResult<Option<Arc<Pointcut>>> {
    let mut result: Option<Arc<Pointcut>> = None;
    for branch in branches {
        let next = build(branch, domain)?;
        result = Some(match result {
            None => next,
            Some(acc) => Arc::new(match domain {
                Domain::Execution => Pointcut::execution_or(acc, next)?,
                Domain::Autowire => Pointcut::autowire_or(acc, next)?,
            }),
        });
    }
    Ok(result)
}

/// 解析切点表达式
pub fn parse(expression: &str) -> AopResult<Arc<Pointcut>> {
    let ast = Parser::new(expression)?.parse()?;

    let mut branches = Vec::new();
    flatten_or(&ast, &mut branches);

    let mut execution = Vec::new();
    let mut autowire = Vec::new();
    let mut neutral = Vec::new();
    for branch in branches {
        match infer(branch, expression)? {
            Some(Domain::Execution) => execution.push(branch),
            Some(Domain::Autowire) => autowire.push(branch),
            None => neutral.push(branch),
        }
    }

    // 只含 target 的分支同时适用于已出现的域
    if !execution.is_empty() {
        execution.extend(neutral.iter().copied());
    }
    if !autowire.is_empty() {
        autowire.extend(neutral.iter().copied());
    }

    match (fold(&execution, Domain::Execution)?, fold(&autowire, Domain::Autowire)?) {
        (Some(execution), Some(autowire)) => Ok(Arc::new(Pointcut::divergent_or(execution, autowire)?)),
        (Some(single), None) | (None, Some(single)) => Ok(single),
        (None, None) => Err(PointcutSyntaxError::new(
            expression,
            "pointcut needs an execution or autowire designator",
            0,
        )
        .into()),
    }
}
