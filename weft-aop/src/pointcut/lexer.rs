//! 切点表达式词法分析

use crate::error::PointcutSyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// 名称、类型、通配符：由字母数字与 `_ $ . * +` 组成
    Word(String),
    LParen,
    RParen,
    Comma,
    Not,
    AndAnd,
    OrOr,
    At,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Word(word) => format!("'{}'", word),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Not => "'!'".to_string(),
            TokenKind::AndAnd => "'&&'".to_string(),
            TokenKind::OrOr => "'||'".to_string(),
            TokenKind::At => "'@'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 字符偏移
    pub position: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '*' | '+')
}

pub(crate) fn tokenize(expression: &str) -> Result<Vec<Token>, PointcutSyntaxError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let position = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '!' => TokenKind::Not,
            '@' => TokenKind::At,
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(PointcutSyntaxError::new(
                        expression,
                        format!("expected '{}{}'", c, c),
                        position,
                    ));
                }
                i += 1;
                if c == '&' {
                    TokenKind::AndAnd
                } else {
                    TokenKind::OrOr
                }
            }
            c if is_word_char(c) => {
                let start = i;
                while i + 1 < chars.len() && is_word_char(chars[i + 1]) {
                    i += 1;
                }
                TokenKind::Word(chars[start..=i].iter().collect())
            }
            other => {
                return Err(PointcutSyntaxError::new(
                    expression,
                    format!("unexpected character '{}'", other),
                    position,
                ));
            }
        };

        tokens.push(Token { kind, position });
        i += 1;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(expression: &str) -> Vec<TokenKind> {
        tokenize(expression).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_execution() {
        assert_eq!(
            kinds("execution(* com.acme.*.save(..))"),
            vec![
                TokenKind::Word("execution".into()),
                TokenKind::LParen,
                TokenKind::Word("*".into()),
                TokenKind::Word("com.acme.*.save".into()),
                TokenKind::LParen,
                TokenKind::Word("..".into()),
                TokenKind::RParen,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("!@within(A) && b || c").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Not);
        assert_eq!(tokens[1].kind, TokenKind::At);
        assert_eq!(tokens[6].kind, TokenKind::AndAnd);
        assert_eq!(tokens[6].position, 12);
        assert_eq!(tokens[8].kind, TokenKind::OrOr);
    }

    #[test]
    fn test_single_ampersand() {
        let err = tokenize("a & b").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.message, "expected '&&'");
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("within(a#b)").unwrap_err();
        assert_eq!(err.position, 8);
    }
}
