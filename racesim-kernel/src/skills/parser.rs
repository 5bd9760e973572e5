//! Recursive-descent compiler for the skill condition language.
//!
//! ```text
//! or  := and ('@' and)*
//! and := cmp ('&' cmp)*
//! cmp := ident op integer
//! ```
use thiserror::Error;

use super::conditions::{CmpOp, Condition, ConditionVar, Expr, SampledRegion};

/// A condition string that could not be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} at offset {position} (near `{token}`)")]
pub struct ConditionParseError {
    pub position: usize,
    pub token: String,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    Op(CmpOp),
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
    text: String,
}

fn error(position: usize, token: &str, message: &'static str) -> ConditionParseError {
    ConditionParseError {
        position,
        token: token.to_string(),
        message,
    }
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ConditionParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'&' => {
                i += 1;
                Token::And
            }
            b'@' => {
                i += 1;
                Token::Or
            }
            b'=' | b'!' | b'<' | b'>' => {
                let next = bytes.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    (b'=', Some(b'=')) => (CmpOp::Eq, 2),
                    (b'!', Some(b'=')) => (CmpOp::Ne, 2),
                    (b'<', Some(b'=')) => (CmpOp::Le, 2),
                    (b'>', Some(b'=')) => (CmpOp::Ge, 2),
                    (b'<', _) => (CmpOp::Lt, 1),
                    (b'>', _) => (CmpOp::Gt, 1),
                    _ => return Err(error(start, &input[start..=start], "incomplete operator")),
                };
                i += width;
                Token::Op(op)
            }
            b'-' | b'0'..=b'9' => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                let value = text
                    .parse::<i64>()
                    .map_err(|_| error(start, text, "invalid integer"))?;
                Token::Int(value)
            }
            b'a'..=b'z' | b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_lowercase()
                        || bytes[i].is_ascii_digit()
                        || bytes[i] == b'_')
                {
                    i += 1;
                }
                Token::Ident(input[start..i].to_string())
            }
            _ => {
                let end = input[start..]
                    .chars()
                    .next()
                    .map_or(start + 1, |ch| start + ch.len_utf8());
                return Err(error(start, &input[start..end], "unexpected character"));
            }
        };
        tokens.push(Spanned {
            token,
            position: start,
            text: input[start..i].to_string(),
        });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
    sampled: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.cursor).cloned();
        self.cursor += 1;
        token
    }

    fn expect_more(&mut self, message: &'static str) -> Result<Spanned, ConditionParseError> {
        let end = self.end;
        self.advance().ok_or_else(|| error(end, "", message))
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionParseError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek().is_some_and(|t| t.token == Token::Or) {
            self.cursor += 1;
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionParseError> {
        let mut terms = vec![self.parse_cmp()?];
        while self.peek().is_some_and(|t| t.token == Token::And) {
            self.cursor += 1;
            terms.push(self.parse_cmp()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_cmp(&mut self) -> Result<Expr, ConditionParseError> {
        let ident = self.expect_more("expected identifier")?;
        let Token::Ident(name) = &ident.token else {
            return Err(error(ident.position, &ident.text, "expected identifier"));
        };
        let op_token = self.expect_more("expected comparison operator")?;
        let Token::Op(op) = op_token.token else {
            return Err(error(
                op_token.position,
                &op_token.text,
                "expected comparison operator",
            ));
        };
        let value_token = self.expect_more("expected integer")?;
        let Token::Int(value) = value_token.token else {
            return Err(error(
                value_token.position,
                &value_token.text,
                "expected integer",
            ));
        };

        if let Some(region) = SampledRegion::from_name(name) {
            if op != CmpOp::Eq {
                return Err(error(
                    op_token.position,
                    &op_token.text,
                    "sampled trigger only supports ==",
                ));
            }
            let slot = self.sampled;
            self.sampled += 1;
            return Ok(Expr::Sampled {
                region,
                value,
                slot,
            });
        }
        let var = ConditionVar::from_name(name)
            .ok_or_else(|| error(ident.position, name, "unknown condition"))?;
        Ok(Expr::Compare { var, op, value })
    }
}

/// Compile a condition string; empty means always true.
///
/// # Errors
///
/// Returns `ConditionParseError` with the offset and token that failed.
pub fn parse_condition(input: &str) -> Result<Condition, ConditionParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(Condition::always());
    }
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        sampled: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(error(extra.position, &extra.text, "unexpected trailing token"));
    }
    Ok(Condition::new(expr, parser.sampled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_condition_is_always() {
        assert!(parse_condition("").expect("empty parses").is_always());
        assert!(parse_condition("   ").expect("blank parses").is_always());
    }

    #[test]
    fn precedence_binds_and_tighter_than_or() {
        let condition = parse_condition("phase==1&corner!=0@phase>=2").expect("parses");
        let Expr::Or(terms) = condition.expr() else {
            panic!("expected disjunction, got {:?}", condition.expr());
        };
        assert_eq!(terms.len(), 2);
        assert!(matches!(&terms[0], Expr::And(inner) if inner.len() == 2));
        assert_eq!(
            terms[1],
            Expr::Compare {
                var: ConditionVar::Phase,
                op: CmpOp::Ge,
                value: 2
            }
        );
    }

    #[test]
    fn negative_integers_parse() {
        let condition = parse_condition("bashin_diff_behind>-3").expect("parses");
        assert_eq!(
            condition.expr(),
            &Expr::Compare {
                var: ConditionVar::BashinDiffBehind,
                op: CmpOp::Gt,
                value: -3
            }
        );
    }

    #[test]
    fn sampled_terms_get_slots() {
        let condition = parse_condition("phase_random==1@corner_random==2").expect("parses");
        let Expr::Or(terms) = condition.expr() else {
            panic!("expected disjunction");
        };
        assert!(matches!(terms[1], Expr::Sampled { slot: 1, .. }));
    }

    #[test]
    fn unknown_identifier_is_reported_with_offset() {
        let err = parse_condition("phase==1&speedy>=3").expect_err("unknown ident");
        assert_eq!(err.position, 9);
        assert_eq!(err.token, "speedy");
        assert_eq!(err.message, "unknown condition");
    }

    #[test]
    fn malformed_inputs_fail() {
        assert!(parse_condition("phase==").is_err());
        assert!(parse_condition("phase=1").is_err());
        assert!(parse_condition("phase==1&").is_err());
        assert!(parse_condition("phase==1 2").is_err());
        assert!(parse_condition("Phase==1").is_err());
        assert!(parse_condition("phase_random>=1").is_err());
        assert!(parse_condition("phase==x").is_err());
    }
}
