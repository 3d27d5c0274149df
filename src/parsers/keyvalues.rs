//! # KeyValues 文本解析器
//!
//! 解析 Valve KeyValues 文本（VMT、VMAT、soundscape 脚本共用的格式）。
//!
//! ## 支持的语法
//! - 带引号或裸露的键/值
//! - `//` 行注释
//! - `{ ... }` 嵌套块
//! - 值后的平台条件 `[$X360]`（忽略）
//!
//! ## 依赖关系
//! - 被 `tools/vmat.rs`, `tools/soundscape.rs` 调用

use crate::error::{PortError, ReasonCode, Result};

use std::path::Path;

/// 键值对
#[derive(Debug, Clone, PartialEq)]
pub struct KvPair {
    pub key: String,
    pub value: KvValue,
    /// 键所在行号（从 1 开始）
    pub line: usize,
}

/// 值：字符串或嵌套块
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Str(String),
    Block(Vec<KvPair>),
}

impl KvPair {
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            KvValue::Str(s) => Some(s),
            KvValue::Block(_) => None,
        }
    }

    pub fn children(&self) -> &[KvPair] {
        match &self.value {
            KvValue::Block(items) => items,
            KvValue::Str(_) => &[],
        }
    }
}

/// 大小写无关查找第一个字符串值
pub fn find_str<'a>(pairs: &'a [KvPair], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|p| p.key.eq_ignore_ascii_case(key))
        .and_then(KvPair::as_str)
}

/// 递归收集某个键的全部字符串值
pub fn collect_values<'a>(pairs: &'a [KvPair], key: &str, out: &mut Vec<&'a str>) {
    for pair in pairs {
        match &pair.value {
            KvValue::Str(s) if pair.key.eq_ignore_ascii_case(key) => out.push(s),
            KvValue::Str(_) => {}
            KvValue::Block(children) => collect_values(children, key, out),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 词法分析
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Text { value: String, quoted: bool },
}

fn tokenize(content: &str) -> std::result::Result<Vec<(Token, usize)>, String> {
    let mut tokens = Vec::new();
    let mut chars = content.chars().peekable();
    let mut line = 1usize;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        chars.next();
                    }
                } else {
                    // 单个斜杠开头的裸字符串
                    let mut value = String::from('/');
                    read_bare(&mut chars, &mut value);
                    tokens.push((Token::Text { value, quoted: false }, line));
                }
            }
            '{' => {
                chars.next();
                tokens.push((Token::Open, line));
            }
            '}' => {
                chars.next();
                tokens.push((Token::Close, line));
            }
            '"' => {
                chars.next();
                let start = line;
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.peek() {
                            Some(&'"') | Some(&'\\') => {
                                if let Some(escaped) = chars.next() {
                                    value.push(escaped);
                                }
                            }
                            _ => value.push('\\'),
                        },
                        '\n' => {
                            line += 1;
                            value.push('\n');
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(format!("line {}: unterminated string", start));
                }
                tokens.push((Token::Text { value, quoted: true }, start));
            }
            _ => {
                let mut value = String::new();
                read_bare(&mut chars, &mut value);
                tokens.push((Token::Text { value, quoted: false }, line));
            }
        }
    }

    Ok(tokens)
}

fn read_bare(chars: &mut std::iter::Peekable<std::str::Chars>, value: &mut String) {
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == '"' || c == '{' || c == '}' {
            break;
        }
        value.push(c);
        chars.next();
    }
}

fn is_condition(token: &Token) -> bool {
    matches!(token, Token::Text { value, quoted: false } if value.starts_with('[') && value.ends_with(']'))
}

// ─────────────────────────────────────────────────────────────
// 语法分析
// ─────────────────────────────────────────────────────────────

/// 解析 KeyValues 文本
pub fn parse_keyvalues(content: &str) -> std::result::Result<Vec<KvPair>, String> {
    let tokens = tokenize(content)?;
    let mut pos = 0usize;
    let pairs = parse_block(&tokens, &mut pos, false)?;
    Ok(pairs)
}

/// 解析文件，错误映射为格式错误
pub fn parse_keyvalues_file(path: &Path) -> Result<Vec<KvPair>> {
    let content = crate::tools::read_text(path)?;
    parse_keyvalues(&content)
        .map_err(|reason| PortError::conversion(path, ReasonCode::Malformed, reason))
}

fn parse_block(
    tokens: &[(Token, usize)],
    pos: &mut usize,
    nested: bool,
) -> std::result::Result<Vec<KvPair>, String> {
    let mut pairs = Vec::new();

    while *pos < tokens.len() {
        let (token, line) = &tokens[*pos];
        match token {
            Token::Close => {
                if !nested {
                    return Err(format!("line {}: unexpected '}}'", line));
                }
                *pos += 1;
                return Ok(pairs);
            }
            Token::Open => {
                return Err(format!("line {}: block without a key", line));
            }
            Token::Text { value: key, .. } => {
                let key = key.clone();
                let line = *line;
                *pos += 1;
                skip_conditions(tokens, pos);

                let value = match tokens.get(*pos) {
                    Some((Token::Open, _)) => {
                        *pos += 1;
                        KvValue::Block(parse_block(tokens, pos, true)?)
                    }
                    Some((Token::Text { value, .. }, _)) => {
                        let v = value.clone();
                        *pos += 1;
                        skip_conditions(tokens, pos);
                        KvValue::Str(v)
                    }
                    Some((Token::Close, l)) => {
                        return Err(format!("line {}: key '{}' has no value", l, key))
                    }
                    None => return Err(format!("line {}: key '{}' has no value", line, key)),
                };
                pairs.push(KvPair { key, value, line });
            }
        }
    }

    if nested {
        return Err("unexpected end of file, missing '}'".to_string());
    }
    Ok(pairs)
}

fn skip_conditions(tokens: &[(Token, usize)], pos: &mut usize) {
    while let Some((token, _)) = tokens.get(*pos) {
        if is_condition(token) {
            *pos += 1;
        } else {
            break;
        }
    }
}
