//! 规则分词器
//!
//! 将规则文本切分为有序的字符串 token。
//!
//! 约束：比较操作符和 `AND` / `OR` 关键字两侧必须有空白，
//! `age>30` 会被视为单个 token，而不是三个。括号不受此限制。

use crate::error::{Result, RuleError};

/// 规则分词器
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    /// 严格模式下未闭合的引号视为错误
    strict: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// 执行分词
    ///
    /// 引号内的字符（包括空白和括号）原样保留，token 中包含引号本身，
    /// 遇到与开头相同的引号时结束。宽松模式下未闭合的引号会把剩余文本作为一个 token 输出。
    pub fn tokenize(&self, input: &str) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut quote: Option<(char, usize)> = None;

        for (pos, ch) in input.char_indices() {
            if let Some((open, _)) = quote {
                current.push(ch);
                if ch == open {
                    tokens.push(std::mem::take(&mut current));
                    quote = None;
                }
                continue;
            }

            match ch {
                '\'' | '"' => {
                    Self::flush(&mut current, &mut tokens);
                    current.push(ch);
                    quote = Some((ch, pos));
                }
                '(' | ')' => {
                    Self::flush(&mut current, &mut tokens);
                    tokens.push(ch.to_string());
                }
                c if c.is_whitespace() => Self::flush(&mut current, &mut tokens),
                c => current.push(c),
            }
        }

        if let Some((open, pos)) = quote {
            if self.strict {
                return Err(RuleError::Tokenize(format!(
                    "位置 {} 的引号 {} 未闭合",
                    pos, open
                )));
            }
        }
        Self::flush(&mut current, &mut tokens);

        Ok(tokens)
    }

    fn flush(current: &mut String, tokens: &mut Vec<String>) {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    }
}

/// 使用宽松模式分词
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    Tokenizer::new().tokenize(input)
}
