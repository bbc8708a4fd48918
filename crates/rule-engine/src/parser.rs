//! 规则解析器
//!
//! 基于调度场算法（shunting-yard）把 token 序列解析为 AST：
//! 输出栈保存已构建的节点，操作符栈保存待处理的逻辑操作符和左括号。

use crate::ast::Node;
use crate::error::{Result, RuleError};
use crate::models::Scalar;
use crate::operators::{CompareOp, LogicalOp};
use crate::tokenizer::Tokenizer;

/// 默认的最大树深度
///
/// 评估、序列化和释放 AST 都是递归的，深度必须有上限；
/// 同时低于 serde_json 的 128 层嵌套限制，保证持久化形式可以被读回。
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// 解析选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// 严格模式：拒绝未闭合的引号，以及解析结束后输出栈中多余的节点
    pub strict: bool,
    /// 允许的最大树深度，比较节点的深度为 2
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Default::default()
        }
    }
}

/// 操作符栈中的条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackEntry {
    LeftParen,
    Logical(LogicalOp),
}

/// 规则解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleParser {
    options: ParseOptions,
}

impl RuleParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self::with_options(ParseOptions::strict())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    /// 解析规则文本
    pub fn parse(&self, rule: &str) -> Result<Node> {
        let tokenizer = if self.options.strict {
            Tokenizer::strict()
        } else {
            Tokenizer::new()
        };
        let tokens = tokenizer.tokenize(rule)?;
        self.parse_tokens(&tokens)
    }

    /// 解析 token 序列
    pub fn parse_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Node> {
        if tokens.is_empty() {
            return Err(RuleError::Parse("规则为空".to_string()));
        }

        // 输出栈同时记录每个节点的深度，避免重复递归计算
        let mut output: Vec<(Node, usize)> = Vec::new();
        let mut operators: Vec<StackEntry> = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i].as_ref();

            if token == "(" {
                operators.push(StackEntry::LeftParen);
            } else if token == ")" {
                loop {
                    match operators.pop() {
                        Some(StackEntry::LeftParen) => break,
                        Some(StackEntry::Logical(op)) => self.apply_operator(&mut output, op)?,
                        None => {
                            return Err(RuleError::Parse(format!(
                                "第 {} 个 token 处的 ')' 没有匹配的 '('",
                                i + 1
                            )));
                        }
                    }
                }
            } else if let Some(op) = LogicalOp::from_keyword(token) {
                while let Some(StackEntry::Logical(top)) = operators.last().copied() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    operators.pop();
                    self.apply_operator(&mut output, top)?;
                }
                operators.push(StackEntry::Logical(op));
            } else {
                let comparison = Self::parse_comparison(tokens, i)?;
                let depth = comparison.depth();
                output.push((comparison, depth));
                i += 3;
                continue;
            }

            i += 1;
        }

        while let Some(entry) = operators.pop() {
            match entry {
                StackEntry::LeftParen => {
                    return Err(RuleError::Parse("'(' 没有闭合".to_string()));
                }
                StackEntry::Logical(op) => self.apply_operator(&mut output, op)?,
            }
        }

        if self.options.strict && output.len() > 1 {
            return Err(RuleError::Parse(format!(
                "规则末尾存在 {} 个多余的表达式",
                output.len() - 1
            )));
        }

        // 宽松模式下与原有行为一致：忽略多余节点，返回第一个
        output
            .into_iter()
            .next()
            .map(|(node, _)| node)
            .ok_or_else(|| RuleError::Parse("规则没有产生任何表达式".to_string()))
    }

    /// 解析 `field op literal` 三元组
    fn parse_comparison<S: AsRef<str>>(tokens: &[S], start: usize) -> Result<Node> {
        if start + 2 >= tokens.len() {
            let rest: Vec<&str> = tokens[start..].iter().map(AsRef::as_ref).collect();
            return Err(RuleError::Parse(format!(
                "比较表达式不完整: '{}'",
                rest.join(" ")
            )));
        }

        let field = tokens[start].as_ref();
        let operator: CompareOp = tokens[start + 1].as_ref().parse()?;
        let literal = convert_literal(tokens[start + 2].as_ref());

        Ok(Node::comparison(operator, field, literal))
    }

    /// 弹出两个节点并组合为逻辑节点，超过最大深度时报错
    fn apply_operator(&self, output: &mut Vec<(Node, usize)>, op: LogicalOp) -> Result<()> {
        let (Some((right, right_depth)), Some((left, left_depth))) = (output.pop(), output.pop())
        else {
            return Err(RuleError::Parse(format!("操作符 {} 缺少操作数", op)));
        };

        let depth = 1 + left_depth.max(right_depth);
        if depth > self.options.max_depth {
            return Err(RuleError::Parse(format!(
                "规则嵌套深度 {} 超过上限 {}",
                depth, self.options.max_depth
            )));
        }

        output.push((Node::logical(op, left, right), depth));
        Ok(())
    }
}

/// 字面量转换
///
/// 以引号开头的 token 去除首尾引号后作为字符串；
/// 否则依次尝试整数、有限浮点数，都失败时保留原始字符串。
/// `inf`、`nan`、`1e999` 等非有限值保留为字符串，JSON 无法表示它们。
pub fn convert_literal(token: &str) -> Scalar {
    if token.starts_with(['\'', '"']) {
        return Scalar::Str(token.trim_matches(['\'', '"']).to_string());
    }
    if let Ok(i) = token.parse::<i64>() {
        return Scalar::Int(i);
    }
    match token.parse::<f64>() {
        Ok(f) if f.is_finite() => Scalar::Float(f),
        _ => Scalar::Str(token.to_string()),
    }
}

/// 使用默认（宽松）选项解析规则
pub fn parse(rule: &str) -> Result<Node> {
    RuleParser::new().parse(rule)
}
