//! 规则引擎
//!
//! 把 `age > 30 AND department = 'Sales'` 这类规则文本编译为 AST，
//! 对扁平记录求值，并支持把多条规则合并为一棵树：
//! - 分词与调度场算法解析
//! - 不短路的递归评估
//! - 规则合并与一次后序优化
//! - 内存规则存储与 HTTP 接口

pub mod api;
pub mod ast;
pub mod combiner;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod parser;
pub mod service;
pub mod store;
pub mod tokenizer;

pub use ast::{Node, NodeMapping, NodeType};
pub use combiner::{combine_rules, optimize};
pub use error::{Result, RuleError};
pub use evaluator::{RuleEvaluator, evaluate};
pub use models::{EvaluationResult, Record, Scalar};
pub use operators::{CompareOp, LogicalOp, NodeOperator};
pub use parser::{ParseOptions, RuleParser, parse};
pub use service::{CombineRules, RuleEvaluation, RulePage, RuleService};
pub use store::{RuleRepository, RuleStore, RuleUpdate, StoredRule};
pub use tokenizer::{Tokenizer, tokenize};
