//! 规则评估器
//!
//! 递归解释 AST，对扁平记录求布尔值。
//! 逻辑节点总是先评估左子树再评估右子树，不做短路。

use crate::ast::Node;
use crate::error::{Result, RuleError};
use crate::models::{EvaluationResult, Record, Scalar};
use crate::operators::CompareOp;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;

/// 比较函数：(字段值, 字面量) -> 是否满足
type Comparator = fn(&Scalar, &Scalar) -> Result<bool>;

/// 操作符到比较函数的调度表，进程内只构建一次且不可变
static COMPARATORS: LazyLock<HashMap<CompareOp, Comparator>> = LazyLock::new(|| {
    let mut table: HashMap<CompareOp, Comparator> = HashMap::with_capacity(CompareOp::ALL.len());
    table.insert(CompareOp::Gt, |a, b| numeric(a, b, |x, y| x > y));
    table.insert(CompareOp::Lt, |a, b| numeric(a, b, |x, y| x < y));
    table.insert(CompareOp::Gte, |a, b| numeric(a, b, |x, y| x >= y));
    table.insert(CompareOp::Lte, |a, b| numeric(a, b, |x, y| x <= y));
    table.insert(CompareOp::Eq, |a, b| Ok(a.to_string() == b.to_string()));
    table.insert(CompareOp::Neq, |a, b| Ok(a.to_string() != b.to_string()));
    table
});

/// 数值比较，两侧都需要能转换为浮点数
fn numeric(field: &Scalar, literal: &Scalar, cmp: fn(f64, f64) -> bool) -> Result<bool> {
    Ok(cmp(to_number(field)?, to_number(literal)?))
}

fn to_number(value: &Scalar) -> Result<f64> {
    value.as_f64().ok_or_else(|| RuleError::EvaluationConversion {
        value: value.to_string(),
    })
}

/// 应用比较操作符
pub fn compare(operator: CompareOp, field_value: &Scalar, literal: &Scalar) -> Result<bool> {
    // 调度表覆盖全部操作符
    match COMPARATORS.get(&operator) {
        Some(comparator) => comparator(field_value, literal),
        None => Err(RuleError::InvalidOperator(operator.to_string())),
    }
}

/// 评估规则
///
/// 字段不存在时比较结果为 false，不视为错误；
/// 只有数值比较的类型转换失败才会返回错误。
pub fn evaluate(node: &Node, record: &Record) -> Result<bool> {
    match node {
        Node::Operand(_) => Ok(false),
        Node::Comparison { .. } => {
            let Some((operator, field, literal)) = node.as_comparison() else {
                return Ok(false);
            };
            match record.get(&field.to_string()) {
                Some(value) => compare(operator, value, literal),
                None => Ok(false),
            }
        }
        Node::Logical {
            operator,
            left,
            right,
        } => {
            let left_result = evaluate(left, record)?;
            let right_result = evaluate(right, record)?;
            Ok(operator.apply(left_result, right_result))
        }
    }
}

/// 带追踪的规则评估器
///
/// 结果与 [`evaluate`] 一致，额外记录命中的条件和逐节点追踪信息。
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 执行规则评估
    pub fn execute(&self, node: &Node, record: &Record) -> Result<EvaluationResult> {
        let start = Instant::now();
        let mut result = EvaluationResult::default();

        result.matched = self.evaluate_node(node, record, &mut result, "root")?;
        result.evaluation_time_ms = start.elapsed().as_millis() as i64;

        Ok(result)
    }

    fn evaluate_node(
        &self,
        node: &Node,
        record: &Record,
        result: &mut EvaluationResult,
        path: &str,
    ) -> Result<bool> {
        match node {
            Node::Operand(value) => {
                self.trace(result, || format!("{}: 独立操作数 {} => false", path, value));
                Ok(false)
            }
            Node::Comparison { .. } => {
                let matched = evaluate(node, record)?;
                self.trace(result, || {
                    format!(
                        "{}: {} => {}",
                        path,
                        node,
                        if matched { "MATCHED" } else { "NOT_MATCHED" }
                    )
                });
                if matched {
                    result.matched_conditions.push(format!("{}: {}", path, node));
                }
                Ok(matched)
            }
            Node::Logical {
                operator,
                left,
                right,
            } => {
                let left_matched =
                    self.evaluate_node(left, record, result, &format!("{}.left", path))?;
                let right_matched =
                    self.evaluate_node(right, record, result, &format!("{}.right", path))?;
                let matched = operator.apply(left_matched, right_matched);
                self.trace(result, || {
                    format!(
                        "{}: {} {} {} => {}",
                        path, left_matched, operator, right_matched, matched
                    )
                });
                Ok(matched)
            }
        }
    }

    fn trace(&self, result: &mut EvaluationResult, line: impl FnOnce() -> String) {
        if self.trace_enabled {
            result.evaluation_trace.push(line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn record(pairs: &[(&str, Scalar)]) -> Record {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_evaluate_simple_rule() {
        let node = parse("age > 30").unwrap();

        assert!(evaluate(&node, &Record::new().with("age", 35)).unwrap());
        assert!(!evaluate(&node, &Record::new().with("age", 25)).unwrap());
        assert!(!evaluate(&node, &Record::new()).unwrap());
    }

    #[test]
    fn test_evaluate_complex_rule() {
        let node = parse("age > 30 AND department = 'Sales'").unwrap();

        let sales = record(&[("age", Scalar::Int(35)), ("department", Scalar::from("Sales"))]);
        let hr = record(&[("age", Scalar::Int(35)), ("department", Scalar::from("HR"))]);

        assert!(evaluate(&node, &sales).unwrap());
        assert!(!evaluate(&node, &hr).unwrap());
    }

    #[test]
    fn test_missing_field_is_false() {
        let node = parse("age > 30").unwrap();
        assert!(!evaluate(&node, &Record::new().with("salary", 50000)).unwrap());
    }

    #[test]
    fn test_numeric_comparisons() {
        let rec = Record::new().with("x", 10);
        assert!(evaluate(&parse("x >= 10").unwrap(), &rec).unwrap());
        assert!(evaluate(&parse("x <= 10").unwrap(), &rec).unwrap());
        assert!(evaluate(&parse("x < 10.5").unwrap(), &rec).unwrap());
        assert!(!evaluate(&parse("x < 10").unwrap(), &rec).unwrap());
    }

    #[test]
    fn test_numeric_string_values_are_coerced() {
        let node = parse("age > 30").unwrap();
        assert!(evaluate(&node, &Record::new().with("age", "35")).unwrap());
    }

    #[test]
    fn test_conversion_error() {
        let node = parse("age > 'abc'").unwrap();
        let err = evaluate(&node, &Record::new().with("age", 3)).unwrap_err();
        assert!(matches!(err, RuleError::EvaluationConversion { ref value } if value == "abc"));

        let node = parse("age > 30").unwrap();
        let err = evaluate(&node, &Record::new().with("age", "old")).unwrap_err();
        assert_eq!(err.code(), "EVALUATION_CONVERSION_ERROR");
    }

    #[test]
    fn test_equality_uses_string_form() {
        let node = parse("code = 30").unwrap();
        assert!(evaluate(&node, &Record::new().with("code", "30")).unwrap());

        let node = parse("code = 30.0").unwrap();
        assert!(!evaluate(&node, &Record::new().with("code", 30)).unwrap());

        let node = parse("department != 'HR'").unwrap();
        assert!(evaluate(&node, &Record::new().with("department", "Sales")).unwrap());
    }

    #[test]
    fn test_no_short_circuit_left_error_first() {
        // OR 左侧为 true 时仍会评估右侧，因此右侧的转换错误会暴露
        let node = parse("a = 1 OR b > 1").unwrap();
        let rec = Record::new().with("a", 1).with("b", "x");
        assert!(evaluate(&node, &rec).is_err());

        // 两侧都出错时返回左侧的错误
        let node = parse("a > 1 AND b > 1").unwrap();
        let rec = Record::new().with("a", "left").with("b", "right");
        let err = evaluate(&node, &rec).unwrap_err();
        assert!(matches!(err, RuleError::EvaluationConversion { ref value } if value == "left"));
    }

    #[test]
    fn test_operand_alone_is_false() {
        assert!(!evaluate(&Node::operand("age"), &Record::new().with("age", 1)).unwrap());
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let node = parse("(age > 30 AND department = 'Sales') OR salary >= 50000").unwrap();
        let rec = Record::new().with("age", 25).with("salary", 60000);

        let first = evaluate(&node, &rec).unwrap();
        let second = evaluate(&node, &rec).unwrap();
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_evaluator_with_trace() {
        let node = parse("age > 30 AND department = 'Sales'").unwrap();
        let rec = Record::new().with("age", 35).with("department", "HR");

        let result = RuleEvaluator::new().with_trace().execute(&node, &rec).unwrap();

        assert!(!result.matched);
        assert_eq!(result.matched_conditions, vec!["root.left: age > 30"]);
        assert_eq!(result.evaluation_trace.len(), 3);
        assert!(result.evaluation_trace[2].starts_with("root: true AND false"));
    }

    #[test]
    fn test_evaluator_without_trace() {
        let node = parse("age > 30").unwrap();
        let result = RuleEvaluator::new()
            .execute(&node, &Record::new().with("age", 40))
            .unwrap();

        assert!(result.matched);
        assert!(result.evaluation_trace.is_empty());
        assert_eq!(result.matched_conditions.len(), 1);
    }

    #[test]
    fn test_comparator_table_covers_all_operators() {
        for op in CompareOp::ALL {
            assert!(compare(op, &Scalar::Int(1), &Scalar::Int(1)).is_ok());
        }
    }
}
