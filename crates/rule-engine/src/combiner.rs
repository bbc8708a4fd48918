//! 规则合并与优化
//!
//! 把多条规则的 AST 按同一个逻辑操作符左折叠为一棵树，
//! 然后执行一次后序优化：合并 OR 节点下字段和操作符都相同的两个比较子节点。
//!
//! 合并时总是取两个字面量中较大的一个，与比较操作符无关。
//! 这只对 `>` 语义正确，对 `<`、`=` 等操作符会改变规则含义，属于保留的既有行为。

use crate::ast::Node;
use crate::error::{Result, RuleError};
use crate::models::Scalar;
use crate::operators::LogicalOp;
use std::cmp::Ordering;
use tracing::debug;

/// 合并多条规则
///
/// 输入不会被修改，返回的是新构建的树。
pub fn combine_rules(nodes: &[Node], operator: LogicalOp) -> Result<Node> {
    let (first, rest) = match nodes {
        [] => return Err(RuleError::EmptyInput),
        [_] => return Err(RuleError::SingleRule),
        [first, rest @ ..] => (first, rest),
    };

    let combined = rest.iter().fold(first.clone(), |acc, node| {
        Node::logical(operator, acc, node.clone())
    });

    Ok(optimize(&combined))
}

/// 后序优化，每个节点只访问一次
///
/// 只合并直接相邻的兄弟比较节点，不会跨层查找重复条件。
pub fn optimize(node: &Node) -> Node {
    match node {
        Node::Logical {
            operator,
            left,
            right,
        } => {
            let left = optimize(left);
            let right = optimize(right);

            if *operator == LogicalOp::Or {
                if let Some(merged) = merge_siblings(&left, &right) {
                    return merged;
                }
            }

            Node::logical(*operator, left, right)
        }
        other => other.clone(),
    }
}

/// 尝试合并两个比较节点，要求字段和操作符相同
fn merge_siblings(left: &Node, right: &Node) -> Option<Node> {
    let (left_op, left_field, left_literal) = left.as_comparison()?;
    let (right_op, right_field, right_literal) = right.as_comparison()?;

    if left_op != right_op || left_field != right_field {
        return None;
    }

    let literal = max_literal(left_literal, right_literal)?;
    debug!(
        field = %left_field,
        operator = %left_op,
        literal = %literal,
        "合并 OR 兄弟比较节点"
    );

    Some(Node::Comparison {
        operator: left_op,
        left: Box::new(Node::Operand(left_field.clone())),
        right: Box::new(Node::Operand(literal.clone())),
    })
}

/// 取较大的字面量，相等时保留左侧；不可比较时返回 None
fn max_literal<'a>(left: &'a Scalar, right: &'a Scalar) -> Option<&'a Scalar> {
    match left.compare_literal(right)? {
        Ordering::Less => Some(right),
        Ordering::Equal | Ordering::Greater => Some(left),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::CompareOp;
    use crate::parser::parse;

    #[test]
    fn test_combine_empty_input() {
        assert!(matches!(
            combine_rules(&[], LogicalOp::And),
            Err(RuleError::EmptyInput)
        ));
    }

    #[test]
    fn test_combine_single_rule() {
        let rule = parse("age > 30").unwrap();
        let err = combine_rules(&[rule], LogicalOp::And).unwrap_err();
        assert!(matches!(err, RuleError::SingleRule));
        assert_eq!(err.code(), "SINGLE_RULE");
    }

    #[test]
    fn test_combine_left_fold() {
        let a = parse("a = 1").unwrap();
        let b = parse("b = 2").unwrap();
        let c = parse("c = 3").unwrap();

        let combined = combine_rules(&[a.clone(), b.clone(), c.clone()], LogicalOp::And).unwrap();
        assert_eq!(combined, Node::and(Node::and(a, b), c));
    }

    #[test]
    fn test_combine_equal_rules_with_or() {
        let rule = parse("age > 30").unwrap();
        let combined = combine_rules(&[rule.clone(), rule], LogicalOp::Or).unwrap();
        assert_eq!(combined, Node::comparison(CompareOp::Gt, "age", 30));
    }

    #[test]
    fn test_or_merge_takes_max() {
        let combined = combine_rules(
            &[parse("age > 30").unwrap(), parse("age > 40").unwrap()],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(combined, Node::comparison(CompareOp::Gt, "age", 40));
    }

    #[test]
    fn test_or_merge_takes_max_for_any_operator() {
        // `<` 合并后同样取较大值
        let combined = combine_rules(
            &[parse("age < 30").unwrap(), parse("age < 40.5").unwrap()],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(combined, Node::comparison(CompareOp::Lt, "age", 40.5));

        let combined = combine_rules(
            &[
                parse("department = 'HR'").unwrap(),
                parse("department = 'Sales'").unwrap(),
            ],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(
            combined,
            Node::comparison(CompareOp::Eq, "department", "Sales")
        );
    }

    #[test]
    fn test_and_is_not_merged() {
        let combined = combine_rules(
            &[parse("age > 30").unwrap(), parse("age > 40").unwrap()],
            LogicalOp::And,
        )
        .unwrap();
        assert!(matches!(combined, Node::Logical { operator: LogicalOp::And, .. }));
    }

    #[test]
    fn test_different_field_or_operator_not_merged() {
        let combined = combine_rules(
            &[parse("age > 30").unwrap(), parse("salary > 30").unwrap()],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(combined.depth(), 3);

        let combined = combine_rules(
            &[parse("age > 30").unwrap(), parse("age >= 30").unwrap()],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(combined.depth(), 3);
    }

    #[test]
    fn test_mixed_literal_types_not_merged() {
        let combined = combine_rules(
            &[parse("code = 30").unwrap(), parse("code = 'x'").unwrap()],
            LogicalOp::Or,
        )
        .unwrap();
        assert!(matches!(combined, Node::Logical { operator: LogicalOp::Or, .. }));
    }

    #[test]
    fn test_only_adjacent_siblings_are_merged() {
        // 折叠结果为 ((age > 30 OR salary > 1) OR age > 40)，
        // 两个 age 条件不是兄弟节点，不会被合并
        let combined = combine_rules(
            &[
                parse("age > 30").unwrap(),
                parse("salary > 1").unwrap(),
                parse("age > 40").unwrap(),
            ],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(
            combined.to_string(),
            "((age > 30 OR salary > 1) OR age > 40)"
        );
    }

    #[test]
    fn test_merged_child_can_enable_parent_merge() {
        // 后序遍历：左子树先合并为单个比较节点，再与右侧兄弟合并
        let combined = combine_rules(
            &[
                parse("age > 30").unwrap(),
                parse("age > 35").unwrap(),
                parse("age > 20").unwrap(),
            ],
            LogicalOp::Or,
        )
        .unwrap();
        assert_eq!(combined, Node::comparison(CompareOp::Gt, "age", 35));
    }

    #[test]
    fn test_optimize_nested_rule_tree() {
        let node = parse("x = 1 AND (age > 30 OR age > 50)").unwrap();
        let optimized = optimize(&node);
        assert_eq!(
            optimized,
            Node::and(
                Node::comparison(CompareOp::Eq, "x", 1),
                Node::comparison(CompareOp::Gt, "age", 50),
            )
        );
    }

    #[test]
    fn test_input_is_not_modified() {
        let rules = vec![parse("age > 30").unwrap(), parse("age > 40").unwrap()];
        let snapshot = rules.clone();

        let _ = combine_rules(&rules, LogicalOp::Or).unwrap();
        assert_eq!(rules, snapshot);
    }
}
