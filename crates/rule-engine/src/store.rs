//! 规则存储管理
//!
//! 使用 DashMap 提供线程安全的内存存储，保存规则文本与序列化后的 AST。
//! 存储只负责持久化，不解析也不评估规则。

use crate::ast::{Node, NodeMapping};
use crate::error::{Result, RuleError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 已保存的规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule_string: String,
    /// 序列化后的 AST
    pub ast: NodeMapping,
    /// 合并规则的来源规则 ID，普通规则为空
    #[serde(default)]
    pub parent_rules: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRule {
    /// 创建新规则，分配 UUID 并记录时间戳
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        rule_string: impl Into<String>,
        ast: &Node,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            rule_string: rule_string.into(),
            ast: ast.to_mapping(),
            parent_rules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent_rules(mut self, parent_rules: Vec<String>) -> Self {
        self.parent_rules = parent_rules;
        self
    }

    /// 还原 AST，同时校验持久化结构
    pub fn node(&self) -> Result<Node> {
        Node::from_mapping(&self.ast)
    }
}

/// 规则更新内容
#[derive(Debug, Clone, PartialEq)]
pub struct RuleUpdate {
    pub name: String,
    pub description: Option<String>,
    pub rule_string: String,
    pub ast: NodeMapping,
}

/// 规则仓储接口
///
/// 服务层只依赖此接口，测试中可替换为 mock 实现。
#[cfg_attr(test, mockall::automock)]
pub trait RuleRepository: Send + Sync {
    fn insert(&self, rule: StoredRule) -> Result<()>;
    fn update(&self, rule_id: &str, update: RuleUpdate) -> Result<StoredRule>;
    fn get(&self, rule_id: &str) -> Option<StoredRule>;
    /// 按请求顺序返回，不存在的 ID 被跳过
    fn get_many(&self, rule_ids: &[String]) -> Vec<StoredRule>;
    /// 分页查询，页码从 1 开始
    fn list(&self, page: usize, limit: usize) -> Vec<StoredRule>;
    fn count(&self) -> usize;
}

/// 内存规则存储
#[derive(Clone, Default)]
pub struct RuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
        }
    }
}

impl RuleRepository for RuleStore {
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, rule_name = %rule.name))]
    fn insert(&self, rule: StoredRule) -> Result<()> {
        let rule_id = rule.id.clone();
        self.rules.insert(rule_id.clone(), rule);

        info!("规则已保存: {}", rule_id);
        Ok(())
    }

    #[instrument(skip(self, update))]
    fn update(&self, rule_id: &str, update: RuleUpdate) -> Result<StoredRule> {
        let Some(mut entry) = self.rules.get_mut(rule_id) else {
            warn!("更新不存在的规则: {}", rule_id);
            return Err(RuleError::RuleNotFound(rule_id.to_string()));
        };

        let rule = entry.value_mut();
        rule.name = update.name;
        rule.description = update.description;
        rule.rule_string = update.rule_string;
        rule.ast = update.ast;
        rule.updated_at = Utc::now();

        info!("规则已更新: {}", rule_id);
        Ok(rule.clone())
    }

    fn get(&self, rule_id: &str) -> Option<StoredRule> {
        self.rules.get(rule_id).map(|r| r.clone())
    }

    fn get_many(&self, rule_ids: &[String]) -> Vec<StoredRule> {
        rule_ids
            .iter()
            .filter_map(|id| self.rules.get(id).map(|r| r.clone()))
            .collect()
    }

    fn list(&self, page: usize, limit: usize) -> Vec<StoredRule> {
        let mut rules: Vec<StoredRule> = self.rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let skip = page.saturating_sub(1).saturating_mul(limit);
        rules.into_iter().skip(skip).take(limit).collect()
    }

    fn count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use chrono::Duration;

    fn create_rule(name: &str, rule_string: &str) -> StoredRule {
        let node = parse(rule_string).unwrap();
        StoredRule::new(name, None, rule_string, &node)
    }

    #[test]
    fn test_insert_and_get() {
        let store = RuleStore::new();
        let rule = create_rule("老员工", "age > 30");
        let rule_id = rule.id.clone();

        store.insert(rule.clone()).unwrap();

        assert_eq!(store.count(), 1);
        assert_eq!(store.get(&rule_id), Some(rule));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_stored_ast_restores_node() {
        let rule = create_rule("销售部", "age > 30 AND department = 'Sales'");
        assert_eq!(
            rule.node().unwrap(),
            parse("age > 30 AND department = 'Sales'").unwrap()
        );
    }

    #[test]
    fn test_update_rule() {
        let store = RuleStore::new();
        let rule = create_rule("老员工", "age > 30");
        let rule_id = rule.id.clone();
        store.insert(rule.clone()).unwrap();

        let node = parse("age > 40").unwrap();
        let updated = store
            .update(
                &rule_id,
                RuleUpdate {
                    name: "资深员工".to_string(),
                    description: Some("年龄大于 40".to_string()),
                    rule_string: "age > 40".to_string(),
                    ast: node.to_mapping(),
                },
            )
            .unwrap();

        assert_eq!(updated.name, "资深员工");
        assert_eq!(updated.rule_string, "age > 40");
        assert_eq!(updated.created_at, rule.created_at);
        assert!(updated.updated_at >= rule.updated_at);
        assert_eq!(store.get(&rule_id).unwrap().node().unwrap(), node);
    }

    #[test]
    fn test_update_missing_rule() {
        let store = RuleStore::new();
        let node = parse("age > 40").unwrap();
        let result = store.update(
            "missing",
            RuleUpdate {
                name: "x".to_string(),
                description: None,
                rule_string: "age > 40".to_string(),
                ast: node.to_mapping(),
            },
        );

        assert!(matches!(result, Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_get_many_keeps_request_order() {
        let store = RuleStore::new();
        let a = create_rule("a", "a = 1");
        let b = create_rule("b", "b = 2");
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();

        let ids = vec![b.id.clone(), "missing".to_string(), a.id.clone()];
        let found = store.get_many(&ids);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, b.id);
        assert_eq!(found[1].id, a.id);
    }

    #[test]
    fn test_list_pagination() {
        let store = RuleStore::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut rule = create_rule(&format!("rule-{}", i), "age > 30");
            rule.created_at = base + Duration::seconds(i);
            store.insert(rule).unwrap();
        }

        let first = store.list(1, 2);
        assert_eq!(
            first.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["rule-0", "rule-1"]
        );

        let last = store.list(3, 2);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].name, "rule-4");

        assert!(store.list(4, 2).is_empty());
        assert_eq!(store.count(), 5);
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = RuleStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .insert(create_rule(&format!("rule-{}", i), "age > 30"))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.count(), 8);
    }
}
