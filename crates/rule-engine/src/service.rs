//! 规则服务
//!
//! 编排解析、存储、合并与评估。服务本身无状态，
//! 所有共享数据都在仓储中，可以安全地在多个请求间克隆使用。

use crate::ast::Node;
use crate::combiner;
use crate::error::{Result, RuleError};
use crate::evaluator::RuleEvaluator;
use crate::models::{EvaluationResult, Record};
use crate::operators::LogicalOp;
use crate::parser::{ParseOptions, RuleParser};
use crate::store::{RuleRepository, RuleUpdate, StoredRule};
use rule_shared::observability::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// 单次评估的结果
#[derive(Debug, Clone, Serialize)]
pub struct RuleEvaluation {
    pub result: bool,
    pub rule_name: String,
    pub rule_string: String,
    /// 启用追踪时附带的评估详情
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<EvaluationResult>,
}

/// 分页查询结果
#[derive(Debug, Clone)]
pub struct RulePage {
    pub rules: Vec<StoredRule>,
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

/// 合并规则的输入
#[derive(Debug, Clone)]
pub struct CombineRules {
    pub rule_ids: Vec<String>,
    pub name: String,
    pub description: Option<String>,
    pub operator: LogicalOp,
}

/// 规则服务
#[derive(Clone)]
pub struct RuleService {
    repo: Arc<dyn RuleRepository>,
    parser: RuleParser,
    evaluator: RuleEvaluator,
    trace: bool,
}

impl RuleService {
    pub fn new(repo: Arc<dyn RuleRepository>) -> Self {
        Self {
            repo,
            parser: RuleParser::new(),
            evaluator: RuleEvaluator::new(),
            trace: false,
        }
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parser = RuleParser::with_options(options);
        self
    }

    /// 评估结果中附带逐节点追踪
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self.evaluator = if enabled {
            RuleEvaluator::new().with_trace()
        } else {
            RuleEvaluator::new()
        };
        self
    }

    pub fn parse_options(&self) -> ParseOptions {
        self.parser.options()
    }

    /// 解析并保存新规则
    #[instrument(skip(self, description))]
    pub fn create_rule(
        &self,
        name: &str,
        description: Option<String>,
        rule_string: &str,
    ) -> Result<StoredRule> {
        let node = self.parse(rule_string)?;
        let rule = StoredRule::new(name, description, rule_string, &node);

        self.repo.insert(rule.clone())?;
        metrics::set_rules_stored(self.repo.count());

        info!(rule_id = %rule.id, fields = ?node.field_names(), "规则已创建");
        Ok(rule)
    }

    /// 重新解析并更新已有规则
    #[instrument(skip(self, description))]
    pub fn update_rule(
        &self,
        rule_id: &str,
        name: &str,
        description: Option<String>,
        rule_string: &str,
    ) -> Result<StoredRule> {
        let node = self.parse(rule_string)?;
        let updated = self.repo.update(
            rule_id,
            RuleUpdate {
                name: name.to_string(),
                description,
                rule_string: rule_string.to_string(),
                ast: node.to_mapping(),
            },
        )?;

        info!("规则已更新");
        Ok(updated)
    }

    /// 合并多条已保存的规则并保存为新规则
    #[instrument(skip(self, request), fields(operator = %request.operator, count = request.rule_ids.len()))]
    pub fn combine_rules(&self, request: CombineRules) -> Result<StoredRule> {
        let operator = request.operator;
        let result = self.combine_inner(request);

        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::record_rule_combine(operator.keyword(), status);

        result
    }

    fn combine_inner(&self, request: CombineRules) -> Result<StoredRule> {
        if request.rule_ids.len() < 2 {
            return Err(RuleError::InvalidRequest(
                "至少需要 2 条规则才能合并".to_string(),
            ));
        }

        let rules = self.repo.get_many(&request.rule_ids);
        if rules.len() != request.rule_ids.len() {
            let missing = request
                .rule_ids
                .iter()
                .find(|id| !rules.iter().any(|r| &r.id == *id))
                .cloned()
                .unwrap_or_default();
            warn!(rule_id = %missing, "合并的规则不存在");
            return Err(RuleError::RuleNotFound(missing));
        }

        let nodes = rules
            .iter()
            .map(StoredRule::node)
            .collect::<Result<Vec<_>>>()?;
        let combined = combiner::combine_rules(&nodes, request.operator)?;

        let max_depth = self.parse_options().max_depth;
        if combined.depth() > max_depth {
            return Err(RuleError::InvalidRequest(format!(
                "合并后的规则深度 {} 超过上限 {}",
                combined.depth(),
                max_depth
            )));
        }

        let rule_string = rules
            .iter()
            .map(|r| format!("({})", r.rule_string))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", request.operator));

        let rule = StoredRule::new(request.name, request.description, rule_string, &combined)
            .with_parent_rules(rules.into_iter().map(|r| r.id).collect());

        self.repo.insert(rule.clone())?;
        metrics::set_rules_stored(self.repo.count());

        info!(rule_id = %rule.id, "规则已合并");
        Ok(rule)
    }

    /// 对输入数据评估已保存的规则
    #[instrument(skip(self, record), fields(fields = record.len()))]
    pub fn evaluate_rule(&self, rule_id: &str, record: &Record) -> Result<RuleEvaluation> {
        let start = Instant::now();
        let result = self.evaluate_inner(rule_id, record);

        let status = match &result {
            Ok(evaluation) if evaluation.result => "matched",
            Ok(_) => "not_matched",
            Err(e) => e.code(),
        };
        metrics::record_rule_evaluation(status, start.elapsed().as_secs_f64());

        result
    }

    fn evaluate_inner(&self, rule_id: &str, record: &Record) -> Result<RuleEvaluation> {
        let rule = self.fetch(rule_id)?;
        let node = rule.node()?;
        let details = self.evaluator.execute(&node, record)?;

        Ok(RuleEvaluation {
            result: details.matched,
            rule_name: rule.name,
            rule_string: rule.rule_string,
            details: self.trace.then_some(details),
        })
    }

    pub fn get_rule(&self, rule_id: &str) -> Result<StoredRule> {
        self.fetch(rule_id)
    }

    /// 分页列出规则，页码从 1 开始
    pub fn list_rules(&self, page: usize, limit: usize) -> Result<RulePage> {
        if page == 0 || limit == 0 {
            return Err(RuleError::InvalidRequest(
                "page 和 limit 必须大于 0".to_string(),
            ));
        }

        let total = self.repo.count();
        Ok(RulePage {
            rules: self.repo.list(page, limit),
            total,
            page,
            pages: total.div_ceil(limit),
        })
    }

    fn parse(&self, rule_string: &str) -> Result<Node> {
        let result = self.parser.parse(rule_string);
        match &result {
            Ok(_) => metrics::record_rule_parse("ok"),
            Err(e) => {
                warn!(error = %e, "规则解析失败");
                metrics::record_rule_parse(e.code());
            }
        }
        result
    }

    fn fetch(&self, rule_id: &str) -> Result<StoredRule> {
        self.repo
            .get(rule_id)
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }
}
