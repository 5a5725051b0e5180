use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::migration::SchemaFinding;

/// How many finding codes `top_issue_counts` keeps.
pub const TOP_ISSUE_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct IssueCount {
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub total_columns_a: usize,
    pub total_columns_b: usize,
    pub total_findings: usize,
    pub severity_counts: BTreeMap<String, usize>,
    pub top_issue_counts: Vec<IssueCount>,
}

impl SchemaSummary {
    pub fn errors(&self) -> usize {
        self.severity_counts.get("error").copied().unwrap_or(0)
    }
}

/// Count findings by severity and keep the most frequent codes.
/// Codes with equal counts are ordered by name.
pub fn summarize_findings(
    findings: &[SchemaFinding],
    total_columns_a: usize,
    total_columns_b: usize,
) -> SchemaSummary {
    let mut severity_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut code_counts: HashMap<&str, usize> = HashMap::new();

    for f in findings {
        *severity_counts.entry(f.severity.to_string()).or_insert(0) += 1;
        *code_counts.entry(f.code.as_str()).or_insert(0) += 1;
    }

    let mut top: Vec<IssueCount> = code_counts
        .into_iter()
        .map(|(code, count)| IssueCount {
            code: code.to_string(),
            count,
        })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    top.truncate(TOP_ISSUE_LIMIT);

    SchemaSummary {
        total_columns_a,
        total_columns_b,
        total_findings: findings.len(),
        severity_counts,
        top_issue_counts: top,
    }
}
