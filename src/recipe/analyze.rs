//! Structural summaries and table dependency order

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::model::{Recipe, ReferenceKind};

/// Per-table summary, merged across every template for the table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSummary {
    pub fields: Vec<String>,
    pub friends: Vec<String>,
    pub nicknames: Vec<String>,
    pub count_expressions: Vec<serde_json::Value>,
    pub references_out: Vec<String>,
    pub templates: usize,
    pub lines: Vec<usize>,
    pub has_update_keys: bool,
    pub update_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomReferenceUse {
    pub function: &'static str,
    pub target: String,
    pub table: String,
    pub line: Option<usize>,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeSummary {
    pub version: Option<String>,
    pub plugins_declared: Vec<String>,
    pub options_declared: Vec<String>,
    pub macros_declared: Vec<String>,
    pub include_files: Vec<String>,
    pub tables: BTreeMap<String, TableSummary>,
    pub uses_random_reference: Vec<RandomReferenceUse>,
    pub dependency_order: Vec<String>,
    /// Edges that had to be broken to order a cycle, as (from, to)
    pub cyclic_references: Vec<(String, String)>,
}

/// Ordered tables plus the edges dropped to break cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyPlan {
    pub order: Vec<String>,
    pub broken_edges: Vec<(String, String)>,
}

impl DependencyPlan {
    /// Position of `table` in the load order
    pub fn position(&self, table: &str) -> Option<usize> {
        self.order.iter().position(|t| t == table)
    }
}

pub fn summarize(recipe: &Recipe, filename: &str) -> RecipeSummary {
    let mut tables: BTreeMap<String, TableSummary> = BTreeMap::new();
    let mut random = Vec::new();

    for object in &recipe.objects {
        let entry = tables.entry(object.table.clone()).or_default();
        entry.templates += 1;
        for field in &object.fields {
            if !entry.fields.contains(field) {
                entry.fields.push(field.clone());
            }
        }
        for friend in &object.friends {
            if !entry.friends.contains(friend) {
                entry.friends.push(friend.clone());
            }
        }
        if let Some(nick) = &object.nickname {
            entry.nicknames.push(nick.clone());
        }
        if let Some(count) = &object.count {
            entry.count_expressions.push(count.clone());
        }
        if let Some(line) = object.line {
            entry.lines.push(line);
        }
        if let Some(key) = &object.update_key {
            entry.has_update_keys = true;
            if !entry.update_keys.contains(key) {
                entry.update_keys.push(key.clone());
            }
        }
        for reference in &object.references {
            let target = recipe.resolve_target(&reference.target).unwrap_or(&reference.target).to_string();
            if !entry.references_out.contains(&target) {
                entry.references_out.push(target);
            }
            if reference.kind == ReferenceKind::RandomReference {
                random.push(RandomReferenceUse {
                    function: ReferenceKind::RandomReference.key(),
                    target: reference.target.clone(),
                    table: object.table.clone(),
                    line: reference.line,
                    filename: filename.to_string(),
                });
            }
        }
    }
    for summary in tables.values_mut() {
        summary.fields.sort();
        summary.friends.sort();
    }

    let plan = dependency_order(recipe, &[]);

    RecipeSummary {
        version: recipe.version.clone(),
        plugins_declared: recipe.plugins.clone(),
        options_declared: recipe.options.iter().map(|o| o.name.clone()).collect(),
        macros_declared: recipe.macros.clone(),
        include_files: recipe.include_files.clone(),
        tables,
        uses_random_reference: random,
        dependency_order: plan.order,
        cyclic_references: plan.broken_edges,
    }
}

/// Order tables so referenced tables come before the tables referencing
/// them.
///
/// Ties go to declaration order. `extra` adds `(table, must_follow)`
/// constraints. A cycle is broken at the earliest-declared remaining table.
pub fn dependency_order(recipe: &Recipe, extra: &[(String, String)]) -> DependencyPlan {
    let tables = recipe.tables();
    let mut deps: HashMap<&str, Vec<&str>> = tables.iter().map(|t| (*t, Vec::new())).collect();

    for object in &recipe.objects {
        for reference in &object.references {
            let Some(target) = recipe.resolve_target(&reference.target) else {
                continue;
            };
            if target == object.table {
                continue;
            }
            if let Some(list) = deps.get_mut(object.table.as_str()) {
                if !list.contains(&target) {
                    list.push(target);
                }
            }
        }
    }
    for (table, after) in extra {
        let Some(after) = tables.iter().copied().find(|t| *t == after.as_str()) else {
            continue;
        };
        if let Some(list) = deps.get_mut(table.as_str()) {
            if after != table.as_str() && !list.contains(&after) {
                list.push(after);
            }
        }
    }

    let mut emitted: HashSet<&str> = HashSet::new();
    let mut plan = DependencyPlan::default();

    while emitted.len() < tables.len() {
        let ready = tables
            .iter()
            .copied()
            .find(|t| !emitted.contains(t) && deps[t].iter().all(|d| emitted.contains(d)));

        let next = match ready {
            Some(t) => t,
            None => {
                let Some(t) = tables.iter().copied().find(|t| !emitted.contains(t)) else {
                    break;
                };
                for dep in &deps[t] {
                    if !emitted.contains(dep) {
                        plan.broken_edges.push((t.to_string(), dep.to_string()));
                    }
                }
                t
            }
        };
        emitted.insert(next);
        plan.order.push(next.to_string());
    }

    plan
}
