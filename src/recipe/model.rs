//! Structural model of a recipe
//!
//! A read-only projection of the YAML value: which statements exist, which
//! tables are declared where, and which references flow between them. Formula
//! bodies are never evaluated.

use std::collections::HashMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use super::locate::{Locator, find_statement_line};
use crate::error::ToolError;

const OBJECT_KEYS: &[&str] = &[
    "object",
    "nickname",
    "count",
    "fields",
    "friends",
    "include",
    "just_once",
    "for_each",
    "update_key",
];

const MACRO_KEYS: &[&str] = &["macro", "fields", "friends", "include"];

const STATEMENT_KEYS: &[&str] = &[
    "object",
    "macro",
    "plugin",
    "option",
    "include_file",
    "var",
    "snowfakery_version",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Reference,
    RandomReference,
}

impl ReferenceKind {
    pub fn key(&self) -> &'static str {
        match self {
            ReferenceKind::Reference => "reference",
            ReferenceKind::RandomReference => "random_reference",
        }
    }
}

/// A reference from one template to a table or nickname
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// Table or nickname as written
    pub target: String,
    /// Field holding the reference, when it is a field's direct value
    pub field: Option<String>,
    pub line: Option<usize>,
}

/// An `object:` template, top-level or nested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectTemplate {
    pub table: String,
    pub nickname: Option<String>,
    /// Raw `count` expression
    pub count: Option<serde_json::Value>,
    /// Field names in declaration order, macro fields included
    pub fields: Vec<String>,
    /// Tables of `friends` entries
    pub friends: Vec<String>,
    /// Outgoing references, including nested objects under fields
    pub references: Vec<Reference>,
    /// Table of the enclosing template for nested objects
    pub parent: Option<String>,
    pub macros_included: Vec<String>,
    pub just_once: bool,
    pub for_each: bool,
    /// Field used to match existing records when loading as an upsert
    pub update_key: Option<String>,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionDecl {
    pub name: String,
    pub default: Option<serde_json::Value>,
}

/// Parsed recipe structure
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recipe {
    pub version: Option<String>,
    pub plugins: Vec<String>,
    pub options: Vec<OptionDecl>,
    pub macros: Vec<String>,
    pub vars: Vec<String>,
    pub include_files: Vec<String>,
    /// Every object template, depth-first in declaration order
    pub objects: Vec<ObjectTemplate>,
}

impl Recipe {
    /// Build the model from parsed YAML.
    ///
    /// `text` is the source the value was parsed from, used only to recover
    /// line numbers. Structural errors are validation errors.
    pub fn from_value(value: &Value, text: &str) -> Result<Self, ToolError> {
        let statements = match value {
            Value::Sequence(items) => items,
            Value::Null => return Err(ToolError::validation("Recipe is empty")),
            _ => {
                return Err(ToolError::validation(
                    "Recipe must be a YAML list of statements (object, macro, plugin, option, include_file, var)",
                ));
            }
        };

        let mut builder = Builder {
            locator: Locator::new(text),
            macros: HashMap::new(),
            macro_depth: 0,
        };

        // Macros may be used before they are declared
        for statement in statements {
            if let Some(map) = statement.as_mapping() {
                if let Some(name) = map.get("macro").and_then(Value::as_str) {
                    builder.macros.insert(name.to_string(), map.clone());
                }
            }
        }

        let mut recipe = Recipe::default();
        let mut statement_counts: HashMap<&str, usize> = HashMap::new();

        for (idx, statement) in statements.iter().enumerate() {
            let Some(map) = statement.as_mapping() else {
                return Err(ToolError::validation(format!(
                    "Statement {} must be a mapping, got {}",
                    idx + 1,
                    type_name(statement)
                )));
            };
            let kind = STATEMENT_KEYS
                .iter()
                .copied()
                .find(|k| map.contains_key(*k))
                .ok_or_else(|| {
                    let keys = map_keys(map).join(", ");
                    ToolError::validation(format!("Unknown statement with keys: {}", keys))
                })?;
            let nth = statement_counts.entry(kind).or_insert(0);
            let line = find_statement_line(text, kind, *nth);
            *nth += 1;

            let located = |e: ToolError| with_line(e, line);

            match kind {
                "object" => {
                    builder.object(map, None, &mut recipe.objects).map_err(located)?;
                }
                "macro" => {
                    check_keys(map, MACRO_KEYS, "macro").map_err(located)?;
                    let name = scalar_text(map.get("macro"))
                        .ok_or_else(|| located(ToolError::validation("macro name must be a string")))?;
                    recipe.macros.push(name);
                }
                "plugin" => {
                    let name = scalar_text(map.get("plugin"))
                        .ok_or_else(|| located(ToolError::validation("plugin must be a dotted class name")))?;
                    recipe.plugins.push(name);
                }
                "option" => {
                    let name = scalar_text(map.get("option"))
                        .ok_or_else(|| located(ToolError::validation("option name must be a string")))?;
                    recipe.options.push(OptionDecl {
                        name,
                        default: map.get("default").and_then(|v| serde_json::to_value(v).ok()),
                    });
                }
                "include_file" => {
                    let file = scalar_text(map.get("include_file"))
                        .ok_or_else(|| located(ToolError::validation("include_file must be a path")))?;
                    recipe.include_files.push(file);
                }
                "var" => {
                    let name = scalar_text(map.get("var"))
                        .ok_or_else(|| located(ToolError::validation("var name must be a string")))?;
                    if !map.contains_key("value") {
                        return Err(located(ToolError::validation(format!("var '{}' has no value", name))));
                    }
                    recipe.vars.push(name);
                }
                "snowfakery_version" => {
                    recipe.version = scalar_text(map.get("snowfakery_version"));
                }
                _ => unreachable!("statement kinds are drawn from STATEMENT_KEYS"),
            }
        }

        Ok(recipe)
    }

    /// Distinct tables in first-declaration order
    pub fn tables(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for object in &self.objects {
            if !out.contains(&object.table.as_str()) {
                out.push(object.table.as_str());
            }
        }
        out
    }

    /// Nickname → table
    pub fn nicknames(&self) -> HashMap<&str, &str> {
        self.objects
            .iter()
            .filter_map(|o| o.nickname.as_deref().map(|n| (n, o.table.as_str())))
            .collect()
    }

    /// Resolve a reference target (table or nickname) to a table name
    pub fn resolve_target<'a>(&'a self, target: &'a str) -> Option<&'a str> {
        if self.objects.iter().any(|o| o.table == target) {
            return Some(target);
        }
        self.objects
            .iter()
            .find(|o| o.nickname.as_deref() == Some(target))
            .map(|o| o.table.as_str())
    }

    /// Fold another recipe's declarations (an `include_file`) into this one
    pub fn absorb(&mut self, other: Recipe) {
        self.plugins.extend(other.plugins);
        self.options.extend(other.options);
        self.macros.extend(other.macros);
        self.vars.extend(other.vars);
        self.objects.extend(other.objects);
    }
}

struct Builder<'a> {
    locator: Locator<'a>,
    macros: HashMap<String, Mapping>,
    /// Inside an included macro body, where walk order no longer follows the text
    macro_depth: usize,
}

impl Builder<'_> {
    fn locate(&mut self, key: &str, value: &str) -> Option<usize> {
        if self.macro_depth > 0 {
            return None;
        }
        self.locator.next(key, value)
    }

    /// Returns the template's table and line
    fn object(
        &mut self,
        map: &Mapping,
        parent: Option<&str>,
        out: &mut Vec<ObjectTemplate>,
    ) -> Result<(String, Option<usize>), ToolError> {
        check_keys(map, OBJECT_KEYS, "object")?;
        let table = scalar_text(map.get("object")).ok_or_else(|| ToolError::validation("object name must be a string"))?;
        if table.trim().is_empty() {
            return Err(ToolError::validation("object name must not be empty"));
        }
        let line = self.locate("object", &table);
        let at = |e: ToolError| with_line(e, line);

        let nickname = match map.get("nickname") {
            None => None,
            Some(v) => Some(scalar_text(Some(v)).ok_or_else(|| at(ToolError::validation("nickname must be a string")))?),
        };

        let update_key = match map.get("update_key") {
            None => None,
            Some(v) => Some(scalar_text(Some(v)).ok_or_else(|| at(ToolError::validation("update_key must be a field name")))?),
        };

        let slot = out.len();
        out.push(ObjectTemplate {
            table: table.clone(),
            nickname,
            count: map.get("count").and_then(|v| serde_json::to_value(v).ok()),
            fields: Vec::new(),
            friends: Vec::new(),
            references: Vec::new(),
            parent: parent.map(str::to_string),
            macros_included: Vec::new(),
            just_once: map.get("just_once").and_then(Value::as_bool).unwrap_or(false),
            for_each: map.contains_key("for_each"),
            update_key,
            line,
        });

        let mut fields = Vec::new();
        let mut friends = Vec::new();
        let mut references = Vec::new();
        let mut macros_included = Vec::new();

        if let Some(include) = map.get("include") {
            for name in include_names(include) {
                let Some(body) = self.macros.get(&name).cloned() else {
                    return Err(at(ToolError::validation(format!("Cannot find macro named '{}'", name))));
                };
                macros_included.push(name);
                self.macro_depth += 1;
                let result = self.body(&body, &table, &mut fields, &mut friends, &mut references, out);
                self.macro_depth -= 1;
                result.map_err(at)?;
            }
        }

        self.body(map, &table, &mut fields, &mut friends, &mut references, out)
            .map_err(at)?;

        let template = &mut out[slot];
        template.fields = fields;
        template.friends = friends;
        template.references = references;
        template.macros_included = macros_included;
        Ok((table, line))
    }

    /// Fields and friends of an object or macro body
    fn body(
        &mut self,
        map: &Mapping,
        table: &str,
        fields: &mut Vec<String>,
        friends: &mut Vec<String>,
        references: &mut Vec<Reference>,
        out: &mut Vec<ObjectTemplate>,
    ) -> Result<(), ToolError> {
        match map.get("fields") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(field_map)) => {
                for (key, value) in field_map {
                    let name = scalar_text(Some(key)).ok_or_else(|| ToolError::validation("field names must be strings"))?;
                    if !fields.contains(&name) {
                        fields.push(name.clone());
                    }
                    self.field_value(value, table, Some(&name), references, out)?;
                }
            }
            Some(other) => {
                return Err(ToolError::validation(format!(
                    "fields of '{}' must be a mapping, got {}",
                    table,
                    type_name(other)
                )));
            }
        }

        match map.get("friends") {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                for item in items {
                    let friend = item
                        .as_mapping()
                        .filter(|m| m.contains_key("object"))
                        .ok_or_else(|| ToolError::validation(format!("friends of '{}' must be object templates", table)))?;
                    let (friend_table, _) = self.object(friend, Some(table), out)?;
                    friends.push(friend_table);
                }
            }
            Some(other) => {
                return Err(ToolError::validation(format!(
                    "friends of '{}' must be a list, got {}",
                    table,
                    type_name(other)
                )));
            }
        }
        Ok(())
    }

    fn field_value(
        &mut self,
        value: &Value,
        table: &str,
        field: Option<&str>,
        references: &mut Vec<Reference>,
        out: &mut Vec<ObjectTemplate>,
    ) -> Result<(), ToolError> {
        match value {
            Value::Mapping(map) if map.contains_key("object") => {
                let (child, line) = self.object(map, Some(table), out)?;
                references.push(Reference {
                    kind: ReferenceKind::Reference,
                    target: child,
                    field: field.map(str::to_string),
                    line,
                });
            }
            Value::Mapping(map) => {
                for kind in [ReferenceKind::Reference, ReferenceKind::RandomReference] {
                    if let Some(arg) = map.get(kind.key()) {
                        if let Some(target) = reference_target(arg) {
                            let line = self.locate(kind.key(), &target);
                            references.push(Reference {
                                kind,
                                target,
                                field: field.map(str::to_string),
                                line,
                            });
                        }
                    }
                }
                for (key, nested) in map {
                    if matches!(key.as_str(), Some("reference" | "random_reference")) {
                        continue;
                    }
                    self.field_value(nested, table, None, references, out)?;
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.field_value(item, table, None, references, out)?;
                }
            }
            Value::Tagged(tagged) => self.field_value(&tagged.value, table, field, references, out)?,
            _ => {}
        }
        Ok(())
    }
}

/// Target of a `reference`/`random_reference` argument: a bare name or `{to: Name}`
fn reference_target(arg: &Value) -> Option<String> {
    match arg {
        Value::String(s) if !s.contains("${{") => Some(s.trim().to_string()),
        Value::Mapping(m) => m.get("to").and_then(Value::as_str).map(|s| s.trim().to_string()),
        _ => None,
    }
}

fn with_line(mut err: ToolError, line: Option<usize>) -> ToolError {
    if err.line.is_none() {
        err.line = line;
    }
    err
}

fn include_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Sequence(items) => items.iter().filter_map(|v| scalar_text(Some(v))).collect(),
        _ => Vec::new(),
    }
}

fn check_keys(map: &Mapping, allowed: &[&str], what: &str) -> Result<(), ToolError> {
    for key in map.keys() {
        let name = key.as_str().unwrap_or("<non-string>");
        if !allowed.contains(&name) {
            return Err(ToolError::validation(format!(
                "Unexpected key '{}' in {} declaration (allowed: {})",
                name,
                what,
                allowed.join(", ")
            )));
        }
    }
    Ok(())
}

fn map_keys(map: &Mapping) -> Vec<String> {
    map.keys().filter_map(|k| scalar_text(Some(k))).collect()
}

/// Text of a scalar node; numbers and booleans are rendered as written
pub(crate) fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
