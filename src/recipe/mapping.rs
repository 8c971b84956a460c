//! CumulusCI mapping plan for the in-process engine
//!
//! One `Insert <Table>` step per table in dependency order. Lookups pointing
//! at a table loaded later (or at the step's own table) carry
//! `after: Insert <Target>` so they are patched in a second pass.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use super::analyze::dependency_order;
use super::model::Recipe;
use crate::error::ToolError;

/// One entry of a CumulusCI load declarations file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoadDeclaration {
    pub sf_object: String,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub bulk_mode: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub load_after: Option<String>,
}

/// Parse a load declarations file (a YAML list of declarations).
pub fn parse_declarations(text: &str, filename: &str) -> Result<Vec<LoadDeclaration>, ToolError> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| {
        let loc = e.location();
        ToolError::syntax(format!("Invalid load declarations: {}", e)).at(
            filename,
            loc.as_ref().map(|l| l.line()),
            loc.as_ref().map(|l| l.column()),
        )
    })?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_yaml::from_value(value).map_err(|e| {
        ToolError::validation(format!("Load declarations must be a list of {{sf_object, ...}}: {}", e))
            .at(filename, None, None)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub field: String,
    pub table: String,
    /// Step whose completion this lookup waits for
    pub after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingStep {
    pub table: String,
    pub fields: Vec<String>,
    pub lookups: Vec<Lookup>,
    pub declaration: Option<LoadDeclaration>,
}

impl MappingStep {
    pub fn step_name(&self) -> String {
        step_name(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPlan {
    pub steps: Vec<MappingStep>,
}

impl MappingPlan {
    pub fn dependency_order(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.table.clone()).collect()
    }

    pub fn to_value(&self) -> Value {
        let mut root = Mapping::new();
        for step in &self.steps {
            let mut body = Mapping::new();
            body.insert("sf_object".into(), step.table.clone().into());
            body.insert("table".into(), step.table.clone().into());
            if let Some(decl) = &step.declaration {
                if let Some(api) = &decl.api {
                    body.insert("api".into(), api.clone().into());
                }
                if let Some(mode) = &decl.bulk_mode {
                    body.insert("bulk_mode".into(), mode.clone().into());
                }
                if let Some(size) = decl.batch_size {
                    body.insert("batch_size".into(), size.into());
                }
            }

            let mut fields = Mapping::new();
            for field in &step.fields {
                fields.insert(field.clone().into(), field.clone().into());
            }
            body.insert("fields".into(), Value::Mapping(fields));

            if !step.lookups.is_empty() {
                let mut lookups = Mapping::new();
                for lookup in &step.lookups {
                    let mut entry = Mapping::new();
                    entry.insert("table".into(), lookup.table.clone().into());
                    entry.insert("key_field".into(), lookup.field.clone().into());
                    if let Some(after) = &lookup.after {
                        entry.insert("after".into(), after.clone().into());
                    }
                    lookups.insert(lookup.field.clone().into(), Value::Mapping(entry));
                }
                body.insert("lookups".into(), Value::Mapping(lookups));
            }

            root.insert(step.step_name().into(), Value::Mapping(body));
        }
        Value::Mapping(root)
    }

    pub fn to_yaml(&self) -> Result<String, ToolError> {
        serde_yaml::to_string(&self.to_value())
            .map_err(|e| ToolError::runtime(format!("Failed to serialise mapping: {}", e)))
    }
}

fn step_name(table: &str) -> String {
    format!("Insert {}", table)
}

/// Build the mapping from a recipe model and optional load declarations.
pub fn build_mapping(recipe: &Recipe, declarations: &[LoadDeclaration]) -> MappingPlan {
    let extra: Vec<(String, String)> = declarations
        .iter()
        .filter_map(|d| d.load_after.as_ref().map(|after| (d.sf_object.clone(), after.clone())))
        .collect();
    let plan = dependency_order(recipe, &extra);

    let mut steps = Vec::with_capacity(plan.order.len());
    for table in &plan.order {
        let own_position = plan.position(table);
        let mut fields: Vec<String> = Vec::new();
        let mut lookups: Vec<Lookup> = Vec::new();

        for object in recipe.objects.iter().filter(|o| &o.table == table) {
            for reference in &object.references {
                let (Some(field), Some(target)) = (&reference.field, recipe.resolve_target(&reference.target)) else {
                    continue;
                };
                if lookups.iter().any(|l| &l.field == field) {
                    continue;
                }
                let deferred = target == table.as_str() || plan.position(target) > own_position;
                lookups.push(Lookup {
                    field: field.clone(),
                    table: target.to_string(),
                    after: deferred.then(|| step_name(target)),
                });
            }
            for field in &object.fields {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
        }
        fields.retain(|f| !lookups.iter().any(|l| &l.field == f));

        steps.push(MappingStep {
            table: table.clone(),
            fields,
            lookups,
            declaration: declarations.iter().find(|d| &d.sf_object == table).cloned(),
        });
    }

    MappingPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(text: &str) -> Recipe {
        let value: Value = serde_yaml::from_str(text).unwrap();
        Recipe::from_value(&value, text).unwrap()
    }

    const TWO_TABLES: &str = "\
- object: Contact
  fields:
    LastName: Smith
    AccountId:
      reference: Account
- object: Account
  fields:
    Name: Acme
";

    #[test]
    fn test_two_related_tables_in_dependency_order() {
        let plan = build_mapping(&recipe(TWO_TABLES), &[]);
        assert_eq!(plan.dependency_order(), vec!["Account", "Contact"]);

        let contact = &plan.steps[1];
        assert_eq!(contact.fields, vec!["LastName"]);
        assert_eq!(
            contact.lookups,
            vec![Lookup {
                field: "AccountId".into(),
                table: "Account".into(),
                after: None
            }]
        );
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = build_mapping(&recipe(TWO_TABLES), &[]).to_yaml().unwrap();
        let account_pos = yaml.find("Insert Account:").unwrap();
        let contact_pos = yaml.find("Insert Contact:").unwrap();
        assert!(account_pos < contact_pos);

        let value: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["Insert Contact"]["lookups"]["AccountId"]["table"], Value::from("Account"));
        assert_eq!(value["Insert Contact"]["lookups"]["AccountId"]["key_field"], Value::from("AccountId"));
        assert_eq!(value["Insert Account"]["fields"]["Name"], Value::from("Name"));
    }

    #[test]
    fn test_self_lookup_is_deferred() {
        let plan = build_mapping(
            &recipe("- object: Account\n  fields:\n    ParentId:\n      reference: Account\n"),
            &[],
        );
        assert_eq!(plan.steps[0].lookups[0].after.as_deref(), Some("Insert Account"));
    }

    #[test]
    fn test_cycle_defers_back_edge() {
        let plan = build_mapping(
            &recipe(
                "- object: Account\n  fields:\n    PrimaryContactId:\n      reference: Contact\n\
                 - object: Contact\n  fields:\n    AccountId:\n      reference: Account\n",
            ),
            &[],
        );
        assert_eq!(plan.dependency_order(), vec!["Account", "Contact"]);
        assert_eq!(plan.steps[0].lookups[0].after.as_deref(), Some("Insert Contact"));
        assert_eq!(plan.steps[1].lookups[0].after, None);
    }

    #[test]
    fn test_declarations_add_ordering_and_api() {
        let decls = parse_declarations(
            "- sf_object: Account\n  api: bulk\n  load_after: Contact\n- sf_object: Unrelated\n",
            "decl.load.yml",
        )
        .unwrap();
        let plan = build_mapping(&recipe("- object: Account\n- object: Contact\n"), &decls);
        assert_eq!(plan.dependency_order(), vec!["Contact", "Account"]);
        let yaml = plan.to_yaml().unwrap();
        assert!(yaml.contains("api: bulk"));
    }

    #[test]
    fn test_bad_declarations() {
        let err = parse_declarations("- api: bulk\n", "decl.load.yml").unwrap_err();
        assert_eq!(err.filename.as_deref(), Some("decl.load.yml"));
        assert!(parse_declarations("", "decl.load.yml").unwrap().is_empty());
    }
}
