//! Prompt templates
//!
//! Templates are Handlebars, compiled into the binary and rendered without
//! HTML escaping so recipe YAML passes through untouched.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::catalog::{EXAMPLES_LIST_URI, SCHEMA_URI, TEMPLATES_LIST_URI};
use crate::error::ToolError;
use crate::tools::ToolContext;

const AUTHOR_RECIPE: &str = include_str!("../assets/prompts/author_recipe.md");
const DEBUG_RECIPE: &str = include_str!("../assets/prompts/debug_recipe.md");

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Entry in `prompts/list`
#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
    #[serde(skip)]
    template: &'static str,
}

pub fn definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "author_recipe",
            description: "Create a new Snowfakery recipe from a description of the data to generate.",
            arguments: vec![PromptArgument {
                name: "goal",
                description: "What the generated data should look like",
                required: true,
            }],
            template: AUTHOR_RECIPE,
        },
        PromptDefinition {
            name: "debug_recipe",
            description: "Debug and fix a failing Snowfakery recipe given its error output.",
            arguments: vec![
                PromptArgument {
                    name: "recipe_yaml",
                    description: "The failing recipe",
                    required: true,
                },
                PromptArgument {
                    name: "error",
                    description: "Error output from validate_recipe or run_recipe",
                    required: true,
                },
            ],
            template: DEBUG_RECIPE,
        },
    ]
}

/// Renders prompt templates with Handlebars
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    pub fn render(&self, template: &str, context: &Value) -> Result<String, ToolError> {
        self.handlebars
            .render_template(template, context)
            .map(|text| text.trim().to_string())
            .map_err(|e| ToolError::runtime(format!("Failed to render prompt: {}", e)))
    }
}

/// `prompts/get` result for `name` with string `arguments`.
pub fn get(ctx: &ToolContext, name: &str, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
    let prompt = definitions()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ToolError::validation(format!("Unknown prompt: {}", name)))?;

    let mut context = Map::new();
    for arg in &prompt.arguments {
        match arguments.get(arg.name) {
            Some(Value::String(s)) => {
                context.insert(arg.name.to_string(), Value::String(s.clone()));
            }
            Some(_) => {
                return Err(ToolError::validation(format!("Prompt argument '{}' must be a string", arg.name)));
            }
            None if arg.required => {
                return Err(ToolError::validation(format!("Missing prompt argument '{}'", arg.name)));
            }
            None => {}
        }
    }

    let schema = ctx.catalog.schema();
    context.insert("schema".to_string(), json!(schema.text));
    context.insert("schema_uri".to_string(), json!(SCHEMA_URI));
    context.insert("examples_uri".to_string(), json!(EXAMPLES_LIST_URI));
    context.insert("templates_uri".to_string(), json!(TEMPLATES_LIST_URI));

    let text = PromptRenderer::new().render(prompt.template, &Value::Object(context))?;
    Ok(json!({
        "description": prompt.description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }],
    }))
}
