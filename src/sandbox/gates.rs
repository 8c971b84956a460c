//! Network and database gates
//!
//! A static check performed before dispatch. It inspects the request and the
//! parsed recipe for anything that would make the engine open a network
//! connection or write to a database; it is not a runtime sandbox.

use serde_yaml::Value;

use crate::config::GatesConfig;
use crate::error::ToolError;

/// Plugins that talk to a Salesforce org
const NETWORK_PLUGINS: &[&str] = &["Salesforce", "SalesforceQuery", "SOQLDataset"];

const DATABASE_SCHEMES: &[&str] = &[
    "sqlite", "postgres", "postgresql", "mysql", "mariadb", "mssql", "oracle",
];

/// Check the gates for a request. `dburl` is the caller's database output URL.
pub fn check_gates(gates: &GatesConfig, recipe: Option<&Value>, dburl: Option<&str>) -> Result<(), ToolError> {
    if let Some(url) = dburl {
        if !gates.allow_database {
            return Err(ToolError::gate(format!(
                "Database output is disabled by server configuration (dburl '{}')",
                scheme_of(url).unwrap_or("?")
            )));
        }
    }

    let Some(recipe) = recipe else {
        return Ok(());
    };

    let mut strings = Vec::new();
    collect_strings(recipe, &mut strings);

    if !gates.allow_network {
        if let Some(plugin) = network_plugin(recipe) {
            return Err(ToolError::gate(format!(
                "Plugin '{}' needs network access, which is disabled by server configuration",
                plugin
            )));
        }
        if let Some(url) = strings.iter().find(|s| is_http_url(s)) {
            return Err(ToolError::gate(format!(
                "Recipe references a network URL ({}), which is disabled by server configuration",
                url
            )));
        }
    }

    if !gates.allow_database {
        if let Some(url) = strings.iter().find(|s| is_database_url(s)) {
            return Err(ToolError::gate(format!(
                "Recipe references a database ({}://...), which is disabled by server configuration",
                scheme_of(url).unwrap_or("?")
            )));
        }
    }

    Ok(())
}

fn network_plugin(recipe: &Value) -> Option<String> {
    let statements = recipe.as_sequence()?;
    statements
        .iter()
        .filter_map(|s| s.get("plugin").and_then(Value::as_str))
        .find(|plugin| {
            let last = plugin.rsplit('.').next().unwrap_or(plugin);
            NETWORK_PLUGINS.contains(&last)
        })
        .map(str::to_string)
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s.as_str()),
        Value::Sequence(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Mapping(map) => map.iter().for_each(|(k, v)| {
            collect_strings(k, out);
            collect_strings(v, out);
        }),
        Value::Tagged(tagged) => collect_strings(&tagged.value, out),
        _ => {}
    }
}

fn scheme_of(url: &str) -> Option<&str> {
    let (scheme, _) = url.trim().split_once("://")?;
    Some(scheme)
}

fn is_http_url(s: &str) -> bool {
    matches!(scheme_of(s).map(str::to_ascii_lowercase).as_deref(), Some("http" | "https"))
}

fn is_database_url(s: &str) -> bool {
    let Some(scheme) = scheme_of(s) else {
        return false;
    };
    // SQLAlchemy style: `postgresql+psycopg2://`
    let base = scheme.split('+').next().unwrap_or(scheme).to_ascii_lowercase();
    DATABASE_SCHEMES.contains(&base.as_str())
}
