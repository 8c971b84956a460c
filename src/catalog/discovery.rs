//! Discovery documents: output formats and built-in plugins

use serde_json::{Value, json};

/// Output formats accepted by `run_recipe`
pub const SUPPORTED_FORMATS: &[&str] = &["txt", "json", "csv", "sql", "dot", "svg", "svgz", "png", "jpeg", "jpg", "ps"];

/// Formats `render_diagram` accepts
pub const DIAGRAM_FORMATS: &[&str] = &["dot", "svg", "svgz", "png", "jpeg", "ps"];

/// Written to a directory (one file per table) rather than a single file
pub fn is_folder_format(format: &str) -> bool {
    format == "csv"
}

/// Formats that can be previewed inline as text
pub fn is_textual_format(format: &str) -> bool {
    matches!(format, "txt" | "json" | "sql" | "dot" | "svg")
}

pub fn formats_document() -> Value {
    let formats = json!({
        "txt": {
            "name": "Text",
            "extension": ".txt",
            "description": "Human-readable rows, one per line",
            "example": "Person(id=1, name=John, age=30)",
            "default": true
        },
        "json": {
            "name": "JSON",
            "extension": ".json",
            "description": "A JSON list of rows, each tagged with its table",
            "example": "[{\"_table\": \"Person\", \"id\": 1, \"name\": \"John\"}]"
        },
        "csv": {
            "name": "CSV",
            "extension": "csv/",
            "description": "A directory with one CSV file per table plus CSVW metadata",
            "example": "Person.csv, Account.csv, csvw_metadata.json"
        },
        "sql": {
            "name": "SQL",
            "extension": ".sql",
            "description": "CREATE TABLE and INSERT statements"
        },
        "dot": {
            "name": "Graphviz DOT",
            "extension": ".dot",
            "description": "Graph of generated rows and their references",
            "diagram": true
        },
        "svg": {
            "name": "SVG",
            "extension": ".svg",
            "description": "Rendered relationship diagram",
            "diagram": true,
            "dependencies": ["graphviz"]
        },
        "svgz": {
            "name": "Compressed SVG",
            "extension": ".svgz",
            "description": "Gzip-compressed SVG diagram",
            "diagram": true,
            "binary": true,
            "dependencies": ["graphviz"]
        },
        "png": {
            "name": "PNG",
            "extension": ".png",
            "description": "Raster relationship diagram",
            "diagram": true,
            "binary": true,
            "dependencies": ["graphviz"]
        },
        "jpeg": {
            "name": "JPEG",
            "extension": ".jpeg",
            "description": "Compressed raster relationship diagram",
            "diagram": true,
            "binary": true,
            "dependencies": ["graphviz"]
        },
        "ps": {
            "name": "PostScript",
            "extension": ".ps",
            "description": "Print-ready relationship diagram",
            "diagram": true,
            "binary": true,
            "dependencies": ["graphviz"]
        }
    });

    json!({
        "total_formats": formats.as_object().map(|m| m.len()).unwrap_or(0),
        "formats": formats,
        "graphviz_note": "Image formats (svg, svgz, png, jpeg, ps) need Graphviz installed where Snowfakery runs",
        "binary_formats_note": "Binary artifacts are served base64-encoded through their run resource URI"
    })
}

pub fn plugins_document() -> Value {
    let plugins = json!({
        "Math": {
            "module": "snowfakery.standard_plugins.Math",
            "description": "Arithmetic: sqrt, sin, cos, pi, min, max, round, floor, ceil, log, exp",
            "example": "Math.sqrt: 144"
        },
        "Counters": {
            "module": "snowfakery.standard_plugins.Counters",
            "description": "Incrementing number and date counters",
            "methods": ["NumberCounter", "DateCounter"],
            "parameters": {
                "NumberCounter": [
                    {"name": "start", "type": "int", "description": "Starting value"},
                    {"name": "step", "type": "int", "description": "Increment (default 1)"},
                    {"name": "name", "type": "str", "description": "Counter identifier"}
                ],
                "DateCounter": [
                    {"name": "start_date", "type": "str", "description": "Starting date (YYYY-MM-DD or today)"},
                    {"name": "step", "type": "str", "description": "Increment, e.g. +1d"},
                    {"name": "name", "type": "str", "description": "Counter identifier"}
                ]
            },
            "example": "Counters.NumberCounter: {start: 1, name: counter1}"
        },
        "UniqueId": {
            "module": "snowfakery.standard_plugins.UniqueId",
            "description": "Unique identifiers with custom alphabets",
            "methods": ["unique_id", "unique_alpha_code", "AlphaCodeGenerator", "NumericIdGenerator"],
            "example": "UniqueId.unique_id"
        },
        "Schedule": {
            "module": "snowfakery.standard_plugins.Schedule",
            "description": "Recurring event dates",
            "methods": ["Event"],
            "example": "Schedule.Event: {start_date: 2024-01-01, freq: weekly}"
        },
        "Dataset": {
            "module": "snowfakery.standard_plugins.datasets.Dataset",
            "description": "Rows from a CSV file or SQL database",
            "methods": ["iterate", "shuffle"],
            "example": "Dataset.iterate: {dataset: people.csv}",
            "gates": ["allow_database for database URLs", "allow_network for http(s) URLs"]
        },
        "Salesforce": {
            "module": "snowfakery.standard_plugins.Salesforce",
            "description": "Record types, person accounts and org queries inside CumulusCI",
            "methods": ["ProfileId", "SalesforceQuery", "SOQLDataset"],
            "gates": ["allow_network"]
        }
    });

    json!({
        "plugin_count": plugins.as_object().map(|m| m.len()).unwrap_or(0),
        "plugins": plugins,
        "note": "Declare a plugin in the recipe: - plugin: snowfakery.standard_plugins.<Name>"
    })
}
