//! In-process engine for tests and offline use
//!
//! Emits one row per template per iteration (integer `count` honoured),
//! stopping exactly at a target count. Rows carry only the table and id, so
//! it exercises every artifact path without the upstream program installed.
//! Mapping files come from the static mapping plan.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{EngineError, EngineJob, EngineOutput, RecipeEngine};
use crate::recipe::{Recipe, build_mapping, parse_declarations};
use crate::sandbox::StoppingCriterion;

/// Safety stop for recipes whose target table never appears in an iteration
const MAX_ITERATIONS: usize = 100_000;

#[derive(Debug, Default)]
pub struct MockEngine {
    version: Option<String>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            version: Some("3.6.3".to_string()),
            ..Default::default()
        }
    }

    /// Every execution fails with this stderr
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            failure: Some(stderr.into()),
            ..Self::new()
        }
    }

    /// Write the first row, then stall before finishing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report no version, as an engine missing from PATH would
    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Number of `execute` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    table: String,
    id: u64,
}

#[async_trait]
impl RecipeEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn version(&self) -> Option<String> {
        self.version.clone()
    }

    async fn execute(&self, job: &EngineJob) -> Result<EngineOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(stderr) = &self.failure {
            return Ok(failed(stderr.clone()));
        }

        let text = tokio::fs::read_to_string(&job.recipe_path).await?;
        let recipe = match serde_yaml::from_str::<serde_yaml::Value>(&text)
            .map_err(|e| e.to_string())
            .and_then(|v| Recipe::from_value(&v, &text).map_err(|e| e.message))
        {
            Ok(r) => r,
            Err(message) => {
                return Ok(failed(format!("Error: {} near {}:1\n", message, job.recipe_path.display())));
            }
        };

        if job.validate_only {
            return Ok(EngineOutput {
                success: true,
                exit_code: Some(0),
                ..Default::default()
            });
        }

        let rows = match generate_rows(&recipe, job.stopping.as_ref()) {
            Ok(rows) => rows,
            Err(message) => return Ok(failed(format!("Error: {}\n", message))),
        };

        if let Some(delay) = self.delay {
            if let (Some(file), Some(first)) = (&job.output_file, rows.first()) {
                tokio::fs::write(file, render(&job.output_format, std::slice::from_ref(first))).await?;
            }
            tokio::time::sleep(delay).await;
        }

        let mut stdout = String::new();
        if let Some(folder) = &job.output_folder {
            write_csv_folder(folder, &rows).await?;
        } else if let Some(file) = &job.output_file {
            tokio::fs::write(file, render(&job.output_format, &rows)).await?;
        } else {
            stdout = String::from_utf8_lossy(&render(&job.output_format, &rows)).to_string();
        }

        if let Some(path) = &job.continuation_file {
            tokio::fs::write(path, continuation(&rows)).await?;
        }

        if let Some(path) = &job.cci_mapping_file {
            let mut declarations = Vec::new();
            for file in &job.load_declarations {
                let text = tokio::fs::read_to_string(file).await?;
                match parse_declarations(&text, &file.display().to_string()) {
                    Ok(found) => declarations.extend(found),
                    Err(e) => return Ok(failed(format!("Error: {}\n", e.message))),
                }
            }
            match build_mapping(&recipe, &declarations).to_yaml() {
                Ok(yaml) => tokio::fs::write(path, yaml).await?,
                Err(e) => return Ok(failed(format!("Error: {}\n", e.message))),
            }
        }

        Ok(EngineOutput {
            success: true,
            exit_code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

fn failed(stderr: String) -> EngineOutput {
    EngineOutput {
        success: false,
        exit_code: Some(1),
        stdout: String::new(),
        stderr,
    }
}

fn generate_rows(recipe: &Recipe, stopping: Option<&StoppingCriterion>) -> Result<Vec<Row>, String> {
    let mut ids: BTreeMap<String, u64> = BTreeMap::new();
    let mut rows = Vec::new();

    let (iterations, target) = match stopping {
        Some(StoppingCriterion::Reps { reps }) => (*reps as usize, None),
        Some(StoppingCriterion::Target { table, count }) => {
            if !recipe.objects.iter().any(|o| &o.table == table) {
                return Err(format!("Target table {} is not declared in the recipe", table));
            }
            (MAX_ITERATIONS, Some((table.as_str(), *count)))
        }
        None => (1, None),
    };

    for iteration in 0..iterations {
        for object in &recipe.objects {
            if object.just_once && iteration > 0 {
                continue;
            }
            let count = object.count.as_ref().and_then(|c| c.as_u64()).unwrap_or(1);
            for _ in 0..count {
                let id = ids.entry(object.table.clone()).or_insert(0);
                *id += 1;
                rows.push(Row {
                    table: object.table.clone(),
                    id: *id,
                });
                if let Some((table, count)) = target {
                    if ids.get(table).copied().unwrap_or(0) >= count {
                        return Ok(rows);
                    }
                }
            }
        }
    }
    Ok(rows)
}

fn render(format: &str, rows: &[Row]) -> Vec<u8> {
    match format {
        "json" => {
            let values: Vec<serde_json::Value> = rows
                .iter()
                .map(|r| serde_json::json!({"_table": r.table, "id": r.id}))
                .collect();
            serde_json::to_vec_pretty(&values).unwrap_or_default()
        }
        "sql" => rows
            .iter()
            .map(|r| format!("INSERT INTO \"{}\" (id) VALUES ({});\n", r.table, r.id))
            .collect::<String>()
            .into_bytes(),
        "dot" => {
            let mut out = String::from("digraph recipe {\n");
            for r in rows {
                out.push_str(&format!("  \"{}({})\";\n", r.table, r.id));
            }
            out.push_str("}\n");
            out.into_bytes()
        }
        "svg" => format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\"><text>{} rows</text></svg>\n",
            rows.len()
        )
        .into_bytes(),
        "png" => b"\x89PNG\r\n\x1a\n".to_vec(),
        "jpeg" | "jpg" => vec![0xFF, 0xD8, 0xFF, 0xE0],
        "svgz" => vec![0x1F, 0x8B, 0x08, 0x00],
        "ps" => b"%!PS-Adobe-3.0\n".to_vec(),
        _ => rows
            .iter()
            .map(|r| format!("{}(id={})\n", r.table, r.id))
            .collect::<String>()
            .into_bytes(),
    }
}

async fn write_csv_folder(folder: &Path, rows: &[Row]) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(folder).await?;
    let mut by_table: BTreeMap<&str, String> = BTreeMap::new();
    for row in rows {
        by_table
            .entry(row.table.as_str())
            .or_insert_with(|| "id\n".to_string())
            .push_str(&format!("{}\n", row.id));
    }
    for (table, body) in by_table {
        tokio::fs::write(folder.join(format!("{}.csv", table)), body).await?;
    }
    Ok(())
}

fn continuation(rows: &[Row]) -> String {
    let mut last: BTreeMap<&str, u64> = BTreeMap::new();
    for row in rows {
        last.insert(row.table.as_str(), row.id);
    }
    let mut out = String::from("id_manager:\n  last_used_ids:\n");
    for (table, id) in last {
        out.push_str(&format!("    {}: {}\n", table, id));
    }
    out.push_str("nicknames_and_tables: {}\npersistent_nicknames: {}\npersistent_objects_by_table: {}\n");
    out
}
