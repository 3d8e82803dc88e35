//! Tool-invocation surface: named tools with JSON schemas, dispatching onto
//! the query service. Pure (de)serialization on top of `QueryService`; no
//! logic of its own.

use cnb_cache::QueryService;
use cnb_core::{CompetitionStatus, REGIONS};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// The five tools exposed to tool-calling clients.
pub fn list_tools() -> Vec<ToolSpec> {
    let codes: Vec<&str> = REGIONS.iter().map(|r| r.code).collect();
    vec![
        ToolSpec {
            name: "list_all_regions",
            description: "Lists all tracked Brazilian regions with their codes".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "get_competitions",
            description: format!(
                "Public job competitions for one region. Available regions: {}",
                codes.join(", ")
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "region": {
                        "type": "string",
                        "description": "Region code (e.g. sp, rj, mg)",
                        "enum": codes,
                    },
                    "status": {
                        "type": "string",
                        "enum": ["open", "scheduled"],
                        "description": "Optional status filter",
                    },
                    "search": {
                        "type": "string",
                        "description": "Optional case-insensitive text filter",
                    },
                },
                "required": ["region"],
            }),
        },
        ToolSpec {
            name: "search_competitions_all",
            description: "Competitions across all regions, from the local snapshot".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filter_open_only": {
                        "type": "boolean",
                        "description": "If true, returns only open competitions",
                        "default": false,
                    },
                },
            }),
        },
        ToolSpec {
            name: "get_global_stats",
            description: "Per-region and total competition counts".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "get_health",
            description: "Per-region snapshot freshness and overall availability".to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct GetCompetitionsArgs {
    region: String,
    status: Option<CompetitionStatus>,
    search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchAllArgs {
    #[serde(default)]
    filter_open_only: bool,
}

/// Executes one tool call. Upstream conditions never surface here: a cold
/// or stale cache yields empty results, not errors.
pub fn dispatch(query: &QueryService, name: &str, arguments: &Value) -> Result<Value, ToolError> {
    match name {
        "list_all_regions" => Ok(json!(query.list_regions())),
        "get_competitions" => {
            let args: GetCompetitionsArgs = parse_args(arguments)?;
            // One cache read: records and metadata come from the same
            // snapshot version.
            let view = query
                .region_view(&args.region, args.status, args.search.as_deref())
                .ok_or_else(|| ToolError::UnknownRegion(args.region.clone()))?;
            Ok(json!({
                "region_code": view.snapshot.region_code,
                "competitions": view.records,
                "last_success_at": view.snapshot.last_success_at,
                "last_error": view.snapshot.last_error,
            }))
        }
        "search_competitions_all" => {
            let args: SearchAllArgs = parse_args(arguments)?;
            Ok(json!(query.search_all(args.filter_open_only)))
        }
        "get_global_stats" => Ok(json!(query.global_stats())),
        "get_health" => Ok(json!(query.health_summary())),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: &Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone())
        .map_err(|err| ToolError::InvalidArguments(err.to_string()))
}
