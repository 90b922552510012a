//! OpenAPI document parsing into the structure the summarizer works on.
//!
//! Parsing is intentionally lenient: only the fields the summarizer needs are
//! validated and unknown keys are ignored. Local `$ref` pointers are followed
//! only where a value is read; pointers that cannot be resolved are left as is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use super::types::SpecFormat;

const MAX_REF_DEPTH: usize = 32;
const HTTP_METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "head", "options", "trace",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecParseError {
    #[error("invalid JSON document: {0}")]
    Json(String),
    #[error("invalid YAML document: {0}")]
    Yaml(String),
    #[error("spec must be a YAML/JSON object")]
    NotAnObject,
    #[error("missing `{0}` section")]
    MissingField(&'static str),
    #[error("invalid path item at {path}: not an object")]
    InvalidPathItem { path: String },
    #[error("invalid operation at {path} {method}: {reason}")]
    InvalidOperation {
        path: String,
        method: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedParameter {
    pub name: String,
    pub location: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRequestBody {
    pub required: bool,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub status_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEndpoint {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub parameters: Vec<ParsedParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<ParsedRequestBody>,
    #[serde(default)]
    pub responses: Vec<ParsedResponse>,
}

/// Structured view of an OpenAPI document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSpec {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub servers: Vec<String>,
    pub endpoints: Vec<ParsedEndpoint>,
    #[serde(default)]
    pub component_names: Vec<String>,
}

/// Parse and validate an OpenAPI document.
pub fn parse_spec(content: &str, format: SpecFormat) -> Result<ParsedSpec, SpecParseError> {
    let document = decode(content, format)?;
    let Value::Object(root) = &document else {
        return Err(SpecParseError::NotAnObject);
    };

    for field in ["openapi", "info", "paths"] {
        if !root.contains_key(field) {
            return Err(SpecParseError::MissingField(field));
        }
    }

    let info = root.get("info").and_then(Value::as_object);
    let title = info
        .and_then(|info| string_field(info, "title"))
        .unwrap_or_else(|| "Untitled API".to_string());
    let version = info
        .and_then(|info| string_field(info, "version"))
        .unwrap_or_else(|| "0.0.0".to_string());
    let description = info.and_then(|info| string_field(info, "description"));

    let servers = root
        .get("servers")
        .and_then(Value::as_array)
        .map(|servers| {
            servers
                .iter()
                .filter_map(|server| server.get("url").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let component_names = root
        .get("components")
        .and_then(|components| components.get("schemas"))
        .and_then(Value::as_object)
        .map(|schemas| schemas.keys().cloned().collect())
        .unwrap_or_default();

    let endpoints = match root.get("paths") {
        Some(Value::Object(paths)) => parse_paths(paths, &document)?,
        Some(Value::Null) => Vec::new(),
        Some(_) | None => return Err(SpecParseError::MissingField("paths")),
    };

    Ok(ParsedSpec {
        title,
        version,
        description,
        servers,
        endpoints,
        component_names,
    })
}

fn decode(content: &str, format: SpecFormat) -> Result<Value, SpecParseError> {
    match format {
        SpecFormat::Json => {
            serde_json::from_str(content).map_err(|err| SpecParseError::Json(err.to_string()))
        }
        SpecFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|err| SpecParseError::Yaml(err.to_string()))
        }
    }
}

fn parse_paths(
    paths: &Map<String, Value>,
    root: &Value,
) -> Result<Vec<ParsedEndpoint>, SpecParseError> {
    let mut endpoints = Vec::new();

    for (path, item) in paths {
        let Value::Object(item) = follow_ref(item, root) else {
            return Err(SpecParseError::InvalidPathItem { path: path.clone() });
        };

        let shared_parameters = parse_parameters(item.get("parameters"), root);

        for (key, operation) in item {
            let method = key.to_ascii_lowercase();
            if !HTTP_METHODS.contains(&method.as_str()) {
                continue;
            }

            let Value::Object(operation) = follow_ref(operation, root) else {
                return Err(SpecParseError::InvalidOperation {
                    path: path.clone(),
                    method: method.to_ascii_uppercase(),
                    reason: "not an object".to_string(),
                });
            };

            endpoints.push(parse_operation(
                path,
                &method,
                operation,
                &shared_parameters,
                root,
            )?);
        }
    }

    Ok(endpoints)
}

fn parse_operation(
    path: &str,
    method: &str,
    operation: &Map<String, Value>,
    shared_parameters: &[ParsedParameter],
    root: &Value,
) -> Result<ParsedEndpoint, SpecParseError> {
    let method = method.to_ascii_uppercase();

    let mut parameters = shared_parameters.to_vec();
    for parameter in parse_parameters(operation.get("parameters"), root) {
        match parameters
            .iter_mut()
            .find(|existing| existing.name == parameter.name && existing.location == parameter.location)
        {
            Some(existing) => *existing = parameter,
            None => parameters.push(parameter),
        }
    }

    let request_body = match operation.get("requestBody").map(|body| follow_ref(body, root)) {
        None | Some(Value::Null) => None,
        Some(Value::Object(body)) => {
            let (content_type, schema) = first_content(body.get("content"), root);
            Some(ParsedRequestBody {
                required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
                content_type: content_type.unwrap_or_default(),
                description: string_field(body, "description"),
                schema,
            })
        }
        Some(other) => {
            return Err(SpecParseError::InvalidOperation {
                path: path.to_string(),
                method,
                reason: format!("invalid request body: {other}"),
            });
        }
    };

    let mut responses = Vec::new();
    if let Some(Value::Object(entries)) = operation.get("responses").map(|r| follow_ref(r, root)) {
        for (status_code, response) in entries {
            let Value::Object(response) = follow_ref(response, root) else {
                return Err(SpecParseError::InvalidOperation {
                    path: path.to_string(),
                    method,
                    reason: format!("invalid response `{status_code}`: {response}"),
                });
            };
            let (content_type, schema) = first_content(response.get("content"), root);
            responses.push(ParsedResponse {
                status_code: status_code.clone(),
                description: string_field(response, "description"),
                content_type,
                schema,
            });
        }
    }

    let tags = operation
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedEndpoint {
        method,
        path: path.to_string(),
        operation_id: string_field(operation, "operationId"),
        summary: string_field(operation, "summary"),
        description: string_field(operation, "description"),
        tags,
        deprecated: operation
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        parameters,
        request_body,
        responses,
    })
}

fn parse_parameters(value: Option<&Value>, root: &Value) -> Vec<ParsedParameter> {
    let entries: Vec<&Value> = match value.map(|value| follow_ref(value, root)) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(items)) => items.values().collect(),
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            warn!(
                target = "domain::openapi::parse_parameters",
                value = %other,
                "ignoring parameters that are neither a list nor a map"
            );
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let Value::Object(param) = follow_ref(entry, root) else {
                warn!(
                    target = "domain::openapi::parse_parameters",
                    value = %entry,
                    "ignoring malformed parameter"
                );
                return None;
            };
            Some(ParsedParameter {
                name: string_field(param, "name").unwrap_or_default(),
                location: string_field(param, "in").unwrap_or_else(|| "query".to_string()),
                required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
                description: string_field(param, "description"),
                schema: param
                    .get("schema")
                    .and_then(|schema| summarize_schema(schema, root)),
            })
        })
        .collect()
}

fn first_content(
    content: Option<&Value>,
    root: &Value,
) -> (Option<String>, Option<SchemaSummary>) {
    let Some(Value::Object(content)) = content.map(|content| follow_ref(content, root)) else {
        return (None, None);
    };
    let Some((content_type, media)) = content.iter().next() else {
        return (None, None);
    };
    let schema = follow_ref(media, root)
        .get("schema")
        .and_then(|schema| summarize_schema(schema, root));
    (Some(content_type.clone()), schema)
}

fn summarize_schema(schema: &Value, root: &Value) -> Option<SchemaSummary> {
    let Value::Object(schema) = follow_ref(schema, root) else {
        return None;
    };

    Some(SchemaSummary {
        schema_type: string_field(schema, "type"),
        format: string_field(schema, "format"),
        description: string_field(schema, "description"),
        enum_values: schema
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        required: schema
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        properties: schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default(),
        item_type: schema
            .get("items")
            .map(|items| follow_ref(items, root))
            .and_then(Value::as_object)
            .and_then(|items| string_field(items, "type")),
    })
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    }
}

/// Follow a chain of local `#/...` references to the value it names.
///
/// Each lookup borrows from `root`, so shared or cyclic references cost one
/// pointer walk per hop. External, dangling and over-long chains stop at the
/// last value reached.
fn follow_ref<'a>(value: &'a Value, root: &'a Value) -> &'a Value {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        let Some(pointer) = current.get("$ref").and_then(Value::as_str) else {
            return current;
        };
        let Some(local) = pointer.strip_prefix('#') else {
            return current;
        };
        match root.pointer(local) {
            Some(target) => current = target,
            None => {
                warn!(
                    target = "domain::openapi::follow_ref",
                    pointer, "reference target not found"
                );
                return current;
            }
        }
    }

    warn!(
        target = "domain::openapi::follow_ref",
        depth = MAX_REF_DEPTH,
        "reference chain too long or cyclic; leaving reference unresolved"
    );
    current
}
