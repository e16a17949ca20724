use std::collections::HashMap;

use kiro_claude::request::ToolDefinition;
use serde::Serialize;
use serde_json::Value;

const MAX_DESCRIPTION_CHARS: usize = 9_216;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTool {
    pub tool_specification: ToolSpecification,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchemaWrapper,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSchemaWrapper {
    pub json: Value,
}

/// Convert one Claude tool definition to the upstream shape (step 5).
/// Returns `None` for `web_search`/`websearch`, which the upstream doesn't
/// support and which are dropped rather than forwarded.
pub fn convert_tool(tool: &ToolDefinition) -> Option<UpstreamTool> {
    let lower = tool.name.to_lowercase();
    if lower == "web_search" || lower == "websearch" {
        return None;
    }

    let description: String = tool.description.chars().take(MAX_DESCRIPTION_CHARS).collect();

    let mut schema = tool.input_schema.clone();
    if schema.is_null() {
        schema = serde_json::json!({});
    }
    strip_dollar_properties(&mut schema);

    Some(UpstreamTool {
        tool_specification: ToolSpecification {
            name: tool.name.clone(),
            description,
            input_schema: InputSchemaWrapper { json: schema },
        },
    })
}

/// Recursively strip `$`-prefixed property names (`$expand`, `$select`, …)
/// from every `properties` object found anywhere in the schema, along with
/// their entries in the sibling `required` array.
fn strip_dollar_properties(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        if let Some(Value::Object(props)) = obj.get_mut("properties") {
            let dollar_keys: Vec<String> =
                props.keys().filter(|k| k.starts_with('$')).cloned().collect();
            for key in &dollar_keys {
                props.remove(key);
            }
            if let Some(Value::Array(required)) = obj.get_mut("required") {
                required.retain(|v| !v.as_str().map(|s| s.starts_with('$')).unwrap_or(false));
            }
        }
        for (_, v) in obj.iter_mut() {
            strip_dollar_properties(v);
        }
    } else if let Some(arr) = value.as_array_mut() {
        for v in arr.iter_mut() {
            strip_dollar_properties(v);
        }
    }
}

/// Map each tool name to whether its schema declares at least one required
/// parameter — used by the orphan filter (step 3) to decide whether an
/// empty-input tool-use is a real omission or a legitimately no-arg call.
pub fn required_params_map(tools: &[ToolDefinition]) -> HashMap<String, bool> {
    tools
        .iter()
        .map(|t| {
            let has_required = t
                .input_schema
                .get("required")
                .and_then(|r| r.as_array())
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            (t.name.clone(), has_required)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, schema: Value) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: "a tool".to_string(),
            input_schema: schema,
        }
    }

    #[test]
    fn web_search_variants_are_dropped() {
        assert!(convert_tool(&tool("web_search", serde_json::json!({}))).is_none());
        assert!(convert_tool(&tool("WebSearch", serde_json::json!({}))).is_none());
        assert!(convert_tool(&tool("websearch", serde_json::json!({}))).is_none());
    }

    #[test]
    fn description_truncated_to_max_length() {
        let long_desc = "x".repeat(MAX_DESCRIPTION_CHARS + 500);
        let mut t = tool("search", serde_json::json!({}));
        t.description = long_desc;
        let converted = convert_tool(&t).unwrap();
        assert_eq!(
            converted.tool_specification.description.chars().count(),
            MAX_DESCRIPTION_CHARS
        );
    }

    #[test]
    fn dollar_prefixed_properties_stripped_recursively() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "$expand": {"type": "string"},
                "query": {"type": "string"}
            },
            "required": ["$expand", "query"]
        });
        let converted = convert_tool(&tool("search", schema)).unwrap();
        let props = converted.tool_specification.input_schema.json["properties"]
            .as_object()
            .unwrap();
        assert!(!props.contains_key("$expand"));
        assert!(props.contains_key("query"));
        let required = converted.tool_specification.input_schema.json["required"]
            .as_array()
            .unwrap();
        assert_eq!(required, &vec![serde_json::json!("query")]);
    }

    #[test]
    fn null_schema_defaults_to_empty_object() {
        let converted = convert_tool(&tool("search", Value::Null)).unwrap();
        assert_eq!(converted.tool_specification.input_schema.json, serde_json::json!({}));
    }

    #[test]
    fn required_params_map_reflects_schema() {
        let tools = vec![
            tool("a", serde_json::json!({"required": ["x"]})),
            tool("b", serde_json::json!({"required": []})),
            tool("c", serde_json::json!({})),
        ];
        let map = required_params_map(&tools);
        assert_eq!(map.get("a"), Some(&true));
        assert_eq!(map.get("b"), Some(&false));
        assert_eq!(map.get("c"), Some(&false));
    }
}
