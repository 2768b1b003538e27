//! 工具参数 Schema 与校验；工具调用格式的 JSON Schema（schemars 生成）
//!
//! ToolSpec 在 agent 构建后不可变。validate 把模型给出的参数校验为 ToolArgs：
//! 缺少必填参数或类型不符返回 InvalidArguments，绑定函数因此只会看到合法参数。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::providers::ProviderError;

/// 工具调用请求格式：与解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是 Available tools 中的一个
    pub tool: String,
    /// 工具参数，键为参数名
    pub args: HashMap<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn json_name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    /// 整数型接受 3.0 这类整值浮点
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamType::String, Value::String(_)) => Some(value.clone()),
            (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParamType::Number, Value::Number(_)) => Some(value.clone()),
            (ParamType::Integer, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::from(i))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64))
                }
            }
            _ => None,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 单个参数：名称、类型、是否必填、默认值
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: &str, ty: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, ty: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty, description)
        }
    }

    /// 可选参数，缺省时填入 default
    pub fn with_default(name: &str, ty: ParamType, default: Value, description: &str) -> Self {
        Self {
            required: false,
            default: Some(default),
            ..Self::required(name, ty, description)
        }
    }
}

/// 工具的对外描述：名称（在一个 agent 内唯一）、描述、参数表
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
        }
    }

    fn invalid(&self, reason: String) -> AgentError {
        AgentError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        }
    }

    /// 校验参数：null 视为缺省；未声明的键丢弃；缺省的可选参数填入默认值
    pub fn validate(&self, args: &Value) -> Result<ToolArgs, AgentError> {
        let empty = Map::new();
        let given = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(self.invalid(format!(
                    "arguments must be a JSON object, got {}",
                    json_type_name(other)
                )))
            }
        };

        for key in given.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                tracing::debug!(tool = %self.name, key = %key, "dropping undeclared argument");
            }
        }

        let mut out = Map::new();
        for param in &self.params {
            match given.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    let coerced = param.ty.coerce(value).ok_or_else(|| {
                        self.invalid(format!(
                            "parameter '{}' must be {} {}, got {}",
                            param.name,
                            if param.ty == ParamType::Integer { "an" } else { "a" },
                            param.ty.json_name(),
                            json_type_name(value)
                        ))
                    })?;
                    out.insert(param.name.clone(), coerced);
                }
                None if param.required => {
                    return Err(self.invalid(format!(
                        "missing required parameter '{}'",
                        param.name
                    )))
                }
                None => {
                    if let Some(default) = &param.default {
                        out.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(ToolArgs(out))
    }

    /// 参数的 JSON Schema（object），拼入工具目录
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = serde_json::json!({
                "type": p.ty.json_name(),
                "description": p.description,
            });
            if let Some(default) = &p.default {
                prop["default"] = default.clone();
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// 校验后的参数
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.get_str(key)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("missing '{}'", key)))
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for ToolArgs {
    fn from(map: Map<String, Value>) -> Self {
        ToolArgs(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ToolSpec {
        ToolSpec::new(
            "add_expense",
            "Record an expense",
            vec![
                ParamSpec::required("amount", ParamType::Number, "Amount"),
                ParamSpec::required("description", ParamType::String, "What it was for"),
                ParamSpec::with_default("currency", ParamType::String, json!("EUR"), "ISO code"),
                ParamSpec::optional("days", ParamType::Integer, "Days"),
            ],
        )
    }

    #[test]
    fn test_missing_required_names_the_field() {
        let err = spec().validate(&json!({"amount": 12.5})).unwrap_err();
        match err {
            AgentError::InvalidArguments { tool, reason } => {
                assert_eq!(tool, "add_expense");
                assert!(reason.contains("description"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let err = spec()
            .validate(&json!({"amount": "12", "description": "lunch"}))
            .unwrap_err();
        assert!(err.to_string().contains("must be a number, got string"));
    }

    #[test]
    fn test_defaults_and_null_and_unknown_keys() {
        let args = spec()
            .validate(&json!({
                "amount": 3,
                "description": "coffee",
                "currency": null,
                "days": 2.0,
                "colour": "red"
            }))
            .unwrap();
        assert_eq!(args.get_str("currency"), Some("EUR"));
        assert_eq!(args.get_i64("days"), Some(2));
        assert_eq!(args.get_f64("amount"), Some(3.0));
        assert!(args.raw().get("colour").is_none());
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(spec().validate(&json!(["x"])).is_err());
    }

    #[test]
    fn test_parameters_schema_lists_required() {
        let schema = spec().parameters_schema();
        assert_eq!(schema["required"], json!(["amount", "description"]));
        assert_eq!(schema["properties"]["currency"]["default"], json!("EUR"));
    }

    #[test]
    fn test_tool_call_schema_mentions_fields() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
    }
}
