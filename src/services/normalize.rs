//! 提取结果扁平化 - 业务能力层
//!
//! 把提取服务冗长的嵌套 JSON 转成 [`ExtractedFieldMap`]。
//!
//! 结构异常时不会报错中断，而是返回只含诊断信息的字段表，
//! 同时通过 [`NormalizeOutcome::warning`] 和 `warn!` 日志暴露出来。

use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use crate::models::field_map::{ExtractedFieldMap, TECH_SPECS_FIELD};

/// 扁平化结果
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutcome {
    pub fields: ExtractedFieldMap,
    /// 结构异常时的说明
    pub warning: Option<NormalizeWarning>,
}

impl NormalizeOutcome {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

/// 结构异常说明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeWarning {
    pub reason: String,
}

impl fmt::Display for NormalizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "提取结果结构异常，已降级为诊断信息: {}", self.reason)
    }
}

/// 扁平化提取服务的原始响应
///
/// 对同样的输入总是得到同样的输出。
pub fn normalize(raw: &Value) -> NormalizeOutcome {
    match try_normalize(raw) {
        Ok(fields) => NormalizeOutcome {
            fields,
            warning: None,
        },
        Err(reason) => {
            let warning = NormalizeWarning { reason };
            warn!("⚠️ {}", warning);
            NormalizeOutcome {
                fields: ExtractedFieldMap::diagnostic(),
                warning: Some(warning),
            }
        }
    }
}

fn try_normalize(raw: &Value) -> Result<ExtractedFieldMap, String> {
    let document = key(raw, "Transaction")
        .and_then(|t| key(t, "Documents"))
        .and_then(|d| first(d, "Documents"))?;
    let fields = key(document, "ExtractedData")
        .and_then(|d| key(d, "RootObject"))
        .and_then(|r| key(r, "Fields"))
        .and_then(|f| array(f, "Fields"))?;

    let mut clean = ExtractedFieldMap::new();

    for field in fields {
        let field = object(field, "Fields[]")?;
        let Some((name, list)) = named_list(field)? else {
            continue;
        };

        if name == TECH_SPECS_FIELD {
            let mut rows = Vec::with_capacity(list.len());
            for row in list {
                let row_data = parse_row(row)?;
                if !row_data.is_empty() {
                    rows.push(row_data);
                }
            }
            clean.insert_rows(name, rows);
        } else {
            clean.insert_scalar(name, first_value(list)?);
        }
    }

    Ok(clean)
}

/// 解析 techSpecs 的一行
fn parse_row(row: &Value) -> Result<Map<String, Value>, String> {
    let row = object(row, "techSpecs 行")?;
    let columns = match row.get("Value") {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(value) => match object(value, "techSpecs 行的 Value")?.get("Fields") {
            None | Some(Value::Null) => return Ok(Map::new()),
            Some(fields) => array(fields, "techSpecs 行的 Fields")?,
        },
    };

    let mut row_data = Map::new();
    for column in columns {
        let column = object(column, "techSpecs 列")?;
        if let Some((name, list)) = named_list(column)? {
            let value = first_value(list)?;
            if !value.is_null() {
                row_data.insert(name.to_string(), value);
            }
        }
    }
    Ok(row_data)
}

/// 取字段的 Name 和非空 List，缺任意一个则跳过
fn named_list(field: &Map<String, Value>) -> Result<Option<(&str, &Vec<Value>)>, String> {
    let name = match field.get("Name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(None),
    };
    let list = match field.get("List") {
        None | Some(Value::Null) => return Ok(None),
        Some(list) => array(list, "List")?,
    };
    if list.is_empty() {
        return Ok(None);
    }
    Ok(Some((name, list)))
}

/// List 中第一项的 Value
fn first_value(list: &[Value]) -> Result<Value, String> {
    let entry = list.first().ok_or_else(|| "List 为空".to_string())?;
    Ok(object(entry, "List[0]")?
        .get("Value")
        .cloned()
        .unwrap_or(Value::Null))
}

fn key<'a>(value: &'a Value, name: &str) -> Result<&'a Value, String> {
    object(value, name)?
        .get(name)
        .ok_or_else(|| format!("缺少字段 `{}`", name))
}

fn first<'a>(value: &'a Value, what: &str) -> Result<&'a Value, String> {
    array(value, what)?
        .first()
        .ok_or_else(|| format!("`{}` 为空数组", what))
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("`{}` 应为对象，实际为 {}", what, type_name(value)))
}

fn array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("`{}` 应为数组，实际为 {}", what, type_name(value)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "布尔值",
        Value::Number(_) => "数字",
        Value::String(_) => "字符串",
        Value::Array(_) => "数组",
        Value::Object(_) => "对象",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field_map::DIAGNOSTIC_MESSAGE;
    use serde_json::json;

    fn wrap(fields: Value) -> Value {
        json!({
            "Transaction": {
                "Documents": [{
                    "ExtractedData": { "RootObject": { "Fields": fields } }
                }]
            }
        })
    }

    fn spec_row(value: &str) -> Value {
        json!({
            "Value": {
                "Fields": [{ "Name": "spec", "List": [{ "Value": value }] }]
            }
        })
    }

    #[test]
    fn test_single_scalar_field() {
        let raw = wrap(json!([{ "Name": "title", "List": [{ "Value": "Tender A" }] }]));
        let outcome = normalize(&raw);

        assert!(outcome.warning.is_none());
        assert_eq!(Value::from(outcome.fields), json!({ "title": "Tender A" }));
    }

    #[test]
    fn test_tech_specs_rows_keep_order() {
        let raw = wrap(json!([{
            "Name": "techSpecs",
            "List": [spec_row("5kW"), spec_row("10kW")]
        }]));
        let outcome = normalize(&raw);

        assert_eq!(
            Value::from(outcome.fields),
            json!({ "techSpecs": [{ "spec": "5kW" }, { "spec": "10kW" }] })
        );
    }

    #[test]
    fn test_fields_without_name_or_values_are_skipped() {
        let raw = wrap(json!([
            { "Name": "", "List": [{ "Value": "x" }] },
            { "List": [{ "Value": "y" }] },
            { "Name": "budget", "List": [] },
            { "Name": "owner" },
            { "Name": "deadline", "List": [{ "Value": null }] },
            { "Name": "location", "List": [{ "Value": "Oslo" }] }
        ]));
        let outcome = normalize(&raw);

        assert!(outcome.warning.is_none());
        assert_eq!(Value::from(outcome.fields), json!({ "location": "Oslo" }));
    }

    #[test]
    fn test_empty_rows_are_dropped() {
        let raw = wrap(json!([{
            "Name": "techSpecs",
            "List": [
                { "Value": { "Fields": [] } },
                {},
                spec_row("7kW")
            ]
        }]));
        let outcome = normalize(&raw);

        assert_eq!(
            Value::from(outcome.fields),
            json!({ "techSpecs": [{ "spec": "7kW" }] })
        );
    }

    #[test]
    fn test_structural_mismatch_degrades_to_diagnostic() {
        let cases = [
            json!({}),
            json!({ "Transaction": { "Documents": [] } }),
            json!({ "Transaction": { "Documents": "oops" } }),
            wrap(json!({ "not": "an array" })),
            wrap(json!([{ "Name": "title", "List": "Tender A" }])),
            wrap(json!([{ "Name": "title", "List": ["Tender A"] }])),
        ];

        for raw in cases {
            let outcome = normalize(&raw);
            assert!(outcome.is_degraded(), "expected degradation for {raw}");
            assert_eq!(
                Value::from(outcome.fields),
                json!({ "error": DIAGNOSTIC_MESSAGE })
            );
        }
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = wrap(json!([
            { "Name": "title", "List": [{ "Value": "Tender A" }] },
            { "Name": "techSpecs", "List": [spec_row("5kW"), spec_row("10kW")] },
            { "Name": "budget", "List": [{ "Value": 1200 }] }
        ]));

        let first = normalize(&raw);
        let second = normalize(&raw);
        assert_eq!(first, second);

        let keys: Vec<_> = first.fields.keys().cloned().collect();
        assert_eq!(keys, vec!["title", "techSpecs", "budget"]);
    }
}
