use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 保留的多行字段名
pub const TECH_SPECS_FIELD: &str = "techSpecs";

/// 结构异常时返回的诊断信息
pub const DIAGNOSTIC_MESSAGE: &str = "Failed to parse the extraction JSON structure.";

/// 扁平化后的提取结果
///
/// 字段名 → 标量值；`techSpecs` 为有序的行列表。保持插入顺序，且不含 null 值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedFieldMap(Map<String, Value>);

impl ExtractedFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只含一条诊断信息的结果
    pub fn diagnostic() -> Self {
        let mut map = Map::new();
        map.insert("error".to_string(), Value::String(DIAGNOSTIC_MESSAGE.to_string()));
        Self(map)
    }

    /// 插入标量值，null 被忽略
    pub fn insert_scalar(&mut self, name: impl Into<String>, value: Value) {
        if !value.is_null() {
            self.0.insert(name.into(), value);
        }
    }

    /// 插入多行字段，空列表被忽略
    pub fn insert_rows(&mut self, name: impl Into<String>, rows: Vec<Map<String, Value>>) {
        if !rows.is_empty() {
            let rows = rows.into_iter().map(Value::Object).collect();
            self.0.insert(name.into(), Value::Array(rows));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// 渲染提示词时使用的缩进 JSON
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

impl From<ExtractedFieldMap> for Value {
    fn from(map: ExtractedFieldMap) -> Self {
        Value::Object(map.0)
    }
}
