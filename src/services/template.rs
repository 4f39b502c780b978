//! 提示词渲染 - 业务能力层
//!
//! 模板使用 `{name}` 占位符，`{{` 和 `}}` 表示字面量花括号，
//! 因此模板中可以直接写 JSON 示例。

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::TemplateError;
use crate::models::field_map::ExtractedFieldMap;

/// 提取数据占位符
pub const EXTRACTED_DATA: &str = "extracted_data";
/// 人工上下文占位符
pub const MANUAL_RAG_TEXT: &str = "manual_rag_text";

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}|\{[^{}]*\}|[{}]")
        .expect("占位符正则表达式无效")
});

/// 用给定变量渲染模板
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN.captures_iter(template) {
        let Some(token) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..token.start()]);

        match token.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            "{" | "}" => {
                return Err(TemplateError::UnbalancedBrace {
                    position: token.start(),
                })
            }
            text => match caps.get(1) {
                Some(name) => {
                    let value = vars
                        .iter()
                        .find(|(key, _)| *key == name.as_str())
                        .map(|(_, value)| *value)
                        .ok_or_else(|| TemplateError::UnknownPlaceholder {
                            name: name.as_str().to_string(),
                        })?;
                    out.push_str(value);
                }
                None => {
                    return Err(TemplateError::InvalidPlaceholder {
                        text: text.to_string(),
                    })
                }
            },
        }

        last = token.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// 把提取结果和人工上下文填入提示词模板
pub fn render_prompt(
    template: &str,
    fields: &ExtractedFieldMap,
    manual_rag_text: &str,
) -> Result<String, TemplateError> {
    if !template.contains(&format!("{{{}}}", EXTRACTED_DATA)) {
        warn!("⚠️ 提示词模板中没有 {{{}}} 占位符，提取结果不会传给模型", EXTRACTED_DATA);
    }

    let extracted = fields.to_pretty_json();
    render_template(
        template,
        &[(EXTRACTED_DATA, extracted.as_str()), (MANUAL_RAG_TEXT, manual_rag_text)],
    )
}
