//! 结构化输出：schemars 生成 JSON Schema 作为格式说明拼入 prompt，回复中提取 JSON 并反序列化
//!
//! 兼容两种回复：```json ... ``` 代码块，或正文里的第一个 `{ ... }`。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::llm::LlmError;

/// 返回目标类型的格式说明，供模板中的 {format_instructions} 使用
pub fn format_instructions<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "Responde únicamente con un objeto JSON válido que cumpla este JSON Schema, sin texto adicional:\n```json\n{}\n```",
        schema_json
    )
}

/// 从模型回复中截取 JSON 文本
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析结构化回复；无 JSON 或字段不符时返回 MalformedOutput
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, LlmError> {
    let json_str = extract_json(output)
        .ok_or_else(|| LlmError::MalformedOutput(format!("no JSON object in: {}", output)))?;
    serde_json::from_str(json_str)
        .map_err(|e| LlmError::MalformedOutput(format!("{}: {}", e, json_str)))
}
