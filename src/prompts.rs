//! 提示模板与固定回复文本
//!
//! 模板按名称从 JSON 文件（llm.template_source）读取，文件缺失或缺少某个名称时使用内置默认值。
//! 占位符为 `{name}` 形式，渲染时逐个替换。

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// 中枢语言（检索与默认人设使用）
pub const PIVOT_LANGUAGE: &str = "español";

pub const WELCOME_MESSAGE: &str = "¡Hola! Soy tu asistente conversacional 😊. Estoy para ayudarte a responder cualquier duda que tengas. ¡Preguntame todo lo que necesites! Para empezar me encantaría que me dijeras tu nombre.";

pub const NAME_REPROMPT: &str = "¡Uy, perdoname pero no te entendí! ¿Me podés decir tu nombre?";

pub const LANGUAGE_REPROMPT: &str = "¡Uy, perdoname pero no te entendí! ¿Me lo podés volver a escribir?";

pub const APOLOGY_MESSAGE: &str = "Perdón, tuvimos un problema técnico. Por favor, intentá más tarde.";

const GREETING_TEMPLATE: &str = "¡Excelente, mucho gusto {user_name}! Preguntame lo que quieras.";

/// 识别到名字后的问候语
pub fn greeting(user_name: &str) -> String {
    GREETING_TEMPLATE.replace("{user_name}", user_name)
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Unknown prompt template: {0}")]
    MissingTemplate(String),

    #[error("Failed to read template source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template source is not a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// 模板名称
pub mod names {
    pub const GET_NAME: &str = "get_name";
    pub const GET_LANGUAGE: &str = "get_language";
    pub const CALL_RAG: &str = "call_rag";
    pub const PERSONALITY: &str = "personality";
    pub const PERSONALITY_ESP: &str = "personality_esp";
}

const DEFAULT_GET_NAME: &str = "Sos un asistente que identifica el nombre de la persona con la que conversás.
Leé el historial y el último mensaje del usuario y extraé su nombre de pila.
Si el usuario no dijo su nombre, devolvé una cadena vacía en user_name.

Historial:
{chat_history}

Mensaje del usuario: {input}

{format_instructions}";

const DEFAULT_GET_LANGUAGE: &str = "Detectá el idioma en el que está escrito el mensaje del usuario y traducilo al español.
En language escribí el nombre del idioma en español y en minúsculas (por ejemplo: español, inglés, portugués).
En translate escribí la traducción al español del mensaje. Si no podés determinar el idioma, devolvé language vacío.

Mensaje del usuario: {input}

{format_instructions}";

const DEFAULT_CALL_RAG: &str = "Sos un asistente que responde preguntas usando únicamente el contexto provisto.
Si el contexto no alcanza para responder, decilo con amabilidad.

Contexto:
{context}

Historial:
{chat_history}

Pregunta (traducida al español): {translated_input}
Pregunta original: {input}

Respuesta:";

const DEFAULT_PERSONALITY_ESP: &str = "Reescribí la siguiente respuesta con un tono cálido, cercano y rioplatense, dirigiéndote a {user_name} por su nombre.
No agregues información que no esté en la respuesta original ni en el fragmento consultado.

Fragmento consultado:
{context}

Respuesta original:
{draft}";

const DEFAULT_PERSONALITY: &str = "Rewrite the following answer in a warm, friendly tone, addressing {user_name} by name.
The answer is written in Spanish: translate it into {language} and reply only in {language}.
Do not add information that is not in the original answer or the retrieved excerpt.

Retrieved excerpt (Spanish):
{context}

Original answer:
{draft}";

/// 模板集合
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let templates = [
            (names::GET_NAME, DEFAULT_GET_NAME),
            (names::GET_LANGUAGE, DEFAULT_GET_LANGUAGE),
            (names::CALL_RAG, DEFAULT_CALL_RAG),
            (names::PERSONALITY, DEFAULT_PERSONALITY),
            (names::PERSONALITY_ESP, DEFAULT_PERSONALITY_ESP),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { templates }
    }
}

impl PromptTemplates {
    /// 从 JSON 文件加载；文件不存在时全部使用默认模板
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let path = path.as_ref();
        let mut templates = Self::default();
        if !path.exists() {
            tracing::warn!(
                "Template source {} not found, using built-in prompts",
                path.display()
            );
            return Ok(templates);
        }
        let raw = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, String> = serde_json::from_str(&raw)?;
        tracing::info!("Loaded {} prompt template(s) from {}", overrides.len(), path.display());
        templates.templates.extend(overrides);
        Ok(templates)
    }

    pub fn get(&self, name: &str) -> Result<&str, PromptError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PromptError::MissingTemplate(name.to_string()))
    }

    /// 渲染模板：单遍扫描，将 `{key}` 替换为对应值，未提供的占位符保持原样。
    /// 代入的值不会再被扫描。
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self.get(name)?;
        let mut text = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let key = &after[..close];
                vars.iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| (*v, close))
            });
            match value {
                Some((value, close)) => {
                    text.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    text.push('{');
                    rest = after;
                }
            }
        }
        text.push_str(rest);
        Ok(text)
    }
}
