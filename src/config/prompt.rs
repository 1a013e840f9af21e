use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use log::info;

pub const QUESTION_PLACEHOLDER: &str = "{question}";
pub const SOURCES_PLACEHOLDER: &str = "{sources}";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are a knowledgeable, careful assistant that answers questions using the reference \
material supplied with each question.
Always answer in valid, well-structured markdown: use headings, bullet lists and tables \
where they make the answer easier to read, keep paragraphs short, and never wrap the whole \
answer in a code block.
If the supplied information is not sufficient to answer, say that you cannot answer the \
question from the available information instead of guessing.";

const DEFAULT_RAG_TEMPLATE: &str = "\
Answer the question below using only the numbered sources that follow it.

Citation rules:
- Every sentence that uses information from a source must end with a citation for that source.
- A citation is a markdown link whose text is the source index and whose target is the source URL, \
for example [3](https://example.com/page).
- Put the citation at the end of the sentence it supports. Cite several sources with consecutive \
links, for example [1](https://example.com/a)[2](https://example.com/b).
- Each source starts with a \"Cite as:\" line giving its exact citation. Copy it unchanged.
- Only cite the sources listed below and never change their index or URL.
- If the sources do not contain enough information to answer, say that you cannot answer.

Question: {question}

Sources:
{sources}";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Prompt JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

/// The two fixed instructions sent with every chat request.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// System-role instruction: persona and markdown requirement.
    pub system_instruction: String,
    /// Replaces the last user turn when retrieval found context.
    pub rag_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            rag_template: DEFAULT_RAG_TEMPLATE.to_string(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if !self.rag_template.contains(QUESTION_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder(QUESTION_PLACEHOLDER));
        }
        if !self.rag_template.contains(SOURCES_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder(SOURCES_PLACEHOLDER));
        }
        Ok(())
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(Arc::new(config))
}

/// Loads overrides from `path`; fields absent from the file keep their defaults.
pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let path = path.as_ref();
    let file_content = fs::read_to_string(path).map_err(|source| PromptError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = load_prompts_from_str(&file_content)?;
    info!("Loaded prompt overrides from: {}", path.display());
    Ok(config)
}

/// Builds the content that replaces the last user turn.
///
/// Placeholders are substituted in one left-to-right pass over `template`, so
/// a question that itself contains `{sources}` is inserted literally.
pub fn build_rag_prompt(template: &str, question: &str, sources: &str) -> String {
    let mut out = String::with_capacity(template.len() + question.len() + sources.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if tail.starts_with(QUESTION_PLACEHOLDER) {
            out.push_str(question);
            rest = &tail[QUESTION_PLACEHOLDER.len()..];
        } else if tail.starts_with(SOURCES_PLACEHOLDER) {
            out.push_str(sources);
            rest = &tail[SOURCES_PLACEHOLDER.len()..];
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_prompts_are_valid() {
        let config = PromptConfig::default();
        config.validate().unwrap();
        assert!(config.system_instruction.contains("markdown"));
        assert!(config.rag_template.contains("[3](https://example.com/page)"));
    }

    #[test]
    fn placeholders_are_filled_once() {
        let out = build_rag_prompt("Q={question} S={sources} {other}", "why {sources}?", "<s/>");
        assert_eq!(out, "Q=why {sources}? S=<s/> {other}");
    }

    #[test]
    fn repeated_placeholders_are_all_filled() {
        let out = build_rag_prompt("{question}|{question}|{sources}", "q", "s");
        assert_eq!(out, "q|q|s");
    }

    #[test]
    fn partial_override_keeps_default_system_instruction() {
        let config = load_prompts_from_str(r#"{"rag_template":"{sources}\n---\n{question}"}"#).unwrap();
        assert_eq!(config.system_instruction, PromptConfig::default().system_instruction);
        assert_eq!(config.rag_template, "{sources}\n---\n{question}");
    }

    #[test]
    fn template_without_sources_is_rejected() {
        let err = load_prompts_from_str(r#"{"rag_template":"just {question}"}"#).unwrap_err();
        assert!(matches!(err, PromptError::MissingPlaceholder(SOURCES_PLACEHOLDER)));
    }

    #[test]
    fn loads_overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"system_instruction":"Be brief."}}"#).unwrap();
        let config = load_prompts(file.path()).unwrap();
        assert_eq!(config.system_instruction, "Be brief.");
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = load_prompts("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
