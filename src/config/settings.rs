use crate::cli::Args;
use crate::llm::{ LlmConfig, LlmType };
use crate::models::stream::StreamProtocol;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing model identifier: set CHAT_MODEL or --chat-model")]
    MissingModel,
    #[error("Missing retrieval service credential: set RETRIEVAL_API_KEY or --retrieval-api-key")]
    MissingRetrievalApiKey,
    #[error("Missing retrieval service URL: set RETRIEVAL_URL or --retrieval-url")]
    MissingRetrievalUrl,
    #[error("Missing generation service API key for provider '{0}': set CHAT_API_KEY or --chat-api-key")]
    MissingGenerationApiKey(LlmType),
    #[error("Invalid retrieval service URL '{url}': {reason}")]
    InvalidRetrievalUrl { url: String, reason: String },
    #[error("{0}")]
    InvalidProvider(String),
    #[error("{0}")]
    InvalidStreamProtocol(String),
}

/// Validated process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmConfig,
    pub retrieval_url: Url,
    pub retrieval_api_key: String,
    pub stream_protocol: StreamProtocol,
    pub prompts_path: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Settings {
    /// Checks, in order: model, retrieval credential, retrieval URL, then the
    /// generation API key. Blank values count as missing.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let llm_type: LlmType = args.chat_llm_type
            .parse()
            .map_err(|e: crate::llm::ParseLlmTypeError| ConfigError::InvalidProvider(e.to_string()))?;

        let model = non_blank(&args.chat_model).ok_or(ConfigError::MissingModel)?;
        let retrieval_api_key = non_blank(&args.retrieval_api_key).ok_or(
            ConfigError::MissingRetrievalApiKey
        )?;
        let raw_url = non_blank(&args.retrieval_url).ok_or(ConfigError::MissingRetrievalUrl)?;
        let chat_api_key = non_blank(&args.chat_api_key);
        if llm_type.requires_api_key() && chat_api_key.is_none() {
            return Err(ConfigError::MissingGenerationApiKey(llm_type));
        }

        let retrieval_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidRetrievalUrl {
            url: raw_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(retrieval_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidRetrievalUrl {
                url: raw_url,
                reason: "scheme must be http or https".to_string(),
            });
        }

        let stream_protocol = args.stream_protocol
            .parse::<StreamProtocol>()
            .map_err(|e| ConfigError::InvalidStreamProtocol(e.to_string()))?;

        Ok(Self {
            llm: LlmConfig {
                llm_type,
                api_key: chat_api_key,
                completion_model: model,
                base_url: non_blank(&args.chat_base_url),
            },
            retrieval_url,
            retrieval_api_key,
            stream_protocol,
            prompts_path: non_blank(&args.prompts_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_args() -> Args {
        Args {
            chat_llm_type: "openai".into(),
            chat_model: Some("gpt-4o".into()),
            chat_api_key: Some("sk-test".into()),
            chat_base_url: None,
            retrieval_url: Some("https://retrieval.example.com/v1/retrieve".into()),
            retrieval_api_key: Some("rk-test".into()),
            prompts_path: None,
            stream_protocol: "data".into(),
            server_addr: "127.0.0.1:0".into(),
            tls_cert_path: None,
            tls_key_path: None,
            enable_tls: false,
        }
    }

    #[test]
    fn complete_configuration_is_accepted() {
        let settings = Settings::from_args(&complete_args()).unwrap();
        assert_eq!(settings.llm.completion_model, "gpt-4o");
        assert_eq!(settings.llm.llm_type, LlmType::OpenAI);
        assert_eq!(settings.retrieval_url.as_str(), "https://retrieval.example.com/v1/retrieve");
        assert_eq!(settings.stream_protocol, StreamProtocol::Data);
    }

    #[test]
    fn each_missing_value_has_its_own_error() {
        let mut args = complete_args();
        args.chat_model = None;
        assert_eq!(Settings::from_args(&args).unwrap_err(), ConfigError::MissingModel);

        let mut args = complete_args();
        args.retrieval_api_key = None;
        assert_eq!(Settings::from_args(&args).unwrap_err(), ConfigError::MissingRetrievalApiKey);

        let mut args = complete_args();
        args.retrieval_url = None;
        assert_eq!(Settings::from_args(&args).unwrap_err(), ConfigError::MissingRetrievalUrl);

        let mut args = complete_args();
        args.chat_api_key = None;
        assert_eq!(
            Settings::from_args(&args).unwrap_err(),
            ConfigError::MissingGenerationApiKey(LlmType::OpenAI)
        );
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut args = complete_args();
        args.chat_model = Some("   ".into());
        assert_eq!(Settings::from_args(&args).unwrap_err(), ConfigError::MissingModel);
    }

    #[test]
    fn ollama_needs_no_generation_key() {
        let mut args = complete_args();
        args.chat_llm_type = "ollama".into();
        args.chat_api_key = None;
        let settings = Settings::from_args(&args).unwrap();
        assert!(settings.llm.api_key.is_none());
    }

    #[test]
    fn malformed_retrieval_url_is_rejected() {
        let mut args = complete_args();
        args.retrieval_url = Some("not a url".into());
        assert!(matches!(
            Settings::from_args(&args),
            Err(ConfigError::InvalidRetrievalUrl { .. })
        ));

        args.retrieval_url = Some("ftp://files.example.com/retrieve".into());
        assert!(matches!(
            Settings::from_args(&args),
            Err(ConfigError::InvalidRetrievalUrl { .. })
        ));
    }

    #[test]
    fn unknown_provider_and_protocol_are_rejected() {
        let mut args = complete_args();
        args.chat_llm_type = "bard".into();
        assert!(matches!(Settings::from_args(&args), Err(ConfigError::InvalidProvider(_))));

        let mut args = complete_args();
        args.stream_protocol = "sse".into();
        assert!(matches!(Settings::from_args(&args), Err(ConfigError::InvalidStreamProtocol(_))));
    }
}
