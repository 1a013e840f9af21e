use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Generation Provider Args ---
    /// Type of LLM provider for answer generation (openai, anthropic, gemini, groq, xai, deepseek, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Model identifier passed to the generation provider (e.g., gpt-4o, gemini-1.5-flash, llama3)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// API Key for the generation provider. Not needed for Ollama.
    #[arg(long, env = "CHAT_API_KEY")]
    pub chat_api_key: Option<String>,

    /// Base URL for the generation provider API. Each provider has its own default.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    // --- Retrieval Service Args ---
    /// Endpoint of the retrieval/reranking service (e.g., https://retrieval.example.com/v1/retrieve)
    #[arg(long, env = "RETRIEVAL_URL")]
    pub retrieval_url: Option<String>,

    /// Bearer credential sent to the retrieval service.
    #[arg(long, env = "RETRIEVAL_API_KEY")]
    pub retrieval_api_key: Option<String>,

    // --- General App Args ---
    /// Optional JSON file overriding the system instruction and/or the retrieval prompt template.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Framing of streamed answers: "data" (data-stream parts) or "text" (raw fragments).
    #[arg(long, env = "STREAM_PROTOCOL", default_value = "data")]
    pub stream_protocol: String,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format) for serving HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for serving HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

/// Arguments of the terminal chat client.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Terminal client for a cited-chat server", long_about = None)]
pub struct ClientArgs {
    /// Chat endpoint of a running cited-chat server.
    #[arg(long, env = "CHAT_ENDPOINT", default_value = "http://127.0.0.1:4000/api/chat")]
    pub endpoint: String,

    /// Framing the server streams with ("data" or "text").
    #[arg(long, env = "STREAM_PROTOCOL", default_value = "data")]
    pub stream_protocol: String,
}
