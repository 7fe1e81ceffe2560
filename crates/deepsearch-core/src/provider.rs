#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Fireworks,
    OpenAI,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Fireworks => "fireworks",
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fireworks" => Some(Provider::Fireworks),
            "openai" => Some(Provider::OpenAI),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Fireworks, Provider::OpenAI, Provider::Ollama]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Fireworks => "Fireworks AI",
            Provider::OpenAI => "ChatGPT (OpenAI)",
            Provider::Ollama => "Ollama (Local)",
        }
    }

    /// Base URL of the OpenAI-compatible API; Ollama's comes from config.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Fireworks => "https://api.fireworks.ai/inference/v1",
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Fireworks => "accounts/fireworks/models/deepseek-r1",
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Ollama => "deepseek-r1",
        }
    }

    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Fireworks => Some("FIREWORKS_API_KEY"),
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Ollama => None,
        }
    }

    /// Models offered in the picker for hosted providers. Ollama's are listed live.
    pub fn hosted_models(&self) -> Vec<String> {
        let models: &[&str] = match self {
            Provider::Fireworks => &[
                "accounts/fireworks/models/deepseek-r1",
                "accounts/fireworks/models/deepseek-v3",
                "accounts/fireworks/models/qwen3-235b-a22b",
            ],
            Provider::OpenAI => &["gpt-4o-mini", "gpt-4o", "o3-mini"],
            Provider::Ollama => &[],
        };
        models.iter().map(|m| m.to_string()).collect()
    }
}
