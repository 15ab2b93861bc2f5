//! Where the backend lives and how requests authenticate.

const DEFAULT_BASE_URL: &str = if cfg!(feature = "local-backend") {
    "http://localhost:8000/api"
} else {
    "https://api.pylearn.app"
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    /// Retried once when `base_url` cannot be reached at all.
    pub fallback_base_url: Option<String>,
    pub access_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            fallback_base_url: None,
            access_token: None,
        }
    }

    pub fn with_fallback(mut self, fallback_base_url: impl Into<String>) -> Self {
        self.fallback_base_url = Some(trim_base(fallback_base_url.into()));
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Reads `LEARN_API_URL`, `LEARN_API_FALLBACK_URL` and `LEARN_API_TOKEN`,
    /// loading a `.env` file first if one exists.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| get(key).filter(|value| !value.trim().is_empty());

        let mut config = match non_blank("LEARN_API_URL") {
            Some(url) => Self::new(url.trim()),
            None => Self::default(),
        };
        if let Some(fallback) = non_blank("LEARN_API_FALLBACK_URL") {
            config = config.with_fallback(fallback.trim());
        }
        if let Some(token) = non_blank("LEARN_API_TOKEN") {
            config = config.with_access_token(token.trim());
        }
        config
    }

    /// The fallback, unless it points at the primary base anyway.
    pub(crate) fn distinct_fallback(&self) -> Option<&str> {
        self.fallback_base_url
            .as_deref()
            .filter(|fallback| *fallback != self.base_url)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
