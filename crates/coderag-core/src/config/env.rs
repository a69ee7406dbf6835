use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_overrides_retrieval();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_LLM_PROVIDER") {
            match v.parse() {
                Ok(kind) => self.llm.provider = kind,
                Err(e) => tracing::warn!("ignoring invalid CODERAG_LLM_PROVIDER value: {e}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODERAG_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODERAG_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("CODERAG_TIMEOUT_EMBEDDING") {
            match v.parse::<u64>() {
                Ok(secs) => self.timeouts.embedding_seconds = secs,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_TIMEOUT_EMBEDDING value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_TIMEOUT_LLM") {
            match v.parse::<u64>() {
                Ok(secs) => self.timeouts.llm_seconds = secs,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_TIMEOUT_LLM value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_GENERATION_MAX_TOKENS") {
            match v.parse::<u32>() {
                Ok(n) => self.generation.max_tokens = n,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_GENERATION_MAX_TOKENS value: {v}"),
            }
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_DB_PATH") {
            self.index.db_path = Some(v);
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_MAX_CHUNK_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.index.max_chunk_size = n,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_INDEX_MAX_CHUNK_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_OVERLAP_RATIO") {
            match v.parse::<f32>() {
                Ok(ratio) => self.index.overlap_ratio = ratio,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_INDEX_OVERLAP_RATIO value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_BATCH_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.index.batch_size = n,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_INDEX_BATCH_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_PARALLELISM")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.parallelism = n;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_RESPECT_GITIGNORE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.respect_gitignore = enabled;
        }
        if let Ok(v) = std::env::var("CODERAG_INDEX_EXTRA_IGNORE") {
            self.index.extra_ignore = v
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_MIN_SCORE") {
            match v.parse::<f32>() {
                Ok(score) => self.retrieval.min_score = score,
                Err(_) => tracing::warn!("ignoring invalid CODERAG_RETRIEVAL_MIN_SCORE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_MAX_CONTEXT_CHARS") {
            match v.parse::<usize>() {
                Ok(n) => self.retrieval.max_context_chars = n,
                Err(_) => {
                    tracing::warn!("ignoring invalid CODERAG_RETRIEVAL_MAX_CONTEXT_CHARS value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_CACHE_CAPACITY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.cache_capacity = n;
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_CACHE_TTL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.retrieval.cache_ttl_secs = secs;
        }
    }
}
