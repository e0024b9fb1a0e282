use super::Config;

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("ASKREPO_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("ASKREPO_LLM_CHAT_MODEL") {
            self.llm.chat_model = v;
        }
        if let Ok(v) = std::env::var("ASKREPO_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("ASKREPO_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("ASKREPO_EMBEDDING_BATCH_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            self.embedding.batch_size = n;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("ASKREPO_INDEX_MAX_FILE_KB")
            && let Ok(kb) = v.parse::<u64>()
        {
            self.index.max_file_kb = kb;
        }
        if let Ok(v) = std::env::var("ASKREPO_INDEX_INCLUDE") {
            self.index.include = split_list(&v);
        }
        if let Ok(v) = std::env::var("ASKREPO_INDEX_EXCLUDE") {
            self.index.exclude = split_list(&v);
        }
        if let Ok(v) = std::env::var("ASKREPO_CHUNKER_MAX_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.max_chars = n;
        }
        if let Ok(v) = std::env::var("ASKREPO_CHUNKER_OVERLAP_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.overlap_chars = n;
        }
        if let Ok(v) = std::env::var("ASKREPO_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
    }
}
