//! Snapshot tests for service configuration

#[cfg(test)]
mod snapshot_tests {
    use crate::{OpenAiConfig, SearchConfig};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_openai_config_snapshot() {
        let config = OpenAiConfig::new("https://example.openai.azure.com/openai/v1/", "test_api_key_redacted");

        assert_yaml_snapshot!(config, @r###"
        ---
        endpoint: "https://example.openai.azure.com/openai/v1/"
        api_key: test_api_key_redacted
        chat_model: gpt-4.1
        judge_model: ~
        embedding_model: text-embedding-3-large
        timeout_secs: 120
        "###);
        assert_eq!(config.judge_model(), "gpt-4.1");
    }

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::new("https://my-search.search.windows.net", "handbook", "test_key");

        assert_eq!(config.api_version, SearchConfig::DEFAULT_API_VERSION);
        assert_eq!(
            config.search_url(),
            "https://my-search.search.windows.net/indexes/handbook/docs/search?api-version=2024-07-01"
        );
    }
}
