//! Tool executor - runs validated tool invocations

use std::sync::Arc;
use tracing::{debug, warn};

use super::web::{format_digest, WebSearch};
use super::{ToolDefinition, ToolInvocation};

/// Upper bound for a digest fed back into the conversation.
const MAX_RESULT_CHARS: usize = 8_000;

/// Executes the closed tool set. Never fails: every outcome is text the
/// model can read.
#[derive(Clone)]
pub struct ToolExecutor {
    search: Arc<dyn WebSearch>,
    max_result_chars: usize,
}

impl ToolExecutor {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self {
            search,
            max_result_chars: MAX_RESULT_CHARS,
        }
    }

    /// Get tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::search_web()]
    }

    /// Execute an invocation, degrading failures to explanatory text.
    pub async fn execute(&self, invocation: &ToolInvocation) -> String {
        match invocation {
            ToolInvocation::SearchWeb { query } => {
                debug!("Executing search_web: {}", query);
                match self.search.search(query).await {
                    Ok(hits) if hits.is_empty() => {
                        format!("No web results found for \"{}\".", query)
                    }
                    Ok(hits) => format_digest(query, &hits, self.max_result_chars),
                    Err(e) => {
                        warn!("Web search failed for {:?}: {}", query, e);
                        format!(
                            "The web search for \"{}\" is currently unavailable ({}). Answer from your own knowledge and say that no live results could be retrieved.",
                            query, e
                        )
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSearch;
    use super::*;
    use crate::tools::SearchHit;

    fn invocation(query: &str) -> ToolInvocation {
        ToolInvocation::SearchWeb { query: query.into() }
    }

    #[tokio::test]
    async fn test_execute_formats_digest() {
        let search = Arc::new(FakeSearch::with_hits(vec![SearchHit {
            title: "Tokio".into(),
            url: "https://tokio.rs".into(),
            snippet: "Async runtime".into(),
        }]));
        let executor = ToolExecutor::new(search.clone());

        let result = executor.execute(&invocation("tokio")).await;
        assert!(result.contains("Tokio"));
        assert!(result.contains("https://tokio.rs"));
        assert_eq!(search.queries.lock().unwrap().as_slice(), ["tokio"]);
    }

    #[tokio::test]
    async fn test_execute_no_results() {
        let executor = ToolExecutor::new(Arc::new(FakeSearch::with_hits(vec![])));
        let result = executor.execute(&invocation("nothing")).await;
        assert!(result.contains("No web results"));
    }

    #[tokio::test]
    async fn test_execute_absorbs_failure() {
        let executor = ToolExecutor::new(Arc::new(FakeSearch::failing()));
        let result = executor.execute(&invocation("rust")).await;
        assert!(result.contains("unavailable"));
    }

    #[test]
    fn test_definitions() {
        let executor = ToolExecutor::new(Arc::new(FakeSearch::with_hits(vec![])));
        let definitions = executor.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "search_web");
    }
}
