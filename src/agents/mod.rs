pub mod advisor;
pub mod analyst;
pub mod artifacts;
pub mod extract;
pub mod parse;

pub use advisor::AdvisorAgent;
pub use analyst::AnalystAgent;

use async_trait::async_trait;
use tracing::info;

use crate::error::LlmError;
use crate::llm::{GenerationOptions, Prompt, TextGenerator};

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn system_prompt(&self) -> &str;

    /// Send `query` under this agent's system prompt.
    async fn run(
        &self,
        query: &str,
        llm: &dyn TextGenerator,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        info!(
            "🤖 [AGENT] Sending {} priority request to {}...",
            options.priority.as_str(),
            self.name()
        );
        let prompt = Prompt::new(self.system_prompt(), query);
        let response = llm.generate(&prompt, options).await?;
        info!("🤖 [AGENT] Response from {} ({} chars)", self.name(), response.len());
        Ok(response)
    }
}
