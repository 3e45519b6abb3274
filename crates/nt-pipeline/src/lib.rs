//! NT Pipeline - Query parsing orchestrator
//!
//! Runs one query through the stages, strictly in sequence:
//! - Normalization into canonical vocabulary (rules or LLM)
//! - Candidate extraction (rules, LLM or hybrid)
//! - Validation with a single bounded repair
//! - The vagueness gate
//!
//! The date context is computed per call, never cached.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use nt_core::{
    AppConfig, DateContext, ExtractorKind, FilterObject, LlmClient, NormalizerKind, NtError,
    Result,
};
use nt_extractor::{FilterSchema, RuleFired, RuleNormalizer};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

pub mod extract;
pub mod gate;
pub mod llm;
pub mod normalize;
pub mod prompts;
pub mod repair;

pub use extract::{Candidate, CandidateSource, HybridExtractor, LlmCandidateSource, RuleCandidateSource};
pub use gate::gate;
pub use llm::{create_llm_client, GuardedClient, OllamaClient, OpenAiClient};
pub use normalize::{LlmNormalizer, Normalizer};
pub use prompts::PromptBuilder;
pub use repair::{RepairLoop, RepairOutcome, RepairState};

/// Query text as it may appear in `info` logs
pub fn preview(query: &str) -> String {
    const MAX_CHARS: usize = 50;
    if query.chars().count() > MAX_CHARS {
        format!("{}...", query.chars().take(MAX_CHARS).collect::<String>())
    } else {
        query.to_string()
    }
}

/// Intermediate results of one run, for diagnostics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DebugReport {
    /// Query as received
    pub query: String,
    /// Output of the normalizer
    pub enhanced_query: String,
    pub date_context: DateContext,
    /// Final, gated filter
    pub parsed_json: FilterObject,
    /// Whether the repair step was needed
    pub repaired: bool,
    /// Decision trace of the rule procedure; empty for pure LLM extraction
    #[schema(value_type = Vec<Object>)]
    pub rules_fired: Vec<RuleFired>,
}

/// The query parser
pub struct FilterPipeline {
    normalizer: Arc<dyn Normalizer>,
    extractor: Arc<dyn CandidateSource>,
    repair: RepairLoop<FilterSchema>,
}

impl FilterPipeline {
    pub fn new(normalizer: Arc<dyn Normalizer>, extractor: Arc<dyn CandidateSource>) -> Self {
        Self {
            normalizer,
            extractor,
            repair: RepairLoop::new(FilterSchema),
        }
    }

    /// Fully deterministic pipeline; needs no inference provider
    pub fn rules() -> Self {
        Self::new(
            Arc::new(RuleNormalizer::new()),
            Arc::new(RuleCandidateSource::new()),
        )
    }

    /// Build the strategies named in the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = if config.uses_llm() {
            Some(create_llm_client(&config.llm)?)
        } else {
            None
        };
        Self::with_client(config, client)
    }

    /// Build the configured strategies over a given inference client
    pub fn with_client(config: &AppConfig, client: Option<Arc<dyn LlmClient>>) -> Result<Self> {
        let require = || {
            client.clone().ok_or_else(|| {
                NtError::Config("the configured strategy needs an LLM client".to_string())
            })
        };

        let normalizer: Arc<dyn Normalizer> = match config.pipeline.normalizer {
            NormalizerKind::Rules => Arc::new(RuleNormalizer::new()),
            NormalizerKind::Llm => Arc::new(LlmNormalizer::new(require()?)),
        };
        let extractor: Arc<dyn CandidateSource> = match config.pipeline.extractor {
            ExtractorKind::Rules => Arc::new(RuleCandidateSource::new()),
            ExtractorKind::Llm => Arc::new(LlmCandidateSource::new(require()?)),
            ExtractorKind::Hybrid => Arc::new(HybridExtractor::new(require()?)),
        };

        info!(
            normalizer = normalizer.name(),
            extractor = extractor.name(),
            "pipeline ready"
        );
        Ok(Self::new(normalizer, extractor))
    }

    /// Strategy names, for logs and health output
    pub fn strategies(&self) -> (&'static str, &'static str) {
        (self.normalizer.name(), self.extractor.name())
    }

    /// Parse a query against today's date
    pub async fn parse(&self, query: &str) -> Result<FilterObject> {
        self.parse_at(query, DateContext::now()).await
    }

    /// Parse a query against a pinned reference date
    pub async fn parse_at(&self, query: &str, ctx: DateContext) -> Result<FilterObject> {
        self.run(query, ctx).await.map(|report| report.parsed_json)
    }

    /// Parse and keep the intermediate results
    pub async fn debug(&self, query: &str) -> Result<DebugReport> {
        self.run(query, DateContext::now()).await
    }

    pub async fn debug_at(&self, query: &str, ctx: DateContext) -> Result<DebugReport> {
        self.run(query, ctx).await
    }

    /// Parse many queries with at most `concurrency` in flight, preserving order
    pub async fn parse_batch(
        &self,
        queries: &[String],
        ctx: DateContext,
        concurrency: usize,
    ) -> Vec<Result<FilterObject>> {
        stream::iter(queries)
            .map(|query| self.parse_at(query, ctx))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn run(&self, query: &str, ctx: DateContext) -> Result<DebugReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NtError::InvalidQuery("query must not be empty".to_string()));
        }

        let start = Instant::now();
        info!(query = %preview(query), today = %ctx.today, "parsing query");

        let enhanced = self.normalizer.normalize(query).await?;
        debug!(enhanced = %enhanced, "query normalized");

        let candidate = self.extractor.produce(&enhanced, &ctx).await?;
        debug!(raw = %candidate.raw, "candidate produced");

        let outcome = self
            .repair
            .run(candidate.raw, self.extractor.as_ref())
            .await?;

        let filter = gate(outcome.value).inspect_err(|_| {
            warn!(query, enhanced = %enhanced, "query too vague for any filter");
        })?;

        info!(
            fields = filter.populated_fields(),
            repaired = outcome.transitions.contains(&RepairState::Repairing),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query parsed"
        );

        Ok(DebugReport {
            query: query.to_string(),
            enhanced_query: enhanced.into_inner(),
            date_context: ctx,
            parsed_json: filter,
            repaired: candidate.repaired || outcome.transitions.contains(&RepairState::Repairing),
            rules_fired: candidate.trace,
        })
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::rules()
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use nt_core::{LlmClient, NtError, Result};

    /// Replays canned replies in order; `Err` replies become inference failures
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new(
            replies: impl IntoIterator<Item = std::result::Result<String, String>>,
        ) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(reason)) => Err(NtError::Inference(reason)),
                None => Err(NtError::Inference("script exhausted".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
