//! Query normalizer strategies

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{LlmClient, NormalizedQuery, NtError, Result};
use nt_extractor::{concepts_of, Concept, RuleNormalizer};
use tracing::{debug, warn};

use crate::prompts;

/// Rewrites a raw query into canonical vocabulary
#[async_trait]
pub trait Normalizer: Send + Sync {
    async fn normalize(&self, raw: &str) -> Result<NormalizedQuery>;

    fn name(&self) -> &'static str;
}

#[async_trait]
impl Normalizer for RuleNormalizer {
    async fn normalize(&self, raw: &str) -> Result<NormalizedQuery> {
        Ok(RuleNormalizer::normalize(self, raw))
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// Rewrite by the inference mechanism, checked by the concept oracle.
///
/// The accepted rewrite is passed through the rule tables once more so both
/// extractor strategies see the same vocabulary.
pub struct LlmNormalizer {
    client: Arc<dyn LlmClient>,
}

impl LlmNormalizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Normalizer for LlmNormalizer {
    async fn normalize(&self, raw: &str) -> Result<NormalizedQuery> {
        let answer = self.client.generate(&prompts::enhancer_prompt(raw)).await?;
        let rewrite = first_line(&answer)
            .ok_or_else(|| NtError::Inference("empty rewrite".to_string()))?;
        debug!(rewrite, "LLM rewrite received");

        let expected = concepts_of(raw);
        let actual = concepts_of(rewrite);
        if expected != actual {
            let added = describe(actual.difference(&expected));
            let dropped = describe(expected.difference(&actual));
            warn!(raw, rewrite, %added, %dropped, "rewrite changed the query concepts");
            return Err(NtError::Inference(format!(
                "rewrite changed the query concepts (added: {added}; dropped: {dropped})"
            )));
        }

        Ok(RuleNormalizer::shared().normalize(rewrite))
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

/// First non-empty line of an answer, without a leading label or quotes
fn first_line(answer: &str) -> Option<&str> {
    let line = answer.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line
        .strip_prefix("Pergunta Reescrita:")
        .map_or(line, str::trim);
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!line.is_empty()).then_some(line)
}

fn describe<'a>(concepts: impl Iterator<Item = &'a Concept>) -> String {
    let list: BTreeSet<String> = concepts.map(|c| format!("{c:?}")).collect();
    if list.is_empty() {
        "none".to_string()
    } else {
        list.into_iter().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedLlm;

    #[tokio::test]
    async fn test_rule_strategy() {
        let normalizer = RuleNormalizer::new();
        let query = Normalizer::normalize(&normalizer, "nf 54321").await.unwrap();
        assert_eq!(query.as_str(), "Nota fiscal 54321");
        assert_eq!(Normalizer::name(&normalizer), "rules");
    }

    #[tokio::test]
    async fn test_faithful_rewrite_is_accepted() {
        let llm = Arc::new(ScriptedLlm::new([Ok(
            "Me mostre as notas fiscais em trânsito ordenadas pelo maior valor\n".to_string(),
        )]));
        let normalizer = LlmNormalizer::new(llm.clone());

        let query = normalizer
            .normalize("notas rodando ordenadas pelo mais caro")
            .await
            .unwrap();

        assert_eq!(
            query.as_str(),
            "Me mostre as notas fiscais em trânsito ordenadas pelo maior valor"
        );
        assert!(llm.prompts()[0].ends_with(
            "Pergunta Original: notas rodando ordenadas pelo mais caro\nPergunta Reescrita:"
        ));
    }

    #[tokio::test]
    async fn test_added_concept_is_rejected() {
        let llm = Arc::new(ScriptedLlm::new([Ok(
            "Quais notas fiscais foram emitidas e entregues hoje?".to_string(),
        )]));
        let normalizer = LlmNormalizer::new(llm);

        let err = normalizer
            .normalize("quais notas foram entregues hoje?")
            .await
            .unwrap_err();
        assert!(matches!(err, NtError::Inference(msg) if msg.contains("added")));
    }

    #[tokio::test]
    async fn test_dropped_concept_is_rejected() {
        let llm = Arc::new(ScriptedLlm::new([Ok(
            "Me mostre as notas fiscais em trânsito".to_string(),
        )]));
        let normalizer = LlmNormalizer::new(llm);

        let err = normalizer
            .normalize("notas rodando ordenadas pelo mais caro")
            .await
            .unwrap_err();
        assert!(matches!(err, NtError::Inference(_)));
    }

    #[tokio::test]
    async fn test_inference_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new([Err("rate limited".to_string())]));
        let normalizer = LlmNormalizer::new(llm);

        let err = normalizer.normalize("notas de hoje").await.unwrap_err();
        assert!(matches!(err, NtError::Inference(msg) if msg == "rate limited"));
    }

    #[test]
    fn test_first_line() {
        assert_eq!(
            first_line("\n  Pergunta Reescrita: \"Notas de hoje\"\nexplicação"),
            Some("Notas de hoje")
        );
        assert_eq!(first_line("   \n"), None);
    }
}
