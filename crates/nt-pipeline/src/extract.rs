//! Filter extractor strategies
//!
//! A [`CandidateSource`] turns a normalized query into raw candidate text and
//! can be asked, once, to repair a candidate that failed validation.

use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{DateContext, FilterObject, LlmClient, NormalizedQuery, NtError, Result};
use nt_extractor::{
    isolate_json, vocab, CandidateValidator, Decision, FilterSchema, Rule, RuleEngine, RuleFired,
    ValidationError,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::prompts;
use crate::repair::RepairLoop;

/// Raw candidate plus what is known about how it was made
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub raw: String,
    /// Rules that fired, when the rule procedure took part
    pub trace: Vec<RuleFired>,
    /// Whether a repair already happened while producing the candidate
    pub repaired: bool,
}

/// Produces filter candidates
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidate for a normalized query
    async fn produce(&self, query: &NormalizedQuery, ctx: &DateContext) -> Result<Candidate>;

    /// One corrective attempt for an invalid candidate
    async fn repair(&self, raw: &str, error: &ValidationError, schema: &str) -> Result<String>;

    fn name(&self) -> &'static str;
}

fn serialize(filter: &FilterObject) -> Result<String> {
    serde_json::to_string(filter)
        .map_err(|e| NtError::Extraction(format!("Failed to serialize candidate: {e}")))
}

// ============================================================================
// Rules
// ============================================================================

/// Serializes the rule decision
pub struct RuleCandidateSource {
    engine: RuleEngine<'static>,
}

impl RuleCandidateSource {
    pub fn new() -> Self {
        Self {
            engine: RuleEngine::new(),
        }
    }

    pub fn decide(&self, query: &NormalizedQuery, ctx: &DateContext) -> Decision {
        self.engine.decide(query, ctx)
    }
}

impl Default for RuleCandidateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateSource for RuleCandidateSource {
    async fn produce(&self, query: &NormalizedQuery, ctx: &DateContext) -> Result<Candidate> {
        let decision = self.decide(query, ctx);
        Ok(Candidate {
            raw: serialize(&decision.filter)?,
            trace: decision.trace,
            repaired: false,
        })
    }

    /// Drops unknown keys and values that fail their type or vocabulary, then
    /// enforces the invariants.
    async fn repair(&self, raw: &str, error: &ValidationError, _schema: &str) -> Result<String> {
        let value: Value = isolate_json(raw)
            .and_then(|json| serde_json::from_str(json).ok())
            .ok_or_else(|| NtError::Extraction(format!("Cannot repair candidate: {error}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| NtError::Extraction(format!("Cannot repair candidate: {error}")))?;

        let kept: Map<String, Value> = object
            .iter()
            .filter(|(key, value)| {
                let single = Value::Object(Map::from_iter([((*key).clone(), (*value).clone())]));
                FilterSchema.validate_fields(&single).is_ok()
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let filter = FilterSchema
            .validate_fields(&Value::Object(kept))
            .map_err(|e| NtError::Extraction(format!("Cannot repair candidate: {e}")))?
            .enforce_invariants();
        serialize(&filter)
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Chain-of-thought extraction by the inference mechanism
pub struct LlmCandidateSource {
    client: Arc<dyn LlmClient>,
}

impl LlmCandidateSource {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CandidateSource for LlmCandidateSource {
    async fn produce(&self, query: &NormalizedQuery, ctx: &DateContext) -> Result<Candidate> {
        let prompt = prompts::parser_prompt(query, ctx, &FilterSchema.describe());
        let answer = self.client.generate(&prompt).await.map_err(|e| match e {
            NtError::Inference(reason) => NtError::Extraction(reason),
            other => other,
        })?;

        if answer.trim().is_empty() {
            return Err(NtError::Extraction("empty answer".to_string()));
        }
        debug!(chars = answer.len(), "LLM candidate received");

        Ok(Candidate {
            raw: answer,
            ..Default::default()
        })
    }

    async fn repair(&self, raw: &str, error: &ValidationError, schema: &str) -> Result<String> {
        self.client
            .generate(&prompts::repair_prompt(raw, &error.to_string(), schema))
            .await
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

// ============================================================================
// Hybrid
// ============================================================================

/// Rules decide; inference only contributes free-text entities the rules
/// missed and that occur literally in the query.
pub struct HybridExtractor {
    rules: RuleCandidateSource,
    llm: LlmCandidateSource,
    repair: RepairLoop<FilterSchema>,
}

impl HybridExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            rules: RuleCandidateSource::new(),
            llm: LlmCandidateSource::new(client),
            repair: RepairLoop::new(FilterSchema),
        }
    }
}

#[async_trait]
impl CandidateSource for HybridExtractor {
    async fn produce(&self, query: &NormalizedQuery, ctx: &DateContext) -> Result<Candidate> {
        let decision = self.rules.decide(query, ctx);
        let candidate = self.llm.produce(query, ctx).await?;
        let inferred = self.repair.run(candidate.raw, &self.llm).await?;

        let (filter, trace) = merge(decision, &inferred.value, query);
        Ok(Candidate {
            raw: serialize(&filter)?,
            trace,
            repaired: inferred.repaired(),
        })
    }

    async fn repair(&self, raw: &str, error: &ValidationError, schema: &str) -> Result<String> {
        self.rules.repair(raw, error, schema).await
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

/// Combine the rule decision with an inferred candidate
fn merge(
    decision: Decision,
    inferred: &FilterObject,
    query: &NormalizedQuery,
) -> (FilterObject, Vec<RuleFired>) {
    let Decision { mut filter, mut trace } = decision;
    if filter.invoice_number.is_some() {
        return (filter, trace);
    }

    let folded_query = vocab::fold(query.as_str());
    let literal = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && folded_query.contains(&vocab::fold(v)))
            .map(str::to_string)
    };

    if filter.client.is_none() {
        if let Some(client) = literal(&inferred.client) {
            trace.push(RuleFired {
                rule: Rule::LiteralEntity,
                detail: format!("client '{client}' recognized by inference"),
            });
            filter.client = Some(client);
        }
    }

    if filter.carrier.is_none() {
        if let Some(carrier) = literal(&inferred.carrier) {
            trace.push(RuleFired {
                rule: Rule::LiteralEntity,
                detail: format!("carrier '{carrier}' recognized by inference"),
            });
            filter.carrier = Some(carrier);
        }
    }

    if filter.destination_city.is_none() {
        if let Some(city) = literal(&inferred.destination_city) {
            let known = vocab::city(&city);
            let name = known.map_or(city, |(name, _)| name.to_string());
            trace.push(RuleFired {
                rule: Rule::Geography,
                detail: format!("city '{name}' recognized by inference"),
            });
            if let (None, Some((_, state))) = (filter.destination_state, known) {
                trace.push(RuleFired {
                    rule: Rule::Geography,
                    detail: format!("state {state} inferred from city '{name}'"),
                });
                filter.destination_state = Some(state);
            }
            filter.destination_city = Some(name);
        }
    }

    (filter.enforce_invariants(), trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedLlm;
    use chrono::NaiveDate;
    use nt_core::{LogisticsStatus, StateCode};

    fn reference() -> DateContext {
        DateContext::for_date(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())
    }

    #[tokio::test]
    async fn test_rule_candidate_is_valid_json() {
        let source = RuleCandidateSource::new();
        let candidate = source
            .produce(&NormalizedQuery::new("Notas em trânsito"), &reference())
            .await
            .unwrap();

        let filter = FilterSchema.validate(&candidate.raw).unwrap();
        assert_eq!(filter.logistics_status, Some(LogisticsStatus::InTransit));
        assert!(candidate
            .trace
            .iter()
            .any(|step| step.rule == Rule::LogisticsStatus));
    }

    #[tokio::test]
    async fn test_llm_candidate_uses_parser_prompt() {
        let llm = Arc::new(ScriptedLlm::new([Ok(
            "Passo 1: nada\nJSON FINAL: {\"NF\": 1}".to_string()
        )]));
        let source = LlmCandidateSource::new(llm.clone());

        let candidate = source
            .produce(&NormalizedQuery::new("Nota fiscal 1"), &reference())
            .await
            .unwrap();

        assert!(candidate.raw.ends_with("{\"NF\": 1}"));
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("hoje = 2025-10-20"));
        assert!(prompt.ends_with("Texto: Nota fiscal 1\nResposta:"));
    }

    #[tokio::test]
    async fn test_llm_failure_is_extraction_failure() {
        let llm = Arc::new(ScriptedLlm::new([Err("timeout".to_string())]));
        let source = LlmCandidateSource::new(llm);

        let err = source
            .produce(&NormalizedQuery::new("Notas de hoje"), &reference())
            .await
            .unwrap_err();
        assert!(matches!(err, NtError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_hybrid_takes_literal_entities_only() {
        // The model invents a status and a client that is not in the text
        let llm = Arc::new(ScriptedLlm::new([Ok(r#"JSON FINAL: {
            "SituacaoNF": "RETIDA",
            "Cliente": "Globex",
            "CidadeDestino": "salvador"
        }"#
        .to_string())]));
        let hybrid = HybridExtractor::new(llm);

        let query = NormalizedQuery::new("Notas fiscais em trânsito com destino salvador");
        let candidate = hybrid.produce(&query, &reference()).await.unwrap();
        let filter = FilterSchema.validate(&candidate.raw).unwrap();

        assert_eq!(filter.logistics_status, Some(LogisticsStatus::InTransit));
        assert_eq!(filter.client, None);
        assert_eq!(filter.destination_city.as_deref(), Some("Salvador"));
        assert_eq!(filter.destination_state, Some(StateCode::BA));
        assert!(!candidate.repaired);
    }

    #[tokio::test]
    async fn test_hybrid_repairs_model_output_once() {
        let llm = Arc::new(ScriptedLlm::new([
            Ok("JSON FINAL: {\"Transportadora\": 7}".to_string()),
            Ok("{\"Transportadora\": \"Rapidão Cometa\"}".to_string()),
        ]));
        let hybrid = HybridExtractor::new(llm);

        let query = NormalizedQuery::new("Notas entregues pela Rapidão Cometa");
        let candidate = hybrid.produce(&query, &reference()).await.unwrap();
        let filter = FilterSchema.validate(&candidate.raw).unwrap();

        assert!(candidate.repaired);
        assert_eq!(filter.carrier.as_deref(), Some("Rapidão Cometa"));
    }

    #[test]
    fn test_merge_keeps_invoice_exclusive() {
        let decision = Decision {
            filter: FilterObject::for_invoice(54321),
            trace: Vec::new(),
        };
        let inferred = FilterObject {
            client: Some("ACME".to_string()),
            ..Default::default()
        };
        let (filter, _) = merge(decision, &inferred, &NormalizedQuery::new("Nota fiscal 54321 ACME"));
        assert_eq!(filter, FilterObject::for_invoice(54321));
    }
}
