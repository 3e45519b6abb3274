//! Concept oracle
//!
//! Reduces a query to the set of filter concepts it mentions, independent
//! of wording. Two phrasings of the same request yield the same set, which
//! is how a rewrite is checked for added or dropped concepts.

use std::collections::BTreeSet;

use serde::Serialize;

use nt_core::{
    DateEventType, LogisticsStatus, OperationCode, PerformanceStatus, SortColumn, SortDirection,
    StateCode,
};

use crate::temporal::TimeExpr;
use crate::{vocab, RuleNormalizer, RuleTagger, Tag, TagKind, TokenTagger};

/// A filter concept mentioned by a query
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "concept", content = "value", rename_all = "snake_case")]
pub enum Concept {
    Invoice(u64),
    CarrierCnpj(String),
    Time(TimeExpr),
    Event(DateEventType),
    /// Bare "entregue", event or state depending on context
    Delivered,
    Logistics(LogisticsStatus),
    Performance(PerformanceStatus),
    State(StateCode),
    /// Folded city name
    City(String),
    Operation(OperationCode),
    /// Folded client name
    Client(String),
    /// Folded carrier name
    Carrier(String),
    SortColumn(SortColumn),
    SortDirection(SortDirection),
}

impl Concept {
    fn from_tag(tag: &Tag) -> Vec<Concept> {
        match &tag.kind {
            TagKind::InvoiceNumber(number) => vec![Self::Invoice(*number)],
            TagKind::CnpjRoot(root) => vec![Self::CarrierCnpj(root.clone())],
            TagKind::Time(expr) => vec![Self::Time(*expr)],
            TagKind::Event(event) => vec![Self::Event(*event)],
            TagKind::Delivered => vec![Self::Delivered],
            TagKind::Logistics(status) => vec![Self::Logistics(*status)],
            TagKind::Performance(status) => vec![Self::Performance(*status)],
            TagKind::State(state) => vec![Self::State(*state)],
            TagKind::City { name, .. } => vec![Self::City(vocab::fold(name))],
            TagKind::Operation(code) => vec![Self::Operation(*code)],
            TagKind::Client(name) => vec![Self::Client(vocab::fold(name))],
            TagKind::Carrier(name) => vec![Self::Carrier(vocab::fold(name))],
            TagKind::Sort { column, direction } => column
                .map(Self::SortColumn)
                .into_iter()
                .chain(direction.map(Self::SortDirection))
                .collect(),
        }
    }
}

/// Concepts of already tagged text
pub fn concepts_of_tags(tags: &[Tag]) -> BTreeSet<Concept> {
    tags.iter().flat_map(Concept::from_tag).collect()
}

/// Concepts a query mentions, after rule normalization
pub fn concepts_of(text: &str) -> BTreeSet<Concept> {
    let normalized = RuleNormalizer::shared().normalize(text);
    concepts_of_tags(&RuleTagger::shared().tag(normalized.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_share_concepts() {
        let colloquial = concepts_of("notas rodando ordenadas pelo mais caro");
        let canonical = concepts_of("Me mostre as notas fiscais em trânsito ordenadas pelo maior valor");

        assert_eq!(colloquial, canonical);
        assert_eq!(
            colloquial,
            BTreeSet::from([
                Concept::Logistics(LogisticsStatus::InTransit),
                Concept::SortColumn(SortColumn::InvoiceValue),
                Concept::SortDirection(SortDirection::Desc),
            ])
        );
    }

    #[test]
    fn test_added_concept_is_visible() {
        let raw = concepts_of("quais notas foram entregues hoje?");
        let rewritten = concepts_of("Quais notas foram emitidas e entregues hoje?");
        assert_ne!(raw, rewritten);
        assert!(rewritten.contains(&Concept::Event(DateEventType::Issued)));
    }

    #[test]
    fn test_names_fold() {
        assert_eq!(
            concepts_of("notas do cliente ACME"),
            concepts_of("notas do cli acme")
        );
    }

    #[test]
    fn test_vague_query_has_no_concepts() {
        assert!(concepts_of("qual o status da entrega?").is_empty());
    }
}
