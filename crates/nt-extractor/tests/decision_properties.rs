//! Property-based tests for normalization and the decision procedure

use chrono::NaiveDate;
use nt_core::{
    DateContext, DateEventType, FilterObject, LogisticsStatus, PerformanceStatus, SortColumn,
    SortDirection,
};
use nt_extractor::{concepts_of_tags, RuleEngine, RuleNormalizer, RuleTagger, TokenTagger};
use proptest::prelude::*;

const FRAGMENTS: &[&str] = &[
    "notas",
    "nf",
    "nfs",
    "do cli",
    "acme",
    "transp",
    "veloz",
    "rodando",
    "em trânsito",
    "retidas",
    "bloqueadas",
    "status entregue",
    "entregues",
    "emitidas",
    "baixadas",
    "agendadas",
    "hoje",
    "ontem",
    "hj",
    "desta semana",
    "na ult sem",
    "neste semestre",
    "com atraso",
    "previstas para amanhã",
    "em data futura",
    "para sp",
    "em mg",
    "para a cidade de Manaus",
    "ordenadas pelo mais caro",
    "ordenadas pelo menor valor",
    "ordenadas por data de emissão",
    "operação OutBound-SPO",
    "entre 01/09/2025 e 15/09/2025",
    "nota fiscal 54321",
    "e",
    "que",
    "?",
];

fn query_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FRAGMENTS), 1..8)
        .prop_map(|fragments| fragments.join(" "))
}

fn day_strategy() -> impl Strategy<Value = DateContext> {
    (0u64..3650).prop_map(|offset| {
        let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        DateContext::for_date(base + chrono::Days::new(offset))
    })
}

fn filter_strategy() -> impl Strategy<Value = FilterObject> {
    (
        prop::option::of(1u64..1_000_000),
        prop::option::of(prop::sample::select(DateEventType::ALL)),
        prop::option::of(prop::sample::select(LogisticsStatus::ALL)),
        prop::option::of(prop::sample::select(PerformanceStatus::ALL)),
        prop::option::of(prop::sample::select(SortColumn::ALL)),
        prop::option::of(prop::sample::select(SortDirection::ALL)),
        prop::option::of((0i64..400, 0i64..400)),
        prop::option::of("[A-Z][a-z]{2,8}"),
    )
        .prop_map(
            |(invoice, event, logistics, performance, column, direction, range, client)| {
                let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
                let (date_from, date_to) = match range {
                    Some((a, b)) => (
                        Some(base + chrono::Duration::days(a)),
                        Some(base + chrono::Duration::days(b)),
                    ),
                    None => (None, None),
                };
                FilterObject {
                    invoice_number: invoice,
                    date_from,
                    date_to,
                    date_event: event,
                    client,
                    logistics_status: logistics,
                    performance_status: performance,
                    sort_column: column,
                    sort_direction: direction,
                    ..Default::default()
                }
            },
        )
}

/// Property: normalizing twice changes nothing
#[test]
fn prop_normalizer_is_idempotent() {
    proptest!(|(raw in query_strategy())| {
        let normalizer = RuleNormalizer::shared();
        let once = normalizer.normalize(&raw);
        let twice = normalizer.normalize(once.as_str());
        prop_assert_eq!(once, twice, "raw query: {}", raw);
    });
}

/// Property: every decision satisfies the structural invariants
#[test]
fn prop_decisions_hold_invariants() {
    proptest!(|(raw in query_strategy(), ctx in day_strategy())| {
        let normalized = RuleNormalizer::shared().normalize(&raw);
        let decision = RuleEngine::new().decide(&normalized, &ctx);
        prop_assert_eq!(
            decision.filter.check_invariants(),
            Ok(()),
            "query: {}",
            normalized
        );
    });
}

/// Property: the same query and day always yield the same filter
#[test]
fn prop_decision_is_deterministic() {
    proptest!(|(raw in query_strategy(), ctx in day_strategy())| {
        let normalized = RuleNormalizer::shared().normalize(&raw);
        let engine = RuleEngine::new();
        prop_assert_eq!(
            engine.decide(&normalized, &ctx),
            engine.decide(&normalized, &ctx)
        );
    });
}

/// Property: an invoice number clears every other field
#[test]
fn prop_invoice_is_exclusive() {
    proptest!(|(raw in query_strategy(), number in 1u64..100_000_000)| {
        let query = format!("{raw} nota fiscal {number}");
        let normalized = RuleNormalizer::shared().normalize(&query);
        let filter = RuleEngine::new().decide(&normalized, &DateContext::now()).filter;
        prop_assert_eq!(filter.populated_fields(), 1);
        prop_assert!(filter.invoice_number.is_some());
    });
}

/// Property: enforcing invariants on any filter yields a valid filter and
/// is a no-op on valid ones
#[test]
fn prop_enforce_invariants() {
    proptest!(|(filter in filter_strategy())| {
        let enforced = filter.clone().enforce_invariants();
        prop_assert_eq!(enforced.check_invariants(), Ok(()));
        prop_assert_eq!(enforced.clone().enforce_invariants(), enforced.clone());
        if filter.check_invariants().is_ok() {
            prop_assert_eq!(enforced, filter);
        }
    });
}

/// Colloquial and canonical wording carry the same concepts
#[test]
fn normalization_preserves_tagged_concepts() {
    let tagger = RuleTagger::shared();
    let normalizer = RuleNormalizer::shared();

    for raw in [
        "notas rodando ordenadas pelo mais caro",
        "quais notas foram entregues hoje?",
        "nf 54321",
        "notas com status entregue",
        "notas previstas para amanhã",
        "notas em data futura",
        "notas futuras",
        "notas que já chegaram",
        "entregas finalizadas em sp",
        "notas concluídas",
        "entregas previstas para daqui a dois dias",
        "notas paradas na fiscalização",
        "notas bloqueadas em sp",
        "notas para a cidade de Manaus",
        "notas atrasadas para o cliente 'BEXX'",
        "analise de performance entregue",
    ] {
        let normalized = normalizer.normalize(raw);
        assert_eq!(
            concepts_of_tags(&tagger.tag(raw)),
            concepts_of_tags(&tagger.tag(normalized.as_str())),
            "{raw} -> {normalized}"
        );
    }
}
