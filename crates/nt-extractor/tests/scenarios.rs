//! End-to-end behaviour of normalization plus the decision procedure at a
//! pinned reference date (Monday 2025-10-20).

use chrono::NaiveDate;
use nt_core::{
    DateContext, DateEventType, FilterObject, LogisticsStatus, PerformanceStatus, SortColumn,
    SortDirection, StateCode,
};
use nt_extractor::{concepts_of, Concept, RuleEngine, RuleNormalizer};

fn reference() -> DateContext {
    DateContext::for_date(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())
}

fn date(s: &str) -> Option<NaiveDate> {
    Some(s.parse().unwrap())
}

fn parse(raw: &str) -> FilterObject {
    let normalized = RuleNormalizer::shared().normalize(raw);
    RuleEngine::new().decide(&normalized, &reference()).filter
}

#[test]
fn transit_sorted_by_value() {
    assert_eq!(
        concepts_of("notas rodando ordenadas pelo mais caro"),
        [
            Concept::Logistics(LogisticsStatus::InTransit),
            Concept::SortColumn(SortColumn::InvoiceValue),
            Concept::SortDirection(SortDirection::Desc),
        ]
        .into_iter()
        .collect()
    );
    assert_eq!(
        parse("notas rodando ordenadas pelo mais caro"),
        FilterObject {
            logistics_status: Some(LogisticsStatus::InTransit),
            sort_column: Some(SortColumn::InvoiceValue),
            sort_direction: Some(SortDirection::Desc),
            ..Default::default()
        }
    );
}

#[test]
fn delivered_yesterday_is_a_date_event() {
    assert_eq!(
        parse("notas entregues ontem"),
        FilterObject {
            date_from: date("2025-10-19"),
            date_to: date("2025-10-19"),
            date_event: Some(DateEventType::Delivered),
            ..Default::default()
        }
    );
}

#[test]
fn status_of_delivery_is_vague() {
    assert!(parse("qual o status da entrega?").is_empty());
}

#[test]
fn invoice_number_stands_alone() {
    assert_eq!(parse("nf 54321"), FilterObject::for_invoice(54321));
    assert_eq!(
        parse("nf 54321 em trânsito para sp"),
        FilterObject::for_invoice(54321)
    );
}

#[test]
fn due_tomorrow_is_performance() {
    assert_eq!(
        parse("notas previstas para amanhã"),
        FilterObject {
            performance_status: Some(PerformanceStatus::NextDay),
            ..Default::default()
        }
    );
}

#[test]
fn this_week_alone() {
    assert_eq!(
        parse("notas desta semana"),
        FilterObject {
            date_from: date("2025-10-20"),
            date_to: date("2025-10-26"),
            ..Default::default()
        }
    );
}

#[test]
fn abbreviated_query() {
    assert_eq!(
        parse("nf do cli acme transp veloz com atraso"),
        FilterObject {
            client: Some("acme".to_string()),
            carrier: Some("veloz".to_string()),
            performance_status: Some(PerformanceStatus::Late),
            ..Default::default()
        }
    );
}

#[test]
fn written_off_last_week() {
    assert_eq!(
        parse("o que foi baixado na ult sem"),
        FilterObject {
            date_from: date("2025-10-13"),
            date_to: date("2025-10-19"),
            date_event: Some(DateEventType::WrittenOff),
            ..Default::default()
        }
    );
}

#[test]
fn forecast_range_in_month() {
    assert_eq!(
        parse("notas previstas entre 1 e 15 de setembro"),
        FilterObject {
            date_from: date("2025-09-01"),
            date_to: date("2025-09-15"),
            date_event: Some(DateEventType::Forecast),
            ..Default::default()
        }
    );
}

#[test]
fn city_implies_state() {
    assert_eq!(
        parse("entregas para a cidade de Manaus emitidas neste mês"),
        FilterObject {
            date_from: date("2025-10-01"),
            date_to: date("2025-10-31"),
            date_event: Some(DateEventType::Issued),
            destination_city: Some("Manaus".to_string()),
            destination_state: Some(StateCode::AM),
            ..Default::default()
        }
    );
}

#[test]
fn transit_and_late_keeps_performance() {
    let filter = parse("notas em trânsito e atrasadas");
    assert_eq!(filter.performance_status, Some(PerformanceStatus::Late));
    assert_eq!(filter.logistics_status, None);
}

#[test]
fn held_for_state_abbreviation() {
    assert_eq!(
        parse("nfs bloqueadas em mg"),
        FilterObject {
            logistics_status: Some(LogisticsStatus::Held),
            destination_state: Some(StateCode::MG),
            ..Default::default()
        }
    );
}

#[test]
fn colloquial_delivered_and_future() {
    let delivered = FilterObject {
        logistics_status: Some(LogisticsStatus::Delivered),
        ..Default::default()
    };
    assert_eq!(parse("notas que já chegaram"), delivered);
    assert_eq!(parse("notas concluídas"), delivered);
    assert_eq!(parse("entregas finalizadas"), delivered);
    assert_eq!(
        parse("notas futuras"),
        FilterObject {
            performance_status: Some(PerformanceStatus::Future),
            ..Default::default()
        }
    );
}

#[test]
fn client_name_may_start_with_a_connective() {
    assert_eq!(
        parse("notas do cliente Para Todos"),
        FilterObject {
            client: Some("Para Todos".to_string()),
            ..Default::default()
        }
    );
}

#[test]
fn long_invoice_number() {
    assert_eq!(
        parse("nf 99999999999999"),
        FilterObject::for_invoice(99_999_999_999_999)
    );
}
