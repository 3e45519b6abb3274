//! Reference scenarios through the whole deterministic pipeline, pinned to
//! Monday 2025-10-20.

use chrono::NaiveDate;
use nt_core::{
    DateContext, DateEventType, FilterObject, LogisticsStatus, NtError, PerformanceStatus,
    SortColumn, SortDirection,
};
use nt_pipeline::FilterPipeline;

fn reference() -> DateContext {
    DateContext::for_date(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())
}

fn date(s: &str) -> Option<NaiveDate> {
    Some(s.parse().unwrap())
}

async fn parse(query: &str) -> nt_core::Result<FilterObject> {
    FilterPipeline::rules().parse_at(query, reference()).await
}

#[tokio::test]
async fn transit_sorted_by_most_expensive() {
    assert_eq!(
        parse("notas rodando ordenadas pelo mais caro").await.unwrap(),
        FilterObject {
            logistics_status: Some(LogisticsStatus::InTransit),
            sort_column: Some(SortColumn::InvoiceValue),
            sort_direction: Some(SortDirection::Desc),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn delivered_yesterday() {
    assert_eq!(
        parse("notas entregues ontem").await.unwrap(),
        FilterObject {
            date_from: date("2025-10-19"),
            date_to: date("2025-10-19"),
            date_event: Some(DateEventType::Delivered),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn status_of_delivery_is_rejected_as_vague() {
    assert!(matches!(
        parse("qual o status da entrega?").await,
        Err(NtError::VagueQuery)
    ));
}

#[tokio::test]
async fn invoice_number_only() {
    assert_eq!(
        parse("nf 54321").await.unwrap(),
        FilterObject::for_invoice(54321)
    );
}

#[tokio::test]
async fn due_tomorrow() {
    assert_eq!(
        parse("notas previstas para amanhã").await.unwrap(),
        FilterObject {
            performance_status: Some(PerformanceStatus::NextDay),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn this_week() {
    assert_eq!(
        parse("notas desta semana").await.unwrap(),
        FilterObject {
            date_from: date("2025-10-20"),
            date_to: date("2025-10-26"),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn serialized_filter_lists_every_key() {
    let filter = parse("nf 54321").await.unwrap();
    let json = serde_json::to_value(&filter).unwrap();
    let object = json.as_object().unwrap();

    assert_eq!(object.len(), FilterObject::FIELD_NAMES.len());
    assert_eq!(object["NF"], 54321);
    assert!(object["DE"].is_null());
    assert!(object["SortDirection"].is_null());
}

#[tokio::test]
async fn client_name_starting_with_para() {
    assert_eq!(
        parse("notas do cliente Para Todos").await.unwrap(),
        FilterObject {
            client: Some("Para Todos".to_string()),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn fourteen_digit_invoice_number() {
    assert_eq!(
        parse("nf 99999999999999").await.unwrap(),
        FilterObject::for_invoice(99_999_999_999_999)
    );
}
