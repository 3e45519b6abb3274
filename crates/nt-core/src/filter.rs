//! Filter object and the closed vocabularies its fields draw from
//!
//! The serialized form uses the column names of the tracking query
//! procedure (`NF`, `DE`, `ATE`, ...). Every key is always present; absent
//! fields serialize as `null`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A value outside a closed vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {vocabulary}")]
pub struct UnknownValue {
    pub vocabulary: &'static str,
    pub value: String,
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant, )+
        }

        impl $name {
            /// Every member of the vocabulary
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical wire value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(UnknownValue {
                        vocabulary: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

vocabulary! {
    /// Business event tied to a date (`TipoData`)
    DateEventType {
        Scheduled => "1",
        Delivered => "2",
        Issued => "3",
        Forecast => "4",
        ActualForecast => "5",
        WrittenOff => "6",
    }
}

impl DateEventType {
    /// Business term for the event
    pub fn label(&self) -> &'static str {
        match self {
            Self::Scheduled => "agenda",
            Self::Delivered => "entregue",
            Self::Issued => "emitido",
            Self::Forecast => "previsto",
            Self::ActualForecast => "previsão real",
            Self::WrittenOff => "baixada",
        }
    }
}

vocabulary! {
    /// Current physical state of the shipment (`SituacaoNF`)
    LogisticsStatus {
        Delivered => "ENTREGUE",
        Held => "RETIDA",
        InTransit => "TRÂNSITO",
    }
}

vocabulary! {
    /// Standing relative to the delivery deadline (`StatusAnaliseData`)
    PerformanceStatus {
        Late => "ATRASO",
        NextDay => "DIA SEGUINTE",
        SameDay => "DO DIA",
        Delivered => "ENTREGUE",
        Future => "FUTURO",
        InTwoDays => "PREVISTO PARA 2 DIAS",
    }
}

vocabulary! {
    /// Transport purpose code (`Operacao`)
    OperationCode {
        InboundIpo => "InBound-IPO",
        InboundMao => "InBound-MAO",
        InboundUdi => "InBound-UDI",
        OutboundBar => "OutBound-BAR",
        OutboundBarRawMaterial => "OutBound-BAR-MAT.PRIMA",
        OutboundIpo => "OutBound-IPO",
        OutboundMao => "OutBound-MAO",
        OutboundRio => "OutBound-RIO",
        OutboundSpo => "OutBound-SPO",
        OutboundUdi => "OutBound-UDI",
    }
}

vocabulary! {
    /// Brazilian federative unit (`UFDestino`)
    #[allow(clippy::upper_case_acronyms)]
    StateCode {
        AC => "AC", AL => "AL", AM => "AM", AP => "AP", BA => "BA", CE => "CE",
        DF => "DF", ES => "ES", GO => "GO", MA => "MA", MG => "MG", MS => "MS",
        MT => "MT", PA => "PA", PB => "PB", PE => "PE", PI => "PI", PR => "PR",
        RJ => "RJ", RN => "RN", RO => "RO", RR => "RR", RS => "RS", SC => "SC",
        SE => "SE", SP => "SP", TO => "TO",
    }
}

impl StateCode {
    /// Full state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::AC => "Acre",
            Self::AL => "Alagoas",
            Self::AM => "Amazonas",
            Self::AP => "Amapá",
            Self::BA => "Bahia",
            Self::CE => "Ceará",
            Self::DF => "Distrito Federal",
            Self::ES => "Espírito Santo",
            Self::GO => "Goiás",
            Self::MA => "Maranhão",
            Self::MG => "Minas Gerais",
            Self::MS => "Mato Grosso do Sul",
            Self::MT => "Mato Grosso",
            Self::PA => "Pará",
            Self::PB => "Paraíba",
            Self::PE => "Pernambuco",
            Self::PI => "Piauí",
            Self::PR => "Paraná",
            Self::RJ => "Rio de Janeiro",
            Self::RN => "Rio Grande do Norte",
            Self::RO => "Rondônia",
            Self::RR => "Roraima",
            Self::RS => "Rio Grande do Sul",
            Self::SC => "Santa Catarina",
            Self::SE => "Sergipe",
            Self::SP => "São Paulo",
            Self::TO => "Tocantins",
        }
    }
}

vocabulary! {
    /// Columns the result set can be ordered by
    SortColumn {
        DeliveryDate => "data_entrega",
        InvoiceValue => "valor_nf",
        EmissionDate => "data_emissao",
    }
}

vocabulary! {
    SortDirection {
        Asc => "ASC",
        Desc => "DESC",
    }
}

// ============================================================================
// Filter Object
// ============================================================================

/// Structured filter consumed by the tracking query engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilterObject {
    /// Invoice number
    #[serde(rename = "NF")]
    pub invoice_number: Option<u64>,

    /// Start of the date range
    #[serde(rename = "DE")]
    #[schema(value_type = Option<String>, example = "2025-10-19")]
    pub date_from: Option<NaiveDate>,

    /// End of the date range
    #[serde(rename = "ATE")]
    #[schema(value_type = Option<String>, example = "2025-10-19")]
    pub date_to: Option<NaiveDate>,

    /// Event the date range applies to
    #[serde(rename = "TipoData")]
    pub date_event: Option<DateEventType>,

    #[serde(rename = "Cliente")]
    pub client: Option<String>,

    #[serde(rename = "Transportadora")]
    pub carrier: Option<String>,

    #[serde(rename = "UFDestino")]
    pub destination_state: Option<StateCode>,

    #[serde(rename = "CidadeDestino")]
    pub destination_city: Option<String>,

    #[serde(rename = "Operacao")]
    pub operation: Option<OperationCode>,

    #[serde(rename = "SituacaoNF")]
    pub logistics_status: Option<LogisticsStatus>,

    #[serde(rename = "StatusAnaliseData")]
    pub performance_status: Option<PerformanceStatus>,

    /// First 8 digits of the carrier CNPJ
    #[serde(rename = "CNPJRaizTransp")]
    pub carrier_cnpj_root: Option<String>,

    #[serde(rename = "SortColumn")]
    pub sort_column: Option<SortColumn>,

    #[serde(rename = "SortDirection")]
    pub sort_direction: Option<SortDirection>,
}

impl FilterObject {
    /// Wire names of every field, in serialization order
    pub const FIELD_NAMES: [&'static str; 14] = [
        "NF",
        "DE",
        "ATE",
        "TipoData",
        "Cliente",
        "Transportadora",
        "UFDestino",
        "CidadeDestino",
        "Operacao",
        "SituacaoNF",
        "StatusAnaliseData",
        "CNPJRaizTransp",
        "SortColumn",
        "SortDirection",
    ];

    /// Filter for a single invoice; every other field absent
    pub fn for_invoice(number: u64) -> Self {
        Self {
            invoice_number: Some(number),
            ..Default::default()
        }
    }

    /// True when every field is absent
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Number of populated fields
    pub fn populated_fields(&self) -> usize {
        self.field_values().iter().filter(|(_, v)| v.is_some()).count()
    }

    /// Field values rendered as their wire strings, keyed by wire name
    pub fn field_values(&self) -> [(&'static str, Option<String>); 14] {
        [
            ("NF", self.invoice_number.map(|n| n.to_string())),
            ("DE", self.date_from.map(|d| d.to_string())),
            ("ATE", self.date_to.map(|d| d.to_string())),
            ("TipoData", self.date_event.map(|e| e.to_string())),
            ("Cliente", self.client.clone()),
            ("Transportadora", self.carrier.clone()),
            ("UFDestino", self.destination_state.map(|s| s.to_string())),
            ("CidadeDestino", self.destination_city.clone()),
            ("Operacao", self.operation.map(|o| o.to_string())),
            ("SituacaoNF", self.logistics_status.map(|s| s.to_string())),
            (
                "StatusAnaliseData",
                self.performance_status.map(|s| s.to_string()),
            ),
            ("CNPJRaizTransp", self.carrier_cnpj_root.clone()),
            ("SortColumn", self.sort_column.map(|c| c.to_string())),
            ("SortDirection", self.sort_direction.map(|d| d.to_string())),
        ]
    }

    /// Every structural invariant the object breaks
    pub fn invariant_violations(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        if self.invoice_number.is_some() && self.populated_fields() > 1 {
            violations.push(InvariantViolation::InvoiceNotExclusive);
        }
        if self.performance_status.is_some() && self.logistics_status.is_some() {
            violations.push(InvariantViolation::PerformanceWithLogistics);
        }
        if self.sort_column.is_some() != self.sort_direction.is_some() {
            violations.push(InvariantViolation::PartialSort);
        }
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) if from > to => {
                violations.push(InvariantViolation::InvertedDateRange { from, to })
            }
            (Some(_), None) | (None, Some(_)) => {
                violations.push(InvariantViolation::PartialDateRange)
            }
            _ => {}
        }

        violations
    }

    /// First invariant violation, if any
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.invariant_violations().into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    /// Null out whatever combination the invariants forbid.
    ///
    /// Invoice number wins over everything, performance status wins over
    /// logistics status, an incomplete sort or date range is dropped and a
    /// reversed range is reordered.
    pub fn enforce_invariants(mut self) -> Self {
        if let Some(number) = self.invoice_number {
            return Self::for_invoice(number);
        }
        if self.performance_status.is_some() {
            self.logistics_status = None;
        }
        if self.sort_column.is_none() || self.sort_direction.is_none() {
            self.sort_column = None;
            self.sort_direction = None;
        }
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) if from > to => {
                self.date_from = Some(to);
                self.date_to = Some(from);
            }
            (Some(_), None) | (None, Some(_)) => {
                self.date_from = None;
                self.date_to = None;
            }
            _ => {}
        }
        self
    }
}

/// A broken structural invariant of [`FilterObject`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("NF is set together with other fields")]
    InvoiceNotExclusive,

    #[error("StatusAnaliseData and SituacaoNF are both set")]
    PerformanceWithLogistics,

    #[error("SortColumn and SortDirection must be set together")]
    PartialSort,

    #[error("DE and ATE must be set together")]
    PartialDateRange,

    #[error("DE ({from}) is after ATE ({to})")]
    InvertedDateRange { from: NaiveDate, to: NaiveDate },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_serializes_every_key() {
        let json = serde_json::to_value(FilterObject::default()).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), FilterObject::FIELD_NAMES.len());
        for name in FilterObject::FIELD_NAMES {
            assert!(object[name].is_null(), "{name} should be null");
        }
    }

    #[test]
    fn test_wire_values() {
        let filter = FilterObject {
            date_from: Some(date("2025-10-19")),
            date_to: Some(date("2025-10-19")),
            date_event: Some(DateEventType::Delivered),
            logistics_status: Some(LogisticsStatus::InTransit),
            sort_column: Some(SortColumn::InvoiceValue),
            sort_direction: Some(SortDirection::Desc),
            ..Default::default()
        };
        let json = serde_json::to_value(&filter).unwrap();

        assert_eq!(json["DE"], "2025-10-19");
        assert_eq!(json["TipoData"], "2");
        assert_eq!(json["SituacaoNF"], "TRÂNSITO");
        assert_eq!(json["SortColumn"], "valor_nf");
        assert_eq!(json["SortDirection"], "DESC");
    }

    #[test]
    fn test_vocabulary_parse_is_exact() {
        assert_eq!(
            "DIA SEGUINTE".parse::<PerformanceStatus>().unwrap(),
            PerformanceStatus::NextDay
        );
        assert_eq!(
            "OutBound-BAR-MAT.PRIMA".parse::<OperationCode>().unwrap(),
            OperationCode::OutboundBarRawMaterial
        );
        assert!("TRANSITO".parse::<LogisticsStatus>().is_err());
        assert!("atrasado".parse::<PerformanceStatus>().is_err());
        assert!("sp".parse::<StateCode>().is_err());
        assert_eq!(StateCode::ALL.len(), 27);
    }

    #[test]
    fn test_empty_filter() {
        assert!(FilterObject::default().is_empty());
        assert!(!FilterObject::for_invoice(1).is_empty());
    }

    #[test]
    fn test_invariant_violations() {
        let filter = FilterObject {
            invoice_number: Some(54321),
            client: Some("ACME".to_string()),
            performance_status: Some(PerformanceStatus::Late),
            logistics_status: Some(LogisticsStatus::Held),
            sort_column: Some(SortColumn::EmissionDate),
            date_from: Some(date("2025-10-20")),
            ..Default::default()
        };

        let violations = filter.invariant_violations();
        assert!(violations.contains(&InvariantViolation::InvoiceNotExclusive));
        assert!(violations.contains(&InvariantViolation::PerformanceWithLogistics));
        assert!(violations.contains(&InvariantViolation::PartialSort));
        assert!(violations.contains(&InvariantViolation::PartialDateRange));
    }

    #[test]
    fn test_enforce_invariants() {
        let filter = FilterObject {
            performance_status: Some(PerformanceStatus::Late),
            logistics_status: Some(LogisticsStatus::InTransit),
            sort_column: Some(SortColumn::InvoiceValue),
            date_from: Some(date("2025-10-26")),
            date_to: Some(date("2025-10-20")),
            ..Default::default()
        }
        .enforce_invariants();

        assert_eq!(filter.logistics_status, None);
        assert_eq!(filter.sort_column, None);
        assert_eq!(filter.date_from, Some(date("2025-10-20")));
        assert_eq!(filter.date_to, Some(date("2025-10-26")));
        assert!(filter.check_invariants().is_ok());

        let single = FilterObject {
            invoice_number: Some(7),
            carrier: Some("Veloz".to_string()),
            ..Default::default()
        }
        .enforce_invariants();
        assert_eq!(single, FilterObject::for_invoice(7));
    }
}
