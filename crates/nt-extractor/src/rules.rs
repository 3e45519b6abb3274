//! The ordered disambiguation procedure
//!
//! Rules run in a fixed order over the tagged query and the first match
//! wins per concept:
//!
//! 1. explicit time range sets `DE`/`ATE`
//! 2. a date event co-occurring with that time sets `TipoData` with it
//! 3. performance status, suppressing an event whose time it owns
//! 4. logistics status, unless performance status is set
//! 5. a bare "entregue" not paired with a time is a logistics state
//! 6. a known city implies its state
//! 7. an invoice number clears every other field
//! 8. sort column and direction are taken together or not at all
//! 9. anything not evidenced stays absent

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use nt_core::{DateContext, DateEventType, FilterObject, LogisticsStatus, NormalizedQuery};

use crate::temporal::TimeExpr;
use crate::vocab::ANCHOR_FILLERS;
use crate::{RuleTagger, Tag, TagKind, TokenTagger};

/// A step of the procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    ExplicitTime,
    EventTimePairing,
    PerformanceStatus,
    LogisticsStatus,
    AmbiguousDelivered,
    LiteralEntity,
    Geography,
    SingleInvoice,
    Sort,
    VaguenessDefault,
}

impl Rule {
    /// Position in the precedence table, if the step is one of the nine rules
    pub fn number(&self) -> Option<u8> {
        match self {
            Self::ExplicitTime => Some(1),
            Self::EventTimePairing => Some(2),
            Self::PerformanceStatus => Some(3),
            Self::LogisticsStatus => Some(4),
            Self::AmbiguousDelivered => Some(5),
            Self::Geography => Some(6),
            Self::SingleInvoice => Some(7),
            Self::Sort => Some(8),
            Self::VaguenessDefault => Some(9),
            Self::LiteralEntity => None,
        }
    }
}

/// One line of the decision trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFired {
    pub rule: Rule,
    pub detail: String,
}

/// Outcome of the procedure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub filter: FilterObject,
    pub trace: Vec<RuleFired>,
}

impl Decision {
    /// Whether `rule` contributed to the decision
    pub fn fired(&self, rule: Rule) -> bool {
        self.trace.iter().any(|step| step.rule == rule)
    }
}

/// Runs the procedure over tags from a [`TokenTagger`]
pub struct RuleEngine<'t> {
    tagger: &'t dyn TokenTagger,
}

impl RuleEngine<'static> {
    /// Engine over the shared rule tagger
    pub fn new() -> Self {
        Self {
            tagger: RuleTagger::shared(),
        }
    }
}

impl Default for RuleEngine<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'t> RuleEngine<'t> {
    pub fn with_tagger(tagger: &'t dyn TokenTagger) -> Self {
        Self { tagger }
    }

    /// Decide the filter for a normalized query
    pub fn decide(&self, query: &NormalizedQuery, ctx: &DateContext) -> Decision {
        let tags = self.tagger.tag(query.as_str());
        debug!(tags = tags.len(), "query tagged");
        decide_tags(query.as_str(), &tags, ctx)
    }
}

/// Decide the filter from already tagged text
pub fn decide_tags(text: &str, tags: &[Tag], ctx: &DateContext) -> Decision {
    let mut filter = FilterObject::default();
    let mut trace = Trace::default();

    // Rule 1: explicit time range
    let times: Vec<(&Tag, (NaiveDate, NaiveDate))> = tags
        .iter()
        .filter_map(|tag| match &tag.kind {
            TagKind::Time(expr) => {
                time_range(tag, expr, ctx, &mut trace).map(|range| (tag, range))
            }
            _ => None,
        })
        .collect();
    let primary_time = times.first().map(|(tag, _)| *tag);
    if let Some((tag, (from, to))) = times.first() {
        filter.date_from = Some(*from);
        filter.date_to = Some(*to);
        trace.push(Rule::ExplicitTime, format!("'{}' -> {from}..{to}", tag.text));
        for (extra, _) in times.iter().skip(1) {
            trace.push(
                Rule::ExplicitTime,
                format!("'{}' ignored, range already set", extra.text),
            );
        }
    }

    // Rule 2: event + time pairing
    let events: Vec<(&Tag, DateEventType)> = tags
        .iter()
        .filter_map(|tag| match tag.kind {
            TagKind::Event(event) => Some((tag, event)),
            TagKind::Delivered => Some((tag, DateEventType::Delivered)),
            _ => None,
        })
        .collect();
    let mut paired: Option<&Tag> = None;
    match primary_time {
        Some(time) => {
            if let Some((event_tag, event)) = events
                .iter()
                .min_by_key(|(event_tag, _)| (event_tag.gap(time), event_tag.start))
            {
                filter.date_event = Some(*event);
                paired = Some(*event_tag);
                trace.push(
                    Rule::EventTimePairing,
                    format!(
                        "'{}' + '{}' -> TipoData {}",
                        event_tag.text, time.text, event
                    ),
                );
            }
        }
        None => {
            for (event_tag, _) in events.iter().filter(|(t, _)| t.kind != TagKind::Delivered) {
                trace.push(
                    Rule::EventTimePairing,
                    format!("'{}' has no time expression, TipoData left absent", event_tag.text),
                );
            }
        }
    }

    // Rule 3: performance status
    if let Some((perf_tag, status)) = tags.iter().find_map(|tag| match tag.kind {
        TagKind::Performance(status) => Some((tag, status)),
        _ => None,
    }) {
        filter.performance_status = Some(status);
        trace.push(Rule::PerformanceStatus, format!("'{}' -> {status}", perf_tag.text));

        // A paired event is a second, explicit context; rule 2 keeps it
        if let Some(event_tag) = paired {
            trace.push(
                Rule::PerformanceStatus,
                format!("'{}' names a separate event context, TipoData kept", event_tag.text),
            );
        }
    }

    // Rule 4: logistics status
    let logistics = tags.iter().find_map(|tag| match tag.kind {
        TagKind::Logistics(status) => Some((tag, status)),
        _ => None,
    });

    // Rule 5: a bare "entregue" not used as an event is a logistics state
    let leftover_delivered = tags.iter().filter(|tag| {
        tag.kind == TagKind::Delivered && paired.map_or(true, |p| p.start != tag.start)
    });
    let mut delivered_state: Option<&Tag> = None;
    for tag in leftover_delivered {
        if let Some(time) = times.iter().find(|(time, _)| anchors(text, time, tag)) {
            trace.push(
                Rule::AmbiguousDelivered,
                format!(
                    "'{}' is anchored by '{}' but the range is taken, dropped",
                    tag.text, time.0.text
                ),
            );
        } else if delivered_state.is_none() {
            delivered_state = Some(tag);
        }
    }

    let state_candidate = logistics
        .map(|(tag, status)| (tag, status, Rule::LogisticsStatus))
        .or_else(|| {
            delivered_state
                .map(|tag| (tag, LogisticsStatus::Delivered, Rule::AmbiguousDelivered))
        });
    if let Some((tag, status, rule)) = state_candidate {
        if filter.performance_status.is_some() {
            trace.push(
                rule,
                format!("'{}' suppressed, performance status wins", tag.text),
            );
        } else {
            filter.logistics_status = Some(status);
            trace.push(rule, format!("'{}' -> SituacaoNF {status}", tag.text));
        }
    }

    // Literal entities
    for tag in tags {
        let slot = match &tag.kind {
            TagKind::Client(name) => Some(("Cliente", &mut filter.client, name.clone())),
            TagKind::Carrier(name) => {
                Some(("Transportadora", &mut filter.carrier, name.clone()))
            }
            TagKind::CnpjRoot(root) => Some((
                "CNPJRaizTransp",
                &mut filter.carrier_cnpj_root,
                root.clone(),
            )),
            _ => None,
        };
        if let Some((field, slot, value)) = slot {
            if slot.is_none() {
                trace.push(Rule::LiteralEntity, format!("{field} = {value}"));
                *slot = Some(value);
            }
        }
        if let TagKind::Operation(code) = tag.kind {
            if filter.operation.is_none() {
                filter.operation = Some(code);
                trace.push(Rule::LiteralEntity, format!("Operacao = {code}"));
            }
        }
    }

    // Rule 6: geography
    let explicit_state = tags.iter().find_map(|tag| match tag.kind {
        TagKind::State(state) => Some(state),
        _ => None,
    });
    if let Some(state) = explicit_state {
        filter.destination_state = Some(state);
        trace.push(Rule::Geography, format!("UFDestino = {state}"));
    }
    if let Some((name, city_state)) = tags.iter().find_map(|tag| match &tag.kind {
        TagKind::City { name, state } => Some((name.clone(), *state)),
        _ => None,
    }) {
        trace.push(Rule::Geography, format!("CidadeDestino = {name}"));
        filter.destination_city = Some(name.clone());
        match (explicit_state, city_state) {
            (None, Some(inferred)) => {
                filter.destination_state = Some(inferred);
                trace.push(Rule::Geography, format!("{name} implies UFDestino {inferred}"));
            }
            (Some(explicit), Some(inferred)) if explicit != inferred => {
                trace.push(
                    Rule::Geography,
                    format!("{name} is in {inferred}, explicit {explicit} kept"),
                );
            }
            _ => {}
        }
    }

    // Rule 7: single invoice
    if let Some(number) = tags.iter().find_map(|tag| match tag.kind {
        TagKind::InvoiceNumber(number) => Some(number),
        _ => None,
    }) {
        let cleared = filter.populated_fields();
        trace.push(
            Rule::SingleInvoice,
            format!("NF {number}, {cleared} other field(s) cleared"),
        );
        return Decision {
            filter: FilterObject::for_invoice(number),
            trace: trace.into_inner(),
        };
    }

    // Rule 8: sort
    if let Some((tag, column, direction)) = tags.iter().find_map(|tag| match tag.kind {
        TagKind::Sort { column, direction } => Some((tag, column, direction)),
        _ => None,
    }) {
        match (column, direction) {
            (Some(column), Some(direction)) => {
                filter.sort_column = Some(column);
                filter.sort_direction = Some(direction);
                trace.push(Rule::Sort, format!("'{}' -> {column} {direction}", tag.text));
            }
            _ => trace.push(
                Rule::Sort,
                format!("'{}' is incomplete, sort left absent", tag.text),
            ),
        }
    }

    // Rule 9: vagueness default
    if filter.is_empty() {
        trace.push(Rule::VaguenessDefault, "no field evidenced".to_string());
    }

    Decision {
        filter: filter.enforce_invariants(),
        trace: trace.into_inner(),
    }
}

fn time_range(
    tag: &Tag,
    expr: &TimeExpr,
    ctx: &DateContext,
    trace: &mut Trace,
) -> Option<(NaiveDate, NaiveDate)> {
    let range = expr.resolve(ctx);
    if range.is_none() {
        trace.push(
            Rule::ExplicitTime,
            format!("'{}' is not a calendar date, ignored", tag.text),
        );
    }
    range
}

/// Whether only filler words separate `event` from `time`
fn anchors(text: &str, time: &Tag, event: &Tag) -> bool {
    let (from, to) = if event.end <= time.start {
        (event.end, time.start)
    } else if time.end <= event.start {
        (time.end, event.start)
    } else {
        return false;
    };

    text.get(from..to).is_some_and(|gap| {
        gap.split_whitespace()
            .all(|word| ANCHOR_FILLERS.contains(&word.to_lowercase().as_str()))
    })
}

#[derive(Default)]
struct Trace(Vec<RuleFired>);

impl Trace {
    fn push(&mut self, rule: Rule, detail: String) {
        debug!(?rule, %detail, "rule fired");
        self.0.push(RuleFired { rule, detail });
    }

    fn into_inner(self) -> Vec<RuleFired> {
        self.0
    }
}

// ============================================================================
// Tests
// ============================================================================
