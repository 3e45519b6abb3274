//! Token tagging
//!
//! Regex patterns and phrase dictionaries recognize the filter-relevant
//! spans of a query. Overlapping candidates are resolved leftmost first,
//! then longest, then by confidence, so a performance phrase such as
//! "previstas para amanhã" consumes the event and time words inside it.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use nt_core::{
    DateEventType, LogisticsStatus, OperationCode, PerformanceStatus, SortColumn, SortDirection,
    StateCode,
};

use crate::vocab::{self, CITIES};
use crate::{temporal, Tag, TagKind, TokenTagger};

type Builder = fn(&Captures) -> Option<TagKind>;

const TIME_CONFIDENCE: f32 = 0.9;
const NAME_CONFIDENCE: f32 = 0.8;
const MAX_NAME_WORDS: usize = 4;

static NAME_KEYWORD: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(clientes?|tomador(?:es)?|transportadoras?|parceiros?)\s+(?:(?:chamad[ao]|de\s+nome)\s+)?",
    )
    .ok()
});

static TAGGER: Lazy<RuleTagger> = Lazy::new(RuleTagger::new);

/// Rule-based tagger using regex patterns and phrase dictionaries
pub struct RuleTagger {
    /// Patterns whose tag depends on what they captured
    patterns: Vec<(Regex, Builder, f32)>,
    /// Phrase families that always mean the same thing
    dictionary: Vec<(Regex, TagKind, f32)>,
}

impl RuleTagger {
    /// Create a tagger with the full tracking vocabulary
    pub fn new() -> Self {
        let mut tagger = Self {
            patterns: Vec::new(),
            dictionary: Vec::new(),
        };

        tagger.init_patterns();
        tagger.init_dictionary();
        tagger
    }

    /// Process-wide tagger, built on first use
    pub fn shared() -> &'static RuleTagger {
        &TAGGER
    }

    fn init_patterns(&mut self) {
        // Identifiers
        self.add_pattern(
            r"\b(?:nota\s+fiscal|nf-?e|nf)\s*(?:n[º°o]\.?|n[úu]mero|num\.?)?\s*:?\s*(\d{1,19})\b([-/])?",
            |caps| {
                if caps.get(2).is_some() {
                    return None;
                }
                caps.get(1)?.as_str().parse().ok().map(TagKind::InvoiceNumber)
            },
            0.99,
        );
        self.add_pattern(
            r"\b(?:cnpj(?:\s+raiz)?|raiz\s+(?:do\s+)?cnpj)(?:\s+d[ao]\s+transportadora)?\s*(?:n[º°o]\.?\s*)?:?\s*(\d{2})\.?(\d{3})\.?(\d{3})(?:/?\d{4}-?\d{2})?",
            |caps| {
                let root: String = (1..=3)
                    .filter_map(|i| caps.get(i).map(|m| m.as_str()))
                    .collect();
                (root.len() == 8).then_some(TagKind::CnpjRoot(root))
            },
            0.99,
        );

        // Canonical status phrases carry their value
        self.add_pattern(
            r"\b(?:status\s+de\s+)?an[áa]lise(?:\s+de\s+performance)?\s+'?(atraso|dia\s+seguinte|do\s+dia|entregue|futuro|previsto\s+para\s+2\s+dias)\b'?",
            |caps| performance_value(caps.get(1)?.as_str()),
            0.97,
        );
        self.add_pattern(
            r"\bstatus\s+'?(atraso|dia\s+seguinte|do\s+dia|futuro|previsto\s+para\s+2\s+dias)\b'?",
            |caps| performance_value(caps.get(1)?.as_str()),
            0.95,
        );
        self.add_pattern(
            r"\bsitua[çc][ãa]o(?:\s+log[íi]stica)?(?:\s+atual)?\s+'?(entregue|retida|tr[âa]nsito)\b'?",
            |caps| logistics_value(caps.get(1)?.as_str()),
            0.96,
        );
        self.add_pattern(
            r"\bstatus\s+(?:atual\s+)?'?(retida|tr[âa]nsito)\b'?",
            |caps| logistics_value(caps.get(1)?.as_str()),
            0.95,
        );

        // Sorting
        let body = r"data\s+de\s+entrega|data\s+de\s+emiss[ãa]o|valor(?:\s+da\s+nota(?:\s+fiscal)?)?|pre[çc]o|entrega|emiss[ãa]o|mais\s+recentes?|mais\s+antig[ao]s?|mais\s+nov[ao]s?|mais\s+car[ao]s?|mais\s+barat[ao]s?|maior|menor|decrescente|crescente|asc|desc";
        self.add_pattern(
            &format!(
                r"\b(?:ordenad[ao]s?|ordene|ordenar|ordenando|classificad[ao]s?|classifique|classificar)\s+(?:pel[oa]s?|por|de|em)\s+(?:(?:a|o|as|os)\s+)?((?:{body})(?:\s+(?:e\s+|em\s+|de\s+|ordem\s+)?(?:{body}))*)\b"
            ),
            |caps| sort_from_body(caps.get(1)?.as_str()),
            0.9,
        );
        self.add_pattern(
            r"\b(?:as\s+|os\s+|de\s+)?(mais\s+car[ao]s?|mais\s+barat[ao]s?|maior\s+valor|menor\s+valor)\b",
            |caps| sort_from_body(caps.get(1)?.as_str()),
            0.7,
        );

        // Geography
        let known_cities = CITIES
            .iter()
            .map(|(name, _)| vocab::accent_insensitive(name))
            .collect::<Vec<_>>()
            .join("|");
        self.add_pattern(
            &format!(r"\bcidade\s+de\s+({known_cities})\b"),
            |caps| city(caps.get(1)?.as_str()),
            0.95,
        );
        self.add_pattern(
            r"\bcidade\s+de\s+(?-i:(\p{Lu}\p{L}*(?:\s+(?:d[aeo]s?\s+)?\p{Lu}\p{L}*)*))",
            |caps| city(caps.get(1)?.as_str()),
            0.85,
        );
        self.add_pattern(
            &format!(r"\b({known_cities})\b"),
            |caps| city(caps.get(1)?.as_str()),
            0.9,
        );

        let state_names = StateCode::ALL
            .iter()
            .map(|state| match state {
                // "Para" without the accent is the preposition
                StateCode::PA => "pará".to_string(),
                _ => vocab::accent_insensitive(state.name()),
            })
            .collect::<Vec<_>>()
            .join("|");
        self.add_pattern(
            &format!(r"\b(?:(?:o\s+)?estado\s+d[aeo]\s+)?({state_names})\b"),
            |caps| vocab::state_by_name(caps.get(1)?.as_str()).map(TagKind::State),
            0.95,
        );

        let codes = StateCode::ALL
            .iter()
            .map(StateCode::as_str)
            .collect::<Vec<_>>()
            .join("|");
        let lowercase_codes = StateCode::ALL
            .iter()
            // "se" is far more often the pronoun
            .filter(|state| **state != StateCode::SE)
            .map(|state| state.as_str().to_lowercase())
            .collect::<Vec<_>>()
            .join("|");
        self.add_pattern(
            &format!(r"(?-i:\b({codes})\b)"),
            |caps| caps.get(1)?.as_str().parse().ok().map(TagKind::State),
            0.9,
        );
        self.add_pattern(
            &format!(
                r"\b(?:para|pra|em|destino|uf|estado)\s+(?:o\s+|a\s+)?(?-i:({codes})|({lowercase_codes}))\b"
            ),
            |caps| {
                let code = caps.get(1).or_else(|| caps.get(2))?.as_str();
                code.to_uppercase().parse().ok().map(TagKind::State)
            },
            0.92,
        );

        // Operation codes are matched whole and never split
        for code in OperationCode::ALL {
            let source = format!(r"\b{}\b", regex::escape(code.as_str()));
            self.add_pattern(
                &source,
                |caps| {
                    let text = caps.get(0)?.as_str();
                    OperationCode::ALL
                        .iter()
                        .find(|code| code.as_str().eq_ignore_ascii_case(text))
                        .copied()
                        .map(TagKind::Operation)
                },
                0.98,
            );
        }
    }

    fn init_dictionary(&mut self) {
        // Performance against the deadline
        self.add_term(
            TagKind::Performance(PerformanceStatus::Late),
            &[
                r"atrasad[ao]s?",
                r"com\s+atraso",
                r"em\s+atraso",
                r"fora\s+do\s+prazo",
                r"atraso",
            ],
            0.9,
        );
        self.add_term(
            TagKind::Performance(PerformanceStatus::NextDay),
            &[r"(?:(?:com\s+)?entregas?\s+)?previst[ao]s?\s+para\s+amanh[ãa]"],
            0.93,
        );
        self.add_term(
            TagKind::Performance(PerformanceStatus::SameDay),
            &[r"(?:(?:com\s+)?entregas?\s+)?previst[ao]s?\s+para\s+hoje"],
            0.93,
        );
        self.add_term(
            TagKind::Performance(PerformanceStatus::InTwoDays),
            &[
                r"(?:(?:com\s+)?entregas?\s+)?previst[ao]s?\s+para\s+(?:daqui\s+a\s+)?(?:2|dois)\s+dias",
                r"para\s+daqui\s+a\s+(?:2|dois)\s+dias",
            ],
            0.93,
        );
        self.add_term(
            TagKind::Performance(PerformanceStatus::Future),
            &[r"em\s+data\s+futura", r"futur[ao]s?"],
            0.9,
        );

        // Current physical state
        self.add_term(
            TagKind::Logistics(LogisticsStatus::InTransit),
            &[
                r"em\s+tr[âa]nsito",
                r"tr[âa]nsito",
                r"rodando",
                r"viajando",
                r"a\s+caminho",
            ],
            0.88,
        );
        self.add_term(
            TagKind::Logistics(LogisticsStatus::Held),
            &[
                r"retid[ao]s?",
                r"parad[ao]s?\s+na\s+fiscaliza[çc][ãa]o",
                r"bloquead[ao]s?",
            ],
            0.88,
        );
        self.add_term(
            TagKind::Logistics(LogisticsStatus::Delivered),
            &[
                r"status\s+(?:de\s+)?entregues?",
                r"entregas\s+finalizadas",
                r"j[áa]\s+chegaram",
                r"conclu[íi]d[ao]s",
            ],
            0.88,
        );

        // Date events
        self.add_term(
            TagKind::Event(DateEventType::Scheduled),
            &[
                r"agendad[ao]s?",
                r"agendamento",
                r"data\s+de\s+agenda(?:mento)?",
                r"com\s+agenda",
            ],
            0.85,
        );
        self.add_term(
            TagKind::Event(DateEventType::Delivered),
            &[r"data\s+de\s+entrega"],
            0.85,
        );
        self.add_term(
            TagKind::Event(DateEventType::Issued),
            &[r"emitid[ao]s?", r"(?:data\s+de\s+)?emiss[ãa]o"],
            0.85,
        );
        self.add_term(
            TagKind::Event(DateEventType::Forecast),
            &[r"previst[ao]s?", r"(?:data\s+de\s+)?previs[ãa]o"],
            0.85,
        );
        self.add_term(
            TagKind::Event(DateEventType::ActualForecast),
            &[r"previs[ãa]o\s+real"],
            0.87,
        );
        self.add_term(
            TagKind::Event(DateEventType::WrittenOff),
            &[r"baixad[ao]s?", r"(?:data\s+de\s+)?baixas?"],
            0.85,
        );
        self.add_term(TagKind::Delivered, &[r"entregues?"], 0.8);
    }

    /// Add a capturing pattern (matched case-insensitively)
    fn add_pattern(&mut self, pattern: &str, build: Builder, confidence: f32) {
        match Regex::new(&format!("(?i){pattern}")) {
            Ok(regex) => self.patterns.push((regex, build, confidence)),
            Err(e) => tracing::error!("invalid tagger pattern {pattern}: {e}"),
        }
    }

    /// Add a phrase family that always yields `kind`
    fn add_term(&mut self, kind: TagKind, forms: &[&str], confidence: f32) {
        let source = format!(r"(?i)\b(?:{})\b", forms.join("|"));
        match Regex::new(&source) {
            Ok(regex) => self.dictionary.push((regex, kind, confidence)),
            Err(e) => tracing::error!("invalid tagger term {source}: {e}"),
        }
    }

    /// Extract tags using capturing patterns
    fn extract_by_patterns(&self, text: &str) -> Vec<Tag> {
        let mut tags = Vec::new();

        for (regex, build, confidence) in &self.patterns {
            for caps in regex.captures_iter(text) {
                let (Some(whole), Some(kind)) = (caps.get(0), build(&caps)) else {
                    continue;
                };
                tags.push(Tag {
                    kind,
                    text: whole.as_str().to_string(),
                    start: whole.start(),
                    end: whole.end(),
                    confidence: *confidence,
                });
            }
        }

        tags
    }

    /// Extract tags using dictionary lookup
    fn extract_by_dictionary(&self, text: &str) -> Vec<Tag> {
        let mut tags = Vec::new();

        for (regex, kind, confidence) in &self.dictionary {
            for mat in regex.find_iter(text) {
                tags.push(Tag {
                    kind: kind.clone(),
                    text: mat.as_str().to_string(),
                    start: mat.start(),
                    end: mat.end(),
                    confidence: *confidence,
                });
            }
        }

        tags
    }

    fn extract_times(&self, text: &str) -> Vec<Tag> {
        temporal::scan(text)
            .into_iter()
            .map(|found| Tag {
                kind: TagKind::Time(found.expr),
                text: text[found.start..found.end].to_string(),
                start: found.start,
                end: found.end,
                confidence: TIME_CONFIDENCE,
            })
            .collect()
    }

    /// Client and carrier names: the words after the keyword, up to the
    /// first connective, status word or punctuation
    fn extract_names(&self, text: &str) -> Vec<Tag> {
        let Some(keyword) = NAME_KEYWORD.as_ref() else {
            return Vec::new();
        };

        let mut tags = Vec::new();
        for caps in keyword.captures_iter(text) {
            let (Some(whole), Some(role)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some((name, name_end)) = read_name(text, whole.end()) else {
                continue;
            };

            let role = role.as_str().to_lowercase();
            let kind = if role.starts_with("transportadora") || role.starts_with("parceiro") {
                TagKind::Carrier(name)
            } else {
                TagKind::Client(name)
            };
            tags.push(Tag {
                kind,
                text: text[whole.start()..name_end].to_string(),
                start: whole.start(),
                end: name_end,
                confidence: NAME_CONFIDENCE,
            });
        }

        tags
    }

    /// Keep non-overlapping tags: leftmost, then longest, then most confident
    fn deduplicate(&self, mut tags: Vec<Tag>) -> Vec<Tag> {
        tags.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(b.end.cmp(&a.end))
                .then(b.confidence.total_cmp(&a.confidence))
        });

        let mut result: Vec<Tag> = Vec::new();
        for tag in tags {
            let overlaps = result.last().is_some_and(|kept| tag.start < kept.end);
            if !overlaps {
                result.push(tag);
            }
        }

        result
    }
}

impl Default for RuleTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTagger for RuleTagger {
    fn tag(&self, text: &str) -> Vec<Tag> {
        let mut tags = Vec::new();

        tags.extend(self.extract_by_patterns(text));
        tags.extend(self.extract_by_dictionary(text));
        tags.extend(self.extract_times(text));
        tags.extend(self.extract_names(text));

        self.deduplicate(tags)
    }
}

// ============================================================================
// Builders
// ============================================================================

fn performance_value(raw: &str) -> Option<TagKind> {
    let canonical = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    canonical
        .to_uppercase()
        .parse()
        .ok()
        .map(TagKind::Performance)
}

fn logistics_value(raw: &str) -> Option<TagKind> {
    let status = match vocab::fold(raw).as_str() {
        "entregue" => LogisticsStatus::Delivered,
        "retida" => LogisticsStatus::Held,
        "transito" => LogisticsStatus::InTransit,
        _ => return None,
    };
    Some(TagKind::Logistics(status))
}

fn city(raw: &str) -> Option<TagKind> {
    let raw = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(match vocab::city(&raw) {
        Some((name, state)) => TagKind::City {
            name: name.to_string(),
            state: Some(state),
        },
        None => TagKind::City {
            name: raw,
            state: None,
        },
    })
}

fn sort_from_body(body: &str) -> Option<TagKind> {
    let body = vocab::fold(body);
    let has = |needle: &str| body.contains(needle);

    let column = if has("entrega") {
        Some(SortColumn::DeliveryDate)
    } else if has("emiss") || has("mais nov") {
        Some(SortColumn::EmissionDate)
    } else if has("valor") || has("preco") || has("mais car") || has("mais barat") {
        Some(SortColumn::InvoiceValue)
    } else {
        None
    };

    let direction = if has("decrescente") {
        Some(SortDirection::Desc)
    } else if has("crescente") {
        Some(SortDirection::Asc)
    } else if has("mais recente") || has("maior") || has("mais car") || has("mais nov") {
        Some(SortDirection::Desc)
    } else if has("mais antig") || has("menor") || has("mais barat") {
        Some(SortDirection::Asc)
    } else if has("desc") {
        Some(SortDirection::Desc)
    } else if has("asc") {
        Some(SortDirection::Asc)
    } else {
        None
    };

    if column.is_none() && direction.is_none() {
        return None;
    }
    Some(TagKind::Sort { column, direction })
}

/// Read a name starting at byte `from`; returns the name and its end offset
fn read_name(text: &str, from: usize) -> Option<(String, usize)> {
    let rest = text.get(from..)?;

    // Quoted names are taken whole
    if let Some(open) = rest.chars().next().filter(|c| matches!(c, '\'' | '"' | '“')) {
        let close = if open == '“' { '”' } else { open };
        let inner = &rest[open.len_utf8()..];
        let len = inner.find(close)?;
        let name = inner[..len].trim();
        if name.is_empty() {
            return None;
        }
        return Some((
            name.to_string(),
            from + open.len_utf8() + len + close.len_utf8(),
        ));
    }

    let mut words = Vec::new();
    let mut end = from;
    let mut offset = from;
    for raw in rest.split(' ') {
        let word_start = offset;
        offset += raw.len() + 1;
        if raw.is_empty() {
            continue;
        }

        let word = raw.trim_end_matches([',', '.', ';', ':', '?', '!', ')']);
        let punctuated = word.len() < raw.len();
        // "Para Todos": a capitalized first word belongs to the name
        let capitalized_first =
            words.is_empty() && word.chars().next().is_some_and(char::is_uppercase);
        if word.is_empty() || (!capitalized_first && vocab::is_name_boundary(word)) {
            break;
        }

        words.push(word);
        end = word_start + word.len();
        if punctuated || words.len() == MAX_NAME_WORDS {
            break;
        }
    }

    if words.is_empty() {
        None
    } else {
        Some((words.join(" "), end))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::TimeExpr;

    fn kinds(text: &str) -> Vec<TagKind> {
        RuleTagger::shared()
            .tag(text)
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_status_and_sort() {
        assert_eq!(
            kinds("Notas em trânsito ordenadas pelo maior valor"),
            vec![
                TagKind::Logistics(LogisticsStatus::InTransit),
                TagKind::Sort {
                    column: Some(SortColumn::InvoiceValue),
                    direction: Some(SortDirection::Desc)
                },
            ]
        );
    }

    #[test]
    fn test_performance_phrase_consumes_event_and_time() {
        assert_eq!(
            kinds("notas previstas para amanhã"),
            vec![TagKind::Performance(PerformanceStatus::NextDay)]
        );
        assert_eq!(
            kinds("Notas com status de análise DIA SEGUINTE"),
            vec![TagKind::Performance(PerformanceStatus::NextDay)]
        );
    }

    #[test]
    fn test_delivered_is_ambiguous() {
        assert_eq!(
            kinds("notas entregues ontem"),
            vec![TagKind::Delivered, TagKind::Time(TimeExpr::Yesterday)]
        );
        assert_eq!(
            kinds("Quais notas fiscais têm status de entregue?"),
            vec![TagKind::Logistics(LogisticsStatus::Delivered)]
        );
        assert_eq!(
            kinds("com status de análise ENTREGUE"),
            vec![TagKind::Performance(PerformanceStatus::Delivered)]
        );
    }

    #[test]
    fn test_invoice_and_cnpj() {
        assert_eq!(
            kinds("Nota fiscal 54321"),
            vec![TagKind::InvoiceNumber(54321)]
        );
        assert_eq!(
            kinds("cnpj da transportadora 12.345.678/0001-90"),
            vec![TagKind::CnpjRoot("12345678".to_string())]
        );
        assert!(kinds("nota fiscal 2025-10-01").iter().all(|k| !matches!(k, TagKind::InvoiceNumber(_))));
        assert_eq!(
            kinds("Nota fiscal 99999999999999"),
            vec![TagKind::InvoiceNumber(99_999_999_999_999)]
        );
    }

    #[test]
    fn test_names_stop_at_connectives() {
        assert_eq!(
            kinds("notas fiscais do cliente ACME da transportadora Veloz"),
            vec![
                TagKind::Client("ACME".to_string()),
                TagKind::Carrier("Veloz".to_string()),
            ]
        );
        assert_eq!(
            kinds("Liste as notas da transportadora Expresso Veloz para a cidade de Salvador"),
            vec![
                TagKind::Carrier("Expresso Veloz".to_string()),
                TagKind::City {
                    name: "Salvador".to_string(),
                    state: Some(StateCode::BA)
                },
            ]
        );
        assert_eq!(
            kinds("notas com situação 'RETIDA' para o cliente 'BEXX Ltda'"),
            vec![
                TagKind::Logistics(LogisticsStatus::Held),
                TagKind::Client("BEXX Ltda".to_string()),
            ]
        );
        assert!(kinds("quais são os clientes?").is_empty());
        assert_eq!(
            kinds("notas do cliente Para Todos"),
            vec![TagKind::Client("Para Todos".to_string())]
        );
        assert!(kinds("notas do cliente para hoje")
            .iter()
            .all(|k| !matches!(k, TagKind::Client(_))));
    }

    #[test]
    fn test_geography() {
        assert_eq!(
            kinds("notas para o estado de São Paulo"),
            vec![TagKind::State(StateCode::SP)]
        );
        assert_eq!(
            kinds("notas para a cidade de São Paulo"),
            vec![TagKind::City {
                name: "São Paulo".to_string(),
                state: Some(StateCode::SP)
            }]
        );
        assert_eq!(
            kinds("entregas em Manaus"),
            vec![TagKind::City {
                name: "Manaus".to_string(),
                state: Some(StateCode::AM)
            }]
        );
        assert_eq!(kinds("notas para RJ"), vec![TagKind::State(StateCode::RJ)]);
        assert_eq!(kinds("notas para mg"), vec![TagKind::State(StateCode::MG)]);
        assert!(kinds("notas para se entregar").is_empty());
    }

    #[test]
    fn test_operation_codes_are_whole() {
        assert_eq!(
            kinds("operação OutBound-BAR-MAT.PRIMA"),
            vec![TagKind::Operation(OperationCode::OutboundBarRawMaterial)]
        );
        assert_eq!(
            kinds("operação outbound-spo"),
            vec![TagKind::Operation(OperationCode::OutboundSpo)]
        );
    }

    #[test]
    fn test_sort_without_direction() {
        assert_eq!(
            kinds("ordenadas por data de emissão"),
            vec![TagKind::Sort {
                column: Some(SortColumn::EmissionDate),
                direction: None
            }]
        );
    }

    #[test]
    fn test_tags_do_not_overlap() {
        let tags = RuleTagger::shared()
            .tag("notas emitidas hoje para SP que estão em trânsito ordenadas pela data de entrega mais recente");
        for pair in tags.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(tags.len(), 5);
    }
}
