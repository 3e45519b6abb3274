//! Rule-based query normalization
//!
//! Rewrites colloquial phrasing into the canonical business vocabulary the
//! tagger is tuned for. Technical tokens (operation codes, dates, CNPJs,
//! quoted names) and phrases that are already canonical are set aside
//! before any rewrite runs and restored afterwards, which keeps the
//! rewrite idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use nt_core::{NormalizedQuery, OperationCode, StateCode};

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

/// Optional lead-in of a performance phrase, absorbed by the canonical form
const PERFORMANCE_LEAD: &str = r"(?:com\s+)?(?:status\s+(?:de\s+an[áa]lise\s+)?)?";

static NORMALIZER: Lazy<RuleNormalizer> = Lazy::new(RuleNormalizer::new);

static PLACEHOLDER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(&format!("{OPEN}(\\d+){CLOSE}")).ok());

static SPACE_BEFORE_PUNCTUATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\s+([?!.,;:])").ok());

/// Deterministic, table-driven normalizer
pub struct RuleNormalizer {
    /// Spans copied through untouched
    protected: Vec<Regex>,
    /// Ordered rewrites
    rewrites: Vec<(Regex, String)>,
    /// Lowercase UF after a destination preposition
    destination_uf: Option<Regex>,
}

impl RuleNormalizer {
    pub fn new() -> Self {
        let mut normalizer = Self {
            protected: Vec::new(),
            rewrites: Vec::new(),
            destination_uf: None,
        };

        normalizer.init_protected();
        normalizer.init_rewrites();

        let codes = StateCode::ALL
            .iter()
            .filter(|state| **state != StateCode::SE)
            .map(StateCode::as_str)
            .collect::<Vec<_>>()
            .join("|");
        normalizer.destination_uf =
            compile(&format!(r"(?i)\b(para|pra|em)\s+({codes})\b"));

        normalizer
    }

    /// Process-wide normalizer, built on first use
    pub fn shared() -> &'static RuleNormalizer {
        &NORMALIZER
    }

    fn init_protected(&mut self) {
        // Longest first so "OutBound-BAR-MAT.PRIMA" is not cut at "OutBound-BAR"
        let mut operations = OperationCode::ALL
            .iter()
            .map(|code| regex::escape(code.as_str()))
            .collect::<Vec<_>>();
        operations.sort_by_key(|code| std::cmp::Reverse(code.len()));
        let operations = operations.join("|");

        let sources = [
            // Quoted names
            r#"'[^']*'|"[^"]*"|“[^”]*”"#.to_string(),
            format!(r"(?i)\b(?:{operations})\b"),
            // Already canonical status phrases
            r"(?i)(?:com\s+)?status\s+de\s+an[áa]lise(?:\s+de\s+performance)?\s+(?:atraso|dia\s+seguinte|do\s+dia|entregue|futuro|previsto\s+para\s+2\s+dias)\b".to_string(),
            r"(?i)(?:com\s+)?situa[çc][ãa]o\s+log[íi]stica\s+(?:entregue|retida|tr[âa]nsito)\b".to_string(),
            // CNPJ and dates
            r"\b\d{2}\.\d{3}\.\d{3}(?:/\d{4}-\d{2})?".to_string(),
            r"\b(?:\d{4}-\d{1,2}-\d{1,2}|\d{1,2}/\d{1,2}(?:/\d{4})?)\b".to_string(),
        ];

        self.protected = sources.iter().filter_map(|s| compile(s)).collect();
    }

    fn init_rewrites(&mut self) {
        // Missing accents
        for (bare, fixed) in [
            ("transito", "trânsito"),
            ("amanha", "amanhã"),
            ("emissao", "emissão"),
            ("analise", "análise"),
            ("situacao", "situação"),
            ("operacao", "operação"),
            ("logistica", "logística"),
            ("previsao", "previsão"),
            ("ultima", "última"),
            ("numero", "número"),
            ("preco", "preço"),
            ("mes", "mês"),
        ] {
            self.rewrite(&format!(r"\b{bare}\b"), fixed);
        }

        // Abbreviations
        self.rewrite(r"\bnfs\b", "notas fiscais");
        self.rewrite(r"\bnf-?e?\b", "nota fiscal");
        self.rewrite(r"\b(?:do\s+)?cli\b\.?", "do cliente");
        self.rewrite(r"\b(?:da\s+)?transp\b\.?", "da transportadora");
        self.rewrite(r"\bhj\b", "hoje");
        self.rewrite(r"\bult\.?\s+sem(?:ana)?\b", "última semana");
        self.rewrite(r"\bsem\s+passada\b", "semana passada");

        // Logistics state
        self.rewrite(r"\b(?:rodando|viajando|a\s+caminho)\b", "em trânsito");
        self.rewrite(
            r"\b(?:parad[ao]s?\s+na\s+fiscaliza[çc][ãa]o|bloquead[ao]s?)\b",
            "retidas",
        );
        self.rewrite(
            r"\b(?:com\s+)?status\s+(?:de\s+)?entregues?\b",
            "com situação logística ENTREGUE",
        );
        self.rewrite(
            r"\b(?:que\s+)?j[áa]\s+chegaram\b|\b(?:as\s+)?entregas\s+finalizadas\b|\bconclu[íi]d[ao]s\b",
            "com situação logística ENTREGUE",
        );

        // Performance against the deadline
        self.rewrite(
            r"\b(?:status\s+de\s+)?an[áa]lise(?:\s+de\s+performance)?\s+entregue\b",
            "status de análise ENTREGUE",
        );
        self.rewrite(
            &format!(
                r"\b{PERFORMANCE_LEAD}(?:com\s+atraso|em\s+atraso|atrasad[ao]s?|fora\s+do\s+prazo)\b"
            ),
            "com status de análise ATRASO",
        );
        self.rewrite(
            r"\b(?:com\s+)?(?:entregas?\s+)?previst[ao]s?\s+para\s+amanh[ãa]\b",
            "com status de análise DIA SEGUINTE",
        );
        self.rewrite(
            r"\b(?:com\s+)?(?:entregas?\s+)?previst[ao]s?\s+para\s+hoje\b|\b(?:com\s+)?status\s+do\s+dia\b",
            "com status de análise DO DIA",
        );
        self.rewrite(
            r"\b(?:com\s+)?(?:entregas?\s+)?(?:previst[ao]s?\s+)?para\s+daqui\s+a\s+(?:2|dois)\s+dias\b|\b(?:com\s+)?(?:entregas?\s+)?previst[ao]s?\s+para\s+(?:2|dois)\s+dias\b",
            "com status de análise PREVISTO PARA 2 DIAS",
        );
        self.rewrite(
            &format!(r"\b{PERFORMANCE_LEAD}(?:em\s+data\s+futura|futur[ao]s?)\b"),
            "com status de análise FUTURO",
        );

        // Sorting by value
        self.rewrite(
            r"\b(?:ordenar|ordene|ordenad[ao]s?|ordenando)\s+(?:pel[oa]s?|por)\s+(?:(?:o|a|os|as)\s+)?(?:mais\s+car[ao]s?|maior\s+valor)\b",
            "ordenadas pelo maior valor",
        );
        self.rewrite(
            r"\b(?:ordenar|ordene|ordenad[ao]s?|ordenando)\s+(?:pel[oa]s?|por)\s+(?:(?:o|a|os|as)\s+)?(?:mais\s+barat[ao]s?|menor\s+valor)\b",
            "ordenadas pelo menor valor",
        );
    }

    /// Add a case-insensitive rewrite
    fn rewrite(&mut self, pattern: &str, replacement: &str) {
        if let Some(regex) = compile(&format!("(?i){pattern}")) {
            self.rewrites.push((regex, replacement.to_string()));
        }
    }

    /// Normalize a raw query
    pub fn normalize(&self, raw: &str) -> NormalizedQuery {
        let mut text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut stash = Vec::new();
        for regex in &self.protected {
            text = regex
                .replace_all(&text, |caps: &Captures| {
                    stash.push(caps[0].to_string());
                    format!("{OPEN}{}{CLOSE}", stash.len() - 1)
                })
                .into_owned();
        }

        if let Some(regex) = &self.destination_uf {
            text = regex
                .replace_all(&text, |caps: &Captures| expand_uf(&caps[1], &caps[2]))
                .into_owned();
        }
        for (regex, replacement) in &self.rewrites {
            text = regex.replace_all(&text, replacement.as_str()).into_owned();
        }

        if let Some(regex) = PLACEHOLDER.as_ref() {
            text = regex
                .replace_all(&text, |caps: &Captures| {
                    caps[1]
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| stash.get(i).cloned())
                        .unwrap_or_default()
                })
                .into_owned();
        }
        if let Some(regex) = SPACE_BEFORE_PUNCTUATION.as_ref() {
            text = regex.replace_all(&text, "$1").into_owned();
        }

        NormalizedQuery::new(capitalize(text.trim()))
    }
}

impl Default for RuleNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(source: &str) -> Option<Regex> {
    Regex::new(source)
        .map_err(|e| tracing::error!("invalid normalizer pattern {source}: {e}"))
        .ok()
}

fn expand_uf(preposition: &str, code: &str) -> String {
    let Ok(state) = code.to_uppercase().parse::<StateCode>() else {
        return format!("{preposition} {code}");
    };
    let lead = if preposition.eq_ignore_ascii_case("em") {
        "no"
    } else {
        "para o"
    };
    format!("{lead} estado de {}", state.name())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
