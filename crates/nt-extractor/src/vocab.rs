//! Static rule tables
//!
//! Everything here is compiled into the binary and never mutated at runtime.

use nt_core::StateCode;

/// State capitals and major logistics cities, with the state they belong to
pub const CITIES: &[(&str, StateCode)] = &[
    // Capitals
    ("Rio Branco", StateCode::AC),
    ("Maceió", StateCode::AL),
    ("Macapá", StateCode::AP),
    ("Manaus", StateCode::AM),
    ("Salvador", StateCode::BA),
    ("Fortaleza", StateCode::CE),
    ("Brasília", StateCode::DF),
    ("Vitória", StateCode::ES),
    ("Goiânia", StateCode::GO),
    ("São Luís", StateCode::MA),
    ("Cuiabá", StateCode::MT),
    ("Campo Grande", StateCode::MS),
    ("Belo Horizonte", StateCode::MG),
    ("Belém", StateCode::PA),
    ("João Pessoa", StateCode::PB),
    ("Curitiba", StateCode::PR),
    ("Recife", StateCode::PE),
    ("Teresina", StateCode::PI),
    ("Rio de Janeiro", StateCode::RJ),
    ("Natal", StateCode::RN),
    ("Porto Alegre", StateCode::RS),
    ("Porto Velho", StateCode::RO),
    ("Boa Vista", StateCode::RR),
    ("Florianópolis", StateCode::SC),
    ("São Paulo", StateCode::SP),
    ("Aracaju", StateCode::SE),
    ("Palmas", StateCode::TO),
    // Major cities and operation hubs
    ("Campinas", StateCode::SP),
    ("Guarulhos", StateCode::SP),
    ("Santos", StateCode::SP),
    ("Barueri", StateCode::SP),
    ("Osasco", StateCode::SP),
    ("Jundiaí", StateCode::SP),
    ("Sorocaba", StateCode::SP),
    ("Ribeirão Preto", StateCode::SP),
    ("São José dos Campos", StateCode::SP),
    ("Uberlândia", StateCode::MG),
    ("Betim", StateCode::MG),
    ("Juiz de Fora", StateCode::MG),
    ("Niterói", StateCode::RJ),
    ("Duque de Caxias", StateCode::RJ),
    ("Joinville", StateCode::SC),
    ("Blumenau", StateCode::SC),
    ("Itajaí", StateCode::SC),
    ("Londrina", StateCode::PR),
    ("Maringá", StateCode::PR),
    ("Caxias do Sul", StateCode::RS),
    ("Feira de Santana", StateCode::BA),
    ("Camaçari", StateCode::BA),
    ("Ipojuca", StateCode::PE),
    ("Jaboatão dos Guararapes", StateCode::PE),
    ("Anápolis", StateCode::GO),
    ("Vila Velha", StateCode::ES),
];

/// Month names as written in queries, with their number
pub const MONTHS: &[(&str, u32)] = &[
    ("janeiro", 1),
    ("fevereiro", 2),
    ("março", 3),
    ("abril", 4),
    ("maio", 5),
    ("junho", 6),
    ("julho", 7),
    ("agosto", 8),
    ("setembro", 9),
    ("outubro", 10),
    ("novembro", 11),
    ("dezembro", 12),
];

/// Words that end a free-text client or carrier name
pub const NAME_BOUNDARIES: &[&str] = &[
    "a", "as", "o", "os", "da", "das", "do", "dos", "de", "para", "pra", "com", "que", "em",
    "no", "na", "nos", "nas", "e", "ou", "cujo", "cuja", "onde", "foram", "estão", "estao",
    "está", "esta", "tem", "têm", "hoje", "ontem", "amanhã", "amanha", "nesta", "neste",
    "desta", "deste", "essa", "esse", "dessa", "desse", "status", "situação", "situacao",
    "entre", "até", "ate", "por", "pelo", "pela", "sem", "mas", "nota", "notas", "nf", "nfs",
    "operação", "operacao",
];

/// Word prefixes that end a free-text name (inflected verbs and statuses)
pub const NAME_BOUNDARY_PREFIXES: &[&str] = &[
    "ordenad", "ordene", "ordenar", "classific", "emitid", "entregu", "agendad", "previst",
    "baixad", "retid", "atrasad", "bloquead", "rodando", "viajando",
];

/// Words allowed between a date event and the time expression anchoring it
pub const ANCHOR_FILLERS: &[&str] = &[
    "em", "no", "na", "nos", "nas", "de", "do", "da", "dos", "das", "para", "pra", "a", "o",
    "as", "os", "foram", "sido", "dia", "durante", "até", "ate", "desde", "com", "data",
];

/// Month number for a month name, accents optional
pub fn month_number(name: &str) -> Option<u32> {
    let folded = fold(name);
    MONTHS
        .iter()
        .find(|(month, _)| fold(month) == folded)
        .map(|(_, number)| *number)
}

/// Known city with its canonical spelling and state, accents optional
pub fn city(name: &str) -> Option<(&'static str, StateCode)> {
    let folded = fold(name);
    CITIES
        .iter()
        .find(|(city, _)| fold(city) == folded)
        .map(|(city, state)| (*city, *state))
}

/// State by its full name, accents optional
pub fn state_by_name(name: &str) -> Option<StateCode> {
    let folded = fold(name);
    StateCode::ALL
        .iter()
        .find(|state| fold(state.name()) == folded)
        .copied()
}

/// Lowercase and strip Portuguese diacritics
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'ê' | 'è' => 'e',
            'í' | 'î' => 'i',
            'ó' | 'ô' | 'õ' | 'ò' => 'o',
            'ú' | 'ü' | 'û' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Regex source matching `term` with or without its diacritics
pub fn accent_insensitive(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() * 2);
    for c in term.chars() {
        let class = match c.to_lowercase().next().unwrap_or(c) {
            'a' | 'á' | 'à' | 'â' | 'ã' => Some("[aáàâã]"),
            'e' | 'é' | 'ê' => Some("[eéê]"),
            'i' | 'í' => Some("[ií]"),
            'o' | 'ó' | 'ô' | 'õ' => Some("[oóôõ]"),
            'u' | 'ú' | 'ü' => Some("[uúü]"),
            'c' | 'ç' => Some("[cç]"),
            _ => None,
        };
        match class {
            Some(class) => pattern.push_str(class),
            None if c.is_whitespace() => pattern.push_str(r"\s+"),
            None => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

/// Whether `word` ends a free-text name
pub fn is_name_boundary(word: &str) -> bool {
    let lower = word.to_lowercase();
    NAME_BOUNDARIES.contains(&lower.as_str())
        || NAME_BOUNDARY_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
}
