//! Prompt construction
//!
//! Three prompts are sent to the inference mechanism: the rewrite into
//! canonical vocabulary, the chain-of-thought extraction ending in a
//! `JSON FINAL` block, and the single repair of an invalid candidate.

use nt_core::{DateContext, NormalizedQuery};

/// Builder for sectioned prompts
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    examples: Vec<(String, String)>,
    instructions: Vec<String>,
    input_label: String,
    input: String,
    answer_label: String,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Add a worked example
    pub fn add_example(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.examples.push((input.into(), output.into()));
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Set the text to work on, with the labels used by the examples
    pub fn input(
        mut self,
        label: impl Into<String>,
        text: impl Into<String>,
        answer_label: impl Into<String>,
    ) -> Self {
        self.input_label = label.into();
        self.input = text.into();
        self.answer_label = answer_label.into();
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n\n");
        }

        for section in &self.context_sections {
            prompt.push_str(section);
            prompt.push_str("\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("--- REGRAS ---\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push('\n');
        }

        if !self.examples.is_empty() {
            prompt.push_str("--- EXEMPLOS ---\n");
            for (input, output) in &self.examples {
                prompt.push_str(&format!(
                    "{}: {}\n{}: {}\n---\n",
                    self.input_label, input, self.answer_label, output
                ));
            }
            prompt.push('\n');
        }

        if !self.input.is_empty() {
            prompt.push_str(&format!(
                "{}: {}\n{}:",
                self.input_label, self.input, self.answer_label
            ));
        }

        prompt
    }
}

/// Rewrite of a raw query into canonical business vocabulary
pub fn enhancer_prompt(query: &str) -> String {
    PromptBuilder::new()
        .system(
            "Você normaliza perguntas sobre notas fiscais para os termos de negócio oficiais. \
             Preserve exatamente a intenção do usuário e responda APENAS com a frase reescrita, \
             em uma única linha.",
        )
        .add_instruction("Nunca adicione um conceito (status, evento, período, filtro) que não esteja na pergunta.")
        .add_instruction("Nunca remova um conceito da pergunta; se ela pede um status e uma ordenação, mantenha os dois.")
        .add_instruction("Expanda abreviações: \"nf\" -> \"nota fiscal\", \"cli\" -> \"do cliente\", \"transp\" -> \"da transportadora\", \"hj\" -> \"hoje\", \"ult sem\" -> \"última semana\", \"sp\" -> \"para o estado de São Paulo\".")
        .add_instruction("Sinônimos de trânsito (\"rodando\", \"viajando\", \"a caminho\") -> \"em trânsito\"; \"paradas na fiscalização\", \"bloqueadas\" -> \"retidas\"; \"status entregue\" -> \"com situação logística ENTREGUE\".")
        .add_instruction("Prazo: \"com atraso\" -> \"com status de análise ATRASO\"; \"prevista para amanhã\" -> \"com status de análise DIA SEGUINTE\"; \"prevista para hoje\" -> \"com status de análise DO DIA\"; \"análise entregue\" -> \"com status de análise ENTREGUE\".")
        .add_instruction("Ordenação: \"mais caro\", \"maior valor\" -> \"ordenadas pelo maior valor\"; \"mais barato\", \"menor valor\" -> \"ordenadas pelo menor valor\".")
        .add_instruction("Códigos técnicos (ex: OutBound-SPO, ATRASO, TRÂNSITO), números e datas passam sem alteração.")
        .add_instruction("Se a pergunta diz \"cidade de X\", mantenha \"cidade de X\"; não troque por estado.")
        .add_instruction("Comece com letra maiúscula e mantenha o tom original (pergunta ou comando).")
        .add_example(
            "quais notas foram entregues hoje?",
            "Quais notas fiscais foram entregues hoje?",
        )
        .add_example(
            "notas rodando ordenadas pelo mais caro",
            "Me mostre as notas fiscais em trânsito ordenadas pelo maior valor",
        )
        .add_example(
            "nf do cli acme transp veloz com atraso",
            "Me mostre as notas fiscais do cliente ACME da transportadora Veloz com status de análise ATRASO",
        )
        .add_example("o que foi baixado na ult sem", "O que foi baixado na última semana")
        .add_example(
            "notas para a cidade de São Paulo",
            "Me mostre as notas fiscais para a cidade de São Paulo",
        )
        .input("Pergunta Original", query, "Pergunta Reescrita")
        .build()
}

fn empty_json_with(fields: &[(&str, &str)]) -> String {
    let body = nt_core::FilterObject::FIELD_NAMES
        .iter()
        .map(|key| {
            let value = fields
                .iter()
                .find(|(name, _)| name == key)
                .map_or("null".to_string(), |(_, v)| v.to_string());
            format!("\"{key}\": {value}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

/// Chain-of-thought extraction of the filter candidate
pub fn parser_prompt(query: &NormalizedQuery, ctx: &DateContext, schema: &str) -> String {
    let dates = format!(
        "Datas de referência: hoje = {}, ontem = {}, amanhã = {}, esta semana = {} a {}, \
         última semana = {} a {}, este mês = {} a {}, este semestre = {} a {}.",
        ctx.today,
        ctx.yesterday,
        ctx.tomorrow(),
        ctx.week_start,
        ctx.week_end,
        ctx.last_week_start,
        ctx.last_week_end,
        ctx.month_start,
        ctx.month_end,
        ctx.semester_start,
        ctx.semester_end,
    );

    let yesterday = format!("\"{}\"", ctx.yesterday);
    let month_start = format!("\"{}\"", ctx.month_start);
    let month_end = format!("\"{}\"", ctx.month_end);

    PromptBuilder::new()
        .system(
            "Você converte perguntas sobre notas fiscais em um objeto JSON de filtros. \
             Primeiro raciocine em três passos curtos (Passo 1: período de tempo, \
             Passo 2: eventos e status, Passo 3: demais entidades e ordenação). \
             Depois escreva a linha \"JSON FINAL:\" seguida apenas do objeto JSON.",
        )
        .add_context(dates)
        .add_context(format!("Formato do JSON:\n{schema}"))
        .add_context(
            "Códigos de TipoData: \"1\" agenda, \"2\" entregue, \"3\" emitido, \
             \"4\" previsto, \"5\" previsão real, \"6\" baixada.",
        )
        .add_instruction("Tempo explícito (hoje, ontem, esta semana, entre X e Y) sempre define DE e ATE.")
        .add_instruction("Evento de data junto com período de tempo: preencha TipoData E DE/ATE. Esta associação é obrigatória e vence as regras seguintes.")
        .add_instruction("Status de análise (ATRASO, DIA SEGUINTE, DO DIA, ENTREGUE, FUTURO, PREVISTO PARA 2 DIAS) vai em StatusAnaliseData; sem período explícito, não preencha TipoData.")
        .add_instruction("Situação logística (ENTREGUE, RETIDA, TRÂNSITO) vai em SituacaoNF apenas quando nenhum período ancora o termo; se StatusAnaliseData estiver preenchido, SituacaoNF fica null.")
        .add_instruction("\"entregues ontem\" é evento de data; \"status entregue\" é situação logística; nunca os dois para o mesmo termo.")
        .add_instruction("Uma cidade conhecida implica a UF dela, mesmo sem a UF citada. Nenhum outro campo é inferido.")
        .add_instruction("Com número de nota fiscal, todos os outros campos ficam null.")
        .add_instruction("A ordenação nunca remove outro filtro. Sem coluna, a direção fica null; sem direção, a coluna fica null.")
        .add_instruction("Qualquer campo não citado de forma explícita fica null.")
        .add_example(
            "Me mostre as notas fiscais em trânsito ordenadas pelo maior valor",
            format!(
                "Passo 1: sem período. Passo 2: situação TRÂNSITO. Passo 3: ordenar por valor, decrescente.\nJSON FINAL: {}",
                empty_json_with(&[
                    ("SituacaoNF", "\"TRÂNSITO\""),
                    ("SortColumn", "\"valor_nf\""),
                    ("SortDirection", "\"DESC\""),
                ])
            ),
        )
        .add_example(
            "Notas entregues ontem",
            format!(
                "Passo 1: ontem. Passo 2: evento entregue com período, TipoData 2. Passo 3: nada.\nJSON FINAL: {}",
                empty_json_with(&[("DE", yesterday.as_str()), ("ATE", yesterday.as_str()), ("TipoData", "\"2\"")])
            ),
        )
        .add_example(
            "Quais notas foram emitidas este mês?",
            format!(
                "Passo 1: este mês. Passo 2: evento emitido, TipoData 3. Passo 3: nada.\nJSON FINAL: {}",
                empty_json_with(&[("DE", month_start.as_str()), ("ATE", month_end.as_str()), ("TipoData", "\"3\"")])
            ),
        )
        .add_example(
            "Notas com status de análise DIA SEGUINTE",
            format!(
                "Passo 1: sem período. Passo 2: status de análise DIA SEGUINTE. Passo 3: nada.\nJSON FINAL: {}",
                empty_json_with(&[("StatusAnaliseData", "\"DIA SEGUINTE\"")])
            ),
        )
        .add_example(
            "Qual o status da entrega?",
            format!(
                "Passo 1: sem período. Passo 2: nenhum status explícito. Passo 3: nada.\nJSON FINAL: {}",
                empty_json_with(&[])
            ),
        )
        .input("Texto", query.as_str(), "Resposta")
        .build()
}

/// Single corrective re-invocation for an invalid candidate
pub fn repair_prompt(raw: &str, error: &str, schema: &str) -> String {
    PromptBuilder::new()
        .system(
            "A saída abaixo deveria ser um objeto JSON de filtros válido, mas foi rejeitada. \
             Corrija-a. Responda APENAS com o objeto JSON corrigido.",
        )
        .add_context(format!("Formato exigido:\n{schema}"))
        .add_context(format!("Erro encontrado: {error}"))
        .add_instruction("Mantenha todos os valores corretos da saída original.")
        .add_instruction("Use null para valores ausentes ou fora do vocabulário permitido.")
        .input("Saída rejeitada", raw, "JSON corrigido")
        .build()
}

// ============================================================================
// Tests
// ============================================================================
