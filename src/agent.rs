//! Conversation orchestrator.
//!
//! Drives the multi-turn tool-call protocol: send the conversation to the
//! model, detect a `VIAJES("…")` invocation in the reply, execute the
//! retrieval tool, report its result as a synthetic user turn, and re-invoke
//! the model. The produced answer is then judged by a separate stateless
//! model call; a rejected answer triggers exactly one escalated retrieval
//! pass with a widened candidate pool, after which the next answer is final
//! regardless of quality.
//!
//! Fault policy: tool faults and judge faults are absorbed here (fixed
//! result string, fail-open acceptance); only faults in the conversation's
//! own model calls propagate, where [`ask_with_backoff`] may repeat the
//! whole run.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::EmbeddingCache;
use crate::config::{BackoffConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::models::{ChatMessage, Role};
use crate::prompt::build_prompt;
use crate::protocol::{self, Verdict};
use crate::store::VectorStore;

/// Tool name the system prompt advertises; part of the protocol contract.
pub const TOOL_NAME: &str = "VIAJES";

const SYSTEM_PROMPT: &str = r#"Tienes a tu disposición una herramienta: VIAJES. Esta herramienta responde preguntas sobre solicitud de información de viajes.
Los paquetes de viajes tambien se pueden denominar ofertas de viajes.
Los itinerarios de viajes tambien se pueden denominar rutas de viajes u ofertas de viajes.
Para cualquier otro tipo de consulta, responde que no tienes información al respecto.

Para llamar a esa herramienta usa esta sintaxis:

```
VIAJES("pregunta")
```

Crea un bloque de código siempre que llames a una herramienta. Si son varias, puedes crear varios bloques de código.

- Contesta SIEMPRE en español de España.
"#;

/// System prompt for the grounded-answer sub-call inside the tool.
const GROUNDED_SYSTEM_PROMPT: &str = "Eres un asistente experto que responde preguntas basándose únicamente en el contexto proporcionado.";

/// Substituted tool result when retrieval itself fails.
const TOOL_ERROR_RESULT: &str = "Error al procesar la consulta. Por favor, inténtalo de nuevo con una pregunta más específica sobre viajes.";

/// Substituted tool result when retrieval succeeds but finds nothing to say.
const EMPTY_RESULT: &str =
    "No se encontró información específica sobre esta consulta en nuestra base de datos de viajes.";

fn judge_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"Un RAG sobre catálogos de viajes y ofertas sobre viajes ha generado una respuesta a una pregunta del usuario.

La respuesta recibida ha sido:

{answer}

La pregunta del usuario ha sido:

{question}

Por favor, verifica que la respuesta es coherente con la pregunta y proporciona información útil sobre viajes.

Si la respuesta es válida y proporciona información específica sobre viajes relacionada con la pregunta, responde:

```
TRUE
```

Si la respuesta no es válida por alguna de estas razones:
1. Contiene todavía bloques de código con llamadas a VIAJES
2. Dice "Lo siento, pero no tengo información sobre ofertas de viajes" o algo similar
3. No responde directamente a la pregunta del usuario sobre viajes
4. Es muy genérica y no proporciona información específica sobre destinos, itinerarios o detalles de viajes

Entonces responde:

```
FALSE
```
"#
    )
}

/// Format the synthetic user turn that reports a tool result to the model.
fn tool_result_turn(argument: &str, result: &str, escalated: bool) -> String {
    let tag = if escalated { " mejorado" } else { "" };
    format!("```\nVIAJES(\"{argument}\") # resultado{tag}: {result}\n```")
}

/// Templated last-resort answer when a repaired reply has nothing left.
fn fallback_answer(query_term: &str) -> String {
    format!("Basado en tu consulta sobre '{query_term}', no pude encontrar información específica.")
}

/// Remove a residual tool-call block from a reply that should have been a
/// final answer: keep the text before the first fence, or fall back to the
/// templated string.
fn repair_reply(reply: &str, query_term: &str) -> String {
    if protocol::first_tool_call(reply, TOOL_NAME).is_none() {
        return reply.to_string();
    }
    tracing::debug!("model reply still contains a tool call, truncating at first fence");
    match protocol::text_before_first_fence(reply) {
        Some(head) => head.to_string(),
        None => fallback_answer(query_term),
    }
}

// ============ Conversation ============

/// Append-only message log with exactly one system message, always first.
///
/// Rewinding to a snapshot is an index truncation into the log, so the
/// escalation path can discard a bad tool round-trip without copying
/// history.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system: &str, user: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Replace the final assistant message, or append one if the log does
    /// not end with an assistant turn.
    pub fn replace_last_assistant(&mut self, content: impl Into<String>) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => last.content = content.into(),
            _ => self.push_assistant(content),
        }
    }

    /// Snapshot of the current log length, for [`Conversation::rewind`].
    pub fn mark(&self) -> usize {
        self.messages.len()
    }

    /// Discard every message appended after `mark` was taken.
    pub fn rewind(&mut self, mark: usize) {
        self.messages.truncate(mark);
    }

    /// Content of the final message — the answer handed to the caller.
    pub fn last_content(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

// ============ Retrieval tool ============

/// The retrieval tool behind `VIAJES`: nearest-neighbor search, grounded
/// prompt, one model call.
pub struct RagPipeline {
    store: VectorStore,
    cache: EmbeddingCache,
    chat: Arc<dyn ChatModel>,
    retrieval: RetrievalConfig,
}

impl RagPipeline {
    pub fn new(
        store: VectorStore,
        cache: EmbeddingCache,
        chat: Arc<dyn ChatModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            cache,
            chat,
            retrieval,
        }
    }

    /// Answer `question` from the catalog with the default retrieval pass.
    pub async fn answer(&self, question: &str) -> Result<String> {
        let hits = self
            .store
            .search(
                &self.cache,
                question,
                self.retrieval.max_results,
                self.retrieval.max_distance,
            )
            .await?;

        self.grounded_completion(question, &hits, self.retrieval.max_results)
            .await
    }

    /// Answer `question` with the widened escalation pass.
    pub async fn answer_escalated(&self, question: &str) -> Result<String> {
        let hits = self
            .store
            .search_escalated(
                &self.cache,
                question,
                self.retrieval.max_results,
                self.retrieval.max_distance,
                self.retrieval.escalation_passes,
            )
            .await?;

        let widened = self.retrieval.max_results * self.retrieval.escalation_passes;
        self.grounded_completion(question, &hits, widened).await
    }

    /// Close the underlying database pools.
    pub async fn close(&self) {
        self.cache.close().await;
        self.store.close().await;
    }

    async fn grounded_completion(
        &self,
        question: &str,
        hits: &[crate::models::RetrievalHit],
        max_results: usize,
    ) -> Result<String> {
        let prompt = build_prompt(question, hits, max_results);
        let messages = [
            ChatMessage::system(GROUNDED_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        self.chat.complete(&messages).await
    }
}

// ============ Orchestrator ============

pub struct Agent {
    chat: Arc<dyn ChatModel>,
    pipeline: RagPipeline,
}

impl Agent {
    pub fn new(chat: Arc<dyn ChatModel>, pipeline: RagPipeline) -> Self {
        Self { chat, pipeline }
    }

    /// Release the context resources this agent took ownership of.
    pub async fn shutdown(self) {
        self.pipeline.close().await;
    }

    /// Run one full question through the conversation state machine and
    /// return the finished conversation; its last message is the answer.
    pub async fn ask(&self, question: &str) -> Result<Conversation> {
        let mut conversation = Conversation::new(SYSTEM_PROMPT, question);

        let reply = self.chat.complete(conversation.messages()).await?;

        let Some(call) = protocol::first_tool_call(&reply, TOOL_NAME) else {
            // No tool requested; the first reply is the final answer.
            conversation.push_assistant(reply);
            return Ok(conversation);
        };

        tracing::debug!(argument = %call.argument, "tool call detected");
        conversation.push_assistant(reply);
        let before_tool = conversation.mark();

        let result = self.execute_tool(&call.argument, false).await;
        conversation.push_user(tool_result_turn(&call.argument, &result, false));

        let reply = self.chat.complete(conversation.messages()).await?;
        conversation.push_assistant(&reply);
        let answer = repair_reply(&reply, &call.argument);
        conversation.replace_last_assistant(&answer);

        match self.validate(question, &answer).await {
            Ok(Verdict::Accepted) => {}
            Err(e) => {
                // Fail open: a broken judge never blocks the answer.
                tracing::warn!(error = %e, "validation unavailable, keeping answer");
            }
            Ok(Verdict::NeedsEscalation) => {
                tracing::debug!("answer rejected by judge, escalating retrieval");
                conversation.rewind(before_tool);

                let result = self.execute_tool(&call.argument, true).await;
                conversation.push_user(tool_result_turn(&call.argument, &result, true));

                let reply = self.chat.complete(conversation.messages()).await?;
                conversation.push_assistant(&reply);
                conversation.replace_last_assistant(repair_reply(&reply, &call.argument));
                // Final unconditionally: at most one retry, no second verdict.
            }
        }

        Ok(conversation)
    }

    /// Run the retrieval tool, absorbing faults into fixed result strings so
    /// the conversation always proceeds.
    async fn execute_tool(&self, argument: &str, escalated: bool) -> String {
        let outcome = if escalated {
            self.pipeline.answer_escalated(argument).await
        } else {
            self.pipeline.answer(argument).await
        };

        match outcome.map_err(|e| Error::Tool(e.to_string())) {
            Ok(result) if result.trim().is_empty() => EMPTY_RESULT.to_string(),
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, escalated, "recovering with fixed tool result");
                TOOL_ERROR_RESULT.to_string()
            }
        }
    }

    /// Stateless judge call: fresh conversation, fenced TRUE/FALSE verdict.
    async fn validate(&self, question: &str, answer: &str) -> Result<Verdict> {
        let messages = [ChatMessage::user(judge_prompt(question, answer))];
        let reply = self.chat.complete(&messages).await?;
        protocol::parse_verdict(&reply)
    }
}

/// Run the whole orchestrator under the caller-level backoff policy.
///
/// Only rate-limit-class faults are retried, with exponential backoff plus
/// jitter, and each retry repeats the run from scratch — a failure deep
/// inside a run is never resumed.
pub async fn ask_with_backoff(
    agent: &Agent,
    question: &str,
    policy: &BackoffConfig,
) -> Result<Conversation> {
    let mut attempt: u32 = 0;
    loop {
        match agent.ask(question).await {
            Ok(conversation) => return Ok(conversation),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let base = Duration::from_secs(1 << (attempt - 1).min(5));
                let jitter = Duration::from_millis(jitter_ms(policy.jitter_ms));
                tracing::warn!(error = %e, attempt, "rate-limited, retrying whole run");
                tokio::time::sleep(base + jitter).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn jitter_ms(max: u64) -> u64 {
    use rand::Rng;
    if max == 0 {
        return 0;
    }
    rand::rng().random_range(0..max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_starts_with_single_system_message() {
        let conversation = Conversation::new("sistema", "pregunta");
        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
    }

    #[test]
    fn test_rewind_discards_after_mark() {
        let mut conversation = Conversation::new("s", "u");
        conversation.push_assistant("llamada a herramienta");
        let mark = conversation.mark();
        conversation.push_user("resultado");
        conversation.push_assistant("respuesta mala");
        conversation.rewind(mark);
        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.last_content(), "llamada a herramienta");
    }

    #[test]
    fn test_replace_last_assistant() {
        let mut conversation = Conversation::new("s", "u");
        conversation.push_assistant("borrador");
        conversation.replace_last_assistant("final");
        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.last_content(), "final");

        // Without a trailing assistant turn, it appends instead.
        let mut conversation = Conversation::new("s", "u");
        conversation.replace_last_assistant("respuesta");
        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.last_content(), "respuesta");
    }

    #[test]
    fn test_tool_result_turn_shape() {
        let plain = tool_result_turn("viaje a Roma", "vuelo y hotel", false);
        assert_eq!(
            plain,
            "```\nVIAJES(\"viaje a Roma\") # resultado: vuelo y hotel\n```"
        );
        let escalated = tool_result_turn("viaje a Roma", "vuelo y hotel", true);
        assert!(escalated.contains("# resultado mejorado:"));
    }

    #[test]
    fn test_result_turn_does_not_reparse_as_call() {
        let turn = tool_result_turn("viaje a Roma", "vuelo y hotel", false);
        assert!(protocol::first_tool_call(&turn, TOOL_NAME).is_none());
    }

    #[test]
    fn test_repair_reply_passthrough_and_truncation() {
        assert_eq!(repair_reply("respuesta limpia", "x"), "respuesta limpia");

        let residual = "Resumen del viaje.\n```\nVIAJES(\"más datos\")\n```";
        assert_eq!(repair_reply(residual, "x"), "Resumen del viaje.");

        let only_call = "```\nVIAJES(\"más datos\")\n```";
        assert_eq!(repair_reply(only_call, "Roma"), fallback_answer("Roma"));
        assert!(repair_reply(only_call, "Roma").contains("'Roma'"));
    }

    #[test]
    fn test_system_prompt_matches_protocol_grammar() {
        // The advertised syntax must parse under the v1 grammar.
        let example = "```\nVIAJES(\"pregunta\")\n```";
        assert!(SYSTEM_PROMPT.contains(example));
        let call = protocol::first_tool_call(SYSTEM_PROMPT, TOOL_NAME).unwrap();
        assert_eq!(call.argument, "pregunta");
    }

    #[test]
    fn test_judge_prompt_embeds_both_sides() {
        let prompt = judge_prompt("¿pregunta?", "una respuesta");
        assert!(prompt.contains("¿pregunta?"));
        assert!(prompt.contains("una respuesta"));
        assert!(prompt.contains("TRUE"));
        assert!(prompt.contains("FALSE"));
    }
}
