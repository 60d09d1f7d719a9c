//! Oracle backed by two Langbase pipes.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AncestorContext, Decision, DecisionPayload, Oracle, OracleResponse};
use crate::config::Config;
use crate::error::{LangbaseResult, OracleResult};
use crate::extract::extract_json_from_completion;
use crate::langbase::{LangbaseClient, Message, PipeRequest};
use crate::prompts::{generation_prompt, DECISION_PROMPT};
use crate::tree::{Node, Thought, ThoughtDraft};

/// Generation pipe output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationPayload {
    Wrapped { thoughts: Vec<ThoughtDraft> },
    Bare(Vec<ThoughtDraft>),
}

impl GenerationPayload {
    fn into_drafts(self) -> Vec<ThoughtDraft> {
        match self {
            GenerationPayload::Wrapped { thoughts } | GenerationPayload::Bare(thoughts) => thoughts,
        }
    }
}

/// [`Oracle`] over the generation and decision pipes.
#[derive(Clone)]
pub struct LangbaseOracle {
    client: LangbaseClient,
    generation_pipe: String,
    decision_pipe: String,
    model: String,
    num_thoughts: usize,
}

impl LangbaseOracle {
    pub fn new(client: LangbaseClient, config: &Config) -> Self {
        Self {
            client,
            generation_pipe: config.pipes.generation.clone(),
            decision_pipe: config.pipes.decision.clone(),
            model: config.langbase.model.clone(),
            num_thoughts: config.search.num_thoughts,
        }
    }

    /// Upsert both pipes with their system prompts.
    pub async fn ensure_pipes(&self) -> LangbaseResult<()> {
        self.client
            .ensure_pipe(
                &self.generation_pipe,
                "Tree-of-thoughts thought generation",
                &self.model,
                &generation_prompt(self.num_thoughts),
            )
            .await?;
        self.client
            .ensure_pipe(
                &self.decision_pipe,
                "Tree-of-thoughts decision",
                &self.model,
                DECISION_PROMPT,
            )
            .await
    }

    fn build_generation_messages(
        &self,
        sub_problem: &str,
        context: &AncestorContext,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(generation_prompt(self.num_thoughts))];

        let mut prompt = String::new();
        push_context(&mut prompt, context);
        prompt.push_str(&format!("Current sub-problem:\n{}\n", sub_problem));
        messages.push(Message::user(prompt));
        messages
    }

    fn build_decision_messages(
        &self,
        node: &Node,
        thoughts: &[Thought],
        context: &AncestorContext,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(DECISION_PROMPT)];

        let mut prompt = String::new();
        push_context(&mut prompt, context);
        prompt.push_str(&format!(
            "Current sub-problem (node {}):\n{}\n\n",
            node.id, node.sub_problem
        ));

        if thoughts.is_empty() {
            prompt.push_str("Candidate thoughts: none were generated.\n");
        } else {
            prompt.push_str("Candidate thoughts:\n");
            for t in thoughts {
                prompt.push_str(&format!(
                    "- [{}] (score {:.2}) {}\n",
                    t.thought_id, t.evaluation_score, t.description
                ));
                if !t.evaluation_justification.is_empty() {
                    prompt.push_str(&format!("  justification: {}\n", t.evaluation_justification));
                }
            }
        }
        messages.push(Message::user(prompt));
        messages
    }
}

fn push_context(prompt: &mut String, context: &AncestorContext) {
    if !context.ancestors.is_empty() {
        prompt.push_str("Reasoning path so far:\n");
        for (i, step) in context.ancestors.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, step));
        }
        prompt.push('\n');
    }
    if !context.explored.is_empty() {
        prompt.push_str("Already explored from here (did not lead to a solution):\n");
        for step in &context.explored {
            prompt.push_str(&format!("- {}\n", step));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Depth: {} of at most {}\n\n",
        context.depth, context.max_depth
    ));
}

/// Parse a generation completion, falling back to raw text.
pub(crate) fn parse_generation(completion: &str) -> OracleResponse<Vec<ThoughtDraft>> {
    let parsed = extract_json_from_completion(completion).and_then(|json| {
        serde_json::from_str::<GenerationPayload>(json).map_err(|e| e.to_string())
    });

    match parsed {
        Ok(payload) => OracleResponse::Structured(payload.into_drafts()),
        Err(e) => {
            warn!(
                error = %e,
                completion_preview = %completion.chars().take(200).collect::<String>(),
                "Generation output is not structured, passing raw text on"
            );
            OracleResponse::RawText(completion.to_string())
        }
    }
}

/// Parse a decision completion. Well-formed JSON with an unknown action is a
/// protocol error; anything that is not JSON comes back as raw text.
pub(crate) fn parse_decision(completion: &str) -> OracleResult<OracleResponse<Decision>> {
    let payload = extract_json_from_completion(completion)
        .ok()
        .and_then(|json| serde_json::from_str::<DecisionPayload>(json).ok());

    match payload {
        Some(payload) => Ok(OracleResponse::Structured(Decision::try_from(payload)?)),
        None => {
            warn!(
                completion_preview = %completion.chars().take(200).collect::<String>(),
                "Decision output is not structured, passing raw text on"
            );
            Ok(OracleResponse::RawText(completion.to_string()))
        }
    }
}

#[async_trait]
impl Oracle for LangbaseOracle {
    async fn generate(
        &self,
        sub_problem: &str,
        context: &AncestorContext,
    ) -> OracleResult<OracleResponse<Vec<ThoughtDraft>>> {
        let messages = self.build_generation_messages(sub_problem, context);
        let request = PipeRequest::new(&self.generation_pipe, messages);
        let response = self.client.call_pipe(request).await?;

        debug!(
            pipe = %self.generation_pipe,
            completion_len = response.completion.len(),
            "Generation completion received"
        );
        Ok(parse_generation(&response.completion))
    }

    async fn decide(
        &self,
        node: &Node,
        thoughts: &[Thought],
        context: &AncestorContext,
    ) -> OracleResult<OracleResponse<Decision>> {
        let messages = self.build_decision_messages(node, thoughts, context);
        let request = PipeRequest::new(&self.decision_pipe, messages).with_variable("node_id", &node.id);
        let response = self.client.call_pipe(request).await?;

        debug!(
            pipe = %self.decision_pipe,
            node_id = %node.id,
            "Decision completion received"
        );
        parse_decision(&response.completion)
    }
}
