//! The conversational facade over the chat pipeline.
//!
//! An [`Agent`] owns one [`PipelineContext`] and one [`GenerateChatPipeline`]
//! built through the [`PipelineRegistry`]. It screens queries before they reach
//! the pipeline, keeps the conversation identity, and answers the auxiliary
//! questions (explain, clarify, rephrase) with plain LLM completions. Every
//! public entry point returns its failures as text.

use crate::cache::Cache;
use crate::chat::{BuiltPipeline, GenerateChatPipeline, Judge, PipelineKind, PipelineParts, PipelineRegistry};
use crate::config::{Config, SecurityLevel};
use crate::connectors::{CodeExecutor, DataConnector};
use crate::context::{
    ChatPipelineInput, CodeExecutionPipelineInput, Memory, MessageStore, PipelineContext, Role,
    Skill, SkillsManager, StoredMessage,
};
use crate::core::{ChatReply, OutputType};
use crate::errors::{ChatflowError, LlmError, Result};
use crate::llm::LlmClient;
use crate::pipeline::{NoOpObserver, PipelineObserver};
use crate::prompts::{parse_json_list, Prompt};
use crate::tracker::ExecutionTracker;
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

/// Fixed start of every agent-level error reply.
pub const AGENT_ERROR_PREAMBLE: &str =
    "Unfortunately, I was not able to get your answers, because of the following error:";

const MALICIOUS_QUERY_MESSAGE: &str = "The query contains references to io or os modules or b64decode method which can be used to execute or access system resources in unsafe ways.";

const MAX_CLARIFICATION_QUESTIONS: usize = 3;

static DANGEROUS_QUERY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"\b(os|io|chr|b64decode)\b|(\.os|\.io|'os'|'io'|"os"|"io"|chr\(|chr\)|chr |\(chr)"#)
        .ok()
});

/// Whether `query` mentions modules or builtins that give generated code
/// access to the host.
#[must_use]
pub fn is_malicious_query(query: &str) -> bool {
    DANGEROUS_QUERY
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(query))
}

/// A second opinion on whether a query is safe to answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityEvaluator: Send + Sync {
    /// Returns `true` when `query` should be refused.
    async fn evaluate(&self, query: &str) -> Result<bool>;
}

fn failure(action: &str, error: &ChatflowError) -> String {
    format!("Unfortunately, I was not able to {action}, because of the following error:\n\n{error}\n")
}

fn agent_error_reply(error: &ChatflowError) -> ChatReply {
    ChatReply::Error(format!("{AGENT_ERROR_PREAMBLE}\n\n{error}\n"))
}

struct History {
    store: Arc<dyn MessageStore>,
    user_id: String,
}

impl History {
    fn save(&self, role: Role, content: &str) {
        self.store
            .save(StoredMessage::new(self.user_id.clone(), role, content));
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn CodeExecutor>,
    data_sources: Vec<Arc<dyn DataConnector>>,
    config: Config,
    description: Option<String>,
    cache: Option<Arc<dyn Cache>>,
    skills: Vec<Skill>,
    judge: Option<Arc<dyn Judge>>,
    security: Option<Arc<dyn SecurityEvaluator>>,
    observer: Arc<dyn PipelineObserver>,
    tracker: Option<Arc<ExecutionTracker>>,
    history: Option<History>,
    registry: PipelineRegistry,
}

impl AgentBuilder {
    /// Binds a data source.
    #[must_use]
    pub fn data_source(mut self, source: Arc<dyn DataConnector>) -> Self {
        self.data_sources.push(source);
        self
    }

    /// Binds several data sources.
    #[must_use]
    pub fn data_sources(
        mut self,
        sources: impl IntoIterator<Item = Arc<dyn DataConnector>>,
    ) -> Self {
        self.data_sources.extend(sources);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Describes the agent at the top of every prompt.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the default in-memory cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers skills.
    #[must_use]
    pub fn skills(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.skills.extend(skills);
        self
    }

    /// Gates generated code through `judge`.
    #[must_use]
    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Asks `security` about every query before answering it.
    #[must_use]
    pub fn security(mut self, security: Arc<dyn SecurityEvaluator>) -> Self {
        self.security = Some(security);
        self
    }

    /// Sets the observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the tracker. Defaults to one configured from the config.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Persists the conversation of `user_id` in `store` and seeds memory
    /// from it.
    #[must_use]
    pub fn message_store(mut self, store: Arc<dyn MessageStore>, user_id: impl Into<String>) -> Self {
        self.history = Some(History {
            store,
            user_id: user_id.into(),
        });
        self
    }

    /// Uses `registry` to construct the chat pipeline.
    #[must_use]
    pub fn registry(mut self, registry: PipelineRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the agent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid configuration, duplicate skill
    /// names, or a registry without a chat pipeline.
    pub fn build(self) -> Result<Agent> {
        self.config.validate()?;

        let mut memory = Memory::new(self.config.memory_size);
        if let Some(description) = self.description {
            memory = memory.with_agent_description(description);
        }
        if let Some(history) = &self.history {
            let limit = match self.config.memory_size {
                0 => usize::MAX,
                size => size,
            };
            for message in history.store.list(&history.user_id, limit) {
                memory.add(message.content, message.role == Role::User);
            }
        }

        let mut skills = SkillsManager::new();
        skills.add_skills(self.skills)?;

        let mut context = PipelineContext::builder(self.llm, self.executor)
            .data_sources(self.data_sources)
            .config(self.config)
            .memory(memory)
            .skills(skills);
        if let Some(cache) = self.cache {
            context = context.cache(cache);
        }
        let context = Arc::new(context.build());

        let mut parts = PipelineParts::new(Arc::clone(&context));
        parts.observer = self.observer;
        parts.judge = self.judge;
        if let Some(tracker) = self.tracker {
            parts.tracker = tracker;
        }
        let BuiltPipeline::Chat(pipeline) = self.registry.build(PipelineKind::Chat, parts)? else {
            return Err(ChatflowError::InvalidConfig(
                "the chat constructor built a different pipeline".to_string(),
            ));
        };

        Ok(Agent {
            context,
            pipeline,
            security: self.security,
            history: self.history,
            conversation_id: RwLock::new(Uuid::new_v4()),
            last_prompt_id: RwLock::new(None),
        })
    }
}

/// A conversation with an LLM about a set of data sources.
pub struct Agent {
    context: Arc<PipelineContext>,
    pipeline: GenerateChatPipeline,
    security: Option<Arc<dyn SecurityEvaluator>>,
    history: Option<History>,
    conversation_id: RwLock<Uuid>,
    last_prompt_id: RwLock<Option<Uuid>>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("conversation_id", &*self.conversation_id.read())
            .field("pipeline", &self.pipeline)
            .field("security", &self.security.is_some())
            .field("history", &self.history.is_some())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Starts building an agent around the two required collaborators.
    #[must_use]
    pub fn builder(llm: Arc<dyn LlmClient>, executor: Arc<dyn CodeExecutor>) -> AgentBuilder {
        AgentBuilder {
            llm,
            executor,
            data_sources: Vec::new(),
            config: Config::default(),
            description: None,
            cache: None,
            skills: Vec::new(),
            judge: None,
            security: None,
            observer: Arc::new(NoOpObserver),
            tracker: None,
            history: None,
            registry: PipelineRegistry::with_defaults(),
        }
    }

    /// The shared pipeline context.
    #[must_use]
    pub const fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Identifier of the current conversation.
    #[must_use]
    pub fn conversation_id(&self) -> Uuid {
        *self.conversation_id.read()
    }

    /// Identifier of the last query sent to the pipeline.
    #[must_use]
    pub fn last_prompt_id(&self) -> Option<Uuid> {
        *self.last_prompt_id.read()
    }

    /// Message of the error that ended the last pipeline run.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.pipeline.last_error()
    }

    /// Collector identifier of the last published trace.
    #[must_use]
    pub fn last_query_log_id(&self) -> Option<String> {
        self.pipeline.last_log_id()
    }

    /// Code produced by the last generation, before any new run resets it.
    #[must_use]
    pub fn last_code_generated(&self) -> Option<String> {
        self.context.last_code_generated()
    }

    /// Code of the last run that passed cleaning. Cleared when a run fails.
    #[must_use]
    pub fn last_code_cleaned(&self) -> Option<String> {
        self.context.last_code_cleaned()
    }

    /// Code that produced the last answer.
    #[must_use]
    pub fn last_code_executed(&self) -> Option<String> {
        self.context.memory().last_code().map(ToString::to_string)
    }

    /// Answers `query`.
    pub async fn chat(&self, query: &str, output_type: Option<OutputType>) -> ChatReply {
        let prompt_id = self.assign_prompt_id();
        if let Err(error) = self.screen(query).await {
            tracing::warn!(prompt_id = %prompt_id, error = %error, "Query refused");
            return agent_error_reply(&error);
        }

        let input = ChatPipelineInput::new(query, self.conversation_id())
            .with_output_type(output_type)
            .with_prompt_id(prompt_id);
        let reply = self.pipeline.run(input).await;

        if let Some(history) = &self.history {
            history.save(Role::User, query);
            if let ChatReply::Answer(answer) = &reply {
                history.save(Role::Assistant, &answer.to_text());
            }
        }
        reply
    }

    /// Generates code for `query` without running it.
    pub async fn generate_code(&self, query: &str, output_type: Option<OutputType>) -> ChatReply {
        let prompt_id = self.assign_prompt_id();
        if let Err(error) = self.screen(query).await {
            tracing::warn!(prompt_id = %prompt_id, error = %error, "Query refused");
            return agent_error_reply(&error);
        }

        let input = ChatPipelineInput::new(query, self.conversation_id())
            .with_output_type(output_type)
            .with_prompt_id(prompt_id);
        self.pipeline.run_generate_code(input).await
    }

    /// Runs `code`, or the last cleaned code when `None`.
    pub async fn execute_code(&self, code: Option<&str>, output_type: Option<OutputType>) -> ChatReply {
        let Some(code) = code
            .map(ToString::to_string)
            .or_else(|| self.last_code_cleaned())
        else {
            return agent_error_reply(&ChatflowError::NoCodeFound(
                "no code was given and none has been generated yet".to_string(),
            ));
        };

        let prompt_id = self.assign_prompt_id();
        tracing::debug!(prompt_id = %prompt_id, "Code: {code}");
        let input = CodeExecutionPipelineInput::new(code, self.conversation_id())
            .with_output_type(output_type)
            .with_prompt_id(prompt_id);
        self.pipeline.run_execute_code(input).await
    }

    /// Explains, in plain language, the code behind the last answer.
    pub async fn explain(&self) -> String {
        let Some(code) = self.last_code_executed() else {
            return failure(
                "explain",
                &ChatflowError::NoCodeFound("no answer has been produced yet".to_string()),
            );
        };
        let prompt = Prompt::explain(&self.context, &code);
        match self.call_llm_with_prompt(&prompt).await {
            Ok(explanation) => {
                tracing::info!("Explanation: {explanation}");
                explanation
            }
            Err(error) => failure("explain", &error),
        }
    }

    /// Up to three questions that would make `query` unambiguous.
    ///
    /// # Errors
    ///
    /// Returns the LLM error, or `InvalidResponse` when no attempt produced a
    /// JSON list.
    pub async fn clarification_questions(&self, query: &str) -> Result<Vec<String>> {
        let prompt = Prompt::clarification_questions(&self.context, query);
        let answer = self.call_llm_with_prompt(&prompt).await?;
        tracing::info!("Clarification Questions: {answer}");

        let mut questions = parse_json_list(&answer).ok_or_else(|| {
            LlmError::InvalidResponse("clarification questions are not a JSON list".to_string())
        })?;
        questions.truncate(MAX_CLARIFICATION_QUESTIONS);
        Ok(questions)
    }

    /// Rewrites `query` so it yields a more precise answer.
    pub async fn rephrase_query(&self, query: &str) -> String {
        let prompt = Prompt::rephrase_query(&self.context, query);
        match self.call_llm_with_prompt(&prompt).await {
            Ok(rephrased) => {
                tracing::info!("Rephrased Response: {rephrased}");
                rephrased
            }
            Err(error) => failure("rephrase query", &error),
        }
    }

    /// Forgets the conversation and starts a new one.
    ///
    /// Persisted history is kept.
    pub fn start_new_conversation(&self) {
        self.context.memory_mut().clear();
        let conversation_id = Uuid::new_v4();
        *self.conversation_id.write() = conversation_id;
        tracing::debug!(conversation_id = %conversation_id, "Started a new conversation");
    }

    /// Adds a message to the conversation without running the pipeline.
    pub fn add_message(&self, message: &str, is_user: bool) {
        self.context.memory_mut().add(message, is_user);
        if let Some(history) = &self.history {
            let role = if is_user { Role::User } else { Role::Assistant };
            history.save(role, message);
        }
    }

    /// Registers more skills.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a name is already registered.
    pub fn add_skills(&self, skills: impl IntoIterator<Item = Skill>) -> Result<()> {
        self.context.skills_mut().add_skills(skills)
    }

    /// Completes `prompt`, retrying failed or invalid answers while error
    /// correction is enabled.
    ///
    /// At most `max_retries` attempts are made, and always at least one.
    ///
    /// # Errors
    ///
    /// Returns the last LLM error, or `InvalidResponse` when the last answer
    /// failed the prompt's validation.
    pub async fn call_llm_with_prompt(&self, prompt: &Prompt) -> Result<String> {
        let config = self.context.config();
        let attempts = config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            let error = match self.context.llm().complete(prompt).await {
                Ok(answer) if prompt.validate(&answer) => return Ok(answer),
                Ok(_) => ChatflowError::from(LlmError::InvalidResponse(
                    "Response validation failed!".to_string(),
                )),
                Err(error) => error,
            };

            if !config.use_error_correction_framework || attempt >= attempts {
                return Err(error);
            }
            tracing::warn!(attempt, max_attempts = attempts, error = %error, "LLM call failed, retrying");
            attempt += 1;
        }
    }

    fn assign_prompt_id(&self) -> Uuid {
        let prompt_id = Uuid::new_v4();
        *self.last_prompt_id.write() = Some(prompt_id);
        tracing::debug!(prompt_id = %prompt_id, "Prompt ID assigned");
        prompt_id
    }

    async fn screen(&self, query: &str) -> Result<()> {
        let level = self.context.config().security;
        if matches!(level, SecurityLevel::Standard | SecurityLevel::Advanced)
            && is_malicious_query(query)
        {
            return Err(ChatflowError::MaliciousQuery(MALICIOUS_QUERY_MESSAGE.to_string()));
        }

        if let Some(security) = &self.security {
            if security.evaluate(query).await? {
                return Err(ChatflowError::MaliciousQuery(
                    "Query can result in a malicious code".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InMemoryMessageStore;
    use crate::prompts::PromptKind;
    use crate::testing::{
        assert_answer, RecordingCollector, ScriptedExecutor, ScriptedLlm, StaticConnector,
        TestFixture, DEFAULT_CODE,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        llm: Arc<ScriptedLlm>,
        executor: Arc<ScriptedExecutor>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                llm: Arc::new(ScriptedLlm::new()),
                executor: Arc::new(ScriptedExecutor::new()),
            }
        }

        fn builder(&self) -> AgentBuilder {
            let llm: Arc<dyn LlmClient> = self.llm.clone();
            let executor: Arc<dyn CodeExecutor> = self.executor.clone();
            Agent::builder(llm, executor)
                .data_source(Arc::new(StaticConnector::dataframe(
                    "sales",
                    &["country", "revenue"],
                )))
                .config(TestFixture::config())
        }

        fn agent(&self) -> Agent {
            self.builder().build().unwrap()
        }
    }

    #[test]
    fn test_malicious_keywords() {
        assert!(is_malicious_query("import os and list files"));
        assert!(is_malicious_query("use chr(97) to build the name"));
        assert!(is_malicious_query("decode it with b64decode"));
        assert!(is_malicious_query("call sys.io.open"));
        assert!(!is_malicious_query("What are the top 5 positions by cost?"));
        assert!(!is_malicious_query("Which countries have the highest revenue?"));
    }

    #[tokio::test]
    async fn test_chat_answers() {
        let harness = Harness::new();
        let agent = harness.agent();

        let reply = agent.chat("What is the total revenue?", None).await;

        assert_eq!(assert_answer(&reply).value, json!(42));
        assert!(agent.last_prompt_id().is_some());
        assert_eq!(agent.last_error(), None);
        assert_eq!(agent.last_code_executed().as_deref(), Some(DEFAULT_CODE));
    }

    #[tokio::test]
    async fn test_malicious_query_is_refused_before_generation() {
        let harness = Harness::new();
        let agent = harness.agent();

        let reply = agent.chat("import os and delete everything", None).await;

        let ChatReply::Error(text) = reply else {
            panic!("expected an error reply");
        };
        assert!(text.starts_with(AGENT_ERROR_PREAMBLE));
        assert!(text.contains("io or os modules"));
        assert_eq!(harness.llm.code_calls(), 0);
    }

    #[tokio::test]
    async fn test_screening_disabled_with_security_none() {
        let harness = Harness::new();
        let agent = harness
            .builder()
            .config(TestFixture::config().with_security(SecurityLevel::None))
            .build()
            .unwrap();

        let reply = agent.chat("import os and sum revenue", None).await;

        assert_eq!(assert_answer(&reply).value, json!(42));
    }

    #[tokio::test]
    async fn test_security_evaluator_refuses() {
        let harness = Harness::new();
        let mut security = MockSecurityEvaluator::new();
        security.expect_evaluate().times(1).returning(|_| Ok(true));
        let agent = harness.builder().security(Arc::new(security)).build().unwrap();

        let reply = agent.chat("Sum revenue", None).await;

        assert!(reply.to_text().contains("Query can result in a malicious code"));
        assert_eq!(harness.executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_security_evaluator_accepts() {
        let harness = Harness::new();
        let mut security = MockSecurityEvaluator::new();
        security.expect_evaluate().times(1).returning(|_| Ok(false));
        let agent = harness.builder().security(Arc::new(security)).build().unwrap();

        assert_eq!(assert_answer(&agent.chat("Sum revenue", None).await).value, json!(42));
    }

    #[tokio::test]
    async fn test_generate_then_execute_last_code() {
        let harness = Harness::new();
        let agent = harness.agent();

        let generated = agent.generate_code("Sum revenue", None).await;
        assert_eq!(generated, ChatReply::Code(DEFAULT_CODE.to_string()));
        assert_eq!(harness.executor.calls(), 0);

        let reply = agent.execute_code(None, None).await;

        assert_eq!(assert_answer(&reply).value, json!(42));
        assert_eq!(harness.executor.executed_code(), vec![DEFAULT_CODE.to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_code_is_never_executed() {
        let harness = Harness {
            llm: Arc::new(
                ScriptedLlm::new().with_fallback_code("import subprocess\nsubprocess.run('rm -rf /')"),
            ),
            executor: Arc::new(ScriptedExecutor::new()),
        };
        let agent = harness.agent();

        let generated = agent.generate_code("Sum revenue", None).await;
        assert!(generated.is_error());
        assert!(agent.last_code_generated().is_some());
        assert_eq!(agent.last_code_cleaned(), None);

        let reply = agent.execute_code(None, None).await;

        assert!(reply.is_error());
        assert_eq!(harness.executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_generation_clears_cleaned_code() {
        let harness = Harness::new();
        let agent = harness
            .builder()
            .config(TestFixture::config().with_error_correction(false))
            .build()
            .unwrap();
        agent.generate_code("Sum revenue", None).await;
        assert_eq!(agent.last_code_cleaned().as_deref(), Some(DEFAULT_CODE));

        harness.llm.push_code("import subprocess\nsubprocess.run('ls')");
        let generated = agent.generate_code("List files", None).await;
        assert!(generated.is_error());

        assert_eq!(agent.last_code_cleaned(), None);
        assert!(agent.execute_code(None, None).await.is_error());
        assert_eq!(harness.executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_execute_without_code_fails() {
        let harness = Harness::new();
        let agent = harness.agent();

        let reply = agent.execute_code(None, None).await;

        assert!(reply.is_error());
        assert_eq!(harness.executor.calls(), 0);
    }

    #[tokio::test]
    async fn test_explain_uses_last_code() {
        let harness = Harness::new();
        let agent = harness.agent();
        agent.chat("Sum revenue", None).await;
        harness.llm.push_text("I added up the revenue column.");

        let explanation = agent.explain().await;

        assert_eq!(explanation, "I added up the revenue column.");
        let prompt = harness.llm.prompts().pop().unwrap();
        assert_eq!(prompt.kind, PromptKind::Explain);
        assert!(prompt.text.contains(DEFAULT_CODE));
    }

    #[tokio::test]
    async fn test_explain_before_any_answer() {
        let harness = Harness::new();
        let agent = harness.agent();

        let explanation = agent.explain().await;

        assert!(explanation.starts_with("Unfortunately, I was not able to explain"));
        assert_eq!(harness.llm.complete_calls(), 0);
    }

    #[tokio::test]
    async fn test_clarification_questions_are_capped() {
        let harness = Harness::new();
        let agent = harness.agent();
        harness
            .llm
            .push_text("```json\n[\"Which year?\", \"Which currency?\", \"Net or gross?\", \"Per region?\"]\n```");

        let questions = agent.clarification_questions("Show revenue").await.unwrap();

        assert_eq!(questions, vec!["Which year?", "Which currency?", "Net or gross?"]);
        let prompt = harness.llm.prompts().pop().unwrap();
        assert!(prompt.text.contains("### QUERY\n Show revenue"));
    }

    #[tokio::test]
    async fn test_invalid_answer_is_retried() {
        let harness = Harness::new();
        let agent = harness.agent();
        harness.llm.push_text("I would ask about the year.");
        harness.llm.push_text("[\"Which year?\"]");

        let questions = agent.clarification_questions("Show revenue").await.unwrap();

        assert_eq!(questions, vec!["Which year?"]);
        assert_eq!(harness.llm.complete_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_answer_without_correction() {
        let harness = Harness::new();
        let agent = harness
            .builder()
            .config(TestFixture::config().with_error_correction(false))
            .build()
            .unwrap();
        harness.llm.push_text("not a list");

        let err = agent.clarification_questions("Show revenue").await.unwrap_err();

        assert!(matches!(err, ChatflowError::Llm(LlmError::InvalidResponse(_))));
        assert_eq!(harness.llm.complete_calls(), 1);
    }

    #[tokio::test]
    async fn test_llm_attempts_are_bounded() {
        let harness = Harness::new();
        let agent = harness.agent();
        for _ in 0..5 {
            harness.llm.push_text_error(LlmError::Timeout(5).into());
        }

        let reply = agent.rephrase_query("revenue?").await;

        assert!(reply.starts_with("Unfortunately, I was not able to rephrase query"));
        assert!(reply.contains("timed out"));
        assert_eq!(harness.llm.complete_calls(), 3);
    }

    #[tokio::test]
    async fn test_rephrase_query() {
        let harness = Harness::new();
        let agent = harness.agent();
        harness.llm.push_text("What is the total revenue per country?");

        assert_eq!(
            agent.rephrase_query("revenue by country").await,
            "What is the total revenue per country?"
        );
    }

    #[tokio::test]
    async fn test_start_new_conversation() {
        let harness = Harness::new();
        let agent = harness.agent();
        agent.chat("Sum revenue", None).await;
        let before = agent.conversation_id();
        assert!(agent.context().memory().count() > 0);

        agent.start_new_conversation();

        assert_ne!(agent.conversation_id(), before);
        assert_eq!(agent.context().memory().count(), 0);
    }

    #[test]
    fn test_add_message_and_skills() {
        let harness = Harness::new();
        let agent = harness.agent();

        agent.add_message("Revenue is in EUR.", false);
        agent
            .add_skills([Skill::new("plot_salaries", "Plots salaries", "def plot_salaries(): ...")])
            .unwrap();

        assert_eq!(agent.context().memory().last().unwrap().role, Role::Assistant);
        assert!(agent.context().skills().skill_exists("plot_salaries"));
        assert!(agent
            .add_skills([Skill::new("plot_salaries", "again", "")])
            .is_err());
    }

    #[tokio::test]
    async fn test_message_store_seeds_and_records() {
        let harness = Harness::new();
        let store = Arc::new(InMemoryMessageStore::new());
        store.save(StoredMessage::new("alice", Role::User, "Earlier question"));
        store.save(StoredMessage::new("alice", Role::Assistant, "Earlier answer"));

        let agent = harness
            .builder()
            .message_store(store.clone(), "alice")
            .build()
            .unwrap();
        assert_eq!(agent.context().memory().count(), 2);

        agent.chat("Sum revenue", None).await;

        let history = store.list("alice", 10);
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].content, "Sum revenue");
        assert_eq!(history[3].content, "42");
        assert!(store.list("bob", 10).is_empty());
    }

    #[tokio::test]
    async fn test_last_query_log_id() {
        let harness = Harness::new();
        let collector = Arc::new(RecordingCollector::with_log_id("log-agent"));
        let agent = harness
            .builder()
            .tracker(Arc::new(ExecutionTracker::new().with_collector(collector.clone())))
            .build()
            .unwrap();

        agent.chat("Sum revenue", None).await;

        assert_eq!(agent.last_query_log_id().as_deref(), Some("log-agent"));
        assert_eq!(collector.submitted().len(), 1);
    }

    #[test]
    fn test_duplicate_skills_fail_build() {
        let harness = Harness::new();
        let skill = Skill::new("total", "Totals a column", "def total(): ...");

        let err = harness.builder().skills([skill.clone(), skill]).build().unwrap_err();

        assert!(matches!(err, ChatflowError::InvalidConfig(_)));
    }

    #[test]
    fn test_registry_without_chat_fails_build() {
        let harness = Harness::new();

        let err = harness
            .builder()
            .registry(PipelineRegistry::empty())
            .build()
            .unwrap_err();

        assert!(matches!(err, ChatflowError::InvalidConfig(_)));
    }
}
