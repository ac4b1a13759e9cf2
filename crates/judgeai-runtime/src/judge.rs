//! The semantic judge.
//!
//! # Evaluation flow
//! 1. Exact-match shortcut (no provider call)
//! 2. Verdict cache lookup
//! 3. Circuit breaker and token budget checks
//! 4. Provider call with timeout and retry
//! 5. Verdict parsing and schema validation (`judgeai-core`)
//! 6. Metadata merge, caller keys first

use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use judgeai_core::{
    is_exact_match, keys, merge_metadata, parse_verdict, DriftResult, EvaluationPair, Metadata,
    PromptTemplate, Verdict, JUDGE_SYSTEM_PROMPT,
};

use crate::cache::{CacheKey, CachedVerdict, VerdictCache};
use crate::config::JudgeConfig;
use crate::providers::{
    ChatMessage, LlmProvider, ProviderError, ProviderRegistry, TokenUsage,
};
use crate::resilience::{with_retry, BudgetTracker, CircuitBreaker, LlmUsage, RetryPolicy};
use crate::RuntimeError;

/// Where a verdict came from.
enum Source {
    ExactMatch,
    Cache,
    Provider { usage: TokenUsage, latency_ms: u64 },
}

/// LLM-as-a-judge client scoring semantic alignment of text pairs.
///
/// ```rust,ignore
/// use judgeai_runtime::SemanticJudge;
///
/// let judge = SemanticJudge::new("gpt-4o-mini", 0.0)?;
/// let result = judge
///     .evaluate(
///         "The machine learning model achieved 95% accuracy on the test dataset",
///         "The ML model reached 95% test accuracy",
///         None,
///     )
///     .await?;
/// println!("score {:.3}, drift {:.3}", result.score, result.drift());
/// ```
pub struct SemanticJudge {
    provider: Arc<dyn LlmProvider>,
    config: JudgeConfig,
    model: String,
    template: PromptTemplate,
    cache: Option<VerdictCache>,
    circuit_breaker: CircuitBreaker,
    budget: BudgetTracker,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SemanticJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticJudge")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.config.temperature)
            .finish()
    }
}

impl SemanticJudge {
    /// Create a judge for `model` at `temperature`.
    ///
    /// Everything else comes from `JUDGEAI_*` environment variables or
    /// defaults; the arguments take precedence over the environment.
    pub fn new(model: impl Into<String>, temperature: f32) -> Result<Self, RuntimeError> {
        let mut config = JudgeConfig::from_env()?;
        config.model = Some(model.into());
        config.temperature = temperature;
        Self::from_config(config)
    }

    /// Create a judge from a full configuration.
    pub fn from_config(config: JudgeConfig) -> Result<Self, RuntimeError> {
        Self::builder().config(config).build()
    }

    /// Start building a judge.
    pub fn builder() -> SemanticJudgeBuilder {
        SemanticJudgeBuilder::new()
    }

    /// Judge how well `actual` preserves the meaning of `expected`.
    ///
    /// `metadata` is copied into the result untouched; runtime entries
    /// (`model`, `tokens_used`, ...) are added under keys the caller
    /// did not use.
    pub async fn evaluate(
        &self,
        actual: &str,
        expected: &str,
        metadata: Option<Metadata>,
    ) -> Result<DriftResult, RuntimeError> {
        let (verdict, source) = self.judge(actual, expected).await?;

        let runtime = self.runtime_metadata(&source);
        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            score = verdict.score,
            "Evaluation complete"
        );

        Ok(DriftResult::new(
            verdict.score,
            verdict.reasoning,
            actual,
            expected,
            merge_metadata(metadata, runtime),
        ))
    }

    /// Evaluate many pairs. Results keep input order.
    ///
    /// Up to `config.concurrency` pairs are in flight at once. The first
    /// error aborts the batch.
    pub async fn batch_evaluate<I, P>(&self, pairs: I) -> Result<Vec<DriftResult>, RuntimeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<EvaluationPair>,
    {
        let pairs: Vec<EvaluationPair> = pairs.into_iter().map(Into::into).collect();
        tracing::info!(
            pairs = pairs.len(),
            concurrency = self.config.concurrency,
            "Starting batch evaluation"
        );

        futures::stream::iter(pairs)
            .map(|pair| self.evaluate_pair(pair))
            .buffered(self.config.concurrency)
            .try_collect()
            .await
    }

    /// Evaluate many pairs, keeping every outcome. Results keep input order.
    pub async fn batch_evaluate_settled<I, P>(
        &self,
        pairs: I,
    ) -> Vec<Result<DriftResult, RuntimeError>>
    where
        I: IntoIterator<Item = P>,
        P: Into<EvaluationPair>,
    {
        futures::stream::iter(pairs.into_iter().map(Into::into))
            .map(|pair| self.evaluate_pair(pair))
            .buffered(self.config.concurrency)
            .collect()
            .await
    }

    async fn evaluate_pair(&self, pair: EvaluationPair) -> Result<DriftResult, RuntimeError> {
        let EvaluationPair {
            actual,
            expected,
            metadata,
        } = pair;
        self.evaluate(&actual, &expected, metadata).await
    }

    async fn judge(&self, actual: &str, expected: &str) -> Result<(Verdict, Source), RuntimeError> {
        if self.config.short_circuit_exact && is_exact_match(actual, expected) {
            self.budget.record_exact_match();
            return Ok((Verdict::exact_match(), Source::ExactMatch));
        }

        let user_prompt = self.template.render(actual, expected);
        let key = CacheKey::new(
            self.provider.name(),
            &self.model,
            self.config.temperature,
            JUDGE_SYSTEM_PROMPT,
            &user_prompt,
        );

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(model = %hit.model, "Verdict cache hit");
                self.budget.record_cache_hit();
                return Ok((hit.verdict, Source::Cache));
            }
        }

        let provider_name = self.provider.name();
        if self.circuit_breaker.is_open(provider_name) {
            tracing::warn!(provider = provider_name, "Circuit open, refusing call");
            return Err(RuntimeError::CircuitOpen(provider_name.to_string()));
        }

        let estimated = u64::from(self.provider.estimate_tokens(JUDGE_SYSTEM_PROMPT))
            + u64::from(self.provider.estimate_tokens(&user_prompt))
            + u64::from(self.config.max_tokens);
        // Held until the call settles; dropped (released) on failure or cancellation.
        let Some(reservation) = self.budget.reserve(estimated) else {
            tracing::warn!(estimated, "Token budget exceeded");
            return Err(RuntimeError::BudgetExceeded {
                needed: estimated,
                remaining: self.budget.remaining().unwrap_or(0),
            });
        };

        let messages = vec![
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ];
        let completion = self.config.completion_config(&self.model);

        let provider = self.provider.as_ref();
        let completion = &completion;
        let timeout = completion.timeout;

        let started = Instant::now();
        let outcome = with_retry(&self.retry, provider_name, move || {
            let messages = messages.clone();
            async move {
                match tokio::time::timeout(timeout, provider.complete(messages, completion)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(timeout)),
                }
            }
        })
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(response) => {
                self.circuit_breaker.record_success(provider_name);
                response
            }
            Err(e) => {
                tracing::warn!(provider = provider_name, error = %e, "Provider call failed");
                self.circuit_breaker.record_failure(provider_name);
                return Err(e.into());
            }
        };

        reservation.settle(&response.usage, &response.model);

        let verdict = parse_verdict(&response.content).map_err(|e| {
            tracing::warn!(error = %e, "Judge returned an unusable verdict");
            e
        })?;

        if let Some(cache) = &self.cache {
            cache
                .insert(
                    key,
                    CachedVerdict {
                        verdict: verdict.clone(),
                        model: response.model.clone(),
                    },
                )
                .await;
        }

        Ok((
            verdict,
            Source::Provider {
                usage: response.usage,
                latency_ms,
            },
        ))
    }

    fn runtime_metadata(&self, source: &Source) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(keys::MODEL.to_string(), json!(self.model));
        meta.insert(keys::PROVIDER.to_string(), json!(self.provider.name()));
        // f32 → f64 widening prints 0.3 as 0.30000001192092896.
        let temperature = (f64::from(self.config.temperature) * 1000.0).round() / 1000.0;
        meta.insert(keys::TEMPERATURE.to_string(), json!(temperature));

        let (tokens, prompt, completion, latency, cached, exact) = match source {
            Source::ExactMatch => (0, 0, 0, 0, false, true),
            Source::Cache => (0, 0, 0, 0, true, false),
            Source::Provider { usage, latency_ms } => (
                usage.total(),
                usage.prompt_tokens,
                usage.completion_tokens,
                *latency_ms,
                false,
                false,
            ),
        };
        meta.insert(keys::TOKENS_USED.to_string(), json!(tokens));
        meta.insert(keys::PROMPT_TOKENS.to_string(), json!(prompt));
        meta.insert(keys::COMPLETION_TOKENS.to_string(), json!(completion));
        meta.insert(keys::LATENCY_MS.to_string(), json!(latency));
        meta.insert(keys::CACHED.to_string(), json!(cached));
        meta.insert(keys::EXACT_MATCH.to_string(), json!(exact));
        meta
    }

    /// Accumulated usage across every evaluation of this judge.
    pub fn usage(&self) -> LlmUsage {
        self.budget.get_usage()
    }

    /// Reset usage counters and the token budget.
    pub fn reset_usage(&self) {
        self.budget.reset();
    }

    /// Drop every cached verdict.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Model sent to the provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Whether the provider reports itself usable.
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }
}

/// Builder for [`SemanticJudge`].
pub struct SemanticJudgeBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    registry: Option<ProviderRegistry>,
    config: JudgeConfig,
    template: Option<PromptTemplate>,
    retry: Option<RetryPolicy>,
}

impl SemanticJudgeBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            registry: None,
            config: JudgeConfig::default(),
            template: None,
            retry: None,
        }
    }

    /// Use this provider instead of creating one from the registry.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Registry used to create the provider named in the config.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: JudgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Custom user prompt template; overrides `config.prompt_template`.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Retry policy; defaults to `config.max_retries` with standard delays.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<SemanticJudge, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(ProviderRegistry::with_defaults);

        let provider = match self.provider {
            Some(provider) => provider,
            None => registry.create(&config.provider, &config.provider_json())?,
        };

        let model = match &config.model {
            Some(model) => model.clone(),
            None => registry
                .default_model(&config.provider)
                .ok_or_else(|| {
                    RuntimeError::Provider(ProviderError::NotConfigured(format!(
                        "No model configured and provider '{}' has no default",
                        config.provider
                    )))
                })?
                .to_string(),
        };

        let template = match (self.template, &config.prompt_template) {
            (Some(template), _) => template,
            (None, Some(raw)) => PromptTemplate::new(raw.clone())?,
            (None, None) => PromptTemplate::default(),
        };

        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::new(config.max_retries));

        tracing::info!(
            provider = provider.name(),
            model = %model,
            temperature = config.temperature,
            "Semantic judge ready"
        );

        Ok(SemanticJudge {
            cache: VerdictCache::from_config(&config.cache),
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            budget: BudgetTracker::new(config.token_budget),
            provider,
            config,
            model,
            template,
            retry,
        })
    }
}

impl Default for SemanticJudgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, CompletionResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays scripted responses and counts calls.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: String,
        calls: AtomicUsize,
        last_user_prompt: Mutex<Option<String>>,
    }

    impl ScriptedProvider {
        fn always(content: &str) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: content.to_string(),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            })
        }

        fn script(responses: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                fallback: r#"{"score": 0.5, "reasoning": "fallback"}"#.to_string(),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_prompt.lock() = messages.last().map(|m| m.content.clone());

            let next = self.responses.lock().pop_front();
            let content = match next {
                Some(Ok(content)) => content,
                Some(Err(e)) => return Err(e),
                None => self.fallback.clone(),
            };

            Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 80,
                    completion_tokens: 20,
                    ..Default::default()
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Sleeps before answering, reports 500 tokens per call and
    /// estimates 100 tokens per message.
    struct SlowProvider {
        delay: Duration,
        jitter: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl SlowProvider {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                jitter: false,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn jittered(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                jitter: true,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                jitter: false,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = if self.jitter {
                let spread = messages.last().map_or(0, |m| m.content.len() % 4) as u32;
                self.delay * (spread + 1)
            } else {
                self.delay
            };
            tokio::time::sleep(delay).await;

            if self.fail {
                return Err(ProviderError::AuthError);
            }
            Ok(CompletionResponse {
                content: r#"{"score": 0.5, "reasoning": "slow"}"#.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 400,
                    completion_tokens: 100,
                    ..Default::default()
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn estimate_tokens(&self, _text: &str) -> u32 {
            100
        }
    }

    fn judge_with(provider: Arc<dyn LlmProvider>, config: JudgeConfig) -> SemanticJudge {
        SemanticJudge::builder()
            .provider(provider)
            .config(JudgeConfig {
                model: Some("gpt-4o-mini".to_string()),
                ..config
            })
            .retry_policy(RetryPolicy {
                max_retries: 1,
                min_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_evaluate_returns_parsed_verdict() {
        let provider = ScriptedProvider::always(r#"{"score": 0.93, "reasoning": "Paraphrase."}"#);
        let judge = judge_with(provider.clone(), JudgeConfig::default());

        let result = judge
            .evaluate(
                "The machine learning model achieved 95% accuracy on the test dataset",
                "The ML model reached 95% test accuracy",
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.score, 0.93);
        assert_eq!(result.reasoning, "Paraphrase.");
        assert_eq!(result.tokens_used(), Some(100));
        assert_eq!(result.metadata["model"], json!("gpt-4o-mini"));
        assert_eq!(result.metadata["provider"], json!("scripted"));
        assert_eq!(result.expected, "The ML model reached 95% test accuracy");
        assert_eq!(provider.calls(), 1);

        let prompt = provider.last_user_prompt.lock().clone().unwrap();
        assert!(prompt.contains("95% test accuracy"));
    }

    #[tokio::test]
    async fn test_exact_match_skips_provider() {
        let provider = ScriptedProvider::always(r#"{"score": 0.1, "reasoning": "wrong"}"#);
        let judge = judge_with(provider.clone(), JudgeConfig::default());

        let result = judge
            .evaluate("The system works", "  The system   works ", None)
            .await
            .unwrap();

        assert_eq!(result.score, 1.0);
        assert_eq!(result.metadata["exact_match"], json!(true));
        assert_eq!(result.tokens_used(), Some(0));
        assert_eq!(provider.calls(), 0);
        assert_eq!(judge.usage().exact_matches, 1);
    }

    #[tokio::test]
    async fn test_exact_match_shortcut_can_be_disabled() {
        let provider = ScriptedProvider::always(r#"{"score": 0.98, "reasoning": "same"}"#);
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                short_circuit_exact: false,
                ..Default::default()
            },
        );

        let result = judge.evaluate("same", "same", None).await.unwrap();
        assert_eq!(result.score, 0.98);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_caller_metadata_preserved() {
        let provider = ScriptedProvider::always(r#"{"score": 0.8, "reasoning": "Synonyms."}"#);
        let judge = judge_with(provider, JudgeConfig::default());

        let mut metadata = Metadata::new();
        metadata.insert("task_type".to_string(), json!("classification"));
        metadata.insert("domain".to_string(), json!("medical"));
        metadata.insert("model".to_string(), json!("caller-label"));

        let result = judge
            .evaluate(
                "Patient exhibits fever and cough",
                "Patient has pyrexia and coughing symptoms",
                Some(metadata),
            )
            .await
            .unwrap();

        assert_eq!(result.metadata["task_type"], json!("classification"));
        assert_eq!(result.metadata["domain"], json!("medical"));
        assert_eq!(result.metadata["model"], json!("caller-label"));
        assert_eq!(result.metadata["provider"], json!("scripted"));
    }

    #[tokio::test]
    async fn test_second_identical_call_hits_cache() {
        let provider = ScriptedProvider::always(r#"{"score": 0.7, "reasoning": "close"}"#);
        let judge = judge_with(provider.clone(), JudgeConfig::default());

        let first = judge.evaluate("a b c", "x y z", None).await.unwrap();
        let second = judge.evaluate("a b c", "x y z", None).await.unwrap();

        assert!(!first.is_cached());
        assert!(second.is_cached());
        assert_eq!(second.score, 0.7);
        assert_eq!(second.tokens_used(), Some(0));
        assert_eq!(provider.calls(), 1);
        assert_eq!(judge.usage().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let provider = ScriptedProvider::always(r#"{"score": 0.7, "reasoning": "close"}"#);
        let mut config = JudgeConfig::default();
        config.cache.enabled = false;
        let judge = judge_with(provider.clone(), config);

        judge.evaluate("a", "b", None).await.unwrap();
        judge.evaluate("a", "b", None).await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_error() {
        let provider = ScriptedProvider::always("I think they are similar.");
        let judge = judge_with(provider, JudgeConfig::default());

        let err = judge.evaluate("a", "b", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Verdict(_)));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let provider = ScriptedProvider::script(vec![
            Err(ProviderError::HttpError("reset".to_string())),
            Ok(r#"{"score": 0.4, "reasoning": "partial"}"#.to_string()),
        ]);
        let judge = judge_with(provider.clone(), JudgeConfig::default());

        let result = judge.evaluate("a", "b", None).await.unwrap();
        assert_eq!(result.score, 0.4);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let provider = ScriptedProvider::script(vec![
            Err(ProviderError::AuthError),
            Err(ProviderError::AuthError),
        ]);
        let mut config = JudgeConfig::default();
        config.circuit_breaker.failure_threshold = 2;
        let judge = judge_with(provider.clone(), config);

        assert!(judge.evaluate("a", "b", None).await.is_err());
        assert!(judge.evaluate("c", "d", None).await.is_err());

        let err = judge.evaluate("e", "f", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::CircuitOpen(_)));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_budget_exceeded_before_call() {
        let provider = ScriptedProvider::always(r#"{"score": 0.5, "reasoning": "x"}"#);
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                token_budget: Some(10),
                ..Default::default()
            },
        );

        let err = judge.evaluate("a", "b", None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::BudgetExceeded { .. }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_batch_respects_token_budget() {
        // Each call reserves 100 + 100 + 300 = 500 and spends 500.
        let provider = SlowProvider::new(Duration::from_millis(50));
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                concurrency: 4,
                token_budget: Some(1000),
                ..Default::default()
            },
        );

        let results = judge
            .batch_evaluate_settled(vec![
                ("first actual", "first expected"),
                ("second actual", "second expected"),
                ("third actual", "third expected"),
                ("fourth actual", "fourth expected"),
            ])
            .await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let over_budget = results
            .iter()
            .filter(|r| matches!(r, Err(RuntimeError::BudgetExceeded { .. })))
            .count();

        assert_eq!(provider.calls(), 2);
        assert_eq!(ok, 2);
        assert_eq!(over_budget, 2);
        assert!(judge.usage().total_tokens <= 1000);
        assert_eq!(judge.budget.remaining(), Some(0));
    }

    #[tokio::test]
    async fn test_failed_call_releases_reservation() {
        let provider = SlowProvider::failing(Duration::from_millis(1));
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                token_budget: Some(600),
                ..Default::default()
            },
        );

        let err = judge.evaluate("a", "b", None).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(judge.budget.remaining(), Some(600));
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_reservation() {
        let provider = SlowProvider::new(Duration::from_secs(5));
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                token_budget: Some(600),
                ..Default::default()
            },
        );

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), judge.evaluate("a", "b", None)).await;
        assert!(cancelled.is_err());
        assert_eq!(provider.calls(), 1);
        assert_eq!(judge.budget.remaining(), Some(600));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = ScriptedProvider::script(vec![
            Ok(r#"{"score": 0.9, "reasoning": "one"}"#.to_string()),
            Ok(r#"{"score": 0.1, "reasoning": "two"}"#.to_string()),
            Ok(r#"{"score": 0.8, "reasoning": "three"}"#.to_string()),
        ]);
        let judge = judge_with(provider, JudgeConfig::default());

        let results = judge
            .batch_evaluate(vec![
                ("The system works correctly", "The system functions properly"),
                ("Error occurred during processing", "Processing completed successfully"),
                ("User authentication passed", "User login was successful"),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].actual, "The system works correctly");
        assert_eq!(results[0].score, 0.9);
        assert_eq!(results[1].score, 0.1);
        assert_eq!(results[2].expected, "User login was successful");
    }

    #[tokio::test]
    async fn test_concurrent_batch_preserves_order() {
        let provider = ScriptedProvider::always(r#"{"score": 0.5, "reasoning": "x"}"#);
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                concurrency: 4,
                ..Default::default()
            },
        );

        let pairs: Vec<(String, String)> = (0..10)
            .map(|i| (format!("actual {}", i), format!("expected {}", i)))
            .collect();
        let results = judge.batch_evaluate(pairs).await.unwrap();

        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.actual, format!("actual {}", i));
        }
        assert_eq!(provider.calls(), 10);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let provider = ScriptedProvider::always(r#"{"score": 0.5, "reasoning": "x"}"#);
        let judge = judge_with(provider.clone(), JudgeConfig::default());

        let results = judge
            .batch_evaluate(Vec::<EvaluationPair>::new())
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_fails_on_first_error() {
        let provider = ScriptedProvider::script(vec![
            Ok(r#"{"score": 0.5, "reasoning": "x"}"#.to_string()),
            Ok("not a verdict".to_string()),
        ]);
        let judge = judge_with(provider, JudgeConfig::default());

        let result = judge.batch_evaluate(vec![("a", "b"), ("c", "d"), ("e", "f")]).await;
        assert!(matches!(result, Err(RuntimeError::Verdict(_))));
    }

    #[tokio::test]
    async fn test_settled_batch_keeps_failures() {
        let provider = ScriptedProvider::script(vec![
            Ok("not a verdict".to_string()),
            Ok(r#"{"score": 0.6, "reasoning": "ok"}"#.to_string()),
        ]);
        let judge = judge_with(provider, JudgeConfig::default());

        let results = judge
            .batch_evaluate_settled(vec![("a", "b"), ("c", "d")])
            .await;
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap().score, 0.6);
    }

    #[tokio::test]
    async fn test_custom_template_from_config() {
        let provider = ScriptedProvider::always(r#"{"score": 0.5, "reasoning": "x"}"#);
        let judge = judge_with(
            provider.clone(),
            JudgeConfig {
                prompt_template: Some("Reference: {expected}\nCandidate: {actual}".to_string()),
                ..Default::default()
            },
        );

        judge.evaluate("cand", "ref", None).await.unwrap();
        let prompt = provider.last_user_prompt.lock().clone().unwrap();
        assert_eq!(prompt, "Reference: ref\nCandidate: cand");
    }

    #[test]
    fn test_invalid_template_rejected() {
        let provider = ScriptedProvider::always("{}");
        let result = SemanticJudge::builder()
            .provider(provider)
            .config(JudgeConfig {
                model: Some("m".to_string()),
                prompt_template: Some("no placeholders".to_string()),
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(RuntimeError::Prompt(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let provider = ScriptedProvider::always("{}");
        let result = SemanticJudge::builder()
            .provider(provider)
            .temperature(5.0)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_temperature_metadata_is_rounded() {
        let provider = ScriptedProvider::always("{}");
        let judge = SemanticJudge::builder()
            .provider(provider)
            .model("gpt-4o-mini")
            .temperature(0.3)
            .build()
            .unwrap();
        let meta = judge.runtime_metadata(&Source::Cache);
        assert_eq!(meta["temperature"], json!(0.3));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_batch_order_preserved_for_any_concurrency(
            concurrency in 1usize..6,
            count in 0usize..10,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let judge = judge_with(
                SlowProvider::jittered(Duration::from_millis(1)),
                JudgeConfig {
                    concurrency,
                    ..Default::default()
                },
            );

            let pairs: Vec<(String, String)> = (0..count)
                .map(|i| (format!("actual {}", i), format!("expected {}", "x".repeat(i))))
                .collect();
            let results = runtime.block_on(judge.batch_evaluate(pairs)).unwrap();

            prop_assert_eq!(results.len(), count);
            for (i, result) in results.iter().enumerate() {
                prop_assert_eq!(&result.actual, &format!("actual {}", i));
            }
        }
    }
}
