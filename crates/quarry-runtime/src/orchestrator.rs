//! Tiered fallback orchestration.
//!
//! The orchestrator walks its providers in tier-then-priority order. For
//! each candidate it:
//! - short-circuits providers that are not ready (missing credentials)
//! - skips providers whose request budget is spent
//! - consults the health prober and skips providers below the tier threshold
//! - calls the provider through the retry wrapper
//! - appends exactly one attempt record
//!
//! It stops at the first success (or, for corroboration, once enough
//! independent providers have succeeded). Provider failures are data in the
//! ledger; `Err` is reserved for defects in the orchestrator itself.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use quarry_core::{
    AcquisitionRequest, AcquisitionResult, AttemptLedger, ConcurrencyMode, ConfigError,
    ConsistencyValidator, ConsistencyVerdict, EngineConfig, ErrorCode, Fingerprint, HealthSnapshot,
    LifecycleError, Outcome, ProviderDescriptor, ProviderId, RequestLifecycle, RetryPolicy, Tier,
    TierThresholds,
};

use crate::context::RequestContext;
use crate::providers::Provider;
use crate::resilience::{attempt_with_retry, BudgetTracker, HealthProber, Retried};

/// Reason recorded for race participants dropped after another provider won.
const LOST_RACE: &str = "lost race to a faster provider";

/// Errors from the orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Request lifecycle violated: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Orchestrator build failed: {0}")]
    Build(String),

    #[error("Provider '{0}' registered twice")]
    DuplicateProvider(ProviderId),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// How the orchestrator calls its providers.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorPolicy {
    pub mode: ConcurrencyMode,
    pub retry: RetryPolicy,

    /// Ceiling for one provider invocation, independent of the request deadline
    pub attempt_timeout: Duration,

    pub thresholds: TierThresholds,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::Sequential,
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(10),
            thresholds: TierThresholds::default(),
        }
    }
}

impl OrchestratorPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mode: config.mode,
            retry: config.retry.clone(),
            attempt_timeout: config.attempt_timeout,
            thresholds: config.health.thresholds,
        }
    }
}

/// Result of a corroborated acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorroboratedResult<T> {
    #[serde(flatten)]
    pub result: AcquisitionResult<T>,
    pub verdict: ConsistencyVerdict,
}

/// One row of [`FallbackOrchestrator::health_report`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthEntry {
    pub provider: ProviderId,
    pub tier: Tier,
    pub ready: bool,

    /// `None` for providers that are not ready; they are never probed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<HealthSnapshot>,
}

/// Mutable state of one acquisition.
struct Run<T> {
    ledger: AttemptLedger,
    lifecycle: RequestLifecycle,
    successes: Vec<(ProviderId, Vec<T>)>,
    cancelled: bool,
}

impl<T> Run<T> {
    fn new() -> Self {
        Self {
            ledger: AttemptLedger::new(),
            lifecycle: RequestLifecycle::new(),
            successes: Vec::new(),
            cancelled: false,
        }
    }

    fn conclude(mut self, trace_id: String) -> Result<AcquisitionResult<T>, RuntimeError> {
        if !self.successes.is_empty() {
            let (chosen, items) = self.successes.swap_remove(0);
            self.lifecycle.resolve(&chosen)?;
            return Ok(AcquisitionResult::resolved(chosen, items, self.ledger, trace_id));
        }
        if self.cancelled {
            self.lifecycle.cancel()?;
            Ok(AcquisitionResult::cancelled(self.ledger, trace_id))
        } else {
            self.lifecycle.exhaust()?;
            Ok(AcquisitionResult::exhausted(self.ledger, trace_id))
        }
    }
}

enum Preflight {
    Go,
    Skipped,
    Cancelled,
}

/// Walks tiered providers until one yields content.
///
/// # Architecture
/// - Providers sorted by tier once, at build time; priority within a tier is
///   registration order
/// - Health snapshots cached per provider in an injected [`HealthProber`]
/// - Retries, timeouts and budgets applied per provider call
/// - Every outcome, skip and cancellation appended to one [`AttemptLedger`]
pub struct FallbackOrchestrator<T: Send + 'static> {
    providers: Vec<Arc<dyn Provider<Item = T>>>,
    policy: OrchestratorPolicy,
    prober: HealthProber,
    budgets: BudgetTracker,
}

impl<T: Send + 'static> FallbackOrchestrator<T> {
    pub fn builder() -> FallbackOrchestratorBuilder<T> {
        FallbackOrchestratorBuilder::new()
    }

    pub fn policy(&self) -> &OrchestratorPolicy {
        &self.policy
    }

    pub fn prober(&self) -> &HealthProber {
        &self.prober
    }

    pub fn budgets(&self) -> &BudgetTracker {
        &self.budgets
    }

    /// Descriptors in try order.
    pub fn providers(&self) -> Vec<&ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    /// Acquire from the first provider that yields content.
    pub async fn acquire(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
    ) -> Result<AcquisitionResult<T>, RuntimeError> {
        let trace_id = trace_id_for(request);
        let span = tracing::info_span!("acquire", trace_id = %trace_id, query = %request.query);
        async {
            let run = self.run(request, ctx, 1).await?;
            let result = run.conclude(trace_id)?;
            log_result(&result);
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Acquire and judge the result with `validator`.
    ///
    /// Factual subjects keep going past the first success until the
    /// validator's required number of independent providers have succeeded
    /// or the tiers run out. Trend subjects stop at the first success.
    pub async fn acquire_corroborated(
        &self,
        request: &AcquisitionRequest,
        ctx: &RequestContext,
        validator: &ConsistencyValidator,
    ) -> Result<CorroboratedResult<T>, RuntimeError>
    where
        T: Fingerprint,
    {
        let trace_id = trace_id_for(request);
        let span = tracing::info_span!("acquire", trace_id = %trace_id, query = %request.query, corroborate = true);
        async {
            let goal = validator.sources_needed(&request.query);
            let run = self.run(request, ctx, goal).await?;
            let verdict = validator.validate(&request.query, &run.successes);
            tracing::info!(
                valid = verdict.valid,
                factual = verdict.is_factual,
                confidence = verdict.confidence,
                sources = run.successes.len(),
                "consistency verdict"
            );
            let result = run.conclude(trace_id)?;
            log_result(&result);
            Ok(CorroboratedResult { result, verdict })
        }
        .instrument(span)
        .await
    }

    /// Probe every ready provider through the health cache.
    pub async fn health_report(&self) -> Vec<HealthEntry> {
        let mut entries = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let descriptor = provider.descriptor();
            let ready = descriptor.is_ready();
            let snapshot = if ready {
                Some(self.prober.snapshot(&**provider).await)
            } else {
                None
            };
            entries.push(HealthEntry {
                provider: descriptor.id.clone(),
                tier: descriptor.tier,
                ready,
                snapshot,
            });
        }
        entries
    }

    fn candidates(&self, request: &AcquisitionRequest, run: &mut Run<T>) -> Vec<&dyn Provider<Item = T>> {
        let all = self.providers.iter().map(|p| &**p);
        match &request.pinned {
            None => all.collect(),
            Some(pinned) => {
                let found: Vec<&dyn Provider<Item = T>> =
                    all.filter(|p| &p.descriptor().id == pinned).collect();
                if found.is_empty() {
                    tracing::warn!(provider = %pinned, "pinned provider is not configured");
                    run.ledger.record_unknown_source(pinned);
                }
                found
            }
        }
    }

    async fn run(&self, request: &AcquisitionRequest, ctx: &RequestContext, goal: usize) -> Result<Run<T>, RuntimeError> {
        let mut run = Run::new();
        let candidates = self.candidates(request, &mut run);
        match self.policy.mode {
            ConcurrencyMode::Sequential => self.run_sequential(&candidates, request, ctx, goal, &mut run).await?,
            ConcurrencyMode::Race => self.run_race(&candidates, request, ctx, goal, &mut run).await?,
        }
        Ok(run)
    }

    /// Everything that happens to a provider before it is called.
    async fn preflight(
        &self,
        provider: &dyn Provider<Item = T>,
        ctx: &RequestContext,
        run: &mut Run<T>,
    ) -> Result<Preflight, RuntimeError> {
        let descriptor = provider.descriptor();
        let id = &descriptor.id;
        run.lifecycle.begin_probe(id)?;

        if !descriptor.is_ready() {
            let reason = provider.unavailable_reason().unwrap_or("missing credentials");
            tracing::info!(provider = %id, tier = %descriptor.tier, reason = %reason, "provider unavailable");
            run.ledger.record_unconfigured(id, reason);
            run.lifecycle.skip(id)?;
            return Ok(Preflight::Skipped);
        }

        if !self.budgets.has_capacity(id) {
            tracing::warn!(provider = %id, tier = %descriptor.tier, "request budget exhausted");
            run.ledger.record_budget_exhausted(id);
            run.lifecycle.skip(id)?;
            return Ok(Preflight::Skipped);
        }

        let snapshot = tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            snapshot = self.prober.snapshot(provider) => Some(snapshot),
        };
        let Some(snapshot) = snapshot else {
            run.ledger.record_cancelled_while_probing(id, ctx.reason());
            run.cancelled = true;
            return Ok(Preflight::Cancelled);
        };

        let threshold = self.policy.thresholds.for_tier(descriptor.tier);
        if !self.policy.thresholds.admits(descriptor.tier, snapshot.score) {
            tracing::warn!(
                provider = %id,
                tier = %descriptor.tier,
                score = snapshot.score,
                threshold,
                "skipping unhealthy provider"
            );
            run.ledger.record_unhealthy(id, snapshot.score, threshold);
            run.lifecycle.skip(id)?;
            return Ok(Preflight::Skipped);
        }

        // the earlier check only peeks; this charges the first call, and a
        // concurrent request may have taken the last slot in between
        if !self.budgets.try_acquire(id) {
            tracing::warn!(provider = %id, tier = %descriptor.tier, "request budget exhausted");
            run.ledger.record_budget_exhausted(id);
            run.lifecycle.skip(id)?;
            return Ok(Preflight::Skipped);
        }

        Ok(Preflight::Go)
    }

    /// Record a finished call.
    fn settle(&self, id: &ProviderId, retried: Retried<Outcome<T>>, run: &mut Run<T>) -> Result<(), RuntimeError> {
        let Retried { value: outcome, tries } = retried;
        let record = run.ledger.record_outcome(id, &outcome, tries);
        tracing::info!(
            provider = %id,
            status = ?record.status,
            code = ?record.code,
            count = record.count,
            attempt = tries,
            "provider attempt finished"
        );
        if let Outcome::UnknownError(detail) = &outcome {
            tracing::error!(provider = %id, detail = %detail, "provider failed unexpectedly");
        }
        run.lifecycle.finish_attempt(id, outcome.error_code())?;
        if let Outcome::Success(items) = outcome {
            if !items.is_empty() {
                run.successes.push((id.clone(), items));
            }
        }
        Ok(())
    }

    fn abandon(&self, id: &ProviderId, reason: &str, run: &mut Run<T>) -> Result<(), RuntimeError> {
        tracing::info!(provider = %id, reason = %reason, "provider call cancelled");
        run.ledger.record_cancelled(id, reason);
        run.lifecycle.finish_attempt(id, Some(ErrorCode::Cancelled))?;
        Ok(())
    }

    async fn run_sequential(
        &self,
        candidates: &[&dyn Provider<Item = T>],
        request: &AcquisitionRequest,
        ctx: &RequestContext,
        goal: usize,
        run: &mut Run<T>,
    ) -> Result<(), RuntimeError> {
        for &provider in candidates {
            if ctx.is_cancelled() {
                run.cancelled = true;
                break;
            }
            match self.preflight(provider, ctx, run).await? {
                Preflight::Go => {}
                Preflight::Skipped => continue,
                Preflight::Cancelled => break,
            }

            let id = &provider.descriptor().id;
            run.lifecycle.begin_attempt(id)?;
            let attempt = attempt_with_retry(
                provider,
                request,
                &self.policy.retry,
                self.policy.attempt_timeout,
                &self.budgets,
            );

            let retried = tokio::select! {
                biased;
                _ = ctx.cancelled() => None,
                retried = attempt => Some(retried),
            };
            match retried {
                Some(retried) => self.settle(id, retried, run)?,
                None => {
                    self.abandon(id, ctx.reason(), run)?;
                    run.cancelled = true;
                    break;
                }
            }
            if run.successes.len() >= goal {
                break;
            }
        }
        Ok(())
    }

    /// Race each tier's eligible providers; records land in the order the
    /// calls finish.
    async fn run_race(
        &self,
        candidates: &[&dyn Provider<Item = T>],
        request: &AcquisitionRequest,
        ctx: &RequestContext,
        goal: usize,
        run: &mut Run<T>,
    ) -> Result<(), RuntimeError> {
        for tier in Tier::ALL {
            let mut eligible: Vec<&dyn Provider<Item = T>> = Vec::new();
            for &provider in candidates.iter().filter(|p| p.descriptor().tier == tier) {
                if ctx.is_cancelled() {
                    run.cancelled = true;
                    return Ok(());
                }
                match self.preflight(provider, ctx, run).await? {
                    Preflight::Go => eligible.push(provider),
                    Preflight::Skipped => {}
                    Preflight::Cancelled => return Ok(()),
                }
            }
            if eligible.is_empty() {
                continue;
            }

            let mut pending: Vec<ProviderId> = Vec::with_capacity(eligible.len());
            for provider in &eligible {
                let id = provider.descriptor().id.clone();
                run.lifecycle.begin_attempt(&id)?;
                pending.push(id);
            }
            tracing::debug!(tier = %tier, racers = pending.len(), "racing tier");

            let mut in_flight: FuturesUnordered<_> = eligible
                .iter()
                .copied()
                .map(|provider| async move {
                    let retried = attempt_with_retry(
                        provider,
                        request,
                        &self.policy.retry,
                        self.policy.attempt_timeout,
                        &self.budgets,
                    )
                    .await;
                    (provider.descriptor().id.clone(), retried)
                })
                .collect();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => None,
                    next = in_flight.next() => Some(next),
                };
                match next {
                    None => {
                        drop(in_flight);
                        for id in &pending {
                            self.abandon(id, ctx.reason(), run)?;
                        }
                        run.cancelled = true;
                        return Ok(());
                    }
                    Some(None) => break,
                    Some(Some((id, retried))) => {
                        pending.retain(|p| p != &id);
                        self.settle(&id, retried, run)?;
                        if run.successes.len() >= goal {
                            drop(in_flight);
                            for id in &pending {
                                self.abandon(id, LOST_RACE, run)?;
                            }
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<T: Send + 'static> std::fmt::Debug for FallbackOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.descriptor().id.as_str()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn trace_id_for(request: &AcquisitionRequest) -> String {
    request
        .trace_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn log_result<T>(result: &AcquisitionResult<T>) {
    match &result.chosen {
        Some(chosen) => tracing::info!(
            chosen = %chosen,
            items = result.items.len(),
            attempts = result.attempts.len(),
            "acquisition resolved"
        ),
        None => tracing::warn!(
            state = ?result.state,
            attempts = result.attempts.len(),
            "acquisition degraded: no provider succeeded"
        ),
    }
}

/// Builder for [`FallbackOrchestrator`].
pub struct FallbackOrchestratorBuilder<T: Send + 'static> {
    providers: Vec<Arc<dyn Provider<Item = T>>>,
    policy: OrchestratorPolicy,
    prober: Option<HealthProber>,
    budgets: Option<BudgetTracker>,
    limits: Vec<(ProviderId, u32, Duration)>,
    health_enabled: bool,
}

impl<T: Send + 'static> FallbackOrchestratorBuilder<T> {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            policy: OrchestratorPolicy::default(),
            prober: None,
            budgets: None,
            limits: Vec::new(),
            health_enabled: true,
        }
    }

    pub fn policy(mut self, policy: OrchestratorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share a prober (and its cache) with other orchestrators.
    pub fn prober(mut self, prober: HealthProber) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Treat every provider as healthy without probing.
    pub fn without_health_checks(mut self) -> Self {
        self.health_enabled = false;
        self
    }

    /// Append a provider. Within a tier, earlier providers are tried first.
    pub fn provider(mut self, provider: Arc<dyn Provider<Item = T>>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Charge budgets against a tracker shared with other orchestrators.
    pub fn budgets(mut self, budgets: BudgetTracker) -> Self {
        self.budgets = Some(budgets);
        self
    }

    pub fn budget(mut self, provider: impl Into<ProviderId>, max_requests: u32, window: Duration) -> Self {
        self.limits.push((provider.into(), max_requests, window));
        self
    }

    pub fn build(self) -> Result<FallbackOrchestrator<T>, RuntimeError> {
        let mut providers = self.providers;
        for (i, provider) in providers.iter().enumerate() {
            let id = &provider.descriptor().id;
            if providers[..i].iter().any(|p| &p.descriptor().id == id) {
                return Err(RuntimeError::DuplicateProvider(id.clone()));
            }
        }
        // stable: registration order is priority within a tier
        providers.sort_by_key(|p| p.descriptor().tier);

        let budgets = self.budgets.unwrap_or_default();
        for (id, max_requests, window) in self.limits {
            if !providers.iter().any(|p| p.descriptor().id == id) {
                return Err(RuntimeError::Build(format!("budget for unknown provider '{}'", id)));
            }
            if max_requests == 0 || window.is_zero() {
                return Err(RuntimeError::Build(format!(
                    "budget for '{}' must allow at least one request per non-zero window",
                    id
                )));
            }
            budgets.set(id, max_requests, window);
        }

        let prober = if self.health_enabled {
            self.prober.unwrap_or_default()
        } else {
            HealthProber::disabled()
        };

        Ok(FallbackOrchestrator {
            providers,
            policy: self.policy,
            prober,
            budgets,
        })
    }
}

impl<T: Send + 'static> Default for FallbackOrchestratorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::{AttemptStatus, Capability, FinalState, ProbeSample};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Plays back a script of outcomes, then repeats the last one.
    struct Scripted {
        descriptor: ProviderDescriptor,
        script: Mutex<VecDeque<Outcome<String>>>,
        calls: AtomicU32,
        delay: Duration,
        probe: Option<ProbeSample>,
        probe_delay: Duration,
        panics: bool,
    }

    impl Scripted {
        fn new(name: &str, tier: Tier, script: Vec<Outcome<String>>) -> Self {
            Self {
                descriptor: ProviderDescriptor::credential_free(name, tier, Capability::Images),
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                probe: None,
                probe_delay: Duration::ZERO,
                panics: false,
            }
        }

        fn keyed(mut self, present: bool) -> Self {
            self.descriptor = ProviderDescriptor::with_credentials(
                self.descriptor.id.clone(),
                self.descriptor.tier,
                self.descriptor.capability,
                present,
            );
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn probed(mut self, sample: ProbeSample) -> Self {
            self.probe = Some(sample);
            self
        }

        fn slow_to_probe(mut self, delay: Duration) -> Self {
            self.probe_delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        type Item = String;

        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn attempt(&self, _request: &AcquisitionRequest) -> Outcome<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.panics {
                panic!("scripted panic");
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap_or(Outcome::Empty)
            } else {
                script.front().cloned().unwrap_or(Outcome::Empty)
            }
        }

        async fn health_check(&self, _timeout: Duration) -> Option<ProbeSample> {
            if !self.probe_delay.is_zero() {
                tokio::time::sleep(self.probe_delay).await;
            }
            self.probe
        }
    }

    fn items(words: &[&str]) -> Outcome<String> {
        Outcome::Success(words.iter().map(|w| w.to_string()).collect())
    }

    fn fast_policy() -> OrchestratorPolicy {
        OrchestratorPolicy {
            retry: RetryPolicy::default().with_delays(Duration::from_millis(1), Duration::from_millis(4)),
            ..OrchestratorPolicy::default()
        }
    }

    fn orchestrator(providers: Vec<Arc<Scripted>>) -> FallbackOrchestrator<String> {
        orchestrator_with(providers, fast_policy())
    }

    fn orchestrator_with(providers: Vec<Arc<Scripted>>, policy: OrchestratorPolicy) -> FallbackOrchestrator<String> {
        let mut builder = FallbackOrchestrator::<String>::builder().policy(policy);
        for provider in providers {
            builder = builder.provider(provider);
        }
        builder.build().unwrap()
    }

    fn statuses<T>(result: &AcquisitionResult<T>) -> Vec<(String, AttemptStatus)> {
        result
            .attempts
            .iter()
            .map(|r| (r.source.to_string(), r.status))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_empty_then_success() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![Outcome::RateLimited]));
        let b = Arc::new(Scripted::new("B", Tier::Primary, vec![Outcome::Empty]));
        let c = Arc::new(Scripted::new("C", Tier::Primary, vec![items(&["x", "y", "z"])]));
        let engine = orchestrator(vec![a.clone(), b.clone(), c.clone()]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(result.chosen, Some(ProviderId::new("C")));
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.state, FinalState::Resolved);
        assert_eq!(a.calls(), 3);

        let wire = serde_json::to_value(&result.attempts).unwrap();
        assert_eq!(wire[0]["source"], "A");
        assert_eq!(wire[0]["status"], "error");
        assert_eq!(wire[0]["code"], "RATE_LIMIT");
        assert_eq!(wire[0]["details"], json!({ "tries": 3 }));
        assert_eq!(wire[1]["status"], "no_results");
        assert_eq!(wire[2]["status"], "success");
        assert_eq!(wire[2]["count"], 3);
    }

    #[tokio::test]
    async fn test_no_providers_means_empty_ledger() {
        let engine = orchestrator(vec![]);
        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.chosen, None);
        assert!(result.items.is_empty());
        assert!(result.attempts.is_empty());
        assert_eq!(result.state, FinalState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_resort_runs_after_primary_and_backup_fail() {
        let primary = Arc::new(Scripted::new("primary", Tier::Primary, vec![Outcome::UpstreamError(503)]));
        let backup = Arc::new(
            Scripted::new("backup", Tier::Backup, vec![]).keyed(false),
        );
        let last = Arc::new(Scripted::new("last", Tier::LastResort, vec![items(&["a"])]));
        // registered out of tier order on purpose
        let engine = orchestrator(vec![last.clone(), backup.clone(), primary.clone()]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(
            statuses(&result),
            vec![
                ("primary".to_string(), AttemptStatus::Error),
                ("backup".to_string(), AttemptStatus::Unavailable),
                ("last".to_string(), AttemptStatus::Success),
            ]
        );
        assert_eq!(result.chosen, Some(ProviderId::new("last")));
        assert_eq!(backup.calls(), 0);
        assert_eq!(result.attempts[1].code, Some(ErrorCode::InvalidConfig));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_before_lower_tiers() {
        let primary = Arc::new(Scripted::new("primary", Tier::Primary, vec![items(&["a"])]));
        let backup = Arc::new(Scripted::new("backup", Tier::Backup, vec![items(&["b"])]));
        let engine = orchestrator(vec![primary, backup.clone()]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_when_everything_fails() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![Outcome::UnknownError("boom".into())]));
        let b = Arc::new(Scripted::new("B", Tier::LastResort, vec![Outcome::Timeout]));
        let engine = orchestrator(vec![a, b]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert!(result.is_degraded());
        assert_eq!(result.state, FinalState::Exhausted);
        assert_eq!(result.attempts[0].status, AttemptStatus::Exception);
        // the detail stays in the logs
        assert_eq!(result.attempts[0].message.as_deref(), Some("unexpected provider failure"));
        assert_eq!(result.attempts[1].code, Some(ErrorCode::TimeoutError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_primary_is_skipped_without_a_call() {
        let sick = Arc::new(
            Scripted::new("sick", Tier::Primary, vec![items(&["a"])])
                .probed(ProbeSample::responded(503, Duration::from_secs(6))),
        );
        let fine = Arc::new(
            Scripted::new("fine", Tier::Backup, vec![items(&["b"])])
                .probed(ProbeSample::responded(200, Duration::from_millis(40))),
        );
        let engine = orchestrator(vec![sick.clone(), fine]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(sick.calls(), 0);
        let skipped = &result.attempts[0];
        assert_eq!(skipped.status, AttemptStatus::Unavailable);
        assert_eq!(skipped.code, Some(ErrorCode::SourceUnhealthy));
        assert!(!skipped.was_attempted());
        assert_eq!(result.chosen, Some(ProviderId::new("fine")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_provider_restricts_the_run() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["a"])]));
        let b = Arc::new(Scripted::new("B", Tier::Backup, vec![items(&["b"])]));
        let engine = orchestrator(vec![a.clone(), b]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats").pinned_to("B"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.chosen, Some(ProviderId::new("B")));
        assert_eq!(a.calls(), 0);

        let unknown = engine
            .acquire(&AcquisitionRequest::new("cats").pinned_to("flickr"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(unknown.attempts.len(), 1);
        assert_eq!(unknown.attempts[0].code, Some(ErrorCode::SourceUnavailable));
        assert_eq!(unknown.chosen, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spent_budget_skips_provider() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["a"])]));
        let b = Arc::new(Scripted::new("B", Tier::Backup, vec![items(&["b"])]));
        let engine = FallbackOrchestrator::<String>::builder()
            .policy(fast_policy())
            .provider(a.clone())
            .provider(b)
            .budget("A", 1, Duration::from_secs(3600))
            .build()
            .unwrap();

        let request = AcquisitionRequest::new("cats");
        let first = engine.acquire(&request, &RequestContext::new()).await.unwrap();
        assert_eq!(first.chosen, Some(ProviderId::new("A")));

        let second = engine.acquire(&request, &RequestContext::new()).await.unwrap();
        assert_eq!(second.attempts[0].code, Some(ErrorCode::BudgetExhausted));
        assert_eq!(second.chosen, Some(ProviderId::new("B")));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_in_flight_call() {
        let slow = Arc::new(
            Scripted::new("slow", Tier::Primary, vec![items(&["a"])]).delayed(Duration::from_secs(5)),
        );
        let never = Arc::new(Scripted::new("never", Tier::Backup, vec![items(&["b"])]));
        let engine = orchestrator(vec![slow, never.clone()]);

        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let result = engine.acquire(&AcquisitionRequest::new("cats"), &ctx).await.unwrap();

        assert_eq!(result.state, FinalState::Cancelled);
        assert_eq!(result.chosen, None);
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].status, AttemptStatus::Cancelled);
        assert_eq!(never.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_provider_is_recorded_and_skipped() {
        let mut broken = Scripted::new("broken", Tier::Primary, vec![]);
        broken.panics = true;
        let ok = Arc::new(Scripted::new("ok", Tier::Backup, vec![items(&["a"])]));
        let engine = orchestrator(vec![Arc::new(broken), ok]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.attempts[0].status, AttemptStatus::Exception);
        assert_eq!(result.chosen, Some(ProviderId::new("ok")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_first_success_wins_and_others_are_cancelled() {
        let slow = Arc::new(
            Scripted::new("slow", Tier::Primary, vec![items(&["a"])]).delayed(Duration::from_millis(500)),
        );
        let fast = Arc::new(
            Scripted::new("fast", Tier::Primary, vec![items(&["b"])]).delayed(Duration::from_millis(20)),
        );
        let policy = OrchestratorPolicy {
            mode: ConcurrencyMode::Race,
            ..fast_policy()
        };
        let engine = orchestrator_with(vec![slow.clone(), fast], policy);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(result.chosen, Some(ProviderId::new("fast")));
        assert_eq!(
            statuses(&result),
            vec![
                ("fast".to_string(), AttemptStatus::Success),
                ("slow".to_string(), AttemptStatus::Cancelled),
            ]
        );
        assert_eq!(result.attempts[1].message.as_deref(), Some(LOST_RACE));
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_falls_through_to_next_tier() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![Outcome::Empty]));
        let b = Arc::new(Scripted::new("B", Tier::Primary, vec![Outcome::ConfigError("rejected".into())]));
        let c = Arc::new(Scripted::new("C", Tier::LastResort, vec![items(&["c"])]));
        let policy = OrchestratorPolicy {
            mode: ConcurrencyMode::Race,
            ..fast_policy()
        };
        let engine = orchestrator_with(vec![a, b, c], policy);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(result.attempts.len(), 3);
        assert_eq!(result.chosen, Some(ProviderId::new("C")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_factual_subject_gathers_two_agreeing_sources() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["top 3 cafes in 2024"])]));
        let b = Arc::new(Scripted::new("B", Tier::Backup, vec![items(&["top 3 cafes in 2024"])]));
        let c = Arc::new(Scripted::new("C", Tier::LastResort, vec![items(&["unrelated"])]));
        let engine = orchestrator(vec![a, b, c.clone()]);
        let validator = ConsistencyValidator::default();

        let corroborated = engine
            .acquire_corroborated(&AcquisitionRequest::new("top 3 cafes 2024"), &RequestContext::new(), &validator)
            .await
            .unwrap();

        assert!(corroborated.verdict.is_factual);
        assert!(corroborated.verdict.valid);
        assert_eq!(corroborated.result.chosen, Some(ProviderId::new("A")));
        assert_eq!(corroborated.result.attempts.len(), 2);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factual_subject_with_one_source_is_rejected() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["top 3 cafes"])]));
        let b = Arc::new(Scripted::new("B", Tier::Backup, vec![Outcome::Empty]));
        let engine = orchestrator(vec![a, b]);

        let corroborated = engine
            .acquire_corroborated(
                &AcquisitionRequest::new("top 3 cafes"),
                &RequestContext::new(),
                &ConsistencyValidator::default(),
            )
            .await
            .unwrap();

        assert!(!corroborated.verdict.valid);
        // the content is still returned; the verdict says how far to trust it
        assert_eq!(corroborated.result.chosen, Some(ProviderId::new("A")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trend_subject_stops_at_first_success() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["quiet luxury"])]));
        let b = Arc::new(Scripted::new("B", Tier::Backup, vec![items(&["quiet luxury"])]));
        let engine = orchestrator(vec![a, b.clone()]);

        let corroborated = engine
            .acquire_corroborated(
                &AcquisitionRequest::new("quiet luxury"),
                &RequestContext::new(),
                &ConsistencyValidator::default(),
            )
            .await
            .unwrap();
        assert!(corroborated.verdict.valid);
        assert!(!corroborated.verdict.warnings.is_empty());
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_health_report_skips_unready_providers() {
        let ready = Arc::new(
            Scripted::new("ready", Tier::Primary, vec![])
                .probed(ProbeSample::responded(200, Duration::from_millis(10))),
        );
        let missing = Arc::new(Scripted::new("missing", Tier::Backup, vec![]).keyed(false));
        let engine = orchestrator(vec![ready, missing]);

        let report = engine.health_report().await;
        assert_eq!(report.len(), 2);
        assert!(report[0].snapshot.is_some());
        assert!(!report[1].ready);
        assert!(report[1].snapshot.is_none());
    }

    #[test]
    fn test_duplicate_provider_is_a_build_error() {
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![]));
        let again = Arc::new(Scripted::new("A", Tier::Backup, vec![]));
        let built = FallbackOrchestrator::<String>::builder().provider(a).provider(again).build();
        assert!(matches!(built, Err(RuntimeError::DuplicateProvider(id)) if id.as_str() == "A"));
    }

    #[test]
    fn test_budget_for_unknown_provider_is_a_build_error() {
        let built: Result<FallbackOrchestrator<String>, _> = FallbackOrchestrator::builder()
            .budget("ghost", 10, Duration::from_secs(60))
            .build();
        assert!(matches!(built, Err(RuntimeError::Build(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_race_cancels_every_racer() {
        let a = Arc::new(
            Scripted::new("A", Tier::Primary, vec![items(&["a"])]).delayed(Duration::from_secs(5)),
        );
        let b = Arc::new(
            Scripted::new("B", Tier::Primary, vec![items(&["b"])]).delayed(Duration::from_secs(5)),
        );
        let c = Arc::new(Scripted::new("C", Tier::LastResort, vec![items(&["c"])]));
        let policy = OrchestratorPolicy {
            mode: ConcurrencyMode::Race,
            ..fast_policy()
        };
        let engine = orchestrator_with(vec![a.clone(), b.clone(), c.clone()], policy);

        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let result = engine.acquire(&AcquisitionRequest::new("cats"), &ctx).await.unwrap();

        assert_eq!(result.state, FinalState::Cancelled);
        assert_eq!(result.chosen, None);
        assert_eq!(
            statuses(&result),
            vec![
                ("A".to_string(), AttemptStatus::Cancelled),
                ("B".to_string(), AttemptStatus::Cancelled),
            ]
        );
        assert!(result
            .attempts
            .iter()
            .all(|r| r.code == Some(ErrorCode::Cancelled) && r.message.as_deref() != Some(LOST_RACE)));
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_cannot_overspend_budget() {
        // both requests pass the early budget check while their probes are in flight
        let a = Arc::new(
            Scripted::new("A", Tier::Primary, vec![items(&["a"])])
                .probed(ProbeSample::responded(200, Duration::from_millis(10)))
                .slow_to_probe(Duration::from_millis(50)),
        );
        let engine = FallbackOrchestrator::<String>::builder()
            .policy(fast_policy())
            .provider(a.clone())
            .budget("A", 1, Duration::from_secs(3600))
            .build()
            .unwrap();

        let request = AcquisitionRequest::new("cats");
        let ctx = RequestContext::new();
        let (first, second) = tokio::join!(engine.acquire(&request, &ctx), engine.acquire(&request, &ctx));
        let codes: Vec<Option<ErrorCode>> = [first.unwrap(), second.unwrap()]
            .iter()
            .map(|result| result.attempts[0].code)
            .collect();

        assert!(codes.contains(&None));
        assert!(codes.contains(&Some(ErrorCode::BudgetExhausted)));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrators_sharing_a_tracker_share_the_budget() {
        let shared = BudgetTracker::new();
        let build = |provider: Arc<Scripted>| {
            FallbackOrchestrator::<String>::builder()
                .policy(fast_policy())
                .budgets(shared.clone())
                .provider(provider)
                .budget("A", 1, Duration::from_secs(3600))
                .build()
                .unwrap()
        };
        let a = Arc::new(Scripted::new("A", Tier::Primary, vec![items(&["a"])]));
        let first = build(a.clone());
        let second = build(a.clone());

        let request = AcquisitionRequest::new("cats");
        let resolved = first.acquire(&request, &RequestContext::new()).await.unwrap();
        let spent = second.acquire(&request, &RequestContext::new()).await.unwrap();

        assert_eq!(resolved.chosen, Some(ProviderId::new("A")));
        assert_eq!(spent.attempts[0].code, Some(ErrorCode::BudgetExhausted));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_are_an_attempt_but_missing_ones_are_not() {
        let rejected = Arc::new(Scripted::new(
            "rejected",
            Tier::Primary,
            vec![Outcome::ConfigError("credentials rejected (HTTP 401)".into())],
        ));
        let missing = Arc::new(Scripted::new("missing", Tier::Primary, vec![]).keyed(false));
        let last = Arc::new(Scripted::new("last", Tier::LastResort, vec![items(&["a"])]));
        let engine = orchestrator(vec![rejected.clone(), missing.clone(), last]);

        let result = engine
            .acquire(&AcquisitionRequest::new("cats"), &RequestContext::new())
            .await
            .unwrap();

        let attempted: Vec<(&str, AttemptStatus, bool)> = result
            .attempts
            .iter()
            .map(|r| (r.source.as_str(), r.status, r.was_attempted()))
            .collect();
        assert_eq!(
            attempted,
            vec![
                ("rejected", AttemptStatus::Unavailable, true),
                ("missing", AttemptStatus::Unavailable, false),
                ("last", AttemptStatus::Success, true),
            ]
        );
        assert_eq!((rejected.calls(), missing.calls()), (1, 0));
    }
}
