use std::sync::Arc;
use std::time::Duration;

use crate::models::{AnalysisOutcome, ChatMessage, ClassificationVerdict, NutritionEstimate};
use crate::services::error::{AnalysisError, RelayError, SessionError};
use crate::services::extract::parse_nutrition;
use crate::services::prompts::{self, NOT_FOOD_TOKEN};
use crate::services::RelayClient;

/// Verdict for a classifier reply. Only an explicit `NOT_FOOD` rejects;
/// everything else, including an empty or off-script reply, counts as food.
pub fn verdict_from_reply(reply: &str) -> ClassificationVerdict {
    let reply = reply.trim();
    if reply.contains(NOT_FOOD_TOKEN) {
        ClassificationVerdict::NotFood
    } else {
        if reply != "FOOD" {
            log::warn!("⚠️ Off-script classifier reply {:?}, treating as FOOD", reply);
        }
        ClassificationVerdict::Food
    }
}

/// Two-stage scan: classify the description, then estimate nutrition.
pub struct ScanPipeline {
    relay: Arc<dyn RelayClient>,
    timeout: Duration,
}

impl ScanPipeline {
    pub fn new(relay: Arc<dyn RelayClient>, timeout: Duration) -> Self {
        Self { relay, timeout }
    }

    async fn ask(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let completion = tokio::time::timeout(self.timeout, self.relay.invoke(messages))
            .await
            .map_err(|_| RelayError::Timeout(self.timeout))??;

        let reply = completion.reply_text()?.to_string();
        log::debug!("💬 Relay reply: {}", reply);
        Ok(reply)
    }

    pub async fn classify(&self, description: &str) -> Result<ClassificationVerdict, RelayError> {
        log::info!("🔍 Classifying item: {}", description);
        let reply = self.ask(&prompts::classification_messages(description)).await?;
        Ok(verdict_from_reply(&reply))
    }

    pub async fn analyze(&self, description: &str) -> Result<NutritionEstimate, AnalysisError> {
        log::info!("🥗 Analyzing nutrition for: {}", description);
        let reply = self.ask(&prompts::nutrition_messages(description)).await?;

        let estimate = parse_nutrition(&reply).map_err(|e| {
            log::error!("❌ Could not parse nutrition reply: {}", e);
            e
        })?;

        Ok(estimate)
    }

    pub async fn classify_and_analyze(&self, description: &str) -> AnalysisOutcome {
        self.run_stages(description, |_| {}).await
    }

    /// Runs both stages in order, reporting each state change to `on_state`.
    async fn run_stages<F>(&self, description: &str, mut on_state: F) -> AnalysisOutcome
    where
        F: FnMut(ScanState) + Send,
    {
        on_state(ScanState::Validating);
        match self.classify(description).await {
            Ok(ClassificationVerdict::NotFood) => {
                log::info!("🚫 {} is not food, skipping analysis", description);
                on_state(ScanState::NotFood);
                return AnalysisOutcome::NotFood;
            }
            Ok(ClassificationVerdict::Food) => {}
            Err(e) => {
                log::error!("❌ Classification failed: {}", e);
                on_state(ScanState::Error);
                return AnalysisOutcome::Error(e.into());
            }
        }

        on_state(ScanState::Analyzing);
        match self.analyze(description).await {
            Ok(estimate) => {
                log::info!("✅ Analysis complete for {} (score {})", description, estimate.score);
                on_state(ScanState::Success);
                AnalysisOutcome::Success(estimate)
            }
            Err(e) => {
                log::error!("❌ Analysis failed: {}", e);
                on_state(ScanState::Error);
                AnalysisOutcome::Error(e)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Validating,
    Analyzing,
    NotFood,
    Success,
    Error,
}

/// Caller-side state for one scan at a time. Terminal states stay put until
/// `reset` is called.
#[derive(Debug)]
pub struct ScanSession {
    state: ScanState,
    last_scanned: Option<String>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            last_scanned: None,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Description of the most recent successful scan, for the assistant's context.
    pub fn last_scanned(&self) -> Option<&str> {
        self.last_scanned.as_deref()
    }

    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
    }

    fn transition(&mut self, next: ScanState) {
        log::debug!("🔁 Scan state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs one scan from `Idle`. `on_state` sees every state the session
    /// enters, in order, while the scan is in flight.
    pub async fn run<F>(
        &mut self,
        pipeline: &ScanPipeline,
        description: &str,
        mut on_state: F,
    ) -> Result<AnalysisOutcome, SessionError>
    where
        F: FnMut(&ScanState) + Send,
    {
        if self.state != ScanState::Idle {
            return Err(SessionError::NotIdle);
        }

        let outcome = pipeline
            .run_stages(description, |next| {
                on_state(&next);
                self.transition(next);
            })
            .await;

        if matches!(outcome, AnalysisOutcome::Success(_)) {
            self.last_scanned = Some(description.to_string());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::error::ParseError;
    use crate::services::relay::ScriptedRelay;

    const APPLE_REPLY: &str =
        r#"Here you go: {"calories":"52","protein":"0.3g","carbs":"14g","fat":"0.2g","score":90}"#;

    fn pipeline(relay: &Arc<ScriptedRelay>) -> ScanPipeline {
        ScanPipeline::new(relay.clone(), Duration::from_secs(5))
    }

    #[test]
    fn test_verdict_rule() {
        assert_eq!(verdict_from_reply("NOT_FOOD"), ClassificationVerdict::NotFood);
        assert_eq!(
            verdict_from_reply("  I think this is NOT_FOOD, sorry. "),
            ClassificationVerdict::NotFood
        );
        assert_eq!(verdict_from_reply("FOOD"), ClassificationVerdict::Food);
        assert_eq!(verdict_from_reply(""), ClassificationVerdict::Food);
        assert_eq!(verdict_from_reply("not_food"), ClassificationVerdict::Food);
        assert_eq!(verdict_from_reply("NOT FOOD"), ClassificationVerdict::Food);
        assert_eq!(verdict_from_reply("¯\\_(ツ)_/¯"), ClassificationVerdict::Food);
    }

    #[tokio::test]
    async fn test_food_item_success() {
        let relay = Arc::new(ScriptedRelay::new(vec![Ok("FOOD"), Ok(APPLE_REPLY)]));

        let outcome = pipeline(&relay).classify_and_analyze("apple.jpg").await;

        match outcome {
            AnalysisOutcome::Success(estimate) => {
                assert_eq!(estimate.calories, "52");
                assert_eq!(estimate.protein, "0.3g");
                assert_eq!(estimate.carbs, "14g");
                assert_eq!(estimate.fat, "0.2g");
                assert_eq!(estimate.score, 90);
            }
            other => panic!("expected success, got {:?}", other),
        }

        let calls = relay.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][1].content.contains("apple.jpg"));
        assert_eq!(calls[1][1].content, "Analyze this food: apple.jpg");
    }

    #[tokio::test]
    async fn test_not_food_skips_analysis() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Ok("NOT_FOOD, this is an object"),
            Ok(APPLE_REPLY),
        ]));

        let outcome = pipeline(&relay).classify_and_analyze("car_keys.png").await;

        assert!(matches!(outcome, AnalysisOutcome::NotFood));
        assert_eq!(relay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_prose_analysis_is_parse_error() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Ok("FOOD"),
            Ok("A banana is a healthy snack with about 105 calories."),
        ]));

        let outcome = pipeline(&relay).classify_and_analyze("banana.jpg").await;

        assert!(matches!(
            outcome,
            AnalysisOutcome::Error(AnalysisError::Parse(ParseError::NoJsonObject))
        ));
    }

    #[tokio::test]
    async fn test_classification_transport_failure() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Err(RelayError::Transport("connection refused".to_string())),
            Ok(APPLE_REPLY),
        ]));

        let outcome = pipeline(&relay).classify_and_analyze("apple.jpg").await;

        assert!(matches!(
            outcome,
            AnalysisOutcome::Error(AnalysisError::Relay(RelayError::Transport(_)))
        ));
        assert_eq!(relay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_analysis_relay_failure() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Ok("FOOD"),
            Err(RelayError::Upstream {
                status: 429,
                message: "rate limited".to_string(),
            }),
        ]));

        let outcome = pipeline(&relay).classify_and_analyze("pizza.jpg").await;

        assert!(matches!(
            outcome,
            AnalysisOutcome::Error(AnalysisError::Relay(RelayError::Upstream { status: 429, .. }))
        ));
    }

    #[tokio::test]
    async fn test_slow_relay_times_out() {
        let relay = Arc::new(
            ScriptedRelay::new(vec![Ok("FOOD")]).with_delay(Duration::from_millis(500)),
        );
        let pipeline = ScanPipeline::new(relay.clone(), Duration::from_millis(20));

        let outcome = pipeline.classify_and_analyze("apple.jpg").await;

        assert!(matches!(
            outcome,
            AnalysisOutcome::Error(AnalysisError::Relay(RelayError::Timeout(_)))
        ));
        assert_eq!(relay.call_count(), 1);
    }

    #[tokio::test]
    async fn test_session_states_and_reset() {
        let relay = Arc::new(ScriptedRelay::new(vec![
            Ok("FOOD"),
            Ok(APPLE_REPLY),
            Ok("NOT_FOOD"),
        ]));
        let pipeline = pipeline(&relay);
        let mut session = ScanSession::new();
        assert_eq!(session.state(), &ScanState::Idle);

        let outcome = session.run(&pipeline, "apple.jpg", |_| {}).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Success(_)));
        assert_eq!(session.state(), &ScanState::Success);
        assert_eq!(session.last_scanned(), Some("apple.jpg"));

        // No implicit return to Idle
        assert_eq!(
            session.run(&pipeline, "shoe.png", |_| {}).await.unwrap_err(),
            SessionError::NotIdle
        );
        assert_eq!(relay.call_count(), 2);

        session.reset();
        let outcome = session.run(&pipeline, "shoe.png", |_| {}).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::NotFood));
        assert_eq!(session.state(), &ScanState::NotFood);
        assert_eq!(session.last_scanned(), Some("apple.jpg"));
    }

    #[tokio::test]
    async fn test_session_error_state() {
        let relay = Arc::new(ScriptedRelay::new(vec![Ok("FOOD"), Ok("{\"calories\":\"1\"}")]));
        let mut session = ScanSession::new();

        let outcome = session.run(&pipeline(&relay), "toast.jpg", |_| {}).await.unwrap();

        assert!(matches!(
            outcome,
            AnalysisOutcome::Error(AnalysisError::Parse(ParseError::MissingField(_)))
        ));
        assert_eq!(session.state(), &ScanState::Error);
        assert_eq!(session.last_scanned(), None);
    }

    async fn recorded_states(replies: Vec<Result<&'static str, RelayError>>) -> Vec<ScanState> {
        let relay = Arc::new(ScriptedRelay::new(replies));
        let mut session = ScanSession::new();
        let mut seen = vec![session.state().clone()];

        session
            .run(&pipeline(&relay), "item.jpg", |state| seen.push(state.clone()))
            .await
            .unwrap();

        assert_eq!(seen.last(), Some(session.state()));
        seen
    }

    #[tokio::test]
    async fn test_state_sequence_per_path() {
        use ScanState::*;

        assert_eq!(
            recorded_states(vec![Ok("FOOD"), Ok(APPLE_REPLY)]).await,
            vec![Idle, Validating, Analyzing, Success]
        );
        assert_eq!(
            recorded_states(vec![Ok("NOT_FOOD")]).await,
            vec![Idle, Validating, NotFood]
        );
        assert_eq!(
            recorded_states(vec![Err(RelayError::Transport("offline".to_string()))]).await,
            vec![Idle, Validating, Error]
        );
        assert_eq!(
            recorded_states(vec![Ok("FOOD"), Ok("no numbers today")]).await,
            vec![Idle, Validating, Analyzing, Error]
        );
    }
}
