use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use shared::domain::{CorrectionSubmission, District, Scope, SessionId};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::{FieldProblem, FormField, ValidationFailure, VerificationError},
    SubmissionSink,
};

/// How long a confirmation stays on screen before the prompt closes.
pub const CONFIRMED_DISPLAY: Duration = Duration::from_millis(2000);
/// How long the dispute notice stays up before the correction form opens.
pub const DISPUTED_DISPLAY: Duration = Duration::from_millis(1500);
/// How long the submission receipt stays up before the form is cleared.
pub const SUBMITTED_DISPLAY: Duration = Duration::from_millis(2500);

/// Correction form fields exactly as the user typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionDraft {
    pub proposed_price: String,
    pub location_label: String,
    pub district: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Prompting,
    Confirmed,
    Disputed,
    AwaitingCorrection { draft: CorrectionDraft },
    Submitted { submission: CorrectionSubmission },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Prompting => "prompting",
            SessionState::Confirmed => "confirmed",
            SessionState::Disputed => "disputed",
            SessionState::AwaitingCorrection { .. } => "awaiting_correction",
            SessionState::Submitted { .. } => "submitted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSnapshot {
    pub id: SessionId,
    pub scope: Scope,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Confirmed,
    Submitted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    StateChanged(VerificationSnapshot),
    Cleared {
        scope: Scope,
        id: SessionId,
        reason: ClearReason,
    },
}

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    OpenCorrectionForm,
    Clear(ClearReason),
}

impl TimerAction {
    fn source_state(self) -> &'static str {
        match self {
            TimerAction::OpenCorrectionForm => "disputed",
            TimerAction::Clear(ClearReason::Confirmed) => "confirmed",
            TimerAction::Clear(ClearReason::Submitted) => "submitted",
            TimerAction::Clear(ClearReason::Cancelled) => "cancelled",
        }
    }
}

struct ActiveSession {
    id: SessionId,
    state: SessionState,
    timer: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct EngineState {
    sessions: HashMap<Scope, ActiveSession>,
    next_session_id: u64,
}

/// Drives the "is this price correct?" prompts, one session per scope.
///
/// Auto-dismiss delays run as spawned tasks owned by the session. Tearing a
/// session down aborts its task, and a task that still manages to run checks
/// the session id before touching anything.
pub struct VerificationEngine {
    sink: Arc<dyn SubmissionSink>,
    inner: Mutex<EngineState>,
    events: broadcast::Sender<VerificationEvent>,
    self_ref: Weak<Self>,
}

impl VerificationEngine {
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|self_ref| Self {
            sink,
            inner: Mutex::new(EngineState {
                sessions: HashMap::new(),
                next_session_id: 1,
            }),
            events,
            self_ref: self_ref.clone(),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<VerificationEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self, scope: &Scope) -> Option<VerificationSnapshot> {
        let guard = self.inner.lock().await;
        guard.sessions.get(scope).map(|session| VerificationSnapshot {
            id: session.id,
            scope: scope.clone(),
            state: session.state.clone(),
        })
    }

    pub async fn sessions(&self) -> Vec<VerificationSnapshot> {
        let guard = self.inner.lock().await;
        guard
            .sessions
            .iter()
            .map(|(scope, session)| VerificationSnapshot {
                id: session.id,
                scope: scope.clone(),
                state: session.state.clone(),
            })
            .collect()
    }

    pub async fn open_prompt(&self, scope: Scope) -> Result<SessionId, VerificationError> {
        let mut guard = self.inner.lock().await;
        if let Some(existing) = guard.sessions.get(&scope) {
            return Err(VerificationError::InvalidStateTransition {
                scope,
                operation: "open prompt",
                state: existing.state.name(),
            });
        }

        let id = SessionId(guard.next_session_id);
        guard.next_session_id += 1;
        guard.sessions.insert(
            scope.clone(),
            ActiveSession {
                id,
                state: SessionState::Prompting,
                timer: None,
            },
        );
        info!(%scope, session = %id, "verification: prompt opened");
        self.emit_state(&scope, id, &SessionState::Prompting);
        Ok(id)
    }

    pub async fn confirm(&self, scope: &Scope) -> Result<(), VerificationError> {
        self.leave_prompt(
            scope,
            "confirm",
            SessionState::Confirmed,
            CONFIRMED_DISPLAY,
            TimerAction::Clear(ClearReason::Confirmed),
        )
        .await
    }

    pub async fn dispute(&self, scope: &Scope) -> Result<(), VerificationError> {
        self.leave_prompt(
            scope,
            "dispute",
            SessionState::Disputed,
            DISPUTED_DISPLAY,
            TimerAction::OpenCorrectionForm,
        )
        .await
    }

    /// Keeps partially entered form values so the display can re-render them.
    pub async fn update_draft(
        &self,
        scope: &Scope,
        draft: CorrectionDraft,
    ) -> Result<(), VerificationError> {
        let mut guard = self.inner.lock().await;
        let session = awaiting_correction(&mut guard, scope, "edit correction")?;
        session.state = SessionState::AwaitingCorrection { draft };
        let (id, state) = (session.id, session.state.clone());
        self.emit_state(scope, id, &state);
        Ok(())
    }

    pub async fn submit_correction(
        &self,
        scope: &Scope,
        input: CorrectionDraft,
    ) -> Result<CorrectionSubmission, VerificationError> {
        let (id, submission) = {
            let mut guard = self.inner.lock().await;
            let session = awaiting_correction(&mut guard, scope, "submit correction")?;
            let submission = validate_correction(scope, &input)
                .map_err(VerificationError::Validation)?;
            session.state = SessionState::Submitted {
                submission: submission.clone(),
            };
            let (id, state) = (session.id, session.state.clone());
            self.emit_state(scope, id, &state);
            (id, submission)
        };

        if let Err(err) = self.sink.submit(&submission).await {
            warn!(%scope, session = %id, error = %err, "verification: submission sink failed");
            let mut guard = self.inner.lock().await;
            if let Some(session) = guard
                .sessions
                .get_mut(scope)
                .filter(|session| session.id == id)
            {
                session.state = SessionState::AwaitingCorrection { draft: input };
                let state = session.state.clone();
                self.emit_state(scope, id, &state);
            }
            return Err(VerificationError::Sink(err.to_string()));
        }

        info!(
            %scope,
            session = %id,
            price = submission.proposed_price,
            district = %submission.district,
            "verification: correction submitted"
        );

        let mut guard = self.inner.lock().await;
        match guard.sessions.get_mut(scope) {
            Some(session) if session.id == id => {
                session.abort_timer();
                session.timer = Some(self.schedule(
                    scope.clone(),
                    id,
                    SUBMITTED_DISPLAY,
                    TimerAction::Clear(ClearReason::Submitted),
                ));
            }
            _ => debug!(%scope, session = %id, "verification: session torn down during submission"),
        }

        Ok(submission)
    }

    pub async fn cancel(&self, scope: &Scope) -> Result<(), VerificationError> {
        let mut guard = self.inner.lock().await;
        let Some(mut session) = guard.sessions.remove(scope) else {
            return Err(VerificationError::InvalidStateTransition {
                scope: scope.clone(),
                operation: "cancel",
                state: "idle",
            });
        };
        session.abort_timer();
        info!(%scope, session = %session.id, state = session.state.name(), "verification: cancelled");
        let _ = self.events.send(VerificationEvent::Cleared {
            scope: scope.clone(),
            id: session.id,
            reason: ClearReason::Cancelled,
        });
        Ok(())
    }

    /// Tears down every open session, e.g. when the dashboard is closed.
    pub async fn cancel_all(&self) {
        let mut guard = self.inner.lock().await;
        for (scope, mut session) in guard.sessions.drain() {
            session.abort_timer();
            let _ = self.events.send(VerificationEvent::Cleared {
                scope,
                id: session.id,
                reason: ClearReason::Cancelled,
            });
        }
    }

    async fn leave_prompt(
        &self,
        scope: &Scope,
        operation: &'static str,
        next: SessionState,
        delay: Duration,
        action: TimerAction,
    ) -> Result<(), VerificationError> {
        let mut guard = self.inner.lock().await;
        let session = match guard.sessions.get_mut(scope) {
            Some(session) if session.state == SessionState::Prompting => session,
            other => {
                return Err(VerificationError::InvalidStateTransition {
                    scope: scope.clone(),
                    operation,
                    state: other.map_or("idle", |session| session.state.name()),
                })
            }
        };

        session.state = next;
        session.abort_timer();
        session.timer = Some(self.schedule(scope.clone(), session.id, delay, action));
        let (id, state) = (session.id, session.state.clone());
        debug!(%scope, session = %id, state = state.name(), "verification: prompt answered");
        self.emit_state(scope, id, &state);
        Ok(())
    }

    fn schedule(
        &self,
        scope: Scope,
        id: SessionId,
        delay: Duration,
        action: TimerAction,
    ) -> JoinHandle<()> {
        let engine = self.self_ref.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = engine.upgrade() {
                engine.fire(scope, id, action).await;
            }
        })
    }

    async fn fire(&self, scope: Scope, id: SessionId, action: TimerAction) {
        let mut guard = self.inner.lock().await;
        let Some(session) = guard.sessions.get_mut(&scope) else {
            debug!(%scope, session = %id, "verification: timer fired for closed session");
            return;
        };
        if session.id != id || session.state.name() != action.source_state() {
            debug!(
                %scope,
                session = %id,
                current = %session.id,
                state = session.state.name(),
                "verification: stale timer ignored"
            );
            return;
        }

        // The handle being cleared belongs to this task; dropping it only detaches.
        session.timer = None;
        match action {
            TimerAction::OpenCorrectionForm => {
                session.state = SessionState::AwaitingCorrection {
                    draft: CorrectionDraft::default(),
                };
                let state = session.state.clone();
                self.emit_state(&scope, id, &state);
            }
            TimerAction::Clear(reason) => {
                guard.sessions.remove(&scope);
                debug!(%scope, session = %id, ?reason, "verification: session cleared");
                let _ = self
                    .events
                    .send(VerificationEvent::Cleared { scope, id, reason });
            }
        }
    }

    fn emit_state(&self, scope: &Scope, id: SessionId, state: &SessionState) {
        let _ = self
            .events
            .send(VerificationEvent::StateChanged(VerificationSnapshot {
                id,
                scope: scope.clone(),
                state: state.clone(),
            }));
    }
}

fn awaiting_correction<'a>(
    state: &'a mut EngineState,
    scope: &Scope,
    operation: &'static str,
) -> Result<&'a mut ActiveSession, VerificationError> {
    match state.sessions.get_mut(scope) {
        Some(session) if matches!(session.state, SessionState::AwaitingCorrection { .. }) => {
            Ok(session)
        }
        other => Err(VerificationError::InvalidStateTransition {
            scope: scope.clone(),
            operation,
            state: other.map_or("idle", |session| session.state.name()),
        }),
    }
}

/// Checks a correction form and builds the submission it describes.
///
/// A district-scoped form takes its district from the scope; the global form
/// must name one of the known districts.
pub fn validate_correction(
    scope: &Scope,
    input: &CorrectionDraft,
) -> Result<CorrectionSubmission, ValidationFailure> {
    let mut failure = ValidationFailure::default();

    let raw_price = input.proposed_price.trim();
    let proposed_price = if raw_price.is_empty() {
        failure.push(FormField::ProposedPrice, FieldProblem::Missing);
        None
    } else {
        match raw_price.parse::<f64>() {
            Ok(price) if price.is_finite() && price > 0.0 => Some(price),
            Ok(price) if price.is_finite() => {
                failure.push(FormField::ProposedPrice, FieldProblem::NotPositive);
                None
            }
            _ => {
                failure.push(FormField::ProposedPrice, FieldProblem::NotANumber);
                None
            }
        }
    };

    let location_label = input.location_label.trim();
    if location_label.is_empty() {
        failure.push(FormField::LocationLabel, FieldProblem::Missing);
    }

    let district = match scope {
        Scope::District(district) => Some(district.clone()),
        Scope::Global => match input.district.as_deref().map(str::trim) {
            None | Some("") => {
                failure.push(FormField::District, FieldProblem::Missing);
                None
            }
            Some(name) => {
                let known = District::known(name);
                if known.is_none() {
                    failure.push(FormField::District, FieldProblem::UnknownDistrict);
                }
                known
            }
        },
    };

    match (proposed_price, district) {
        (Some(proposed_price), Some(district)) if failure.is_empty() => Ok(CorrectionSubmission {
            scope: scope.clone(),
            proposed_price,
            location_label: location_label.to_string(),
            district,
            submitted_at: Utc::now(),
        }),
        _ => Err(failure),
    }
}

#[cfg(test)]
#[path = "tests/verification_tests.rs"]
mod tests;
