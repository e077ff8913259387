//! StageController: drives a session through Input → Testing → Analyzing,
//! calling the question supplier and report generator at the right
//! transitions.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{Answer, Choice, ProfileForm, Question};
use super::report::{ReportBuffer, ReportEvent, ReportGenerator};
use super::state::{Session, Stage};
use super::store::SessionStore;
use super::supplier::QuestionSupplier;
use super::view::View;
use crate::config::{LoadingMode, QuizConfig};
use crate::error::{LlmError, QuizError};
use crate::llm::{LlmProvider, TextStream};

/// Streamed report as seen by the view layer.
pub type ReportEventStream = Pin<Box<dyn Stream<Item = Result<ReportEvent, QuizError>> + Send>>;

/// How often the idle sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background fetch of the rest of one run's questions.
struct Prefetch {
    run_id: Uuid,
    handle: JoinHandle<Result<Vec<Question>, QuizError>>,
}

/// Coordinates the quiz flow for every session in the store.
///
/// Every action validates the stage first, does any service call without
/// holding the store lock, then commits in a single `update` that
/// re-checks the session has not moved on in the meantime. A failed
/// service call therefore leaves the session exactly as it was.
pub struct StageController {
    store: Arc<SessionStore>,
    supplier: QuestionSupplier,
    reporter: ReportGenerator,
    quiz: QuizConfig,
    prefetches: Mutex<HashMap<Uuid, Prefetch>>,
}

impl StageController {
    pub fn new(store: Arc<SessionStore>, llm: Arc<dyn LlmProvider>, quiz: QuizConfig) -> Self {
        Self {
            store,
            supplier: QuestionSupplier::new(Arc::clone(&llm), quiz.language.clone()),
            reporter: ReportGenerator::new(llm, quiz.language.clone()),
            quiz,
            prefetches: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Render model for the session's current stage.
    pub async fn view(&self, id: Uuid) -> View {
        View::of(&self.store.get(id).await)
    }

    /// Input stage: validate the form, fetch the first batch, move to Testing.
    pub async fn start(&self, id: Uuid, form: ProfileForm) -> Result<View, QuizError> {
        let session = self.store.get(id).await;
        expect_stage(&session, Stage::Input)?;

        let profile = form.validate()?;
        let description = profile.describe();
        let two_phase = self.quiz.is_two_phase();

        let questions = self
            .supplier
            .fetch_questions(&description, self.quiz.first_batch(), &[])
            .await
            .inspect_err(|e| warn!(session_id = %id, error = %e, "Question fetch failed"))?;

        let run_id = session.run_id;
        let (view, shown) = self
            .store
            .update(id, |s| {
                if s.stage != Stage::Input || s.run_id != run_id {
                    return Err(QuizError::Conflict);
                }
                s.profile = Some(profile);
                s.questions = questions;
                s.answers.clear();
                s.report = None;
                s.pending_background_load = two_phase;
                if s.advance_to(Stage::Testing).is_err() {
                    return Err(QuizError::Conflict);
                }
                let shown: Vec<String> = s.questions.iter().map(|q| q.prompt.clone()).collect();
                Ok((View::of(s), shown))
            })
            .await?;

        info!(
            session_id = %id,
            questions = shown.len(),
            two_phase,
            "Run started"
        );

        if two_phase && self.quiz.loading_mode == LoadingMode::Prefetch {
            let remaining = self.quiz.question_count.saturating_sub(shown.len());
            self.spawn_prefetch(id, run_id, description, shown, remaining);
        }

        Ok(view)
    }

    /// Testing stage: record the chosen option for the current question.
    ///
    /// `None` means nothing was selected; the session is left untouched.
    pub async fn confirm(&self, id: Uuid, choice: Option<Choice>) -> Result<View, QuizError> {
        let session = self.store.get(id).await;
        expect_stage(&session, Stage::Testing)?;

        let Some(choice) = choice else {
            return Err(QuizError::Validation(
                "Choose the option closest to your first instinct.".to_string(),
            ));
        };

        let idx = session.current_index();
        let Some(question) = session.current_question().cloned() else {
            return Err(QuizError::Conflict);
        };

        // Nothing is committed until the remainder is in hand.
        let extra = if session.pending_background_load {
            self.load_remainder(id, &session)
                .await
                .inspect_err(|e| warn!(session_id = %id, error = %e, "Remainder fetch failed"))?
        } else {
            Vec::new()
        };

        let run_id = session.run_id;
        self.store
            .update(id, move |s| {
                if s.stage != Stage::Testing
                    || s.run_id != run_id
                    || s.current_index() != idx
                {
                    return Err(QuizError::Conflict);
                }
                s.answers.push(Answer::new(&question, choice));
                if s.pending_background_load {
                    info!(session_id = %s.id, added = extra.len(), "Remaining questions loaded");
                    s.questions.extend(extra);
                    s.pending_background_load = false;
                }
                if s.is_complete() && s.advance_to(Stage::Analyzing).is_ok() {
                    info!(session_id = %s.id, answers = s.answers.len(), "All questions answered");
                }
                s.touch();
                Ok(View::of(s))
            })
            .await
    }

    /// Analyzing stage: generate the report in one call, or return the cached one.
    pub async fn report(&self, id: Uuid) -> Result<View, QuizError> {
        let session = self.store.get(id).await;
        expect_stage(&session, Stage::Analyzing)?;
        if session.report.is_some() {
            return Ok(View::of(&session));
        }

        let profile = describe_profile(&session)?;
        let report = self
            .reporter
            .generate_report(&profile, &session.answers)
            .await
            .inspect_err(|e| warn!(session_id = %id, error = %e, "Report generation failed"))?;

        let run_id = session.run_id;
        self.store
            .update(id, |s| {
                if s.stage != Stage::Analyzing || s.run_id != run_id {
                    return Err(QuizError::Conflict);
                }
                if s.report.is_none() {
                    s.report = Some(report);
                    s.touch();
                }
                Ok(View::of(s))
            })
            .await
    }

    /// Analyzing stage: stream the report fragment by fragment.
    ///
    /// The completed text is cached in the session when the stream ends
    /// cleanly. A cached report is replayed as a single `Done` event.
    pub async fn stream_report(&self, id: Uuid) -> Result<ReportEventStream, QuizError> {
        let session = self.store.get(id).await;
        expect_stage(&session, Stage::Analyzing)?;

        if let Some(report) = session.report {
            return Ok(Box::pin(futures::stream::iter([Ok(ReportEvent::Done {
                report,
            })])));
        }

        let profile = describe_profile(&session)?;
        let fragments = self
            .reporter
            .stream_report(&profile, &session.answers)
            .await
            .inspect_err(|e| warn!(session_id = %id, error = %e, "Report stream failed to open"))?;

        let state = ReportStreamState {
            fragments,
            buffer: ReportBuffer::new(),
            store: Arc::clone(&self.store),
            id,
            run_id: session.run_id,
            finished: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, next_report_event)))
    }

    /// Discard the run and go back to Input.
    pub async fn restart(&self, id: Uuid) -> View {
        if let Some(prefetch) = self.lock_prefetches().remove(&id) {
            prefetch.handle.abort();
        }
        View::of(&self.store.reset(id).await)
    }

    /// Prune sessions idle longer than `max_idle`, then abort any prefetch
    /// whose run no longer exists. Returns how many sessions went.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let pruned = self.store.prune_idle(max_idle).await;

        let candidates: Vec<(Uuid, Uuid)> = self
            .lock_prefetches()
            .iter()
            .map(|(id, p)| (*id, p.run_id))
            .collect();
        if candidates.is_empty() {
            return pruned;
        }

        let live = self.store.run_ids().await;
        let mut prefetches = self.lock_prefetches();
        let mut dropped = 0;
        for (id, run_id) in candidates {
            if live.get(&id) == Some(&run_id) {
                continue;
            }
            // Only the entry seen above; a newer run may have replaced it.
            if prefetches.get(&id).is_some_and(|p| p.run_id == run_id) {
                if let Some(prefetch) = prefetches.remove(&id) {
                    prefetch.handle.abort();
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            info!(dropped, remaining = prefetches.len(), "Dropped orphaned prefetches");
        }
        pruned
    }

    #[cfg(test)]
    fn prefetch_count(&self) -> usize {
        self.lock_prefetches().len()
    }

    fn lock_prefetches(&self) -> MutexGuard<'_, HashMap<Uuid, Prefetch>> {
        self.prefetches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_prefetch(
        &self,
        id: Uuid,
        run_id: Uuid,
        profile: String,
        exclude: Vec<String>,
        remaining: usize,
    ) {
        if remaining == 0 {
            return;
        }
        let supplier = self.supplier.clone();
        let handle = tokio::spawn(async move {
            supplier
                .fetch_questions(&profile, remaining, &exclude)
                .await
        });
        info!(session_id = %id, remaining, "Prefetching remaining questions");
        if let Some(previous) = self.lock_prefetches().insert(id, Prefetch { run_id, handle }) {
            previous.handle.abort();
        }
    }

    /// Fetch (or join the prefetch of) the questions not yet loaded.
    async fn load_remainder(&self, id: Uuid, session: &Session) -> Result<Vec<Question>, QuizError> {
        let remaining = self
            .quiz
            .question_count
            .saturating_sub(session.questions.len());
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let prefetch = self.lock_prefetches().remove(&id);
        match prefetch {
            Some(prefetch) if prefetch.run_id == session.run_id => {
                // A failed prefetch is not retried here; the next confirm
                // falls through to a synchronous fetch.
                return match prefetch.handle.await {
                    Ok(result) => result,
                    Err(e) => Err(QuizError::Service(LlmError::RequestFailed {
                        provider: "prefetch".to_string(),
                        reason: e.to_string(),
                    })),
                };
            }
            Some(stale) => stale.handle.abort(),
            None => {}
        }

        let profile = describe_profile(session)?;
        let exclude: Vec<String> = session.questions.iter().map(|q| q.prompt.clone()).collect();
        self.supplier
            .fetch_questions(&profile, remaining, &exclude)
            .await
    }
}

/// Spawn the background sweep that prunes idle sessions every minute.
pub fn spawn_sweep_task(controller: Arc<StageController>, max_idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            controller.sweep_idle(max_idle).await;
        }
    })
}

fn expect_stage(session: &Session, expected: Stage) -> Result<(), QuizError> {
    if session.stage == expected {
        Ok(())
    } else {
        Err(QuizError::WrongStage {
            expected,
            actual: session.stage,
        })
    }
}

fn describe_profile(session: &Session) -> Result<String, QuizError> {
    session
        .profile
        .as_ref()
        .map(|p| p.describe())
        .ok_or(QuizError::Conflict)
}

struct ReportStreamState {
    fragments: TextStream,
    buffer: ReportBuffer,
    store: Arc<SessionStore>,
    id: Uuid,
    run_id: Uuid,
    finished: bool,
}

async fn next_report_event(
    mut st: ReportStreamState,
) -> Option<(Result<ReportEvent, QuizError>, ReportStreamState)> {
    if st.finished {
        return None;
    }
    match st.fragments.next().await {
        Some(Ok(fragment)) => {
            st.buffer.push(&fragment);
            let display = st.buffer.display();
            Some((Ok(ReportEvent::Chunk { fragment, display }), st))
        }
        Some(Err(e)) => {
            warn!(
                session_id = %st.id,
                received = st.buffer.fragments(),
                error = %e,
                "Report stream broke"
            );
            st.finished = true;
            Some((Err(QuizError::Service(e)), st))
        }
        None => {
            st.finished = true;
            let report = std::mem::take(&mut st.buffer).finish();
            let run_id = st.run_id;
            let cached = report.clone();
            st.store
                .update(st.id, move |s| {
                    if s.stage == Stage::Analyzing
                        && s.run_id == run_id
                        && s.report.is_none()
                    {
                        s.report = Some(cached);
                        s.touch();
                    }
                })
                .await;
            info!(session_id = %st.id, chars = report.chars().count(), "Report stream finished");
            Some((Ok(ReportEvent::Done { report }), st))
        }
    }
}
