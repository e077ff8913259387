//! Quiz flow: profile intake, scenario questions and the personality report.
//!
//! A session moves through three stages. Input collects the profile and
//! fetches the first batch of questions; Testing records one answer per
//! question (loading the rest of the run on the first answer when two-phase
//! loading is on); Analyzing produces the report, blocking or streamed.
//! `StageController` owns the transitions, `routes` exposes them over HTTP.

pub mod controller;
pub mod model;
pub mod prompts;
pub mod report;
pub mod routes;
pub mod state;
pub mod store;
pub mod supplier;
pub mod view;

pub use controller::{ReportEventStream, StageController, spawn_sweep_task};
pub use model::{AgeBand, Answer, Choice, Environment, Profile, ProfileForm, Question};
pub use report::{ReportBuffer, ReportEvent, ReportGenerator};
pub use routes::{AppState, quiz_routes};
pub use state::{Session, Stage};
pub use store::SessionStore;
pub use supplier::QuestionSupplier;
pub use view::View;
