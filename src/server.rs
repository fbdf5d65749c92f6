//! HTTP surface
//!
//! Thin axum layer over the core components. The authentication
//! middleware verifies the bearer credential, reconciles the identity
//! record, and threads the current user into handlers as an explicit
//! per-request extension; nothing here is ambient or global.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::IdentityProvider;
use crate::error::ApiError;
use crate::executor::CodeExecutor;
use crate::identity;
use crate::judger::{self, Verdict};
use crate::ledger::{self, SolveStats, SolveSubmission};
use crate::problems::ProblemCatalog;
use crate::store::{IdentityRecord, Role, SolveRecord, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub executor: Arc<dyn CodeExecutor>,
    pub provider: Arc<dyn IdentityProvider>,
    pub catalog: Arc<ProblemCatalog>,
}

/// Authenticated user for the current request.
#[derive(Clone)]
pub struct CurrentUser(pub IdentityRecord);

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/problems/solved", post(mark_problem_solved))
        .route("/problems/my-solved", get(my_solved_problems))
        .route("/problems/{id}/run", post(run_problem))
        .route("/users/me", get(get_me).put(update_me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ));

    Router::new()
        .route("/problems", get(list_problems))
        .route("/problems/{id}", get(get_problem))
        .merge(protected)
        .with_state(state)
}

/// Verify the bearer credential and reconcile the local identity record.
/// Runs before every protected handler; a request without verifiable
/// claims fails closed with 401 and provisions nothing.
async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state
        .provider
        .verify(bearer)
        .await
        .map_err(|_| ApiError::Unauthorized)?;

    let user = identity::reconcile(state.store.as_ref(), &claims).await?;
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

async fn list_problems(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "problems": state.catalog.all() }))
}

async fn get_problem(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let problem = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Problem not found".into()))?;
    Ok(Json(json!({ "problem": problem })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    #[serde(default)]
    language: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    verdict: Verdict,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solved_problem: Option<SolveRecord>,
}

/// Run a submission through the sandbox, judge it, and on a passing
/// verdict record the solve before responding. The ledger write happens
/// inline in this future: an aborted request never records a solve whose
/// result was not delivered.
async fn run_problem(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(body): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let problem = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Problem not found".into()))?;

    if body.language.is_empty() || !problem.supports_language(&body.language) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported language: {}",
            body.language
        )));
    }

    let outcome = judger::judge(
        state.executor.as_ref(),
        &body.language,
        &body.code,
        &problem.expected_output,
    )
    .await;

    let solved_problem = if outcome.passed() {
        let (record, created) = ledger::record_solve(
            state.store.as_ref(),
            SolveSubmission {
                user_id: user.external_id.clone(),
                problem_key: problem.title.clone(),
                problem_slug: problem.id.clone(),
                difficulty: problem.difficulty.clone(),
                session_ref: None,
                code: body.code.clone(),
                language: body.language.clone(),
            },
        )
        .await?;
        info!(
            "Solve recorded via run: user={}, problem={}, first={}",
            user.external_id, problem.id, created
        );
        Some(record)
    } else {
        None
    };

    Ok(Json(RunResponse {
        verdict: outcome.verdict,
        output: outcome.output,
        error: outcome.error,
        solved_problem,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkSolvedRequest {
    #[serde(default)]
    problem: String,
    #[serde(default)]
    problem_id: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    code: String,
    #[serde(default)]
    language: String,
}

async fn mark_problem_solved(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<MarkSolvedRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if body.problem.is_empty() || body.difficulty.is_empty() {
        return Err(ApiError::BadRequest(
            "Problem and difficulty are required".into(),
        ));
    }

    let (record, created) = ledger::record_solve(
        state.store.as_ref(),
        SolveSubmission {
            user_id: user.external_id,
            problem_key: body.problem,
            problem_slug: body.problem_id,
            difficulty: body.difficulty,
            session_ref: body.session_id,
            code: body.code,
            language: body.language,
        },
    )
    .await?;

    let (status, message) = if created {
        (StatusCode::CREATED, "Problem marked as solved")
    } else {
        (StatusCode::OK, "Solved problem updated")
    };

    Ok((
        status,
        Json(json!({ "message": message, "solvedProblem": record })),
    ))
}

/// Solve record view without the submitted code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveSummary {
    problem: String,
    problem_id: String,
    difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    language: String,
    solved_at: DateTime<Utc>,
}

impl From<SolveRecord> for SolveSummary {
    fn from(record: SolveRecord) -> Self {
        Self {
            problem: record.problem_key,
            problem_id: record.problem_slug,
            difficulty: record.difficulty,
            session_id: record.session_ref,
            language: record.language,
            solved_at: record.solved_at,
        }
    }
}

async fn my_solved_problems(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let records = ledger::solved_problems(state.store.as_ref(), &user.external_id).await?;
    let stats = ledger::solve_stats(state.store.as_ref(), &user.external_id).await?;

    let summaries: Vec<SolveSummary> = records.into_iter().map(SolveSummary::from).collect();

    Ok(Json(json!({
        "solvedProblems": summaries,
        "stats": stats,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: String,
    name: String,
    email: String,
    profile_image: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl From<&IdentityRecord> for UserView {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.external_id.clone(),
            name: record.display_name.clone(),
            email: record.email.clone(),
            profile_image: record.avatar_url.clone(),
            role: record.role,
            created_at: record.created_at,
        }
    }
}

async fn get_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats: SolveStats = ledger::solve_stats(state.store.as_ref(), &user.external_id).await?;

    Ok(Json(json!({
        "user": UserView::from(&user),
        "stats": stats,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMeRequest {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// The explicit role-change operation. This is the only place `role`
/// is ever mutated.
async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut dirty = false;

    if let Some(name) = body.display_name.filter(|n| !n.is_empty()) {
        if user.display_name != name {
            user.display_name = name;
            dirty = true;
        }
    }

    if let Some(raw) = body.role {
        let role = Role::parse(&raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid role: {}", raw)))?;
        if user.role != role {
            user.role = role;
            dirty = true;
        }
    }

    if dirty {
        state.store.save_user(&user).await?;
        info!("Updated profile: external_id={}", user.external_id);
    }

    Ok(Json(json!({ "user": UserView::from(&user) })))
}
