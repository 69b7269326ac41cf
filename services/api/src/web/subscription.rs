//! services/api/src/web/subscription.rs
//!
//! Subscription plans and the caller's upload entitlement.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use mangati_core::{check_roles, rules, SubscriptionStatus};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{HttpError, HttpResult};
use crate::web::denied;
use crate::web::dto::{AssignSubscriptionRequest, PlanDto, SubscriptionDto};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

/// GET /api/subscription - The caller's plan and how much of this month's quota is left
#[utoipa::path(
    get,
    path = "/api/subscription",
    tag = "subscription",
    responses(
        (status = 200, description = "Current entitlement", body = SubscriptionDto),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No subscription")
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_subscription_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> HttpResult<Json<SubscriptionDto>> {
    let subscription = state
        .db
        .get_subscription(caller.user_id)
        .await?
        .ok_or_else(|| HttpError::not_found("No subscription"))?;
    Ok(Json(SubscriptionDto::at(&subscription, Utc::now())))
}

/// GET /api/subscription/plans - The plans a user can be put on
#[utoipa::path(
    get,
    path = "/api/subscription/plans",
    tag = "subscription",
    responses((status = 200, description = "Available plans", body = [PlanDto]))
)]
pub async fn list_plans_handler(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<PlanDto>>> {
    let plans = state.db.list_plans().await?;
    Ok(Json(plans.iter().map(PlanDto::from).collect()))
}

/// PUT /api/subscription/{userId} - Assign or change a user's plan
#[utoipa::path(
    put,
    path = "/api/subscription/{userId}",
    tag = "subscription",
    params(("userId" = Uuid, Path, description = "User id")),
    request_body = AssignSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription after the change", body = SubscriptionDto),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Unknown user or plan")
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_subscription_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignSubscriptionRequest>,
) -> HttpResult<Json<SubscriptionDto>> {
    check_roles(Some(&caller), &rules::ASSIGN_SUBSCRIPTION)
        .map_err(|e| denied("assign subscription", &caller, e))?;

    let now = Utc::now();
    let status = req.status.unwrap_or(SubscriptionStatus::Active);
    let subscription = state
        .db
        .upsert_subscription(user_id, req.plan_id, status, now)
        .await?;
    info!(
        "Admin {} set subscription of {} to plan {} ({})",
        caller.user_id,
        user_id,
        subscription.plan.name,
        status.as_str()
    );
    Ok(Json(SubscriptionDto::at(&subscription, now)))
}
