//! Account endpoints: registration, sessions, profile, passwords and memberships

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Multipart;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        membership::{CreateMembership, Membership, MembershipInfo, QuotaResetResponse},
        user::{
            LoginRequest, LoginResponse, PasswordChangeRequest, PasswordResetConfirm, PasswordResetRequest,
            PasswordResetVerify, RegisterRequest, UpdateProfile, User, UserDetail, UserInfo, UserSummary,
        },
        MessageResponse,
    },
    AppState,
};

use super::{AuthenticatedUser, FormData, StaffUser};

/// Register a new reader account
#[utoipa::path(
    post,
    path = "/accounts/register",
    tag = "accounts",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid input or email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    request.validate()?;
    let user = state.services.users.register(request, false).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Register a staff account
#[utoipa::path(
    post,
    path = "/accounts/register/staff",
    tag = "accounts",
    security(("bearer_auth" = [])),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Staff account created", body = User),
        (status = 400, description = "Invalid input or email already registered"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn register_staff(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    request.validate()?;
    let user = state.services.users.register(request, true).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/accounts/login",
    tag = "accounts",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = state
        .services
        .users
        .login(request.email.trim(), &request.password)
        .await?;
    Ok(Json(response))
}

/// Revoke the token used for this request
#[utoipa::path(
    post,
    path = "/accounts/logout",
    tag = "accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.logout(&claims).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Get current user info
#[utoipa::path(
    get,
    path = "/accounts/me",
    tag = "accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserInfo>> {
    let info = state.services.users.info(claims.user_id).await?;
    Ok(Json(info))
}

/// Update own profile; accepts an optional `image_file` part
#[utoipa::path(
    put,
    path = "/accounts/profile",
    tag = "accounts",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "first_name, last_name, phone and an optional image_file"),
    responses(
        (status = 200, description = "Profile updated", body = UserInfo),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<UserInfo>> {
    let form = FormData::read(multipart).await?;
    let profile = UpdateProfile {
        first_name: form.text("first_name"),
        last_name: form.text("last_name"),
        phone: form.text("phone"),
    };
    profile.validate()?;

    let image = form.images.into_iter().next();
    let info = state
        .services
        .users
        .update_profile(claims.user_id, profile, image)
        .await?;
    Ok(Json(info))
}

/// Change own password
#[utoipa::path(
    post,
    path = "/accounts/password/change",
    tag = "accounts",
    security(("bearer_auth" = [])),
    request_body = PasswordChangeRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong old password or mismatching new passwords")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<PasswordChangeRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .services
        .users
        .change_password(claims.user_id, request)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Email a password reset code
#[utoipa::path(
    post,
    path = "/accounts/password/reset/request",
    tag = "accounts",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 400, description = "Unknown email")
    )
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .services
        .users
        .request_password_reset(request.email.trim())
        .await?;
    Ok(Json(MessageResponse::new("A reset code has been sent to your email")))
}

/// Check a reset code without using it
#[utoipa::path(
    post,
    path = "/accounts/password/reset/verify",
    tag = "accounts",
    request_body = PasswordResetVerify,
    responses(
        (status = 200, description = "Code is valid", body = MessageResponse),
        (status = 400, description = "Invalid reset code or email")
    )
)]
pub async fn verify_reset_code(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetVerify>,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.verify_reset_code(&request).await?;
    Ok(Json(MessageResponse::new("Reset code is valid")))
}

/// Set a new password with a reset code
#[utoipa::path(
    post,
    path = "/accounts/password/reset",
    tag = "accounts",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid reset code or passwords")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirm>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.users.reset_password(request).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// Member status and quota usage of the caller
#[utoipa::path(
    get,
    path = "/accounts/membership",
    tag = "memberships",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Membership status", body = MembershipInfo),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn membership_info(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MembershipInfo>> {
    let info = state.services.memberships.info(claims.user_id).await?;
    Ok(Json(info))
}

/// Open a membership
#[utoipa::path(
    post,
    path = "/accounts/membership",
    tag = "memberships",
    security(("bearer_auth" = [])),
    request_body = CreateMembership,
    responses(
        (status = 201, description = "Membership created", body = Membership),
        (status = 403, description = "Only staff may create memberships for other users"),
        (status = 409, description = "User already has an active membership")
    )
)]
pub async fn create_membership(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateMembership>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let membership = state.services.memberships.create(&claims, request).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// Move a membership's next recurrence one period forward
#[utoipa::path(
    post,
    path = "/accounts/memberships/{id}/advance",
    tag = "memberships",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Membership ID")),
    responses(
        (status = 200, description = "Recurrence advanced", body = Membership),
        (status = 404, description = "Membership not found")
    )
)]
pub async fn advance_membership(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Membership>> {
    let membership = state.services.memberships.advance_recurrence(id).await?;
    Ok(Json(membership))
}

#[utoipa::path(
    post,
    path = "/accounts/memberships/{id}/deactivate",
    tag = "memberships",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Membership ID")),
    responses(
        (status = 200, description = "Membership deactivated", body = Membership),
        (status = 404, description = "Membership not found")
    )
)]
pub async fn deactivate_membership(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Membership>> {
    let membership = state.services.memberships.deactivate(id).await?;
    Ok(Json(membership))
}

/// List all users
#[utoipa::path(
    get,
    path = "/accounts/users",
    tag = "accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Users", body = Vec<UserSummary>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let users = state.services.users.list().await?;
    Ok(Json(users))
}

/// User detail with membership, payment and rental history
#[utoipa::path(
    get,
    path = "/accounts/users/{id}",
    tag = "accounts",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User detail", body = UserDetail),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<UserDetail>> {
    let detail = state.services.users.detail(id).await?;
    Ok(Json(detail))
}

/// Reset the free-book counter of every active membership
#[utoipa::path(
    post,
    path = "/accounts/users/reset-quota",
    tag = "memberships",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Quotas reset", body = QuotaResetResponse),
        (status = 403, description = "Staff only")
    )
)]
pub async fn reset_quota(
    State(state): State<AppState>,
    StaffUser(_claims): StaffUser,
) -> AppResult<Json<QuotaResetResponse>> {
    let reset = state.services.memberships.reset_quota().await?;
    Ok(Json(QuotaResetResponse {
        detail: "Monthly quotas reset".to_string(),
        reset,
    }))
}
