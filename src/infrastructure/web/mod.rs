//! Web 服务器模块
//!
//! 提供凭证签发/查询/核销/撤销与注册登录的 HTTP API。
//! 处理器保持无状态，所有真相都在存储里；终端轮询余额走 GET 查询接口。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::core::issuer::{NewVoucher, VoucherIssuer};
use crate::core::redeemer::VoucherRedeemer;
use crate::core::store::Store;
use crate::domain::{IndividualUser, Institution, OwnerType, Voucher};
use crate::errors::PlatformError;
use crate::infrastructure::auth::{AccountInfo, JwtService, PasswordService};

// ==================== 错误响应 ====================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// 错误分类到 HTTP 状态码的唯一映射点
fn error_response(err: &PlatformError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        PlatformError::Validation(_) | PlatformError::Revoked => StatusCode::BAD_REQUEST,
        PlatformError::NotFound => StatusCode::NOT_FOUND,
        PlatformError::Exhausted | PlatformError::Conflict(_) => StatusCode::CONFLICT,
        PlatformError::Expired => StatusCode::GONE,
        PlatformError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        PlatformError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        PlatformError::Storage(_) | PlatformError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // 存储细节不外露
    let message = match err {
        PlatformError::Storage(_) | PlatformError::Config(_) => "Database error".to_string(),
        _ => err.to_string(),
    };

    (status, Json(ErrorResponse { error: message }))
}

// ==================== 状态 ====================

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub issuer: VoucherIssuer,
    pub redeemer: VoucherRedeemer,
    pub jwt_service: JwtService,
}

// ==================== 请求类型 ====================

/// 字段全部可选，缺失项在签发校验里统一拒绝，
/// 保证错误响应形状一致（而不是交给反序列化层报 422）
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVoucherRequest {
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub institution_id: Option<String>,
    pub assigned_plays: Option<i64>,
    pub amount_paid: Option<f64>,
    pub expires_in_minutes: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    /// 终端自生成的请求ID，用于超时重发的安全重试
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// "individual" | "institution"
    pub role: String,
    pub institution_name: Option<String>,
}

#[derive(Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

// ==================== 响应类型 ====================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVoucherResponse {
    pub token: String,
    pub assigned_plays: u32,
    pub amount_paid: f64,
    pub expires_at: Option<i64>,
}

/// 凭证查询视图：状态按当前时钟重新推导
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherView {
    pub token: String,
    pub owner_id: String,
    pub owner_type: OwnerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    pub assigned_plays: u32,
    pub used_plays: u32,
    pub remaining_plays: u32,
    pub amount_paid: f64,
    pub status: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl VoucherView {
    fn from_voucher(voucher: &Voucher, now: i64) -> Self {
        Self {
            token: voucher.token.clone(),
            owner_id: voucher.owner_id.clone(),
            owner_type: voucher.owner_type,
            institution_id: voucher.institution_id.clone(),
            assigned_plays: voucher.assigned_plays,
            used_plays: voucher.used_plays,
            remaining_plays: voucher.remaining_plays(),
            amount_paid: voucher.amount_paid,
            status: voucher.effective_status(now).to_string(),
            created_at: voucher.created_at,
            expires_at: voucher.expires_at,
        }
    }
}

// ==================== 处理器 ====================

/// 健康检查
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 签发凭证
async fn issue_voucher(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IssueVoucherRequest>,
) -> impl IntoResponse {
    let owner_type = match req.user_type.as_deref() {
        None => {
            return error_response(&PlatformError::Validation(
                "userType is required".to_string(),
            ))
            .into_response()
        }
        Some(s) => match s.parse::<OwnerType>() {
            Ok(t) => t,
            Err(_) => {
                return error_response(&PlatformError::Validation(
                    "userType must be 'individual' or 'student'".to_string(),
                ))
                .into_response()
            }
        },
    };

    let new_voucher = NewVoucher {
        owner_id: req.user_id.unwrap_or_default(),
        owner_type,
        institution_id: req.institution_id,
        // 缺失按 0 处理，签发校验会以同一个错误拒绝
        assigned_plays: req.assigned_plays.unwrap_or(0),
        amount_paid: req.amount_paid,
        expires_in_minutes: req.expires_in_minutes,
    };

    match state.issuer.issue(new_voucher).await {
        Ok(voucher) => (
            StatusCode::CREATED,
            Json(IssueVoucherResponse {
                token: voucher.token,
                assigned_plays: voucher.assigned_plays,
                amount_paid: voucher.amount_paid,
                expires_at: voucher.expires_at,
            }),
        )
            .into_response(),
        Err(e) => {
            if !matches!(e, PlatformError::Validation(_)) {
                error!("Failed to issue voucher: {}", e);
            }
            error_response(&e).into_response()
        }
    }
}

/// 查询凭证当前状态（纯读取，终端轮询余额用）
async fn get_voucher(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.store.get_voucher(&token).await {
        Ok(Some(voucher)) => {
            Json(VoucherView::from_voucher(&voucher, Utc::now().timestamp())).into_response()
        }
        Ok(None) => error_response(&PlatformError::NotFound).into_response(),
        Err(e) => {
            error!("Failed to load voucher: {}", e);
            error_response(&e).into_response()
        }
    }
}

/// 核销一次游玩（终端接口）
///
/// 请求体可选：老终端直接空体 POST，新终端带 `requestId` 获得安全重试
async fn redeem_voucher(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let request_id = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<RedeemRequest>(&body) {
            Ok(req) => req.request_id,
            Err(_) => {
                return error_response(&PlatformError::Validation(
                    "request body must be JSON".to_string(),
                ))
                .into_response()
            }
        }
    };

    match state
        .redeemer
        .redeem(&token, request_id.as_deref())
        .await
    {
        Ok(receipt) => Json(serde_json::json!({
            "ok": true,
            "remainingPlays": receipt.remaining_plays,
        }))
        .into_response(),
        Err(e) => {
            if matches!(e, PlatformError::Storage(_) | PlatformError::TransientStore(_)) {
                error!("Failed to redeem voucher: {}", e);
            }
            error_response(&e).into_response()
        }
    }
}

/// 撤销凭证（带外管理操作）
async fn revoke_voucher(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    match state.redeemer.revoke(&token).await {
        Ok(voucher) => Json(serde_json::json!({
            "ok": true,
            "status": voucher.status.to_string(),
        }))
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// 注册（个人或机构）
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    info!("Register attempt: {}", req.email);

    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return error_response(&PlatformError::Validation(
            "name, email and password are required".to_string(),
        ))
        .into_response();
    }

    let password_hash = match PasswordService::hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Failed to hash password: {}", e);
            return error_response(&e).into_response();
        }
    };

    match req.role.as_str() {
        "individual" => {
            let user = IndividualUser::new(req.name, req.email, password_hash);
            match state.store.insert_individual(&user).await {
                Ok(()) => (
                    StatusCode::CREATED,
                    Json(serde_json::json!({ "success": true, "userId": user.id })),
                )
                    .into_response(),
                Err(e) => error_response(&e).into_response(),
            }
        }
        "institution" => {
            let institution_name = match req.institution_name {
                Some(name) if !name.trim().is_empty() => name,
                _ => {
                    return error_response(&PlatformError::Validation(
                        "institutionName is required".to_string(),
                    ))
                    .into_response()
                }
            };

            let institution =
                Institution::new(req.name, institution_name, req.email, password_hash);
            match state.store.insert_institution(&institution).await {
                Ok(()) => (
                    StatusCode::CREATED,
                    Json(serde_json::json!({ "success": true, "institutionId": institution.id })),
                )
                    .into_response(),
                Err(e) => error_response(&e).into_response(),
            }
        }
        _ => error_response(&PlatformError::Validation(
            "role must be 'individual' or 'institution'".to_string(),
        ))
        .into_response(),
    }
}

/// 登录：先查个人用户表，再查机构表
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthRequest>,
) -> impl IntoResponse {
    info!("Login attempt: {}", req.email);

    if req.email.trim().is_empty() || req.password.is_empty() {
        return error_response(&PlatformError::Validation(
            "email and password are required".to_string(),
        ))
        .into_response();
    }

    let account = match find_account(&state, &req.email, &req.password).await {
        Ok(found) => found,
        Err(e) => {
            error!("Database error during login: {}", e);
            return error_response(&e).into_response();
        }
    };

    let Some(account) = account else {
        // 不透露命中了哪张表
        return error_response(&PlatformError::Unauthorized(
            "Invalid credentials".to_string(),
        ))
        .into_response();
    };

    match state.jwt_service.generate_token(&account) {
        Ok(token) => Json(serde_json::json!({
            "success": true,
            "token": token,
            "role": account.account_type,
            "user": account,
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to generate token: {}", e);
            error_response(&e).into_response()
        }
    }
}

/// 凭邮箱+密码在两类账户中定位，未命中返回 None
async fn find_account(
    state: &AppState,
    email: &str,
    password: &str,
) -> crate::errors::Result<Option<AccountInfo>> {
    if let Some(user) = state.store.find_individual_by_email(email).await? {
        if PasswordService::verify_password(&user.password_hash, password)? {
            return Ok(Some(AccountInfo {
                id: user.id,
                name: user.name,
                email: user.email,
                account_type: "individual".to_string(),
                institution_name: None,
            }));
        }
        return Ok(None);
    }

    if let Some(institution) = state.store.find_institution_by_email(email).await? {
        if PasswordService::verify_password(&institution.password_hash, password)? {
            return Ok(Some(AccountInfo {
                id: institution.id,
                name: institution.admin_name,
                email: institution.email,
                account_type: "institution".to_string(),
                institution_name: Some(institution.institution_name),
            }));
        }
    }

    Ok(None)
}

// ==================== 路由 ====================

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/vouchers", post(issue_voucher))
        .route("/vouchers/{token}", get(get_voucher))
        .route("/vouchers/{token}/redeem", post(redeem_voucher))
        .route("/vouchers/{token}/revoke", post(revoke_voucher))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 启动 Web 服务
pub async fn start_web_server(bind_addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Web server started on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
