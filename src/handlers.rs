// src/handlers.rs
use crate::auth::{
    create_jwt, generate_refresh_token, hash_password, refresh_token_expiry, verify_password,
    AuthUser,
};
use crate::models::{
    AssignedDay, AssignedDayMarker, AuthResponse, CalendarRangeQuery, CreateDailyTaskSchema,
    CreateTemplateSchema, DailyTask, DayTemplateDetail, LoginSchema, RefreshRequest,
    RegisterSchema, TemplateInfo, UpdateDailyTaskSchema, UpdateTemplateSchema, User,
};
use crate::validation::ValidatedJson;
use crate::AppError;
use crate::AppState;
use crate::{assignment, grouping, templates};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde_json::json;

// --- 1. 用户注册 (POST /api/register) ---
pub async fn register_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterSchema>,
) -> Result<Json<serde_json::Value>, AppError> {
    let hashed_password = hash_password(&payload.password).map_err(|_| AppError::Internal)?;

    // 用户名重复由 users.username 的唯一约束兜底, 统一映射成 409
    let _ = sqlx::query("INSERT INTO users (username, password_hash) VALUES ($1, $2)")
        .bind(&payload.username)
        .bind(hashed_password)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({"message": "User registered successfully"})))
}

// --- 2. 用户登录 (POST /api/login) ---
pub async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginSchema>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Auth("Invalid username or password".into()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(AppError::Auth("Invalid username or password".into()));
    }

    let token = create_jwt(user.id, &user.username).map_err(|_| AppError::Internal)?;

    // 下发长效刷新令牌, 换取新 Access Token 时轮换
    let refresh_token = generate_refresh_token();
    sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(&refresh_token)
        .bind(user.id)
        .bind(refresh_token_expiry())
        .execute(&state.db)
        .await?;

    Ok(Json(AuthResponse {
        token,
        refresh_token: Some(refresh_token),
        username: user.username,
    }))
}

// --- 3. 刷新 Access Token (POST /api/refresh) ---
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user_id, username) = sqlx::query_as::<_, (i32, String)>(
        "SELECT u.id, u.username
         FROM refresh_tokens r
         JOIN users u ON u.id = r.user_id
         WHERE r.token = $1 AND r.expires_at > NOW()",
    )
    .bind(&payload.refresh_token)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Auth("刷新令牌无效或已过期".into()))?;

    // 旧令牌作废, 换发新令牌
    sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
        .bind(&payload.refresh_token)
        .execute(&state.db)
        .await?;

    let refresh_token = generate_refresh_token();
    sqlx::query("INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(&refresh_token)
        .bind(user_id)
        .bind(refresh_token_expiry())
        .execute(&state.db)
        .await?;

    let token = create_jwt(user_id, &username).map_err(|_| AppError::Internal)?;

    Ok(Json(AuthResponse {
        token,
        refresh_token: Some(refresh_token),
        username,
    }))
}

// --- 4. 日模板 CRUD (GET/POST /api/templates, ...) ---
pub async fn get_templates_handler(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DayTemplateDetail>>, AppError> {
    let templates = templates::list_templates(&state.db, user.id).await?;
    Ok(Json(templates))
}

pub async fn get_template_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DayTemplateDetail>, AppError> {
    let detail = templates::get_template(&state.db, user.id, id).await?;
    Ok(Json(detail))
}

pub async fn create_template_handler(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateTemplateSchema>,
) -> Result<Json<DayTemplateDetail>, AppError> {
    let detail = templates::create_template(&state.db, user.id, body).await?;
    Ok(Json(detail))
}

pub async fn update_template_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UpdateTemplateSchema>,
) -> Result<Json<DayTemplateDetail>, AppError> {
    let detail = templates::update_template(&state.db, user.id, id, body).await?;
    Ok(Json(detail))
}

pub async fn delete_template_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    templates::delete_template(&state.db, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- 5. 指派与物化 (POST/DELETE /api/days/:date/templates/:template_id) ---
pub async fn assign_template_handler(
    Path((date, template_id)): Path<(NaiveDate, i32)>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AssignedDay>, AppError> {
    let assigned = assignment::assign_template(&state.db, user.id, date, template_id).await?;
    Ok(Json(assigned))
}

pub async fn unassign_template_handler(
    Path((date, template_id)): Path<(NaiveDate, i32)>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    assignment::unassign_template(&state.db, user.id, date, template_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- 6. 日历区间聚合 (GET /api/calendar?start=...&end=...) ---
pub async fn get_calendar_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Query(range): Query<CalendarRangeQuery>,
) -> Result<Json<Vec<AssignedDayMarker>>, AppError> {
    let markers =
        assignment::list_assigned_range(&state.db, user.id, range.start, range.end).await?;
    Ok(Json(markers))
}

// --- 7. 某一天的任务列表 (GET /api/days/:date/tasks) ---
// 排序是明确契约: 自定义任务在前, 然后按模板 ID / 组内顺序排
pub async fn get_day_tasks_handler(
    Path(date): Path<NaiveDate>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DailyTask>>, AppError> {
    let tasks = sqlx::query_as::<_, DailyTask>(
        "SELECT * FROM daily_tasks
         WHERE user_id = $1 AND date = $2
         ORDER BY (source_type = 'custom') DESC, template_id, position, id",
    )
    .bind(user.id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(tasks))
}

// --- 8. 某一天的分组视图 (GET /api/days/:date/sections) ---
pub async fn get_day_sections_handler(
    Path(date): Path<NaiveDate>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<grouping::TaskSection>>, AppError> {
    let tasks = sqlx::query_as::<_, DailyTask>(
        "SELECT * FROM daily_tasks WHERE user_id = $1 AND date = $2",
    )
    .bind(user.id)
    .bind(date)
    .fetch_all(&state.db)
    .await?;

    // 解析出现过的模板名称/颜色, 分组函数本身保持纯函数
    let mut template_ids: Vec<i32> = tasks.iter().filter_map(|t| t.template_id).collect();
    template_ids.sort_unstable();
    template_ids.dedup();

    let infos = sqlx::query_as::<_, TemplateInfo>(
        "SELECT id, name, color FROM day_templates WHERE user_id = $1 AND id = ANY($2)",
    )
    .bind(user.id)
    .bind(&template_ids)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(grouping::group_tasks_for_display(tasks, &infos)))
}

// --- 9. 新建自定义任务 (POST /api/tasks) ---
pub async fn create_task_handler(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateDailyTaskSchema>,
) -> Result<Json<DailyTask>, AppError> {
    let task = sqlx::query_as::<_, DailyTask>(
        "INSERT INTO daily_tasks (user_id, date, title, description, position, source_type)
         VALUES ($1, $2, $3, $4, COALESCE($5, 0), 'custom')
         RETURNING *",
    )
    .bind(user.id)
    .bind(body.date)
    .bind(body.title)
    .bind(body.description)
    .bind(body.position)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(task))
}

// --- 10. 更新任务 (PATCH /api/tasks/:id) ---
// 对自定义任务和模板物化任务一视同仁, 改的只是当天的快照
pub async fn update_task_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<UpdateDailyTaskSchema>,
) -> Result<Json<DailyTask>, AppError> {
    let task = sqlx::query_as::<_, DailyTask>(
        "UPDATE daily_tasks SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            position = COALESCE($3, position),
            is_completed = COALESCE($4, is_completed),
            updated_at = NOW()
         WHERE id = $5 AND user_id = $6
         RETURNING *",
    )
    .bind(body.title)
    .bind(body.description)
    .bind(body.position)
    .bind(body.is_completed)
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found or unauthorized".to_string()))?;

    Ok(Json(task))
}

// --- 11. 完成状态翻转 (PATCH /api/tasks/:id/toggle) ---
// 只动 daily_tasks 这一行, 台账和模板定义都不受影响
pub async fn toggle_task_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DailyTask>, AppError> {
    let task = sqlx::query_as::<_, DailyTask>(
        "UPDATE daily_tasks SET is_completed = NOT is_completed, updated_at = NOW()
         WHERE id = $1 AND user_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Task not found or unauthorized".to_string()))?;

    Ok(Json(task))
}

// --- 12. 删除单个任务 (DELETE /api/tasks/:id) ---
// 直接删模板物化出来的行也允许 (用户修剪清单), 台账保持不动
pub async fn delete_task_handler(
    Path(id): Path<i32>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM daily_tasks WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Task not found or you don't have permission".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}
