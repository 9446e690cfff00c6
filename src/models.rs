// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

// --- 1. DayTemplate 模型 (可复用的日程清单定义) ---
#[derive(Debug, FromRow, Serialize)]
pub struct DayTemplate {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub color: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// 模板里的单个步骤, 纯定义数据, 本身没有完成状态
#[derive(Debug, FromRow, Serialize)]
pub struct TemplateTask {
    pub id: i32,
    pub template_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
}

// 模板 + 有序任务列表, 作为 API 返回结构
#[derive(Debug, Serialize)]
pub struct DayTemplateDetail {
    pub template: DayTemplate,
    pub tasks: Vec<TemplateTask>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateSchema {
    #[validate(length(min = 1, max = 100, message = "模板名称不能为空"))]
    pub name: String,
    pub color: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TemplateTaskSchema>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateTaskSchema {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateSchema {
    #[validate(length(min = 1, max = 100, message = "模板名称不能为空"))]
    pub name: Option<String>,
    pub color: Option<String>,
    // 提供 tasks 数组时整体替换旧任务列表, 旧任务 ID 不保留
    pub tasks: Option<Vec<TemplateTaskSchema>>,
}

// --- 2. AssignedDay 模型 (指派台账) ---
#[derive(Debug, FromRow, Serialize)]
pub struct AssignedDay {
    pub id: i32,
    pub user_id: i32,
    pub date: NaiveDate,
    pub template_id: i32,
    pub created_at: Option<DateTime<Utc>>,
}

// 日历区间查询的返回行: 台账 JOIN 模板取名称和颜色
#[derive(Debug, FromRow, Serialize)]
pub struct AssignedDayMarker {
    pub id: i32,
    pub date: NaiveDate,
    pub template_id: i32,
    pub template_name: String,
    pub template_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// --- 3. DailyTask 模型 (具体某一天的任务) ---
// source_type 为 "template" 时 template_id / template_task_id 必填,
// 为 "custom" 时两者必为空, 由数据库 CHECK 约束保证
#[derive(Debug, FromRow, Serialize)]
pub struct DailyTask {
    pub id: i32,
    pub user_id: i32,
    pub date: NaiveDate,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub position: i32,
    pub source_type: String,
    pub template_id: Option<i32>,
    pub template_task_id: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDailyTaskSchema {
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 255, message = "任务标题不能为空"))]
    pub title: String,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDailyTaskSchema {
    #[validate(length(min = 1, max = 255, message = "任务标题不能为空"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
    pub is_completed: Option<bool>,
}

// 分组展示时解析模板名称/颜色用的查询行
#[derive(Debug, FromRow, Serialize)]
pub struct TemplateInfo {
    pub id: i32,
    pub name: String,
    pub color: Option<String>,
}

// --- 4. 认证模型 ---
#[derive(Debug, FromRow, Deserialize, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterSchema {
    #[validate(length(min = 3, max = 20, message = "用户名长度需在 3-20 位之间"))]
    pub username: String,
    #[validate(length(min = 6, message = "密码至少需要 6 位"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginSchema {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: Option<String>,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}
