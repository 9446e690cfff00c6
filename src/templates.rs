// src/templates.rs
// 日模板仓储: 模板 + 有序任务列表的增删改查。
// 多表写入 (建模板带任务 / 整体替换任务) 都包在一个事务里提交。
use crate::models::{
    CreateTemplateSchema, DayTemplate, DayTemplateDetail, TemplateTask, TemplateTaskSchema,
    UpdateTemplateSchema,
};
use crate::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;

// --- 1. 创建模板 (含初始任务, 一次事务) ---
pub async fn create_template(
    db: &PgPool,
    user_id: i32,
    body: CreateTemplateSchema,
) -> Result<DayTemplateDetail, AppError> {
    let mut tx = db.begin().await?;

    let template = sqlx::query_as::<_, DayTemplate>(
        "INSERT INTO day_templates (user_id, name, color) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(user_id)
    .bind(&body.name)
    .bind(&body.color)
    .fetch_one(&mut *tx)
    .await?;

    let tasks = insert_template_tasks(&mut tx, template.id, &body.tasks).await?;

    tx.commit().await?;

    Ok(DayTemplateDetail { template, tasks })
}

// --- 2. 更新模板 (PATCH 语义; tasks 出现时整体替换) ---
pub async fn update_template(
    db: &PgPool,
    user_id: i32,
    template_id: i32,
    body: UpdateTemplateSchema,
) -> Result<DayTemplateDetail, AppError> {
    let mut tx = db.begin().await?;

    // 权限核心：匹配 ID 和 UserID, 查不到统一按 NotFound 处理
    let template = sqlx::query_as::<_, DayTemplate>(
        "UPDATE day_templates SET
            name = COALESCE($1, name),
            color = COALESCE($2, color),
            updated_at = NOW()
         WHERE id = $3 AND user_id = $4
         RETURNING *",
    )
    .bind(&body.name)
    .bind(&body.color)
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Template not found or unauthorized".to_string()))?;

    let tasks = match body.tasks {
        // 破坏性重建: 旧任务全部删除再按新数组重建, 任务 ID 不保留。
        // 已物化到具体日期的任务持有的是快照, 不受影响。
        Some(new_tasks) => replace_template_tasks(&mut tx, template.id, &new_tasks).await?,
        None => {
            sqlx::query_as::<_, TemplateTask>(
                "SELECT * FROM template_tasks WHERE template_id = $1 ORDER BY position, id",
            )
            .bind(template.id)
            .fetch_all(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;

    Ok(DayTemplateDetail { template, tasks })
}

// --- 3. 删除模板 (级联删除任务定义和指派台账) ---
pub async fn delete_template(db: &PgPool, user_id: i32, template_id: i32) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM day_templates WHERE id = $1 AND user_id = $2")
        .bind(template_id)
        .bind(user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Template not found or unauthorized".to_string(),
        ));
    }

    Ok(())
}

// --- 4. 模板列表 (带各自的有序任务) ---
pub async fn list_templates(db: &PgPool, user_id: i32) -> Result<Vec<DayTemplateDetail>, AppError> {
    let templates = sqlx::query_as::<_, DayTemplate>(
        "SELECT * FROM day_templates WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let ids: Vec<i32> = templates.iter().map(|t| t.id).collect();
    let tasks = sqlx::query_as::<_, TemplateTask>(
        "SELECT * FROM template_tasks WHERE template_id = ANY($1) ORDER BY position, id",
    )
    .bind(&ids)
    .fetch_all(db)
    .await?;

    let mut by_template: HashMap<i32, Vec<TemplateTask>> = HashMap::new();
    for task in tasks {
        by_template.entry(task.template_id).or_default().push(task);
    }

    Ok(templates
        .into_iter()
        .map(|template| {
            let tasks = by_template.remove(&template.id).unwrap_or_default();
            DayTemplateDetail { template, tasks }
        })
        .collect())
}

// --- 5. 单个模板 (物化引擎和详情接口共用) ---
pub async fn get_template(
    db: &PgPool,
    user_id: i32,
    template_id: i32,
) -> Result<DayTemplateDetail, AppError> {
    let template = sqlx::query_as::<_, DayTemplate>(
        "SELECT * FROM day_templates WHERE id = $1 AND user_id = $2",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Template not found or unauthorized".to_string()))?;

    let tasks = sqlx::query_as::<_, TemplateTask>(
        "SELECT * FROM template_tasks WHERE template_id = $1 ORDER BY position, id",
    )
    .bind(template.id)
    .fetch_all(db)
    .await?;

    Ok(DayTemplateDetail { template, tasks })
}

// 按提交顺序落库: position 就是数组下标
async fn insert_template_tasks(
    tx: &mut Transaction<'_, Postgres>,
    template_id: i32,
    tasks: &[TemplateTaskSchema],
) -> Result<Vec<TemplateTask>, AppError> {
    let mut created = Vec::with_capacity(tasks.len());
    for (position, task) in tasks.iter().enumerate() {
        if task.title.trim().is_empty() {
            return Err(AppError::BadRequest("任务标题不能为空".to_string()));
        }
        let row = sqlx::query_as::<_, TemplateTask>(
            "INSERT INTO template_tasks (template_id, title, description, position)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(template_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(position as i32)
        .fetch_one(&mut **tx)
        .await?;
        created.push(row);
    }
    Ok(created)
}

async fn replace_template_tasks(
    tx: &mut Transaction<'_, Postgres>,
    template_id: i32,
    tasks: &[TemplateTaskSchema],
) -> Result<Vec<TemplateTask>, AppError> {
    sqlx::query("DELETE FROM template_tasks WHERE template_id = $1")
        .bind(template_id)
        .execute(&mut **tx)
        .await?;

    insert_template_tasks(tx, template_id, tasks).await
}
