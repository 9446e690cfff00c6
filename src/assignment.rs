// src/assignment.rs
// 指派台账 + 任务物化引擎。
// assign: 台账插入和任务快照复制在同一事务里提交, 读方要么同时看到两者要么都看不到。
// unassign: 只删本次指派物化出来的行, 自定义任务和同一天其他模板的任务不动。
use crate::models::{AssignedDay, AssignedDayMarker, DayTemplate};
use crate::AppError;
use chrono::NaiveDate;
use sqlx::PgPool;

// --- 1. 指派模板到某一天 (物化) ---
pub async fn assign_template(
    db: &PgPool,
    user_id: i32,
    date: NaiveDate,
    template_id: i32,
) -> Result<AssignedDay, AppError> {
    // 先确认模板存在且属于当前用户, 不存在与无权限统一返回 NotFound
    let template = sqlx::query_as::<_, DayTemplate>(
        "SELECT * FROM day_templates WHERE id = $1 AND user_id = $2",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Template not found or unauthorized".to_string()))?;

    let mut tx = db.begin().await?;

    // 台账唯一约束 (user_id, date, template_id) 负责幂等和并发控制:
    // 两个并发 assign 恰好一个成功, 另一个在这里拿到唯一约束冲突
    let assigned = match sqlx::query_as::<_, AssignedDay>(
        "INSERT INTO assigned_days (user_id, date, template_id) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(user_id)
    .bind(date)
    .bind(template.id)
    .fetch_one(&mut *tx)
    .await
    {
        Ok(row) => row,
        Err(e) => {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    // 调用方应把它当作"已经满足", 不要盲目重试
                    return Err(AppError::AlreadyAssigned(format!(
                        "Template {} already assigned to {}",
                        template.id, date
                    )));
                }
            }
            return Err(AppError::Database(e));
        }
    };

    // 快照复制: 标题/描述/顺序在指派时刻固化, 之后编辑模板不影响已生成的行。
    // 模板没有任务时这里插入 0 行, 只留台账记录, 也是合法的指派
    sqlx::query(
        "INSERT INTO daily_tasks
            (user_id, date, title, description, is_completed, position,
             source_type, template_id, template_task_id)
         SELECT $1, $2, title, description, FALSE, position, 'template', template_id, id
         FROM template_tasks
         WHERE template_id = $3",
    )
    .bind(user_id)
    .bind(date)
    .bind(template.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(assigned)
}

// --- 2. 取消某一天的模板指派 (反物化) ---
pub async fn unassign_template(
    db: &PgPool,
    user_id: i32,
    date: NaiveDate,
    template_id: i32,
) -> Result<(), AppError> {
    let template = sqlx::query_as::<_, DayTemplate>(
        "SELECT * FROM day_templates WHERE id = $1 AND user_id = $2",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound("Template not found or unauthorized".to_string()))?;

    let mut tx = db.begin().await?;

    // 只删本次指派物化的行: source_type = 'template' 且回指同一模板
    sqlx::query(
        "DELETE FROM daily_tasks
         WHERE user_id = $1 AND date = $2 AND template_id = $3 AND source_type = 'template'",
    )
    .bind(user_id)
    .bind(date)
    .bind(template.id)
    .execute(&mut *tx)
    .await?;

    let result =
        sqlx::query("DELETE FROM assigned_days WHERE user_id = $1 AND date = $2 AND template_id = $3")
            .bind(user_id)
            .bind(date)
            .bind(template.id)
            .execute(&mut *tx)
            .await?;

    // 台账里没有这条指派: 整体回滚, 让调用方区分"刚刚移除"和"本来就没有"
    if result.rows_affected() == 0 {
        return Err(AppError::NotAssigned(format!(
            "Template {} is not assigned to {}",
            template.id, date
        )));
    }

    tx.commit().await?;

    Ok(())
}

// --- 3. 日历区间聚合 (渲染指示点用) ---
// 严格按台账返回: 某天的物化任务被用户逐条删光, 台账还在, 这天仍算已指派
pub async fn list_assigned_range(
    db: &PgPool,
    user_id: i32,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<AssignedDayMarker>, AppError> {
    if start > end {
        return Err(AppError::BadRequest(
            "start 日期不能晚于 end 日期".to_string(),
        ));
    }

    let markers = sqlx::query_as::<_, AssignedDayMarker>(
        "SELECT a.id, a.date, a.template_id, t.name AS template_name, t.color AS template_color
         FROM assigned_days a
         JOIN day_templates t ON t.id = a.template_id
         WHERE a.user_id = $1 AND a.date BETWEEN $2 AND $3
         ORDER BY a.date, a.template_id",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    Ok(markers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyTask;

    async fn seed_user(db: &PgPool, username: &str) -> i32 {
        let (id,): (i32,) =
            sqlx::query_as("INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id")
                .bind(username)
                .fetch_one(db)
                .await
                .unwrap();
        id
    }

    async fn seed_template(db: &PgPool, user_id: i32, name: &str, titles: &[&str]) -> i32 {
        let (template_id,): (i32,) = sqlx::query_as(
            "INSERT INTO day_templates (user_id, name, color) VALUES ($1, $2, '#7c9ef2') RETURNING id",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(db)
        .await
        .unwrap();
        for (position, title) in titles.iter().enumerate() {
            sqlx::query("INSERT INTO template_tasks (template_id, title, position) VALUES ($1, $2, $3)")
                .bind(template_id)
                .bind(title)
                .bind(position as i32)
                .execute(db)
                .await
                .unwrap();
        }
        template_id
    }

    async fn seed_custom_task(db: &PgPool, user_id: i32, date: NaiveDate, title: &str) -> i32 {
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO daily_tasks (user_id, date, title, source_type) VALUES ($1, $2, $3, 'custom') RETURNING id",
        )
        .bind(user_id)
        .bind(date)
        .bind(title)
        .fetch_one(db)
        .await
        .unwrap();
        id
    }

    async fn day_tasks(db: &PgPool, user_id: i32, date: NaiveDate) -> Vec<DailyTask> {
        sqlx::query_as::<_, DailyTask>(
            "SELECT * FROM daily_tasks WHERE user_id = $1 AND date = $2 ORDER BY position, id",
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(db)
        .await
        .unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn assign_materializes_snapshot_rows(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id =
            seed_template(&db, user_id, "输液日", &["量体温", "准备药品", "输液后记录"]).await;
        let date = day("2026-08-10");

        let assigned = assign_template(&db, user_id, date, template_id).await.unwrap();
        assert_eq!(assigned.template_id, template_id);
        assert_eq!(assigned.date, date);

        let tasks = day_tasks(&db, user_id, date).await;
        assert_eq!(tasks.len(), 3);
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.source_type, "template");
            assert_eq!(task.template_id, Some(template_id));
            assert!(task.template_task_id.is_some());
            assert_eq!(task.position, i as i32);
            assert!(!task.is_completed);
        }
        assert_eq!(tasks[0].title, "量体温");
        assert_eq!(tasks[2].title, "输液后记录");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn assign_twice_reports_already_assigned(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温", "准备药品"]).await;
        let date = day("2026-08-10");

        assign_template(&db, user_id, date, template_id).await.unwrap();
        let err = assign_template(&db, user_id, date, template_id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyAssigned(_)));

        // 第二次调用不产生任何重复任务
        let tasks = day_tasks(&db, user_id, date).await;
        assert_eq!(tasks.len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn assign_empty_template_creates_ledger_only(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "休息日", &[]).await;
        let date = day("2026-08-11");

        assign_template(&db, user_id, date, template_id).await.unwrap();

        assert!(day_tasks(&db, user_id, date).await.is_empty());
        // 空指派也要出现在日历上, 它标记这一天的主题
        let markers = list_assigned_range(&db, user_id, date, date).await.unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].template_name, "休息日");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn assign_foreign_or_missing_template_is_not_found(db: PgPool) {
        let alice = seed_user(&db, "alice").await;
        let mallory = seed_user(&db, "mallory").await;
        let template_id = seed_template(&db, alice, "输液日", &["量体温"]).await;
        let date = day("2026-08-10");

        let err = assign_template(&db, mallory, date, template_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = assign_template(&db, alice, date, 999_999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert!(day_tasks(&db, mallory, date).await.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unassign_removes_only_own_materialized_rows(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let infusion = seed_template(&db, user_id, "输液日", &["量体温", "准备药品", "输液后记录"]).await;
        let checkup = seed_template(&db, user_id, "复诊日", &["带病历"]).await;
        let date = day("2026-08-12");

        seed_custom_task(&db, user_id, date, "给医生打电话").await;
        assign_template(&db, user_id, date, infusion).await.unwrap();
        assign_template(&db, user_id, date, checkup).await.unwrap();
        assert_eq!(day_tasks(&db, user_id, date).await.len(), 5);

        unassign_template(&db, user_id, date, infusion).await.unwrap();

        let remaining = day_tasks(&db, user_id, date).await;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|t| t.template_id != Some(infusion)));
        assert!(remaining.iter().any(|t| t.source_type == "custom" && t.title == "给医生打电话"));
        assert!(remaining.iter().any(|t| t.template_id == Some(checkup)));

        // 复诊日的台账不受影响
        let markers = list_assigned_range(&db, user_id, date, date).await.unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].template_id, checkup);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unassign_without_assignment_is_not_assigned(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温"]).await;
        let date = day("2026-08-13");
        seed_custom_task(&db, user_id, date, "给医生打电话").await;

        let err = unassign_template(&db, user_id, date, template_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotAssigned(_)));

        // 什么都没动
        assert_eq!(day_tasks(&db, user_id, date).await.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn template_edits_never_touch_materialized_rows(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温", "准备药品"]).await;
        let date = day("2026-08-14");

        assign_template(&db, user_id, date, template_id).await.unwrap();

        // 指派之后改模板: 改标题 + 删掉一个步骤
        sqlx::query("UPDATE template_tasks SET title = '测血压' WHERE template_id = $1 AND position = 0")
            .bind(template_id)
            .execute(&db)
            .await
            .unwrap();
        sqlx::query("DELETE FROM template_tasks WHERE template_id = $1 AND position = 1")
            .bind(template_id)
            .execute(&db)
            .await
            .unwrap();

        // 已物化的行保持指派时刻的快照
        let tasks = day_tasks(&db, user_id, date).await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "量体温");
        assert_eq!(tasks[1].title, "准备药品");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn completion_toggle_leaves_ledger_and_template_alone(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温"]).await;
        let date = day("2026-08-15");

        assign_template(&db, user_id, date, template_id).await.unwrap();

        // 勾掉再勾回来, 只动 daily_tasks 这一行
        for _ in 0..2 {
            sqlx::query(
                "UPDATE daily_tasks SET is_completed = NOT is_completed
                 WHERE user_id = $1 AND date = $2",
            )
            .bind(user_id)
            .bind(date)
            .execute(&db)
            .await
            .unwrap();
        }

        let markers = list_assigned_range(&db, user_id, date, date).await.unwrap();
        assert_eq!(markers.len(), 1);
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM template_tasks WHERE template_id = $1")
                .bind(template_id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert!(!day_tasks(&db, user_id, date).await[0].is_completed);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn calendar_range_reflects_ledger_exactly(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温"]).await;
        let kept = day("2026-08-05");
        let removed = day("2026-08-19");

        assign_template(&db, user_id, kept, template_id).await.unwrap();
        assign_template(&db, user_id, removed, template_id).await.unwrap();
        unassign_template(&db, user_id, removed, template_id).await.unwrap();

        let markers =
            list_assigned_range(&db, user_id, day("2026-08-01"), day("2026-08-31")).await.unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].date, kept);
        assert_eq!(markers[0].template_name, "输液日");
        assert_eq!(markers[0].template_color.as_deref(), Some("#7c9ef2"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn pruned_day_still_counts_as_assigned(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let template_id = seed_template(&db, user_id, "输液日", &["量体温", "准备药品"]).await;
        let date = day("2026-08-20");

        assign_template(&db, user_id, date, template_id).await.unwrap();

        // 用户手动删掉其中一条物化任务: 台账保留, 不算数据损坏
        sqlx::query("DELETE FROM daily_tasks WHERE user_id = $1 AND date = $2 AND position = 0")
            .bind(user_id)
            .bind(date)
            .execute(&db)
            .await
            .unwrap();

        assert_eq!(day_tasks(&db, user_id, date).await.len(), 1);
        let markers = list_assigned_range(&db, user_id, date, date).await.unwrap();
        assert_eq!(markers.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn range_query_rejects_inverted_bounds(db: PgPool) {
        let user_id = seed_user(&db, "alice").await;
        let err = list_assigned_range(&db, user_id, day("2026-08-31"), day("2026-08-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
