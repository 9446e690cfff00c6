// src/grouping.rs
// 展示分组: 把某一天的平铺任务列表切成区块。
// 顺序契约: 自定义区在最前 (有自定义任务时才出现), 之后按 template_id 升序一个模板一个区,
// 区内按 position 再按 id 排。纯函数, 不持有状态, 每次都从平铺列表重新推导。
use crate::models::{DailyTask, TemplateInfo};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct TaskSection {
    pub title: String,
    pub color: Option<String>,
    // None 表示自定义任务区
    pub template_id: Option<i32>,
    pub tasks: Vec<DailyTask>,
}

pub fn group_tasks_for_display(
    tasks: Vec<DailyTask>,
    templates: &[TemplateInfo],
) -> Vec<TaskSection> {
    let mut custom: Vec<DailyTask> = Vec::new();
    // BTreeMap 迭代天然按 template_id 升序, 区块顺序由它给出
    let mut by_template: BTreeMap<i32, Vec<DailyTask>> = BTreeMap::new();

    for task in tasks {
        match task.template_id {
            Some(template_id) if task.source_type == "template" => {
                by_template.entry(template_id).or_default().push(task)
            }
            _ => custom.push(task),
        }
    }

    let mut sections = Vec::new();

    if !custom.is_empty() {
        sort_section_tasks(&mut custom);
        sections.push(TaskSection {
            title: "My Tasks".to_string(),
            color: None,
            template_id: None,
            tasks: custom,
        });
    }

    for (template_id, mut tasks) in by_template {
        sort_section_tasks(&mut tasks);
        let info = templates.iter().find(|t| t.id == template_id);
        sections.push(TaskSection {
            // 模板已被删除时物化行还在 (快照语义), 给个中性的兜底标题
            title: info
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "Former template".to_string()),
            color: info.and_then(|t| t.color.clone()),
            template_id: Some(template_id),
            tasks,
        });
    }

    sections
}

fn sort_section_tasks(tasks: &mut [DailyTask]) {
    tasks.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
}
