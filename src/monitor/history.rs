//! 任务历史环形缓冲
//!
//! 按开始时间顺序追加，满容量时淘汰最旧条目（不归档）。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 历史条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskHistoryEntry {
    pub task_id: String,
    pub handler_type: String,
    pub task_content: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub response_time: Option<f64>,
    pub status: EntryStatus,
    pub error: Option<String>,
}

/// 对外输出的历史条目（时间戳为 RFC 3339 文本）
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub agent_type: String,
    pub task_content: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub response_time: Option<f64>,
    pub status: EntryStatus,
    pub error: Option<String>,
}

impl From<&TaskHistoryEntry> for TaskRecord {
    fn from(e: &TaskHistoryEntry) -> Self {
        Self {
            task_id: e.task_id.clone(),
            agent_type: e.handler_type.clone(),
            task_content: e.task_content.clone(),
            start_time: e.start_time.to_rfc3339(),
            end_time: e.end_time.map(|t| t.to_rfc3339()),
            response_time: e.response_time,
            status: e.status,
            error: e.error.clone(),
        }
    }
}

/// 有界历史
#[derive(Debug)]
pub struct TaskHistory {
    entries: VecDeque<TaskHistoryEntry>,
    capacity: usize,
}

impl TaskHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// 追加条目，超出容量时淘汰最旧的
    pub fn push(&mut self, entry: TaskHistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// 从最新条目向前查找
    pub fn find_latest_mut(&mut self, task_id: &str) -> Option<&mut TaskHistoryEntry> {
        self.entries.iter_mut().rev().find(|e| e.task_id == task_id)
    }

    /// 按开始时间倒序取前 limit 条；开始时间相同时较新的插入在前
    pub fn recent(&self, limit: usize) -> Vec<&TaskHistoryEntry> {
        let mut newest_first: Vec<&TaskHistoryEntry> = self.entries.iter().rev().collect();
        newest_first.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        newest_first.truncate(limit);
        newest_first
    }

    /// 开始时间晚于 since 的条目数
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.entries.iter().filter(|e| e.start_time > since).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskHistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
