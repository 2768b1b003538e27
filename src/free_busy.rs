//! 空闲时间求解：由忙碌区间计算窗口内的空闲区间
//!
//! 所有时间先统一为 UTC 再比较，带不同 offset（含夏令时切换前后）的输入也能正确排序。
//! 区间为半开 [start, end)。

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 半开时间区间 [start, end)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub type BusyInterval = TimeInterval;
pub type FreeInterval = TimeInterval;

impl TimeInterval {
    /// end 早于 start 时返回 InvalidInput
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AgentError> {
        if end < start {
            return Err(AgentError::InvalidInput(format!(
                "interval ends before it starts: {} > {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// 带 offset 的时间统一到 UTC
    pub fn from_offsets(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Self, AgentError> {
        Self::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// 在 window 内求空闲区间；busy 必须按 start 升序，否则返回 InvalidInput。
///
/// 游标从 window.start 出发，遇到忙碌区间前的空隙即输出；游标取 max(cursor, busy.end)，
/// 重叠或相邻的忙碌区间因此被吸收，不会产生负长度或重复的空闲区间。忙碌区间会被裁剪到窗口内。
pub fn resolve_free(
    busy: &[BusyInterval],
    window: &TimeInterval,
) -> Result<Vec<FreeInterval>, AgentError> {
    if window.end < window.start {
        return Err(AgentError::InvalidInput(
            "window ends before it starts".to_string(),
        ));
    }
    if let Some(bad) = busy.iter().find(|b| b.end < b.start) {
        return Err(AgentError::InvalidInput(format!(
            "busy interval ends before it starts: {}",
            bad.start.to_rfc3339()
        )));
    }
    if busy.windows(2).any(|w| w[1].start < w[0].start) {
        return Err(AgentError::InvalidInput(
            "busy intervals must be sorted by start".to_string(),
        ));
    }

    let mut free = Vec::new();
    let mut cursor = window.start;
    for b in busy {
        if cursor >= window.end {
            break;
        }
        if b.is_empty() {
            continue;
        }
        let gap_end = b.start.min(window.end);
        if cursor < gap_end {
            free.push(TimeInterval {
                start: cursor,
                end: gap_end,
            });
        }
        cursor = cursor.max(b.end);
    }
    if cursor < window.end {
        free.push(TimeInterval {
            start: cursor,
            end: window.end,
        });
    }
    Ok(free)
}

/// 先按 start 排序再求解
pub fn resolve_free_unsorted(
    mut busy: Vec<BusyInterval>,
    window: &TimeInterval,
) -> Result<Vec<FreeInterval>, AgentError> {
    busy.sort_by_key(|b| (b.start, b.end));
    resolve_free(&busy, window)
}

/// 合并重叠 / 相邻的忙碌区间并裁剪到窗口内（busy 需已排序）
pub fn merge_busy(busy: &[BusyInterval], window: &TimeInterval) -> Vec<BusyInterval> {
    let mut merged: Vec<BusyInterval> = Vec::new();
    for b in busy {
        let start = b.start.max(window.start);
        let end = b.end.min(window.end);
        if start >= end {
            continue;
        }
        match merged.last_mut() {
            Some(last) if start <= last.end => last.end = last.end.max(end),
            _ => merged.push(TimeInterval { start, end }),
        }
    }
    merged
}
