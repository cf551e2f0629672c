//! 用血请求状态机
//!
//! 管理用血请求从受理到调拨完成的状态转换

use bloodbank_core::{BloodBankError, RequestStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 请求状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestEvent {
    Approve,
    Reject,
    Fulfill,
}

impl RequestEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestEvent::Approve => "approve",
            RequestEvent::Reject => "reject",
            RequestEvent::Fulfill => "fulfill",
        }
    }

    /// 由 `PUT /hospital/requests/{id}/status` 的目标状态推出事件
    ///
    /// 只接受 approved / rejected，fulfilled 必须通过创建调拨达成。
    pub fn from_target_status(target: RequestStatus) -> Result<Self> {
        match target {
            RequestStatus::Approved => Ok(RequestEvent::Approve),
            RequestStatus::Rejected => Ok(RequestEvent::Reject),
            other => Err(BloodBankError::Validation(format!(
                "Status must be 'approved' or 'rejected', got '{}'",
                other.as_str()
            ))),
        }
    }
}

/// 用血请求状态机
#[derive(Debug)]
pub struct RequestStateMachine {
    transitions: HashMap<(RequestStatus, RequestEvent), RequestStatus>,
}

impl RequestStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((RequestStatus::Pending, RequestEvent::Approve), RequestStatus::Approved);
        transitions.insert((RequestStatus::Pending, RequestEvent::Reject), RequestStatus::Rejected);
        transitions.insert((RequestStatus::Approved, RequestEvent::Fulfill), RequestStatus::Fulfilled);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: RequestStatus, event: RequestEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: RequestStatus, event: RequestEvent) -> Result<RequestStatus> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| BloodBankError::InvalidStateTransition {
                from: from.as_str().to_string(),
                event: event.as_str().to_string(),
            })
    }

    /// 获取所有状态
    pub fn all_states() -> Vec<RequestStatus> {
        vec![
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Fulfilled,
        ]
    }

    /// 当前状态下可触发的事件
    pub fn possible_events(&self, current: RequestStatus) -> Vec<RequestEvent> {
        let mut events: Vec<RequestEvent> = self
            .transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect();
        events.sort_by_key(|e| e.as_str());
        events
    }

    /// 终态：没有任何出边
    pub fn is_terminal(&self, state: RequestStatus) -> bool {
        self.possible_events(state).is_empty()
    }
}

impl Default for RequestStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
