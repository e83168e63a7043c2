use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{MonitorConfig, PolicyMode};
use crate::error::{MonitorError, MonitorResult};
use crate::table::{OverrideTable, SegmentTable};

/// Immutable snapshot of the two uploaded tables for one dashboard session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub segments: SegmentTable,
    pub overrides: OverrideTable,
}

impl SessionContext {
    pub fn new(
        segments: SegmentTable,
        overrides: OverrideTable,
        config: &MonitorConfig,
    ) -> MonitorResult<Self> {
        let disagreeing = segments.policy_disagreements();
        if disagreeing > 0 {
            if config.policy_mode == PolicyMode::Strict {
                return Err(MonitorError::InconsistentPolicyTrigger {
                    disagreeing,
                    total: segments.rows().len(),
                });
            }
            tracing::warn!(
                disagreeing,
                "policy_trigger varies across segment rows; reporting row 0"
            );
        }

        let session = Self {
            id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            segments,
            overrides,
        };
        tracing::debug!(session_id = %session.id, "session ready");
        Ok(session)
    }
}

#[derive(Debug)]
pub enum SessionState {
    AwaitingInput { missing: Vec<&'static str> },
    Ready(Box<SessionContext>),
}

impl SessionState {
    /// Both files are required before any view is derived; a missing path
    /// is a waiting state rather than an error.
    pub fn open(
        segment_path: Option<&Path>,
        override_path: Option<&Path>,
        config: &MonitorConfig,
    ) -> MonitorResult<Self> {
        let (segment_path, override_path) = match (segment_path, override_path) {
            (Some(segments), Some(overrides)) => (segments, overrides),
            (segments, overrides) => {
                let mut missing = Vec::new();
                if segments.is_none() {
                    missing.push("segment summary");
                }
                if overrides.is_none() {
                    missing.push("override simulation");
                }
                return Ok(SessionState::AwaitingInput { missing });
            }
        };

        let segments = SegmentTable::from_path(segment_path)?;
        let overrides = OverrideTable::from_path(override_path)?;
        let context = SessionContext::new(segments, overrides, config)?;
        Ok(SessionState::Ready(Box::new(context)))
    }
}
