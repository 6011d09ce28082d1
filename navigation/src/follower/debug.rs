//! Human readable follower state for overlays and logs.

use crate::movement::NavMovement;

use super::{PathFollower, PathFollowingStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugTokenKind {
    Status,
    Segment,
    Reach,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DebugToken {
    pub kind: DebugTokenKind,
    pub text: String,
}

impl DebugToken {
    fn new(kind: DebugTokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl<M: NavMovement> PathFollower<M> {
    /// `status`, segment progress while moving, then the deciding reach test.
    pub fn debug_tokens(&self) -> Vec<DebugToken> {
        let mut tokens = vec![DebugToken::new(DebugTokenKind::Status, self.status().to_string())];

        if self.status() == PathFollowingStatus::Moving {
            let segment = match self.path() {
                Some(path) if path.is_valid() && !path.is_navmesh() && !path.uses_navigation_data() => {
                    format!("({}/{})", self.segment.end_index, path.points().len() - 1)
                }
                Some(path) if path.is_valid() && path.is_navmesh() => {
                    let mut text = format!(
                        "({}..{}/{})",
                        self.segment.start_index + 1,
                        self.segment.end_index + 1,
                        path.points().len()
                    );
                    if self.current_custom_link().is_some() {
                        text.push_str(" (custom NavLink)");
                    }
                    text
                }
                Some(path) if path.is_valid() => "(direct)".to_string(),
                _ => "(invalid path)".to_string(),
            };
            tokens.push(DebugToken::new(DebugTokenKind::Segment, segment));
        }

        if let Some(report) = self.debug_reach_test() {
            tokens.push(DebugToken::new(DebugTokenKind::Reach, report.to_string()));
        }
        tokens
    }

    pub fn debug_string(&self) -> String {
        self.debug_tokens()
            .into_iter()
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
