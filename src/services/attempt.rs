use crate::portal::HttpReply;
use crate::portal::dto::RegisterResponse;

/// Substrings the portal puts in error pages when a section has no seats left.
pub const COURSE_FULL_MARKERS: [&str; 3] = ["已满", "人数已满", "容量已满"];

/// Message fragment meaning the section does not exist for the chosen flow,
/// which usually means the wrong course type was picked.
pub const TYPE_MISMATCH_MARKER: &str = "未找到该教学班";

const SNIPPET_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded {
        message: Option<String>,
        timestamp: Option<String>,
    },
    Rejected {
        message: String,
        type_mismatch: bool,
    },
    CourseFull {
        status: u16,
    },
    UnexpectedStatus {
        status: u16,
        snippet: String,
    },
    Malformed {
        reason: String,
    },
    TransportFailed {
        reason: String,
    },
}

impl AttemptOutcome {
    /// Failures that move the course on to its next fallback class. Non-OK
    /// statuses are ambiguous and retried with the same class.
    pub fn advances_fallback(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Rejected { .. }
                | AttemptOutcome::Malformed { .. }
                | AttemptOutcome::TransportFailed { .. }
        )
    }
}

pub fn interpret_reply(reply: &HttpReply) -> AttemptOutcome {
    if !reply.is_success() {
        if COURSE_FULL_MARKERS.iter().any(|m| reply.body.contains(m)) {
            return AttemptOutcome::CourseFull {
                status: reply.status,
            };
        }
        return AttemptOutcome::UnexpectedStatus {
            status: reply.status,
            snippet: reply.body.chars().take(SNIPPET_CHARS).collect(),
        };
    }

    match serde_json::from_str::<RegisterResponse>(&reply.body) {
        Ok(resp) if resp.success => AttemptOutcome::Succeeded {
            message: resp.message,
            timestamp: resp.timestamp,
        },
        Ok(resp) => {
            let message = resp.message.unwrap_or_default();
            AttemptOutcome::Rejected {
                type_mismatch: message.contains(TYPE_MISMATCH_MARKER),
                message,
            }
        }
        Err(e) => AttemptOutcome::Malformed {
            reason: e.to_string(),
        },
    }
}
