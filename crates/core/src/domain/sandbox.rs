// Sandbox Protocol - parent/child handoff and per-job state machine
//
// The parent writes one `RenderJobSpec` as JSON to the child's stdin.
// The child answers with exactly one `ResultRecord` JSON line on stdout.

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};

/// Browser viewport used for the render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Job specification handed to the render child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderJobSpec {
    /// Full HTML document (markup + embedded script)
    pub document: String,
    pub viewport: Viewport,
    /// Completion marker: `data-<marker>` / `#<marker>` in the DOM, or a
    /// window event of the same name
    pub marker: String,
    /// Render budget the child should respect before reporting `timed_out`
    pub timeout_ms: u64,
    /// Fallback: root present with a stable child count for this long
    pub settle_ms: u64,
    /// CSS selector of the element to serialize
    pub root_selector: String,
    /// Drop `<style>` elements from the serialized root
    pub strip_styles: bool,
}

/// Result record written by the render child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultRecord {
    Extracted { payload: String },
    Failed { error: String },
    TimedOut { waited_ms: u64 },
}

impl ResultRecord {
    /// Parse the child's stdout: the record is the last non-empty line.
    pub fn parse_output(stdout: &str) -> Result<Self> {
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| DomainError::MalformedRecord("no result record on stdout".into()))?;

        serde_json::from_str(line).map_err(|e| DomainError::MalformedRecord(e.to_string()))
    }

    pub fn to_line(&self) -> String {
        // Enum of plain strings/integers: serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"failed","error":"record serialization failed"}"#.to_string()
        })
    }
}

/// Per-job sandbox lifecycle
///
/// `Pending -> Spawned -> AwaitingSignal -> {Extracted, RenderTimeout, RenderCrashed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxPhase {
    Pending,
    Spawned,
    AwaitingSignal,
    Extracted,
    RenderTimeout,
    RenderCrashed,
}

impl SandboxPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SandboxPhase::Extracted | SandboxPhase::RenderTimeout | SandboxPhase::RenderCrashed
        )
    }

    /// Validate a transition and return the new phase
    pub fn transition(self, to: SandboxPhase) -> Result<SandboxPhase> {
        use SandboxPhase::*;

        let allowed = match (self, to) {
            (Pending, Spawned) => true,
            // Spawn failure
            (Pending, RenderCrashed) => true,
            // Handoff failed or timed out before the child was confirmed
            (Spawned, AwaitingSignal) | (Spawned, RenderCrashed) | (Spawned, RenderTimeout) => {
                true
            }
            (AwaitingSignal, Extracted)
            | (AwaitingSignal, RenderTimeout)
            | (AwaitingSignal, RenderCrashed) => true,
            _ => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl std::fmt::Display for SandboxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxPhase::Pending => write!(f, "PENDING"),
            SandboxPhase::Spawned => write!(f, "SPAWNED"),
            SandboxPhase::AwaitingSignal => write!(f, "AWAITING_SIGNAL"),
            SandboxPhase::Extracted => write!(f, "EXTRACTED"),
            SandboxPhase::RenderTimeout => write!(f, "RENDER_TIMEOUT"),
            SandboxPhase::RenderCrashed => write!(f, "RENDER_CRASHED"),
        }
    }
}
