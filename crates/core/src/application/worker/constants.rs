// Worker constants (no magic values)
use std::time::Duration;

/// Variants per request when the client does not ask for a count
pub const DEFAULT_VARIANT_COUNT: u32 = 3;

/// Upper bound on `variant_count` (MAX_VARIANTS)
pub const DEFAULT_MAX_VARIANTS: u32 = 5;

/// Style hint when the client sends none
pub const DEFAULT_STYLE: &str = "creative and modern";

/// Per-variant render budget (EXTRACTION_TIMEOUT)
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Whole-batch budget, synthesis included
pub const DEFAULT_BATCH_DEADLINE: Duration = Duration::from_secs(300);

/// Grace between SIGTERM and SIGKILL when tearing down a sandbox (5 seconds)
pub const GRACEFUL_TERMINATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum element children under the extracted `<svg>` root
pub const DEFAULT_MIN_SVG_CHILDREN: usize = 5;

/// Completion marker / window event name the generated documents use
pub const DEFAULT_COMPLETION_MARKER: &str = "infographic-rendered";

/// Root element the sandbox serializes
pub const DEFAULT_ROOT_SELECTOR: &str = "svg";

/// Fallback settle window: root present and unchanged for this long
pub const DEFAULT_SETTLE_DURATION: Duration = Duration::from_secs(2);

/// Child polling interval for the completion signal
pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Head-room the child keeps inside its budget to report `timed_out` itself
pub const CHILD_REPORT_MARGIN: Duration = Duration::from_millis(1500);

/// Bytes of child stderr kept for crash diagnostics
pub const DIAGNOSTICS_TAIL_BYTES: usize = 4096;

/// Child stdout accepted while waiting for the result record (16 MiB)
pub const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Default namespace bound to extracted `<svg>` roots
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// XML declaration prepended to persisted SVGs
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
