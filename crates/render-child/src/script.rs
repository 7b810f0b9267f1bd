// Page-side scripts and document preparation

use serde::Deserialize;
use std::time::{Duration, Instant};

/// Window flag set by the injected completion listener
const RENDERED_FLAG: &str = "__infographicRendered";

/// What the page reported on one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Probe {
    /// Completion marker present in the DOM, or completion event fired
    pub signalled: bool,
    /// Root element present
    pub root: bool,
    /// Element children of the root
    pub children: u32,
}

impl Probe {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// JS string literal for `value`
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Listener registered before any page script runs
pub fn completion_listener(marker: &str) -> String {
    format!(
        "<script>window.addEventListener({marker}, function () {{ window.{flag} = true; }});</script>",
        marker = js_string(marker),
        flag = RENDERED_FLAG,
    )
}

/// Insert the completion listener at the top of the document
///
/// Goes right after `<head>`, else right after `<html>`, else first.
pub fn inject_listener(document: &str, marker: &str) -> String {
    let listener = completion_listener(marker);
    let lowered = document.to_ascii_lowercase();

    let insert_at = ["head", "html"].iter().find_map(|tag| {
        let start = find_open_tag(&lowered, tag)?;
        let close = lowered[start..].find('>')?;
        Some(start + close + 1)
    });

    match insert_at {
        Some(at) => format!("{}{}{}", &document[..at], listener, &document[at..]),
        None => format!("{}{}", listener, document),
    }
}

/// Byte offset of the first `<name>` / `<name ...>` start tag
///
/// `<header>` is not `<head>`: the name must end at `>`, `/` or whitespace.
fn find_open_tag(lowered: &str, name: &str) -> Option<usize> {
    let needle = format!("<{}", name);
    let mut from = 0;
    while let Some(offset) = lowered[from..].find(&needle) {
        let start = from + offset;
        let after = start + needle.len();
        match lowered.as_bytes().get(after) {
            Some(b'>') | Some(b'/') => return Some(start),
            Some(b) if b.is_ascii_whitespace() => return Some(start),
            _ => from = after,
        }
    }
    None
}

/// Poll expression; evaluates to a JSON string matching `Probe`
pub fn probe_script(marker: &str, root_selector: &str) -> String {
    format!(
        r#"(function () {{
  var marker = {marker};
  var signalled = window.{flag} === true || document.getElementById(marker) !== null;
  if (!signalled) {{
    try {{ signalled = document.querySelector('[data-' + marker + ']') !== null; }} catch (e) {{}}
  }}
  var root = document.querySelector({selector});
  return JSON.stringify({{
    signalled: signalled,
    root: root !== null,
    children: root ? root.childElementCount : 0
  }});
}})()"#,
        marker = js_string(marker),
        selector = js_string(root_selector),
        flag = RENDERED_FLAG,
    )
}

/// Serialization expression; evaluates to the root's markup or `null`
pub fn serialize_script(root_selector: &str, strip_styles: bool) -> String {
    format!(
        r#"(function () {{
  var root = document.querySelector({selector});
  if (!root) {{ return null; }}
  var clone = root.cloneNode(true);
  if (clone.tagName && clone.tagName.toLowerCase() === 'svg') {{
    clone.setAttribute('xmlns', 'http://www.w3.org/2000/svg');
  }}
  if ({strip}) {{
    clone.querySelectorAll('style').forEach(function (s) {{ s.remove(); }});
  }}
  return new XMLSerializer().serializeToString(clone);
}})()"#,
        selector = js_string(root_selector),
        strip = strip_styles,
    )
}

/// Fallback completion: root present with an unchanged, non-zero child count
/// for the whole settle window
#[derive(Debug)]
pub struct SettleTracker {
    settle: Duration,
    last_count: Option<u32>,
    stable_since: Option<Instant>,
}

impl SettleTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            last_count: None,
            stable_since: None,
        }
    }

    /// Record one probe; true once the root has been stable long enough
    pub fn observe(&mut self, probe: &Probe, now: Instant) -> bool {
        if !probe.root || probe.children == 0 {
            self.last_count = None;
            self.stable_since = None;
            return false;
        }

        if self.last_count != Some(probe.children) {
            self.last_count = Some(probe.children);
            self.stable_since = Some(now);
            return false;
        }

        self.stable_since
            .map(|since| now.duration_since(since) >= self.settle)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_goes_after_head() {
        let doc = "<!DOCTYPE html><html><HEAD><title>t</title></HEAD><body></body></html>";
        let injected = inject_listener(doc, "infographic-rendered");
        let head_end = injected.find("<HEAD>").unwrap() + "<HEAD>".len();
        assert!(injected[head_end..].starts_with("<script>window.addEventListener(\"infographic-rendered\""));
        assert!(injected.ends_with("</html>"));
    }

    #[test]
    fn listener_falls_back_to_html_then_front() {
        let injected = inject_listener("<html lang=\"en\"><body/></html>", "m");
        assert!(injected.starts_with("<html lang=\"en\"><script>"));

        let bare = inject_listener("<svg></svg>", "m");
        assert!(bare.starts_with("<script>"));
        assert!(bare.ends_with("<svg></svg>"));
    }

    #[test]
    fn header_element_is_not_head() {
        let doc = "<html><body><header>Title</header><script>done()</script></body></html>";
        let injected = inject_listener(doc, "m");
        assert!(injected.starts_with("<html><script>window.addEventListener"));

        let with_head = "<html><head\n  data-x=\"1\"><title/></head><header/></html>";
        let injected = inject_listener(with_head, "m");
        assert!(injected.contains("data-x=\"1\"><script>"));
    }

    #[test]
    fn marker_is_escaped_as_js_string() {
        let script = probe_script("a\"b", "svg");
        assert!(script.contains(r#"var marker = "a\"b";"#));
    }

    #[test]
    fn probe_parses_page_json() {
        let probe = Probe::parse(r#"{"signalled":false,"root":true,"children":7}"#).unwrap();
        assert_eq!(
            probe,
            Probe {
                signalled: false,
                root: true,
                children: 7
            }
        );
        assert!(Probe::parse("undefined").is_none());
    }

    #[test]
    fn serialize_script_honours_style_flag() {
        assert!(serialize_script("svg", true).contains("if (true)"));
        assert!(serialize_script("svg", false).contains("if (false)"));
    }

    #[test]
    fn settle_requires_stable_children_for_window() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(Duration::from_millis(500));
        let probe = |children| Probe {
            signalled: false,
            root: true,
            children,
        };

        assert!(!tracker.observe(&probe(3), start));
        assert!(!tracker.observe(&probe(3), start + Duration::from_millis(300)));
        // Still drawing: window restarts
        assert!(!tracker.observe(&probe(5), start + Duration::from_millis(400)));
        assert!(!tracker.observe(&probe(5), start + Duration::from_millis(800)));
        assert!(tracker.observe(&probe(5), start + Duration::from_millis(900)));
    }

    #[test]
    fn settle_ignores_empty_root() {
        let start = Instant::now();
        let mut tracker = SettleTracker::new(Duration::ZERO);
        let empty = Probe {
            signalled: false,
            root: true,
            children: 0,
        };
        assert!(!tracker.observe(&empty, start));
        assert!(!tracker.observe(&empty, start + Duration::from_secs(10)));
    }
}
