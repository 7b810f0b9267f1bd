// Prompt construction and response cleanup for the two-step synthesis flow

use infographic_core::domain::VariantJob;

/// Used when the elements step comes back empty
pub const FALLBACK_ELEMENTS: &str = "basic elements";

const ELEMENTS_INSTRUCTION: &str = "You are a D3.js infographic designer. \
Given a topic, return a JSON list of the key D3.js and SVG elements (svg, g, rect, text, circle, line, path, axis) \
needed for a single-frame infographic. Choose only valid D3.js and SVG elements. \
The elements must make the infographic informative without crowding the canvas, and must not overlap. \
Only include what fits on one screen. \
Return ONLY a JSON list of element descriptions. No code, no explanations, no markdown.";

/// System instruction for the code step; `marker` is the completion signal
/// the sandbox waits for
fn code_instruction(marker: &str) -> String {
    format!(
        "You are a D3.js expert who creates informative, readable single-frame infographics \
for headless browser extraction. Requirements: \
return COMPLETE, VALID HTML with DOCTYPE, html, head and body tags; \
load D3.js v7 from https://d3js.org/d3.v7.min.js; \
draw into exactly one top-level <svg> element, sized at most 1000x800; \
the output is a single static frame, with no animation or transitions; \
all text and shapes stay inside the SVG canvas with padding and never overlap; \
use only valid D3.js and SVG syntax, with no custom or undefined functions or imports; \
use forward slashes in closing tags; \
return ONLY the HTML document, with no explanations and no markdown fences. \
When drawing has finished, signal completion by running \
window.dispatchEvent(new Event('{marker}')) and also appending an element with id=\"{marker}\" to the body.",
        marker = marker
    )
}

/// Request text for the elements step
pub fn elements_prompt(job: &VariantJob) -> (String, String) {
    let user = format!(
        "Topic: {}\nTask: list the elements for infographic variant {} of {} in the style: {}",
        job.prompt(),
        job.variant_id(),
        job.variant_count(),
        job.style()
    );
    (ELEMENTS_INSTRUCTION.to_string(), user)
}

/// Request text for the code step
pub fn code_prompt(job: &VariantJob, elements: &str, marker: &str) -> (String, String) {
    let user = format!(
        "Topic: {topic}\n\
Elements: {elements}\n\
Style: {style}\n\
Variant: this is variant {k} of {n}. Make it clearly different from the other variants.\n\
Instructions: create an original infographic as one complete HTML document. \
Use only the listed elements.",
        topic = job.prompt(),
        elements = elements,
        style = job.style(),
        k = job.variant_id(),
        n = job.variant_count(),
    );
    (code_instruction(marker), user)
}

/// Remove a surrounding markdown code fence, with or without a language tag
pub fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (```html, ```json)
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Flatten the elements step output to one line for the code prompt
///
/// Accepts a JSON list of strings or objects; anything else is used as-is.
pub fn parse_elements(text: &str) -> String {
    let cleaned = strip_fences(text);

    let listed = serde_json::from_str::<Vec<serde_json::Value>>(cleaned)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .filter(|s| !s.trim().is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|_| cleaned.to_string());

    if listed.trim().is_empty() {
        FALLBACK_ELEMENTS.to_string()
    } else {
        listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VariantJob {
        VariantJob::new(2, 3, "Solar vs wind", "minimal")
    }

    #[test]
    fn strips_tagged_and_bare_fences() {
        assert_eq!(strip_fences("```html\n<html></html>\n```"), "<html></html>");
        assert_eq!(strip_fences("```\n[\"rect\"]\n```  "), "[\"rect\"]");
        assert_eq!(strip_fences("```json[\"rect\"]```"), "[\"rect\"]");
        assert_eq!(strip_fences("  <svg/>  "), "<svg/>");
    }

    #[test]
    fn elements_list_is_flattened() {
        assert_eq!(
            parse_elements("```json\n[\"svg canvas\", \"bar rects\", \"\"]\n```"),
            "svg canvas, bar rects"
        );
        assert_eq!(parse_elements("rects and labels"), "rects and labels");
    }

    #[test]
    fn empty_elements_fall_back() {
        assert_eq!(parse_elements("```\n```"), FALLBACK_ELEMENTS);
        assert_eq!(parse_elements("[]"), FALLBACK_ELEMENTS);
    }

    #[test]
    fn code_prompt_names_variant_style_and_marker() {
        let (system, user) = code_prompt(&job(), "rects", "infographic-rendered");
        assert!(user.contains("variant 2 of 3"));
        assert!(user.contains("Style: minimal"));
        assert!(user.contains("Elements: rects"));
        assert!(system.contains("new Event('infographic-rendered')"));
    }

    #[test]
    fn elements_prompt_carries_topic() {
        let (_, user) = elements_prompt(&job());
        assert!(user.starts_with("Topic: Solar vs wind"));
    }
}
