//! Best-effort recovery of thoughts and decisions from free-form oracle text.
//!
//! Used when a completion does not honour the JSON contract. Nothing here
//! fails: unrecognisable text yields an empty list or `None`.

use regex::Regex;
use std::sync::OnceLock;

use crate::oracle::DecisionPayload;
use crate::tree::{Thought, ThoughtDraft};

fn thought_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*(?:#+[ \t]*)?\**Thought[ \t]+(\d+)\**[ \t]*[.:)]\**[ \t]*")
            .expect("thought header pattern")
    })
}

fn numbered_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*(\d+)[.:)][ \t]+").expect("numbered pattern"))
}

fn rationale_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)[-*\s]*\**(?:generation[ _])?rationale\**[ \t]*:\**[ \t]*")
            .expect("rationale pattern")
    })
}

fn score_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[-*\s]*\**(?:evaluation[ _])?score\**[ \t]*:\**[ \t]*([0-9]*\.?[0-9]+)[^\n]*$")
            .expect("score pattern")
    })
}

fn thought_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\**Thought\**[ \t]*:[ \t]*").expect("label pattern"))
}

/// Recover thought drafts from text laid out as `Thought N:` blocks or as a
/// numbered list. The first layout that matches wins.
pub fn extract_thought_drafts(text: &str) -> Vec<ThoughtDraft> {
    for header in [thought_header(), numbered_header()] {
        let starts: Vec<(usize, usize)> = header
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        if starts.is_empty() {
            continue;
        }

        let drafts: Vec<ThoughtDraft> = starts
            .iter()
            .enumerate()
            .filter_map(|(i, &(_, body_start))| {
                let body_end = starts.get(i + 1).map(|&(s, _)| s).unwrap_or(text.len());
                parse_block(&text[body_start..body_end])
            })
            .collect();

        if !drafts.is_empty() {
            return drafts;
        }
    }
    Vec::new()
}

/// Recover thoughts for `node_id`, numbered `{node_id}-t1`, `-t2`, ...
pub fn extract_thoughts(raw_text: &str, node_id: &str) -> Vec<Thought> {
    extract_thought_drafts(raw_text)
        .into_iter()
        .enumerate()
        .map(|(i, draft)| Thought::from_draft(node_id, i + 1, draft))
        .collect()
}

fn parse_block(block: &str) -> Option<ThoughtDraft> {
    let mut score = None;
    let without_score = score_line()
        .replace_all(block, |caps: &regex::Captures<'_>| {
            score = caps[1].parse::<f64>().ok();
            ""
        })
        .into_owned();

    let (description, rationale) = match rationale_marker().find(&without_score) {
        Some(m) => {
            let rest = &without_score[m.end()..];
            let rationale = rest.split("\n\n").next().unwrap_or_default();
            (&without_score[..m.start()], rationale.trim())
        }
        None => (without_score.as_str(), ""),
    };

    let description = thought_label().replace(description.trim(), "");
    let description = description.trim();
    if description.is_empty() {
        return None;
    }

    Some(ThoughtDraft {
        description: description.to_string(),
        generation_rationale: rationale.to_string(),
        evaluation_score: score,
        evaluation_justification: String::new(),
    })
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (fast path)
/// 2. ```json ... ``` blocks
/// 3. ``` ... ``` blocks
/// 4. The outermost `{ ... }` span of surrounding prose
pub fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    if let (Some(start), Some(end)) = (completion.find('{'), completion.rfind('}')) {
        if start < end {
            return Ok(&completion[start..=end]);
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

fn action_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[-*\s]*\**(?:action(?:[ _]type)?|decision)\**[ \t]*:\**[ \t]*\**([A-Za-z]+)")
            .expect("action pattern")
    })
}

fn selected_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[-*\s]*\**selected[ _]thought(?:[ _]id)?\**[ \t]*:\**[ \t]*`?([\w.\-]+)")
            .expect("selected pattern")
    })
}

fn decision_rationale_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[-*\s]*\**(?:decision[ _])?rationale\**[ \t]*:\**[ \t]*(.+)$")
            .expect("decision rationale pattern")
    })
}

/// Recover a decision from text: an embedded JSON object first, then
/// `Action:` / `Selected Thought:` / `Rationale:` lines.
pub fn extract_decision(text: &str) -> Option<DecisionPayload> {
    if let Ok(json) = extract_json_from_completion(text) {
        if let Ok(payload) = serde_json::from_str::<DecisionPayload>(json) {
            return Some(payload);
        }
    }

    let action = action_line().captures(text)?[1].to_string();
    let selected_thought_id = selected_line()
        .captures(text)
        .map(|caps| caps[1].trim_end_matches('.').to_string());
    let decision_rationale = decision_rationale_line()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();

    Some(DecisionPayload {
        action_type: action,
        selected_thought_id,
        decision_rationale,
    })
}
