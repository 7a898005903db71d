//! services/engine/src/quiz/parser.rs
//!
//! Recovers a validated question list from free-form model output.
//!
//! Text-generation backends are not guaranteed to emit well-formed JSON, so
//! parsing is layered: clean the blob, cut out the object, check brace
//! balance, parse, and only then fall back to best-effort repair heuristics.
//! The heuristics fix quoting and punctuation; they never invent question
//! content, and anything still unparseable propagates as a typed failure
//! carrying a snippet of the offending output.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use studyhall_core::domain::{
    CorrectAnswer, Difficulty, QuestionKind, QuizQuestion,
};
use tracing::{debug, error};

/// How much of the offending output is preserved for diagnosis.
const SNIPPET_LEN: usize = 500;

/// Extracted regions shorter than this cannot hold even one question.
const MIN_PLAUSIBLE_JSON_LEN: usize = 10;

/// The fields whose string values the repair heuristics are allowed to touch.
const REPAIRABLE_FIELDS: [&str; 3] = ["question", "explanation", "correctAnswer"];

/// No valid question list could be recovered from the model output.
#[derive(Debug, thiserror::Error)]
#[error("Failed to parse quiz response from AI: {reason}")]
pub struct QuizParseError {
    pub reason: String,
    /// First ~500 characters of the content that failed to parse.
    pub raw_snippet: String,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)```json\s*").expect("static regex"))
}

fn bare_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```\s*").expect("static regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("static regex"))
}

fn field_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"("(?:question|explanation|correctAnswer)"\s*:\s*")([^"]*(?:\\.[^"]*)*?)("(?:\s*[,}]))"#,
        )
        .expect("static regex")
    })
}

/// Parses raw model output into a validated question list.
pub fn parse_quiz_response(raw: &str) -> Result<Vec<QuizQuestion>, QuizParseError> {
    let fail = |reason: String| {
        let snippet: String = raw.chars().take(SNIPPET_LEN).collect();
        error!(%reason, snippet = %snippet, "quiz response unparseable");
        QuizParseError {
            reason,
            raw_snippet: snippet,
        }
    };

    let cleaned = clean_response_content(raw);
    let json = extract_json_object(&cleaned).map_err(|reason| fail(reason.to_string()))?;

    let parsed: Value = if has_balanced_braces(json) {
        match serde_json::from_str(json) {
            Ok(value) => value,
            Err(first_err) => {
                debug!(%first_err, "initial JSON parse failed, attempting repair");
                serde_json::from_str(&try_repair(json))
                    .map_err(|e| fail(format!("JSON repair failed: {}", e)))?
            }
        }
    } else {
        // Unbalanced braces make a standard parse hopeless; go straight to repair.
        debug!("unbalanced JSON structure detected, attempting repair");
        serde_json::from_str(&try_repair(json))
            .map_err(|e| fail(format!("JSON repair failed: {}", e)))?
    };

    validate_questions(&parsed).map_err(fail)
}

//=========================================================================================
// Stage 1: cleaning
//=========================================================================================

/// Strips markdown fences and control characters, and normalizes typographic
/// punctuation to plain ASCII.
fn clean_response_content(content: &str) -> String {
    let cleaned = fence_re().replace_all(content, "");
    let cleaned = bare_fence_re().replace_all(&cleaned, "");

    let mut normalized = String::with_capacity(cleaned.len());
    for ch in cleaned.chars() {
        match ch {
            '\u{201C}' | '\u{201D}' => normalized.push('"'),
            '\u{2018}' | '\u{2019}' => normalized.push('\''),
            '\u{2026}' => normalized.push_str("..."),
            '\u{2013}' | '\u{2014}' => normalized.push('-'),
            '\t' | '\n' | '\r' => normalized.push(ch),
            c if (c as u32) < 0x20 || ((c as u32) >= 0x7F && (c as u32) <= 0x9F) => {}
            c => normalized.push(c),
        }
    }

    normalized.trim().to_string()
}

//=========================================================================================
// Stage 2: object extraction
//=========================================================================================

/// Cuts the substring from the first `{` to the last `}`.
fn extract_json_object(content: &str) -> Result<&str, &'static str> {
    let first = content.find('{');
    let last = content.rfind('}');

    match (first, last) {
        (Some(first), Some(last)) if last > first => {
            let json = &content[first..=last];
            if json.len() < MIN_PLAUSIBLE_JSON_LEN {
                Err("Extracted JSON is too short to be valid")
            } else {
                Ok(json)
            }
        }
        _ => Err("No valid JSON object found in response"),
    }
}

//=========================================================================================
// Stage 3: structural sanity
//=========================================================================================

/// String-aware brace balancing: quotes and escape sequences inside string
/// literals do not count toward the balance.
fn has_balanced_braces(json: &str) -> bool {
    if !json.starts_with('{') || !json.ends_with('}') {
        return false;
    }

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth == 0 && !in_string
}

//=========================================================================================
// Stage 4: best-effort repair
//=========================================================================================

/// Best-effort repair of almost-JSON.
///
/// Heuristics, in order: strip trailing commas, escape unescaped quotes
/// inside known string fields, and finally a line-oriented re-escape of those
/// same fields. Each rule is independently tested below; none of them is
/// complete, and none of them fabricates content.
fn try_repair(json: &str) -> String {
    let stripped = strip_trailing_commas(json);
    let quote_fixed = escape_field_quotes(&stripped);

    if serde_json::from_str::<serde::de::IgnoredAny>(&quote_fixed).is_ok() {
        return quote_fixed;
    }

    repair_lines(&stripped)
}

/// `{"a": 1,}` and `[1, 2,]` lose their trailing commas.
fn strip_trailing_commas(json: &str) -> String {
    trailing_comma_re().replace_all(json, "$1").to_string()
}

/// Escapes unescaped inner quotes in `question`/`explanation`/`correctAnswer`
/// values. A paired temporary-marker substitution keeps already-escaped
/// quotes from being double-escaped.
fn escape_field_quotes(json: &str) -> String {
    field_value_re()
        .replace_all(json, |caps: &regex::Captures| {
            let fixed = caps[2]
                .replace("\\\"", "\u{1}")
                .replace('"', "\\\"")
                .replace('\u{1}', "\\\"");
            format!("{}{}{}", &caps[1], fixed, &caps[3])
        })
        .to_string()
}

/// Last resort: for lines assigning to a repairable field, re-escape every
/// quote in the value that is not already preceded by a backslash.
fn repair_lines(json: &str) -> String {
    let repaired: Vec<String> = json.lines().map(repair_line).collect();
    repaired.join("\n")
}

fn repair_line(line: &str) -> String {
    let names_field = REPAIRABLE_FIELDS
        .iter()
        .any(|field| line.contains(&format!("\"{}\"", field)));
    if !line.contains("\":") || !names_field {
        return line.to_string();
    }

    let colon = match line.find("\":") {
        Some(idx) => idx,
        None => return line.to_string(),
    };
    let before = line[..colon + 2].trim();
    let after = line[colon + 2..].trim();

    if !after.starts_with('"') {
        return line.to_string();
    }

    let body = &after[1..];
    let (value, comma) = if let Some(stripped) = body.strip_suffix("\",") {
        (stripped, ",")
    } else if let Some(stripped) = body.strip_suffix('"') {
        (stripped, "")
    } else {
        return line.to_string();
    };

    format!("{} \"{}\"{}", before, escape_unescaped_quotes(value), comma)
}

fn escape_unescaped_quotes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_backslash = false;
    for ch in value.chars() {
        if ch == '"' && !prev_backslash {
            out.push('\\');
        }
        prev_backslash = ch == '\\' && !prev_backslash;
        out.push(ch);
    }
    out
}

//=========================================================================================
// Stage 5: validation
//=========================================================================================

/// Validates the parsed value and maps it into domain questions. One
/// malformed question invalidates the whole batch; no partial lists.
fn validate_questions(parsed: &Value) -> Result<Vec<QuizQuestion>, String> {
    let object = parsed
        .as_object()
        .ok_or_else(|| "Parsed result is not an object".to_string())?;

    let questions = object
        .get("questions")
        .and_then(Value::as_array)
        .ok_or_else(|| "Invalid quiz format: missing questions array".to_string())?;

    if questions.is_empty() {
        return Err("No questions found in the response".to_string());
    }

    questions
        .iter()
        .enumerate()
        .map(|(index, entry)| map_question(entry, index))
        .collect()
}

fn map_question(entry: &Value, index: usize) -> Result<QuizQuestion, String> {
    let question = entry
        .get("question")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| format!("Question {} is missing or invalid", index + 1))?;

    let kind = match entry.get("type").and_then(Value::as_str) {
        Some("true_false") => QuestionKind::TrueFalse,
        Some("mcq") => QuestionKind::Mcq,
        _ => QuestionKind::Mcq,
    };

    let options = if kind == QuestionKind::Mcq {
        entry.get("options").and_then(Value::as_array).map(|opts| {
            opts.iter()
                .map(|opt| match opt {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
    } else {
        None
    };

    let correct_answer = match entry.get("correctAnswer") {
        Some(Value::Bool(flag)) => CorrectAnswer::Bool(*flag),
        Some(Value::String(text)) => CorrectAnswer::Text(text.clone()),
        Some(Value::Number(n)) => CorrectAnswer::Text(n.to_string()),
        _ => return Err(format!("Question {} has no usable correctAnswer", index + 1)),
    };

    let explanation = entry
        .get("explanation")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    let difficulty = match entry.get("difficulty").and_then(Value::as_str) {
        Some("easy") => Difficulty::Easy,
        Some("hard") => Difficulty::Hard,
        Some("medium") => Difficulty::Medium,
        _ => Difficulty::Medium,
    };

    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("q{}", index + 1));

    Ok(QuizQuestion {
        id,
        kind,
        question: question.to_string(),
        options,
        correct_answer,
        explanation,
        difficulty,
    })
}
