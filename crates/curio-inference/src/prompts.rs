//! Prompts for content analysis and OCR, and lenient parsing of the
//! model's JSON answer.

use serde_json::Value;

use curio_core::defaults::{ANALYSIS_KEYWORDS, ANALYSIS_SUMMARY_WORDS};
use curio_core::{AnalysisLanguage, AnalysisPrompt, ContentAnalysis, Error, Result};

/// Build the analysis instruction for a prompt configuration.
pub fn analysis_prompt(prompt: &AnalysisPrompt) -> String {
    match (prompt.language, prompt.summarize) {
        (AnalysisLanguage::ZhTw, true) => format!(
            "請分析以下內容，並以JSON格式提供以下資訊：\n\
             {{\n  \"title\": \"簡短的標題\",\n  \"summary\": \"詳細的內容描述，約{}字\",\n  \
             \"keywords\": [{}]\n}}\n請確保回應是有效的JSON格式。",
            ANALYSIS_SUMMARY_WORDS,
            keyword_slots("關鍵詞")
        ),
        (AnalysisLanguage::ZhTw, false) => format!(
            "請分析以下內容，並以JSON格式提供以下資訊：\n\
             {{\n  \"title\": \"簡短的標題\",\n  \"keywords\": [{}]\n}}\n\
             請確保回應是有效的JSON格式。",
            keyword_slots("關鍵詞")
        ),
        (AnalysisLanguage::En, true) => format!(
            "Please analyze this content and provide the following information in JSON format:\n\
             {{\n  \"title\": \"a concise title\",\n  \
             \"summary\": \"detailed content description, about {} words\",\n  \
             \"keywords\": [{}]\n}}\nPlease ensure the response is in valid JSON format.",
            ANALYSIS_SUMMARY_WORDS,
            keyword_slots("keyword")
        ),
        (AnalysisLanguage::En, false) => format!(
            "Please analyze this content and provide the following information in JSON format:\n\
             {{\n  \"title\": \"a concise title\",\n  \"keywords\": [{}]\n}}\n\
             Please ensure the response is in valid JSON format.",
            keyword_slots("keyword")
        ),
    }
}

fn keyword_slots(word: &str) -> String {
    (1..=ANALYSIS_KEYWORDS)
        .map(|i| format!("\"{}{}\"", word, i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Instruction for extracting visible text from an image.
pub fn ocr_prompt(language: AnalysisLanguage) -> &'static str {
    match language {
        AnalysisLanguage::ZhTw => {
            "請擷取這張圖片中所有可見的文字，依閱讀順序逐行輸出。只輸出文字本身，不要加入任何說明。若沒有文字，請輸出空白。"
        }
        AnalysisLanguage::En => {
            "Extract all visible text in this image, line by line in reading order. \
             Output only the text itself without commentary. If there is no text, output nothing."
        }
    }
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn keywords_field(obj: &serde_json::Map<String, Value>) -> Vec<String> {
    let value = obj.get("keywords").or_else(|| obj.get("tags"));
    let keywords: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .collect(),
        Some(Value::String(s)) => s.split([',', '、', '，']).map(|k| k.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    keywords.into_iter().filter(|k| !k.is_empty()).collect()
}

/// Parse an analysis answer. Missing fields default to empty; a `tags`
/// array is accepted in place of `keywords`.
pub fn parse_analysis(raw: &str) -> Result<ContentAnalysis> {
    let body = strip_code_fence(raw);
    // Tolerate prose around the object.
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };
    let value: Value = serde_json::from_str(json).map_err(|e| {
        Error::Inference(format!("Analysis response is not valid JSON: {}", e))
    })?;
    let Value::Object(obj) = value else {
        return Err(Error::Inference(
            "Analysis response is not a JSON object".to_string(),
        ));
    };

    Ok(ContentAnalysis {
        title: string_field(&obj, "title"),
        summary: string_field(&obj, "summary"),
        keywords: keywords_field(&obj),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_variants() {
        let full = analysis_prompt(&AnalysisPrompt::new(AnalysisLanguage::En));
        assert!(full.contains("\"summary\""));
        assert!(full.contains("\"keyword5\""));
        assert!(!full.contains("keyword6"));

        let short = analysis_prompt(&AnalysisPrompt::new(AnalysisLanguage::En).without_summary());
        assert!(!short.contains("\"summary\""));
        assert!(short.contains("\"title\""));

        let zh = analysis_prompt(&AnalysisPrompt::default());
        assert!(zh.contains("約100字"));
        assert!(zh.contains("關鍵詞5"));
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_analysis(
            r#"{"title": " Trip ", "summary": "A trip.", "keywords": ["japan", "", "food"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.title, "Trip");
        assert_eq!(parsed.summary, "A trip.");
        assert_eq!(parsed.keywords, vec!["japan", "food"]);
    }

    #[test]
    fn test_parse_fenced_json_with_missing_fields() {
        let raw = "```json\n{\"title\": \"Only title\"}\n```";
        let parsed = parse_analysis(raw).unwrap();
        assert_eq!(parsed.title, "Only title");
        assert!(parsed.summary.is_empty());
        assert!(parsed.keywords.is_empty());
    }

    #[test]
    fn test_parse_accepts_tags_and_surrounding_prose() {
        let raw = "Here you go: {\"title\": \"t\", \"tags\": \"a, b、c\"} Thanks!";
        let parsed = parse_analysis(raw).unwrap();
        assert_eq!(parsed.keywords, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_analysis("no json here").is_err());
        assert!(parse_analysis("[1, 2]").is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }
}
