use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::json::parse_json_object;
use super::presets::{language_instruction, language_labels, resolve_style_preset};
use super::prompts::{
    content_agent_prompt, hook_agent_prompt, master_system_prompt, structure_agent_prompt,
    DEFAULT_STYLE_PROMPT, KEYWORD_AGENT_PROMPT, SHORT_TITLE_PROMPT, STYLE_AGENT_PROMPT,
};
use super::summary::trim_content_summary;
use crate::models::{PlanStage, PresentationMode};
use crate::pipeline::{LlmClient, PipelineError};

pub const SHORT_TITLE_FALLBACK: &str = "New Project";

const HOOK_CONTENT_CHARS: usize = 1000;
const STRUCTURE_CONTENT_CHARS: usize = 2000;
const INTEGRATE_CONTENT_CHARS: usize = 3000;
const MAX_KEYWORDS: usize = 5;

/// Inputs for a full outline plan.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub topic: String,
    pub page_count: usize,
    pub context_text: String,
    pub language: String,
    pub audience: String,
    pub scene: String,
    pub attention: String,
    pub purpose: String,
    pub presentation_mode: PresentationMode,
    pub style_preset_id: Option<String>,
}

/// Result of a successful plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedOutline {
    pub slides: Vec<Value>,
    pub global_style_prompt: String,
    pub style_meta: Value,
    pub presentation_mode: PresentationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_title: Option<String>,
}

/// Visual direction shared by every slide of a deck.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleChoice {
    pub global_style_prompt: String,
    pub style_meta: Value,
}

impl StyleChoice {
    fn fallback() -> Self {
        Self {
            global_style_prompt: DEFAULT_STYLE_PROMPT.to_string(),
            style_meta: json!({}),
        }
    }
}

/// Inputs for refining a user-edited outline.
#[derive(Debug, Clone, Copy)]
pub struct EnrichRequest<'a> {
    pub topic: &'a str,
    pub slides: &'a [Value],
    pub language: &'a str,
    pub presentation_mode: PresentationMode,
    pub global_style_prompt: &'a str,
    pub style_preset_id: Option<&'a str>,
    pub previous_context: &'a str,
    pub next_context: &'a str,
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn clean_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| line.trim_matches(|c| matches!(c, ' ' | '-' | '•' | '\t')))
        .filter(|line| !line.is_empty())
        .collect()
}

fn narrative_rule(mode: PresentationMode) -> &'static str {
    match mode {
        PresentationMode::Script => {
            "For each slide, narrative_bridge MUST include BOTH: \
             (1) how it continues from previous slide, and \
             (2) how it leads into the next slide. \
             Use two short clauses separated by a semicolon."
        }
        _ => {
            "For each slide, narrative_bridge should explain how it connects \
             to the previous slide in one concise sentence."
        }
    }
}

fn content_rules(mode: PresentationMode) -> &'static str {
    match mode {
        PresentationMode::Slides => {
            "- Keep it lean: 2-4 points per slide, a clear title, no long sentences.\n\
             - Keep content within 25-40 words (40-80 characters for CJK).\n"
        }
        _ => {
            "- Be more complete: 4-6 points per slide, specific explanations allowed.\n\
             - Keep content within 50-90 words (80-160 characters for CJK).\n"
        }
    }
}

const OUTLINE_JSON_SHAPE: &str = r#"{
  "slides": [
    {
      "index": 0,
      "title": "...",
      "content_summary": "...",
      "narrative_bridge": "...",
      "visual_subject": "..."
    }
  ]
}"#;

/// Build the ASK MAP block from whichever fields the user filled in.
pub fn ask_map_context(audience: &str, scene: &str, attention: &str, purpose: &str) -> String {
    let parts: Vec<String> = [
        ("Audience", audience),
        ("Scene", scene),
        ("Attention", attention),
        ("Purpose", purpose),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| format!("- {name}: {value}"))
    .collect();

    if parts.is_empty() {
        return String::new();
    }
    format!("=== ASK MAP requirements ===\n{}", parts.join("\n"))
}

/// Shorten `content_summary` on every slide that carries one as text.
fn trim_slide_summaries(slides: &mut [Value], language: &str, mode: PresentationMode) {
    for slide in slides.iter_mut() {
        if let Some(Value::String(summary)) = slide.get_mut("content_summary") {
            *summary = trim_content_summary(summary, language, mode);
        }
    }
}

fn take_slides(map: &mut Map<String, Value>) -> Vec<Value> {
    match map.remove("slides") {
        Some(Value::Array(slides)) => slides,
        _ => Vec::new(),
    }
}

/// Prompt-chained outline planner.
///
/// Each stage is one LLM exchange; later stages see the output of the
/// earlier ones. Only the style stage swallows its own failures.
pub struct Planner<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> Planner<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    /// Run all agents and return an outline with exactly `page_count`
    /// slides. `progress` is told about each stage as it starts.
    pub fn generate_outline<F>(
        &self,
        req: &PlanRequest,
        mut progress: F,
    ) -> Result<PlannedOutline, PipelineError>
    where
        F: FnMut(PlanStage, &str, u8),
    {
        tracing::info!(
            topic = %req.topic,
            language = %req.language,
            pages = req.page_count,
            "Planning deck"
        );

        let ask_map = ask_map_context(&req.audience, &req.scene, &req.attention, &req.purpose);
        let keywords = self.expand_topic_keywords(&req.topic, &req.language)?;

        progress(PlanStage::ExtractContent, "Extracting key content", 20);
        let refined = if req.context_text.trim().is_empty() {
            String::new()
        } else {
            let refined = self.extract_content(&req.context_text, &req.topic, &req.language)?;
            tracing::info!(chars = refined.chars().count(), "Content extracted");
            refined
        };

        progress(PlanStage::HookTitles, "Writing cover titles", 30);
        let hooks = self.hook_titles(&req.topic, &refined, &req.language, &ask_map, &keywords)?;

        progress(PlanStage::Structure, "Planning structure", 50);
        let structure = self.structure(&req.topic, &refined, &req.language, &ask_map, &keywords)?;

        progress(PlanStage::Style, "Designing visual style", 60);
        let preset = resolve_style_preset(req.style_preset_id.as_deref());
        let style = self.style(req, preset);

        progress(PlanStage::Integrate, "Drafting outline", 70);
        let outline = self.integrate(req, &hooks, &structure, &refined, &ask_map, &keywords, style)?;

        progress(PlanStage::Done, "Planning complete", 100);
        Ok(outline)
    }

    fn expand_topic_keywords(&self, topic: &str, language: &str) -> Result<String, PipelineError> {
        if topic.is_empty() {
            return Ok(String::new());
        }
        let user = format!("Topic: {topic}\n{}", language_instruction(language, "the keywords"));
        let Some(reply) = self.llm.complete(KEYWORD_AGENT_PROMPT, &user, false)? else {
            return Ok(String::new());
        };
        let items = clean_lines(&reply);
        if items.is_empty() {
            return Ok(String::new());
        }
        let items = &items[..items.len().min(MAX_KEYWORDS)];
        Ok(format!("=== Topic keywords ===\n{}", items.join("\n")))
    }

    fn extract_content(
        &self,
        context_text: &str,
        topic: &str,
        language: &str,
    ) -> Result<String, PipelineError> {
        let user = format!(
            "Topic: {topic}\n{}\n\nDistil the following source material into content fit for slides:\n\n{context_text}",
            language_instruction(language, "the content"),
        );
        let reply = self.llm.complete(&content_agent_prompt(), &user, false)?;
        Ok(reply.unwrap_or_else(|| context_text.to_string()))
    }

    fn hook_titles(
        &self,
        topic: &str,
        refined: &str,
        language: &str,
        ask_map: &str,
        keywords: &str,
    ) -> Result<String, PipelineError> {
        let mut user = format!("Deck topic: {topic}\n{}", language_instruction(language, "the titles"));
        if !refined.is_empty() {
            user.push_str(&format!(
                "\n\nDistilled core content:\n{}",
                truncate_chars(refined, HOOK_CONTENT_CHARS)
            ));
        }
        append_block(&mut user, ask_map);
        append_block(&mut user, keywords);

        let reply = self.llm.complete(&hook_agent_prompt(), &user, false)?;
        let hooks = reply.unwrap_or_else(|| topic.to_string());
        tracing::info!(hooks = %truncate_chars(&hooks, 200), "Hook titles ready");
        Ok(hooks)
    }

    fn structure(
        &self,
        topic: &str,
        refined: &str,
        language: &str,
        ask_map: &str,
        keywords: &str,
    ) -> Result<String, PipelineError> {
        let mut user = format!(
            "Deck topic: {topic}\n{}",
            language_instruction(language, "the framework")
        );
        if !refined.is_empty() {
            user.push_str(&format!(
                "\n\nDistilled content:\n{}",
                truncate_chars(refined, STRUCTURE_CONTENT_CHARS)
            ));
        }
        append_block(&mut user, ask_map);
        append_block(&mut user, keywords);

        let reply = self.llm.complete(&structure_agent_prompt(), &user, false)?;
        let structure = reply.unwrap_or_default();
        tracing::info!(structure = %truncate_chars(&structure, 200), "Structure ready");
        Ok(structure)
    }

    /// A preset short-circuits the agent. Otherwise any failure falls
    /// back to the default style.
    fn style(&self, req: &PlanRequest, preset: &str) -> StyleChoice {
        if !preset.is_empty() {
            return StyleChoice {
                global_style_prompt: preset.to_string(),
                style_meta: json!({"preset": "custom"}),
            };
        }

        let user = format!(
            "Topic: {}\nAudience: {}\nScene: {}\nAttention: {}\nPurpose: {}\n",
            req.topic, req.audience, req.scene, req.attention, req.purpose
        );
        let reply = match self.llm.complete(STYLE_AGENT_PROMPT, &user, true) {
            Ok(Some(reply)) => reply,
            Ok(None) => return StyleChoice::fallback(),
            Err(e) => {
                tracing::warn!(error = %e, "Style agent failed, using default style");
                return StyleChoice::fallback();
            }
        };

        match parse_json_object(&reply) {
            Ok(mut map) => {
                let global_style_prompt = match map.remove("global_style_prompt") {
                    Some(Value::String(s)) => s,
                    _ => DEFAULT_STYLE_PROMPT.to_string(),
                };
                let style_meta = match map.remove("style_meta") {
                    Some(meta @ Value::Object(_)) => meta,
                    _ => json!({}),
                };
                StyleChoice {
                    global_style_prompt,
                    style_meta,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Style agent reply unusable, using default style");
                StyleChoice::fallback()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        req: &PlanRequest,
        hooks: &str,
        structure: &str,
        refined: &str,
        ask_map: &str,
        keywords: &str,
        style: StyleChoice,
    ) -> Result<PlannedOutline, PipelineError> {
        let labels = language_labels(&req.language);
        let mode = req.presentation_mode;
        let pages = req.page_count;

        let system = format!(
            "{master}
You are now the Final Integration Agent. Combine the outputs from Hook Agent, Structure Agent, and Content Agent into a complete PPT plan.

# LANGUAGE RULE (CRITICAL)
- ALL text on slides (title, content_summary, narrative_bridge) MUST be in {lang}.
- ALL visual_subject MUST be in English for image generation.

# RULES FOR SLIDE COUNT (STRICT)
1. You MUST output exactly {pages} slides, no more, no less.
2. The \"slides\" array in your JSON must have exactly {pages} items.

# RULES FOR STRUCTURE
1. Slide 1 (Index 0): MUST be a Title/Cover Slide using the best Hook title.
2. Middle Slides: Follow the Structure Agent's framework.
3. Last Slide: Strategic Closing.

# CONTENT DENSITY RULES (MODE: {mode_label})
{density}
# NARRATIVE BRIDGE RULES
{narrative}

# OUTPUT FORMAT (strict JSON)
{shape}",
            master = master_system_prompt(),
            lang = labels.english,
            mode_label = mode.label(),
            density = content_rules(mode),
            narrative = narrative_rule(mode),
            shape = OUTLINE_JSON_SHAPE,
        );

        let mut user = format!(
            "Topic: {topic}
Target slide count: {pages}
Output language: {native}
Mode: {mode_label}
Global style prompt: {style_prompt}
Style meta: {meta}

=== Hook Agent title candidates ===
{hooks}

=== Structure Agent framework ===
{structure}
",
            topic = req.topic,
            native = labels.native,
            mode_label = mode.label(),
            style_prompt = style.global_style_prompt,
            meta = style.style_meta,
        );
        if !refined.is_empty() {
            user.push_str(&format!(
                "\n=== Content Agent distilled content ===\n{}",
                truncate_chars(refined, INTEGRATE_CONTENT_CHARS)
            ));
        }
        append_block(&mut user, ask_map);
        append_block(&mut user, keywords);

        let reply = self.llm.complete(&system, &user, true)?.ok_or_else(|| {
            PipelineError::EmptyResponse("Empty response from integration agent".to_string())
        })?;

        let mut map = parse_json_object(&reply)?;
        let mut slides = take_slides(&mut map);
        if slides.len() != pages {
            tracing::warn!(expected = pages, actual = slides.len(), "Slide count mismatch");
            return Err(PipelineError::SlideCountMismatch {
                expected: pages,
                actual: slides.len(),
            });
        }
        trim_slide_summaries(&mut slides, &req.language, mode);

        Ok(PlannedOutline {
            slides,
            global_style_prompt: style.global_style_prompt,
            style_meta: style.style_meta,
            presentation_mode: mode,
            session_title: None,
        })
    }

    /// Fill in `visual_subject` and `narrative_bridge` for a user-edited
    /// outline. Returns the refined slides.
    pub fn enrich_outline(&self, req: &EnrichRequest<'_>) -> Result<Vec<Value>, PipelineError> {
        let labels = language_labels(req.language);
        let mode = req.presentation_mode;
        let preset = resolve_style_preset(req.style_preset_id);
        let effective_style = if preset.is_empty() {
            req.global_style_prompt
        } else {
            preset
        };

        let system = format!(
            "You are a PPT outline refiner.

# LANGUAGE RULES
- title/content_summary/narrative_bridge MUST be in {lang}.
- visual_subject MUST be in English.

# MODE: {mode_label}
{narrative}

# OUTPUT JSON (strict)
{shape}",
            lang = labels.english,
            mode_label = mode.label(),
            narrative = narrative_rule(mode),
            shape = OUTLINE_JSON_SHAPE,
        );

        let outline = serde_json::to_string(req.slides)
            .map_err(|e| PipelineError::InvalidJson(e.to_string()))?;
        let user = format!(
            "Topic: {topic}
Output language: {native}
Mode: {mode_label}
Global style prompt: {effective_style}

Previous slide context (may be empty):
{previous}

Next slide context (may be empty):
{next}

Confirmed outline from the user (narrative_bridge/visual_subject may be missing):
{outline}
",
            topic = req.topic,
            native = labels.native,
            mode_label = mode.label(),
            previous = req.previous_context,
            next = req.next_context,
        );

        let reply = self.llm.complete(&system, &user, true)?.ok_or_else(|| {
            PipelineError::EmptyResponse("Empty response from outline refiner".to_string())
        })?;
        let mut map = parse_json_object(&reply)?;
        let mut slides = take_slides(&mut map);
        trim_slide_summaries(&mut slides, req.language, mode);
        Ok(slides)
    }

    /// Summarise free text into a short project title. Never fails.
    pub fn generate_short_title(&self, input: &str) -> String {
        match self.llm.complete(SHORT_TITLE_PROMPT, input, false) {
            Ok(Some(title)) => title,
            Ok(None) => SHORT_TITLE_FALLBACK.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Short title generation failed");
                SHORT_TITLE_FALLBACK.to_string()
            }
        }
    }
}

fn append_block(message: &mut String, block: &str) {
    if !block.is_empty() {
        message.push_str("\n\n");
        message.push_str(block);
    }
}
