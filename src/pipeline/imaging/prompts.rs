use serde_json::Value;

use crate::db::repository::ContextMessage;
use crate::models::PresentationMode;

/// House style for slides rendered without a planned style.
pub const IMAGE_BASE_STYLE: &str = "A modern Tech/Internet company presentation slide. \
Style: Modern SaaS aesthetic, clean UI, sleek vector art, soft shadows (glassmorphism). \
Background: Clean LIGHT background (white or very light grey) with SUBTLE tech accents (faint grids, soft blue/purple mesh gradients). \
Content: Minimalist infographics, rounded cards, sans-serif typography style. \
Avoid: Old-school academic look, heavy dark borders, realistic photos, cluttered text. ";

const DEFAULT_SUBJECT: &str = "A clean presentation slide background";
const MAX_EDIT_HISTORY: usize = 5;

/// Free-form slide prompt, optionally anchored to the previous slide's
/// prompt for visual consistency.
pub fn creative_prompt(prompt: &str, reference_style: Option<&str>) -> String {
    match reference_style.filter(|r| !r.is_empty()) {
        Some(reference) => format!(
            "{IMAGE_BASE_STYLE} **TARGET SLIDE CONTENT**: {prompt}. \
             **VISUAL CONSISTENCY**: Maintain the exact same style and color palette \
             as this previous slide: [[ {reference} ]]."
        ),
        None => format!("{IMAGE_BASE_STYLE} **SLIDE CONTENT**: {prompt}"),
    }
}

fn text_field<'a>(slide: &'a Value, key: &str) -> Option<&'a str> {
    slide.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Prompt for a planned slide: subject, shared style and a text density
/// that depends on the deck mode.
pub fn plan_prompt(slide: &Value, global_style: &str, mode: PresentationMode) -> String {
    let subject = text_field(slide, "visual_subject")
        .or_else(|| text_field(slide, "visual_prompt"))
        .unwrap_or(DEFAULT_SUBJECT);
    let title = text_field(slide, "title").unwrap_or("");
    let density = match mode {
        PresentationMode::Slides => {
            "Minimal text density. Only short title and 2-4 concise bullets. Emphasize whitespace."
        }
        _ => {
            "Moderate text density. Allow 4-6 bullets with brief explanations while keeping clean layout."
        }
    };

    format!(
        "Generate a presentation slide image.\n\
         SUBJECT: {subject}\n\
         GLOBAL STYLE: {global_style}\n\
         TEXT DENSITY: {density}\n\
         TITLE (if any): {title}\n\
         CONSTRAINTS: No watermarks. No logos. Keep text readable. Use a professional layout.\n\
         COMPOSITION: Leave 35-45% whitespace for overlay text if needed.\n\
         Aspect Ratio: 16:9."
    )
}

/// Precise-edit prompt. Earlier requests on the slide are listed so the
/// model does not undo them.
pub fn modification_prompt(request: &str, history: &[ContextMessage]) -> String {
    let earlier: Vec<&str> = history
        .iter()
        .filter(|m| m.role == "user")
        .filter_map(|m| m.content.as_deref())
        .filter(|c| !c.is_empty())
        .collect();
    let earlier = &earlier[earlier.len().saturating_sub(MAX_EDIT_HISTORY)..];

    let mut prompt = String::from(
        "You are a precise slide editor. CRITICAL RULES:\n\
         1. ONLY modify the specific part the user mentions. Do NOT change anything else.\n\
         2. Keep the EXACT same layout, background, colors, fonts, and all other elements UNCHANGED.\n\
         3. If the user says 'change the title', ONLY change the title text. \
         Everything else stays pixel-perfect identical.\n\
         4. Preserve all spacing, alignment, and visual hierarchy.\n\n",
    );
    if !earlier.is_empty() {
        prompt.push_str("Earlier requests on this slide (already applied):\n");
        for item in earlier {
            prompt.push_str(&format!("- {item}\n"));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "User's modification request: {request}\n\nApply ONLY this change. Nothing else."
    ));
    prompt
}
