/// Built-in visual style presets, keyed by the id the frontend sends.
const STYLE_PRESETS: &[(&str, &str)] = &[
    ("tech", "Futuristic tech presentation, cool blue and neon accents, sleek glassmorphism panels, soft glow lighting, clean grid layout, vector UI elements."),
    ("business", "Minimal business presentation, neutral gray and navy palette, crisp typography, clean whitespace, subtle shadows, professional tone."),
    ("education", "Education-friendly presentation, warm and approachable palette, clear icons, paper-like textures, tidy layout, soft lighting."),
    ("healthcare", "Healthcare presentation, clean white and teal palette, sterile and calm atmosphere, soft diffused lighting, minimalist medical icons."),
    ("finance", "Financial presentation, deep navy and gold accents, structured grids, sharp contrasts, premium corporate feel, restrained textures."),
    ("agriculture", "Agriculture presentation, earthy green and brown palette, natural textures, sunlight atmosphere, organic shapes and fields imagery."),
    ("sustainability", "Sustainability presentation, green and blue palette, eco-friendly motifs, natural light, recycled paper texture."),
    ("consumer", "Consumer brand presentation, vibrant yet balanced palette, bold imagery, rounded shapes, modern lifestyle vibe."),
    ("creative", "Creative presentation, colorful gradients, playful shapes, dynamic composition, artistic mood."),
    ("saas", "SaaS product presentation, light background, soft gradients, bento layouts, clean cards, modern UI feel."),
    ("government", "Government presentation, stable and formal palette, conservative layout, clear hierarchy, low-saturation colors."),
    ("industrial", "Industrial presentation, steel gray and amber accents, geometric structure, robust textures, technical diagrams style."),
];

/// Resolve a preset id to its style prompt. Unknown or missing ids give "".
pub fn resolve_style_preset(preset_id: Option<&str>) -> &'static str {
    let Some(id) = preset_id.filter(|id| !id.is_empty()) else {
        return "";
    };
    STYLE_PRESETS
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, prompt)| *prompt)
        .unwrap_or("")
}

/// English name and native name for an output language code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageLabels {
    pub english: &'static str,
    pub native: &'static str,
}

pub fn language_labels(language: &str) -> LanguageLabels {
    let (english, native) = match language {
        "zh" => ("Chinese", "中文"),
        "ja" => ("Japanese", "日本語"),
        "ko" => ("Korean", "한국어"),
        "fr" => ("French", "Français"),
        "es" => ("Spanish", "Español"),
        "de" => ("German", "Deutsch"),
        "pt" => ("Portuguese", "Português"),
        _ => ("English", "English"),
    };
    LanguageLabels { english, native }
}

/// Instruction line appended to agent requests so they answer in the
/// requested language.
pub fn language_instruction(language: &str, what: &str) -> String {
    let labels = language_labels(language);
    format!("Please output {what} in {}.", labels.english)
}
