use crate::models::PresentationMode;

struct SummaryLimits {
    max_items: usize,
    max_total: usize,
    max_item_len: usize,
}

fn limits(is_zh: bool, mode: PresentationMode) -> SummaryLimits {
    match (mode, is_zh) {
        (PresentationMode::Slides, true) => SummaryLimits { max_items: 5, max_total: 70, max_item_len: 12 },
        (PresentationMode::Slides, false) => SummaryLimits { max_items: 5, max_total: 45, max_item_len: 10 },
        (_, true) => SummaryLimits { max_items: 6, max_total: 120, max_item_len: 18 },
        (_, false) => SummaryLimits { max_items: 6, max_total: 70, max_item_len: 14 },
    }
}

/// Chinese text is measured in characters, everything else in words.
fn item_len(item: &str, is_zh: bool) -> usize {
    if is_zh {
        item.chars().count()
    } else {
        item.split_whitespace().count()
    }
}

fn shorten_item(item: &str, is_zh: bool, max_len: usize) -> String {
    if is_zh {
        if item.chars().count() > max_len {
            let head: String = item.chars().take(max_len).collect();
            return format!("{head}…");
        }
    } else {
        let words: Vec<&str> = item.split_whitespace().collect();
        if words.len() > max_len {
            return format!("{}…", words[..max_len].join(" "));
        }
    }
    item.to_string()
}

fn drop_last_unit(item: &str, is_zh: bool) -> String {
    if is_zh {
        let mut chars: Vec<char> = item.chars().collect();
        chars.pop();
        chars.into_iter().collect()
    } else {
        let words: Vec<&str> = item.split_whitespace().collect();
        words[..words.len().saturating_sub(1)].join(" ")
    }
}

/// Tighten a slide's bullet summary so it fits on the slide.
///
/// Bullets are stripped, over-long items are cut with "…", the list is
/// capped, and the tail is shortened until the whole summary fits the
/// total budget. Output is one `- item` per line.
pub fn trim_content_summary(summary: &str, language: &str, mode: PresentationMode) -> String {
    let is_zh = language == "zh";
    let limits = limits(is_zh, mode);

    let mut items: Vec<String> = summary
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.trim_matches(|c| matches!(c, ' ' | '-' | '•' | '\t')).to_string())
        .collect();
    if items.is_empty() {
        return summary.to_string();
    }

    items = items
        .iter()
        .map(|item| shorten_item(item, is_zh, limits.max_item_len))
        .collect();
    items.truncate(limits.max_items);

    while !items.is_empty()
        && items.iter().map(|i| item_len(i, is_zh)).sum::<usize>() > limits.max_total
    {
        let last = items.len() - 1;
        items[last] = drop_last_unit(&items[last], is_zh);
        if items[last].is_empty() {
            items.pop();
        }
    }

    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
