//! Keyword-category fallback.

/// Category tag and its keywords, in scan order.
const CATEGORIES: &[(&str, &[&str])] = &[
    ("投資", &["投資", "股票", "理財", "基金", "賺錢", "invest", "stock"]),
    ("職涯", &["工作", "職場", "面試", "老闆", "同事", "career", "job"]),
    ("教育", &["學習", "教育", "學校", "考試", "老師", "learn", "school"]),
    ("科技", &["科技", "電腦", "手機", "網路", "軟體", "tech", "software"]),
    ("健康", &["健康", "醫生", "運動", "減肥", "生病", "health", "fitness"]),
    ("時事", &["新聞", "政府", "政策", "選舉", "社會", "news", "policy"]),
    ("娛樂", &["電影", "音樂", "遊戲", "綜藝", "明星", "movie", "music"]),
    ("家庭", &["家庭", "父母", "孩子", "婚姻", "小孩", "family", "parent"]),
];

/// Names of the fallback categories.
pub fn category_names() -> impl Iterator<Item = &'static str> {
    CATEGORIES.iter().map(|(name, _)| *name)
}

/// Categories with at least one keyword present in `lowered`.
///
/// Confidence is 0.4 for one category, +0.1 per additional one, capped at 0.8.
pub fn match_text(lowered: &str, max_tags: usize) -> Option<(Vec<String>, f32)> {
    let matched: Vec<&str> = CATEGORIES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(name, _)| *name)
        .collect();

    if matched.is_empty() {
        return None;
    }

    let confidence = (0.4 + 0.1 * (matched.len() - 1) as f32).min(0.8);
    let tags = matched
        .into_iter()
        .take(max_tags)
        .map(str::to_string)
        .collect();
    Some((tags, confidence))
}
