//! Curated tag/category mapping table.

use crate::error::IngestResult;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

/// One tag with its category and the terms that imply it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMapping {
    pub tag: String,
    pub category: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MappingRow {
    tag: String,
    category: String,
    terms: String,
}

/// Built-in table: tag, category, `|`-separated terms.
const BUILTIN: &[(&str, &str, &str)] = &[
    ("投資理財", "財經", "股票|投資|理財|基金|ETF|股市|存股|殖利率|資產配置|債券"),
    ("總體經濟", "財經", "通膨|升息|降息|央行|經濟|GDP|匯率|景氣"),
    ("職涯發展", "職場", "職場|面試|升遷|轉職|履歷|主管|薪水|加薪"),
    ("創業經營", "商業", "創業|品牌|行銷|商業模式|新創|募資|電商"),
    ("科技趨勢", "科技", "人工智慧|AI|科技|區塊鏈|半導體|程式|軟體|晶片"),
    ("身心健康", "健康", "健康|運動|睡眠|心理|飲食|焦慮|憂鬱|冥想"),
    ("親子教養", "家庭", "親子|教養|孩子|育兒|父母|家庭"),
    ("學習成長", "教育", "學習|閱讀|英文|語言|考試|自我成長"),
    ("時事評論", "時事", "選舉|政治|新聞|國際|時事|政策"),
    ("影視娛樂", "娛樂", "電影|影集|音樂|追劇|綜藝|遊戲"),
];

/// Tag mapping table matched by substring containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    entries: Vec<TagMapping>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn split_terms(terms: &str) -> Vec<String> {
    terms
        .split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl MappingTable {
    pub fn new(entries: Vec<TagMapping>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(tag, category, terms)| TagMapping {
                    tag: tag.to_string(),
                    category: category.to_string(),
                    terms: split_terms(terms),
                })
                .collect(),
        )
    }

    /// Read a `tag,category,terms` CSV with a header row.
    pub fn from_reader<R: Read>(reader: R) -> IngestResult<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut entries = Vec::new();
        for row in csv.deserialize::<MappingRow>() {
            let row = row?;
            let terms = split_terms(&row.terms);
            if row.tag.is_empty() || terms.is_empty() {
                continue;
            }
            entries.push(TagMapping {
                tag: row.tag,
                category: row.category,
                terms,
            });
        }
        Ok(Self::new(entries))
    }

    pub fn from_csv_path(path: &Path) -> IngestResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn entries(&self) -> &[TagMapping] {
        &self.entries
    }

    pub fn category_of(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.category.as_str())
    }

    /// Tags whose terms occur in `lowered`, ranked by matched term count.
    ///
    /// Confidence is the number of distinct matched terms over `max_tags`,
    /// capped at 1.
    pub fn match_text(&self, lowered: &str, max_tags: usize) -> Option<(Vec<String>, f32)> {
        let mut matched_terms = BTreeSet::new();
        let mut hits: Vec<(usize, &str)> = Vec::new();

        for entry in &self.entries {
            let mut count = 0;
            for term in &entry.terms {
                if lowered.contains(&term.to_lowercase()) {
                    matched_terms.insert(term.to_lowercase());
                    count += 1;
                }
            }
            if count > 0 {
                hits.push((count, entry.tag.as_str()));
            }
        }

        if hits.is_empty() {
            return None;
        }

        // Stable: ties keep table order
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        let mut tags: Vec<String> = Vec::new();
        for (_, tag) in hits {
            if tags.len() == max_tags {
                break;
            }
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        let confidence = (matched_terms.len() as f32 / max_tags.max(1) as f32).min(1.0);
        Some((tags, confidence))
    }
}
