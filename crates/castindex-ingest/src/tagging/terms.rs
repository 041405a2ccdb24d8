//! Curated list of proper nouns and jargon.

use crate::error::IngestResult;
use std::path::Path;

const BUILTIN: &[&str] = &[
    // companies and products
    "台積電", "聯發科", "鴻海", "輝達", "NVIDIA", "特斯拉", "Tesla", "蘋果", "Apple", "微軟",
    "Microsoft", "Google", "谷歌", "臉書", "Facebook", "Instagram", "YouTube", "TikTok", "抖音",
    "亞馬遜", "Amazon", "Netflix", "三星", "Samsung", "英特爾", "超微", "高通", "Qualcomm",
    "阿里巴巴", "騰訊", "小米", "華為", "比亞迪", "波克夏", "Spotify", "ChatGPT", "OpenAI",
    "Gemini", "Claude",
    // institutions
    "聯準會", "Fed", "歐洲央行", "日本央行", "國際貨幣基金", "IMF", "世界銀行", "WTO",
    // markets and instruments
    "0050", "0056", "00878", "S&P 500", "那斯達克", "Nasdaq", "道瓊", "台股", "加權指數",
    "費半", "美股", "港股", "陸股", "日股", "美債", "公債", "華爾街", "當沖", "融資",
    "定期定額", "複利", "被動收入", "財務自由", "比特幣", "Bitcoin", "以太坊", "Ethereum",
    "穩定幣", "NFT", "Web3", "元宇宙",
    // economy and policy
    "通膨", "CPI", "殖利率", "關稅", "貿易戰", "ESG", "碳中和", "淨零", "房貸", "打房",
    "預售屋", "實價登錄", "勞保", "勞退", "健保", "長照", "少子化", "高齡化",
    // technology
    "電動車", "機器學習", "深度學習", "大型語言模型", "LLM", "生成式", "雲端", "資安",
    // work and life
    "MBTI", "KPI", "OKR", "斜槓", "遠距工作", "新冠", "COVID", "疫情",
    // places
    "矽谷", "台北", "台中", "高雄", "東京", "紐約",
    "Podcast",
];

/// Flat term list; every literal hit becomes a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermList {
    terms: Vec<String>,
}

impl Default for TermList {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TermList {
    pub fn new(terms: Vec<String>) -> Self {
        Self { terms }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN.iter().map(|t| t.to_string()).collect())
    }

    /// One term per line; blank lines and `#` comments are skipped.
    pub fn parse(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_file(path: &Path) -> IngestResult<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms found in `lowered`, in order of first occurrence.
    ///
    /// Confidence grows with the number of distinct hits: 0.5 for one,
    /// +0.1 per additional hit, capped at 0.9.
    pub fn match_text(&self, lowered: &str, max_tags: usize) -> Option<(Vec<String>, f32)> {
        let mut hits: Vec<(usize, &str)> = Vec::new();
        for term in &self.terms {
            if let Some(pos) = lowered.find(&term.to_lowercase()) {
                if !hits.iter().any(|(_, t)| t.eq_ignore_ascii_case(term)) {
                    hits.push((pos, term.as_str()));
                }
            }
        }
        if hits.is_empty() {
            return None;
        }

        hits.sort_by_key(|(pos, _)| *pos);
        let confidence = (0.5 + 0.1 * (hits.len() - 1) as f32).min(0.9);
        let tags = hits
            .into_iter()
            .take(max_tags)
            .map(|(_, t)| t.to_string())
            .collect();
        Some((tags, confidence))
    }
}
