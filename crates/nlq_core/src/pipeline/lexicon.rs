//! Keyword tables shared by the rule extractor and the intent recognizer.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex fragment for `yyyy-mm-dd`, `yyyy/mm/dd`, `yyyy.mm.dd` and `yyyy年m月d日`.
pub const DATE_PATTERN: &str = r"(\d{4})[-/年.](\d{1,2})[-/月.](\d{1,2})日?";

/// Build a date from three consecutive year/month/day groups starting at `first`.
pub fn date_from_captures(caps: &Captures<'_>, first: usize) -> Option<NaiveDate> {
    let year = caps.get(first)?.as_str().parse().ok()?;
    let month = caps.get(first + 1)?.as_str().parse().ok()?;
    let day = caps.get(first + 2)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// A phrase alternation that maps every phrase to a canonical form.
///
/// Longer phrases are tried first, so `大于等于` wins over `大于`. Latin
/// phrases only match on word boundaries.
pub struct Lexicon {
    regex: Regex,
    canonical: HashMap<&'static str, &'static str>,
}

/// One lexicon hit; offsets are byte offsets into the searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconMatch<'t> {
    pub start: usize,
    pub end: usize,
    pub text: &'t str,
    pub canonical: &'static str,
}

impl Lexicon {
    pub fn new(groups: &[(&'static str, &[&'static str])]) -> Self {
        let mut phrases: Vec<(&'static str, &'static str)> = groups
            .iter()
            .flat_map(|(canonical, phrases)| phrases.iter().map(move |p| (*p, *canonical)))
            .collect();
        phrases.sort_by_key(|(p, _)| std::cmp::Reverse(p.chars().count()));

        let alternation = phrases
            .iter()
            .map(|(p, _)| {
                let escaped = regex::escape(p).replace(' ', r"\s+");
                if p.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    format!(r"\b{escaped}\b")
                } else {
                    escaped
                }
            })
            .collect::<Vec<_>>()
            .join("|");

        Self {
            regex: Regex::new(&alternation).expect("lexicon phrases are escaped"),
            canonical: phrases.into_iter().collect(),
        }
    }

    /// Canonical form of a matched phrase; runs of whitespace compare equal.
    pub fn canonical(&self, matched: &str) -> Option<&'static str> {
        let collapsed = matched.split_whitespace().collect::<Vec<_>>().join(" ");
        self.canonical.get(collapsed.as_str()).copied()
    }

    /// All non-overlapping hits, left to right.
    pub fn find_iter<'t>(&'t self, text: &'t str) -> impl Iterator<Item = LexiconMatch<'t>> + 't {
        self.regex.find_iter(text).filter_map(move |m| {
            self.canonical(m.as_str()).map(|canonical| LexiconMatch {
                start: m.start(),
                end: m.end(),
                text: m.as_str(),
                canonical,
            })
        })
    }

    /// The leftmost hit.
    pub fn first<'t>(&'t self, text: &'t str) -> Option<LexiconMatch<'t>> {
        self.find_iter(text).next()
    }
}

pub static OPERATORS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(&[
        (">=", &["大于等于", "不小于", "不少于", "至少", "at least", ">="]),
        ("<=", &["小于等于", "不大于", "不超过", "至多", "at most", "<="]),
        ("!=", &["不等于", "not equal to", "!=", "<>"]),
        (">", &["大于", "超过", "高于", "多于", "greater than", "more than", "above", ">"]),
        ("<", &["小于", "低于", "少于", "less than", "fewer than", "below", "<"]),
        ("=", &["等于", "equals", "equal to", "==", "=", "为", "is"]),
        ("LIKE", &["包含", "含有", "contains", "like"]),
    ])
});

/// Canonical form of verbs like 统计 that ask for an aggregate without
/// naming a function.
pub const GENERIC_AGGREGATE: &str = "AGGREGATE";

pub static AGGREGATES: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(&[
        ("COUNT", &["数量", "个数", "计数", "总数", "总共", "多少", "count", "how many", "number of"]),
        ("SUM", &["总和", "合计", "求和", "总额", "总计", "总", "sum", "total"]),
        ("AVG", &["平均", "均值", "average", "avg", "mean"]),
        ("MAX", &["最大", "最高", "max", "maximum", "highest", "largest"]),
        ("MIN", &["最小", "最低", "min", "minimum", "lowest", "smallest"]),
        (
            GENERIC_AGGREGATE,
            &["统计", "计算", "汇总", "statistics", "statistic", "calculate", "summary", "summarize"],
        ),
    ])
});

pub static ORDERS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(&[
        ("DESC", &["降序", "倒序", "从高到低", "从大到小", "desc", "descending"]),
        ("ASC", &["升序", "正序", "从低到高", "从小到大", "asc", "ascending"]),
        ("ORDER BY", &["排序", "排列", "order by", "ordered by", "sort by", "sorted by"]),
    ])
});

pub static CONDITIONS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(&[
        ("AND", &["并且", "而且", "以及", "且", "and"]),
        ("OR", &["或者", "或", "or"]),
    ])
});

/// Grouping phrases; the first participating group is the field.
pub static GROUP_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"按\s*([^\s,，。;；按]+?)\s*(?:分组|汇总|统计)|\bgroup\s+by\s+([a-z_][a-z0-9_]*)|每个\s*([^\s,，。;；的]+)|\b(?:per|each)\s+([a-z_][a-z0-9_]*)",
    )
    .expect("valid group regex")
});
