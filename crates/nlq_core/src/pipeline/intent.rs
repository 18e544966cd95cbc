//! Rule-based intent recognition.

use crate::config::IntentConfig;
use crate::models::{
    AggregateFunction, LimitRequirement, PreprocessedText, QueryIntent, QueryPurpose, QueryType,
    SortDirection, SortRequirement, TimeRange, TimeUnit,
};
use crate::pipeline::lexicon::{
    date_from_captures, AGGREGATES, DATE_PATTERN, GENERIC_AGGREGATE, GROUP_PHRASE, ORDERS,
};
use crate::pipeline::numerals::{parse_count, COUNT_PATTERN};

use chrono::{Days, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

/// Per-request recognition settings.
#[derive(Debug, Clone)]
pub struct IntentContext {
    /// Page size when a page number comes without one
    pub default_page_size: u32,
    /// Date that 今天/today resolve against
    pub reference_date: NaiveDate,
}

impl IntentContext {
    pub fn from_config(config: &IntentConfig, reference_date: NaiveDate) -> Self {
        Self { default_page_size: config.default_page_size.max(1), reference_date }
    }
}

impl Default for IntentContext {
    fn default() -> Self {
        Self::from_config(&IntentConfig::default(), chrono::Local::now().date_naive())
    }
}

/// Classifies what shape of query the text asks for.
pub trait IntentRecognizer: Send + Sync {
    fn recognize(&self, text: &PreprocessedText, context: &IntentContext) -> QueryIntent;

    /// Recognizer name for logging.
    fn name(&self) -> &'static str;
}

static DISTINCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"去重|不同的|不重复|\bdistinct\b|\bunique\b").expect("valid distinct regex")
});

static TREND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"趋势|变化|走势|\btrends?\b|\bover\s+time\b").expect("valid trend regex")
});

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"对比|比较|相比|\bcompare[sd]?\b|\bversus\b|\bvs\b").expect("valid comparison regex")
});

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:最近|过去|近|\blast\b|\bpast\b)\s*(?:({COUNT_PATTERN})\s*)?个?\s*(分钟|小时|天|日|周|星期|礼拜|月|年|minutes?\b|hours?\b|days?\b|weeks?\b|months?\b|years?\b)"
    ))
    .expect("valid relative time regex")
});

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{DATE_PATTERN}\s*(?:到|至|~|-|\bto\b|\band\b)\s*{DATE_PATTERN}"
    ))
    .expect("valid date range regex")
});

static SINGLE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DATE_PATTERN).expect("valid date regex"));

static DAY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"今天|昨天|前天|\btoday\b|\byesterday\b").expect("valid day word regex")
});

static CLAUSE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，。;；]|并且|然后|并").expect("valid clause regex"));

const DIRECTION_WORDS: &str = "降序|升序|倒序|正序|从高到低|从大到小|从低到高|从小到大";

static SORT_ZH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"按(?:照)?\s*([^\s,，。;；按]+?)\s*(?:({DIRECTION_WORDS})\s*(?:排序|排列)?|排序|排列)"
    ))
    .expect("valid sort regex")
});

static SORT_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:order(?:ed)?|sort(?:ed)?)\s+by\s+([a-z_][a-z0-9_]*)(?:\s+(asc|desc|ascending|descending)\b)?")
        .expect("valid sort regex")
});

static TOP_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"前\s*({COUNT_PATTERN})\s*[条个名行位]|\b(?:top|first|limit)\s+(\d+)\b"
    ))
    .expect("valid top-n regex")
});

static PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"第\s*({COUNT_PATTERN})\s*页|\bpage\s+(\d+)\b"))
        .expect("valid page regex")
});

static PAGE_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"每页\s*({COUNT_PATTERN})|(\d+)\s+(?:rows?\s+|items?\s+|records?\s+)?per\s+page|\bpage\s+size\s+(\d+)"
    ))
    .expect("valid page size regex")
});

/// Keyword and pattern rules over the normalized text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleIntentRecognizer;

impl RuleIntentRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl IntentRecognizer for RuleIntentRecognizer {
    fn recognize(&self, text: &PreprocessedText, context: &IntentContext) -> QueryIntent {
        let normalized = text.normalized_text.as_str();
        let mut intent = QueryIntent::default();
        if normalized.is_empty() {
            return intent;
        }
        let clauses: Vec<&str> = CLAUSE_SPLIT.split(normalized).filter(|c| !c.trim().is_empty()).collect();

        let aggregate = recognize_aggregate(normalized);
        let group_by = recognize_grouping(&clauses);
        let distinct = DISTINCT.is_match(normalized);

        intent.aggregation = aggregate;
        if !group_by.is_empty() {
            intent.query_type = QueryType::Group;
            intent.group_by = group_by;
        } else if let Some(function) = aggregate {
            intent.query_type = function.query_type();
        } else if distinct {
            intent.query_type = QueryType::Distinct;
        }

        intent.query_purpose = if TREND.is_match(normalized) {
            QueryPurpose::TrendAnalysis
        } else if COMPARISON.is_match(normalized) {
            QueryPurpose::ComparisonAnalysis
        } else if aggregate.is_some() || intent.query_type == QueryType::Group {
            QueryPurpose::StatisticalAnalysis
        } else {
            QueryPurpose::DataRetrieval
        };

        intent.time_range = recognize_time_range(normalized, context.reference_date);
        intent.sort_requirements = recognize_sorting(&clauses);
        intent.limit_requirement = recognize_limit(normalized, context.default_page_size);

        let fired = intent.query_type != QueryType::Select
            || intent.query_purpose != QueryPurpose::DataRetrieval
            || intent.time_range.is_some()
            || !intent.sort_requirements.is_empty()
            || intent.limit_requirement.is_some();
        intent.confidence = if fired { 1.0 } else { 0.0 };

        tracing::debug!(
            query_type = ?intent.query_type,
            purpose = ?intent.query_purpose,
            confidence = intent.confidence,
            "Intent recognized"
        );
        intent
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// The aggregate named earliest in the text. Generic verbs like 统计 fall
/// back to COUNT only when no specific function is named.
fn recognize_aggregate(text: &str) -> Option<AggregateFunction> {
    let mut generic = false;
    for m in AGGREGATES.find_iter(text) {
        match AggregateFunction::parse(m.canonical) {
            Some(function) => return Some(function),
            None => generic |= m.canonical == GENERIC_AGGREGATE,
        }
    }
    generic.then_some(AggregateFunction::Count)
}

fn recognize_grouping(clauses: &[&str]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for clause in clauses {
        for caps in GROUP_PHRASE.captures_iter(clause) {
            let Some(field) = caps.iter().skip(1).flatten().next() else { continue };
            let field = field.as_str().trim().to_string();
            if !field.is_empty() && !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    fields
}

fn recognize_time_range(text: &str, today: NaiveDate) -> Option<TimeRange> {
    if let Some(caps) = RELATIVE_TIME.captures(text) {
        let value = caps.get(1).map_or(Some(1), |m| parse_count(m.as_str()));
        let unit = caps.get(2).and_then(|m| TimeUnit::parse(m.as_str()));
        if let (Some(value), Some(unit)) = (value, unit) {
            return Some(TimeRange::Relative { unit, value });
        }
    }

    if let Some(caps) = DATE_RANGE.captures(text) {
        if let (Some(a), Some(b)) = (date_from_captures(&caps, 1), date_from_captures(&caps, 4)) {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            return Some(TimeRange::Absolute { start, end });
        }
    }

    if let Some(time) = SINGLE_DATE.captures(text).and_then(|caps| date_from_captures(&caps, 1)) {
        return Some(TimeRange::Point { time });
    }

    let word = DAY_WORD.find(text)?;
    let time = match word.as_str() {
        "今天" | "today" => Some(today),
        "昨天" | "yesterday" => today.checked_sub_days(Days::new(1)),
        _ => today.checked_sub_days(Days::new(2)),
    }?;
    Some(TimeRange::Point { time })
}

fn direction_of(word: Option<&str>) -> SortDirection {
    match word.and_then(|w| ORDERS.canonical(w)) {
        Some("DESC") => SortDirection::Desc,
        _ => SortDirection::Asc,
    }
}

/// Sort requirements in order of appearance; the first phrase naming a
/// field decides its direction.
fn recognize_sorting(clauses: &[&str]) -> Vec<SortRequirement> {
    let mut requirements: Vec<SortRequirement> = Vec::new();
    for clause in clauses {
        let mut found: Vec<(usize, String, SortDirection)> = Vec::new();
        for caps in SORT_ZH.captures_iter(clause) {
            if let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) {
                let direction = direction_of(caps.get(2).map(|m| m.as_str()));
                found.push((whole.start(), field.as_str().trim().to_string(), direction));
            }
        }
        for caps in SORT_EN.captures_iter(clause) {
            if let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) {
                let direction = direction_of(caps.get(2).map(|m| m.as_str()));
                found.push((whole.start(), field.as_str().to_string(), direction));
            }
        }
        found.sort_by_key(|(position, _, _)| *position);

        for (_, field, direction) in found {
            if !field.is_empty() && !requirements.iter().any(|r| r.field == field) {
                requirements.push(SortRequirement { field, direction });
            }
        }
    }
    requirements
}

/// TopN or pagination, whichever phrase appears first.
fn recognize_limit(text: &str, default_page_size: u32) -> Option<LimitRequirement> {
    let top = TOP_N.captures(text).and_then(|caps| {
        let start = caps.get(0)?.start();
        let n = parse_count(caps.get(1).or_else(|| caps.get(2))?.as_str())?;
        Some((start, LimitRequirement::TopN { n }))
    });

    let page = PAGE.captures(text).and_then(|caps| {
        let start = caps.get(0)?.start();
        let page = parse_count(caps.get(1).or_else(|| caps.get(2))?.as_str())?;
        let size = PAGE_SIZE
            .captures(text)
            .and_then(|sc| sc.iter().skip(1).flatten().next().and_then(|m| parse_count(m.as_str())))
            .filter(|size| *size > 0)
            .unwrap_or(default_page_size);
        Some((start, LimitRequirement::page(page, size)))
    });

    match (top, page) {
        (Some(t), Some(p)) => Some(if t.0 <= p.0 { t.1 } else { p.1 }),
        (t, p) => t.or(p).map(|(_, limit)| limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preprocess::TextPreprocessor;

    fn recognize(text: &str) -> QueryIntent {
        let text = TextPreprocessor::new().preprocess(text);
        let context = IntentContext {
            default_page_size: 10,
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        };
        RuleIntentRecognizer::new().recognize(&text, &context)
    }

    #[test]
    fn test_relative_time_days() {
        let intent = recognize("最近30天");
        assert_eq!(intent.time_range, Some(TimeRange::Relative { unit: TimeUnit::Day, value: 30 }));
        assert_eq!(intent.confidence, 1.0);
        assert_eq!(intent.query_type, QueryType::Select);
    }

    #[test]
    fn test_relative_time_variants() {
        assert_eq!(
            recognize("过去三个月的订单").time_range,
            Some(TimeRange::Relative { unit: TimeUnit::Month, value: 3 })
        );
        assert_eq!(
            recognize("orders in the last 2 weeks").time_range,
            Some(TimeRange::Relative { unit: TimeUnit::Week, value: 2 })
        );
        assert_eq!(
            recognize("sales last year").time_range,
            Some(TimeRange::Relative { unit: TimeUnit::Year, value: 1 })
        );
    }

    #[test]
    fn test_top_n() {
        assert_eq!(recognize("前10条").limit_requirement, Some(LimitRequirement::TopN { n: 10 }));
        assert_eq!(recognize("show top 5 users").limit_requirement, Some(LimitRequirement::TopN { n: 5 }));
    }

    #[test]
    fn test_pagination() {
        assert_eq!(
            recognize("订单列表第3页，每页20条").limit_requirement,
            Some(LimitRequirement::Pagination { size: 20, offset: 40 })
        );
        assert_eq!(
            recognize("第2页").limit_requirement,
            Some(LimitRequirement::Pagination { size: 10, offset: 10 })
        );
    }

    #[test]
    fn test_first_limit_phrase_wins() {
        assert_eq!(
            recognize("第2页的前5条").limit_requirement,
            Some(LimitRequirement::Pagination { size: 10, offset: 10 })
        );
        assert_eq!(
            recognize("前5条第2页").limit_requirement,
            Some(LimitRequirement::TopN { n: 5 })
        );
    }

    #[test]
    fn test_first_aggregate_wins() {
        let intent = recognize("平均金额和最大金额");
        assert_eq!(intent.query_type, QueryType::Avg);
        assert_eq!(intent.query_purpose, QueryPurpose::StatisticalAnalysis);
    }

    #[test]
    fn test_generic_verb_defaults_to_count() {
        assert_eq!(recognize("统计用户").query_type, QueryType::Count);
        assert_eq!(recognize("统计订单总额").query_type, QueryType::Sum);
    }

    #[test]
    fn test_total_prefix_sums() {
        let intent = recognize("查询订单总金额");
        assert_eq!(intent.query_type, QueryType::Sum);
        assert_eq!(intent.aggregation, Some(AggregateFunction::Sum));
        assert_eq!(intent.query_purpose, QueryPurpose::StatisticalAnalysis);
        assert_eq!(intent.confidence, 1.0);

        // 汇总 is a generic verb, not 总
        let intent = recognize("按城市汇总订单");
        assert_eq!(intent.query_type, QueryType::Group);
        assert_eq!(intent.aggregation, Some(AggregateFunction::Count));
    }

    #[test]
    fn test_grouping_keeps_aggregate() {
        let intent = recognize("按城市分组统计订单数量");
        assert_eq!(intent.query_type, QueryType::Group);
        assert_eq!(intent.aggregation, Some(AggregateFunction::Count));
        assert_eq!(intent.group_by, vec!["城市"]);
        assert!(intent.needs_grouping());
    }

    #[test]
    fn test_sorting_first_phrase_per_field_wins() {
        let intent = recognize("按金额降序排序，然后按金额升序排序，按日期排序");
        assert_eq!(
            intent.sort_requirements,
            vec![
                SortRequirement { field: "金额".into(), direction: SortDirection::Desc },
                SortRequirement { field: "日期".into(), direction: SortDirection::Asc },
            ]
        );

        let intent = recognize("list orders sorted by amount desc");
        assert_eq!(intent.sort_requirements[0].field, "amount");
        assert_eq!(intent.sort_requirements[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_absolute_and_point_ranges() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert_eq!(
            recognize("2024-01-01到2024-01-31的订单").time_range,
            Some(TimeRange::Absolute { start: d(1, 1), end: d(1, 31) })
        );
        assert_eq!(
            recognize("between 2024-02-01 and 2024-01-01").time_range,
            Some(TimeRange::Absolute { start: d(1, 1), end: d(2, 1) })
        );
        assert_eq!(recognize("2024年3月1日的订单").time_range, Some(TimeRange::Point { time: d(3, 1) }));
        assert_eq!(recognize("昨天的订单").time_range, Some(TimeRange::Point { time: d(3, 14) }));
    }

    #[test]
    fn test_purpose_precedence() {
        assert_eq!(recognize("对比各城市销售额的变化趋势").query_purpose, QueryPurpose::TrendAnalysis);
        assert_eq!(recognize("compare sales").query_purpose, QueryPurpose::ComparisonAnalysis);
        assert_eq!(recognize("查询用户").query_purpose, QueryPurpose::DataRetrieval);
    }

    #[test]
    fn test_distinct_and_default() {
        assert_eq!(recognize("去重后的城市").query_type, QueryType::Distinct);
        let intent = recognize("查询所有用户");
        assert_eq!(intent, QueryIntent::default());
        assert_eq!(intent.confidence, 0.0);
    }
}
