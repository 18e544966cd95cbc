//! Schema-independent lexical rules.
//!
//! Rules run over the normalized text; byte offsets of regex matches are
//! converted to char offsets into the original text before tagging.

use super::{char_offset, EntityExtractor, ExtractionContext};
use crate::models::{EntityKind, EntitySource, EntityTag, PreprocessedText};
use crate::pipeline::lexicon::{
    date_from_captures, Lexicon, AGGREGATES, CONDITIONS, DATE_PATTERN, GENERIC_AGGREGATE,
    GROUP_PHRASE, OPERATORS, ORDERS,
};
use crate::pipeline::numerals::{parse_count, COUNT_PATTERN};

use chrono::{Days, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DATE_PATTERN).expect("valid date regex"));

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"今天|昨天|前天|明天|\btoday\b|\byesterday\b|\btomorrow\b").expect("valid day regex")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'([^']*)'|"([^"]*)"|“([^”]*)”|‘([^’]*)’|「([^」]*)」"#).expect("valid quote regex")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

static BOOLEAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(true|false|yes|no)\b|(?:为|是)(真|假)").expect("valid boolean regex")
});

static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"前\s*({COUNT_PATTERN})\s*[条个名行位]|\b(?:top|first|limit)\s+(\d+)\b"
    ))
    .expect("valid limit regex")
});

static VALUE_AFTER_OPERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([^\s,，。;；的并且和或'"“‘「]+)"#).expect("valid value regex")
});

const VALUE_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "than", "to", "of", "in", "on", "for", "and", "or", "not", "null",
    "true", "false", "yes", "no", "真", "假",
];

/// Chars that turn a following 为 into part of a word (因为, 作为, ...).
const WEAK_OPERATOR_PREFIXES: &[char] = &['因', '作', '成', '认', '称', '行', '以'];

/// Recognizes literals, operators and query keywords with regular expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEntityExtractor;

impl RuleEntityExtractor {
    /// Create a rule extractor.
    pub fn new() -> Self {
        Self
    }
}

/// Builds entities from byte ranges of the normalized text.
struct Tagger<'a> {
    text: &'a PreprocessedText,
    out: Vec<EntityTag>,
}

impl<'a> Tagger<'a> {
    fn span(&self, start: usize, end: usize) -> (usize, usize) {
        let normalized = &self.text.normalized_text;
        let base = self.text.leading_offset;
        (base + char_offset(normalized, start), base + char_offset(normalized, end))
    }

    fn origin(&self, start: usize, end: usize) -> String {
        let (s, e) = self.span(start, end);
        self.text.original_slice(s, e)
    }

    fn push(
        &mut self,
        kind: EntityKind,
        value: impl Into<String>,
        confidence: f64,
        range: (usize, usize),
        normalized: Option<String>,
    ) {
        let (start, end) = self.span(range.0, range.1);
        let mut tag = EntityTag::new(kind, value, confidence, start, end, EntitySource::Rule)
            .with_origin(self.origin(range.0, range.1));
        if let Some(normalized) = normalized {
            tag = tag.with_normalized(normalized);
        }
        self.out.push(tag);
    }

    fn lexicon(&mut self, lexicon: &Lexicon, kind: EntityKind, confidence: f64) {
        let source: &'a PreprocessedText = self.text;
        for m in lexicon.find_iter(&source.normalized_text) {
            let canonical = m.canonical;
            // generic verbs name no function to tag
            if canonical == GENERIC_AGGREGATE {
                continue;
            }
            self.push(kind, canonical, confidence, (m.start, m.end), Some(canonical.to_string()));
        }
    }
}

/// Byte ranges of explicit dates, used to keep numbers inside them untagged.
fn date_ranges(text: &str) -> Vec<(usize, usize)> {
    DATE.find_iter(text).map(|m| (m.start(), m.end())).collect()
}

fn overlaps(ranges: &[(usize, usize)], start: usize, end: usize) -> bool {
    ranges.iter().any(|&(s, e)| start < e && s < end)
}

fn resolve_day_word(word: &str, reference: NaiveDate) -> Option<NaiveDate> {
    match word {
        "今天" | "today" => Some(reference),
        "昨天" | "yesterday" => reference.checked_sub_days(Days::new(1)),
        "前天" => reference.checked_sub_days(Days::new(2)),
        "明天" | "tomorrow" => reference.checked_add_days(Days::new(1)),
        _ => None,
    }
}

impl EntityExtractor for RuleEntityExtractor {
    fn extract(&self, text: &PreprocessedText, context: &ExtractionContext) -> Vec<EntityTag> {
        if text.is_empty() {
            return Vec::new();
        }
        let normalized = text.normalized_text.as_str();
        let mut tagger = Tagger { text, out: Vec::new() };
        let dates = date_ranges(normalized);

        for caps in DATE.captures_iter(normalized) {
            let Some(whole) = caps.get(0) else { continue };
            if let Some(date) = date_from_captures(&caps, 1) {
                let iso = date.format("%Y-%m-%d").to_string();
                tagger.push(EntityKind::DateTime, iso.clone(), 1.0, (whole.start(), whole.end()), Some(iso));
            }
        }

        for m in RELATIVE_DAY.find_iter(normalized) {
            if let Some(date) = resolve_day_word(m.as_str(), context.reference_date) {
                let iso = date.format("%Y-%m-%d").to_string();
                tagger.push(EntityKind::DateTime, iso.clone(), 0.9, (m.start(), m.end()), Some(iso));
            }
        }

        let mut quoted = Vec::new();
        for caps in QUOTED.captures_iter(normalized) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.iter().skip(1).flatten().next()) else {
                continue;
            };
            quoted.push((whole.start(), whole.end()));
            // keep the literal's original case
            let value = tagger.origin(inner.start(), inner.end());
            tagger.push(EntityKind::String, value, 1.0, (whole.start(), whole.end()), None);
        }

        let operators = collect_operators(normalized, &quoted);
        for op in &operators {
            tagger.push(EntityKind::Operator, op.phrase.clone(), op.confidence, (op.start, op.end), Some(op.sql.to_string()));
        }

        for m in NUMBER.find_iter(normalized) {
            if overlaps(&dates, m.start(), m.end()) || overlaps(&quoted, m.start(), m.end()) {
                continue;
            }
            tagger.push(EntityKind::Number, m.as_str(), 1.0, (m.start(), m.end()), None);
        }

        for caps in BOOLEAN.captures_iter(normalized) {
            let Some(word) = caps.get(1).or_else(|| caps.get(2)) else { continue };
            let (value, confidence) = match word.as_str() {
                "true" | "真" => ("true", 0.9),
                "false" | "假" => ("false", 0.9),
                "yes" => ("true", 0.6),
                _ => ("false", 0.6),
            };
            tagger.push(EntityKind::Boolean, value, confidence, (word.start(), word.end()), Some(value.to_string()));
        }

        tagger.lexicon(&AGGREGATES, EntityKind::Function, 0.9);
        tagger.lexicon(&ORDERS, EntityKind::Order, 0.9);
        tagger.lexicon(&CONDITIONS, EntityKind::Condition, 0.8);

        for caps in LIMIT.captures_iter(normalized) {
            let (Some(whole), Some(count)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
                continue;
            };
            if let Some(n) = parse_count(count.as_str()) {
                tagger.push(EntityKind::Limit, n.to_string(), 0.9, (whole.start(), whole.end()), Some(n.to_string()));
            }
        }

        for caps in GROUP_PHRASE.captures_iter(normalized) {
            let Some(field) = caps.iter().skip(1).flatten().next() else { continue };
            let value = field.as_str().trim();
            if !value.is_empty() {
                tagger.push(EntityKind::Group, value, 0.8, (field.start(), field.end()), None);
            }
        }

        for op in &operators {
            let rest = &normalized[op.end..];
            let Some(caps) = VALUE_AFTER_OPERATOR.captures(rest) else { continue };
            let Some(m) = caps.get(1) else { continue };
            let (start, end) = (op.end + m.start(), op.end + m.end());
            let phrase = m.as_str();
            let skip = phrase.starts_with(|c: char| c.is_ascii_digit())
                || VALUE_STOP_WORDS.contains(&phrase)
                || operators.iter().any(|o| o.start == start)
                || overlaps(&dates, start, end);
            if !skip {
                let value = tagger.origin(start, end);
                tagger.push(EntityKind::Value, value, 0.7, (start, end), None);
            }
        }

        tagger.out
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

struct OperatorMatch {
    phrase: String,
    sql: &'static str,
    confidence: f64,
    start: usize,
    end: usize,
}

/// Operator matches outside quoted literals.
///
/// The weak copulas 为 and `is` score lower and are dropped when they
/// belong to a word or are followed directly by another operator.
fn collect_operators(text: &str, quoted: &[(usize, usize)]) -> Vec<OperatorMatch> {
    let mut found: Vec<OperatorMatch> = Vec::new();
    for m in OPERATORS.find_iter(text) {
        if overlaps(quoted, m.start, m.end) {
            continue;
        }
        let sql = m.canonical;
        let phrase = m.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let weak = phrase == "为" || phrase == "is";
        if phrase == "为" && text[..m.start].chars().next_back().is_some_and(|c| WEAK_OPERATOR_PREFIXES.contains(&c)) {
            continue;
        }
        let confidence = if weak {
            0.6
        } else if phrase.chars().all(|c| !c.is_alphanumeric()) {
            1.0
        } else {
            0.9
        };
        found.push(OperatorMatch { phrase, sql, confidence, start: m.start, end: m.end });
    }

    let next_starts: Vec<Option<usize>> =
        (0..found.len()).map(|i| found.get(i + 1).map(|next| next.start)).collect();
    found
        .into_iter()
        .zip(next_starts)
        .filter(|(op, next)| {
            let weak = op.confidence < 0.7;
            !(weak && next.is_some_and(|n| text[op.end..n].trim().is_empty()))
        })
        .map(|(op, _)| op)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preprocess::TextPreprocessor;

    fn extract(text: &str) -> Vec<EntityTag> {
        let text = TextPreprocessor::new().preprocess(text);
        let context = ExtractionContext {
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            ..ExtractionContext::default()
        };
        RuleEntityExtractor::new().extract_all(&text, &context)
    }

    fn of_kind(entities: &[EntityTag], kind: EntityKind) -> Vec<&EntityTag> {
        entities.iter().filter(|e| e.kind == kind).collect()
    }

    #[test]
    fn test_chinese_operator_and_number() {
        let entities = extract("金额大于100");
        let op = of_kind(&entities, EntityKind::Operator);
        assert_eq!(op.len(), 1);
        assert_eq!(op[0].value, "大于");
        assert_eq!(op[0].effective_value(), ">");
        assert_eq!((op[0].start_offset, op[0].end_offset), (2, 4));

        let num = of_kind(&entities, EntityKind::Number);
        assert_eq!(num[0].value, "100");
        assert_eq!((num[0].start_offset, num[0].end_offset), (4, 7));
    }

    #[test]
    fn test_longest_operator_wins() {
        let entities = extract("amount >= 10 and price at least 5");
        let ops: Vec<_> = of_kind(&entities, EntityKind::Operator)
            .iter()
            .map(|e| e.effective_value().to_string())
            .collect();
        assert_eq!(ops, vec![">=", ">="]);
        assert_eq!(of_kind(&entities, EntityKind::Condition)[0].value, "AND");
    }

    #[test]
    fn test_dates_are_normalized_and_not_numbers() {
        let entities = extract("从2024年1月5日到2024/02/01");
        let dates: Vec<_> = of_kind(&entities, EntityKind::DateTime).iter().map(|e| e.value.clone()).collect();
        assert_eq!(dates, vec!["2024-01-05", "2024-02-01"]);
        assert!(of_kind(&entities, EntityKind::Number).is_empty());
    }

    #[test]
    fn test_relative_day_words_resolve() {
        let entities = extract("昨天的订单");
        let date = of_kind(&entities, EntityKind::DateTime);
        assert_eq!(date[0].value, "2024-03-14");
    }

    #[test]
    fn test_quoted_string_keeps_case() {
        let entities = extract("name = 'Alice Smith'");
        let strings = of_kind(&entities, EntityKind::String);
        assert_eq!(strings[0].value, "Alice Smith");
        assert!(of_kind(&entities, EntityKind::Value).is_empty());
    }

    #[test]
    fn test_keywords() {
        let entities = extract("按城市分组统计订单数量，按金额降序排序，前5条");
        assert_eq!(of_kind(&entities, EntityKind::Group)[0].value, "城市");
        assert_eq!(of_kind(&entities, EntityKind::Function)[0].value, "COUNT");
        let orders: Vec<_> = of_kind(&entities, EntityKind::Order).iter().map(|e| e.value.clone()).collect();
        assert!(orders.contains(&"DESC".to_string()));
        assert!(orders.contains(&"ORDER BY".to_string()));
        assert_eq!(of_kind(&entities, EntityKind::Limit)[0].value, "5");
    }

    #[test]
    fn test_chinese_numeral_limit() {
        let entities = extract("前十条记录");
        assert_eq!(of_kind(&entities, EntityKind::Limit)[0].value, "10");
    }

    #[test]
    fn test_value_after_operator() {
        let entities = extract("状态为已完成的订单");
        let values = of_kind(&entities, EntityKind::Value);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, "已完成");

        let entities = extract("status is shipped");
        assert_eq!(of_kind(&entities, EntityKind::Value)[0].value, "shipped");
    }

    #[test]
    fn test_weak_copula_yields_to_real_operator() {
        let entities = extract("amount is greater than 50");
        let ops = of_kind(&entities, EntityKind::Operator);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].effective_value(), ">");

        let entities = extract("因为价格");
        assert!(of_kind(&entities, EntityKind::Operator).is_empty());
    }

    #[test]
    fn test_offsets_account_for_leading_whitespace() {
        let entities = extract("   top 3 users");
        let limit = of_kind(&entities, EntityKind::Limit);
        assert_eq!(limit[0].value, "3");
        assert_eq!(limit[0].start_offset, 3);
        assert_eq!(limit[0].origin_text(), Some("top 3"));
    }
}
