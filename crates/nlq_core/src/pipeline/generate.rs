//! SQL generation from entities and intent.
//!
//! The generator resolves a table, then maps column/operator/literal runs to
//! parameterized predicates and the intent to aggregation, time window,
//! ordering and paging. It never fails: gaps lower the confidence and are
//! recorded as explanations. Values are always bound as `$n` parameters;
//! only parsed integers (LIMIT/OFFSET) are rendered inline.

use crate::config::GenerationConfig;
use crate::models::intent::relative_start;
use crate::models::{
    AggregateFunction, BoundParameter, ColumnInfo, EntityKind, EntityTag, GeneratedSql,
    LimitRequirement, QueryIntent, QueryType, SchemaInfo, SqlValue, TableInfo, TimeRange,
};
use crate::pipeline::lexicon::AGGREGATES;

use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use uuid::Uuid;

/// Confidence assigned when the only table in the schema is assumed.
const SOLE_TABLE_CONFIDENCE: f64 = 0.3;
/// Factor applied to column confidence when the table is inferred from it.
const INFERRED_TABLE_FACTOR: f64 = 0.8;
/// Minimum similarity for resolving a sort or group phrase to a column.
const FIELD_MATCH_THRESHOLD: f64 = 0.7;
/// Chars allowed between a column and the sort keyword next to it.
const SORT_PHRASE_GAP: usize = 1;

const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "by", "case", "check", "column", "default", "desc", "distinct",
    "else", "end", "false", "from", "group", "having", "in", "is", "limit", "not", "null",
    "offset", "on", "or", "order", "primary", "references", "select", "table", "then", "to",
    "true", "union", "user", "when", "where", "with",
];

/// Per-request generation settings.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Reference time for relative ranges
    pub now: NaiveDateTime,
    pub config: GenerationConfig,
}

impl GenerationContext {
    pub fn new(now: NaiveDateTime, config: GenerationConfig) -> Self {
        Self { now, config }
    }
}

impl Default for GenerationContext {
    fn default() -> Self {
        Self::new(chrono::Local::now().naive_local(), GenerationConfig::default())
    }
}

/// Quote an identifier unless it is a plain lowercase name.
pub fn quote_ident(name: &str) -> String {
    let plain = name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED_WORDS.contains(&name);
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// A table the query could read from.
#[derive(Debug, Clone)]
struct TableCandidate<'s> {
    name: String,
    info: Option<&'s TableInfo>,
    confidence: f64,
    reason: String,
}

impl TableCandidate<'_> {
    fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.info.and_then(|t| t.column(name))
    }

    /// The column an entity refers to in this table, by canonical name.
    fn column_for(&self, entity: &EntityTag) -> Option<String> {
        match self.info {
            Some(info) => info.column(&entity.value).map(|c| c.name.clone()),
            None => match entity.attributes.table.as_deref() {
                Some(table) if !table.eq_ignore_ascii_case(&self.name) => None,
                _ => Some(entity.value.clone()),
            },
        }
    }
}

/// Accumulates parameters, explanations and confidence for one statement.
struct Builder {
    parameters: Vec<BoundParameter>,
    explanations: Vec<String>,
    confidence: f64,
}

impl Builder {
    fn new(confidence: f64) -> Self {
        Self { parameters: Vec::new(), explanations: Vec::new(), confidence }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        let name = format!("${}", self.parameters.len() + 1);
        self.parameters.push(BoundParameter { name: name.clone(), value });
        name
    }

    fn explain(&mut self, message: impl Into<String>) {
        self.explanations.push(message.into());
    }

    fn penalize(&mut self, factor: f64, message: impl Into<String>) {
        self.confidence *= factor;
        self.explain(message);
    }
}

/// A `column op value` predicate with its connector to the previous one.
struct Predicate {
    connector: &'static str,
    sql: String,
}

/// Maps pipeline output to a parameterized SELECT.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGenerator;

impl SqlGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate SQL. Never fails; an unresolvable table yields empty SQL
    /// with zero confidence and an explanation.
    pub fn generate(
        &self,
        entities: &[EntityTag],
        intent: &QueryIntent,
        schema: Option<&SchemaInfo>,
        context: &GenerationContext,
    ) -> GeneratedSql {
        let mut ordered: Vec<&EntityTag> = entities.iter().collect();
        ordered.sort_by_key(|e| (e.start_offset, e.end_offset));

        let (candidates, mut notes) = table_candidates(&ordered, schema);
        let Some(best) = candidates.first() else {
            notes.push("No table could be resolved from the question".to_string());
            return GeneratedSql { explanations: notes, ..GeneratedSql::default() };
        };

        let mut generated = self.build(best, &ordered, intent, context);
        let mut explanations = notes;
        explanations.append(&mut generated.explanations);
        generated.explanations = explanations;

        let floor = best.confidence - context.config.ambiguity_margin;
        for alternative in candidates
            .iter()
            .skip(1)
            .filter(|c| c.confidence >= floor)
            .take(context.config.max_alternatives)
        {
            let sql = self.build(alternative, &ordered, intent, context).sql;
            generated
                .explanations
                .push(format!("Table {} is also plausible; offered as an alternative", alternative.name));
            generated.alternative_sqls.push(sql);
        }
        if !generated.alternative_sqls.is_empty() {
            generated.confidence *= 0.9;
        }

        tracing::debug!(
            table = %best.name,
            confidence = generated.confidence,
            parameter_count = generated.parameters.len(),
            alternative_count = generated.alternative_sqls.len(),
            "SQL generated"
        );
        generated
    }

    fn build(
        &self,
        table: &TableCandidate<'_>,
        entities: &[&EntityTag],
        intent: &QueryIntent,
        context: &GenerationContext,
    ) -> GeneratedSql {
        let mut b = Builder::new(table.confidence);
        b.explain(table.reason.clone());
        if table.info.is_none() {
            b.penalize(0.7, format!("Table {} could not be checked against a schema", table.name));
        }

        let columns: Vec<(&EntityTag, String)> = entities
            .iter()
            .filter(|e| e.kind == EntityKind::Column)
            .filter_map(|e| table.column_for(e).map(|name| (*e, name)))
            .collect();

        // predicates and plain projection columns
        let mut projection: Vec<String> = Vec::new();
        let mut predicates: Vec<Predicate> = Vec::new();
        let mut used_literals: HashSet<Uuid> = HashSet::new();
        let mut last_predicate_end = 0usize;
        for (i, (entity, column)) in columns.iter().enumerate() {
            let next_column_start = columns.get(i + 1).map_or(usize::MAX, |(e, _)| e.start_offset);
            let operator = entities.iter().find(|e| {
                e.kind == EntityKind::Operator
                    && e.start_offset >= entity.end_offset
                    && e.start_offset < next_column_start
            });
            let Some(operator) = operator else {
                if !in_sort_phrase(entity, entities) && !projection.contains(column) {
                    projection.push(column.clone());
                }
                continue;
            };

            let literal = entities.iter().find(|e| {
                e.kind.is_literal()
                    && e.start_offset >= operator.end_offset
                    && e.start_offset < next_column_start
                    && !used_literals.contains(&e.id)
            });
            let Some(literal) = literal else {
                b.penalize(0.9, format!("No value found for the condition on {column}"));
                continue;
            };
            used_literals.insert(literal.id);

            let op = operator.effective_value();
            let Some(value) = literal_value(literal, table.column(column), op == "LIKE") else {
                b.penalize(0.9, format!("Could not read '{}' as a value for {column}", literal.value));
                continue;
            };

            let connector = entities
                .iter()
                .rev()
                .find(|e| {
                    e.kind == EntityKind::Condition
                        && e.start_offset >= last_predicate_end
                        && e.end_offset <= entity.start_offset
                })
                .map_or("AND", |e| if e.effective_value() == "OR" { "OR" } else { "AND" });
            let placeholder = b.bind(value);
            let sql = format!("{} {op} {placeholder}", quote_ident(column));
            b.explain(format!(
                "Filter {sql} from '{}'",
                literal.origin_text().unwrap_or(&literal.value)
            ));
            predicates.push(Predicate { connector, sql });
            last_predicate_end = literal.end_offset;
        }

        // values that follow an operator but never reached a predicate
        for literal in entities.iter().filter(|e| e.kind.is_literal() && !used_literals.contains(&e.id)) {
            if inside_wider_entity(literal, entities) {
                continue;
            }
            let preceding = entities
                .iter()
                .filter(|e| e.id != literal.id && e.end_offset <= literal.start_offset)
                .max_by_key(|e| (e.end_offset, e.start_offset));
            if let Some(operator) = preceding.filter(|e| e.kind == EntityKind::Operator) {
                b.penalize(
                    0.8,
                    format!(
                        "Ignored '{} {}': no column to compare it with",
                        operator.origin_text().unwrap_or(&operator.value),
                        literal.origin_text().unwrap_or(&literal.value)
                    ),
                );
            }
        }

        let mut conditions: Vec<String> = Vec::new();
        if !predicates.is_empty() {
            let mut joined = String::new();
            for (i, predicate) in predicates.iter().enumerate() {
                if i > 0 {
                    joined.push_str(&format!(" {} ", predicate.connector));
                }
                joined.push_str(&predicate.sql);
            }
            if predicates.len() > 1 && predicates.iter().any(|p| p.connector == "OR") {
                joined = format!("({joined})");
            }
            conditions.push(joined);
        }

        if let Some(range) = &intent.time_range {
            self.time_condition(&mut b, table, range, context, &mut conditions);
        }

        // select list, grouping and aggregation
        let aggregate = intent.effective_aggregate();
        let mut select_list: Vec<String> = Vec::new();
        let mut group_by: Vec<String> = Vec::new();
        let mut aggregate_alias: Option<String> = None;

        if intent.needs_grouping() {
            for phrase in &intent.group_by {
                match resolve_field(table, &columns, phrase) {
                    Some(column) => {
                        if !group_by.contains(&column) {
                            b.explain(format!("Grouped by {column} from '{phrase}'"));
                            group_by.push(column);
                        }
                    }
                    None => b.penalize(0.8, format!("Could not resolve grouping field '{phrase}'")),
                }
            }
        }

        let grouping = !group_by.is_empty();
        if grouping || aggregate.is_some() {
            let function = aggregate.unwrap_or(AggregateFunction::Count);
            let target = aggregate_target(function, table, &projection, &columns, &group_by);
            let (expr, alias) = match &target {
                Some((column, guessed)) => {
                    if *guessed {
                        b.penalize(0.9, format!("No column named for {}; assuming {column}", function.as_sql()));
                    }
                    (
                        format!("{}({})", function.as_sql(), quote_ident(column)),
                        format!("{}_{}", function.as_sql().to_lowercase(), column.to_lowercase()),
                    )
                }
                None => ("COUNT(*)".to_string(), "count".to_string()),
            };
            if target.is_none() && function != AggregateFunction::Count {
                b.penalize(0.8, format!("No numeric column found for {}; counting rows instead", function.as_sql()));
            }
            select_list.extend(group_by.iter().map(|c| quote_ident(c)));
            select_list.push(format!("{expr} AS {}", quote_ident(&alias)));
            b.explain(format!("Aggregate {expr}"));
            aggregate_alias = Some(alias);
        } else if intent.query_type == QueryType::Distinct {
            let list = if projection.is_empty() {
                "*".to_string()
            } else {
                projection.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            };
            select_list.push(format!("DISTINCT {list}"));
            b.explain("Distinct rows requested");
        } else if projection.is_empty() {
            select_list.push("*".to_string());
            b.explain("No specific columns mentioned; selecting all columns");
        } else {
            b.explain(format!("Selected columns: {}", projection.join(", ")));
            select_list.extend(projection.iter().map(|c| quote_ident(c)));
        }

        // ordering
        let mut order_by: Vec<String> = Vec::new();
        for requirement in &intent.sort_requirements {
            let names_aggregate = AGGREGATES
                .find_iter(&requirement.field)
                .any(|m| AggregateFunction::parse(m.canonical).is_some());
            let key = if aggregate_alias.is_some() && names_aggregate {
                aggregate_alias.as_deref().map(quote_ident)
            } else {
                resolve_field(table, &columns, &requirement.field).map(|c| quote_ident(&c))
            };
            match key {
                Some(key) => {
                    let clause = format!("{key} {}", requirement.direction.as_sql());
                    b.explain(format!("Ordered by {clause} from '{}'", requirement.field));
                    order_by.push(clause);
                }
                None => b.penalize(0.9, format!("Could not resolve sort field '{}'", requirement.field)),
            }
        }

        let mut sql = format!("SELECT {} FROM {}", select_list.join(", "), quote_ident(&table.name));
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if grouping {
            let list = group_by.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
            sql.push_str(&format!(" GROUP BY {list}"));
        }
        if !order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", order_by.join(", ")));
        }
        match intent.limit_requirement {
            Some(LimitRequirement::TopN { n }) => {
                sql.push_str(&format!(" LIMIT {n}"));
                b.explain(format!("Limited to the first {n} rows"));
            }
            Some(LimitRequirement::Pagination { size, offset }) => {
                sql.push_str(&format!(" LIMIT {size} OFFSET {offset}"));
                b.explain(format!("Page of {size} rows starting at row {}", u64::from(offset) + 1));
            }
            None => {}
        }

        GeneratedSql {
            sql,
            parameters: b.parameters,
            confidence: crate::models::entity::clamp_confidence(b.confidence),
            explanations: b.explanations,
            alternative_sqls: Vec::new(),
        }
    }

    fn time_condition(
        &self,
        b: &mut Builder,
        table: &TableCandidate<'_>,
        range: &TimeRange,
        context: &GenerationContext,
        conditions: &mut Vec<String>,
    ) {
        let Some(column) = time_column(table, &context.config.time_column_hints) else {
            b.penalize(0.8, format!("No date or time column found in {} for the time range", table.name));
            return;
        };
        let ident = quote_ident(&column);

        match range {
            TimeRange::Relative { unit, value } => match relative_start(context.now, *unit, *value) {
                Some(start) => {
                    let placeholder = b.bind(SqlValue::Timestamp(start));
                    conditions.push(format!("{ident} >= {placeholder}"));
                    let unit = format!("{unit:?}").to_lowercase();
                    b.explain(format!("Time range: {column} within the last {value} {unit}(s)"));
                }
                None => b.penalize(0.8, "Relative time range is out of bounds"),
            },
            TimeRange::Absolute { start, end } => {
                self.day_window(b, &ident, *start, *end, conditions);
                b.explain(format!("Time range: {column} from {start} to {end}"));
            }
            TimeRange::Point { time } => {
                self.day_window(b, &ident, *time, *time, conditions);
                b.explain(format!("Time range: {column} on {time}"));
            }
        }
    }

    /// `start <= column < end + 1 day`, covering both dates.
    fn day_window(
        &self,
        b: &mut Builder,
        ident: &str,
        start: NaiveDate,
        end: NaiveDate,
        conditions: &mut Vec<String>,
    ) {
        let from = b.bind(SqlValue::Date(start));
        match end.checked_add_days(Days::new(1)) {
            Some(next) => {
                let to = b.bind(SqlValue::Date(next));
                conditions.push(format!("{ident} >= {from} AND {ident} < {to}"));
            }
            None => conditions.push(format!("{ident} >= {from}")),
        }
    }
}

/// Add a candidate, keeping the higher confidence for a repeated table.
fn push<'s>(candidates: &mut Vec<TableCandidate<'s>>, candidate: TableCandidate<'s>) {
    match candidates.iter_mut().find(|c| c.name == candidate.name) {
        Some(existing) if candidate.confidence > existing.confidence => *existing = candidate,
        Some(_) => {}
        None => candidates.push(candidate),
    }
}

/// Rank the tables the query could read from.
fn table_candidates<'s>(
    entities: &[&EntityTag],
    schema: Option<&'s SchemaInfo>,
) -> (Vec<TableCandidate<'s>>, Vec<String>) {
    let mut notes = Vec::new();
    let mut candidates: Vec<TableCandidate<'s>> = Vec::new();

    for entity in entities.iter().filter(|e| e.kind == EntityKind::Table) {
        let origin = entity.origin_text().unwrap_or(&entity.value);
        match schema {
            Some(schema) => match schema.table(&entity.value) {
                Some(info) => push(
                    &mut candidates,
                    TableCandidate {
                        name: info.name.clone(),
                        info: Some(info),
                        confidence: entity.confidence,
                        reason: format!(
                            "Matched '{origin}' to table {} (confidence {:.2})",
                            info.name, entity.confidence
                        ),
                    },
                ),
                None => notes.push(format!("Table {} is not in the schema; ignored", entity.value)),
            },
            None => push(
                &mut candidates,
                TableCandidate {
                    name: entity.value.clone(),
                    info: None,
                    confidence: entity.confidence,
                    reason: format!("Using table {} named in the question", entity.value),
                },
            ),
        }
    }

    if candidates.is_empty() {
        if let Some(schema) = schema {
            for entity in entities.iter().filter(|e| e.kind == EntityKind::Column) {
                let owners = schema
                    .tables
                    .iter()
                    .filter(|t| t.column(&entity.value).is_some())
                    .filter(|t| entity.attributes.table.as_deref().map_or(true, |owner| owner == t.name));
                for info in owners {
                    push(
                        &mut candidates,
                        TableCandidate {
                            name: info.name.clone(),
                            info: Some(info),
                            confidence: entity.confidence * INFERRED_TABLE_FACTOR,
                            reason: format!("Inferred table {} from column {}", info.name, entity.value),
                        },
                    );
                }
            }
        }
    }

    if candidates.is_empty() && !entities.is_empty() {
        if let Some(info) = schema.filter(|s| s.tables.len() == 1).and_then(|s| s.tables.first()) {
            candidates.push(TableCandidate {
                name: info.name.clone(),
                info: Some(info),
                confidence: SOLE_TABLE_CONFIDENCE,
                reason: format!("Assuming {}, the only table in the schema", info.name),
            });
        }
    }

    // stable: ties keep first mention
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    (candidates, notes)
}

/// Whether a column mention belongs to a sort phrase such as `按金额降序`
/// or `order by amount` rather than to the select list.
fn in_sort_phrase(column: &EntityTag, entities: &[&EntityTag]) -> bool {
    entities.iter().filter(|e| e.kind == EntityKind::Order).any(|order| {
        let follows = order.start_offset >= column.end_offset
            && order.start_offset - column.end_offset <= SORT_PHRASE_GAP;
        let leads = order.effective_value() == "ORDER BY"
            && column.start_offset >= order.end_offset
            && column.start_offset - order.end_offset <= SORT_PHRASE_GAP;
        follows || leads
    })
}

/// Whether `entity` lies inside a longer entity, like the 10 in `前10条`.
fn inside_wider_entity(entity: &EntityTag, entities: &[&EntityTag]) -> bool {
    let width = entity.end_offset.saturating_sub(entity.start_offset);
    entities.iter().any(|e| {
        e.id != entity.id
            && e.start_offset <= entity.start_offset
            && entity.end_offset <= e.end_offset
            && e.end_offset.saturating_sub(e.start_offset) > width
    })
}

/// Convert a literal entity to a bound value.
fn literal_value(literal: &EntityTag, column: Option<&ColumnInfo>, like: bool) -> Option<SqlValue> {
    let value = match literal.kind {
        EntityKind::Number => SqlValue::number(&literal.value)?,
        EntityKind::DateTime => {
            SqlValue::Date(NaiveDate::parse_from_str(literal.effective_value(), "%Y-%m-%d").ok()?)
        }
        EntityKind::Boolean => SqlValue::Bool(literal.effective_value() == "true"),
        EntityKind::String | EntityKind::Value => {
            let numeric = column.is_some_and(ColumnInfo::is_numeric);
            match numeric.then(|| SqlValue::number(&literal.value)).flatten() {
                Some(number) => number,
                None => SqlValue::Text(literal.value.clone()),
            }
        }
        _ => return None,
    };
    if !like {
        return Some(value);
    }
    let text = match value {
        SqlValue::Text(s) => s,
        other => other.to_json().to_string().trim_matches('"').to_string(),
    };
    Some(SqlValue::Text(format!("%{text}%")))
}

/// Resolve a phrase from the question to a column of `table`.
fn resolve_field(table: &TableCandidate<'_>, columns: &[(&EntityTag, String)], phrase: &str) -> Option<String> {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        return None;
    }

    // a tagged column whose source text is the phrase
    if let Some((_, name)) = columns.iter().find(|(e, _)| {
        e.origin_text()
            .map(|o| o.to_lowercase())
            .is_some_and(|o| o == phrase || (o.chars().count() > 1 && phrase.contains(&o)))
    }) {
        return Some(name.clone());
    }

    let Some(info) = table.info else {
        let identifier = phrase.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        return identifier.then_some(phrase);
    };

    if let Some(column) = info.column(&phrase).or_else(|| info.column(&phrase.replace(' ', "_"))) {
        return Some(column.name.clone());
    }

    let comment = |c: &ColumnInfo| c.comment.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
    if let Some(column) = info.columns.iter().find(|c| comment(c).as_deref() == Some(phrase.as_str())) {
        return Some(column.name.clone());
    }
    if let Some(column) = info
        .columns
        .iter()
        .find(|c| comment(c).is_some_and(|m| m.contains(&phrase) || phrase.contains(&m)))
    {
        return Some(column.name.clone());
    }

    info.columns
        .iter()
        .map(|c| {
            let name_score = strsim::normalized_levenshtein(&phrase, &c.name.to_lowercase());
            let comment_score = comment(c).map_or(0.0, |m| strsim::normalized_levenshtein(&phrase, &m));
            (c, name_score.max(comment_score))
        })
        .filter(|(_, score)| *score >= FIELD_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c.name.clone())
}

/// Column an aggregate applies to, and whether it was guessed rather than
/// mentioned. `None` means `COUNT(*)`.
fn aggregate_target(
    function: AggregateFunction,
    table: &TableCandidate<'_>,
    projection: &[String],
    columns: &[(&EntityTag, String)],
    group_by: &[String],
) -> Option<(String, bool)> {
    if function == AggregateFunction::Count {
        return None;
    }
    let mentioned: Vec<&String> = projection
        .iter()
        .chain(columns.iter().map(|(_, c)| c))
        .filter(|c| !group_by.contains(c))
        .collect();

    if let Some(column) = mentioned.iter().find(|c| table.column(c).is_some_and(ColumnInfo::is_numeric)) {
        return Some(((*column).clone(), false));
    }
    // MAX/MIN also apply to dates and text
    let any_type = matches!(function, AggregateFunction::Max | AggregateFunction::Min) || table.info.is_none();
    if any_type {
        if let Some(column) = mentioned.first() {
            return Some(((*column).clone(), false));
        }
    }

    let info = table.info?;
    info.columns
        .iter()
        .filter(|c| c.is_numeric() && !is_key_column(&c.name) && !group_by.contains(&c.name))
        .map(|c| (c.name.clone(), true))
        .next()
}

fn is_key_column(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "id" || name.ends_with("_id")
}

/// The column a time range restricts.
fn time_column(table: &TableCandidate<'_>, hints: &[String]) -> Option<String> {
    match table.info {
        Some(info) => hints
            .iter()
            .find_map(|hint| info.column(hint).filter(|c| c.is_temporal()))
            .or_else(|| info.columns.iter().find(|c| c.is_temporal()))
            .or_else(|| hints.iter().find_map(|hint| info.column(hint)))
            .map(|c| c.name.clone()),
        None => hints.first().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntitySource, SortDirection, SortRequirement, TimeUnit};

    fn schema() -> SchemaInfo {
        SchemaInfo::new(
            "shop",
            vec![
                TableInfo::new("users")
                    .with_comment("用户")
                    .with_column(ColumnInfo::new("id", "bigint"))
                    .with_column(ColumnInfo::new("name", "text").with_comment("姓名"))
                    .with_column(ColumnInfo::new("created_at", "timestamp")),
                TableInfo::new("orders")
                    .with_comment("订单")
                    .with_column(ColumnInfo::new("id", "bigint"))
                    .with_column(ColumnInfo::new("city", "text").with_comment("城市"))
                    .with_column(ColumnInfo::new("status", "text").with_comment("状态"))
                    .with_column(ColumnInfo::new("amount", "numeric").with_comment("金额"))
                    .with_column(ColumnInfo::new("price", "numeric").with_comment("价格"))
                    .with_column(ColumnInfo::new("order_date", "date").with_comment("下单日期")),
            ],
        )
    }

    fn context() -> GenerationContext {
        let now = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
        GenerationContext::new(now, GenerationConfig::default())
    }

    fn tag(kind: EntityKind, value: &str, start: usize, end: usize) -> EntityTag {
        EntityTag::new(kind, value, 1.0, start, end, EntitySource::Rule)
    }

    fn table(name: &str, start: usize, end: usize) -> EntityTag {
        EntityTag::new(EntityKind::Table, name, 1.0, start, end, EntitySource::Metadata)
    }

    fn column(name: &str, table: &str, start: usize, end: usize) -> EntityTag {
        EntityTag::new(EntityKind::Column, name, 1.0, start, end, EntitySource::Metadata).with_table(table)
    }

    #[test]
    fn test_empty_entities_yield_zero_confidence() {
        let schema = schema();
        let generated = SqlGenerator::new().generate(&[], &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.confidence, 0.0);
        assert!(generated.sql.is_empty());
        assert!(!generated.explanations.is_empty());

        let generated = SqlGenerator::new().generate(&[], &QueryIntent::default(), None, &context());
        assert_eq!(generated.confidence, 0.0);
        assert!(!generated.explanations.is_empty());
    }

    #[test]
    fn test_select_all_from_matched_table() {
        let schema = schema();
        let entities = vec![table("users", 2, 4)];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM users");
        assert_eq!(generated.confidence, 1.0);
        assert!(generated.parameters.is_empty());
    }

    #[test]
    fn test_predicates_are_bound_parameters() {
        let schema = schema();
        let entities = vec![
            table("orders", 0, 2),
            column("amount", "orders", 2, 4),
            tag(EntityKind::Operator, "大于", 4, 6).with_normalized(">"),
            tag(EntityKind::Number, "100", 6, 9),
            tag(EntityKind::Condition, "OR", 9, 10).with_normalized("OR"),
            column("status", "orders", 10, 12),
            tag(EntityKind::Operator, "为", 12, 13).with_normalized("="),
            tag(EntityKind::Value, "'; drop table orders", 13, 20),
        ];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM orders WHERE (amount > $1 OR status = $2)");
        assert_eq!(generated.parameters[0].value, SqlValue::Int(100));
        assert_eq!(generated.parameters[1].value, SqlValue::Text("'; drop table orders".into()));
        assert!(!generated.sql.contains("drop"));
    }

    #[test]
    fn test_repeated_operator_pairs_by_position() {
        // 订单金额大于100并且价格大于5
        let schema = schema();
        let entities = vec![
            table("orders", 0, 2),
            column("amount", "orders", 2, 4),
            tag(EntityKind::Operator, "大于", 4, 6).with_normalized(">"),
            tag(EntityKind::Number, "100", 6, 9),
            tag(EntityKind::Condition, "AND", 9, 11).with_normalized("AND"),
            column("price", "orders", 11, 13),
            tag(EntityKind::Operator, "大于", 13, 15).with_normalized(">"),
            tag(EntityKind::Number, "5", 15, 16),
        ];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM orders WHERE amount > $1 AND price > $2");
        assert_eq!(generated.parameters[0].value, SqlValue::Int(100));
        assert_eq!(generated.parameters[1].value, SqlValue::Int(5));
        assert_eq!(generated.confidence, 1.0);
    }

    #[test]
    fn test_value_without_column_lowers_confidence() {
        // 订单大于100
        let schema = schema();
        let entities = vec![
            table("orders", 0, 2),
            tag(EntityKind::Operator, "大于", 2, 4).with_normalized(">"),
            tag(EntityKind::Number, "100", 4, 7),
        ];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM orders");
        assert!((generated.confidence - 0.8).abs() < 1e-9);
        assert!(generated
            .explanations
            .contains(&"Ignored '大于 100': no column to compare it with".to_string()));
    }

    #[test]
    fn test_sort_field_is_not_projected() {
        // show top 5 orders sorted by amount desc
        let schema = schema();
        let entities = vec![
            tag(EntityKind::Limit, "5", 5, 10),
            tag(EntityKind::Number, "5", 9, 10),
            table("orders", 11, 17),
            tag(EntityKind::Order, "ORDER BY", 18, 27).with_normalized("ORDER BY"),
            column("amount", "orders", 28, 34),
            tag(EntityKind::Order, "DESC", 35, 39).with_normalized("DESC"),
        ];
        let intent = QueryIntent {
            sort_requirements: vec![SortRequirement { field: "amount".into(), direction: SortDirection::Desc }],
            limit_requirement: Some(LimitRequirement::TopN { n: 5 }),
            confidence: 1.0,
            ..QueryIntent::default()
        };
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM orders ORDER BY amount DESC LIMIT 5");
        assert_eq!(generated.confidence, 1.0);

        // a column named outside the sort phrase is still selected
        let mut entities = entities;
        entities.push(column("city", "orders", 41, 45));
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT city FROM orders ORDER BY amount DESC LIMIT 5");
    }

    #[test]
    fn test_last_page_offset_is_explained() {
        let schema = schema();
        let entities = vec![table("orders", 0, 2)];
        let intent = QueryIntent {
            limit_requirement: Some(LimitRequirement::page(u32::MAX, 10)),
            confidence: 1.0,
            ..QueryIntent::default()
        };
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(generated.sql, format!("SELECT * FROM orders LIMIT 10 OFFSET {}", u32::MAX));
        assert!(generated
            .explanations
            .contains(&"Page of 10 rows starting at row 4294967296".to_string()));
    }

    #[test]
    fn test_like_wraps_value() {
        let schema = schema();
        let entities = vec![
            column("name", "users", 0, 2),
            tag(EntityKind::Operator, "包含", 2, 4).with_normalized("LIKE"),
            tag(EntityKind::Value, "张", 4, 5),
        ];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM users WHERE name LIKE $1");
        assert_eq!(generated.parameters[0].value, SqlValue::Text("%张%".into()));
        // table inferred from the column
        assert!((generated.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_group_time_sort_and_limit() {
        let schema = schema();
        let entities = vec![table("orders", 0, 2)];
        let intent = QueryIntent {
            query_type: QueryType::Group,
            aggregation: Some(AggregateFunction::Sum),
            group_by: vec!["城市".into()],
            time_range: Some(TimeRange::Relative { unit: TimeUnit::Day, value: 30 }),
            sort_requirements: vec![SortRequirement { field: "总额".into(), direction: SortDirection::Desc }],
            limit_requirement: Some(LimitRequirement::TopN { n: 5 }),
            confidence: 1.0,
            ..QueryIntent::default()
        };
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(
            generated.sql,
            "SELECT city, SUM(amount) AS sum_amount FROM orders WHERE order_date >= $1 \
             GROUP BY city ORDER BY sum_amount DESC LIMIT 5"
        );
        let start = NaiveDate::from_ymd_opt(2024, 2, 14).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(generated.parameters[0].value, SqlValue::Timestamp(start));
    }

    #[test]
    fn test_absolute_range_and_pagination() {
        let schema = schema();
        let entities = vec![table("orders", 0, 2)];
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let intent = QueryIntent {
            time_range: Some(TimeRange::Absolute { start: d(1, 1), end: d(1, 31) }),
            limit_requirement: Some(LimitRequirement::Pagination { size: 20, offset: 40 }),
            ..QueryIntent::default()
        };
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(
            generated.sql,
            "SELECT * FROM orders WHERE order_date >= $1 AND order_date < $2 LIMIT 20 OFFSET 40"
        );
        assert_eq!(generated.parameters[1].value, SqlValue::Date(d(2, 1)));
    }

    #[test]
    fn test_count_and_projection() {
        let schema = schema();
        let intent = QueryIntent { query_type: QueryType::Count, ..QueryIntent::default() };
        let entities = vec![table("users", 0, 2)];
        let generated = SqlGenerator::new().generate(&entities, &intent, Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT COUNT(*) AS count FROM users");

        let entities = vec![table("users", 0, 2), column("name", "users", 3, 5)];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT name FROM users");
    }

    #[test]
    fn test_ambiguous_tables_offer_alternatives() {
        let schema = schema();
        let entities = vec![table("users", 0, 2), table("orders", 3, 5)];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert_eq!(generated.sql, "SELECT * FROM users");
        assert_eq!(generated.alternative_sqls, vec!["SELECT * FROM orders".to_string()]);
        assert!(generated.confidence < 1.0);
    }

    #[test]
    fn test_unknown_table_is_explained() {
        let schema = schema();
        let entities = vec![table("invoices", 0, 2)];
        let generated = SqlGenerator::new().generate(&entities, &QueryIntent::default(), Some(&schema), &context());
        assert!(generated.sql.is_empty());
        assert_eq!(generated.confidence, 0.0);
        assert!(generated.explanations[0].contains("invoices"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("created_at"), "created_at");
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("OrderItems"), "\"OrderItems\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
