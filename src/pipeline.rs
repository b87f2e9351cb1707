// Aggregation pipelines over startup documents
//
// A pipeline is plain data: an ordered list of stages. The collection answers
// a leading match stage from its indexes and hands the remaining stages the
// matching documents.

use crate::db::Filter;
use crate::error::Result;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of a numeric field; non-numeric values are skipped
    Sum(String),
    /// Mean of a numeric field; `null` when no value is numeric
    Avg(String),
    Count,
    Max(String),
    Min(String),
}

/// Group key fields keep their names in the output document, next to one
/// field per accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub keys: Vec<String>,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl GroupSpec {
    pub fn by<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupSpec {
            keys: keys.into_iter().map(Into::into).collect(),
            accumulators: Vec::new(),
        }
    }

    pub fn sum(self, output: &str, field: &str) -> Self {
        self.with(output, Accumulator::Sum(field.to_string()))
    }

    pub fn avg(self, output: &str, field: &str) -> Self {
        self.with(output, Accumulator::Avg(field.to_string()))
    }

    pub fn count(self, output: &str) -> Self {
        self.with(output, Accumulator::Count)
    }

    pub fn max(self, output: &str, field: &str) -> Self {
        self.with(output, Accumulator::Max(field.to_string()))
    }

    pub fn min(self, output: &str, field: &str) -> Self {
        self.with(output, Accumulator::Min(field.to_string()))
    }

    fn with(mut self, output: &str, acc: Accumulator) -> Self {
        self.accumulators.push((output.to_string(), acc));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// One output document per element of an array field. Documents where
    /// the field is missing or empty produce nothing.
    Unwind(String),
    Group(GroupSpec),
    /// Keys compared left to right; the sort is stable
    Sort(Vec<(String, SortOrder)>),
    Limit(usize),
    /// Keep only the listed fields
    Project(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn unwind(self, field: &str) -> Self {
        self.stage(Stage::Unwind(field.to_string()))
    }

    pub fn group(self, spec: GroupSpec) -> Self {
        self.stage(Stage::Group(spec))
    }

    pub fn sort(self, keys: &[(&str, SortOrder)]) -> Self {
        self.stage(Stage::Sort(
            keys.iter().map(|(field, order)| (field.to_string(), *order)).collect(),
        ))
    }

    pub fn limit(self, n: usize) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn project(self, fields: &[&str]) -> Self {
        self.stage(Stage::Project(fields.iter().map(|f| f.to_string()).collect()))
    }

    fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Filter for the store plus the stages left to run in memory
    pub fn split_leading_match(&self) -> (Filter, &[Stage]) {
        match self.stages.first() {
            Some(Stage::Match(filter)) => (filter.clone(), &self.stages[1..]),
            _ => (Filter::all(), &self.stages[..]),
        }
    }
}

/// Run `stages` over a stream of documents
pub fn execute<I>(stages: &[Stage], documents: I) -> Result<Vec<Value>>
where
    I: Iterator<Item = Result<Value>>,
{
    let mut docs = documents.collect::<Result<Vec<Value>>>()?;

    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Unwind(field) => unwind(docs, field),
            Stage::Group(spec) => group(docs, spec),
            Stage::Sort(keys) => {
                docs.sort_by(|a, b| compare_by_keys(a, b, keys));
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Project(fields) => docs.into_iter().map(|d| project(d, fields)).collect(),
        };
    }

    Ok(docs)
}

fn unwind(docs: Vec<Value>, field: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let Some(items) = doc[field].as_array().cloned() else {
            continue;
        };
        for item in items {
            let mut copy = doc.clone();
            copy[field] = item;
            out.push(copy);
        }
    }
    out
}

#[derive(Debug)]
enum AccState {
    Sum(f64),
    Avg { total: f64, n: u64 },
    Count(u64),
    Max(Option<f64>),
    Min(Option<f64>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum(0.0),
            Accumulator::Avg(_) => AccState::Avg { total: 0.0, n: 0 },
            Accumulator::Count => AccState::Count(0),
            Accumulator::Max(_) => AccState::Max(None),
            Accumulator::Min(_) => AccState::Min(None),
        }
    }

    fn update(&mut self, acc: &Accumulator, doc: &Value) {
        let number = match acc {
            Accumulator::Sum(f) | Accumulator::Avg(f) | Accumulator::Max(f) | Accumulator::Min(f) => {
                doc[f.as_str()].as_f64()
            }
            Accumulator::Count => None,
        };

        match self {
            AccState::Count(n) => *n += 1,
            AccState::Sum(total) => *total += number.unwrap_or(0.0),
            AccState::Avg { total, n } => {
                if let Some(x) = number {
                    *total += x;
                    *n += 1;
                }
            }
            AccState::Max(best) => {
                if let Some(x) = number {
                    *best = Some(best.map_or(x, |b| b.max(x)));
                }
            }
            AccState::Min(best) => {
                if let Some(x) = number {
                    *best = Some(best.map_or(x, |b| b.min(x)));
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => Value::from(total),
            AccState::Avg { n: 0, .. } => Value::Null,
            AccState::Avg { total, n } => Value::from(total / n as f64),
            AccState::Count(n) => Value::from(n),
            AccState::Max(v) | AccState::Min(v) => v.map_or(Value::Null, Value::from),
        }
    }
}

fn group(docs: Vec<Value>, spec: &GroupSpec) -> Vec<Value> {
    // Groups keep first-seen order; a later sort stage decides the output order
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<AccState>)> = Vec::new();

    for doc in &docs {
        let key: Vec<Value> = spec.keys.iter().map(|k| doc[k.as_str()].clone()).collect();
        let key_str = Value::Array(key.clone()).to_string();

        let slot = *index.entry(key_str).or_insert_with(|| {
            let states = spec.accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect();
            groups.push((key, states));
            groups.len() - 1
        });

        let states = &mut groups[slot].1;
        for (state, (_, acc)) in states.iter_mut().zip(&spec.accumulators) {
            state.update(acc, doc);
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            for (name, value) in spec.keys.iter().zip(key) {
                out.insert(name.clone(), value);
            }
            for ((name, _), state) in spec.accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect()
}

fn project(doc: Value, fields: &[String]) -> Value {
    let mut map = match doc {
        Value::Object(map) => map,
        other => return other,
    };
    let kept: Map<String, Value> = fields
        .iter()
        .filter_map(|f| map.remove(f).map(|v| (f.clone(), v)))
        .collect();
    Value::Object(kept)
}

fn compare_by_keys(a: &Value, b: &Value, keys: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in keys {
        let ord = compare_values(&a[field.as_str()], &b[field.as_str()]);
        let ord = match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order over JSON values: null < bool < number < string < other
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
