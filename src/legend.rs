//! Matching output columns back to the measure configs that produced them.
//!
//! Column names come in several shapes depending on the path that produced them: the bare
//! field, `AGG(field)` when a field is configured twice, `field_AGG` from remote aggregation,
//! or an alias typed by the user. Each measure generates weighted candidate strings and the
//! column is assigned to the best-scoring measure.
//!
//! Known fragility: two measures on the same field that differ only by aggregation produce
//! near-identical candidates. When scores tie, the first measure wins.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::model::{Aggregation, MeasureConfig};

fn wrapped_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_]+)\((.+)\)$").ok())
        .as_ref()
}

/// Split `AGG(field)` into its parts.
pub fn parse_wrapped(column: &str) -> Option<(Aggregation, String)> {
    let caps = wrapped_pattern()?.captures(column)?;
    let agg = Aggregation::from_token(caps.get(1)?.as_str())?;
    Some((agg, caps.get(2)?.as_str().to_string()))
}

/// Split `field_AGG` into its parts. The token must be a known upper-case aggregation; the
/// first underscore that leaves one wins (`unit_price_SUM` is `unit_price`).
pub fn parse_suffixed(column: &str) -> Option<(Aggregation, String)> {
    let mut search_from = 0;
    while let Some(pos) = column[search_from..].find('_') {
        let split = search_from + pos;
        let (field, token) = (&column[..split], &column[split + 1..]);
        if !field.is_empty() {
            if let Some(agg) = Aggregation::from_token(token) {
                if token.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                    return Some((agg, field.to_string()));
                }
            }
        }
        search_from = split + 1;
    }
    None
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Weighted candidate strings for a measure.
pub fn candidates(measure: &MeasureConfig) -> Vec<(String, u32)> {
    let agg = measure.aggregation.as_str();
    let mut out = Vec::new();
    if let Some(alias) = measure.alias.as_deref().filter(|a| !a.is_empty()) {
        out.push((alias.to_string(), 100));
    }
    out.push((measure.field.clone(), 90));
    out.push((format!("{}({})", agg, measure.field), 85));
    out.push((format!("{}_{}", measure.field, agg), 80));
    out.push((format!("{} of {}", agg.to_lowercase(), measure.field), 70));
    out
}

fn score(column: &str, candidate: &str, weight: u32) -> u32 {
    if column == candidate {
        return weight + 200;
    }
    if column.eq_ignore_ascii_case(candidate) {
        return weight + 100;
    }
    let (nc, nk) = (normalize(column), normalize(candidate));
    if nk.is_empty() {
        return 0;
    }
    if nc == nk {
        return weight + 50;
    }
    if nk.len() >= 3 && nc.contains(&nk) {
        return weight / 2 + nk.len() as u32;
    }
    0
}

/// Index of the measure that best explains `column`, if any scores above zero.
pub fn match_measure(column: &str, measures: &[MeasureConfig]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, m) in measures.iter().enumerate() {
        let s = candidates(m)
            .iter()
            .map(|(c, w)| score(column, c, *w))
            .max()
            .unwrap_or(0);
        if s > 0 && best.map_or(true, |(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// Display label for each column: the matched measure's alias, else the column itself.
pub fn display_labels(columns: &[String], measures: &[MeasureConfig]) -> BTreeMap<String, String> {
    columns
        .iter()
        .map(|c| {
            let label = match_measure(c, measures)
                .and_then(|i| measures[i].alias.clone())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| c.clone());
            (c.clone(), label)
        })
        .collect()
}
