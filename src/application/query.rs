//! Candidate property paths and the combined pattern query built from them.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use thiserror::Error;

use crate::application::store::{QueryRow, StoreError};
use crate::domain::types::{ResourceId, Term};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("candidate property list is empty")]
    EmptyCandidateList,
    #[error("candidate property #{index} is empty")]
    EmptyPattern { index: usize },
    #[error("property path `{pattern}` contains an empty step")]
    EmptyStep { pattern: String },
    #[error("property path `{pattern}` is invalid: {reason}")]
    InvalidPath { pattern: String, reason: String },
}

impl QueryError {
    fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    fn empty_step(pattern: &str) -> Self {
        Self::EmptyStep {
            pattern: pattern.to_string(),
        }
    }
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyStep {
    pub iri: String,
    /// Follow the property from object to subject.
    pub inverse: bool,
}

impl fmt::Display for PropertyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverse {
            f.write_char('^')?;
        }
        write!(f, "<{}>", self.iri)
    }
}

/// Sequence of property steps, e.g. `^<urn:p>/<urn:q>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    steps: Vec<PropertyStep>,
}

impl PropertyPath {
    pub fn steps(&self) -> &[PropertyStep] {
        &self.steps
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, step) in self.steps.iter().enumerate() {
            if position > 0 {
                f.write_char('/')?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

fn split_inverse(step: &str) -> (bool, &str) {
    match step.strip_prefix('^') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, step),
    }
}

fn check_iri<'a>(pattern: &str, iri: &'a str) -> Result<&'a str, QueryError> {
    if iri.is_empty() {
        return Err(QueryError::empty_step(pattern));
    }
    if iri
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}'))
    {
        return Err(QueryError::invalid(pattern, "IRI contains a forbidden character"));
    }
    Ok(iri)
}

impl FromStr for PropertyPath {
    type Err = QueryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let pattern = raw.trim();
        if pattern.is_empty() {
            return Err(QueryError::empty_step(raw));
        }

        if !pattern.contains('<') {
            let (inverse, iri) = split_inverse(pattern);
            let iri = check_iri(pattern, iri)?;
            return Ok(Self {
                steps: vec![PropertyStep {
                    iri: iri.to_string(),
                    inverse,
                }],
            });
        }

        let mut steps = Vec::new();
        let mut rest = pattern;
        loop {
            if rest.is_empty() || rest.starts_with('/') {
                return Err(QueryError::empty_step(pattern));
            }
            let (inverse, body) = split_inverse(rest);
            let Some(body) = body.strip_prefix('<') else {
                return Err(QueryError::invalid(pattern, "expected `<` to open a step"));
            };
            let Some(end) = body.find('>') else {
                return Err(QueryError::invalid(pattern, "unterminated `<`"));
            };
            let iri = check_iri(pattern, body[..end].trim())?;
            steps.push(PropertyStep {
                iri: iri.to_string(),
                inverse,
            });

            rest = body[end + 1..].trim_start();
            if rest.is_empty() {
                break;
            }
            let Some(next) = rest.strip_prefix('/') else {
                return Err(QueryError::invalid(pattern, "steps must be separated by `/`"));
            };
            rest = next.trim_start();
        }

        Ok(Self { steps })
    }
}

/// Ordered candidate properties; the position is the source priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateProperties(Vec<PropertyPath>);

impl CandidateProperties {
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self, QueryError> {
        if patterns.is_empty() {
            return Err(QueryError::EmptyCandidateList);
        }
        let mut paths = Vec::with_capacity(patterns.len());
        for (index, pattern) in patterns.iter().enumerate() {
            let pattern = pattern.as_ref();
            if pattern.trim().is_empty() {
                return Err(QueryError::EmptyPattern { index });
            }
            paths.push(pattern.parse()?);
        }
        Ok(Self(paths))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> &[PropertyPath] {
        &self.0
    }
}

/// One combined query: a branch per candidate property, constrained to a set
/// of resources.
#[derive(Debug, Clone)]
pub struct PatternQuery {
    resources: Vec<ResourceId>,
    properties: CandidateProperties,
    text: String,
}

impl PatternQuery {
    pub fn build<S: AsRef<str>>(
        patterns: &[S],
        resources: Vec<ResourceId>,
    ) -> Result<Self, QueryError> {
        let properties = CandidateProperties::parse(patterns)?;
        Ok(Self::from_candidates(properties, resources))
    }

    pub fn from_candidates(properties: CandidateProperties, resources: Vec<ResourceId>) -> Self {
        let text = render(&properties, &resources);
        Self {
            resources,
            properties,
            text,
        }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn branches(&self) -> &[PropertyPath] {
        self.properties.paths()
    }

    pub fn branch_count(&self) -> usize {
        self.properties.len()
    }

    /// Query text in SPARQL form.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Groups rows per resource, flattened property-major.
    ///
    /// Within one property the store order is kept. Rows whose value is
    /// rejected by `extract` are skipped.
    pub fn collect_matches<T>(
        &self,
        rows: Vec<QueryRow>,
        mut extract: impl FnMut(Term) -> Option<T>,
    ) -> Result<HashMap<ResourceId, Vec<T>>, StoreError> {
        let branches = self.branch_count();
        let mut grouped: HashMap<ResourceId, Vec<Vec<T>>> = HashMap::new();

        for row in rows {
            if row.property_index >= branches {
                return Err(StoreError::malformed(format!(
                    "property index {} out of range for {} candidates",
                    row.property_index, branches
                )));
            }
            let Some(value) = extract(row.value) else {
                continue;
            };
            let per_property = grouped
                .entry(row.resource)
                .or_insert_with(|| (0..branches).map(|_| Vec::new()).collect());
            per_property[row.property_index].push(value);
        }

        Ok(grouped
            .into_iter()
            .map(|(resource, per_property)| {
                (resource, per_property.into_iter().flatten().collect())
            })
            .collect())
    }
}

fn render(properties: &CandidateProperties, resources: &[ResourceId]) -> String {
    let values: Vec<String> = resources.iter().map(|resource| format!("<{resource}>")).collect();
    let branches: Vec<String> = properties
        .paths()
        .iter()
        .enumerate()
        .map(|(index, path)| format!("  {{ ?resource {path} ?value . BIND({index} AS ?index) }}\n"))
        .collect();

    format!(
        "SELECT ?resource ?index ?value WHERE {{\n  VALUES ?resource {{ {} }}\n{}}}",
        values.join(" "),
        branches.join("  UNION\n")
    )
}
