//! Relational query adapter (§4.9): translate a parsed SPARQL-like AST to
//! SQL via an external translator, run it against a relational engine, and
//! stream back stringified rows with provenance ids attached by following
//! the translator's side map.
//!
//! `SparqlTranslator` and `RelationalEngine` are the external-collaborator
//! boundary (§1): this module owns the adapter glue, not their internals.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelationalError {
    #[error("translate: {0}")]
    Translate(String),
    #[error("engine: {0}")]
    Engine(String),
}

pub type RelationalResult<T> = Result<T, RelationalError>;

/// A bound term (IRI/literal) or a free variable in a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Variable(String),
    Bound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlTriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparqlOptions {
    pub limit: Option<usize>,
    pub distinct: bool,
    pub order_by: Vec<String>,
}

/// The parsed SPARQL-like AST the adapter consumes (§4.9): nodes, query
/// triples, and options. Produced from raw SPARQL text by [`parse_sparql`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparqlAst {
    pub select_vars: Vec<String>,
    pub triples: Vec<SparqlTriplePattern>,
    pub options: SparqlOptions,
}

/// Parse raw SPARQL text into the adapter's AST shape. Only the basic
/// graph-pattern subset (no OPTIONAL/UNION/FILTER) is supported; anything
/// else surfaces as a translate-stage `INVALID-ARGUMENT`.
pub fn parse_sparql(sparql: &str) -> RelationalResult<SparqlAst> {
    let query = spargebra::Query::parse(sparql, None)
        .map_err(|e| RelationalError::Translate(e.to_string()))?;

    let spargebra::Query::Select { pattern, .. } = query else {
        return Err(RelationalError::Translate(
            "only SELECT queries are supported".to_string(),
        ));
    };

    let mut options = SparqlOptions::default();
    let mut select_vars = Vec::new();
    let bgp = unwrap_pattern(&pattern, &mut options, &mut select_vars)?;

    let triples = match bgp {
        spargebra::algebra::GraphPattern::Bgp { patterns } => patterns
            .iter()
            .map(|tp| SparqlTriplePattern {
                subject: term_pattern_to_term(&tp.subject),
                predicate: named_node_pattern_to_term(&tp.predicate),
                object: term_pattern_to_term(&tp.object),
            })
            .collect(),
        other => {
            return Err(RelationalError::Translate(format!(
                "unsupported graph pattern: {other:?}"
            )))
        }
    };

    Ok(SparqlAst {
        select_vars,
        triples,
        options,
    })
}

fn unwrap_pattern<'a>(
    pattern: &'a spargebra::algebra::GraphPattern,
    options: &mut SparqlOptions,
    select_vars: &mut Vec<String>,
) -> RelationalResult<&'a spargebra::algebra::GraphPattern> {
    use spargebra::algebra::GraphPattern;
    match pattern {
        GraphPattern::Distinct { inner } => {
            options.distinct = true;
            unwrap_pattern(inner, options, select_vars)
        }
        GraphPattern::Slice { inner, length, .. } => {
            if let Some(len) = length {
                options.limit = Some(*len);
            }
            unwrap_pattern(inner, options, select_vars)
        }
        GraphPattern::OrderBy { inner, expression } => {
            for e in expression {
                options.order_by.push(format!("{e:?}"));
            }
            unwrap_pattern(inner, options, select_vars)
        }
        GraphPattern::Project { inner, variables } => {
            select_vars.extend(variables.iter().map(|v| v.as_str().to_string()));
            unwrap_pattern(inner, options, select_vars)
        }
        other => Ok(other),
    }
}

fn term_pattern_to_term(t: &spargebra::term::TermPattern) -> Term {
    use spargebra::term::TermPattern;
    match t {
        TermPattern::Variable(v) => Term::Variable(v.as_str().to_string()),
        TermPattern::NamedNode(n) => Term::Bound(n.as_str().to_string()),
        TermPattern::Literal(l) => Term::Bound(l.value().to_string()),
        TermPattern::BlankNode(b) => Term::Bound(b.as_str().to_string()),
        #[allow(unreachable_patterns)]
        _ => Term::Bound(String::new()),
    }
}

fn named_node_pattern_to_term(p: &spargebra::algebra::NamedNodePattern) -> Term {
    use spargebra::algebra::NamedNodePattern;
    match p {
        NamedNodePattern::NamedNode(n) => Term::Bound(n.as_str().to_string()),
        NamedNodePattern::Variable(v) => Term::Variable(v.as_str().to_string()),
    }
}

/// Per-deployment table/column naming, handed to the translator alongside
/// the AST (§4.9 "schema mappings").
#[derive(Debug, Clone, Default)]
pub struct SchemaMapping {
    pub triples_table: String,
    pub column_for_predicate: HashMap<String, String>,
}

/// Output of translation: the SQL to run, a result-column -> output-alias
/// map, and a side map from output column to the column carrying that
/// cell's provenance id.
#[derive(Debug, Clone, Default)]
pub struct TranslatedQuery {
    pub sql: String,
    pub column_aliases: HashMap<String, String>,
    pub provenance_columns: HashMap<String, String>,
}

/// External collaborator boundary: turns a parsed AST plus schema mapping
/// into SQL. Implementations live outside this crate; this trait is the
/// seam the adapter calls through.
pub trait SparqlTranslator: Send + Sync {
    fn translate(&self, ast: &SparqlAst, schema: &SchemaMapping) -> RelationalResult<TranslatedQuery>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int64(i64),
    Float64(f64),
    Str(String),
    Null,
}

impl Cell {
    pub fn stringify(&self) -> String {
        match self {
            Cell::Int64(v) => v.to_string(),
            Cell::Float64(v) => v.to_string(),
            Cell::Str(v) => v.clone(),
            Cell::Null => String::new(),
        }
    }
}

pub type RelationalRow = HashMap<String, Cell>;

/// External collaborator boundary: streams rows for an already-translated
/// query from the backing relational engine (BigQuery, a local SQLite
/// mirror, whatever the deployment wires in).
#[async_trait]
pub trait RelationalEngine: Send + Sync {
    async fn stream_rows(&self, sql: &str) -> RelationalResult<Vec<RelationalRow>>;
}

/// One output row: ordered stringified cells plus, per cell, the
/// provenance id attached by following the side map (§4.9).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRow {
    pub cells: Vec<String>,
    pub provenance_ids: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct SparqlQueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<OutputRow>,
}

pub struct RelationalQueryAdapter {
    translator: Arc<dyn SparqlTranslator>,
    engine: Arc<dyn RelationalEngine>,
}

impl RelationalQueryAdapter {
    pub fn new(translator: Arc<dyn SparqlTranslator>, engine: Arc<dyn RelationalEngine>) -> Self {
        Self { translator, engine }
    }

    /// Translate, run, and assemble the output (§4.9). Translator errors
    /// map to `INVALID_ARGUMENT`, engine errors to `INTERNAL` by the
    /// `From<RelationalError> for MixerError` impl the caller applies.
    pub async fn execute(&self, ast: &SparqlAst, schema: &SchemaMapping) -> RelationalResult<SparqlQueryResult> {
        let translated = self.translator.translate(ast, schema)?;
        let rows = self.engine.stream_rows(&translated.sql).await?;
        let columns: Vec<String> = translated.column_aliases.values().cloned().collect();
        let assembled = rows
            .iter()
            .map(|row| assemble_row(row, &translated, &columns))
            .collect();
        Ok(SparqlQueryResult {
            columns,
            rows: assembled,
        })
    }
}

fn assemble_row(row: &RelationalRow, translated: &TranslatedQuery, columns: &[String]) -> OutputRow {
    let mut cells = Vec::with_capacity(columns.len());
    let mut provenance_ids = Vec::with_capacity(columns.len());
    for output_col in columns {
        let source_col = translated
            .column_aliases
            .iter()
            .find(|(_, alias)| *alias == output_col)
            .map(|(col, _)| col.as_str())
            .unwrap_or(output_col.as_str());
        let cell = row.get(source_col).cloned().unwrap_or(Cell::Null);
        cells.push(cell.stringify());

        let provenance = translated
            .provenance_columns
            .get(source_col)
            .and_then(|prov_col| row.get(prov_col))
            .map(|c| c.stringify());
        provenance_ids.push(provenance);
    }
    OutputRow {
        cells,
        provenance_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let ast = parse_sparql("SELECT ?name WHERE { ?place <name> ?name }").unwrap();
        assert_eq!(ast.select_vars, vec!["name".to_string()]);
        assert_eq!(ast.triples.len(), 1);
        assert_eq!(ast.triples[0].subject, Term::Variable("place".to_string()));
        assert_eq!(ast.triples[0].predicate, Term::Bound("name".to_string()));
    }

    #[test]
    fn parses_limit_and_distinct() {
        let ast = parse_sparql("SELECT DISTINCT ?p WHERE { ?p <name> ?n } LIMIT 10").unwrap();
        assert!(ast.options.distinct);
        assert_eq!(ast.options.limit, Some(10));
    }

    #[test]
    fn rejects_non_select_query() {
        let err = parse_sparql("ASK { ?s ?p ?o }").unwrap_err();
        assert!(matches!(err, RelationalError::Translate(_)));
    }

    struct FakeTranslator;
    impl SparqlTranslator for FakeTranslator {
        fn translate(&self, _ast: &SparqlAst, _schema: &SchemaMapping) -> RelationalResult<TranslatedQuery> {
            let mut column_aliases = HashMap::new();
            column_aliases.insert("t.name".to_string(), "name".to_string());
            let mut provenance_columns = HashMap::new();
            provenance_columns.insert("t.name".to_string(), "t.prov".to_string());
            Ok(TranslatedQuery {
                sql: "SELECT t.name, t.prov FROM triples t".to_string(),
                column_aliases,
                provenance_columns,
            })
        }
    }

    struct FakeEngine;
    #[async_trait]
    impl RelationalEngine for FakeEngine {
        async fn stream_rows(&self, _sql: &str) -> RelationalResult<Vec<RelationalRow>> {
            let mut row = HashMap::new();
            row.insert("t.name".to_string(), Cell::Str("California".to_string()));
            row.insert("t.prov".to_string(), Cell::Str("dc/p/1".to_string()));
            Ok(vec![row])
        }
    }

    #[tokio::test]
    async fn adapter_attaches_provenance_via_side_map() {
        let adapter = RelationalQueryAdapter::new(Arc::new(FakeTranslator), Arc::new(FakeEngine));
        let ast = SparqlAst::default();
        let schema = SchemaMapping::default();
        let result = adapter.execute(&ast, &schema).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].cells[0], "California");
        assert_eq!(result.rows[0].provenance_ids[0], Some("dc/p/1".to_string()));
    }

    struct FailingEngine;
    #[async_trait]
    impl RelationalEngine for FailingEngine {
        async fn stream_rows(&self, _sql: &str) -> RelationalResult<Vec<RelationalRow>> {
            Err(RelationalError::Engine("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn engine_errors_propagate_as_engine_variant() {
        let adapter = RelationalQueryAdapter::new(Arc::new(FakeTranslator), Arc::new(FailingEngine));
        let err = adapter
            .execute(&SparqlAst::default(), &SchemaMapping::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelationalError::Engine(_)));
    }
}
