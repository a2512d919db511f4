//! SQL parsing using datafusion-sqlparser-rs
//!
//! Parses SQL text into the AST the decomposer works on.

use cte2dbt_core::DialectConfig;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::{Parser, ParserError};
use std::path::{Path, PathBuf};

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a new SQL parser with the default (generic) dialect
    pub fn new() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a parser from a dialect config
    pub fn from_dialect(dialect: DialectConfig) -> Self {
        let dialect: Box<dyn Dialect> = match dialect {
            DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
            DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
            DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
            DialectConfig::DuckDb => Box::new(DuckDbDialect {}),
            DialectConfig::Ansi => Box::new(GenericDialect {}),
        };
        Self { dialect }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str, file_path: Option<&Path>) -> Result<ParsedSql, ParseError> {
        match Parser::parse_sql(&*self.dialect, sql) {
            Ok(statements) => Ok(ParsedSql {
                sql: sql.to_string(),
                statements,
                file_path: file_path.map(Path::to_path_buf),
            }),
            Err(error) => Err(ParseError {
                sql: sql.to_string(),
                error,
                file_path: file_path.map(Path::to_path_buf),
            }),
        }
    }

    /// Parse SQL that must contain exactly one query
    pub fn parse_query(&self, sql: &str, file_path: Option<&Path>) -> Result<Query, ParseError> {
        let parsed = self.parse(sql, file_path)?;

        if parsed.statement_count() != 1 {
            return Err(ParseError {
                sql: sql.to_string(),
                error: ParserError::ParserError(format!(
                    "Expected exactly one statement, found {}",
                    parsed.statement_count()
                )),
                file_path: parsed.file_path,
            });
        }

        match parsed.statements.into_iter().next() {
            Some(Statement::Query(query)) => Ok(*query),
            _ => Err(ParseError {
                sql: sql.to_string(),
                error: ParserError::ParserError("Expected a SELECT query".to_string()),
                file_path: parsed.file_path,
            }),
        }
    }

    /// Parse the single query held in a file
    pub fn parse_query_file(&self, path: &Path) -> Result<Query, ParseError> {
        let sql = std::fs::read_to_string(path).map_err(|e| ParseError {
            sql: String::new(),
            error: ParserError::ParserError(format!("Failed to read file: {}", e)),
            file_path: Some(path.to_path_buf()),
        })?;

        self.parse_query(&sql, Some(path))
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// Parsed statements
    pub statements: Vec<Statement>,

    /// Source file path (if parsed from file)
    pub file_path: Option<PathBuf>,
}

impl ParsedSql {
    /// Get the first statement
    pub fn first_statement(&self) -> Option<&Statement> {
        self.statements.first()
    }

    /// Get the query if the first statement is a SELECT
    pub fn as_query(&self) -> Option<&Query> {
        match self.first_statement() {
            Some(Statement::Query(query)) => Some(query.as_ref()),
            _ => None,
        }
    }

    /// Count the number of statements
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }
}

/// SQL parsing error
#[derive(Debug)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,

    /// Source file path
    pub file_path: Option<PathBuf>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file_path {
            Some(path) => write!(f, "SQL parse error in {}: {}", path.display(), self.error),
            None => write!(f, "SQL parse error: {}", self.error),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::new();
        let parsed = parser.parse("SELECT id, name FROM users WHERE active = true", None).unwrap();

        assert_eq!(parsed.statement_count(), 1);
        assert!(parsed.as_query().is_some());
    }

    #[test]
    fn parse_query_with_cte() {
        let parser = SqlParser::new();
        let sql = r#"
            WITH active_users AS (
                SELECT * FROM users WHERE active = true
            )
            SELECT id, name FROM active_users
        "#;

        let query = parser.parse_query(sql, None).unwrap();
        let with = query.with.expect("query should keep its WITH-clause");
        assert_eq!(with.cte_tables.len(), 1);
        assert_eq!(with.cte_tables[0].alias.name.value, "active_users");
    }

    #[test]
    fn parse_invalid_sql() {
        let parser = SqlParser::new();
        let error = parser.parse("SELECT FROM WHERE", None).unwrap_err();

        assert!(error.to_string().starts_with("SQL parse error"));
    }

    #[test]
    fn parse_query_rejects_non_queries() {
        let parser = SqlParser::new();

        assert!(parser.parse_query("CREATE TABLE t (id INT)", None).is_err());
        assert!(parser.parse_query("SELECT 1; SELECT 2", None).is_err());
    }

    #[test]
    fn dbt_templates_do_not_parse() {
        // Rewritten models contain raw Jinja and are not SQL anymore
        let parser = SqlParser::new();
        assert!(parser.parse("SELECT * FROM {{ ref('users') }}", None).is_err());
    }

    #[test]
    fn different_dialects() {
        let sql = "SELECT id FROM users";

        for dialect in [
            DialectConfig::Ansi,
            DialectConfig::BigQuery,
            DialectConfig::Postgres,
            DialectConfig::Snowflake,
            DialectConfig::DuckDb,
        ] {
            assert!(SqlParser::from_dialect(dialect).parse_query(sql, None).is_ok());
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let parser = SqlParser::new();
        let error = parser
            .parse_query_file(Path::new("does/not/exist.sql"))
            .unwrap_err();

        assert_eq!(error.file_path.as_deref(), Some(Path::new("does/not/exist.sql")));
    }
}
