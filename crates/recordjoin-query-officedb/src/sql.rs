//! SQL text generation for the office database dialects.

use recordjoin_query::QueryPart;
use std::fmt;

/// SQL dialect spoken by the database behind the office data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlSyntax {
    Ansi,
    Oracle,
    #[default]
    MySql,
    PervasiveSql,
}

impl SqlSyntax {
    /// Parse a `SQL_SYNTAX` value, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ansi" => Some(Self::Ansi),
            "oracle" => Some(Self::Oracle),
            "mysql" => Some(Self::MySql),
            "pervasivesql" => Some(Self::PervasiveSql),
            _ => None,
        }
    }

    fn lower_function(self) -> &'static str {
        match self {
            Self::MySql => "lcase",
            _ => "lower",
        }
    }

    /// Quote an identifier. PervasiveSQL knows no `DATABASE.TABLE` notation,
    /// so everything up to the first dot is removed there.
    pub fn identifier(self, name: &str) -> String {
        let name = match (self, name.find('.')) {
            (Self::PervasiveSql, Some(dot)) => &name[dot + 1..],
            _ => name,
        };
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    pub fn select_all(self, table: &str) -> String {
        format!("SELECT * FROM {};", self.identifier(table))
    }

    /// `SELECT` for rows whose columns equal the given values. Every inner
    /// list is one alternative; alternatives are OR-combined.
    pub fn select_equal(self, table: &str, alternatives: &[Vec<(String, String)>]) -> String {
        let conditions: Vec<String> = alternatives
            .iter()
            .map(|pairs| {
                let terms: Vec<String> = pairs
                    .iter()
                    .map(|(column, value)| format!("{}={}", self.identifier(column), literal(value)))
                    .collect();
                format!("({})", terms.join(" AND "))
            })
            .collect();
        format!(
            "SELECT * FROM {} WHERE {};",
            self.identifier(table),
            conditions.join(" OR ")
        )
    }

    /// Case-insensitive `LIKE` search, one condition per query part
    pub fn select_like(self, table: &str, query: &[QueryPart]) -> String {
        let conditions: Vec<String> = query
            .iter()
            .map(|part| {
                let column = format!("{}({})", self.lower_function(), self.identifier(&part.column));
                let pattern = literal(&search_pattern(&part.search));
                match self {
                    // only constants are allowed right of LIKE
                    Self::PervasiveSql => format!("({} LIKE {})", column, pattern.to_lowercase()),
                    _ => format!(
                        "({} LIKE {}({}) ESCAPE '|')",
                        column,
                        self.lower_function(),
                        pattern
                    ),
                }
            })
            .collect();
        format!(
            "SELECT * FROM {} WHERE {};",
            self.identifier(table),
            conditions.join(" AND ")
        )
    }
}

impl fmt::Display for SqlSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ansi => "ansi",
            Self::Oracle => "oracle",
            Self::MySql => "mysql",
            Self::PervasiveSql => "pervasivesql",
        };
        write!(f, "{}", name)
    }
}

/// Single-quoted string literal
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Turn a search string into a `LIKE` pattern with `|` as escape character
pub fn search_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 4);
    for c in search.chars() {
        match c {
            '|' => pattern.push_str("||"),
            '_' => pattern.push_str("|_"),
            '%' => pattern.push_str("|%"),
            '*' => pattern.push('%'),
            other => pattern.push(other),
        }
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_syntax() {
        assert_eq!(SqlSyntax::parse("MySQL"), Some(SqlSyntax::MySql));
        assert_eq!(SqlSyntax::parse("pervasivesql"), Some(SqlSyntax::PervasiveSql));
        assert_eq!(SqlSyntax::parse("db2"), None);
        assert_eq!(SqlSyntax::default().to_string(), "mysql");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(search_pattern("100%_a|b*"), "100|%|_a||b%");
        assert_eq!(literal("O'Neil"), "'O''Neil'");
        assert_eq!(SqlSyntax::Ansi.identifier("my \"table\""), "\"my \"\"table\"\"\"");
        assert_eq!(SqlSyntax::Ansi.identifier("db.Personen"), "\"db.Personen\"");
        assert_eq!(SqlSyntax::PervasiveSql.identifier("db.Personen"), "\"Personen\"");
    }

    #[test]
    fn test_select_like() {
        let query = [QueryPart::new("Nachname", "Coo*"), QueryPart::new("Vorname", "Sh'eldon")];
        assert_eq!(
            SqlSyntax::MySql.select_like("Personen", &query),
            "SELECT * FROM \"Personen\" WHERE (lcase(\"Nachname\") LIKE lcase('Coo%') ESCAPE '|') \
             AND (lcase(\"Vorname\") LIKE lcase('Sh''eldon') ESCAPE '|');"
        );
        assert_eq!(
            SqlSyntax::Oracle.select_like("Personen", &query[..1]),
            "SELECT * FROM \"Personen\" WHERE (lower(\"Nachname\") LIKE lower('Coo%') ESCAPE '|');"
        );
        assert_eq!(
            SqlSyntax::PervasiveSql.select_like("Personen", &query[..1]),
            "SELECT * FROM \"Personen\" WHERE (lower(\"Nachname\") LIKE 'coo%');"
        );
    }

    #[test]
    fn test_select_equal() {
        let alternatives = vec![
            vec![("id".to_string(), "1".to_string())],
            vec![("id".to_string(), "2".to_string()), ("Ort".to_string(), "Bonn".to_string())],
        ];
        assert_eq!(
            SqlSyntax::Ansi.select_equal("T", &alternatives),
            "SELECT * FROM \"T\" WHERE (\"id\"='1') OR (\"id\"='2' AND \"Ort\"='Bonn');"
        );
        assert_eq!(SqlSyntax::Ansi.select_all("T"), "SELECT * FROM \"T\";");
    }
}
