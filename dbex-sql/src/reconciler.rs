//! Schema-Object Reconciler.
//!
//! Parses each idempotent script's `CREATE` head to discover
//! `(type, schema, name)`, then computes a total order used both ways:
//! forward for `CREATE`, reversed for `DROP IF EXISTS` — schema drops run
//! in reverse of creates.

use dbex_connector::dialect::{CreateObjectType, Dialect};
use dbex_connector::error::{DbExError, DbExResult};

use crate::tokenizer::{self, Token};

/// A schema object discovered by parsing one `Schema`-kind script's head.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub script_name: String,
    pub object_type: CreateObjectType,
    pub schema: String,
    pub name: String,
    pub body: String,
}

impl SchemaObject {
    pub fn qualified_name(&self, dialect: &dyn Dialect) -> String {
        dialect.quote_qualified(&self.schema, &self.name)
    }

    pub fn drop_statement(&self, dialect: &dyn Dialect) -> String {
        format!(
            "DROP {} IF EXISTS {}",
            self.object_type.keyword(),
            self.qualified_name(dialect)
        )
    }
}

/// Parse a single script's head: find the first `CREATE` (optionally
/// `CREATE OR REPLACE`/`CREATE OR ALTER`), then the type and qualified
/// name tokens that follow.
pub fn parse_head(script_name: &str, sql: &str, dialect: &dyn Dialect) -> DbExResult<SchemaObject> {
    let tokens = tokenizer::tokenize(sql, script_name, dialect.identifier_quote_chars())?;
    let mut i = 0usize;

    let word_at = |i: usize| -> Option<&str> {
        match tokens.get(i) {
            Some(Token::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    };

    if !word_at(i).is_some_and(|w| w.eq_ignore_ascii_case("CREATE")) {
        return Err(DbExError::NotACreateStatement {
            script: script_name.to_string(),
        });
    }
    i += 1;

    if word_at(i).is_some_and(|w| w.eq_ignore_ascii_case("OR")) {
        let next_is_replace_or_alter = word_at(i + 1).is_some_and(|w| w.eq_ignore_ascii_case("REPLACE") || w.eq_ignore_ascii_case("ALTER"));
        if !next_is_replace_or_alter || !dialect.supports_create_or_replace() {
            return Err(DbExError::NotACreateStatement {
                script: script_name.to_string(),
            });
        }
        i += 2;
    }

    let type_word = word_at(i).ok_or_else(|| DbExError::NotACreateStatement {
        script: script_name.to_string(),
    })?;
    let object_type = CreateObjectType::parse(type_word).ok_or_else(|| DbExError::UnsupportedObjectType {
        script: script_name.to_string(),
        object_type: type_word.to_string(),
    })?;
    if !dialect.supported_object_types().contains(&object_type) {
        return Err(DbExError::UnsupportedObjectType {
            script: script_name.to_string(),
            object_type: type_word.to_string(),
        });
    }
    i += 1;

    let first_ident = ident_at(&tokens, i).ok_or_else(|| DbExError::NotACreateStatement {
        script: script_name.to_string(),
    })?;
    i += 1;

    let (schema, name) = if matches!(tokens.get(i), Some(Token::Dot)) {
        let second_ident = ident_at(&tokens, i + 1).ok_or_else(|| DbExError::NotACreateStatement {
            script: script_name.to_string(),
        })?;
        (first_ident, second_ident)
    } else {
        (dialect.config().default_schema.clone(), first_ident)
    };

    Ok(SchemaObject {
        script_name: script_name.to_string(),
        object_type,
        schema,
        name,
        body: sql.to_string(),
    })
}

fn ident_at(tokens: &[Token], i: usize) -> Option<String> {
    match tokens.get(i) {
        Some(Token::Word(w)) => Some(w.clone()),
        Some(Token::QuotedIdent(q)) => Some(q.clone()),
        _ => None,
    }
}

/// Tiered schema precedence: names in `schema_order` rank by position; the
/// default schema (when supported) ranks next; everything else is
/// lexicographic.
fn schema_rank(schema: &str, dialect: &dyn Dialect) -> (u8, usize, String) {
    let cfg = dialect.config();
    if let Some(pos) = cfg.schema_order.iter().position(|s| s.eq_ignore_ascii_case(schema)) {
        return (0, pos, String::new());
    }
    if cfg.supports_default_schema && schema.eq_ignore_ascii_case(&cfg.default_schema) {
        return (1, 0, String::new());
    }
    (2, 0, schema.to_ascii_lowercase())
}

fn full_rank(obj: &SchemaObject, dialect: &dyn Dialect) -> (u8, usize, String, usize, String) {
    let (tier, pos, fallback) = schema_rank(&obj.schema, dialect);
    (tier, pos, fallback, dialect.object_type_precedence(obj.object_type), obj.name.to_ascii_lowercase())
}

/// Indices into `objects`, ascending in `CREATE` order.
pub fn create_order(objects: &[SchemaObject], dialect: &dyn Dialect) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..objects.len()).collect();
    idx.sort_by(|&a, &b| full_rank(&objects[a], dialect).cmp(&full_rank(&objects[b], dialect)));
    idx
}

/// The reverse of [`create_order`]: schema drops run in reverse of
/// creates.
pub fn drop_order(objects: &[SchemaObject], dialect: &dyn Dialect) -> Vec<usize> {
    let mut order = create_order(objects, dialect);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MssqlDialect;

    #[test]
    fn parses_qualified_create_head() {
        let dialect = MssqlDialect::default();
        let obj = parse_head("v.sql", "CREATE VIEW [dbo].[MyView] AS SELECT 1", &dialect).unwrap();
        assert_eq!(obj.object_type, CreateObjectType::View);
        assert_eq!(obj.schema, "dbo");
        assert_eq!(obj.name, "MyView");
    }

    #[test]
    fn parses_create_or_alter() {
        let dialect = MssqlDialect::default();
        let obj = parse_head("p.sql", "CREATE OR ALTER PROCEDURE dbo.DoThing AS BEGIN SELECT 1 END", &dialect).unwrap();
        assert_eq!(obj.object_type, CreateObjectType::Procedure);
    }

    #[test]
    fn unqualified_name_uses_default_schema() {
        let dialect = MssqlDialect::default();
        let obj = parse_head("f.sql", "CREATE FUNCTION MyFunc() RETURNS INT AS BEGIN RETURN 1 END", &dialect).unwrap();
        assert_eq!(obj.schema, "dbo");
        assert_eq!(obj.name, "MyFunc");
    }

    #[test]
    fn non_create_head_is_rejected() {
        let dialect = MssqlDialect::default();
        let err = parse_head("x.sql", "ALTER VIEW dbo.X AS SELECT 1", &dialect).unwrap_err();
        assert!(matches!(err, DbExError::NotACreateStatement { .. }));
    }

    #[test]
    fn unsupported_object_type_is_rejected() {
        let dialect = MssqlDialect::default();
        let err = parse_head("x.sql", "CREATE TABLE dbo.X (Id INT)", &dialect).unwrap_err();
        assert!(matches!(err, DbExError::UnsupportedObjectType { .. }));
    }

    #[test]
    fn create_order_follows_type_then_name_precedence() {
        let dialect = MssqlDialect::default();
        let objects = vec![
            parse_head("b.sql", "CREATE PROCEDURE dbo.B AS BEGIN SELECT 1 END", &dialect).unwrap(),
            parse_head("a.sql", "CREATE VIEW dbo.A AS SELECT 1", &dialect).unwrap(),
            parse_head("c.sql", "CREATE TYPE dbo.C FROM INT", &dialect).unwrap(),
        ];
        let order = create_order(&objects, &dialect);
        let names: Vec<&str> = order.iter().map(|&i| objects[i].name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_eq!(drop_order(&objects, &dialect), {
            let mut o = create_order(&objects, &dialect);
            o.reverse();
            o
        });
    }
}
