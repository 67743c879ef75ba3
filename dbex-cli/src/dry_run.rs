//! `--dry-run` rendering: shows the SQL a phase would run without opening
//! the target connection. Only phases whose SQL is fully
//! determined by the script set and parameter map can be rendered this way;
//! `Reset` and `Data` depend on a live introspected schema and are refused
//! here rather than faked.

use dbex_connector::dialect::Dialect;
use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::model::ScriptKind;
use dbex_connector::parameters::Parameters;
use dbex_sql::reconciler;
use dbex_sql::script_source::ScriptSource;
use dbex_sql::tokenizer;

pub struct RenderedScript {
    pub name: String,
    pub statements: Vec<String>,
}

fn split(dialect: &dyn Dialect, name: &str, sql: &str) -> DbExResult<Vec<String>> {
    if dialect.is_batch_separator_line("GO") {
        tokenizer::split_on_go(sql, name)
    } else {
        tokenizer::split_on_semicolons(sql, name, dialect.identifier_quote_chars())
    }
}

/// Pre-deploy → Migrate (by group order, name) → post-database-create →
/// post-deploy, the same fixed order the orchestrator's Migrate phase uses —
/// journal lookups are skipped, every discovered script is shown.
pub fn render_migrate(
    source: &ScriptSource,
    dialect: &dyn Dialect,
    params: &Parameters,
) -> DbExResult<Vec<RenderedScript>> {
    let mut scripts = source.discover()?;
    scripts.sort_by(|a, b| a.name.cmp(&b.name));

    let mut pre_deploy: Vec<_> = scripts.iter().filter(|s| s.kind == ScriptKind::PreDeploy).collect();
    let mut migrate: Vec<_> = scripts.iter().filter(|s| s.kind == ScriptKind::Migrate).collect();
    let mut post_create: Vec<_> =
        scripts.iter().filter(|s| s.kind == ScriptKind::PostDatabaseCreate).collect();
    let mut post_deploy: Vec<_> = scripts.iter().filter(|s| s.kind == ScriptKind::PostDeploy).collect();

    pre_deploy.sort_by(|a, b| a.name.cmp(&b.name));
    migrate.sort_by(|a, b| a.group_order.cmp(&b.group_order).then(a.name.cmp(&b.name)));
    post_create.sort_by(|a, b| a.name.cmp(&b.name));
    post_deploy.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = Vec::new();
    for script in pre_deploy.into_iter().chain(migrate).chain(post_create).chain(post_deploy) {
        let content = script.read().map_err(|e| {
            DbExError::ResourceNotFound(format!("{}: {e}", script.name))
        })?;
        let substituted = params.substitute_sql(&content);
        let statements = split(dialect, &script.name, &substituted)?;
        out.push(RenderedScript { name: script.name.clone(), statements });
    }
    Ok(out)
}

/// Drop-then-create order for every `Schema`-kind script, mirroring the
/// orchestrator's Schema phase.
pub fn render_schema(source: &ScriptSource, dialect: &dyn Dialect) -> DbExResult<Vec<RenderedScript>> {
    let scripts: Vec<_> = source.discover()?.into_iter().filter(|s| s.kind == ScriptKind::Schema).collect();
    let mut objects = Vec::with_capacity(scripts.len());
    for script in &scripts {
        let content = script.read().map_err(|e| {
            DbExError::ResourceNotFound(format!("{}: {e}", script.name))
        })?;
        objects.push(reconciler::parse_head(&script.name, &content, dialect)?);
    }

    let mut out = Vec::new();
    for idx in reconciler::drop_order(&objects, dialect) {
        out.push(RenderedScript {
            name: objects[idx].script_name.clone(),
            statements: vec![objects[idx].drop_statement(dialect)],
        });
    }
    for idx in reconciler::create_order(&objects, dialect) {
        out.push(RenderedScript {
            name: objects[idx].script_name.clone(),
            statements: vec![objects[idx].body.clone()],
        });
    }
    Ok(out)
}

pub fn render_execute(dialect: &dyn Dialect, params: &Parameters, sql: &str) -> DbExResult<RenderedScript> {
    let substituted = params.substitute_sql(sql);
    let statements = split(dialect, "<execute>", &substituted)?;
    Ok(RenderedScript { name: "<execute>".to_string(), statements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbex_sql::dialect::MssqlDialect;
    use dbex_sql::script_source::MemoryBundle;

    fn source() -> ScriptSource {
        let bundle = MemoryBundle::new()
            .with_file("Migrations/20200101-000000-a.sql", "CREATE TABLE T(Id INT);")
            .with_file("Migrations/20200102-000000-b.sql", "ALTER TABLE T ADD Name VARCHAR(50)")
            .with_file("bootstrap.pre.deploy.sql", "INSERT INTO Log VALUES ({{UserName}})")
            .with_file("bootstrap.post.deploy.sql", "UPDATE Log SET Done = 1");
        ScriptSource::new(vec![Box::new(bundle)])
    }

    #[test]
    fn renders_migrate_in_pre_then_migrate_then_post_order_with_params_substituted() {
        let dialect = MssqlDialect::default();
        let mut params = Parameters::new();
        params.set("UserName", "alice");
        let rendered = render_migrate(&source(), &dialect, &params).unwrap();
        let names: Vec<&str> = rendered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "bootstrap.pre.deploy.sql",
                "20200101-000000-a.sql",
                "20200102-000000-b.sql",
                "bootstrap.post.deploy.sql",
            ]
        );
        assert!(rendered[0].statements[0].contains("alice"));
    }

    #[test]
    fn renders_schema_drop_then_create() {
        let dialect = MssqlDialect::default();
        let bundle = MemoryBundle::new()
            .with_file("Schema/dbo/Views/A.sql", "CREATE VIEW dbo.A AS SELECT 1")
            .with_file("Schema/dbo/Views/B.sql", "CREATE VIEW dbo.B AS SELECT 1");
        let source = ScriptSource::new(vec![Box::new(bundle)]);
        let rendered = render_schema(&source, &dialect).unwrap();
        assert_eq!(rendered.len(), 4);
        assert!(rendered[0].statements[0].starts_with("DROP VIEW IF EXISTS"));
        assert!(rendered[2].statements[0].starts_with("CREATE VIEW"));
    }

    #[test]
    fn renders_execute_with_param_substitution_and_go_splitting() {
        let dialect = MssqlDialect::default();
        let mut params = Parameters::new();
        params.set("DatabaseName", "widgets");
        let rendered = render_execute(&dialect, &params, "USE {{DatabaseName}}\nGO\nSELECT 1").unwrap();
        assert_eq!(rendered.statements.len(), 2);
        assert!(rendered.statements[0].contains("widgets"));
    }
}
