//! Data Parser.
//!
//! Consumes a YAML or JSON document of fixed shape — `<schema or "*">` at
//! the top, each value a list of single-key `<prefix><table>: [rows]`
//! mappings — and produces an ordered list of [`DataTable`]s ready for SQL
//! emission. JSON is accepted via the same `serde_yaml::Value` front end
//! (JSON is a YAML-compatible subset); this also gives us YAML's
//! plain-scalar rules, under which an unquoted `08` stays a string instead
//! of silently becoming a number, distinguishing `0n` strings from numeric
//! literals.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dbex_connector::dialect::Dialect;
use dbex_connector::error::{DbExError, DbExResult};
use dbex_connector::model::{
    ColumnSchema, DataColumn, DataConfig, DataRow, DataTable, DataValue, DotNetType, TableSchema,
};
use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;
use uuid::Uuid;

/// A callable registered by the embedder for `^(expr)` resolution beyond
/// the well-known names and the runtime-parameters map: the extension-
/// function registry.
pub type ExtensionFn = Arc<dyn Fn() -> DbExResult<String> + Send + Sync>;

/// A previously-introspected catalog, queried by the parser to resolve
/// `parsed(schema, name) → physical TableSchema`.
pub struct SchemaCatalog<'a> {
    tables: &'a [TableSchema],
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(tables: &'a [TableSchema]) -> Self {
        Self { tables }
    }

    pub fn find(&self, schema: &str, name: &str) -> Option<&'a TableSchema> {
        self.tables
            .iter()
            .find(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    }
}

/// Per-(schema, table, column) default value, resolved most-specific-first:
/// exact → any-table (schema set, table `None`) → any-schema.
#[derive(Debug, Clone)]
pub struct DefaultRule {
    pub schema: Option<String>,
    pub table: Option<String>,
    pub column: String,
    pub value: DataValue,
}

impl DefaultRule {
    fn applies_to(&self, schema: &str, table: &str) -> bool {
        self.schema.as_deref().map(|s| s.eq_ignore_ascii_case(schema)).unwrap_or(true)
            && self.table.as_deref().map(|t| t.eq_ignore_ascii_case(table)).unwrap_or(true)
    }

    fn specificity(&self) -> u8 {
        match (self.schema.is_some(), self.table.is_some()) {
            (true, true) => 2,
            (true, false) => 1,
            _ => 0,
        }
    }
}

/// Column-name conventions for ref-data row defaults, e.g.
/// `IsActive`/`SortOrder`.
#[derive(Debug, Clone)]
pub struct RefDataDefaults {
    pub is_active_column: Option<String>,
    pub sort_order_column: Option<String>,
}

impl Default for RefDataDefaults {
    fn default() -> Self {
        Self {
            is_active_column: Some("IsActive".to_string()),
            sort_order_column: Some("SortOrder".to_string()),
        }
    }
}

/// An injected source of primary-key values. The default is GUID v4;
/// int/long generators must be monotonically increasing within a run.
pub trait IdentifierGenerator: Send + Sync {
    fn next_guid(&self) -> Uuid;
    fn next_int(&self) -> i64;
    fn next_long(&self) -> i64;
    fn next_string(&self) -> String {
        self.next_guid().to_string()
    }
}

pub struct GuidIdentifierGenerator;

impl IdentifierGenerator for GuidIdentifierGenerator {
    fn next_guid(&self) -> Uuid {
        Uuid::new_v4()
    }
    fn next_int(&self) -> i64 {
        Uuid::new_v4().as_u128() as i64
    }
    fn next_long(&self) -> i64 {
        Uuid::new_v4().as_u128() as i64
    }
}

/// Monotonically increasing int/long generator.
pub struct MonotonicIdentifierGenerator {
    next: std::sync::atomic::AtomicI64,
}

impl MonotonicIdentifierGenerator {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: std::sync::atomic::AtomicI64::new(first),
        }
    }
}

impl IdentifierGenerator for MonotonicIdentifierGenerator {
    fn next_guid(&self) -> Uuid {
        guid_from_msb_int(self.next_long())
    }
    fn next_int(&self) -> i64 {
        self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
    fn next_long(&self) -> i64 {
        self.next_int()
    }
}

/// Everything the parser needs besides the raw document and the catalog,
/// threaded explicitly rather than held as process-global state.
pub struct DataParserConfig {
    pub id_suffix: String,
    pub ref_data_code_column: String,
    pub ref_data_text_column: String,
    pub ref_data_defaults: RefDataDefaults,
    pub table_defaults: Vec<DefaultRule>,
    pub user_name: String,
    pub date_time_now: DateTime<Utc>,
    pub runtime_parameters: HashMap<String, String>,
    pub extension_functions: HashMap<String, ExtensionFn>,
    pub replace_shorthand_guids: bool,
}

struct ParseCtx<'a> {
    catalog: &'a SchemaCatalog<'a>,
    generator: &'a dyn IdentifierGenerator,
    config: &'a DataParserConfig,
}

/// Parse one data document. Returns the parsed tables in source order
/// (flattened, parents before children encountered) and the table-agnostic
/// `"*"` config, if present.
pub fn parse(content: &str, catalog: &SchemaCatalog<'_>, generator: &dyn IdentifierGenerator, config: &DataParserConfig) -> DbExResult<(Vec<DataTable>, DataConfig)> {
    let root: YamlValue = serde_yaml::from_str(content).map_err(|e| DbExError::InvalidDataDocument(format!("malformed data document: {e}")))?;
    let root_map = root.as_mapping().ok_or_else(|| DbExError::InvalidDataDocument("data document root must be a mapping".to_string()))?;

    let ctx = ParseCtx { catalog, generator, config };
    let mut tables = Vec::new();
    let mut data_config = DataConfig::default();

    for (key, value) in root_map {
        let key = key.as_str().unwrap_or_default();
        if key == "*" {
            data_config = parse_data_config(value);
            continue;
        }
        let entries = value
            .as_sequence()
            .ok_or_else(|| DbExError::InvalidDataDocument(format!("schema `{key}` must map to a list of tables")))?;
        for entry in entries {
            let entry_map = entry
                .as_mapping()
                .ok_or_else(|| DbExError::InvalidDataDocument(format!("table entry under schema `{key}` must be a mapping")))?;
            for (table_key, rows_value) in entry_map {
                let raw_name = table_key.as_str().unwrap_or_default();
                let (is_merge, use_generator, table_name) = parse_table_name(raw_name);
                let row_values = rows_value
                    .as_sequence()
                    .ok_or_else(|| DbExError::InvalidDataDocument(format!("table `{key}.{table_name}` must map to a list of rows")))?;
                parse_table(&ctx, key, &table_name, is_merge, use_generator, row_values, None, &mut tables)?;
            }
        }
    }

    for table in &mut tables {
        table.pre_condition_sql = data_config.pre_condition_sql.clone();
        table.pre_sql = data_config.pre_sql.clone();
        table.post_sql = data_config.post_sql.clone();
    }

    Ok((tables, data_config))
}

fn parse_data_config(value: &YamlValue) -> DataConfig {
    let mut cfg = DataConfig::default();
    if let Some(map) = value.as_mapping() {
        for (k, v) in map {
            let key = k.as_str().unwrap_or_default();
            let s = v.as_str().map(str::to_string);
            if key.eq_ignore_ascii_case("preConditionSql") {
                cfg.pre_condition_sql = s;
            } else if key.eq_ignore_ascii_case("preSql") {
                cfg.pre_sql = s;
            } else if key.eq_ignore_ascii_case("postSql") {
                cfg.post_sql = s;
            }
        }
    }
    cfg
}

/// Strip `$` (merge) and `^` (generated identifier) prefixes; the two may
/// combine, in source order `$^Name`.
fn parse_table_name(raw: &str) -> (bool, bool, String) {
    if let Some(rest) = raw.strip_prefix("$^") {
        (true, true, rest.to_string())
    } else if let Some(rest) = raw.strip_prefix('$') {
        (true, false, rest.to_string())
    } else if let Some(rest) = raw.strip_prefix('^') {
        (false, true, rest.to_string())
    } else {
        (false, false, raw.to_string())
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_table(
    ctx: &ParseCtx<'_>,
    schema: &str,
    table_name: &str,
    is_merge: bool,
    use_identifier_generator: bool,
    row_values: &[YamlValue],
    cascade_from_parent: Option<&DataRow>,
    out: &mut Vec<DataTable>,
) -> DbExResult<()> {
    let table_schema = ctx
        .catalog
        .find(schema, table_name)
        .ok_or_else(|| DbExError::TableNotFound {
            schema: schema.to_string(),
            table: table_name.to_string(),
        })?
        .clone();

    let mut rows = Vec::with_capacity(row_values.len());
    for (row_index, row_value) in row_values.iter().enumerate() {
        let mut row = parse_row(ctx, schema, &table_schema, row_value, out)?;
        if let Some(parent_row) = cascade_from_parent {
            cascade_parent_pk(parent_row, &table_schema, &mut row);
        }
        apply_defaults(ctx, schema, &table_schema, row_index, use_identifier_generator, &mut row)?;
        rows.push(row);
    }

    out.push(DataTable {
        schema: schema.to_string(),
        name: table_name.to_string(),
        db_table: table_schema,
        is_merge,
        use_identifier_generator,
        identifier_kind: None,
        rows,
        pre_condition_sql: None,
        pre_sql: None,
        post_sql: None,
        column_name_mappings: IndexMap::new(),
    });
    Ok(())
}

/// Copy the parent's primary-key values into identically named, not-yet-set
/// columns of a child row — cascade by convention.
fn cascade_parent_pk(parent_row: &DataRow, child_schema: &TableSchema, child_row: &mut DataRow) {
    for col in parent_row.columns.iter() {
        if !col.db_column.is_primary_key {
            continue;
        }
        if child_row.get(&col.name).is_some() {
            continue;
        }
        if let Some(child_col) = child_schema.column(&col.name) {
            child_row.set(DataColumn {
                name: child_col.name.clone(),
                value: col.value.clone(),
                db_column: child_col.clone(),
                use_foreign_key_query_for_id: false,
            });
        }
    }
}

fn parse_row(ctx: &ParseCtx<'_>, schema: &str, table: &TableSchema, row_value: &YamlValue, out: &mut Vec<DataTable>) -> DbExResult<DataRow> {
    let mapping = match row_value.as_mapping() {
        Some(m) => m,
        None => {
            return Err(DbExError::InvalidStructure {
                schema: schema.to_string(),
                table: table.name.clone(),
                column: String::new(),
            })
        }
    };

    // A one-key mapping on a ref-data table, where the key isn't itself a
    // column, is the scalar `code: text` shorthand — a scalar pair whose
    // key is the reference-data code.
    if table.is_ref_data && mapping.len() == 1 {
        let (k, v) = mapping.iter().next().unwrap();
        let key = k.as_str().unwrap_or_default();
        if table.column(key).is_none() {
            let code_col_name = table.ref_data_code_column.clone().unwrap_or_else(|| ctx.config.ref_data_code_column.clone());
            let text_col_name = ctx.config.ref_data_text_column.clone();
            let mut row = DataRow::default();
            if let Some(code_col) = table.column(&code_col_name) {
                row.set(DataColumn {
                    name: code_col.name.clone(),
                    value: DataValue::String(key.to_string()),
                    db_column: code_col.clone(),
                    use_foreign_key_query_for_id: false,
                });
            }
            if let Some(text_col) = table.column(&text_col_name) {
                let text = v.as_str().unwrap_or_default().to_string();
                row.set(DataColumn {
                    name: text_col.name.clone(),
                    value: DataValue::String(text),
                    db_column: text_col.clone(),
                    use_foreign_key_query_for_id: false,
                });
            }
            return Ok(row);
        }
    }

    let mut row = DataRow::default();
    let mut seen = std::collections::HashSet::new();

    for (k, v) in mapping {
        let key = k.as_str().unwrap_or_default();

        if v.is_sequence() {
            // Nested array: a child table, not a column.
            let child_rows = v.as_sequence().unwrap();
            let (child_merge, child_gen, child_name) = parse_table_name(key);
            parse_table(ctx, schema, &child_name, child_merge, child_gen, child_rows, Some(&row), out)?;
            continue;
        }

        let resolved = resolve_column(table, key, &ctx.config.id_suffix);
        let Some(column) = resolved else {
            if v.is_mapping() {
                return Err(DbExError::InvalidStructure {
                    schema: schema.to_string(),
                    table: table.name.clone(),
                    column: key.to_string(),
                });
            }
            return Err(DbExError::InvalidStructure {
                schema: schema.to_string(),
                table: table.name.clone(),
                column: key.to_string(),
            });
        };

        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(DbExError::DuplicateColumn {
                schema: schema.to_string(),
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }

        if v.is_mapping() {
            return Err(DbExError::InvalidStructure {
                schema: schema.to_string(),
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }

        let (value, use_fk_query) = coerce_value(schema, table, column, v, ctx.config)?;
        row.set(DataColumn {
            name: column.name.clone(),
            value,
            db_column: column.clone(),
            use_foreign_key_query_for_id: use_fk_query,
        });
    }

    Ok(row)
}

/// Direct match, else `<name><IdSuffix>` if that column is a foreign-ref-
/// data column.
fn resolve_column<'a>(table: &'a TableSchema, name: &str, id_suffix: &str) -> Option<&'a ColumnSchema> {
    if let Some(col) = table.column(name) {
        return Some(col);
    }
    let with_suffix = format!("{name}{id_suffix}");
    table.column(&with_suffix).filter(|c| c.is_foreign_ref_data)
}

fn yaml_scalar_to_string(v: &YamlValue) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => None,
        _ => None,
    }
}

fn coerce_value(schema: &str, table: &TableSchema, column: &ColumnSchema, raw: &YamlValue, config: &DataParserConfig) -> DbExResult<(DataValue, bool)> {
    let coercion_err = || DbExError::ValueCoercion {
        schema: schema.to_string(),
        table: table.name.clone(),
        column: column.name.clone(),
        value: format!("{raw:?}"),
        expected_type: format!("{:?}", column.dotnet_type),
    };

    if matches!(raw, YamlValue::Null) {
        return Ok((DataValue::Null, false));
    }

    // `^(expr)` runtime-parameter evaluation applies to any string scalar
    // before type-specific coercion.
    let raw_string = yaml_scalar_to_string(raw);
    let resolved_string = match (&raw, &raw_string) {
        (YamlValue::String(s), Some(_)) if s.starts_with("^(") && s.ends_with(')') => {
            Some(resolve_runtime_parameter(&s[2..s.len() - 1], config)?)
        }
        _ => raw_string.clone(),
    };

    if column.is_foreign_ref_data {
        // Integer fitting the FK's int/long type is used as-is; anything
        // else is retained as a ref-data code for subquery substitution at
        // emission time.
        if matches!(column.dotnet_type, DotNetType::Int | DotNetType::Long) {
            if let Some(i) = raw.as_i64() {
                return Ok((DataValue::Int(i), false));
            }
            if let Some(s) = &resolved_string {
                if let Ok(i) = s.parse::<i64>() {
                    return Ok((DataValue::Int(i), false));
                }
            }
        }
        let code = resolved_string.ok_or_else(coercion_err)?;
        return Ok((DataValue::RefDataCode(code), true));
    }

    match column.dotnet_type {
        DotNetType::Int | DotNetType::Long => {
            if let Some(i) = raw.as_i64() {
                Ok((DataValue::Int(i), false))
            } else if let Some(s) = &resolved_string {
                s.parse::<i64>().map(|i| (DataValue::Int(i), false)).map_err(|_| coercion_err())
            } else {
                Err(coercion_err())
            }
        }
        DotNetType::Decimal => {
            if let Some(n) = raw.as_f64() {
                Ok((DataValue::Decimal(n.to_string()), false))
            } else if let Some(s) = resolved_string {
                Ok((DataValue::Decimal(s), false))
            } else {
                Err(coercion_err())
            }
        }
        DotNetType::Bool => {
            if let Some(b) = raw.as_bool() {
                Ok((DataValue::Bool(b), false))
            } else if let Some(s) = &resolved_string {
                match s.to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok((DataValue::Bool(true), false)),
                    "false" | "0" => Ok((DataValue::Bool(false), false)),
                    _ => Err(coercion_err()),
                }
            } else {
                Err(coercion_err())
            }
        }
        DotNetType::DateTime => {
            let s = resolved_string.ok_or_else(coercion_err)?;
            parse_date_time(&s).map(|dt| (DataValue::DateTime(dt), false)).ok_or_else(coercion_err)
        }
        DotNetType::DateOnly => {
            let s = resolved_string.ok_or_else(coercion_err)?;
            chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(|d| (DataValue::DateOnly(d), false))
                .map_err(|_| coercion_err())
        }
        DotNetType::TimeOnly => {
            let s = resolved_string.ok_or_else(coercion_err)?;
            chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S")
                .map(|t| (DataValue::TimeOnly(t), false))
                .map_err(|_| coercion_err())
        }
        DotNetType::String => {
            let s = resolved_string.ok_or_else(coercion_err)?;
            Ok((DataValue::String(s), false))
        }
        DotNetType::Binary => {
            let s = resolved_string.ok_or_else(coercion_err)?;
            hex_decode(&s).map(|b| (DataValue::Binary(b), false)).ok_or_else(coercion_err)
        }
        DotNetType::Guid => {
            if let Some(i) = raw.as_i64() {
                return Ok((DataValue::Guid(guid_from_msb_int(i)), false));
            }
            let s = resolved_string.ok_or_else(coercion_err)?;
            if config.replace_shorthand_guids {
                if let Some(n) = s.strip_prefix('^').and_then(|rest| rest.parse::<i64>().ok()) {
                    return Ok((DataValue::Guid(guid_from_msb_int(n)), false));
                }
            }
            Uuid::parse_str(&s).map(|g| (DataValue::Guid(g), false)).map_err(|_| coercion_err())
        }
    }
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        })
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| DateTime::<Utc>::from_naive_utc_and_offset(d.and_hms_opt(0, 0, 0).unwrap(), Utc))
        })
}

/// Integer-in-the-most-significant-32-bits GUID encoding.
fn guid_from_msb_int(value: i64) -> Uuid {
    let msb = (value as u32).to_be_bytes();
    let mut bytes = [0u8; 16];
    bytes[..4].copy_from_slice(&msb);
    Uuid::from_bytes(bytes)
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// `^(expr)` resolution: well-known names, then the runtime-parameters map,
/// then the extension-function registry.
fn resolve_runtime_parameter(expr: &str, config: &DataParserConfig) -> DbExResult<String> {
    if expr == "UserName" {
        return Ok(config.user_name.clone());
    }
    if expr == "DateTimeNow" {
        return Ok(config.date_time_now.to_rfc3339());
    }
    if let Some(v) = config.runtime_parameters.get(expr) {
        return Ok(v.clone());
    }
    if let Some(f) = config.extension_functions.get(expr) {
        return f();
    }
    Err(DbExError::ParameterUnresolved { expr: expr.to_string() })
}

fn apply_defaults(ctx: &ParseCtx<'_>, schema: &str, table: &TableSchema, row_index: usize, use_identifier_generator: bool, row: &mut DataRow) -> DbExResult<()> {
    // (a) audit columns.
    for column in &table.columns {
        if row.get(&column.name).is_some() {
            continue;
        }
        if column.semantic_flags.is_created_audit || column.semantic_flags.is_updated_audit {
            let value = match column.dotnet_type {
                DotNetType::DateTime => Some(DataValue::DateTime(ctx.config.date_time_now)),
                DotNetType::String => Some(DataValue::String(ctx.config.user_name.clone())),
                _ => None,
            };
            if let Some(value) = value {
                row.set(DataColumn {
                    name: column.name.clone(),
                    value,
                    db_column: column.clone(),
                    use_foreign_key_query_for_id: false,
                });
            }
        }
    }

    // (b) ref-data defaults.
    if table.is_ref_data {
        if let Some(active_col) = &ctx.config.ref_data_defaults.is_active_column {
            if let Some(column) = table.column(active_col) {
                if row.get(&column.name).is_none() && column.dotnet_type == DotNetType::Bool {
                    row.set(DataColumn {
                        name: column.name.clone(),
                        value: DataValue::Bool(true),
                        db_column: column.clone(),
                        use_foreign_key_query_for_id: false,
                    });
                }
            }
        }
        if let Some(sort_col) = &ctx.config.ref_data_defaults.sort_order_column {
            if let Some(column) = table.column(sort_col) {
                if row.get(&column.name).is_none() && matches!(column.dotnet_type, DotNetType::Int | DotNetType::Long) {
                    row.set(DataColumn {
                        name: column.name.clone(),
                        value: DataValue::Int(row_index as i64 + 1),
                        db_column: column.clone(),
                        use_foreign_key_query_for_id: false,
                    });
                }
            }
        }
    }

    // (c) generated identifier on the single PK column.
    if use_identifier_generator {
        if let Some(pk) = table.single_primary_key() {
            if row.get(&pk.name).is_none() {
                let value = match pk.dotnet_type {
                    DotNetType::Guid => DataValue::Guid(ctx.generator.next_guid()),
                    DotNetType::Int => DataValue::Int(ctx.generator.next_int()),
                    DotNetType::Long => DataValue::Int(ctx.generator.next_long()),
                    DotNetType::String => DataValue::String(ctx.generator.next_string()),
                    _ => DataValue::Guid(ctx.generator.next_guid()),
                };
                row.set(DataColumn {
                    name: pk.name.clone(),
                    value,
                    db_column: pk.clone(),
                    use_foreign_key_query_for_id: false,
                });
            }
        }
    }

    // (d) user-specified defaults, most-specific-first.
    let mut rules: Vec<&DefaultRule> = ctx.config.table_defaults.iter().filter(|r| r.applies_to(schema, &table.name)).collect();
    rules.sort_by_key(|r| std::cmp::Reverse(r.specificity()));
    for column in &table.columns {
        if row.get(&column.name).is_some() {
            continue;
        }
        if let Some(rule) = rules.iter().find(|r| r.column.eq_ignore_ascii_case(&column.name)) {
            row.set(DataColumn {
                name: column.name.clone(),
                value: rule.value.clone(),
                db_column: column.clone(),
                use_foreign_key_query_for_id: false,
            });
        }
    }

    Ok(())
}

/// Dependency topological order, ties broken by input file order then
/// table name; `DataDependencyCycle` on a cycle, detected via Kahn's
/// algorithm.
pub fn topological_order(tables: &[DataTable]) -> DbExResult<Vec<usize>> {
    let n = tables.len();
    let index_of = |schema: &str, name: &str| {
        tables
            .iter()
            .position(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    };

    // prerequisites[i] = set of j that table i depends on (must emit first).
    let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, table) in tables.iter().enumerate() {
        for column in &table.db_table.columns {
            if let Some(fk_table) = &column.foreign_table {
                let fk_schema = column.foreign_schema.as_deref().unwrap_or(&table.schema);
                if let Some(j) = index_of(fk_schema, fk_table) {
                    if j != i && !prerequisites[i].contains(&j) {
                        prerequisites[i].push(j);
                    }
                }
            }
        }
    }

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut emitted = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| prerequisites[i].iter().all(|&j| emitted[j]))
            .collect();
        if ready.is_empty() {
            let names: Vec<String> = remaining.iter().map(|&i| tables[i].qualified_name()).collect();
            return Err(DbExError::DataDependencyCycle { cycle: names.join(" -> ") });
        }
        // Stable: input order among the ready set (already ascending by index).
        let next = *ready.first().unwrap();
        emitted[next] = true;
        order.push(next);
        remaining.retain(|&i| i != next);
    }

    Ok(order)
}

/// Render each table's insert/merge statement in dependency order.
pub fn emit_sql(tables: &[DataTable], dialect: &dyn Dialect) -> DbExResult<Vec<String>> {
    let order = topological_order(tables)?;
    let mut statements = Vec::with_capacity(order.len());
    for i in order {
        statements.push(emit_table_sql(&tables[i], dialect));
    }
    Ok(statements)
}

fn emit_table_sql(table: &DataTable, dialect: &dyn Dialect) -> String {
    let body = if table.is_merge {
        emit_merge(table, dialect)
    } else {
        emit_insert(table, dialect)
    };

    let mut out = String::new();
    if let Some(pre_condition) = &table.pre_condition_sql {
        out.push_str(&substitute_table(pre_condition, table));
        out.push('\n');
    }
    if let Some(pre) = &table.pre_sql {
        out.push_str(&substitute_table(pre, table));
        out.push('\n');
    }
    out.push_str(&body);
    if let Some(post) = &table.post_sql {
        out.push('\n');
        out.push_str(&substitute_table(post, table));
    }
    out
}

fn substitute_table(sql: &str, table: &DataTable) -> String {
    dbex_connector::parameters::substitute_braces(sql, |name| match name {
        "schema" => Some(table.schema.clone()),
        "table" => Some(table.name.clone()),
        _ => None,
    })
}

fn format_column_value(dialect: &dyn Dialect, column: &DataColumn, table: &TableSchema) -> String {
    if let DataValue::RefDataCode(code) = &column.value {
        let fk_table = column.db_column.foreign_table.as_deref().unwrap_or_default();
        let fk_schema = column.db_column.foreign_schema.as_deref().unwrap_or(&table.schema);
        let pk_column = column.db_column.foreign_column.as_deref().unwrap_or("Id");
        let code_column = column
            .db_column
            .foreign_ref_data_code_column
            .as_deref()
            .unwrap_or("Code");
        return dialect.format_fk_subquery(fk_schema, fk_table, pk_column, code_column, code);
    }
    dialect.format_value(&column.value)
}

fn emit_insert(table: &DataTable, dialect: &dyn Dialect) -> String {
    if table.rows.is_empty() {
        return String::new();
    }
    let columns: Vec<&str> = table.rows[0].columns.iter().filter(|c| !c.db_column.semantic_flags.is_updated_audit).map(|c| c.name.as_str()).collect();
    let quoted_columns: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let rows_sql: Vec<String> = table
        .rows
        .iter()
        .map(|row| {
            let values: Vec<String> = columns
                .iter()
                .map(|col_name| {
                    row.get(col_name)
                        .map(|c| format_column_value(dialect, c, &table.db_table))
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES\n{};",
        dialect.quote_qualified(&table.schema, &table.name),
        quoted_columns.join(", "),
        rows_sql.join(",\n")
    )
}

fn emit_merge(table: &DataTable, dialect: &dyn Dialect) -> String {
    if table.rows.is_empty() {
        return String::new();
    }
    let all_columns: Vec<&str> = table.rows[0].columns.iter().map(|c| c.name.as_str()).collect();
    let match_columns: Vec<&str> = all_columns
        .iter()
        .copied()
        .filter(|name| {
            let col = table.db_table.column(name);
            let is_audit = col.map(|c| c.semantic_flags.is_created_audit || c.semantic_flags.is_updated_audit).unwrap_or(false);
            let is_generated_pk = table.use_identifier_generator && col.map(|c| c.is_primary_key).unwrap_or(false);
            !is_audit && !is_generated_pk
        })
        .collect();
    let insert_columns: Vec<&str> = all_columns
        .iter()
        .copied()
        .filter(|name| table.db_table.column(name).map(|c| !c.semantic_flags.is_updated_audit).unwrap_or(true))
        .collect();
    let update_columns: Vec<&str> = all_columns
        .iter()
        .copied()
        .filter(|name| table.db_table.column(name).map(|c| !c.semantic_flags.is_created_audit).unwrap_or(true))
        .collect();

    let source_rows: Vec<String> = table
        .rows
        .iter()
        .map(|row| {
            let values: Vec<String> = all_columns
                .iter()
                .map(|name| {
                    row.get(name)
                        .map(|c| format_column_value(dialect, c, &table.db_table))
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    let source_column_list: Vec<String> = all_columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let on_clause: Vec<String> = match_columns
        .iter()
        .map(|c| format!("target.{0} = src.{0}", dialect.quote_ident(c)))
        .collect();
    let update_set: Vec<String> = update_columns
        .iter()
        .map(|c| format!("{0} = src.{0}", dialect.quote_ident(c)))
        .collect();
    let insert_col_list: Vec<String> = insert_columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let insert_val_list: Vec<String> = insert_columns.iter().map(|c| format!("src.{}", dialect.quote_ident(c))).collect();

    format!(
        "MERGE INTO {target} AS target\nUSING (VALUES\n{rows}\n) AS src ({src_cols})\nON {on}\nWHEN MATCHED THEN UPDATE SET {update}\nWHEN NOT MATCHED THEN INSERT ({insert_cols}) VALUES ({insert_vals});",
        target = dialect.quote_qualified(&table.schema, &table.name),
        rows = source_rows.join(",\n"),
        src_cols = source_column_list.join(", "),
        on = on_clause.join(" AND "),
        update = update_set.join(", "),
        insert_cols = insert_col_list.join(", "),
        insert_vals = insert_val_list.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbex_connector::model::SemanticFlags;

    fn col(name: &str, ty: DotNetType, pk: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            dotnet_type: ty,
            length: None,
            precision: None,
            scale: None,
            is_nullable: false,
            is_primary_key: pk,
            is_identity: false,
            is_unique: false,
            is_computed: false,
            default_value: None,
            foreign_schema: None,
            foreign_table: None,
            foreign_column: None,
            is_foreign_ref_data: false,
            foreign_ref_data_code_column: None,
            semantic_flags: SemanticFlags::default(),
        }
    }

    fn gender_table() -> TableSchema {
        TableSchema {
            schema: "Ref".to_string(),
            name: "Gender".to_string(),
            is_view: false,
            is_ref_data: true,
            columns: vec![
                {
                    let mut c = col("GenderId", DotNetType::Int, true);
                    c.is_identity = true;
                    c
                },
                col("Code", DotNetType::String, false),
                col("Text", DotNetType::String, false),
            ],
            primary_key_columns: vec!["GenderId".to_string()],
            ref_data_code_column: Some("Code".to_string()),
        }
    }

    fn default_config() -> DataParserConfig {
        DataParserConfig {
            id_suffix: "Id".to_string(),
            ref_data_code_column: "Code".to_string(),
            ref_data_text_column: "Text".to_string(),
            ref_data_defaults: RefDataDefaults::default(),
            table_defaults: Vec::new(),
            user_name: "tester".to_string(),
            date_time_now: Utc::now(),
            runtime_parameters: HashMap::new(),
            extension_functions: HashMap::new(),
            replace_shorthand_guids: true,
        }
    }

    #[test]
    fn parses_table_name_prefixes() {
        assert_eq!(parse_table_name("$^Thing"), (true, true, "Thing".to_string()));
        assert_eq!(parse_table_name("$Thing"), (true, false, "Thing".to_string()));
        assert_eq!(parse_table_name("^Thing"), (false, true, "Thing".to_string()));
        assert_eq!(parse_table_name("Thing"), (false, false, "Thing".to_string()));
    }

    #[test]
    fn parses_ref_data_scalar_pair_rows() {
        let doc = "Ref:\n  - $Gender:\n      - M: Male\n      - F: Female\n";
        let tables = vec![gender_table()];
        let catalog = SchemaCatalog::new(&tables);
        let generator = GuidIdentifierGenerator;
        let config = default_config();
        let (parsed, _) = parse(doc, &catalog, &generator, &config).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].is_merge);
        assert_eq!(parsed[0].rows.len(), 2);
        assert_eq!(parsed[0].rows[0].get("Code").unwrap().value, DataValue::String("M".to_string()));
        assert_eq!(parsed[0].rows[0].get("Text").unwrap().value, DataValue::String("Male".to_string()));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut person = TableSchema {
            schema: "Demo".to_string(),
            name: "Person".to_string(),
            is_view: false,
            is_ref_data: false,
            columns: vec![col("Name", DotNetType::String, false)],
            primary_key_columns: vec![],
            ref_data_code_column: None,
        };
        person.columns.push(col("name", DotNetType::String, false));
        let tables = vec![person];
        let catalog = SchemaCatalog::new(&tables);
        let generator = GuidIdentifierGenerator;
        let config = default_config();
        let doc = "Demo:\n  - Person:\n      - Name: Wendy\n";
        let err = parse(doc, &catalog, &generator, &config).unwrap_err();
        assert!(matches!(err, DbExError::DuplicateColumn { .. }));
    }

    #[test]
    fn malformed_root_is_invalid_data_document() {
        let tables: Vec<TableSchema> = vec![];
        let catalog = SchemaCatalog::new(&tables);
        let generator = GuidIdentifierGenerator;
        let config = default_config();
        let doc = "- just\n- a\n- list\n";
        let err = parse(doc, &catalog, &generator, &config).unwrap_err();
        assert!(matches!(err, DbExError::InvalidDataDocument(_)));
    }

    #[test]
    fn table_not_found_is_reported() {
        let tables: Vec<TableSchema> = vec![];
        let catalog = SchemaCatalog::new(&tables);
        let generator = GuidIdentifierGenerator;
        let config = default_config();
        let doc = "Demo:\n  - Missing:\n      - Name: x\n";
        let err = parse(doc, &catalog, &generator, &config).unwrap_err();
        assert!(matches!(err, DbExError::TableNotFound { .. }));
    }

    #[test]
    fn msb_guid_encoding_is_deterministic() {
        let guid = guid_from_msb_int(42);
        assert_eq!(&guid.as_bytes()[..4], &42u32.to_be_bytes());
        assert_eq!(&guid.as_bytes()[4..], &[0u8; 12]);
    }

    #[test]
    fn topological_order_respects_foreign_keys() {
        let mut gender_col = col("GenderId", DotNetType::Int, false);
        gender_col.foreign_table = Some("Gender".to_string());
        gender_col.foreign_schema = Some("Ref".to_string());
        gender_col.is_foreign_ref_data = true;
        gender_col.foreign_column = Some("GenderId".to_string());
        gender_col.foreign_ref_data_code_column = Some("Code".to_string());

        let person_schema = TableSchema {
            schema: "Demo".to_string(),
            name: "Person".to_string(),
            is_view: false,
            is_ref_data: false,
            columns: vec![gender_col],
            primary_key_columns: vec![],
            ref_data_code_column: None,
        };
        let gender_schema = gender_table();

        let person = DataTable {
            schema: "Demo".to_string(),
            name: "Person".to_string(),
            db_table: person_schema,
            is_merge: false,
            use_identifier_generator: false,
            identifier_kind: None,
            rows: vec![],
            pre_condition_sql: None,
            pre_sql: None,
            post_sql: None,
            column_name_mappings: IndexMap::new(),
        };
        let gender = DataTable {
            schema: "Ref".to_string(),
            name: "Gender".to_string(),
            db_table: gender_schema,
            is_merge: true,
            use_identifier_generator: false,
            identifier_kind: None,
            rows: vec![],
            pre_condition_sql: None,
            pre_sql: None,
            post_sql: None,
            column_name_mappings: IndexMap::new(),
        };

        // Input order is Person, Gender — Gender must still emit first.
        let tables = vec![person, gender];
        let order = topological_order(&tables).unwrap();
        assert_eq!(order, vec![1, 0]);
    }
}
