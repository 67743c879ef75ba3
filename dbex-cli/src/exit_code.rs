//! Deterministic process exit codes per failure class.

use dbex_connector::error::DbExError;

pub fn for_error(err: &DbExError) -> i32 {
    match err {
        DbExError::ConnectionFailure(_) => 1,
        DbExError::ScriptSyntax { .. } => 2,
        DbExError::NotACreateStatement { .. } => 3,
        DbExError::UnsupportedObjectType { .. } => 4,
        DbExError::DuplicateColumn { .. } => 5,
        DbExError::InvalidStructure { .. } => 6,
        DbExError::TableNotFound { .. } => 7,
        DbExError::ParameterUnresolved { .. } => 8,
        DbExError::ValueCoercion { .. } => 9,
        DbExError::DataDependencyCycle { .. } => 10,
        DbExError::DestructiveActionNotConfirmed { .. } => 11,
        DbExError::IntrospectionError(_) => 12,
        DbExError::ResourceNotFound(_) => 13,
        DbExError::ChecksumMismatch { .. } => 14,
        DbExError::InvalidDataDocument(_) => 15,
        DbExError::Cancelled => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_gets_a_distinct_code() {
        let samples = vec![
            DbExError::ConnectionFailure(anyhow::anyhow!("x")),
            DbExError::ScriptSyntax { script: "s".into(), offset: 0, message: "m".into() },
            DbExError::NotACreateStatement { script: "s".into() },
            DbExError::UnsupportedObjectType { script: "s".into(), object_type: "t".into() },
            DbExError::DuplicateColumn { schema: "s".into(), table: "t".into(), column: "c".into() },
            DbExError::InvalidStructure { schema: "s".into(), table: "t".into(), column: "c".into() },
            DbExError::TableNotFound { schema: "s".into(), table: "t".into() },
            DbExError::ParameterUnresolved { expr: "e".into() },
            DbExError::ValueCoercion {
                schema: "s".into(),
                table: "t".into(),
                column: "c".into(),
                value: "v".into(),
                expected_type: "Int".into(),
            },
            DbExError::DataDependencyCycle { cycle: "a -> b".into() },
            DbExError::DestructiveActionNotConfirmed { action: "Drop".into() },
            DbExError::IntrospectionError(anyhow::anyhow!("x")),
            DbExError::ResourceNotFound("r".into()),
            DbExError::ChecksumMismatch { script: "s".into() },
            DbExError::InvalidDataDocument("bad".into()),
            DbExError::Cancelled,
        ];
        let codes: Vec<i32> = samples.iter().map(for_error).collect();
        assert_eq!(codes, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn connection_failure_is_code_one() {
        let err = DbExError::ConnectionFailure(anyhow::anyhow!("refused"));
        assert_eq!(for_error(&err), 1);
    }
}
