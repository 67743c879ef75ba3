//! `dbex script new` — scaffold an empty, correctly named script file.
//! Pure file-system convenience; no database I/O.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;

pub fn run(kind: &str, name: &str, into: Option<&str>) -> Result<PathBuf> {
    let root = into.map(Path::new).unwrap_or_else(|| Path::new("."));
    let (rel_path, body): (PathBuf, &str) = match kind {
        "migrate" => {
            let stamp = Utc::now().format("%Y%m%d-%H%M%S");
            (
                root.join("Migrations").join(format!("{stamp}-{name}.sql")),
                "-- migration script\n",
            )
        }
        "schema" => (root.join("Schema").join(format!("{name}.sql")), "-- CREATE ...\n"),
        "data" => (root.join("Data").join(format!("{name}.yaml")), "Ref: []\n"),
        "pre-deploy" => (root.join(format!("{name}.pre.deploy.sql")), "-- runs before every Migrate\n"),
        "post-deploy" => (root.join(format!("{name}.post.deploy.sql")), "-- runs after every Migrate\n"),
        "post-database-create" => (
            root.join(format!("{name}.post.database.create.sql")),
            "-- runs once, immediately after Create\n",
        ),
        other => bail!(
            "unknown script kind `{other}`; expected one of: migrate, schema, data, pre-deploy, \
             post-deploy, post-database-create"
        ),
    };

    if let Some(parent) = rel_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if rel_path.exists() {
        bail!("{} already exists", rel_path.display());
    }
    std::fs::write(&rel_path, body).with_context(|| format!("writing {}", rel_path.display()))?;
    Ok(rel_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dbex-cli-script-new-{label}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn migrate_is_timestamped_under_migrations() {
        let dir = scratch_dir("migrate");
        let path = run("migrate", "add_widgets", Some(dir.to_str().unwrap())).unwrap();
        assert!(path.starts_with(&dir.join("Migrations")));
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-add_widgets.sql"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn schema_goes_under_schema_dir() {
        let dir = scratch_dir("schema");
        let path = run("schema", "MyView", Some(dir.to_str().unwrap())).unwrap();
        assert_eq!(path, dir.join("Schema").join("MyView.sql"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn pre_deploy_uses_dotted_suffix_at_assembly_root() {
        let dir = scratch_dir("pre-deploy");
        let path = run("pre-deploy", "bootstrap", Some(dir.to_str().unwrap())).unwrap();
        assert_eq!(path, dir.join("bootstrap.pre.deploy.sql"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn refuses_to_overwrite_an_existing_file() {
        let dir = scratch_dir("overwrite");
        run("schema", "Dup", Some(dir.to_str().unwrap())).unwrap();
        let err = run("schema", "Dup", Some(dir.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let dir = scratch_dir("unknown");
        let err = run("bogus", "x", Some(dir.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("unknown script kind"));
    }
}
