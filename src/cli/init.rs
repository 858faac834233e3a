//! `spqf init`: write the operator config file and create the database
//! directory.

use super::config::SpqfConfig;
use std::path::Path;

/// What `init` should do with the config file.
#[derive(Debug, PartialEq)]
pub enum InitAction {
    CreateNew,
    Overwrite,
}

/// Refuse to clobber an existing config file unless `force` is set.
pub fn validate_target(config_path: &Path, force: bool) -> Result<InitAction, String> {
    match (config_path.exists(), force) {
        (false, _) => Ok(InitAction::CreateNew),
        (true, true) => Ok(InitAction::Overwrite),
        (true, false) => Err(format!(
            "Config already exists at: {} (use --force to overwrite)",
            config_path.display()
        )),
    }
}

pub fn execute(config_path: &Path, db_dir: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let action = validate_target(config_path, force)?;

    std::fs::create_dir_all(db_dir).map_err(|e| {
        format!(
            "Failed to create database directory '{}': {}",
            db_dir.display(),
            e
        )
    })?;
    SpqfConfig::create_default(config_path, db_dir)?;

    match action {
        InitAction::CreateNew => println!("Created config: {}", config_path.display()),
        InitAction::Overwrite => println!("Replaced config: {}", config_path.display()),
    }
    println!("Database directory: {}", db_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_target() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        assert_eq!(validate_target(&path, false), Ok(InitAction::CreateNew));
        std::fs::write(&path, "").unwrap();
        assert!(validate_target(&path, false).is_err());
        assert_eq!(validate_target(&path, true), Ok(InitAction::Overwrite));
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("etc").join("config.toml");
        let db_dir = temp_dir.path().join("db");

        execute(&config_path, &db_dir, false).unwrap();

        assert!(db_dir.is_dir());
        let config = SpqfConfig::load(&config_path).unwrap();
        assert_eq!(config.storage.db_dir, db_dir);

        // second run needs --force
        assert!(execute(&config_path, &db_dir, false).is_err());
        execute(&config_path, &db_dir, true).unwrap();
    }
}
