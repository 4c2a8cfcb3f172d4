use std::fs;
use std::path::Path;

use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Failed to read Cargo.toml")]
    ManifestIo(#[from] std::io::Error),
    #[error("Failed to parse Cargo.toml TOML")]
    ManifestParse(#[from] toml::de::Error),
    #[error("Failed to serialize extracted Cargo.toml metadata")]
    ManifestSerialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    /// Prefix for generated component ids.
    pub id_namespace: String,
    /// Model key under which each component instance gets its own scope.
    pub components_path: String,
    /// Re-render from scratch when server markup cannot be attached to.
    pub hydrate_fallback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            id_namespace: String::new(),
            components_path: "$components".to_string(),
            hydrate_fallback: true,
        }
    }
}

impl Settings {
    pub fn new(project_root: &Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("dev", "weave", "weave")
            .map(|proj_dirs| proj_dirs.config_dir().join("weave.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    fn load_from_paths(
        project_root: &Path,
        user_config_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let manifest_path = project_root.join("Cargo.toml");
        if manifest_path.exists() {
            let content = fs::read_to_string(&manifest_path)?;
            let manifest: toml::Value = toml::from_str(&content)?;

            let table = ["package", "metadata", "weave"]
                .iter()
                .try_fold(&manifest, |current, &key| current.get(key))
                .and_then(|value| value.as_table());

            if let Some(table) = table {
                let weave_toml = toml::to_string(table)?;
                builder = builder.add_source(File::from_str(&weave_toml, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            File::from(project_root.join(".weave.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("weave.toml"))
                .format(FileFormat::Toml)
                .required(false),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        tracing::debug!(?settings, "loaded settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn debug() -> Settings {
        Settings {
            debug: true,
            ..Settings::default()
        }
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_load_no_files() {
            let dir = tempdir().unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.components_path, "$components");
            assert!(settings.hydrate_fallback);
        }
    }

    mod project_files {
        use super::*;

        #[test]
        fn test_load_weave_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("weave.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_load_dot_weave_toml_only() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".weave.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_load_cargo_metadata_only() {
            let dir = tempdir().unwrap();
            let content = "[package]\nname = \"app\"\n\n[package.metadata.weave]\ndebug = true\n";
            fs::write(dir.path().join("Cargo.toml"), content).unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_cargo_toml_without_metadata() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"app\"\n").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, Settings::default());
        }

        #[test]
        fn test_all_fields() {
            let dir = tempdir().unwrap();
            let content = "id_namespace = \"x\"\ncomponents_path = \"_c\"\nhydrate_fallback = false\n";
            fs::write(dir.path().join("weave.toml"), content).unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(
                settings,
                Settings {
                    debug: false,
                    id_namespace: "x".to_string(),
                    components_path: "_c".to_string(),
                    hydrate_fallback: false,
                }
            );
        }
    }

    mod priority {
        use super::*;

        #[test]
        fn test_weave_toml_overrides_dot_weave_toml() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join(".weave.toml"), "debug = false").unwrap();
            fs::write(dir.path().join("weave.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_dot_weave_toml_overrides_cargo_metadata() {
            let dir = tempdir().unwrap();
            let content = "[package.metadata.weave]\ndebug = false\n";
            fs::write(dir.path().join("Cargo.toml"), content).unwrap();
            fs::write(dir.path().join(".weave.toml"), "debug = true").unwrap();
            let settings = Settings::load_from_paths(dir.path(), None).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_project_overrides_user() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("weave.toml");
            fs::write(&user_conf_path, "debug = true").unwrap();
            fs::write(project_dir.path().join("weave.toml"), "debug = false").unwrap();

            let settings =
                Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
            assert_eq!(settings, Settings::default());
        }
    }

    mod user_config {
        use super::*;

        #[test]
        fn test_load_user_config_only() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("weave.toml");
            fs::write(&user_conf_path, "debug = true").unwrap();

            let settings =
                Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
            assert_eq!(settings, debug());
        }

        #[test]
        fn test_missing_user_config_file() {
            let user_dir = tempdir().unwrap();
            let project_dir = tempdir().unwrap();
            let user_conf_path = user_dir.path().join("weave.toml");
            fs::write(project_dir.path().join("weave.toml"), "debug = true").unwrap();

            let settings =
                Settings::load_from_paths(project_dir.path(), Some(&user_conf_path)).unwrap();
            assert_eq!(settings, debug());
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_invalid_toml_content() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("weave.toml"), "debug = not_a_boolean").unwrap();
            let result = Settings::load_from_paths(dir.path(), None);
            assert!(matches!(result, Err(ConfigError::Config(_))));
        }

        #[test]
        fn test_invalid_cargo_toml() {
            let dir = tempdir().unwrap();
            fs::write(dir.path().join("Cargo.toml"), "[package").unwrap();
            let result = Settings::load_from_paths(dir.path(), None);
            assert!(matches!(result, Err(ConfigError::ManifestParse(_))));
        }
    }
}
