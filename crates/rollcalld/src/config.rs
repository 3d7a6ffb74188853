use rollcall_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;
use toml::{Table, Value};

const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

/// Daemon configuration.
///
/// Every field falls back to its default independently: a missing file, an
/// unparseable file, or a wrongly-typed value never stops the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of enrollment photos, one per person (default: known_faces).
    pub known_faces_dir: PathBuf,
    /// Attendance CSV, appended across sessions (default: attendance.csv).
    pub attendance_csv: PathBuf,
    /// Capture device index, `/dev/video{N}` (default: 0).
    pub camera_index: u32,
    /// Secret required by the startup access gate (default: admin).
    pub access_secret: String,
    /// Directory containing the SCRFD and ArcFace ONNX models.
    pub model_dir: PathBuf,
    /// Maximum Euclidean encoding distance for a positive match.
    pub match_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            known_faces_dir: PathBuf::from("known_faces"),
            attendance_csv: PathBuf::from("attendance.csv"),
            camera_index: 0,
            access_secret: "admin".to_string(),
            model_dir: rollcall_core::default_model_dir(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Config {
    /// Load from `$ROLLCALL_CONFIG` (or `./rollcall.toml`), then apply
    /// `ROLLCALL_*` environment overrides.
    pub fn load() -> Self {
        let path = std::env::var("ROLLCALL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file unreadable, using defaults");
                None
            }
        };

        Self::resolve(text.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve from optional TOML text and an environment lookup.
    pub fn resolve(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let table = file.and_then(|text| match text.parse::<Table>() {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!(error = %e, "config file is not valid TOML, using defaults");
                None
            }
        });
        let table = table.unwrap_or_default();
        let mut config = Config::default();

        if let Some(v) = lookup(&table, "paths", "known_faces_dir", Value::as_str) {
            config.known_faces_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(&table, "paths", "attendance_csv_path", Value::as_str) {
            config.attendance_csv = PathBuf::from(v);
        }
        if let Some(v) = lookup(&table, "paths", "model_dir", Value::as_str) {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(&table, "camera", "index", Value::as_integer) {
            match u32::try_from(v) {
                Ok(index) => config.camera_index = index,
                Err(_) => tracing::warn!(value = v, "camera.index out of range, using default"),
            }
        }
        if let Some(v) = lookup(&table, "security", "password", Value::as_str) {
            config.access_secret = v.to_string();
        }
        if let Some(v) = lookup(&table, "matching", "threshold", Value::as_float) {
            config.match_threshold = v as f32;
        }

        if let Some(v) = env("ROLLCALL_KNOWN_FACES_DIR") {
            config.known_faces_dir = PathBuf::from(v);
        }
        if let Some(v) = env("ROLLCALL_ATTENDANCE_CSV") {
            config.attendance_csv = PathBuf::from(v);
        }
        if let Some(v) = env("ROLLCALL_MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        config.camera_index = env_parse(&env, "ROLLCALL_CAMERA_INDEX", config.camera_index);
        config.match_threshold = env_parse(&env, "ROLLCALL_MATCH_THRESHOLD", config.match_threshold);

        config
    }
}

/// Typed lookup of `[section] key`; a present but mistyped value is logged
/// and treated as absent.
fn lookup<'a, T>(
    table: &'a Table,
    section: &str,
    key: &str,
    get: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    let value = table.get(section)?.as_table()?.get(key)?;
    let typed = get(value);
    if typed.is_none() {
        tracing::warn!(section, key, value = %value, "config value has the wrong type, using default");
    }
    typed
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "malformed environment override, ignoring");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::resolve(None, no_env);
        assert_eq!(config.known_faces_dir, PathBuf::from("known_faces"));
        assert_eq!(config.attendance_csv, PathBuf::from("attendance.csv"));
        assert_eq!(config.camera_index, 0);
        assert_eq!(config.access_secret, "admin");
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_file_values() {
        let text = r#"
            [paths]
            known_faces_dir = "/srv/faces"
            attendance_csv_path = "/srv/log.csv"

            [camera]
            index = 2

            [security]
            password = "hunter2"

            [matching]
            threshold = 0.5
        "#;
        let config = Config::resolve(Some(text), no_env);
        assert_eq!(config.known_faces_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.attendance_csv, PathBuf::from("/srv/log.csv"));
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.access_secret, "hunter2");
        assert!((config.match_threshold - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let config = Config::resolve(Some("[paths\nknown_faces_dir = "), no_env);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_mistyped_field_falls_back_alone() {
        let text = r#"
            [paths]
            known_faces_dir = "faces"
            [camera]
            index = "front"
        "#;
        let config = Config::resolve(Some(text), no_env);
        assert_eq!(config.known_faces_dir, PathBuf::from("faces"));
        assert_eq!(config.camera_index, 0);
    }

    #[test]
    fn test_negative_camera_index_falls_back() {
        let config = Config::resolve(Some("[camera]\nindex = -1\n"), no_env);
        assert_eq!(config.camera_index, 0);
    }

    #[test]
    fn test_env_overrides_file() {
        let env = |key: &str| match key {
            "ROLLCALL_CAMERA_INDEX" => Some("3".to_string()),
            "ROLLCALL_ATTENDANCE_CSV" => Some("/tmp/a.csv".to_string()),
            "ROLLCALL_MATCH_THRESHOLD" => Some("not-a-number".to_string()),
            _ => None,
        };
        let config = Config::resolve(Some("[camera]\nindex = 1\n"), env);
        assert_eq!(config.camera_index, 3);
        assert_eq!(config.attendance_csv, PathBuf::from("/tmp/a.csv"));
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }
}
