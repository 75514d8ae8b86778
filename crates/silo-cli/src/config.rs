//! Pipeline configuration file.
//!
//! ```toml
//! [estimator]
//! team_color = "red"
//! image_width = 921
//! image_height = 518
//!
//! [matcher]
//! silos_x = [-2.0, -1.0, 0.0, 1.0, 2.0]
//! silo_y = 5.9
//! k = [600.0, 0.0, 460.0, 0.0, 600.0, 259.0, 0.0, 0.0, 1.0]
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use silo_perception::{EstimatorConfig, MatcherConfig};
use silo_types::{SiloError, TeamColor};
use tracing::warn;

/// Everything the `silo-state` binary needs to build the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub estimator: EstimatorConfig,
    pub matcher: MatcherConfig,
}

/// Load the config from `path`, or defaults when `path` is `None`, then apply
/// environment overrides.
pub fn load(path: Option<&Path>) -> Result<AppConfig, SiloError> {
    let mut cfg = match path {
        Some(p) => load_from(p)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the TOML file at `path` without environment overrides.
pub fn load_from(path: &Path) -> Result<AppConfig, SiloError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        SiloError::Config(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    toml::from_str(&raw).map_err(|e| SiloError::Config(format!("Failed to parse config: {e}")))
}

/// Apply `SILO_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SILO_TEAM_COLOR` | `estimator.team_color` |
/// | `SILO_IMAGE_WIDTH` | `estimator.image_width` |
/// | `SILO_IMAGE_HEIGHT` | `estimator.image_height` |
///
/// Unparseable values are logged and ignored.
pub fn apply_env_overrides(cfg: &mut AppConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SILO_TEAM_COLOR") {
        match v.parse::<TeamColor>() {
            Ok(team) => cfg.estimator.team_color = team,
            Err(e) => warn!(value = %v, error = %e, "ignoring SILO_TEAM_COLOR"),
        }
    }
    if let Some(v) = lookup("SILO_IMAGE_WIDTH") {
        match v.parse::<u32>() {
            Ok(w) => cfg.estimator.image_width = w,
            Err(e) => warn!(value = %v, error = %e, "ignoring SILO_IMAGE_WIDTH"),
        }
    }
    if let Some(v) = lookup("SILO_IMAGE_HEIGHT") {
        match v.parse::<u32>() {
            Ok(h) => cfg.estimator.image_height = h,
            Err(e) => warn!(value = %v, error = %e, "ignoring SILO_IMAGE_HEIGHT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.estimator.max_silos, 5);
        assert_eq!(cfg.matcher.iou_threshold, 0.5);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("silo.toml");
        fs::write(
            &path,
            r#"
                [estimator]
                team_color = "red"
                margin_above = 80.0

                [matcher]
                silos_x = [-1.0, 0.0, 1.0]
                silo_y = 5.9
            "#,
        )
        .expect("write");

        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.estimator.team_color, TeamColor::Red);
        assert!((cfg.estimator.margin_above - 80.0).abs() < 1e-12);
        assert_eq!(cfg.estimator.image_width, 921);
        assert_eq!(cfg.matcher.silos_x, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SiloError::Config(_)));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[estimator]\nteam_color = \"green\"\n").expect("write");
        assert!(matches!(load_from(&path), Err(SiloError::Config(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = AppConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("SILO_TEAM_COLOR", "red"),
                ("SILO_IMAGE_WIDTH", "1280"),
                ("SILO_IMAGE_HEIGHT", "720"),
            ]),
        );
        assert_eq!(cfg.estimator.team_color, TeamColor::Red);
        assert_eq!(cfg.estimator.image_width, 1280);
        assert_eq!(cfg.estimator.image_height, 720);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = AppConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[("SILO_TEAM_COLOR", "green"), ("SILO_IMAGE_WIDTH", "wide")]),
        );
        assert_eq!(cfg, AppConfig::default());
    }
}
