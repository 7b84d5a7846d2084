pub mod cli;
pub mod options;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::config::toml_config::ConflateConfig;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{validate_path, validate_tolerance, Validate};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "canal-conflate")]
#[command(about = "Snap canal networks and their points into one consistent dataset")]
pub struct CliConfig {
    #[arg(short, long, default_value = "conflate.toml", help = "TOML run configuration")]
    pub config: String,

    #[arg(long, help = "Override the canal endpoint tolerance")]
    pub canal_tolerance: Option<f64>,

    #[arg(long, help = "Override the point snapping tolerance")]
    pub point_tolerance: Option<f64>,

    #[arg(long, help = "Override the output directory")]
    pub output_path: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Resolve parameters and check the inputs without writing outputs")]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入設定檔並套用命令列覆寫
    pub fn load_config(&self) -> Result<ConflateConfig> {
        let mut config = ConflateConfig::from_file(&self.config)?;
        if let Some(tolerance) = self.canal_tolerance {
            config.tolerance.canals = Some(tolerance);
        }
        if let Some(tolerance) = self.point_tolerance {
            config.tolerance.points = Some(tolerance);
        }
        if let Some(path) = &self.output_path {
            config.output.path = path.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("config", &self.config)?;
        if let Some(tolerance) = self.canal_tolerance {
            validate_tolerance("canal_tolerance", tolerance)?;
        }
        if let Some(tolerance) = self.point_tolerance {
            validate_tolerance("point_tolerance", tolerance)?;
        }
        if let Some(path) = &self.output_path {
            validate_path("output_path", path)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
[run]
name = "cli"

[input]
canals = "c.geojson"
points = "p.geojson"
options_dir = "options"

[tolerance]
canals = 0.5
"#,
        )
        .unwrap();

        let cli = CliConfig::parse_from([
            "canal-conflate",
            "--config",
            path.to_str().unwrap(),
            "--point-tolerance",
            "2.5",
            "--output-path",
            "elsewhere",
        ]);
        assert!(cli.validate().is_ok());

        let config = cli.load_config().unwrap();
        assert_eq!(config.tolerance.canals, Some(0.5));
        assert_eq!(config.tolerance.points, Some(2.5));
        assert_eq!(config.output.path, "elsewhere");
        assert_eq!(config.options_dir(), Some(dir.path().join("options")));
    }

    #[test]
    fn test_non_finite_override_is_rejected() {
        let cli = CliConfig::parse_from(["canal-conflate", "--canal-tolerance", "NaN"]);
        assert!(cli.validate().is_err());
    }
}
