//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! posekd train config.yaml
//! posekd train config.yaml --epochs 40 --output-dir ./checkpoints
//! posekd validate config.yaml --detailed
//! posekd info config.yaml --format json
//! posekd evaluate config.yaml --checkpoint ./checkpoints/latest_net_G.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// posekd: pose regression with feature and cross-similarity distillation
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "posekd")]
#[command(version)]
#[command(about = "Train pose regression networks, optionally distilled from a teacher")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train a student from YAML configuration
    Train(TrainArgs),

    /// Validate a configuration file without training
    Validate(ValidateArgs),

    /// Display information about a configuration
    Info(InfoArgs),

    /// Report pose errors of a student checkpoint
    Evaluate(EvaluateArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(short, long)]
    pub lr: Option<f32>,

    /// Dry run (validate config but don't train)
    #[arg(long)]
    pub dry_run: bool,

    /// Save checkpoints every N epochs
    #[arg(long)]
    pub save_every: Option<usize>,

    /// Log progress every N steps
    #[arg(long)]
    pub log_every: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Also check that referenced files exist and report the setup
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the evaluate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct EvaluateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Student checkpoint to evaluate
    #[arg(short, long)]
    pub checkpoint: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Unknown output format: {s}. Valid formats: text, json, yaml"
            )),
        }
    }
}

/// Parse command line arguments
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Patch a loaded spec with the train command's overrides
pub fn apply_overrides(spec: &mut super::TrainSpec, args: &TrainArgs) {
    if let Some(output_dir) = &args.output_dir {
        spec.training.output_dir = output_dir.clone();
    }
    if let Some(epochs) = args.epochs {
        spec.training.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        spec.data.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        spec.optimizer.lr = lr;
    }
    if let Some(save_every) = args.save_every {
        spec.training.save_every = save_every;
    }
    if let Some(log_every) = args.log_every {
        spec.training.log_every = log_every;
    }
    if let Some(seed) = args.seed {
        spec.training.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_command() {
        let cli = parse_args(["posekd", "train", "config.yaml"]).unwrap();
        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.config, PathBuf::from("config.yaml"));
                assert!(!args.dry_run);
            }
            _ => panic!("Expected Train command"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_train_with_overrides() {
        let cli = parse_args([
            "posekd",
            "train",
            "config.yaml",
            "--epochs",
            "10",
            "--batch-size",
            "32",
            "--lr",
            "0.001",
            "--output-dir",
            "./output",
            "--seed",
            "7",
        ])
        .unwrap();

        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.epochs, Some(10));
                assert_eq!(args.batch_size, Some(32));
                assert!((args.lr.unwrap() - 0.001).abs() < 1e-6);
                assert_eq!(args.output_dir, Some(PathBuf::from("./output")));
                assert_eq!(args.seed, Some(7));
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_parse_train_dry_run() {
        let cli = parse_args(["posekd", "train", "config.yaml", "--dry-run"]).unwrap();
        match cli.command {
            Command::Train(args) => assert!(args.dry_run),
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_parse_validate_detailed() {
        let cli = parse_args(["posekd", "validate", "config.yaml", "--detailed"]).unwrap();
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.config, PathBuf::from("config.yaml"));
                assert!(args.detailed);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_parse_info_formats() {
        let cli = parse_args(["posekd", "info", "config.yaml"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Text),
            _ => panic!("Expected Info command"),
        }

        let cli = parse_args(["posekd", "info", "config.yaml", "--format", "yaml"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Yaml),
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_parse_evaluate_command() {
        let cli = parse_args([
            "posekd",
            "evaluate",
            "config.yaml",
            "--checkpoint",
            "out/latest_net_G.json",
            "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Command::Evaluate(args) => {
                assert_eq!(args.checkpoint, PathBuf::from("out/latest_net_G.json"));
                assert_eq!(args.format, OutputFormat::Text);
            }
            _ => panic!("Expected Evaluate command"),
        }
    }

    #[test]
    fn test_evaluate_requires_checkpoint() {
        assert!(parse_args(["posekd", "evaluate", "config.yaml"]).is_err());
    }

    #[test]
    fn test_global_verbose_flag() {
        let cli = parse_args(["posekd", "validate", "config.yaml", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(parse_args(["posekd", "quantize", "model.gguf"]).is_err());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("yaml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let yaml = r#"
model:
  student: {hidden: [4]}
data: {train: a.json, batch_size: 2, input_dim: 3}
"#;
        let mut spec: super::super::TrainSpec = serde_yaml::from_str(yaml).unwrap();
        let args = TrainArgs {
            config: PathBuf::from("config.yaml"),
            output_dir: Some(PathBuf::from("/tmp/out")),
            epochs: Some(50),
            batch_size: Some(16),
            lr: Some(0.0005),
            dry_run: false,
            save_every: Some(10),
            log_every: Some(2),
            seed: Some(99),
        };

        apply_overrides(&mut spec, &args);

        assert_eq!(spec.training.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(spec.training.epochs, 50);
        assert_eq!(spec.data.batch_size, 16);
        assert_eq!(spec.optimizer.lr, 0.0005);
        assert_eq!(spec.training.save_every, 10);
        assert_eq!(spec.training.log_every, 2);
        assert_eq!(spec.training.seed, 99);
    }

    #[test]
    fn test_apply_no_overrides() {
        let yaml = r#"
model:
  student: {hidden: [4]}
data: {train: a.json, batch_size: 2, input_dim: 3}
"#;
        let mut spec: super::super::TrainSpec = serde_yaml::from_str(yaml).unwrap();
        let before = serde_yaml::to_string(&spec).unwrap();
        let args = TrainArgs {
            config: PathBuf::from("config.yaml"),
            output_dir: None,
            epochs: None,
            batch_size: None,
            lr: None,
            dry_run: true,
            save_every: None,
            log_every: None,
            seed: None,
        };

        apply_overrides(&mut spec, &args);
        assert_eq!(serde_yaml::to_string(&spec).unwrap(), before);
    }
}
