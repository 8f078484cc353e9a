//! posekd CLI
//!
//! Single-command training entry point for the posekd library.
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! posekd train config.yaml
//!
//! # Train with overrides
//! posekd train config.yaml --epochs 10 --lr 0.001
//!
//! # Validate config and referenced files
//! posekd validate config.yaml --detailed
//!
//! # Show config info
//! posekd info config.yaml --format yaml
//!
//! # Report pose errors of a checkpoint
//! posekd evaluate config.yaml --checkpoint checkpoints/latest_net_G.json
//! ```

use clap::Parser;
use posekd::config::{
    apply_overrides, evaluate_from_spec, load_config, train_from_spec, validate_config,
    validate_paths, Cli, Command, EvaluateArgs, InfoArgs, OutputFormat, TrainArgs, TrainSpec,
    ValidateArgs,
};
use posekd::logging::init_tracing;
use posekd::train::EvalSummary;
use std::process::ExitCode;
use tracing::{info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.quiet) {
        eprintln!("Warning: {e}");
    }

    let result = match cli.command {
        Command::Train(args) => run_train(args),
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
        Command::Evaluate(args) => run_evaluate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_summary(spec: &TrainSpec) {
    println!("Student: {} {:?}", spec.model.student.arch, spec.model.student.hidden);
    if let Some(init) = &spec.model.student_init {
        println!("  Init: {}", init.display());
    }
    match &spec.model.teacher {
        Some(teacher) => {
            println!(
                "Teacher: {} {:?} ({})",
                teacher.network.arch,
                teacher.network.hidden,
                teacher.weights.display()
            );
            let distill = spec.distill_config();
            println!("  Hint modules: {:?}", distill.selection.hint_modules);
            println!("  CS modules: {:?}", distill.selection.cs_modules);
            println!("  CS loss: {:?}", distill.cs_loss);
            println!(
                "  Weights: hint={} cs={} (T={})",
                distill.hint_weight, distill.cs_weight, distill.temperature
            );
        }
        None => println!("Teacher: none (pose loss only)"),
    }
    println!("Optimizer: adam (lr={})", spec.optimizer.lr);
    println!(
        "Schedule: {:?} over {} epochs (decay {})",
        spec.training.lr_policy, spec.training.epochs, spec.training.niter_decay
    );
    println!("Batch size: {}", spec.data.batch_size);
    println!("Beta: {}", spec.training.beta);
}

fn run_train(args: TrainArgs) -> Result<(), String> {
    info!(config = %args.config.display(), "training from config");

    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| format!("Validation failed: {e}"))?;

    if args.dry_run {
        println!("Dry run - config validated successfully");
        print_summary(&spec);
        return Ok(());
    }

    let result = train_from_spec(&spec).map_err(|e| format!("Training error: {e}"))?;

    if result.stopped_early {
        warn!(epoch = result.final_epoch, "stopped early");
    }
    println!(
        "Training complete: {} epochs, final loss {:.4}, best {:.4} ({:.1}s)",
        result.final_epoch, result.final_loss, result.best_loss, result.elapsed_secs
    );
    if let Some(val) = &result.validation {
        println!(
            "  Validation: median {:.3} m, {:.2}°",
            val.median_position, val.median_orientation_deg
        );
    }
    for path in &result.checkpoints {
        println!("  Saved: {}", path.display());
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    info!(config = %args.config.display(), "validating config");

    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    validate_config(&spec).map_err(|e| format!("Validation failed: {e}"))?;

    if args.detailed {
        validate_paths(&spec).map_err(|e| format!("Validation failed: {e}"))?;
    }

    println!("Configuration is valid");

    if args.detailed {
        println!();
        print_summary(&spec);
        println!("Training data: {}", spec.data.train.display());
        if let Some(val) = &spec.data.val {
            println!("Validation data: {}", val.display());
        }
        if let Some(clip) = spec.training.grad_clip {
            println!("Gradient clipping: {clip}");
        }
        println!("Output dir: {}", spec.training.output_dir.display());
    }

    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            println!("Configuration Info:");
            println!();
            print_summary(&spec);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}

fn print_eval(summary: &EvalSummary, format: OutputFormat) -> Result<(), String> {
    match format {
        OutputFormat::Text => {
            println!("Samples: {}", summary.samples);
            println!(
                "Position: median {:.3}, mean {:.3}",
                summary.median_position, summary.mean_position
            );
            println!(
                "Orientation: median {:.2}°, mean {:.2}°",
                summary.median_orientation_deg, summary.mean_orientation_deg
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(summary)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(summary)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<(), String> {
    info!(checkpoint = %args.checkpoint.display(), "evaluating checkpoint");

    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    let summary = evaluate_from_spec(&spec, &args.checkpoint)
        .map_err(|e| format!("Evaluation error: {e}"))?;
    print_eval(&summary, args.format)
}
