//! Single-command training and evaluation from YAML configuration

use super::schema::{LrPolicy, TrainSpec};
use super::validate::{validate_config, validate_paths};
use crate::data::{batches, load_mean_image, InMemoryDataset, PoseDataset};
use crate::error::{Error, Result};
use crate::io::load_network;
use crate::network::define_network;
use crate::optim::{CosineAnnealingLR, LRScheduler, LinearDecayLR};
use crate::train::{
    evaluate, Batch, EarlyStopping, EvalSummary, ModelOptions, PoseModel, PoseTrainer,
    TrainConfig, TrainResult, LATEST_LABEL,
};
use std::fs;
use std::path::Path;
use tracing::info;

/// Parse and validate a training spec from a YAML string
pub fn parse_config(yaml: &str) -> Result<TrainSpec> {
    let spec: TrainSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;
    validate_config(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    Ok(spec)
}

/// Load training spec from YAML file (without running training)
///
/// Useful for testing config parsing and validation separately from training.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<TrainSpec> {
    let path = config_path.as_ref();
    let yaml_content = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    parse_config(&yaml_content)
}

fn load_dataset(path: &Path, spec: &TrainSpec) -> Result<InMemoryDataset> {
    let mut dataset = InMemoryDataset::from_json(path)?;
    if let Some(mean) = &spec.data.mean_image {
        dataset = dataset.with_mean_image(load_mean_image(mean)?)?;
    }
    dataset.expect_input_dim(spec.data.input_dim)?;
    info!(
        path = %path.display(),
        samples = dataset.len(),
        centered = dataset.mean_image().is_some(),
        "dataset loaded"
    );
    Ok(dataset)
}

fn validation_batches(spec: &TrainSpec) -> Result<Option<Vec<Batch>>> {
    spec.data
        .val
        .as_ref()
        .map(|path| {
            let dataset = load_dataset(path, spec)?;
            batches(&dataset, spec.data.batch_size, false, 0)
        })
        .transpose()
}

/// Learning-rate schedule selected by `training.lr_policy`
pub fn build_scheduler(spec: &TrainSpec) -> Box<dyn LRScheduler> {
    let lr = spec.optimizer.lr;
    let training = &spec.training;
    match training.lr_policy {
        LrPolicy::Linear => Box::new(LinearDecayLR::new(
            lr,
            training.epochs.saturating_sub(training.niter_decay),
            training.niter_decay,
        )),
        LrPolicy::Cosine => Box::new(CosineAnnealingLR::new(lr, training.epochs, 0.0)),
    }
}

/// Run a validated spec: load data, build the model and train it
///
/// The student is checkpointed as `latest` when training ends.
pub fn train_from_spec(spec: &TrainSpec) -> Result<TrainResult> {
    validate_paths(spec).map_err(|e| Error::ConfigError(e.to_string()))?;

    let train_set = load_dataset(&spec.data.train, spec)?;
    let val = validation_batches(spec)?;
    let model = PoseModel::from_spec(spec)?;

    let training = &spec.training;
    let config = TrainConfig::new()
        .with_log_interval(training.log_every)
        .with_save_every(training.save_every)
        .with_save_best(val.is_some());
    let mut trainer = PoseTrainer::new(model, config).with_scheduler(build_scheduler(spec));
    if let Some(patience) = training.patience {
        trainer.add_callback(EarlyStopping::new(patience, 0.0).monitor_validation());
    }

    let batch_size = spec.data.batch_size;
    let shuffle = spec.data.shuffle;
    let seed = training.seed;
    let result = trainer.train(
        training.epochs,
        |epoch| batches(&train_set, batch_size, shuffle, seed.wrapping_add(epoch as u64)),
        val.as_deref(),
    )?;

    info!(
        epochs = result.final_epoch,
        final_loss = result.final_loss,
        checkpoint = LATEST_LABEL,
        "training complete"
    );
    Ok(result)
}

/// Train a model from YAML configuration file
///
/// This is the main entry point for declarative training. It:
/// 1. Loads, parses and validates the YAML config
/// 2. Checks that every referenced file exists
/// 3. Builds the student (and loads the teacher when distilling)
/// 4. Runs the training loop
/// 5. Saves the final student
///
/// # Example
///
/// ```no_run
/// use posekd::config::train_from_yaml;
///
/// let result = train_from_yaml("config.yaml")?;
/// println!("final loss {:.4}", result.final_loss);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn train_from_yaml<P: AsRef<Path>>(config_path: P) -> Result<TrainResult> {
    train_from_spec(&load_config(config_path)?)
}

/// Evaluate a student checkpoint on the validation set (or the training set
/// when no validation set is configured)
pub fn evaluate_from_spec(spec: &TrainSpec, checkpoint: &Path) -> Result<EvalSummary> {
    let data = spec.data.val.as_ref().unwrap_or(&spec.data.train);
    let dataset = load_dataset(data, spec)?;
    let eval_batches = batches(&dataset, spec.data.batch_size, false, 0)?;

    let mut student = define_network(&spec.model.student, spec.data.input_dim, spec.training.seed)?;
    let metadata = load_network(student.as_mut(), checkpoint)?;
    info!(checkpoint = %checkpoint.display(), label = %metadata.label, "student restored");

    let mut model = PoseModel::new(student, None, ModelOptions::from_spec(spec))?;
    let summary = evaluate(&mut model, &eval_batches)?;
    info!(
        samples = summary.samples,
        median_position = summary.median_position,
        median_orientation_deg = summary.median_orientation_deg,
        "evaluation complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PoseSample;
    use crate::io::{network_filename, save_network, CheckpointFormat};
    use crate::network::NetworkSpec;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const INPUT: usize = 4;

    fn write_dataset(dir: &Path, name: &str, n: usize) -> std::path::PathBuf {
        let samples: Vec<PoseSample> = (0..n)
            .map(|i| PoseSample {
                path: format!("img{i}.png"),
                image: (0..INPUT).map(|j| ((i * INPUT + j) as f32 * 0.4).sin()).collect(),
                pose: vec![i as f32 * 0.1, 0.2, -0.1, 1.0, 0.0, 0.05 * i as f32, 0.0],
            })
            .collect();
        let path = dir.join(name);
        let json = serde_json::json!({ "samples": samples });
        fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        path
    }

    fn spec_yaml(dir: &Path, extra: &str) -> String {
        format!(
            r#"
model:
  student:
    hidden: [6, 4]
data:
  train: {train}
  batch_size: 3
  input_dim: {INPUT}
optimizer:
  lr: 0.01
  eps: 1.0e-8
  weight_decay: 0.0
training:
  epochs: 3
  beta: 1.0
  save_every: 0
  output_dir: {out}
{extra}"#,
            train = dir.join("train.json").display(),
            out = dir.join("out").display(),
        )
    }

    #[test]
    fn test_load_valid_config() {
        let yaml = r#"
model:
  student:
    hidden: [8]

data:
  train: train.json
  batch_size: 8
  input_dim: 16

optimizer:
  lr: 0.001
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let spec = load_config(temp_file.path()).unwrap();
        assert_eq!(spec.optimizer.lr, 0.001);
        assert_eq!(spec.data.batch_size, 8);
    }

    #[test]
    fn test_load_invalid_config() {
        let yaml = r#"
model:
  student:
    hidden: [8]

data:
  train: train.json
  batch_size: 0
  input_dim: 16
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        assert!(matches!(
            load_config(temp_file.path()),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"this is not valid yaml: [}")
            .unwrap();

        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(load_config("/nonexistent/posekd.yaml").is_err());
    }

    #[test]
    fn test_scheduler_follows_policy() {
        let dir = TempDir::new().unwrap();
        let mut spec = parse_config(&spec_yaml(dir.path(), "  niter_decay: 2\n")).unwrap();

        let mut linear = build_scheduler(&spec);
        assert_eq!(linear.get_lr(), 0.01);
        linear.step();
        linear.step();
        assert!((linear.get_lr() - 0.005).abs() < 1e-6);

        spec.training.lr_policy = LrPolicy::Cosine;
        let mut cosine = build_scheduler(&spec);
        for _ in 0..3 {
            cosine.step();
        }
        assert_eq!(cosine.get_lr(), 0.0);
    }

    #[test]
    fn test_train_from_yaml_writes_latest() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), "train.json", 7);
        let config = dir.path().join("config.yaml");
        fs::write(&config, spec_yaml(dir.path(), "")).unwrap();

        let result = train_from_yaml(&config).unwrap();
        assert_eq!(result.final_epoch, 3);
        assert!(result.final_loss.is_finite());
        assert!(dir.path().join("out/latest_net_G.json").exists());
    }

    #[test]
    fn test_train_missing_data_is_config_error() {
        let dir = TempDir::new().unwrap();
        let spec = parse_config(&spec_yaml(dir.path(), "")).unwrap();
        assert!(matches!(train_from_spec(&spec), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_train_with_teacher_and_validation() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), "train.json", 6);
        let val = write_dataset(dir.path(), "val.json", 4);

        let teacher_spec = NetworkSpec {
            arch: "mlp".to_string(),
            hidden: vec![10, 8],
            dropout: 0.0,
        };
        let teacher = define_network(&teacher_spec, INPUT, 5).unwrap();
        let weights = save_network(
            teacher.as_ref(),
            dir.path().join("teacher"),
            "latest",
            "G",
            CheckpointFormat::Json,
        )
        .unwrap();

        let mut spec = parse_config(&spec_yaml(dir.path(), "")).unwrap();
        spec.data.val = Some(val);
        spec.model.teacher = Some(crate::config::TeacherSpec {
            network: teacher_spec,
            weights,
        });
        spec.distill = Some(
            serde_yaml::from_str("hint_modules: [1]\ncs_modules: [0]\n").unwrap(),
        );
        validate_config(&spec).unwrap();

        let result = train_from_spec(&spec).unwrap();
        let validation = result.validation.unwrap();
        assert_eq!(validation.samples, 4);
        assert!(dir.path().join("out/best_net_G.json").exists());
        assert!(dir
            .path()
            .join("out/latest_net_hint_adapters.json")
            .exists());
    }

    #[test]
    fn test_student_init_reproduces_source_network() {
        let dir = TempDir::new().unwrap();
        let mut spec = parse_config(&spec_yaml(dir.path(), "")).unwrap();
        let source = define_network(&spec.model.student, INPUT, 97).unwrap();
        let init = save_network(
            source.as_ref(),
            dir.path().join("pretrained"),
            "latest",
            "G",
            CheckpointFormat::Json,
        )
        .unwrap();

        let images = crate::Tensor::from_vec(
            (0..2 * INPUT).map(|i| (i as f32 * 0.7).cos()).collect(),
            false,
        );
        let predict = |net: &dyn crate::network::PoseNetwork| -> Vec<f32> {
            let ctx = crate::autograd::Context::inference();
            let out = net.forward(&images, 2, &ctx).unwrap();
            out.position
                .data()
                .iter()
                .chain(out.orientation.data().iter())
                .copied()
                .collect()
        };
        let expected = predict(source.as_ref());

        let random = PoseModel::from_spec(&spec).unwrap();
        assert_ne!(predict(random.student()), expected);

        spec.model.student_init = Some(init);
        let model = PoseModel::from_spec(&spec).unwrap();
        for (a, b) in predict(model.student()).iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    }

    #[test]
    fn test_evaluate_checkpoint() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), "train.json", 5);
        let spec = parse_config(&spec_yaml(dir.path(), "")).unwrap();
        train_from_spec(&spec).unwrap();

        let checkpoint = dir
            .path()
            .join("out")
            .join(network_filename("latest", "G", CheckpointFormat::Json));
        let summary = evaluate_from_spec(&spec, &checkpoint).unwrap();
        assert_eq!(summary.samples, 5);
        assert!(summary.mean_position >= 0.0);
        assert!(summary.median_orientation_deg <= 180.0);
    }
}
