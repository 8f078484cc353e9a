//! End-to-end distillation: pretrain a teacher, save it, then train a
//! smaller student guided by the reloaded teacher.

use ndarray::Array2;
use posekd::config::OptimSpec;
use posekd::distill::{CsLossMode, DistillConfig, FeatureSelection};
use posekd::io::{load_network, CheckpointFormat};
use posekd::network::{MlpPoseNet, PoseNetwork, POSE_DIM};
use posekd::train::{evaluate, Batch, ModelOptions, PoseModel, PoseTrainer, TrainConfig};
use tempfile::TempDir;

const INPUT: usize = 10;

fn batch(n: usize, offset: usize) -> Batch {
    let images = Array2::from_shape_fn((n, INPUT), |(i, j)| {
        (((i + offset) * INPUT + j) as f32 * 0.23).sin()
    });
    let poses = Array2::from_shape_fn((n, POSE_DIM), |(i, j)| match j {
        0..=2 => ((i + offset) as f32 * 0.4 + j as f32).cos(),
        3 => 1.0,
        _ => 0.1 * ((i + offset) as f32).sin(),
    });
    let paths = (0..n).map(|i| format!("frame_{:04}.png", i + offset)).collect();
    Batch::new(images, poses, paths).unwrap()
}

fn data() -> Vec<Batch> {
    vec![batch(4, 0), batch(4, 4)]
}

fn options(dir: &TempDir, distill: DistillConfig) -> ModelOptions {
    ModelOptions {
        optimizer: OptimSpec {
            lr: 0.01,
            weight_decay: 0.0,
            ..OptimSpec::default()
        },
        distill,
        beta: 10.0,
        output_dir: dir.path().to_path_buf(),
        checkpoint_format: CheckpointFormat::Json,
        ..ModelOptions::default()
    }
}

/// Train a wide network on the pose loss alone and save it as `latest`
fn pretrain_teacher(dir: &TempDir) -> std::path::PathBuf {
    let net = MlpPoseNet::new(INPUT, &[16, 12], 0.0, 3).unwrap();
    let model = PoseModel::new(Box::new(net), None, options(dir, DistillConfig::default())).unwrap();
    let mut trainer = PoseTrainer::new(model, TrainConfig::default());
    let batches = data();
    for _ in 0..20 {
        trainer.train_epoch(&batches).unwrap();
    }
    trainer.model().save("latest").unwrap()
}

fn distill_config() -> DistillConfig {
    DistillConfig {
        selection: FeatureSelection {
            hint_modules: vec![1],
            cs_modules: vec![0, 1],
        },
        cs_loss: CsLossMode::Kl,
        ..DistillConfig::default()
    }
}

#[test]
fn test_student_learns_from_reloaded_teacher() {
    let teacher_dir = TempDir::new().unwrap();
    let weights = pretrain_teacher(&teacher_dir);

    let mut teacher = MlpPoseNet::new(INPUT, &[16, 12], 0.0, 99).unwrap();
    let meta = load_network(&mut teacher, &weights).unwrap();
    assert_eq!(meta.label, "latest");
    let teacher_before: Vec<Vec<f32>> = teacher
        .parameters()
        .iter()
        .map(|p| p.data().to_vec())
        .collect();

    let student_dir = TempDir::new().unwrap();
    let student = MlpPoseNet::new(INPUT, &[6, 4], 0.0, 5).unwrap();
    let model = PoseModel::new(
        Box::new(student),
        Some(Box::new(teacher)),
        options(&student_dir, distill_config()),
    )
    .unwrap();
    assert!(model.is_distilling());

    let mut trainer = PoseTrainer::new(model, TrainConfig::default());
    let batches = data();
    let first = trainer.train_epoch(&batches).unwrap();
    assert!(first.feature > 0.0);
    let mut last = first;
    for _ in 0..30 {
        last = trainer.train_epoch(&batches).unwrap();
    }
    assert!(
        last.total < first.total,
        "loss did not decrease: {} -> {}",
        first.total,
        last.total
    );

    let teacher_after: Vec<Vec<f32>> = trainer
        .model()
        .teacher()
        .unwrap()
        .parameters()
        .iter()
        .map(|p| p.data().to_vec())
        .collect();
    assert_eq!(teacher_before, teacher_after);
}

#[test]
fn test_saved_student_reproduces_evaluation() {
    let teacher_dir = TempDir::new().unwrap();
    let weights = pretrain_teacher(&teacher_dir);
    let mut teacher = MlpPoseNet::new(INPUT, &[16, 12], 0.0, 0).unwrap();
    load_network(&mut teacher, &weights).unwrap();

    let dir = TempDir::new().unwrap();
    let student = MlpPoseNet::new(INPUT, &[6, 4], 0.0, 8).unwrap();
    let model = PoseModel::new(
        Box::new(student),
        Some(Box::new(teacher)),
        options(&dir, distill_config()),
    )
    .unwrap();
    let mut trainer = PoseTrainer::new(model, TrainConfig::default());
    let batches = data();
    let result = trainer.train(4, |_| Ok(batches.clone()), None).unwrap();
    assert_eq!(result.final_epoch, 4);
    assert!(dir.path().join("latest_net_G.json").exists());
    assert!(dir.path().join("latest_net_hint_adapters.json").exists());

    let mut model = trainer.into_model();
    let val = vec![batch(3, 20)];
    let trained = evaluate(&mut model, &val).unwrap();

    // A fresh student with the saved weights, without any teacher
    let mut reloaded = MlpPoseNet::new(INPUT, &[6, 4], 0.0, 1234).unwrap();
    load_network(&mut reloaded, dir.path().join("latest_net_G.json")).unwrap();
    let mut plain = PoseModel::new(Box::new(reloaded), None, options(&dir, DistillConfig::default()))
        .unwrap();
    let restored = evaluate(&mut plain, &val).unwrap();

    assert_eq!(trained.samples, 3);
    assert!((trained.mean_position - restored.mean_position).abs() < 1e-5);
    assert!((trained.mean_orientation_deg - restored.mean_orientation_deg).abs() < 1e-3);
}
