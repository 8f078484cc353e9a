//! Integration tests for the autograd engine.
//!
//! Covers tensor basics and gradients of the operations the pose and
//! distillation losses are built from.

use posekd::autograd::{backward, Context, Tensor};

#[test]
fn test_tensor_creation_from_vec() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
    assert_eq!(t.data().len(), 3);
    assert!((t.data()[0] - 1.0).abs() < 1e-6);
    assert!((t.data()[1] - 2.0).abs() < 1e-6);
    assert!((t.data()[2] - 3.0).abs() < 1e-6);
}

#[test]
fn test_tensor_zeros() {
    let t = Tensor::zeros(5, true);
    assert_eq!(t.data().len(), 5);
    for i in 0..5 {
        assert!((t.data()[i]).abs() < 1e-6);
    }
}

#[test]
fn test_tensor_ones() {
    let t = Tensor::ones(4, true);
    assert_eq!(t.data().len(), 4);
    for i in 0..4 {
        assert!((t.data()[i] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_tensor_requires_grad() {
    let t_grad = Tensor::from_vec(vec![1.0], true);
    assert!(t_grad.requires_grad());

    let t_no_grad = Tensor::from_vec(vec![1.0], false);
    assert!(!t_no_grad.requires_grad());
}

#[test]
fn test_tensor_zero_grad() {
    let t = Tensor::from_vec(vec![2.0], true);

    // Set a grad
    t.set_grad(ndarray::Array1::from(vec![5.0]));
    assert!(t.grad().is_some());

    // Zero grad
    t.zero_grad();
    assert!(t.grad().is_none());
}

#[test]
fn test_tensor_grad_accumulation() {
    let t = Tensor::from_vec(vec![1.0, 2.0], true);

    // First grad
    t.accumulate_grad(ndarray::Array1::from(vec![1.0, 1.0]));

    // Second grad
    t.accumulate_grad(ndarray::Array1::from(vec![2.0, 3.0]));

    let grad = t.grad().expect("should have grad");
    assert!((grad[0] - 3.0).abs() < 1e-6);
    assert!((grad[1] - 4.0).abs() < 1e-6);
}

#[test]
fn test_backward_initializes_grad() {
    let mut t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
    backward(&mut t, None);

    let grad = t.grad().expect("should have grad after backward");
    // Should be initialized to ones
    assert_eq!(grad.len(), 3);
    for i in 0..3 {
        assert!((grad[i] - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_backward_with_custom_grad() {
    let mut t = Tensor::from_vec(vec![1.0, 2.0], true);
    let custom_grad = ndarray::Array1::from(vec![0.5, 0.5]);
    backward(&mut t, Some(custom_grad));

    let grad = t.grad().expect("should have grad");
    assert!((grad[0] - 0.5).abs() < 1e-6);
    assert!((grad[1] - 0.5).abs() < 1e-6);
}

#[test]
fn test_context_training_mode() {
    let ctx = Context::new();
    assert!(ctx.is_training());
}

#[test]
fn test_tensor_len() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0], true);
    assert_eq!(t.len(), 5);
    assert!(!t.is_empty());

    let empty = Tensor::zeros(0, true);
    assert!(empty.is_empty());
}

#[test]
fn test_context_inference_disables_grad() {
    let ctx = Context::inference();
    assert!(!ctx.is_training());
    assert!(!ctx.grad_enabled());

    let train = Context::new();
    assert!(train.grad_enabled());
    train.no_grad(|inner| {
        assert!(inner.is_training());
        assert!(!inner.grad_enabled());
    });
}

#[test]
fn test_mse_gradient_through_linear_map() {
    use posekd::autograd::{matmul, mse};

    // pred = x · w with x = [1, 2] (1×2) and w = [0.5, -1] (2×1)
    let x = Tensor::from_vec(vec![1.0, 2.0], false);
    let w = Tensor::from_vec(vec![0.5, -1.0], true);
    let target = Tensor::from_vec(vec![0.0], false);
    let pred = matmul(&x, &w, 1, 2, 1);
    assert!((pred.data()[0] + 1.5).abs() < 1e-6);

    let mut loss = mse(&pred, &target);
    backward(&mut loss, None);

    // dL/dw = 2 · pred · x
    let grad = w.grad().expect("weights should have grad");
    assert!((grad[0] + 3.0).abs() < 1e-5);
    assert!((grad[1] + 6.0).abs() < 1e-5);
}

#[test]
fn test_softmax_rows_sum_to_one() {
    use posekd::autograd::softmax_rows;

    let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, -1.0, 0.0, 1.0], false);
    let p = softmax_rows(&x, 2, 3);
    for row in p.data().as_slice().unwrap().chunks(3) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_kl_of_identical_distributions_is_zero() {
    use posekd::autograd::{kl_div_batchmean, log_softmax_rows, softmax_rows};

    let logits = Tensor::from_vec(vec![0.3, -0.2, 1.1, 0.0], true);
    let target = softmax_rows(&Tensor::from_vec(vec![0.3, -0.2, 1.1, 0.0], false), 2, 2);
    let log_q = log_softmax_rows(&logits, 2, 2);
    let mut kl = kl_div_batchmean(&log_q, &target, 2, 2);
    assert!(kl.item().abs() < 1e-6);

    backward(&mut kl, None);
    let grad = logits.grad().expect("logits should have grad");
    assert!(grad.iter().all(|g| g.abs() < 1e-5));
}
