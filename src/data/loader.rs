//! Mini-batch assembly

use super::dataset::PoseDataset;
use crate::network::POSE_DIM;
use crate::train::Batch;
use crate::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Split a dataset into batches of `batch_size` samples
///
/// With `shuffle` the sample order is permuted by a generator seeded with
/// `seed`, so the same seed always yields the same batches. The final batch
/// may be smaller. Batches are centered with the dataset's mean image when it
/// has one.
pub fn batches(
    dataset: &dyn PoseDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(Error::InvalidParameter(
            "batch_size must be > 0".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..dataset.len()).collect();
    if shuffle {
        order.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    let input_dim = dataset.input_dim();
    order
        .chunks(batch_size)
        .map(|indices| {
            let mut images = Vec::with_capacity(indices.len() * input_dim);
            let mut poses = Vec::with_capacity(indices.len() * POSE_DIM);
            let mut paths = Vec::with_capacity(indices.len());
            for &i in indices {
                let sample = dataset.get(i).ok_or_else(|| {
                    Error::InvalidParameter(format!("dataset has no sample {i}"))
                })?;
                images.extend_from_slice(&sample.image);
                poses.extend_from_slice(&sample.pose);
                paths.push(sample.path.clone());
            }

            let rows = indices.len();
            let images = Array2::from_shape_vec((rows, input_dim), images)
                .map_err(|e| Error::InvalidParameter(format!("batch images: {e}")))?;
            let poses = Array2::from_shape_vec((rows, POSE_DIM), poses)
                .map_err(|e| Error::InvalidParameter(format!("batch poses: {e}")))?;

            let mut batch = Batch::new(images, poses, paths)?;
            if let Some(mean) = dataset.mean_image() {
                batch.center(mean)?;
            }
            Ok(batch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InMemoryDataset, PoseSample};

    fn dataset(n: usize) -> InMemoryDataset {
        let samples = (0..n)
            .map(|i| PoseSample {
                path: format!("img{i}.png"),
                image: vec![i as f32, 1.0],
                pose: vec![i as f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            })
            .collect();
        InMemoryDataset::new(samples, None).unwrap()
    }

    #[test]
    fn test_keeps_last_partial_batch() {
        let out = batches(&dataset(5), 2, false, 0).unwrap();
        let sizes: Vec<usize> = out.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(out[2].paths, vec!["img4.png"]);
    }

    #[test]
    fn test_unshuffled_order() {
        let out = batches(&dataset(3), 3, false, 0).unwrap();
        assert_eq!(out[0].images.column(0).to_vec(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let a = batches(&dataset(16), 16, true, 42).unwrap();
        let b = batches(&dataset(16), 16, true, 42).unwrap();
        assert_eq!(a[0].paths, b[0].paths);

        let mut seen: Vec<f32> = a[0].images.column(0).to_vec();
        seen.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(seen, (0..16).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_poses_follow_images() {
        let out = batches(&dataset(8), 4, true, 7).unwrap();
        for batch in &out {
            for row in 0..batch.len() {
                assert_eq!(batch.images[[row, 0]], batch.poses[[row, 0]]);
            }
        }
    }

    #[test]
    fn test_mean_image_is_subtracted() {
        let ds = dataset(2).with_mean_image(ndarray::array![0.0, 1.0]).unwrap();
        let out = batches(&ds, 2, false, 0).unwrap();
        assert_eq!(out[0].images.column(1).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_zero_batch_size() {
        assert!(batches(&dataset(2), 0, false, 0).is_err());
    }

    #[test]
    fn test_empty_dataset_has_no_batches() {
        let empty = InMemoryDataset::new(vec![], None).unwrap();
        assert!(batches(&empty, 4, true, 0).unwrap().is_empty());
    }
}
