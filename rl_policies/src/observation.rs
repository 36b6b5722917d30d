//! Image observation layout and conversion.
//!
//! Environments hand out frames as `u8` pixels in NHWC order. Burn's
//! convolutions want NCHW floats, so the scaling step also permutes.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Shape of a single image observation (height, width, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSpace {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ObservationSpace {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// 64x64 RGB frames.
    pub fn rgb64() -> Self {
        Self::new(64, 64, 3)
    }

    /// Number of values in one frame.
    pub fn frame_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// NHWC dims for a batch of frames.
    pub fn batch_dims(&self, batch: usize) -> [usize; 4] {
        [batch, self.height, self.width, self.channels]
    }

    /// Check a non-empty NHWC observation tensor against this space.
    pub fn check<B: Backend>(&self, images: &Tensor<B, 4>) -> Result<usize, PolicyError> {
        let dims = images.dims();
        if dims[0] == 0 || dims[1..] != [self.height, self.width, self.channels] {
            return Err(PolicyError::ShapeMismatch {
                what: "observation",
                expected: self.batch_dims(dims[0].max(1)).to_vec(),
                actual: dims.to_vec(),
            });
        }
        Ok(dims[0])
    }
}

/// Build a NHWC float tensor from raw `u8` frames.
pub fn frames_to_tensor<B: Backend>(
    frames: &[u8],
    batch: usize,
    space: &ObservationSpace,
    device: &B::Device,
) -> Result<Tensor<B, 4>, PolicyError> {
    let expected = batch * space.frame_len();
    if frames.len() != expected {
        return Err(PolicyError::ShapeMismatch {
            what: "frame buffer",
            expected: vec![expected],
            actual: vec![frames.len()],
        });
    }
    let values: Vec<f32> = frames.iter().map(|&p| p as f32).collect();
    let data = TensorData::new(values, space.batch_dims(batch));
    Ok(Tensor::from_data(data, device))
}

/// Cast to `[0, 1]` and move channels first: NHWC `[0, 255]` -> NCHW.
pub fn scale_images<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    images.permute([0, 3, 1, 2]).div_scalar(255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_frames_to_tensor_shape() {
        let device = Default::default();
        let space = ObservationSpace::new(4, 5, 3);
        let frames = vec![7u8; 2 * space.frame_len()];

        let images = frames_to_tensor::<B>(&frames, 2, &space, &device).unwrap();
        assert_eq!(images.dims(), [2, 4, 5, 3]);
        assert_eq!(space.check(&images), Ok(2));
    }

    #[test]
    fn test_frames_length_mismatch() {
        let device = Default::default();
        let space = ObservationSpace::new(2, 2, 3);
        let result = frames_to_tensor::<B>(&[0u8; 11], 1, &space, &device);
        assert!(matches!(result, Err(PolicyError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_scale_images_permutes_and_scales() {
        let device = Default::default();
        // One 1x2 frame with 3 channels: pixel 0 = (0, 51, 255), pixel 1 = (255, 0, 102)
        let space = ObservationSpace::new(1, 2, 3);
        let frames = [0u8, 51, 255, 255, 0, 102];
        let images = frames_to_tensor::<B>(&frames, 1, &space, &device).unwrap();

        let scaled = scale_images(images);
        assert_eq!(scaled.dims(), [1, 3, 1, 2]);

        let values: Vec<f32> = scaled.into_data().to_vec().unwrap();
        let expected = [0.0, 1.0, 0.2, 0.0, 1.0, 0.4];
        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-6, "got {:?}", values);
        }
    }

    #[test]
    fn test_check_rejects_wrong_layout() {
        let device = Default::default();
        let space = ObservationSpace::rgb64();
        let images = Tensor::<B, 4>::zeros([1, 3, 64, 64], &device);
        assert!(space.check(&images).is_err());
    }

    #[test]
    fn test_check_rejects_empty_batch() {
        let device = Default::default();
        let space = ObservationSpace::new(12, 12, 3);
        let images = Tensor::<B, 4>::zeros([0, 12, 12, 3], &device);
        assert!(matches!(
            space.check(&images),
            Err(PolicyError::ShapeMismatch { what: "observation", .. })
        ));
    }
}
