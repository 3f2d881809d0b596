use crate::{common::*, utils};

/// The training unit: source frame and pose, target frame and pose.
///
/// All tensors are channel-last, `[batch, height, width, channels]`.
#[derive(Debug, TensorLike)]
pub struct FrameQuad {
    pub f_t: Tensor,
    pub p_t: Tensor,
    pub f_t_n: Tensor,
    pub p_t_n: Tensor,
}

impl FrameQuad {
    pub fn new(f_t: Tensor, p_t: Tensor, f_t_n: Tensor, p_t_n: Tensor) -> Fallible<Self> {
        let quad = Self {
            f_t,
            p_t,
            f_t_n,
            p_t_n,
        };
        quad.check()?;
        Ok(quad)
    }

    /// Verifies that the four tensors are 4D and share the batch size and spatial size.
    pub fn check(&self) -> Fallible<()> {
        let (batch_size, height, width, _c) = self.f_t.size4()?;
        for (name, tensor) in [
            ("p_t", &self.p_t),
            ("f_t_n", &self.f_t_n),
            ("p_t_n", &self.p_t_n),
        ] {
            let (b, h, w, _c) = tensor.size4()?;
            ensure!(
                b == batch_size,
                "batch size of {} is {}, but f_t has {}",
                name,
                b,
                batch_size
            );
            ensure!(
                (h, w) == (height, width),
                "{} is {}x{}, but f_t is {}x{}",
                name,
                h,
                w,
                height,
                width
            );
        }
        Ok(())
    }

    pub fn batch_size(&self) -> i64 {
        self.f_t.size()[0]
    }

    /// Maps every member from [0, 255] to [-1, 1].
    pub fn normalize(&self) -> Self {
        Self {
            f_t: utils::normalize(&self.f_t),
            p_t: utils::normalize(&self.p_t),
            f_t_n: utils::normalize(&self.f_t_n),
            p_t_n: utils::normalize(&self.p_t_n),
        }
    }

    /// Selects the `index`-th sample of the batch, keeping the batch dimension.
    pub fn sample(&self, index: i64) -> Self {
        Self {
            f_t: self.f_t.narrow(0, index, 1),
            p_t: self.p_t.narrow(0, index, 1),
            f_t_n: self.f_t_n.narrow(0, index, 1),
            p_t_n: self.p_t_n.narrow(0, index, 1),
        }
    }
}

/// A slice of the validation set used for sample predictions.
#[derive(Debug)]
pub struct ValBatch {
    pub action: String,
    pub video_names: Vec<String>,
    pub quad: FrameQuad,
}

/// Whole videos of one action.
///
/// Each video is `[frames, height, width, channels]` and each pose sequence
/// `[frames, height, width, pose_channels]`.
#[derive(Debug)]
pub struct TestBatch {
    pub action: String,
    pub video_names: Vec<String>,
    pub videos: Vec<Tensor>,
    pub poses: Vec<Tensor>,
}

/// One predicted sample, every tensor is `[height, width, channels]` in [0, 255].
#[derive(Debug)]
pub struct ImagePrediction {
    pub video_name: String,
    pub source_frame: Tensor,
    pub source_pose: Tensor,
    pub target_frame: Tensor,
    pub target_pose: Tensor,
    pub predicted: Tensor,
}
