use super::encoder::VggTower;
use crate::{common::*, params, utils};

/// Scores (frame, pose) pairs for realism.
///
/// A single instance owns all parameters; calling [Discriminator::forward_t]
/// repeatedly on real, generated and mismatched pairs reuses the same weights.
#[derive(Debug)]
pub struct Discriminator {
    tower: VggTower,
    fc7: nn::Linear,
    fc8: nn::Linear,
}

impl Discriminator {
    pub fn new<'p, P>(
        path: P,
        frame_channels: i64,
        pose_channels: i64,
        frame_size: i64,
        width: f64,
    ) -> Discriminator
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let tower = VggTower::new(path / "tower", frame_channels + pose_channels, width);
        let feature_size = frame_size / params::SPATIAL_STRIDE;
        let flat_dim = tower.out_channels() * feature_size * feature_size;

        let fc7 = nn::linear(path / "fc7", flat_dim, params::DISC_HIDDEN, Default::default());
        let fc8 = nn::linear(path / "fc8", params::DISC_HIDDEN, 1, Default::default());

        Discriminator { tower, fc7, fc8 }
    }

    /// Returns realism probabilities of shape `[batch]` for normalized NHWC frames and poses.
    pub fn forward_t(&self, frames: &Tensor, poses: &Tensor, train: bool) -> Tensor {
        let concat = utils::to_channel_first(&Tensor::cat(&[frames, poses], 3));
        self.tower
            .forward_t(&concat, train)
            .flatten(1, -1)
            .apply(&self.fc7)
            .relu()
            .dropout(params::DISC_DROPOUT, train)
            .apply(&self.fc8)
            .sigmoid()
            .view([-1])
    }
}
