use super::{decoder::FrameDecoder, encoder::VggTower};
use crate::{common::*, utils};

/// Predicts the target frame by applying the pose difference to the image features.
///
/// `latent = f_img(f_t) + f_pose(p_t_n) - f_pose(p_t)`, where both pose terms
/// go through the same `f_pose` parameters.
#[derive(Debug)]
pub struct Generator {
    f_img: VggTower,
    f_pose: VggTower,
    f_dec: FrameDecoder,
}

impl Generator {
    pub fn new<'p, P>(path: P, frame_channels: i64, pose_channels: i64, width: f64) -> Generator
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let f_img = VggTower::new(path / "f_img", frame_channels, width);
        let f_pose = VggTower::new(path / "f_pose", pose_channels, width);
        let f_dec = FrameDecoder::new(path / "f_dec", f_img.out_channels(), frame_channels, width);

        Generator {
            f_img,
            f_pose,
            f_dec,
        }
    }

    /// Computes the NCHW latent code from normalized NHWC inputs.
    pub fn latent(&self, f_t: &Tensor, p_t: &Tensor, p_t_n: &Tensor, train: bool) -> Tensor {
        let image_features = self.f_img.forward_t(&utils::to_channel_first(f_t), train);
        let target_pose_features = self.f_pose.forward_t(&utils::to_channel_first(p_t_n), train);
        let source_pose_features = self.f_pose.forward_t(&utils::to_channel_first(p_t), train);
        image_features + target_pose_features - source_pose_features
    }

    /// Decodes a NCHW latent code into a normalized NHWC frame.
    pub fn decode(&self, latent: &Tensor, train: bool) -> Tensor {
        utils::to_channel_last(&self.f_dec.forward_t(latent, train))
    }

    /// Predicts the normalized NHWC target frame from normalized NHWC inputs.
    pub fn forward_t(&self, f_t: &Tensor, p_t: &Tensor, p_t_n: &Tensor, train: bool) -> Tensor {
        let latent = self.latent(f_t, p_t, p_t_n, train);
        self.decode(&latent, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(vs: &VarStore) -> Generator {
        Generator::new(&vs.root() / "generator", 3, 4, 0.125)
    }

    #[test]
    fn prediction_shape_and_range() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let generator = build(&vs);

        let f_t = Tensor::rand(&[2, 32, 32, 3], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let p_t = Tensor::rand(&[2, 32, 32, 4], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let p_t_n = Tensor::rand(&[2, 32, 32, 4], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;

        let predicted = tch::no_grad(|| generator.forward_t(&f_t, &p_t, &p_t_n, false));
        assert_eq!(predicted.size(), vec![2, 32, 32, 3]);
        assert!(predicted.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn single_pose_encoder() {
        let vs = VarStore::new(Device::Cpu);
        let _generator = build(&vs);

        let variables = vs.variables();
        let count = |prefix: &str| {
            variables
                .keys()
                .filter(|name| name.starts_with(prefix))
                .count()
        };
        assert_eq!(count("generator.f_img."), 20);
        assert_eq!(count("generator.f_pose."), 20);
        assert_eq!(count("generator.f_dec."), 22);
        assert_eq!(variables.len(), 62);
    }

    #[test]
    fn identical_poses_cancel() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let generator = build(&vs);

        let f_t = Tensor::rand(&[1, 32, 32, 3], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        let pose = Tensor::rand(&[1, 32, 32, 4], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;

        let image_only = |generator: &Generator| {
            generator
                .f_img
                .forward_t(&utils::to_channel_first(&f_t), false)
        };

        tch::no_grad(|| {
            let latent = generator.latent(&f_t, &pose, &pose, false);
            let expect = image_only(&generator);
            let diff = (&latent - &expect).abs().max().double_value(&[]);
            let scale = expect.abs().max().double_value(&[]) + 1.0;
            assert!(diff < 1e-5 * scale, "latent differs by {}", diff);
        });

        // perturb a pose encoder weight, both pose terms follow it
        let mut weight = vs.variables()["generator.f_pose.conv1_1.weight"].shallow_clone();
        tch::no_grad(|| {
            let noise = weight.randn_like() * 0.5;
            weight += noise;
        });

        tch::no_grad(|| {
            let latent = generator.latent(&f_t, &pose, &pose, false);
            let expect = image_only(&generator);
            let diff = (&latent - &expect).abs().max().double_value(&[]);
            let scale = expect.abs().max().double_value(&[]) + 1.0;
            assert!(diff < 1e-5 * scale, "latent differs by {}", diff);
        });
    }

    #[test]
    fn pose_encoder_receives_gradient_from_both_poses() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let generator = build(&vs);

        let f_t = Tensor::zeros(&[1, 32, 32, 3], (Kind::Float, Device::Cpu));
        let p_t = Tensor::rand(&[1, 32, 32, 4], (Kind::Float, Device::Cpu));
        let p_t_n = Tensor::rand(&[1, 32, 32, 4], (Kind::Float, Device::Cpu));

        generator
            .latent(&f_t, &p_t, &p_t_n, true)
            .sum(Kind::Float)
            .backward();

        let grad = vs.variables()["generator.f_pose.conv1_1.weight"].grad();
        assert!(grad.defined());
    }
}
