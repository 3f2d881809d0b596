use crate::{common::*, params, utils};

/// First three blocks of VGG16, used as a fixed feature space for the perceptual loss.
///
/// The parameters are expected to live in a frozen var store and be loaded from
/// pretrained weights. The input is a NHWC RGB (or gray) frame in [0, 255].
#[derive(Debug)]
pub struct PerceptualExtractor {
    convs: Vec<nn::Conv2D>,
}

impl PerceptualExtractor {
    pub fn new<'p, P>(path: P) -> PerceptualExtractor
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let conv_config = ConvConfig {
            stride: 1,
            padding: 1,
            ..Default::default()
        };

        let convs = params::PERCEPTUAL_LAYERS
            .iter()
            .map(|&(name, in_c, out_c)| nn::conv2d(path / name, in_c, out_c, 3, conv_config))
            .collect();

        PerceptualExtractor { convs }
    }

    pub fn forward(&self, frames: &Tensor) -> Tensor {
        let frames = if frames.size()[3] == 1 {
            frames.repeat(&[1, 1, 1, 3])
        } else {
            frames.shallow_clone()
        };

        // RGB to BGR and subtract the channel means
        let [blue_mean, green_mean, red_mean] = params::VGG_MEAN;
        let bgr = Tensor::cat(
            &[
                frames.narrow(3, 2, 1) - blue_mean,
                frames.narrow(3, 1, 1) - green_mean,
                frames.narrow(3, 0, 1) - red_mean,
            ],
            3,
        );
        let net = utils::to_channel_first(&bgr);

        // pool after conv1_2 and conv2_2, no activation after conv3_3
        let last_index = self.convs.len() - 1;
        self.convs
            .iter()
            .enumerate()
            .fold(net, |net, (index, conv)| {
                let net = net.apply(conv);
                match index {
                    1 | 3 => net
                        .relu()
                        .max_pool2d(&[2, 2], &[2, 2], &[0, 0], &[1, 1], false),
                    _ if index == last_index => net,
                    _ => net.relu(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perceptual_features_shape() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let extractor = PerceptualExtractor::new(&vs.root() / "perceptual");

        let frames = Tensor::rand(&[2, 32, 32, 1], (Kind::Float, Device::Cpu)) * 255.0;
        let features = tch::no_grad(|| extractor.forward(&frames));
        assert_eq!(features.size(), vec![2, 256, 8, 8]);
    }

    #[test]
    fn frozen_extractor_passes_gradient_to_input() {
        tch::manual_seed(0);
        let mut vs = VarStore::new(Device::Cpu);
        let extractor = PerceptualExtractor::new(&vs.root() / "perceptual");
        vs.freeze();
        assert!(vs
            .trainable_variables()
            .iter()
            .all(|var| !var.requires_grad()));

        let frames = (Tensor::rand(&[1, 16, 16, 3], (Kind::Float, Device::Cpu)) * 255.0)
            .set_requires_grad(true);
        extractor.forward(&frames).sum(Kind::Float).backward();

        let grad = frames.grad();
        assert!(grad.defined());
        assert!(grad.abs().sum(Kind::Float).double_value(&[]) > 0.0);
    }
}
