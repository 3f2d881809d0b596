use crate::common::*;

#[derive(Debug, Clone, Copy)]
struct DeconvLayer {
    name: &'static str,
    depth: i64,
    stride: i64,
}

/// Decoder layers from the deepest to the output layer.
///
/// Depths are in units of the unscaled vgg depths and the last entry is
/// replaced by the frame channels.
const DECONV_LAYERS: [DeconvLayer; 11] = [
    DeconvLayer { name: "deconv4_4", depth: 512, stride: 2 },
    DeconvLayer { name: "deconv4_3", depth: 512, stride: 1 },
    DeconvLayer { name: "deconv4_2", depth: 512, stride: 1 },
    DeconvLayer { name: "deconv4_1", depth: 256, stride: 2 },
    DeconvLayer { name: "deconv3_3", depth: 256, stride: 1 },
    DeconvLayer { name: "deconv3_2", depth: 256, stride: 1 },
    DeconvLayer { name: "deconv3_1", depth: 128, stride: 2 },
    DeconvLayer { name: "deconv2_2", depth: 128, stride: 1 },
    DeconvLayer { name: "deconv2_1", depth: 64, stride: 2 },
    DeconvLayer { name: "deconv1_2", depth: 64, stride: 1 },
    DeconvLayer { name: "deconv1_1", depth: 0, stride: 1 },
];

const DECONV_KERNEL_SIZE: i64 = 3;

/// Mirror of the vgg tower built from transposed convolutions.
///
/// The four stride-2 layers undo the four poolings of the tower, so a
/// `[B, in_channels, S/16, S/16]` input decodes to `[B, out_channels, S, S]`.
/// The output is bounded to (-1, 1) by tanh.
#[derive(Debug)]
pub struct FrameDecoder {
    in_channels: i64,
    out_channels: i64,
    deconvs: Vec<nn::ConvTranspose2D>,
}

impl FrameDecoder {
    pub fn new<'p, P>(path: P, in_channels: i64, out_channels: i64, width: f64) -> FrameDecoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let last_index = DECONV_LAYERS.len() - 1;

        let (deconvs, _) = DECONV_LAYERS.iter().enumerate().fold(
            (vec![], in_channels),
            |(mut deconvs, prev_depth), (index, layer)| {
                let DeconvLayer {
                    name,
                    depth,
                    stride,
                } = *layer;
                let depth = if index == last_index {
                    out_channels
                } else {
                    (depth as f64 * width) as i64
                };

                // same padding: stride 1 keeps the size, stride 2 doubles it
                let config = ConvTransposeConfig {
                    stride,
                    padding: (DECONV_KERNEL_SIZE - 1) / 2,
                    output_padding: stride - 1,
                    ..Default::default()
                };
                deconvs.push(nn::conv_transpose2d(
                    path / name,
                    prev_depth,
                    depth,
                    DECONV_KERNEL_SIZE,
                    config,
                ));
                (deconvs, depth)
            },
        );

        FrameDecoder {
            in_channels,
            out_channels,
            deconvs,
        }
    }

    pub fn out_channels(&self) -> i64 {
        self.out_channels
    }

    /// Decodes a NCHW latent into a NCHW frame in the normalized range.
    pub fn forward_t(&self, latent: &Tensor, _train: bool) -> Tensor {
        debug_assert_eq!(latent.size()[1], self.in_channels);
        let last_index = self.deconvs.len() - 1;

        self.deconvs
            .iter()
            .enumerate()
            .fold(latent.shallow_clone(), |net, (index, deconv)| {
                let net = net.apply(deconv);
                if index == last_index {
                    net.tanh()
                } else {
                    net.relu()
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_restores_224() {
        tch::manual_seed(0);
        let vs = VarStore::new(Device::Cpu);
        let decoder = FrameDecoder::new(&vs.root() / "f_dec", 512, 3, 0.125);

        let latent = Tensor::randn(&[1, 512, 14, 14], (Kind::Float, Device::Cpu));
        let output = tch::no_grad(|| decoder.forward_t(&latent, false));
        assert_eq!(output.size(), vec![1, 3, 224, 224]);
        assert!(output.abs().max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn decoder_has_eleven_layers() {
        let vs = VarStore::new(Device::Cpu);
        let decoder = FrameDecoder::new(&vs.root() / "f_dec", 512, 1, 0.5);
        assert_eq!(decoder.deconvs.len(), 11);
        assert_eq!(decoder.out_channels(), 1);

        let variables = vs.variables();
        assert_eq!(variables["f_dec.deconv4_4.weight"].size()[0], 512);
        assert_eq!(variables["f_dec.deconv4_4.weight"].size()[1], 256);
        assert_eq!(variables["f_dec.deconv1_1.weight"].size()[1], 1);
    }
}
