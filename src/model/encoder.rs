use crate::{common::*, params};

/// Channel depths of the four tower stages for a width multiplier.
///
/// The last stage is always 512 deep regardless of the multiplier.
pub fn tower_depths(width: f64) -> [i64; 4] {
    let [d1, d2, d3, d4] = params::TOWER_DEPTHS;
    let scale = |depth: i64| (depth as f64 * width) as i64;
    [scale(d1), scale(d2), scale(d3), d4]
}

/// VGG style feature tower: four stages of 3x3 convolutions, each followed by 2x2 max pooling.
#[derive(Debug)]
pub struct VggTower {
    in_channels: i64,
    depths: [i64; 4],
    stages: Vec<Vec<nn::Conv2D>>,
}

impl VggTower {
    pub fn new<'p, P>(path: P, in_channels: i64, width: f64) -> VggTower
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let depths = tower_depths(width);

        let conv_config = ConvConfig {
            stride: 1,
            padding: (params::TOWER_KERNEL_SIZE - 1) / 2,
            ..Default::default()
        };

        let (stages, _) = depths
            .iter()
            .zip(params::TOWER_CONVS.iter())
            .enumerate()
            .fold(
                (vec![], in_channels),
                |(mut stages, prev_depth), (stage_index, (&depth, &num_convs))| {
                    let convs = (0..num_convs)
                        .map(|conv_index| {
                            let in_c = if conv_index == 0 { prev_depth } else { depth };
                            nn::conv2d(
                                path / format!("conv{}_{}", stage_index + 1, conv_index + 1),
                                in_c,
                                depth,
                                params::TOWER_KERNEL_SIZE,
                                conv_config,
                            )
                        })
                        .collect::<Vec<_>>();
                    stages.push(convs);
                    (stages, depth)
                },
            );

        VggTower {
            in_channels,
            depths,
            stages,
        }
    }

    pub fn in_channels(&self) -> i64 {
        self.in_channels
    }

    pub fn out_channels(&self) -> i64 {
        self.depths[3]
    }

    /// Runs the tower on a NCHW tensor.
    pub fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
        debug_assert_eq!(input.size()[1], self.in_channels);

        self.stages.iter().fold(input.shallow_clone(), |net, convs| {
            convs
                .iter()
                .fold(net, |net, conv| net.apply(conv).relu())
                .max_pool2d(&[2, 2], &[2, 2], &[0, 0], &[1, 1], false)
        })
    }
}
