use super::{discriminator::Discriminator, generator::Generator, perceptual::PerceptualExtractor};
use crate::{common::*, config::ModelConfig, data::FrameQuad, params, pretrained::Vgg16Weights, utils};

const GENERATOR_FILE: &str = "generator.ot";
const DISCRIMINATOR_FILE: &str = "discriminator.ot";
const IMAGE_ENCODER_PREFIX: &str = "f_img";
const PERCEPTUAL_PREFIX: &str = "perceptual";

/// Architecture and optional components of the model.
#[derive(Debug, Clone)]
pub struct ModelInit {
    pub frame_channels: i64,
    pub pose_channels: i64,
    pub frame_size: i64,
    pub width: f64,
    /// build the frozen perceptual extractor
    pub use_feat: bool,
    /// load pretrained weights into the generator's image encoder
    pub pretrained: bool,
    pub vgg16_weights: Option<PathBuf>,
}

impl ModelInit {
    pub fn new(frame_channels: i64, pose_channels: i64) -> Self {
        Self {
            frame_channels,
            pose_channels,
            frame_size: params::FRAME_SIZE,
            width: 1.0,
            use_feat: false,
            pretrained: false,
            vgg16_weights: None,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            frame_channels: config.frame_channels(),
            pose_channels: config.pose_channels.get() as i64,
            frame_size: config.frame_size as i64,
            width: config.width,
            use_feat: config.use_feat,
            pretrained: config.pretrained,
            vgg16_weights: config.vgg16_weights.clone(),
        }
    }

    pub fn build(self, device: Device) -> Fallible<PoseTransferModel> {
        let Self {
            frame_channels,
            pose_channels,
            frame_size,
            width,
            use_feat,
            pretrained,
            vgg16_weights,
        } = self;

        ensure!(
            frame_size > 0 && frame_size % params::SPATIAL_STRIDE == 0,
            "frame size {} is not a positive multiple of {}",
            frame_size,
            params::SPATIAL_STRIDE
        );

        let gen_vs = VarStore::new(device);
        let (generator, step_var) = {
            let root = gen_vs.root();
            let generator = Generator::new(&root, frame_channels, pose_channels, width);
            let mut step_var = root.zeros_no_train("step", &[]);
            // integer storage keeps large steps exact
            let int_step = step_var.to_kind(Kind::Int64);
            tch::no_grad(|| step_var.set_data(&int_step));
            (generator, step_var)
        };

        let disc_vs = VarStore::new(device);
        let discriminator = Discriminator::new(
            &disc_vs.root(),
            frame_channels,
            pose_channels,
            frame_size,
            width,
        );

        let perceptual = use_feat.then(|| {
            let vs = VarStore::new(device);
            let extractor = PerceptualExtractor::new(&vs.root() / PERCEPTUAL_PREFIX);
            (vs, extractor)
        });

        let weights = if use_feat || pretrained {
            let path = vgg16_weights.ok_or_else(|| {
                format_err!("pretrained weights are required by use_feat or pretrained")
            })?;
            Some(Vgg16Weights::open(path)?)
        } else {
            None
        };

        if let Some(weights) = &weights {
            if pretrained {
                weights.assign(&gen_vs, IMAGE_ENCODER_PREFIX, &params::ENCODER_PRETRAINED_LAYERS)?;
                info!("initialized image encoder from pretrained weights");
            }
        }

        let perceptual = match (perceptual, &weights) {
            (Some((mut vs, extractor)), Some(weights)) => {
                let layers = params::PERCEPTUAL_LAYERS
                    .iter()
                    .map(|&(name, _, _)| name)
                    .collect::<Vec<_>>();
                weights.assign(&vs, PERCEPTUAL_PREFIX, &layers)?;
                vs.freeze();
                info!("initialized perceptual extractor from pretrained weights");
                Some(PerceptualState { vs, extractor })
            }
            _ => None,
        };

        Ok(PoseTransferModel {
            gen_vs,
            disc_vs,
            generator,
            discriminator,
            perceptual,
            frame_channels,
            pose_channels,
            frame_size,
            step_var,
        })
    }
}

#[derive(Debug)]
pub struct PerceptualState {
    pub vs: VarStore,
    pub extractor: PerceptualExtractor,
}

/// Generator, discriminator and the optional perceptual extractor, each in its own var store.
#[derive(Debug)]
pub struct PoseTransferModel {
    pub gen_vs: VarStore,
    pub disc_vs: VarStore,
    pub generator: Generator,
    pub discriminator: Discriminator,
    pub perceptual: Option<PerceptualState>,
    frame_channels: i64,
    pose_channels: i64,
    frame_size: i64,
    step_var: Tensor,
}

/// Discriminator outputs for one normalized quadruple.
#[derive(Debug)]
pub struct DiscriminatorScores {
    pub real: Tensor,
    pub generated: Tensor,
    pub mismatched: Tensor,
}

impl PoseTransferModel {
    pub fn device(&self) -> Device {
        self.gen_vs.device()
    }

    /// Verifies that a quadruple matches the frame size and channel counts of the model.
    pub fn check_input(&self, input: &FrameQuad) -> Fallible<()> {
        input.check()?;
        let size = self.frame_size;
        for (name, tensor, channels) in [
            ("f_t", &input.f_t, self.frame_channels),
            ("p_t", &input.p_t, self.pose_channels),
            ("f_t_n", &input.f_t_n, self.frame_channels),
            ("p_t_n", &input.p_t_n, self.pose_channels),
        ] {
            let (_b, h, w, c) = tensor.size4()?;
            ensure!(
                (h, w, c) == (size, size, channels),
                "{} has shape {}x{}x{}, but the model expects {}x{}x{}",
                name,
                h,
                w,
                c,
                size,
                size,
                channels
            );
        }
        Ok(())
    }

    /// Predicts normalized target frames from a normalized quadruple.
    pub fn generate(&self, input: &FrameQuad, train: bool) -> Tensor {
        self.generator
            .forward_t(&input.f_t, &input.p_t, &input.p_t_n, train)
    }

    /// Scores the real `(f_t_n, p_t_n)`, generated `(predicted, p_t_n)` and mismatched
    /// `(f_t, p_t_n)` pairs with the same discriminator parameters.
    pub fn score(&self, input: &FrameQuad, predicted: &Tensor, train: bool) -> DiscriminatorScores {
        let disc = &self.discriminator;
        DiscriminatorScores {
            real: disc.forward_t(&input.f_t_n, &input.p_t_n, train),
            generated: disc.forward_t(predicted, &input.p_t_n, train),
            mismatched: disc.forward_t(&input.f_t, &input.p_t_n, train),
        }
    }

    /// Perceptual features of the target and predicted frames if the extractor is enabled.
    ///
    /// Both inputs are normalized NHWC frames.
    pub fn perceptual_features(&self, target: &Tensor, predicted: &Tensor) -> Option<(Tensor, Tensor)> {
        self.perceptual.as_ref().map(|state| {
            let target_features = state.extractor.forward(&utils::denormalize(target));
            let predicted_features = state.extractor.forward(&utils::denormalize(predicted));
            (target_features, predicted_features)
        })
    }

    /// Saves generator and discriminator parameters together with the step to a directory.
    pub fn save(&self, dir: impl AsRef<Path>, step: usize) -> Fallible<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut step_var = self.step_var.shallow_clone();
        tch::no_grad(|| step_var.copy_(&Tensor::from(step as i64)));

        self.gen_vs.save(dir.join(GENERATOR_FILE))?;
        self.disc_vs.save(dir.join(DISCRIMINATOR_FILE))?;
        Ok(())
    }

    /// Restores parameters saved by [PoseTransferModel::save] and returns the saved step.
    pub fn load(&mut self, dir: impl AsRef<Path>) -> Fallible<usize> {
        let dir = dir.as_ref();
        self.gen_vs.load(dir.join(GENERATOR_FILE))?;
        self.disc_vs.load(dir.join(DISCRIMINATOR_FILE))?;

        let step = self.step_var.int64_value(&[]);
        ensure!(step >= 0, "invalid step {} in checkpoint", step);
        Ok(step as usize)
    }
}
