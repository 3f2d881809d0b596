use crate::{common::*, params};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub loss: LossConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
    pub dataset: DatasetConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Fallible<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Fallible<()> {
        let ModelConfig {
            width,
            frame_size,
            use_feat,
            pretrained,
            ref vgg16_weights,
            ..
        } = self.model;

        ensure!(
            frame_size > 0 && frame_size as i64 % params::SPATIAL_STRIDE == 0,
            "frame_size must be a positive multiple of {}, but get {}",
            params::SPATIAL_STRIDE,
            frame_size
        );
        ensure!(
            width.is_finite() && (params::TOWER_DEPTHS[0] as f64 * width) >= 1.0,
            "width {} yields an empty first stage",
            width
        );
        ensure!(
            !(use_feat || pretrained) || vgg16_weights.is_some(),
            "model.vgg16_weights must be set when use_feat or pretrained is enabled"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// use single channel frames instead of RGB
    #[serde(default)]
    pub gray: bool,
    /// multiplier on the channel depths of the first three stages
    #[serde(default = "default_width")]
    pub width: f64,
    pub pose_channels: NonZeroUsize,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// enable the perceptual loss term
    #[serde(default)]
    pub use_feat: bool,
    /// load vgg16 weights into the image encoder
    #[serde(default)]
    pub pretrained: bool,
    pub vgg16_weights: Option<PathBuf>,
}

impl ModelConfig {
    pub fn frame_channels(&self) -> i64 {
        if self.gray {
            params::GRAY_CHANNELS
        } else {
            params::COLOR_CHANNELS
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossConfig {
    #[serde(default = "default_coef")]
    pub l2_coef: f64,
    #[serde(default = "default_coef")]
    pub adv_coef: f64,
    #[serde(default = "default_coef")]
    pub feat_coef: f64,
    #[serde(default = "default_coef")]
    pub real_coef: f64,
    #[serde(default = "default_coef")]
    pub gen_coef: f64,
    #[serde(default = "default_coef")]
    pub mismatch_coef: f64,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            l2_coef: 1.0,
            adv_coef: 1.0,
            feat_coef: 1.0,
            real_coef: 1.0,
            gen_coef: 1.0,
            mismatch_coef: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub lr_gen: f64,
    pub lr_disc: f64,
    /// use Adam for the discriminator instead of plain gradient descent
    #[serde(default)]
    pub adam: bool,
    pub batch_size: NonZeroUsize,
    pub max_steps: usize,
    pub disp_interval: NonZeroUsize,
    pub summary_interval: NonZeroUsize,
    pub save_interval: NonZeroUsize,
    #[serde(
        serialize_with = "serialize_device",
        deserialize_with = "deserialize_device",
        default = "default_device"
    )]
    pub device: Device,
    pub resume_from: Option<PathBuf>,
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub train_output_dir: PathBuf,
    pub val_output_dir: PathBuf,
    pub test_output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub dataset_dir: PathBuf,
    /// number of videos per action used for sample predictions
    #[serde(default = "default_val_videos")]
    pub val_videos: usize,
    /// frame distance between source and target of sample predictions
    #[serde(default = "default_val_offset")]
    pub val_offset: usize,
    pub seed: Option<u64>,
}

fn default_width() -> f64 {
    1.0
}

fn default_frame_size() -> usize {
    params::FRAME_SIZE as usize
}

fn default_coef() -> f64 {
    1.0
}

fn default_val_videos() -> usize {
    4
}

fn default_val_offset() -> usize {
    8
}

fn default_device() -> Device {
    Device::cuda_if_available()
}

fn serialize_device<S>(device: &Device, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = match device {
        Device::Cpu => "cpu".into(),
        Device::Cuda(n) => format!("cuda({})", n),
    };
    text.serialize(serializer)
}

fn deserialize_device<'de, D>(deserializer: D) -> Result<Device, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    let device = match name.as_str() {
        "cpu" => Device::Cpu,
        _ => {
            let prefix = "cuda(";
            let suffix = ")";
            if name.starts_with(prefix) && name.ends_with(suffix) {
                let number: usize = name[(prefix.len())..(name.len() - suffix.len())]
                    .parse()
                    .map_err(|_err| D::Error::custom(format!("invalid device name {}", name)))?;
                Device::Cuda(number)
            } else {
                return Err(D::Error::custom(format!("invalid device name {}", name)));
            }
        }
    };
    Ok(device)
}
