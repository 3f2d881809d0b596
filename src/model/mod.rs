mod decoder;
mod discriminator;
mod encoder;
mod generator;
mod model;
mod perceptual;

pub use decoder::FrameDecoder;
pub use discriminator::Discriminator;
pub use encoder::{tower_depths, VggTower};
pub use generator::Generator;
pub use model::{DiscriminatorScores, ModelInit, PerceptualState, PoseTransferModel};
pub use perceptual::PerceptualExtractor;
