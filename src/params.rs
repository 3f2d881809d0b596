// input parameters
pub const FRAME_SIZE: i64 = 224;
pub const COLOR_CHANNELS: i64 = 3;
pub const GRAY_CHANNELS: i64 = 1;
pub const SPATIAL_STRIDE: i64 = 16; // total downsampling of the vgg tower

// hyper-parameters: vgg tower
pub const TOWER_DEPTHS: [i64; 4] = [64, 128, 256, 512];
pub const TOWER_CONVS: [usize; 4] = [2, 2, 3, 3];
pub const TOWER_KERNEL_SIZE: i64 = 3;

// hyper-parameters: discriminator head
pub const DISC_HIDDEN: i64 = 1024;
pub const DISC_DROPOUT: f64 = 0.5;

// log floors of the discriminator loss
pub const REAL_PROB_FLOOR: f64 = 0.01;
pub const FAKE_PROB_CEIL: f64 = 1.01;

// vgg16 perceptual extractor, BGR channel means
pub const VGG_MEAN: [f64; 3] = [103.939, 116.779, 123.68];
pub const PERCEPTUAL_LAYERS: [(&str, i64, i64); 7] = [
    ("conv1_1", 3, 64),
    ("conv1_2", 64, 64),
    ("conv2_1", 64, 128),
    ("conv2_2", 128, 128),
    ("conv3_1", 128, 256),
    ("conv3_2", 256, 256),
    ("conv3_3", 256, 256),
];
// conv1_1 is left out since the image encoder input depth depends on gray
pub const ENCODER_PRETRAINED_LAYERS: [&str; 6] =
    ["conv1_2", "conv2_1", "conv2_2", "conv3_1", "conv3_2", "conv3_3"];
