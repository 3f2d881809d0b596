pub use anyhow::{bail, ensure, format_err, Error, Result as Fallible};
pub use image::{imageops, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
pub use itertools::{izip, Itertools};
pub use log::{debug, error, info, warn};
pub use rand::{rngs::StdRng, Rng, SeedableRng};
pub use rayon::prelude::*;
pub use serde::{
    de::Error as DeserializeError, ser::Error as SerializeError, Deserialize, Deserializer,
    Serialize, Serializer,
};
pub use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt::Display,
    fs::{self, File, OpenOptions},
    io::{prelude::*, BufWriter},
    iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use tch::{
    nn::{self, ConvConfig, ConvTransposeConfig, OptimizerConfig, VarStore},
    Device, Kind, Reduction, Tensor,
};
pub use tch_tensor_like::TensorLike;
