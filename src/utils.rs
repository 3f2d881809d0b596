use crate::common::*;

/// Maps pixel values in [0, 255] to [-1, 1].
pub fn normalize(x: &Tensor) -> Tensor {
    (x / 255.0 - 0.5) * 2.0
}

/// Inverse of [normalize].
pub fn denormalize(x: &Tensor) -> Tensor {
    (x / 2.0 + 0.5) * 255.0
}

/// NHWC to NCHW.
pub fn to_channel_first(x: &Tensor) -> Tensor {
    x.permute(&[0, 3, 1, 2])
}

/// NCHW to NHWC.
pub fn to_channel_last(x: &Tensor) -> Tensor {
    x.permute(&[0, 2, 3, 1])
}

/// Rounds pixel values to the nearest integer and clamps them to 8 bits.
pub fn quantize_frames(frames: &Tensor) -> Tensor {
    frames.round().clamp_min(0.0).clamp_max(255.0).to_kind(Kind::Uint8)
}

/// Converts a [height, width, channels] frame with values in [0, 255] to an RGB image.
///
/// Single channel frames are replicated to gray RGB.
pub fn frame_to_image(frame: &Tensor) -> Fallible<RgbImage> {
    let (height, width, channels) = frame.size3()?;
    ensure!(
        channels == 1 || channels == 3,
        "expect 1 or 3 channels, but get {}",
        channels
    );

    let frame = quantize_frames(&frame.to_device(Device::Cpu));
    let frame = if channels == 1 {
        frame.repeat(&[1, 1, 3])
    } else {
        frame
    };
    let buf = Vec::<u8>::from(&frame.contiguous().view([-1]));

    let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_vec(width as u32, height as u32, buf)
        .ok_or_else(|| format_err!("frame buffer does not match {}x{}", width, height))?;
    Ok(image)
}

/// Concatenates images horizontally.
pub fn hconcat_images(images: &[RgbImage]) -> RgbImage {
    let width = images.iter().map(|image| image.width()).sum();
    let height = images.iter().map(|image| image.height()).max().unwrap_or(0);
    let mut canvas = RgbImage::new(width, height);

    images.iter().fold(0, |offset, image| {
        imageops::replace(&mut canvas, image, offset as i64, 0);
        offset + image.width()
    });

    canvas
}
