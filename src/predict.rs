use crate::{
    common::*,
    data::{ImagePrediction, TestBatch, ValBatch},
    dataset::Dataset,
    model::PoseTransferModel,
    utils,
};

/// Appends `-{step}` to the last component of an output directory.
pub fn step_output_dir(base: &Path, step: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("-{}", step));
    PathBuf::from(name)
}

/// Runs the generator alone, without gradients and with dropout off.
#[derive(Debug)]
pub struct Predictor<'a> {
    model: &'a PoseTransferModel,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a PoseTransferModel) -> Self {
        Self { model }
    }

    /// Predicts target frames in [0, 255] from NHWC frames and poses in [0, 255].
    pub fn predict(&self, f_t: &Tensor, p_t: &Tensor, p_t_n: &Tensor) -> Tensor {
        let device = self.model.device();
        tch::no_grad(|| {
            let f_t = utils::normalize(&f_t.to_device(device));
            let p_t = utils::normalize(&p_t.to_device(device));
            let p_t_n = utils::normalize(&p_t_n.to_device(device));
            let predicted = self.model.generator.forward_t(&f_t, &p_t, &p_t_n, false);
            utils::denormalize(&predicted)
        })
    }

    /// Same as [Predictor::predict], rounded and clamped to 8 bits on the CPU.
    pub fn predict_frames(&self, f_t: &Tensor, p_t: &Tensor, p_t_n: &Tensor) -> Tensor {
        utils::quantize_frames(&self.predict(f_t, p_t, p_t_n)).to_device(Device::Cpu)
    }

    /// Predicts every frame of a video from its first frame and pose.
    ///
    /// Each prediction is conditioned on frame 0 and pose 0 only, never on a
    /// previous prediction. The output starts with frame 0 itself, so it has as
    /// many frames as the input video.
    pub fn predict_video(&self, video: &Tensor, poses: &Tensor) -> Fallible<Tensor> {
        let (num_frames, _h, _w, _c) = video.size4()?;
        let (num_poses, _h, _w, _l) = poses.size4()?;
        ensure!(
            num_frames == num_poses,
            "video has {} frames but {} poses",
            num_frames,
            num_poses
        );
        ensure!(num_frames > 0, "empty video");

        let f0 = video.narrow(0, 0, 1);
        let p0 = poses.narrow(0, 0, 1);

        let frames = iter::once(utils::quantize_frames(&f0.to_device(Device::Cpu)))
            .chain((1..num_frames).map(|index| {
                self.predict_frames(&f0, &p0, &poses.narrow(0, index, 1))
            }))
            .collect::<Vec<_>>();

        Ok(Tensor::cat(&frames, 0))
    }

    /// Predicts a validation slice and saves one image per sample.
    pub fn save_val_batch<D>(&self, dataset: &D, output_dir: &Path, batch: &ValBatch) -> Fallible<()>
    where
        D: Dataset + ?Sized,
    {
        let ValBatch {
            action,
            video_names,
            quad,
        } = batch;
        quad.check()?;
        ensure!(
            video_names.len() as i64 == quad.batch_size(),
            "{} video names for a batch of {}",
            video_names.len(),
            quad.batch_size()
        );
        fs::create_dir_all(output_dir.join(action))?;

        let predicted = self.predict_frames(&quad.f_t, &quad.p_t, &quad.p_t_n);

        video_names
            .iter()
            .enumerate()
            .try_for_each(|(index, video_name)| {
                let index = index as i64;
                let prediction = ImagePrediction {
                    video_name: video_name.clone(),
                    source_frame: quad.f_t.get(index),
                    source_pose: quad.p_t.get(index),
                    target_frame: quad.f_t_n.get(index),
                    target_pose: quad.p_t_n.get(index),
                    predicted: predicted.get(index),
                };
                dataset.save_image_predictions(output_dir, action, &prediction)
            })
    }

    /// Predicts whole videos of the train and test splits and saves them under
    /// `{train_output_dir}-{step}` and `{test_output_dir}-{step}`.
    pub fn run_test<D>(
        &self,
        dataset: &mut D,
        train_output_dir: &Path,
        test_output_dir: &Path,
        step: usize,
    ) -> Fallible<()>
    where
        D: Dataset + ?Sized,
    {
        for (output_base, test) in [(train_output_dir, false), (test_output_dir, true)] {
            let output_dir = step_output_dir(output_base, step);
            info!("predicting videos to {}", output_dir.display());

            for batch in dataset.get_test_batch(test)? {
                let TestBatch {
                    action,
                    video_names,
                    videos,
                    poses,
                } = batch;
                ensure!(
                    video_names.len() == videos.len() && videos.len() == poses.len(),
                    "action {} has {} names, {} videos and {} pose sequences",
                    action,
                    video_names.len(),
                    videos.len(),
                    poses.len()
                );
                fs::create_dir_all(output_dir.join(&action))?;

                for (video_name, video, video_poses) in izip!(&video_names, &videos, &poses) {
                    let predicted = self.predict_video(video, video_poses)?;
                    dataset.save_video_predictions(&output_dir, &action, video_name, &predicted)?;
                }
            }
        }
        Ok(())
    }
}
