#![allow(dead_code)]

use posenet_gan::{
    common::*,
    data::{FrameQuad, ImagePrediction, TestBatch, ValBatch},
    dataset::Dataset,
    model::{ModelInit, PoseTransferModel},
    sink::{CheckpointSink, ScalarSummary},
    train::TrainerInit,
};
use std::cell::RefCell;

pub const FRAME_SIZE: i64 = 32;
pub const FRAME_CHANNELS: i64 = 3;
pub const POSE_CHANNELS: i64 = 2;

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("posenet-gan-it-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn small_model_init() -> ModelInit {
    ModelInit {
        frame_size: FRAME_SIZE,
        width: 0.125,
        ..ModelInit::new(FRAME_CHANNELS, POSE_CHANNELS)
    }
}

pub fn small_model() -> PoseTransferModel {
    small_model_init().build(Device::Cpu).unwrap()
}

pub fn trainer_init(output_dir: &Path, max_steps: usize) -> TrainerInit {
    TrainerInit {
        loss: Default::default(),
        lr_gen: 1e-4,
        lr_disc: 1e-4,
        adam: false,
        batch_size: 2,
        max_steps,
        disp_interval: 1,
        summary_interval: 1,
        save_interval: 1,
        train_output_dir: output_dir.join("train"),
        val_output_dir: output_dir.join("val"),
    }
}

#[derive(Debug)]
pub struct MemoryVideo {
    pub action: String,
    pub name: String,
    pub frames: Tensor,
    pub poses: Tensor,
}

impl MemoryVideo {
    pub fn random(action: &str, name: &str, num_frames: i64) -> Self {
        let frames = Tensor::rand(
            &[num_frames, FRAME_SIZE, FRAME_SIZE, FRAME_CHANNELS],
            (Kind::Float, Device::Cpu),
        ) * 255.0;
        let poses = Tensor::rand(
            &[num_frames, FRAME_SIZE, FRAME_SIZE, POSE_CHANNELS],
            (Kind::Float, Device::Cpu),
        ) * 255.0;
        Self {
            action: action.into(),
            name: name.into(),
            frames,
            poses,
        }
    }
}

/// Serves fixed videos from memory and records what is saved.
#[derive(Debug)]
pub struct MemoryDataset {
    pub videos: Vec<MemoryVideo>,
    /// poison every training batch with NaN frames
    pub nan_frames: bool,
    pub train_batches: usize,
    pub saved_images: RefCell<Vec<(PathBuf, String, String)>>,
    pub saved_videos: RefCell<Vec<(PathBuf, String, String, Tensor)>>,
}

impl MemoryDataset {
    pub fn new(videos: Vec<MemoryVideo>) -> Self {
        Self {
            videos,
            nan_frames: false,
            train_batches: 0,
            saved_images: RefCell::new(vec![]),
            saved_videos: RefCell::new(vec![]),
        }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            MemoryVideo::random("walk", "v0", 4),
            MemoryVideo::random("walk", "v1", 3),
            MemoryVideo::random("jump", "v2", 5),
        ])
    }

    fn by_action(&self) -> Vec<(String, Vec<&MemoryVideo>)> {
        self.videos
            .iter()
            .into_group_map_by(|video| video.action.clone())
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .collect()
    }
}

impl Dataset for MemoryDataset {
    fn get_train_batch(&mut self, batch_size: usize) -> Fallible<FrameQuad> {
        self.train_batches += 1;

        let picks = (0..batch_size)
            .map(|index| &self.videos[index % self.videos.len()])
            .collect::<Vec<_>>();
        let stack = |tensors: Vec<Tensor>| Tensor::stack(&tensors, 0);

        let mut f_t = stack(picks.iter().map(|video| video.frames.get(0)).collect());
        let p_t = stack(picks.iter().map(|video| video.poses.get(0)).collect());
        let f_t_n = stack(picks.iter().map(|video| video.frames.get(1)).collect());
        let p_t_n = stack(picks.iter().map(|video| video.poses.get(1)).collect());

        if self.nan_frames {
            f_t = f_t * f64::NAN;
        }

        FrameQuad::new(f_t, p_t, f_t_n, p_t_n)
    }

    fn get_val_batch(&mut self, _test: bool) -> Fallible<Vec<ValBatch>> {
        self.by_action()
            .into_iter()
            .map(|(action, videos)| {
                let stack = |select: &dyn Fn(&MemoryVideo) -> Tensor| {
                    let tensors = videos.iter().map(|video| select(video)).collect::<Vec<_>>();
                    Tensor::stack(&tensors, 0)
                };
                let quad = FrameQuad::new(
                    stack(&|video| video.frames.get(0)),
                    stack(&|video| video.poses.get(0)),
                    stack(&|video| video.frames.get(2)),
                    stack(&|video| video.poses.get(2)),
                )?;
                Ok(ValBatch {
                    action,
                    video_names: videos.iter().map(|video| video.name.clone()).collect(),
                    quad,
                })
            })
            .collect()
    }

    fn get_test_batch(&mut self, _test: bool) -> Fallible<Vec<TestBatch>> {
        let batches = self
            .by_action()
            .into_iter()
            .map(|(action, videos)| TestBatch {
                action,
                video_names: videos.iter().map(|video| video.name.clone()).collect(),
                videos: videos.iter().map(|video| video.frames.shallow_clone()).collect(),
                poses: videos.iter().map(|video| video.poses.shallow_clone()).collect(),
            })
            .collect();
        Ok(batches)
    }

    fn save_image_predictions(
        &self,
        output_dir: &Path,
        action: &str,
        prediction: &ImagePrediction,
    ) -> Fallible<()> {
        ensure!(prediction.predicted.kind() == Kind::Uint8);
        ensure!(prediction.predicted.size() == vec![FRAME_SIZE, FRAME_SIZE, FRAME_CHANNELS]);
        self.saved_images.borrow_mut().push((
            output_dir.to_owned(),
            action.to_owned(),
            prediction.video_name.clone(),
        ));
        Ok(())
    }

    fn save_video_predictions(
        &self,
        output_dir: &Path,
        action: &str,
        video_name: &str,
        frames: &Tensor,
    ) -> Fallible<()> {
        self.saved_videos.borrow_mut().push((
            output_dir.to_owned(),
            action.to_owned(),
            video_name.to_owned(),
            frames.shallow_clone(),
        ));
        Ok(())
    }
}

/// Keeps checkpoint steps and summaries in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub saved_steps: Vec<usize>,
    pub summaries: Vec<(usize, Vec<ScalarSummary>)>,
}

impl CheckpointSink for RecordingSink {
    fn save(&mut self, _model: &PoseTransferModel, step: usize) -> Fallible<()> {
        self.saved_steps.push(step);
        Ok(())
    }

    fn add_summary(&mut self, summaries: &[ScalarSummary], step: usize) -> Fallible<()> {
        self.summaries.push((step, summaries.to_vec()));
        Ok(())
    }
}

/// Copies every variable of a var store.
pub fn snapshot(vs: &VarStore) -> HashMap<String, Tensor> {
    vs.variables()
        .into_iter()
        .map(|(name, var)| (name, var.copy()))
        .collect()
}

pub fn assert_unchanged(vs: &VarStore, before: &HashMap<String, Tensor>) {
    let after = vs.variables();
    assert_eq!(after.len(), before.len());
    for (name, var) in after {
        assert_eq!(var, before[&name], "variable {} changed", name);
    }
}

/// Writes random VGG16 block 1-3 weights in `[kh, kw, in, out]` layout.
pub fn write_vgg16_weights(path: &Path) {
    let tensors = posenet_gan::params::PERCEPTUAL_LAYERS
        .iter()
        .flat_map(|&(name, in_c, out_c)| {
            let kernel = Tensor::randn(&[3, 3, in_c, out_c], (Kind::Float, Device::Cpu)) * 0.01;
            let bias = Tensor::zeros(&[out_c], (Kind::Float, Device::Cpu));
            vec![(format!("{}/W", name), kernel), (format!("{}/b", name), bias)]
        })
        .collect::<Vec<_>>();
    let named = tensors
        .iter()
        .map(|(name, tensor)| (name.as_str(), tensor))
        .collect::<Vec<_>>();
    Tensor::write_npz(&named, path).unwrap();
}
