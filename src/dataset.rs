//! Dataset providers feeding the trainer and the predictor.

use crate::{
    common::*,
    config::{DatasetConfig, ModelConfig},
    data::{FrameQuad, ImagePrediction, TestBatch, ValBatch},
    utils,
};
use glob::glob;

const FRAMES_KEY: &str = "frames";
const POSES_KEY: &str = "poses";

/// Supplies frame quadruples and whole videos, and persists predictions.
///
/// Frames and poses are channel-last with values in [0, 255].
pub trait Dataset {
    fn get_train_batch(&mut self, batch_size: usize) -> Fallible<FrameQuad>;

    /// One batch per action of the train (`test == false`) or test split.
    fn get_val_batch(&mut self, test: bool) -> Fallible<Vec<ValBatch>>;

    /// Whole videos grouped by action of the train (`test == false`) or test split.
    fn get_test_batch(&mut self, test: bool) -> Fallible<Vec<TestBatch>>;

    /// Writes `{output_dir}/{action}/{video_name}.png` with the source, source pose,
    /// target, target pose and predicted frames side by side.
    fn save_image_predictions(
        &self,
        output_dir: &Path,
        action: &str,
        prediction: &ImagePrediction,
    ) -> Fallible<()> {
        let ImagePrediction {
            video_name,
            source_frame,
            source_pose,
            target_frame,
            target_pose,
            predicted,
        } = prediction;

        let images = [
            utils::frame_to_image(source_frame)?,
            utils::frame_to_image(&pose_to_frame(source_pose))?,
            utils::frame_to_image(target_frame)?,
            utils::frame_to_image(&pose_to_frame(target_pose))?,
            utils::frame_to_image(&predicted.to_kind(Kind::Float))?,
        ];

        let dir = output_dir.join(action);
        fs::create_dir_all(&dir)?;
        utils::hconcat_images(&images).save(dir.join(format!("{}.png", video_name)))?;
        Ok(())
    }

    /// Writes the `[frames, height, width, channels]` video as
    /// `{output_dir}/{action}/{video_name}/{index:04}.png`.
    fn save_video_predictions(
        &self,
        output_dir: &Path,
        action: &str,
        video_name: &str,
        frames: &Tensor,
    ) -> Fallible<()> {
        let dir = output_dir.join(action).join(video_name);
        fs::create_dir_all(&dir)?;

        let frames = frames.to_kind(Kind::Float);
        let (num_frames, _h, _w, _c) = frames.size4()?;
        (0..num_frames).try_for_each(|index| -> Fallible<_> {
            let image = utils::frame_to_image(&frames.get(index))?;
            image.save(dir.join(format!("{:04}.png", index)))?;
            Ok(())
        })
    }
}

/// Collapses pose heatmaps `[height, width, channels]` into one gray channel.
fn pose_to_frame(pose: &Tensor) -> Tensor {
    let pose = pose.to_kind(Kind::Float);
    let (max, _indexes) = pose.max_dim(-1, true);
    max
}

#[derive(Debug, Clone)]
struct VideoEntry {
    action: String,
    name: String,
    path: PathBuf,
    num_frames: i64,
}

/// Videos stored as `{dataset_dir}/{train,test}/{action}/{video}.npz`.
///
/// Each archive holds `frames` of shape `[T, S, S, C]` and `poses` of shape
/// `[T, S, S, L]`.
#[derive(Debug)]
pub struct NpzDataset {
    train_videos: Vec<VideoEntry>,
    test_videos: Vec<VideoEntry>,
    frame_channels: i64,
    pose_channels: i64,
    frame_size: i64,
    val_videos: usize,
    val_offset: i64,
    rng: StdRng,
}

impl NpzDataset {
    pub fn open(config: &DatasetConfig, model: &ModelConfig) -> Fallible<Self> {
        let DatasetConfig {
            ref dataset_dir,
            val_videos,
            val_offset,
            seed,
        } = *config;

        let frame_channels = model.frame_channels();
        let pose_channels = model.pose_channels.get() as i64;
        let frame_size = model.frame_size as i64;

        let index_split = |split: &str| -> Fallible<Vec<VideoEntry>> {
            let pattern = dataset_dir.join(split).join("*").join("*.npz");
            let pattern = pattern
                .to_str()
                .ok_or_else(|| format_err!("non-UTF-8 path {}", pattern.display()))?;
            let paths = glob(pattern)?.collect::<Result<Vec<_>, _>>()?;

            let mut entries = paths
                .into_par_iter()
                .map(|path| {
                    let (frames, _poses) =
                        load_video(&path, frame_channels, pose_channels, frame_size)?;
                    let action = path
                        .parent()
                        .and_then(|dir| dir.file_name())
                        .and_then(|name| name.to_str())
                        .ok_or_else(|| format_err!("cannot find action of {}", path.display()))?
                        .to_string();
                    let name = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .ok_or_else(|| format_err!("invalid video file name {}", path.display()))?
                        .to_string();
                    Ok(VideoEntry {
                        action,
                        name,
                        num_frames: frames.size()[0],
                        path,
                    })
                })
                .collect::<Fallible<Vec<_>>>()?;
            entries.sort_by(|lhs, rhs| (&lhs.action, &lhs.name).cmp(&(&rhs.action, &rhs.name)));

            info!(
                "found {} videos in the {} split of {}",
                entries.len(),
                split,
                dataset_dir.display()
            );
            Ok(entries)
        };

        let train_videos = index_split("train")?;
        let test_videos = index_split("test")?;

        let num_trainable = train_videos
            .iter()
            .filter(|entry| entry.num_frames >= 2)
            .count();
        ensure!(
            num_trainable > 0,
            "no training video with at least two frames in {}",
            dataset_dir.display()
        );
        if num_trainable < train_videos.len() {
            warn!(
                "{} training videos have fewer than two frames and are skipped",
                train_videos.len() - num_trainable
            );
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            train_videos,
            test_videos,
            frame_channels,
            pose_channels,
            frame_size,
            val_videos,
            val_offset: val_offset as i64,
            rng,
        })
    }

    fn load(&self, entry: &VideoEntry) -> Fallible<(Tensor, Tensor)> {
        load_video(
            &entry.path,
            self.frame_channels,
            self.pose_channels,
            self.frame_size,
        )
    }

    fn split(&self, test: bool) -> &[VideoEntry] {
        if test {
            &self.test_videos
        } else {
            &self.train_videos
        }
    }

    fn group_by_action(&self, test: bool) -> Vec<(String, Vec<&VideoEntry>)> {
        self.split(test)
            .iter()
            .into_group_map_by(|entry| entry.action.clone())
            .into_iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .collect()
    }
}

impl Dataset for NpzDataset {
    fn get_train_batch(&mut self, batch_size: usize) -> Fallible<FrameQuad> {
        ensure!(batch_size > 0, "batch size must be positive");

        let candidates = self
            .train_videos
            .iter()
            .filter(|entry| entry.num_frames >= 2)
            .collect::<Vec<_>>();

        let picks = (0..batch_size)
            .map(|_| {
                let entry = candidates[self.rng.gen_range(0..candidates.len())];
                let t = self.rng.gen_range(0..(entry.num_frames - 1));
                let t_n = self.rng.gen_range((t + 1)..entry.num_frames);
                (entry, t, t_n)
            })
            .collect::<Vec<_>>();

        let samples = picks
            .into_par_iter()
            .map(|(entry, t, t_n)| {
                let (frames, poses) = self.load(entry)?;
                Ok((frames.get(t), poses.get(t), frames.get(t_n), poses.get(t_n)))
            })
            .collect::<Fallible<Vec<_>>>()?;

        stack_samples(&samples)
    }

    fn get_val_batch(&mut self, test: bool) -> Fallible<Vec<ValBatch>> {
        self.group_by_action(test)
            .into_iter()
            .filter_map(|(action, entries)| {
                let entries = entries
                    .into_iter()
                    .filter(|entry| entry.num_frames > 0)
                    .take(self.val_videos)
                    .collect::<Vec<_>>();
                (!entries.is_empty()).then(|| (action, entries))
            })
            .map(|(action, entries)| {
                let samples = entries
                    .par_iter()
                    .map(|entry| {
                        let (frames, poses) = self.load(entry)?;
                        let t_n = self.val_offset.min(entry.num_frames - 1);
                        Ok((frames.get(0), poses.get(0), frames.get(t_n), poses.get(t_n)))
                    })
                    .collect::<Fallible<Vec<_>>>()?;
                Ok(ValBatch {
                    action,
                    video_names: entries.iter().map(|entry| entry.name.clone()).collect(),
                    quad: stack_samples(&samples)?,
                })
            })
            .collect()
    }

    fn get_test_batch(&mut self, test: bool) -> Fallible<Vec<TestBatch>> {
        self.group_by_action(test)
            .into_iter()
            .map(|(action, entries)| {
                let loaded = entries
                    .par_iter()
                    .map(|entry| self.load(entry))
                    .collect::<Fallible<Vec<_>>>()?;
                let (videos, poses): (Vec<_>, Vec<_>) = loaded.into_iter().unzip();
                Ok(TestBatch {
                    action,
                    video_names: entries.iter().map(|entry| entry.name.clone()).collect(),
                    videos,
                    poses,
                })
            })
            .collect()
    }
}

type Sample = (Tensor, Tensor, Tensor, Tensor);

fn stack_samples(samples: &[Sample]) -> Fallible<FrameQuad> {
    let stack = |select: fn(&Sample) -> &Tensor| {
        let tensors = samples.iter().map(select).collect::<Vec<_>>();
        Tensor::stack(&tensors, 0)
    };
    FrameQuad::new(
        stack(|sample| &sample.0),
        stack(|sample| &sample.1),
        stack(|sample| &sample.2),
        stack(|sample| &sample.3),
    )
}

/// Reads one video archive and checks its shapes.
fn load_video(
    path: &Path,
    frame_channels: i64,
    pose_channels: i64,
    frame_size: i64,
) -> Fallible<(Tensor, Tensor)> {
    let mut entries = Tensor::read_npz(path)
        .map_err(|err| format_err!("cannot read {}: {}", path.display(), err))?
        .into_iter()
        .collect::<HashMap<_, _>>();
    let mut take = |key: &str| {
        entries
            .remove(key)
            .map(|tensor| tensor.to_kind(Kind::Float))
            .ok_or_else(|| format_err!("{} has no entry {}", path.display(), key))
    };
    let frames = take(FRAMES_KEY)?;
    let poses = take(POSES_KEY)?;

    let (num_frames, height, width, channels) = frames.size4()?;
    let (num_poses, pose_height, pose_width, num_joints) = poses.size4()?;
    ensure!(
        num_frames == num_poses,
        "{}: {} frames but {} poses",
        path.display(),
        num_frames,
        num_poses
    );
    ensure!(
        (height, width) == (frame_size, frame_size)
            && (pose_height, pose_width) == (frame_size, frame_size),
        "{}: expect {}x{} frames and poses, but get {}x{} and {}x{}",
        path.display(),
        frame_size,
        frame_size,
        height,
        width,
        pose_height,
        pose_width
    );
    ensure!(
        channels == frame_channels && num_joints == pose_channels,
        "{}: expect {} frame and {} pose channels, but get {} and {}",
        path.display(),
        frame_channels,
        pose_channels,
        channels,
        num_joints
    );

    Ok((frames, poses))
}
