use crate::{common::*, model::PoseTransferModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarSummary {
    pub tag: String,
    pub value: f64,
}

impl ScalarSummary {
    pub fn new(tag: impl Display, value: &Tensor) -> Self {
        Self {
            tag: tag.to_string(),
            value: value.double_value(&[]),
        }
    }
}

/// Receives checkpoints and scalar summaries from the trainer.
pub trait CheckpointSink {
    fn save(&mut self, model: &PoseTransferModel, step: usize) -> Fallible<()>;
    fn add_summary(&mut self, summaries: &[ScalarSummary], step: usize) -> Fallible<()>;
}

#[derive(Debug, Serialize)]
struct SummaryRecord<'a> {
    step: usize,
    tag: &'a str,
    value: f64,
}

/// Writes checkpoints as var store files and summaries as JSON lines.
///
/// Checkpoints go to `{checkpoint_dir}/{step:0>10}/` and summaries are appended
/// to `{log_dir}/summary.jsonl`.
#[derive(Debug)]
pub struct FileSink {
    checkpoint_dir: PathBuf,
    summary_file: BufWriter<File>,
}

impl FileSink {
    pub fn new(checkpoint_dir: impl AsRef<Path>, log_dir: impl AsRef<Path>) -> Fallible<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_owned();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(&checkpoint_dir)?;
        fs::create_dir_all(log_dir)?;

        let summary_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("summary.jsonl"))?;

        Ok(Self {
            checkpoint_dir,
            summary_file: BufWriter::new(summary_file),
        })
    }

    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.checkpoint_dir.join(format!("{:0>10}", step))
    }

    /// Finds the checkpoint with the largest step under the checkpoint directory.
    pub fn latest_checkpoint(&self) -> Fallible<Option<PathBuf>> {
        let latest = fs::read_dir(&self.checkpoint_dir)?
            .map(|entry| -> Fallible<_> {
                let entry = entry?;
                let step = entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<usize>().ok());
                Ok(step.map(|step| (step, entry.path())))
            })
            .filter_map(|result| result.transpose())
            .collect::<Fallible<Vec<_>>>()?
            .into_iter()
            .max_by_key(|(step, _)| *step)
            .map(|(_, path)| path);
        Ok(latest)
    }
}

impl CheckpointSink for FileSink {
    fn save(&mut self, model: &PoseTransferModel, step: usize) -> Fallible<()> {
        let path = self.checkpoint_path(step);
        model.save(&path, step)?;
        debug!("saved checkpoint {}", path.display());
        Ok(())
    }

    fn add_summary(&mut self, summaries: &[ScalarSummary], step: usize) -> Fallible<()> {
        for summary in summaries {
            let record = SummaryRecord {
                step,
                tag: &summary.tag,
                value: summary.value,
            };
            serde_json::to_writer(&mut self.summary_file, &record)?;
            self.summary_file.write_all(b"\n")?;
        }
        self.summary_file.flush()?;
        Ok(())
    }
}
