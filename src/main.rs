use argh::FromArgs;
use posenet_gan::{
    common::*,
    config::Config,
    dataset::NpzDataset,
    model::ModelInit,
    predict::Predictor,
    sink::FileSink,
    train::{TrainState, TrainerInit},
};

/// Pose-conditioned frame prediction with an adversarial VGG encoder-decoder.
#[derive(FromArgs)]
struct Args {
    /// the config file.
    #[argh(option, default = "PathBuf::from(\"config.json5\")")]
    config: PathBuf,
    /// predict test videos with the latest checkpoint instead of training.
    #[argh(switch)]
    test: bool,
}

fn main() -> Fallible<()> {
    pretty_env_logger::init();

    // Parse arguments
    let args: Args = argh::from_env();

    // load config
    let config = Config::open(&args.config)?;
    if let Some(seed) = config.training.seed {
        tch::manual_seed(seed);
    }

    // init log dir
    fs::create_dir_all(&config.logging.log_dir)?;
    let mut sink = FileSink::new(&config.logging.checkpoint_dir, &config.logging.log_dir)?;

    // Load dataset
    info!("Loading dataset");
    let mut dataset = NpzDataset::open(&config.dataset, &config.model)?;

    // Init model
    info!("Initialize model");
    let device = config.training.device;
    let mut model = ModelInit::from_config(&config.model).build(device)?;

    let checkpoint = match &config.training.resume_from {
        Some(path) => Some(path.clone()),
        None => sink.latest_checkpoint()?,
    };
    let resumed = checkpoint.is_some();
    let step = match checkpoint {
        Some(path) => {
            let step = model.load(&path)?;
            info!("resumed from {} at step {}", path.display(), step);
            step
        }
        None => 0,
    };

    if args.test {
        ensure!(
            resumed,
            "no checkpoint to test in {}",
            config.logging.checkpoint_dir.display()
        );
        Predictor::new(&model).run_test(
            &mut dataset,
            &config.logging.train_output_dir,
            &config.logging.test_output_dir,
            step,
        )?;
        return Ok(());
    }

    let mut trainer = TrainerInit::from_config(&config).build(model, step)?;
    match trainer.train(&mut dataset, &mut sink)? {
        TrainState::StoppedNan => bail!("training stopped on a NaN loss at step {}", trainer.step()),
        state => {
            debug_assert!(state.is_success());
            info!("training finished at step {}", trainer.step());
        }
    }

    Ok(())
}
