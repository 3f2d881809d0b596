use crate::{
    common::*,
    config::{Config, LossConfig},
    data::FrameQuad,
    dataset::Dataset,
    model::PoseTransferModel,
    objective::{self, DiscriminatorLoss, GeneratorLoss},
    predict::{self, Predictor},
    sink::{CheckpointSink, ScalarSummary},
};

type OptimizerStep = Box<dyn FnMut(&Tensor)>;

fn build_optimizer<C>(config: C, vs: &VarStore, lr: f64) -> Fallible<OptimizerStep>
where
    C: OptimizerConfig + 'static,
{
    let mut opt = config.build(vs, lr)?;
    Ok(Box::new(move |loss: &Tensor| opt.backward_step(loss)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Running,
    /// a loss became NaN, the offending update was not applied
    StoppedNan,
    StoppedMaxSteps,
}

impl TrainState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::StoppedMaxSteps)
    }
}

#[derive(Debug, Clone)]
pub struct TrainerInit {
    pub loss: LossConfig,
    pub lr_gen: f64,
    pub lr_disc: f64,
    /// Adam for the discriminator instead of plain gradient descent
    pub adam: bool,
    pub batch_size: usize,
    pub max_steps: usize,
    pub disp_interval: usize,
    pub summary_interval: usize,
    pub save_interval: usize,
    pub train_output_dir: PathBuf,
    pub val_output_dir: PathBuf,
}

impl TrainerInit {
    pub fn from_config(config: &Config) -> Self {
        let training = &config.training;
        Self {
            loss: config.loss.clone(),
            lr_gen: training.lr_gen,
            lr_disc: training.lr_disc,
            adam: training.adam,
            batch_size: training.batch_size.get(),
            max_steps: training.max_steps,
            disp_interval: training.disp_interval.get(),
            summary_interval: training.summary_interval.get(),
            save_interval: training.save_interval.get(),
            train_output_dir: config.logging.train_output_dir.clone(),
            val_output_dir: config.logging.val_output_dir.clone(),
        }
    }

    /// Creates the optimizers and starts counting from `initial_step`.
    pub fn build(self, model: PoseTransferModel, initial_step: usize) -> Fallible<Trainer> {
        let Self {
            loss,
            lr_gen,
            lr_disc,
            adam,
            batch_size,
            max_steps,
            disp_interval,
            summary_interval,
            save_interval,
            train_output_dir,
            val_output_dir,
        } = self;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(
            disp_interval > 0 && summary_interval > 0 && save_interval > 0,
            "intervals must be positive"
        );

        let gen_opt = build_optimizer(nn::Adam::default(), &model.gen_vs, lr_gen)?;
        let disc_opt = if adam {
            build_optimizer(nn::Adam::default(), &model.disc_vs, lr_disc)?
        } else {
            build_optimizer(nn::Sgd::default(), &model.disc_vs, lr_disc)?
        };

        Ok(Trainer {
            model,
            loss,
            batch_size,
            max_steps,
            disp_interval,
            summary_interval,
            save_interval,
            train_output_dir,
            val_output_dir,
            step: initial_step,
            disp_loss_gen: 0.0,
            disp_loss_disc: 0.0,
            gen_opt,
            disc_opt,
        })
    }
}

/// Alternates discriminator and generator updates on one model.
pub struct Trainer {
    model: PoseTransferModel,
    loss: LossConfig,
    batch_size: usize,
    max_steps: usize,
    disp_interval: usize,
    summary_interval: usize,
    save_interval: usize,
    train_output_dir: PathBuf,
    val_output_dir: PathBuf,
    step: usize,
    disp_loss_gen: f64,
    disp_loss_disc: f64,
    gen_opt: OptimizerStep,
    disc_opt: OptimizerStep,
}

impl Trainer {
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn model(&self) -> &PoseTransferModel {
        &self.model
    }

    pub fn into_model(self) -> PoseTransferModel {
        self.model
    }

    /// Runs iterations until the step limit is reached or a loss diverges.
    pub fn train<D, S>(&mut self, dataset: &mut D, sink: &mut S) -> Fallible<TrainState>
    where
        D: Dataset + ?Sized,
        S: CheckpointSink + ?Sized,
    {
        info!(
            "start training at step {}, stop at step {}",
            self.step, self.max_steps
        );

        loop {
            match self.train_step(dataset, sink)? {
                TrainState::Running => continue,
                TrainState::StoppedNan => {
                    error!("training diverged at step {}", self.step);
                    break Ok(TrainState::StoppedNan);
                }
                TrainState::StoppedMaxSteps => {
                    info!("reached max step {}", self.max_steps);
                    break Ok(TrainState::StoppedMaxSteps);
                }
            }
        }
    }

    /// Computes both losses on one batch and applies the generator and discriminator updates.
    pub fn train_step<D, S>(&mut self, dataset: &mut D, sink: &mut S) -> Fallible<TrainState>
    where
        D: Dataset + ?Sized,
        S: CheckpointSink + ?Sized,
    {
        if self.step >= self.max_steps {
            return Ok(TrainState::StoppedMaxSteps);
        }

        let input = dataset
            .get_train_batch(self.batch_size)?
            .to_device(self.model.device());
        self.model.check_input(&input)?;
        let input = input.normalize();

        // both losses see the parameters as of the start of the iteration
        let disc_losses = self.discriminator_loss(&input);

        // the discriminator still passes gradient to its input while frozen
        self.model.disc_vs.freeze();
        let gen_losses = self.generator_loss(&input);
        self.model.disc_vs.unfreeze();

        let disc_loss = disc_losses.loss.double_value(&[]);
        let gen_loss = gen_losses.loss.double_value(&[]);
        if disc_loss.is_nan() || gen_loss.is_nan() {
            warn!(
                "NaN loss at step {}: gen loss={}, disc loss={}",
                self.step, gen_loss, disc_loss
            );
            return Ok(TrainState::StoppedNan);
        }

        // the discriminator loss is built on a detached prediction, so the
        // generator update does not alter its graph
        (self.gen_opt)(&gen_losses.loss);
        (self.disc_opt)(&disc_losses.loss);

        self.step += 1;
        let step = self.step;

        self.disp_loss_gen += gen_loss / self.disp_interval as f64;
        self.disp_loss_disc += disc_loss / self.disp_interval as f64;

        if step % self.summary_interval == 0 {
            let summaries: Vec<ScalarSummary> = gen_losses
                .summaries()
                .into_iter()
                .chain(disc_losses.summaries())
                .collect();
            sink.add_summary(&summaries, step)?;
        }

        if step % self.disp_interval == 0 {
            info!(
                "train step {}: gen loss={:.4}, disc loss={:.4}",
                step, self.disp_loss_gen, self.disp_loss_disc
            );
            self.disp_loss_gen = 0.0;
            self.disp_loss_disc = 0.0;
        }

        if step % self.save_interval == 0 {
            info!("train step {}: generating samples", step);
            self.save_samples(dataset, step)?;
            info!("train step {}: saving model", step);
            sink.save(&self.model, step)?;
        }

        if step >= self.max_steps {
            Ok(TrainState::StoppedMaxSteps)
        } else {
            Ok(TrainState::Running)
        }
    }

    fn discriminator_loss(&self, input: &FrameQuad) -> DiscriminatorLoss {
        let predicted = tch::no_grad(|| self.model.generate(input, true));
        let scores = self.model.score(input, &predicted, true);
        objective::discriminator_loss(
            &self.loss,
            &scores.real,
            &scores.generated,
            &scores.mismatched,
        )
    }

    fn generator_loss(&self, input: &FrameQuad) -> GeneratorLoss {
        let predicted = self.model.generate(input, true);
        let prob_gen = self
            .model
            .discriminator
            .forward_t(&predicted, &input.p_t_n, true);
        let features = self.model.perceptual_features(&input.f_t_n, &predicted);
        objective::generator_loss(
            &self.loss,
            &input.f_t_n,
            &predicted,
            &prob_gen,
            features.as_ref().map(|(target, predicted)| (target, predicted)),
        )
    }

    fn save_samples<D>(&self, dataset: &mut D, step: usize) -> Fallible<()>
    where
        D: Dataset + ?Sized,
    {
        let predictor = Predictor::new(&self.model);
        for (output_base, test) in [(&self.train_output_dir, false), (&self.val_output_dir, true)] {
            let output_dir = predict::step_output_dir(output_base, step);
            for batch in dataset.get_val_batch(test)? {
                predictor.save_val_batch(&*dataset, &output_dir, &batch)?;
            }
        }
        Ok(())
    }
}
