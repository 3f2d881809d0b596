use crate::{common::*, config::LossConfig, params, sink::ScalarSummary};

/// Mean squared difference over all elements.
pub fn l2_loss(x: &Tensor, y: &Tensor) -> Tensor {
    x.mse_loss(y, Reduction::Mean)
}

#[derive(Debug)]
pub struct GeneratorLoss {
    pub l2_loss: Tensor,
    pub adv_loss: Tensor,
    pub feat_loss: Option<Tensor>,
    pub loss: Tensor,
}

impl GeneratorLoss {
    pub fn summaries(&self) -> Vec<ScalarSummary> {
        let mut summaries = vec![
            ScalarSummary::new("generator/l2_loss", &self.l2_loss),
            ScalarSummary::new("generator/adv_loss", &self.adv_loss),
        ];
        if let Some(feat_loss) = &self.feat_loss {
            summaries.push(ScalarSummary::new("generator/feat_loss", feat_loss));
        }
        summaries.push(ScalarSummary::new("generator/loss", &self.loss));
        summaries
    }
}

#[derive(Debug)]
pub struct DiscriminatorLoss {
    pub real_loss: Tensor,
    pub gen_loss: Tensor,
    pub mismatch_loss: Tensor,
    pub loss: Tensor,
}

impl DiscriminatorLoss {
    pub fn summaries(&self) -> Vec<ScalarSummary> {
        vec![
            ScalarSummary::new("discriminator/real_loss", &self.real_loss),
            ScalarSummary::new("discriminator/gen_loss", &self.gen_loss),
            ScalarSummary::new("discriminator/mismatch_loss", &self.mismatch_loss),
            ScalarSummary::new("discriminator/loss", &self.loss),
        ]
    }
}

/// Builds the generator objective.
///
/// `target` and `predicted` are normalized frames, `prob_gen` is the discriminator
/// output on the generated pair. `features` holds the perceptual features of the
/// target and the prediction when the perceptual term is enabled.
pub fn generator_loss(
    coefs: &LossConfig,
    target: &Tensor,
    predicted: &Tensor,
    prob_gen: &Tensor,
    features: Option<(&Tensor, &Tensor)>,
) -> GeneratorLoss {
    let l2 = l2_loss(target, predicted);
    let adv = -prob_gen.log().mean(Kind::Float);
    let mut loss = &l2 * coefs.l2_coef + &adv * coefs.adv_coef;

    let feat = features.map(|(target_features, predicted_features)| {
        l2_loss(target_features, predicted_features)
    });
    if let Some(feat) = &feat {
        loss = loss + feat * coefs.feat_coef;
    }

    GeneratorLoss {
        l2_loss: l2,
        adv_loss: adv,
        feat_loss: feat,
        loss,
    }
}

/// Builds the discriminator objective from the scores of the real, generated and
/// mismatched pairs.
///
/// The real score is floored at 0.01 and the fake terms use `1.01 - p` so that no
/// log of zero is taken.
pub fn discriminator_loss(
    coefs: &LossConfig,
    prob_real: &Tensor,
    prob_gen: &Tensor,
    prob_mismatch: &Tensor,
) -> DiscriminatorLoss {
    let real = -prob_real
        .clamp_min(params::REAL_PROB_FLOOR)
        .log()
        .mean(Kind::Float);
    let fake_term = |prob: &Tensor| -(-prob + params::FAKE_PROB_CEIL).log().mean(Kind::Float);
    let gen = fake_term(prob_gen);
    let mismatch = fake_term(prob_mismatch);

    let loss =
        &real * coefs.real_coef + &gen * coefs.gen_coef + &mismatch * coefs.mismatch_coef;

    DiscriminatorLoss {
        real_loss: real,
        gen_loss: gen,
        mismatch_loss: mismatch,
        loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(values: &[f32]) -> Tensor {
        Tensor::of_slice(values)
    }

    #[test]
    fn real_loss_is_finite_at_zero() {
        let coefs = LossConfig::default();
        let losses = discriminator_loss(
            &coefs,
            &full(&[0.0, 0.0]),
            &full(&[1.0, 1.0]),
            &full(&[1.0, 1.0]),
        );

        for value in [&losses.real_loss, &losses.gen_loss, &losses.mismatch_loss, &losses.loss] {
            let value = value.double_value(&[]);
            assert!(value.is_finite(), "loss is not finite: {}", value);
        }
        assert!((losses.real_loss.double_value(&[]) + 0.01_f64.ln()).abs() < 1e-5);
        assert!((losses.gen_loss.double_value(&[]) + 0.01_f64.ln()).abs() < 1e-4);
    }

    #[test]
    fn discriminator_loss_weights_terms() {
        let coefs = LossConfig {
            real_coef: 2.0,
            gen_coef: 3.0,
            mismatch_coef: 0.5,
            ..LossConfig::default()
        };
        let losses = discriminator_loss(
            &coefs,
            &full(&[0.5, 0.8]),
            &full(&[0.2, 0.4]),
            &full(&[0.3, 0.1]),
        );

        let real = -(0.5_f64.ln() + 0.8_f64.ln()) / 2.0;
        let gen = -(0.81_f64.ln() + 0.61_f64.ln()) / 2.0;
        let mismatch = -(0.71_f64.ln() + 0.91_f64.ln()) / 2.0;
        let expect = 2.0 * real + 3.0 * gen + 0.5 * mismatch;

        assert!((losses.real_loss.double_value(&[]) - real).abs() < 1e-5);
        assert!((losses.gen_loss.double_value(&[]) - gen).abs() < 1e-5);
        assert!((losses.mismatch_loss.double_value(&[]) - mismatch).abs() < 1e-5);
        assert!((losses.loss.double_value(&[]) - expect).abs() < 1e-4);
    }

    #[test]
    fn generator_loss_with_and_without_features() {
        let coefs = LossConfig {
            l2_coef: 2.0,
            adv_coef: 1.0,
            feat_coef: 0.5,
            ..LossConfig::default()
        };
        let target = full(&[1.0, -1.0]);
        let predicted = full(&[0.0, 0.0]);
        let prob_gen = full(&[0.5, 0.5]);

        let losses = generator_loss(&coefs, &target, &predicted, &prob_gen, None);
        let adv = -(0.5_f64.ln());
        assert!(losses.feat_loss.is_none());
        assert!((losses.l2_loss.double_value(&[]) - 1.0).abs() < 1e-6);
        assert!((losses.loss.double_value(&[]) - (2.0 + adv)).abs() < 1e-5);
        assert_eq!(losses.summaries().len(), 3);

        let feat_target = full(&[2.0, 2.0]);
        let feat_pred = full(&[0.0, 0.0]);
        let losses = generator_loss(
            &coefs,
            &target,
            &predicted,
            &prob_gen,
            Some((&feat_target, &feat_pred)),
        );
        let feat = losses.feat_loss.as_ref().unwrap().double_value(&[]);
        assert!((feat - 4.0).abs() < 1e-6);
        assert!((losses.loss.double_value(&[]) - (2.0 + adv + 2.0)).abs() < 1e-5);
        assert_eq!(losses.summaries().len(), 4);
    }
}
