use rand::Rng;

use crate::attack::penalty::GradientPenalty;
use crate::error::Result;
use crate::math::tensor::Tensor3;
use crate::model::discriminator::Discriminator;
use crate::model::output::OutputSelect;

/// Loss whose input gradient drives the FGSM step:
///
/// `mean(D(counterpart)) - mean(D(image)) + penalty_weight * GP(image, counterpart)`
#[derive(Debug, Clone, Copy)]
pub struct AttackLoss {
    pub select: OutputSelect,
    pub penalty_weight: f64,
    pub penalty: GradientPenalty,
}

/// Loss value, its terms, and ∂loss/∂image.
#[derive(Debug, Clone)]
pub struct LossGradient {
    pub value: f64,
    pub clean_mean: f64,
    pub counterpart_mean: f64,
    pub penalty: f64,
    pub input_grad: Tensor3,
}

impl AttackLoss {
    pub fn new(select: OutputSelect, penalty_weight: f64) -> AttackLoss {
        AttackLoss {
            select,
            penalty_weight,
            penalty: GradientPenalty { select, ..GradientPenalty::default() },
        }
    }

    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        model: &Discriminator,
        image: &Tensor3,
        counterpart: &Tensor3,
        rng: &mut R,
    ) -> Result<LossGradient> {
        let alpha = rng.gen::<f64>();
        self.evaluate_with_alpha(model, image, counterpart, alpha)
    }

    pub fn evaluate_with_alpha(
        &self,
        model: &Discriminator,
        image: &Tensor3,
        counterpart: &Tensor3,
        alpha: f64,
    ) -> Result<LossGradient> {
        let clean = model.forward(image, self.select)?;
        let fake = model.forward(counterpart, self.select)?;
        let clean_mean = mean(&clean);
        let counterpart_mean = mean(&fake);

        // -mean(D(image)) contributes -1/k per output.
        let upstream = vec![-1.0 / clean.len().max(1) as f64; clean.len()];
        let mut input_grad = model.input_gradient(image, self.select, &upstream)?;

        let mut penalty = 0.0;
        if self.penalty_weight != 0.0 {
            let gp = self.penalty.evaluate_with_alphas(
                model,
                std::slice::from_ref(image),
                std::slice::from_ref(counterpart),
                &[alpha],
            )?;
            penalty = gp.value;
            input_grad = input_grad.add_scaled(&gp.real_grads[0], self.penalty_weight)?;
        }

        Ok(LossGradient {
            value: counterpart_mean - clean_mean + self.penalty_weight * penalty,
            clean_mean,
            counterpart_mean,
            penalty,
            input_grad,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::layers::Layer;
    use crate::math::matrix::Matrix;
    use crate::math::tensor::Shape3;
    use crate::model::spec::{ConvBlockSpec, DiscriminatorSpec};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn linear_critic_gradient_is_negative_weights() {
        let model = Discriminator {
            input_shape: Shape3::new(1, 1, 2),
            blocks: vec![],
            head: Layer {
                size: 1,
                weights: Matrix::from_data(vec![vec![3.0], vec![-4.0]]),
                biases: Matrix::from_data(vec![vec![0.5]]),
                activator: ActivationFunction::Identity,
            },
            projection1: None,
            projection2: None,
            decision_threshold: 0.0,
        };
        let image = Tensor3::from_vec(Shape3::new(1, 1, 2), vec![0.2, 0.1]).unwrap();
        let fake = Tensor3::from_vec(Shape3::new(1, 1, 2), vec![0.0, 0.0]).unwrap();
        let loss = AttackLoss::new(OutputSelect::Logits, 10.0);
        let out = loss.evaluate_with_alpha(&model, &image, &fake, 0.5).unwrap();

        assert_relative_eq!(out.clean_mean, 0.6 - 0.4 + 0.5);
        assert_relative_eq!(out.counterpart_mean, 0.5);
        assert_relative_eq!(out.penalty, 16.0, epsilon = 1e-12);
        assert_relative_eq!(out.value, 0.5 - 0.7 + 160.0, epsilon = 1e-9);
        assert_relative_eq!(out.input_grad.data[0], -3.0, epsilon = 1e-6);
        assert_relative_eq!(out.input_grad.data[1], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn gradient_matches_finite_difference_of_value() {
        let spec = DiscriminatorSpec {
            input_shape: Shape3::new(1, 4, 4),
            blocks: vec![ConvBlockSpec {
                out_channels: 2,
                kernel_size: 2,
                stride: 2,
                padding: 0,
                batch_norm: true,
                activation: ActivationFunction::Tanh,
            }],
            num_classes: 3,
            projection: None,
            decision_threshold: 0.0,
        };
        let model = spec.build(&mut StdRng::seed_from_u64(8)).unwrap();
        let shape = Shape3::new(1, 4, 4);
        let image = Tensor3::from_vec(shape, (0..16).map(|i| 0.4 + 0.2 * (i as f64 * 0.5).sin()).collect()).unwrap();
        let fake = Tensor3::from_vec(shape, (0..16).map(|i| 0.6 - 0.2 * (i as f64 * 0.3).cos()).collect()).unwrap();
        let loss = AttackLoss::new(OutputSelect::Logits, 2.0);
        let alpha = 0.6;

        let analytic = loss.evaluate_with_alpha(&model, &image, &fake, alpha).unwrap().input_grad;
        let h = 1e-5;
        for i in 0..image.len() {
            let mut plus = image.clone();
            let mut minus = image.clone();
            plus.data[i] += h;
            minus.data[i] -= h;
            let numeric = (loss.evaluate_with_alpha(&model, &plus, &fake, alpha).unwrap().value
                - loss.evaluate_with_alpha(&model, &minus, &fake, alpha).unwrap().value)
                / (2.0 * h);
            assert_relative_eq!(analytic.data[i], numeric, epsilon = 1e-4, max_relative = 1e-3);
        }
    }
}
