use rand::Rng;

use crate::error::{FgsmError, Result};
use crate::math::tensor::Tensor3;
use crate::model::discriminator::Discriminator;
use crate::model::output::OutputSelect;

/// Wasserstein-style gradient penalty `(||∇_u D(u)|| - 1)^2` at a random
/// interpolation `u = alpha * real + (1 - alpha) * fake`.
#[derive(Debug, Clone, Copy)]
pub struct GradientPenalty {
    pub select: OutputSelect,
    /// Step of the central difference used for Hessian-vector products.
    pub hvp_step: f64,
}

/// Batch-averaged penalty and its gradient w.r.t. each real image.
#[derive(Debug, Clone)]
pub struct Penalty {
    pub value: f64,
    pub real_grads: Vec<Tensor3>,
}

impl Default for GradientPenalty {
    fn default() -> Self {
        GradientPenalty {
            select: OutputSelect::Logits,
            hvp_step: 1e-4,
        }
    }
}

impl GradientPenalty {
    /// Draws one interpolation coefficient per pair from U(0, 1).
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        model: &Discriminator,
        reals: &[Tensor3],
        fakes: &[Tensor3],
        rng: &mut R,
    ) -> Result<Penalty> {
        let alphas: Vec<f64> = (0..reals.len()).map(|_| rng.gen::<f64>()).collect();
        self.evaluate_with_alphas(model, reals, fakes, &alphas)
    }

    pub fn evaluate_with_alphas(
        &self,
        model: &Discriminator,
        reals: &[Tensor3],
        fakes: &[Tensor3],
        alphas: &[f64],
    ) -> Result<Penalty> {
        if reals.is_empty() || reals.len() != fakes.len() || reals.len() != alphas.len() {
            return Err(FgsmError::shape(
                format!("{} real/fake/alpha triples", reals.len()),
                format!("{} fakes and {} alphas", fakes.len(), alphas.len()),
            ));
        }

        let batch = reals.len() as f64;
        let ones = vec![1.0; model.output_len(self.select)?];
        let mut value = 0.0;
        let mut real_grads = Vec::with_capacity(reals.len());

        for ((real, fake), &alpha) in reals.iter().zip(fakes).zip(alphas) {
            let mixed = real.zip_map(fake, |r, f| alpha * r + (1.0 - alpha) * f)?;
            let grad = model.input_gradient(&mixed, self.select, &ones)?;
            let norm = grad.l2_norm();
            value += (norm - 1.0).powi(2) / batch;

            // ∂/∂u (||g|| - 1)^2 = 2(||g|| - 1) · H g / ||g||, and ∂u/∂real = alpha.
            let real_grad = if norm > 0.0 {
                let direction = grad.map(|g| g / norm);
                let hv = self.hessian_vector(model, &mixed, &direction, &ones)?;
                hv.map(|h| alpha * 2.0 * (norm - 1.0) * h / batch)
            } else {
                Tensor3::zeros(real.shape())
            };
            real_grads.push(real_grad);
        }

        Ok(Penalty { value, real_grads })
    }

    /// Central difference of input gradients along `direction`.
    fn hessian_vector(
        &self,
        model: &Discriminator,
        point: &Tensor3,
        direction: &Tensor3,
        ones: &[f64],
    ) -> Result<Tensor3> {
        let h = self.hvp_step;
        let ahead = model.input_gradient(&point.add_scaled(direction, h)?, self.select, ones)?;
        let behind = model.input_gradient(&point.add_scaled(direction, -h)?, self.select, ones)?;
        ahead.zip_map(&behind, |a, b| (a - b) / (2.0 * h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::attack::fgsm::perturb;
    use crate::attack::loss::AttackLoss;
    use crate::layers::Layer;
    use crate::math::matrix::Matrix;
    use crate::math::tensor::Shape3;
    use crate::model::spec::{ConvBlockSpec, DiscriminatorSpec};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn linear_model(weights: &[f64]) -> Discriminator {
        Discriminator {
            input_shape: Shape3::new(1, 1, weights.len()),
            blocks: vec![],
            head: Layer {
                size: 1,
                weights: Matrix::from_data(weights.iter().map(|&w| vec![w]).collect()),
                biases: Matrix::zeros(1, 1),
                activator: ActivationFunction::Identity,
            },
            projection1: None,
            projection2: None,
            decision_threshold: 0.0,
        }
    }

    fn tensor(values: &[f64]) -> Tensor3 {
        Tensor3::from_vec(Shape3::new(1, 1, values.len()), values.to_vec()).unwrap()
    }

    #[test]
    fn linear_critic_has_constant_penalty() {
        // ||w|| = 5, so the penalty is (5 - 1)^2 wherever it is evaluated.
        let model = linear_model(&[3.0, 4.0]);
        let gp = GradientPenalty::default();
        let p = gp
            .evaluate_with_alphas(&model, &[tensor(&[0.1, 0.9])], &[tensor(&[0.7, 0.2])], &[0.3])
            .unwrap();
        assert_relative_eq!(p.value, 16.0, epsilon = 1e-12);
        assert!(p.real_grads[0].data.iter().all(|g| g.abs() < 1e-6));
    }

    #[test]
    fn unit_norm_critic_has_zero_penalty() {
        let model = linear_model(&[0.6, 0.8]);
        let p = GradientPenalty::default()
            .evaluate(&model, &[tensor(&[0.5, 0.5])], &[tensor(&[0.0, 1.0])], &mut StdRng::seed_from_u64(4))
            .unwrap();
        assert_relative_eq!(p.value, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn flat_critic_has_unit_penalty_and_no_gradient() {
        let model = linear_model(&[0.0, 0.0]);
        let real = tensor(&[0.4, 0.7]);
        let fake = tensor(&[0.9, 0.1]);
        let p = GradientPenalty::default()
            .evaluate_with_alphas(&model, &[real.clone()], &[fake.clone()], &[0.5])
            .unwrap();
        assert_eq!(p.value, 1.0);
        assert!(p.real_grads[0].data.iter().all(|&g| g == 0.0));

        let loss = AttackLoss::new(OutputSelect::Logits, 10.0)
            .evaluate_with_alpha(&model, &real, &fake, 0.5)
            .unwrap();
        assert_relative_eq!(loss.penalty, 1.0);
        assert!(loss.input_grad.data.iter().all(|&g| g == 0.0));
        assert_eq!(perturb(&real, 0.3, &loss.input_grad).unwrap(), real);
    }

    #[test]
    fn penalty_is_averaged_over_the_batch() {
        let model = linear_model(&[3.0, 4.0]);
        let reals = vec![tensor(&[0.1, 0.2]), tensor(&[0.3, 0.4])];
        let fakes = vec![tensor(&[0.5, 0.6]), tensor(&[0.7, 0.8])];
        let p = GradientPenalty::default()
            .evaluate_with_alphas(&model, &reals, &fakes, &[0.2, 0.9])
            .unwrap();
        assert_relative_eq!(p.value, 16.0, epsilon = 1e-12);
        assert_eq!(p.real_grads.len(), 2);
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let model = linear_model(&[1.0]);
        let gp = GradientPenalty::default();
        assert!(gp.evaluate_with_alphas(&model, &[tensor(&[0.1])], &[], &[0.5]).is_err());
    }

    #[test]
    fn real_gradient_matches_finite_difference_for_smooth_model() {
        let spec = DiscriminatorSpec {
            input_shape: Shape3::new(1, 4, 4),
            blocks: vec![ConvBlockSpec {
                out_channels: 2,
                kernel_size: 3,
                stride: 1,
                padding: 1,
                batch_norm: false,
                activation: ActivationFunction::Tanh,
            }],
            num_classes: 1,
            projection: None,
            decision_threshold: 0.0,
        };
        let model = spec.build(&mut StdRng::seed_from_u64(21)).unwrap();
        let shape = Shape3::new(1, 4, 4);
        let real = Tensor3::from_vec(shape, (0..16).map(|i| 0.5 + 0.3 * (i as f64).sin()).collect()).unwrap();
        let fake = Tensor3::from_vec(shape, (0..16).map(|i| 0.5 + 0.3 * (i as f64).cos()).collect()).unwrap();
        let gp = GradientPenalty::default();
        let alpha = 0.35;

        let penalty_at = |r: &Tensor3| {
            gp.evaluate_with_alphas(&model, &[r.clone()], &[fake.clone()], &[alpha]).unwrap().value
        };
        let analytic = gp
            .evaluate_with_alphas(&model, &[real.clone()], &[fake.clone()], &[alpha])
            .unwrap()
            .real_grads
            .remove(0);

        let h = 1e-5;
        for i in 0..real.len() {
            let mut plus = real.clone();
            let mut minus = real.clone();
            plus.data[i] += h;
            minus.data[i] -= h;
            let numeric = (penalty_at(&plus) - penalty_at(&minus)) / (2.0 * h);
            assert_relative_eq!(analytic.data[i], numeric, epsilon = 1e-4, max_relative = 1e-3);
        }
    }
}
