use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::attack::fgsm::{check_epsilon, perturb};
use crate::attack::loss::AttackLoss;
use crate::data::dataset::{Dataset, PerturbedSet};
use crate::error::{FgsmError, Result};
use crate::eval::config::ExperimentConfig;
use crate::eval::report::{AdversarialExample, EpsilonReport};
use crate::model::discriminator::Discriminator;
use crate::model::generator::Generator;

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// The models and loss an evaluation runs against. Passed explicitly so the
/// loop holds no ambient state.
#[derive(Debug, Clone, Copy)]
pub struct AttackContext<'a> {
    pub model: &'a Discriminator,
    pub generator: &'a Generator,
    pub loss: AttackLoss,
}

/// One epsilon's report plus the perturbed images it produced. The images
/// are only collected when `epsilon == 0`.
#[derive(Debug, Clone)]
pub struct EpsilonRun {
    pub report: EpsilonReport,
    pub perturbed: PerturbedSet,
}

/// Every report in epsilon order, plus the zero-epsilon perturbed set when
/// zero was part of the sweep.
#[derive(Debug, Clone)]
pub struct ExperimentResult {
    pub reports: Vec<EpsilonReport>,
    pub zero_epsilon: Option<PerturbedSet>,
}

/// Attacks every sample of `dataset` at a single `epsilon`.
///
/// Per sample: classify the clean image and skip it if it is already wrong;
/// otherwise take the loss gradient against a fresh generator sample,
/// perturb, and classify again. Examples: at epsilon 0 the first
/// `examples_cap` samples that stay correct, otherwise the first
/// `examples_cap` that flip.
///
/// # Errors
/// Any model, shape or gradient error aborts the whole pass.
pub fn run_epsilon<R: Rng + ?Sized>(
    ctx: &AttackContext<'_>,
    dataset: &Dataset,
    epsilon: f64,
    examples_cap: usize,
    rng: &mut R,
) -> Result<EpsilonRun> {
    check_epsilon(epsilon)?;
    let t_start = Instant::now();
    let keep_perturbed = epsilon == 0.0;

    let mut correct = 0usize;
    let mut skipped = 0usize;
    let mut examples = Vec::new();
    let mut perturbed = PerturbedSet::default();

    for (idx, sample) in dataset.samples.iter().enumerate() {
        let original_pred = ctx.model.predict(&sample.image)?;
        if original_pred != sample.label {
            skipped += 1;
            debug!(idx, label = sample.label, original_pred, "skipping misclassified sample");
            continue;
        }

        let counterpart = ctx.generator.sample(rng)?;
        let loss = ctx.loss.evaluate(ctx.model, &sample.image, &counterpart, rng)?;
        let adversarial = perturb(&sample.image, epsilon, &loss.input_grad)?;
        let adversarial_pred = ctx.model.predict(&adversarial)?;
        debug!(idx, loss = loss.value, penalty = loss.penalty, adversarial_pred, "perturbed sample");

        if adversarial_pred == sample.label {
            correct += 1;
            if keep_perturbed && examples.len() < examples_cap {
                examples.push(AdversarialExample {
                    original_pred,
                    adversarial_pred,
                    image: adversarial.clone(),
                });
            }
        } else if examples.len() < examples_cap {
            examples.push(AdversarialExample {
                original_pred,
                adversarial_pred,
                image: adversarial.clone(),
            });
        }

        if keep_perturbed {
            perturbed.push(adversarial, sample.label);
        }
    }

    let total = dataset.len();
    let accuracy = if total == 0 { 0.0 } else { correct as f64 / total as f64 };
    let report = EpsilonReport {
        epsilon,
        correct,
        total,
        accuracy,
        skipped,
        examples,
        elapsed_ms: t_start.elapsed().as_millis() as u64,
    };

    Ok(EpsilonRun { report, perturbed })
}

/// Sweeps `config.epsilons` in order, printing one result line per epsilon.
pub fn run_experiment(
    ctx: &AttackContext<'_>,
    dataset: &Dataset,
    config: &ExperimentConfig,
) -> Result<ExperimentResult> {
    config.validate()?;
    check_dataset(ctx, dataset)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut reports = Vec::with_capacity(config.epsilons.len());
    let mut zero_epsilon = None;

    for &epsilon in &config.epsilons {
        let run = run_epsilon(ctx, dataset, epsilon, config.examples_per_epsilon, &mut rng)?;
        println!("{}", run.report);
        info!(
            epsilon,
            correct = run.report.correct,
            total = run.report.total,
            skipped = run.report.skipped,
            elapsed_ms = run.report.elapsed_ms,
            "epsilon evaluated"
        );

        if epsilon == 0.0 && zero_epsilon.is_none() {
            zero_epsilon = Some(run.perturbed);
        }
        reports.push(run.report);
    }

    warn_on_accuracy_rise(&reports);
    Ok(ExperimentResult { reports, zero_epsilon })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn check_dataset(ctx: &AttackContext<'_>, dataset: &Dataset) -> Result<()> {
    let shape = dataset
        .image_shape()
        .ok_or_else(|| FgsmError::InvalidDataset("dataset holds no samples".into()))?;
    if shape != ctx.model.input_shape {
        return Err(FgsmError::shape(ctx.model.input_shape, shape));
    }
    if ctx.generator.output_shape != ctx.model.input_shape {
        return Err(FgsmError::shape(ctx.model.input_shape, ctx.generator.output_shape));
    }
    Ok(())
}

/// Accuracy is expected to fall as epsilon grows; a rise is worth a note
/// but is not an error.
fn warn_on_accuracy_rise(reports: &[EpsilonReport]) {
    for pair in reports.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if hi.epsilon > lo.epsilon && hi.accuracy > lo.accuracy {
            warn!(
                from = lo.epsilon,
                to = hi.epsilon,
                before = lo.accuracy,
                after = hi.accuracy,
                "accuracy rose with a stronger perturbation"
            );
        }
    }
}
