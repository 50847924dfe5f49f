use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use ferrite_fgsm::layers::Layer;
use ferrite_fgsm::math::Matrix;
use ferrite_fgsm::model::{ArchitectureSpec, ConvBlockSpec, DiscriminatorSpec, GeneratorSpec};
use ferrite_fgsm::{
    perturb, run_experiment, ActivationFunction, AttackContext, AttackLoss, Checkpoint, Dataset,
    Discriminator, ExperimentConfig, Generator, OutputSelect, Sample, Shape3, Tensor3,
};

const SHAPE: Shape3 = Shape3 { channels: 1, height: 4, width: 4 };

/// Linear real/fake critic: score = mean(pixels) - 0.25.
fn mean_critic() -> Discriminator {
    Discriminator {
        input_shape: SHAPE,
        blocks: vec![],
        head: Layer {
            size: 1,
            weights: Matrix::from_data(vec![vec![1.0 / 16.0]; 16]),
            biases: Matrix::from_data(vec![vec![-0.25]]),
            activator: ActivationFunction::Identity,
        },
        projection1: None,
        projection2: None,
        decision_threshold: 0.0,
    }
}

fn small_generator(seed: u64) -> Generator {
    GeneratorSpec {
        latent_dim: 3,
        hidden: vec![6],
        hidden_activation: ActivationFunction::ReLU,
        output_shape: SHAPE,
    }
    .build(&mut StdRng::seed_from_u64(seed))
    .unwrap()
}

/// 982 "real" images whose brightness spreads over [0.3, 0.9].
fn fours() -> Dataset {
    let samples = (0..982)
        .map(|i| {
            let level = 0.3 + 0.6 * i as f64 / 981.0;
            let data = (0..16).map(|p| level + if p % 2 == 0 { 0.05 } else { -0.05 }).collect();
            Sample { image: Tensor3::from_vec(SHAPE, data).unwrap(), label: 1 }
        })
        .collect();
    Dataset { samples }
}

fn config(epsilons: Vec<f64>) -> ExperimentConfig {
    ExperimentConfig { epsilons, plots_dir: None, ..Default::default() }
}

#[test]
fn clean_run_reports_every_sample_correct() {
    let model = mean_critic();
    let generator = small_generator(1);
    let ctx = AttackContext { model: &model, generator: &generator, loss: AttackLoss::new(OutputSelect::Logits, 10.0) };

    let result = run_experiment(&ctx, &fours(), &config(vec![0.0])).unwrap();
    let report = &result.reports[0];
    assert_eq!((report.correct, report.total), (982, 982));
    assert_relative_eq!(report.accuracy, 1.0);

    let zero = result.zero_epsilon.unwrap();
    assert_eq!(zero.len(), 982);
    assert_eq!(zero.images, fours().samples.into_iter().map(|s| s.image).collect::<Vec<_>>());
    assert!(zero.labels.iter().all(|&l| l == 1));
}

#[test]
fn accuracy_degrades_with_epsilon() {
    let model = mean_critic();
    let generator = small_generator(2);
    let ctx = AttackContext { model: &model, generator: &generator, loss: AttackLoss::new(OutputSelect::Logits, 10.0) };
    let epsilons = vec![0.0, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3];

    let result = run_experiment(&ctx, &fours(), &config(epsilons.clone())).unwrap();
    let accuracies: Vec<f64> = result.reports.iter().map(|r| r.accuracy).collect();

    assert_eq!(result.reports.iter().map(|r| r.epsilon).collect::<Vec<_>>(), epsilons);
    assert!(accuracies.windows(2).all(|w| w[1] <= w[0]), "{:?}", accuracies);
    assert!(accuracies[6] <= accuracies[5]);
    assert!(accuracies[6] < 1.0);
    assert!(result.reports.iter().all(|r| r.examples.len() <= 5));
    assert!(result.reports[1..].iter().flat_map(|r| &r.examples).all(|e| e.adversarial_pred == 0));
}

#[test]
fn perturbation_stays_in_unit_box_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let image = Tensor3::from_vec(SHAPE, (0..16).map(|_| rng.gen::<f64>()).collect()).unwrap();
        let grad = Tensor3::from_vec(SHAPE, (0..16).map(|_| rng.gen::<f64>() - 0.5).collect()).unwrap();
        let eps: f64 = rng.gen();
        let out = perturb(&image, eps, &grad).unwrap();
        assert_eq!(out.shape(), image.shape());
        assert!(out.data.iter().all(|v| (0.0..=1.0).contains(v)));
        for ((o, x), g) in out.data.iter().zip(&image.data).zip(&grad.data) {
            let unclipped = x + eps * g.signum();
            if (0.0..=1.0).contains(&unclipped) {
                assert_relative_eq!((o - x).abs(), eps, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn conv_pipeline_matches_clean_accuracy_at_zero() {
    let leaky = ActivationFunction::LeakyReLU { alpha: 0.2 };
    let arch = ArchitectureSpec {
        name: "tiny".into(),
        description: None,
        output_labels: None,
        discriminator: DiscriminatorSpec {
            input_shape: SHAPE,
            blocks: vec![
                ConvBlockSpec { out_channels: 3, kernel_size: 3, stride: 1, padding: 1, batch_norm: false, activation: leaky },
                ConvBlockSpec { out_channels: 4, kernel_size: 2, stride: 2, padding: 0, batch_norm: true, activation: leaky },
            ],
            num_classes: 1,
            projection: None,
            decision_threshold: 0.0,
        },
        generator: GeneratorSpec {
            latent_dim: 4,
            hidden: vec![8],
            hidden_activation: ActivationFunction::ReLU,
            output_shape: SHAPE,
        },
    };
    let checkpoint = arch.build(&mut StdRng::seed_from_u64(17)).unwrap();
    let dataset = fours();
    let clean_correct = dataset
        .samples
        .iter()
        .filter(|s| checkpoint.discriminator.predict(&s.image).unwrap() == s.label)
        .count();

    let ctx = AttackContext {
        model: &checkpoint.discriminator,
        generator: &checkpoint.generator,
        loss: AttackLoss::new(OutputSelect::Logits, 10.0),
    };
    let result = run_experiment(&ctx, &dataset, &config(vec![0.0, 0.1])).unwrap();
    assert_eq!(result.reports[0].correct, clean_correct);
    assert_eq!(result.reports[0].skipped, 982 - clean_correct);
    assert_eq!(result.zero_epsilon.unwrap().len(), clean_correct);
    assert!(result.reports[1].correct <= 982);
}

#[test]
fn checkpoint_file_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("weights.json");
    let data = dir.path().join("test.json");
    let checkpoint = Checkpoint {
        metadata: Default::default(),
        discriminator: mean_critic(),
        generator: small_generator(3),
    };
    checkpoint.save_json(&weights).unwrap();
    fours().save_json(&data).unwrap();

    let loaded = Checkpoint::load_json(&weights).unwrap();
    let dataset = Dataset::load_json(&data).unwrap();
    let ctx = AttackContext {
        model: &loaded.discriminator,
        generator: &loaded.generator,
        loss: AttackLoss::new(OutputSelect::Logits, 10.0),
    };
    let result = run_experiment(&ctx, &dataset, &config(vec![0.0, 0.2])).unwrap();

    let out = dir.path().join("perturbed.json");
    result.zero_epsilon.as_ref().unwrap().save_json(&out).unwrap();
    let reloaded = ferrite_fgsm::PerturbedSet::load_json(&out).unwrap();
    assert_eq!(reloaded.len(), 982);

    let plots = dir.path().join("plots");
    std::fs::create_dir_all(&plots).unwrap();
    ferrite_fgsm::plot::render_accuracy_curve(&result.reports, plots.join("accuracy.png")).unwrap();
    ferrite_fgsm::plot::render_example_grid(&result.reports, |c| loaded.label_name(c), plots.join("examples.png"))
        .unwrap();
    assert!(plots.join("examples.png").exists());
}

#[test]
fn checkpoint_with_broken_head_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("weights.json");
    let mut discriminator = mean_critic();
    discriminator.head.weights = Matrix::zeros(15, 1);
    let checkpoint = Checkpoint { metadata: Default::default(), discriminator, generator: small_generator(4) };
    checkpoint.save_json(&weights).unwrap();
    assert!(Checkpoint::load_json(&weights).is_err());
}
