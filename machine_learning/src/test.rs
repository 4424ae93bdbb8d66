#![cfg(test)]

use ndarray::{Array2, ArrayD, IxDyn, s};
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Classifier, LinearClassifier, MlErr, MultiLayerClassifier, ParameterMapping,
};

fn uniform() -> Uniform<f32> {
    Uniform::new(-2., 2.).unwrap()
}

/// Replaces every parameter of `template` with random values of the same shape.
fn random_params(template: ParameterMapping, rng: &mut StdRng) -> ParameterMapping {
    template
        .iter()
        .map(|(name, t)| {
            let shape = t.shape().to_vec();
            (name.to_string(), ArrayD::random_using(IxDyn(&shape), uniform(), rng))
        })
        .collect()
}

fn random_batch(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f32> {
    Array2::random_using((rows, cols), uniform(), rng)
}

#[test]
fn test_linear_probabilities_sum_to_one() {
    let mut rng = StdRng::seed_from_u64(7);

    for (input_dim, class_count) in [(1, 2), (3, 2), (8, 3), (13, 7)] {
        let mut model = LinearClassifier::new(input_dim, class_count).unwrap();

        let fresh = model
            .forward_probabilities(random_batch(5, input_dim, &mut rng).view())
            .unwrap();
        for row in fresh.rows() {
            assert!((row.sum() - 1.).abs() < 1e-5);
        }

        model
            .bind(&random_params(model.parameters(), &mut rng))
            .unwrap();
        for rows in [1, 4, 32] {
            let x = random_batch(rows, input_dim, &mut rng);
            let probs = model.forward_probabilities(x.view()).unwrap();

            assert_eq!(probs.dim(), (rows, class_count));
            for row in probs.rows() {
                assert!((row.sum() - 1.).abs() < 1e-5);
                assert!(row.iter().all(|&p| (0. ..=1.).contains(&p)));
            }
        }
    }
}

#[test]
fn test_ground_truth_importance_matches_weights() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut model = LinearClassifier::binary(9).unwrap();
    model
        .bind(&random_params(model.parameters(), &mut rng))
        .unwrap();

    let importance = model.ground_truth_importance().unwrap();
    let w = model.weights();

    assert_eq!(importance.len(), 9);
    for j in 0..9 {
        assert_eq!(importance[j], w[[1, j]] - w[[0, j]]);
    }
}

#[test]
fn test_extract_then_resume_reproduces_logits() {
    let mut rng = StdRng::seed_from_u64(3);

    for activation in ["relu", "leaky_relu", "sigmoid", "tanh"] {
        let mut model = MultiLayerClassifier::new(6, &[10, 8, 4], 3, activation).unwrap();
        model
            .bind(&random_params(model.parameters(), &mut rng))
            .unwrap();

        let x = random_batch(16, 6, &mut rng);
        let logits = model.forward_logits(x.view()).unwrap();

        for i in 0..model.hidden_layer_count() {
            let mut a = model.extract_layer_activation(x.view(), i, true).unwrap();
            for layer in &model.layers()[i + 1..] {
                a = layer.forward(a.view()).unwrap();
            }
            assert_eq!(a, logits, "{activation}: resuming from hidden layer {i}");

            let z = model.extract_layer_activation(x.view(), i, false).unwrap();
            assert_eq!(model.layers()[i].activate(z), model.extract_layer_activation(x.view(), i, true).unwrap());
        }
    }
}

#[test]
fn test_extract_index_boundary() {
    let model = MultiLayerClassifier::binary(4, &[100, 100]).unwrap();
    let x = Array2::<f32>::ones((2, 4));
    let hidden = model.hidden_layer_count();

    let last = model
        .extract_layer_activation(x.view(), hidden - 1, true)
        .unwrap();
    assert_eq!(last.dim(), (2, 100));

    let err = model
        .extract_layer_activation(x.view(), hidden, true)
        .unwrap_err();
    assert_eq!(
        err,
        MlErr::LayerIndexOutOfRange {
            requested: 2,
            hidden_layers: 2,
        }
    );
    assert!(err.to_string().contains("only 2 hidden layers"));
}

#[test]
fn test_mlp_batch_rows_are_independent() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut model = MultiLayerClassifier::binary(4, &[8, 8]).unwrap();
    model
        .bind(&random_params(model.parameters(), &mut rng))
        .unwrap();

    let x = random_batch(6, 4, &mut rng);
    let batch = model.predict_probabilities(x.view()).unwrap();

    for i in 0..6 {
        let row = x.slice(s![i..i + 1, ..]);
        let alone = model.predict_batch(row).unwrap();
        for (a, b) in alone.row(0).iter().zip(batch.row(i)) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
