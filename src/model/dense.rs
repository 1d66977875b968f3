//! Fully connected layer with cached forward pass for backpropagation.

use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation applied after the linear transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
}

impl Activation {
    fn forward(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Linear => z.clone(),
            Activation::Relu => z.mapv(|v| v.max(0.0)),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Linear => Array2::ones(z.dim()),
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

/// Dense layer: `output = activation(input.dot(weights) + biases)`
#[derive(Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix `(input_size, output_size)`
    pub weights: Array2<f64>,
    /// Bias vector `(output_size,)`
    pub biases: Array1<f64>,
    pub activation: Activation,
    pub input_size: usize,
    pub output_size: usize,
    /// Inverted-dropout rate applied during training (0.0 disables)
    pub dropout_rate: f64,

    // Cached values for backpropagation (not serialized)
    #[serde(skip)]
    last_input: Option<Array2<f64>>,
    #[serde(skip)]
    last_z: Option<Array2<f64>>,
    #[serde(skip)]
    dropout_mask: Option<Array2<f64>>,
}

impl Dense {
    /// Create a layer with Xavier initialization
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights = Array2::random((input_size, output_size), Uniform::new(-limit, limit));
        let biases = Array1::zeros(output_size);

        Self {
            weights,
            biases,
            activation,
            input_size,
            output_size,
            dropout_rate: 0.0,
            last_input: None,
            last_z: None,
            dropout_mask: None,
        }
    }

    /// Set the dropout rate
    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Caching forward pass. Dropout is applied only when `training`.
    pub fn forward(&mut self, input: &Array2<f64>, training: bool) -> Array2<f64> {
        self.last_input = Some(input.clone());

        let mut z = input.dot(&self.weights);
        for mut row in z.rows_mut() {
            row += &self.biases;
        }
        self.last_z = Some(z.clone());

        let mut output = self.activation.forward(&z);

        if training && self.dropout_rate > 0.0 {
            let mut rng = rand::thread_rng();
            let keep = 1.0 - self.dropout_rate;
            let mask = Array2::from_shape_fn(output.dim(), |_| {
                if rng.gen::<f64>() < keep {
                    1.0 / keep
                } else {
                    0.0
                }
            });
            output = &output * &mask;
            self.dropout_mask = Some(mask);
        } else {
            self.dropout_mask = None;
        }

        output
    }

    /// Pure forward pass: no cache, no dropout. Used at inference so a
    /// prediction never perturbs training state.
    pub fn apply(&self, input: &Array2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights);
        for mut row in z.rows_mut() {
            row += &self.biases;
        }
        self.activation.forward(&z)
    }

    /// Backward pass from the cached forward.
    /// Returns `(input_gradient, weight_gradient, bias_gradient)`.
    pub fn backward(&self, output_gradient: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let z = self.last_z.as_ref().expect("forward must precede backward");
        let input = self
            .last_input
            .as_ref()
            .expect("forward must precede backward");

        let grad = match &self.dropout_mask {
            Some(mask) => output_gradient * mask,
            None => output_gradient.clone(),
        };

        let delta = &grad * &self.activation.derivative(z);

        let weight_gradient = input.t().dot(&delta);
        let bias_gradient = delta.sum_axis(Axis(0));
        let input_gradient = delta.dot(&self.weights.t());

        (input_gradient, weight_gradient, bias_gradient)
    }

    /// Number of trainable parameters
    pub fn num_params(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

impl Clone for Dense {
    fn clone(&self) -> Self {
        Self {
            weights: self.weights.clone(),
            biases: self.biases.clone(),
            activation: self.activation,
            input_size: self.input_size,
            output_size: self.output_size,
            dropout_rate: self.dropout_rate,
            last_input: None,
            last_z: None,
            dropout_mask: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_forward_shape() {
        let mut layer = Dense::new(4, 3, Activation::Relu);
        let input = Array2::ones((2, 4));
        let output = layer.forward(&input, false);
        assert_eq!(output.dim(), (2, 3));
    }

    #[test]
    fn test_apply_matches_forward_without_dropout() {
        let mut layer = Dense::new(5, 2, Activation::Linear);
        let input = Array2::from_shape_fn((3, 5), |(i, j)| (i + j) as f64 * 0.1);
        let cached = layer.forward(&input, false);
        let pure = layer.apply(&input);
        for (a, b) in cached.iter().zip(pure.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_backward_gradient_check() {
        let mut layer = Dense::new(3, 2, Activation::Relu);
        let input = Array2::from_shape_fn((4, 3), |(i, j)| (i as f64 - 1.5) * 0.3 + j as f64 * 0.2);

        // Loss = sum of outputs; output gradient is all ones
        let _ = layer.forward(&input, false);
        let ones = Array2::ones((4, 2));
        let (_, weight_grad, bias_grad) = layer.backward(&ones);

        let eps = 1e-6;
        for &(i, j) in &[(0usize, 0usize), (1, 1), (2, 0)] {
            let original = layer.weights[[i, j]];
            layer.weights[[i, j]] = original + eps;
            let plus: f64 = layer.apply(&input).sum();
            layer.weights[[i, j]] = original - eps;
            let minus: f64 = layer.apply(&input).sum();
            layer.weights[[i, j]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_relative_eq!(weight_grad[[i, j]], numeric, epsilon = 1e-4);
        }

        let original = layer.biases[0];
        layer.biases[0] = original + eps;
        let plus: f64 = layer.apply(&input).sum();
        layer.biases[0] = original - eps;
        let minus: f64 = layer.apply(&input).sum();
        layer.biases[0] = original;
        assert_relative_eq!(bias_grad[0], (plus - minus) / (2.0 * eps), epsilon = 1e-4);
    }

    #[test]
    fn test_num_params() {
        let layer = Dense::new(10, 5, Activation::Relu);
        assert_eq!(layer.num_params(), 10 * 5 + 5);
    }
}
