//! GRU sequence encoder with backpropagation through time.
//!
//! The cell follows the classic formulation with the reset gate applied to
//! the previous hidden state before the hidden matmul:
//!
//! ```text
//! z = σ(W_iz x + W_hz h + b_z)
//! r = σ(W_ir x + W_hr h + b_r)
//! n = tanh(W_in x + W_hn (r ⊙ h) + b_n)
//! h' = (1 - z) ⊙ n + z ⊙ h
//! ```
//!
//! The hidden state after the final step is the pooled representation of
//! the window. The encoder is the only part of the model that touches the
//! sequence dimension, so swapping in a different encoder only means
//! replacing this module's forward/backward pair.

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

use super::optimizer::Optimizer;

fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

fn tanh(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(f64::tanh)
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

/// GRU cell parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruCell {
    pub input_size: usize,
    pub hidden_size: usize,

    // Update gate
    w_iz: Array2<f64>,
    w_hz: Array2<f64>,
    b_z: Array1<f64>,

    // Reset gate
    w_ir: Array2<f64>,
    w_hr: Array2<f64>,
    b_r: Array1<f64>,

    // Candidate state
    w_in: Array2<f64>,
    w_hn: Array2<f64>,
    b_n: Array1<f64>,
}

/// Per-step activations cached during the forward pass
#[derive(Debug, Clone)]
pub struct GruStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    z: Array1<f64>,
    r: Array1<f64>,
    n: Array1<f64>,
}

/// Gradient accumulator mirroring the cell tensors
#[derive(Debug, Clone)]
pub struct GruGrads {
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_z: Array1<f64>,
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_r: Array1<f64>,
    pub w_in: Array2<f64>,
    pub w_hn: Array2<f64>,
    pub b_n: Array1<f64>,
}

impl GruGrads {
    fn zeros(input_size: usize, hidden_size: usize) -> Self {
        Self {
            w_iz: Array2::zeros((hidden_size, input_size)),
            w_hz: Array2::zeros((hidden_size, hidden_size)),
            b_z: Array1::zeros(hidden_size),
            w_ir: Array2::zeros((hidden_size, input_size)),
            w_hr: Array2::zeros((hidden_size, hidden_size)),
            b_r: Array1::zeros(hidden_size),
            w_in: Array2::zeros((hidden_size, input_size)),
            w_hn: Array2::zeros((hidden_size, hidden_size)),
            b_n: Array1::zeros(hidden_size),
        }
    }

    /// Sum of squared entries across every tensor
    pub fn squared_norm(&self) -> f64 {
        let mats = [
            &self.w_iz, &self.w_hz, &self.w_ir, &self.w_hr, &self.w_in, &self.w_hn,
        ];
        let vecs = [&self.b_z, &self.b_r, &self.b_n];
        mats.iter().map(|m| m.mapv(|v| v * v).sum()).sum::<f64>()
            + vecs.iter().map(|v| v.mapv(|v| v * v).sum()).sum::<f64>()
    }

    /// Scale every tensor in place
    pub fn scale(&mut self, factor: f64) {
        self.w_iz *= factor;
        self.w_hz *= factor;
        self.b_z *= factor;
        self.w_ir *= factor;
        self.w_hr *= factor;
        self.b_r *= factor;
        self.w_in *= factor;
        self.w_hn *= factor;
        self.b_n *= factor;
    }
}

/// One optimizer per cell tensor group. Each bias shares the instance of
/// its input-weight matrix so Adam step counters stay aligned.
pub struct GruOptimizer {
    update_in: Box<dyn Optimizer>,
    update_hid: Box<dyn Optimizer>,
    reset_in: Box<dyn Optimizer>,
    reset_hid: Box<dyn Optimizer>,
    cand_in: Box<dyn Optimizer>,
    cand_hid: Box<dyn Optimizer>,
}

impl GruOptimizer {
    pub fn new(prototype: &dyn Optimizer) -> Self {
        Self {
            update_in: prototype.clone_box(),
            update_hid: prototype.clone_box(),
            reset_in: prototype.clone_box(),
            reset_hid: prototype.clone_box(),
            cand_in: prototype.clone_box(),
            cand_hid: prototype.clone_box(),
        }
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.update_in.set_learning_rate(learning_rate);
        self.update_hid.set_learning_rate(learning_rate);
        self.reset_in.set_learning_rate(learning_rate);
        self.reset_hid.set_learning_rate(learning_rate);
        self.cand_in.set_learning_rate(learning_rate);
        self.cand_hid.set_learning_rate(learning_rate);
    }
}

impl GruCell {
    /// Create a cell with uniform initialization scaled by hidden size
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let mat = |rows, cols| Array2::random((rows, cols), Uniform::new(-limit, limit));

        Self {
            input_size,
            hidden_size,
            w_iz: mat(hidden_size, input_size),
            w_hz: mat(hidden_size, hidden_size),
            b_z: Array1::zeros(hidden_size),
            w_ir: mat(hidden_size, input_size),
            w_hr: mat(hidden_size, hidden_size),
            b_r: Array1::zeros(hidden_size),
            w_in: mat(hidden_size, input_size),
            w_hn: mat(hidden_size, hidden_size),
            b_n: Array1::zeros(hidden_size),
        }
    }

    /// Zero hidden state
    pub fn init_hidden(&self) -> Array1<f64> {
        Array1::zeros(self.hidden_size)
    }

    fn gates(&self, x: &Array1<f64>, h_prev: &Array1<f64>) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
        let z = sigmoid(&(self.w_iz.dot(x) + self.w_hz.dot(h_prev) + &self.b_z));
        let r = sigmoid(&(self.w_ir.dot(x) + self.w_hr.dot(h_prev) + &self.b_r));
        let n = tanh(&(self.w_in.dot(x) + self.w_hn.dot(&(&r * h_prev)) + &self.b_n));
        (z, r, n)
    }

    /// One time step
    pub fn forward(&self, x: &Array1<f64>, h_prev: &Array1<f64>) -> Array1<f64> {
        let (z, _, n) = self.gates(x, h_prev);
        let one_minus_z = z.mapv(|v| 1.0 - v);
        &one_minus_z * &n + &z * h_prev
    }

    /// One time step, returning the cached activations for BPTT
    pub fn forward_cached(&self, x: &Array1<f64>, h_prev: &Array1<f64>) -> (Array1<f64>, GruStep) {
        let (z, r, n) = self.gates(x, h_prev);
        let one_minus_z = z.mapv(|v| 1.0 - v);
        let h = &one_minus_z * &n + &z * h_prev;

        let step = GruStep {
            x: x.clone(),
            h_prev: h_prev.clone(),
            z,
            r,
            n,
        };
        (h, step)
    }

    /// Backpropagate through a cached sequence, accumulating parameter
    /// gradients into `grads`. `dh_last` is the loss gradient with respect
    /// to the final hidden state.
    pub fn backward(&self, steps: &[GruStep], dh_last: &Array1<f64>, grads: &mut GruGrads) {
        let mut dh = dh_last.clone();

        for step in steps.iter().rev() {
            let one_minus_z = step.z.mapv(|v| 1.0 - v);

            // h = (1 - z) ⊙ n + z ⊙ h_prev
            let dn = &dh * &one_minus_z;
            let dz = &dh * &(&step.h_prev - &step.n);

            // n = tanh(a_n), a_n = W_in x + W_hn (r ⊙ h_prev) + b_n
            let da_n = &dn * &step.n.mapv(|v| 1.0 - v * v);
            let rh = &step.r * &step.h_prev;
            grads.w_in = &grads.w_in + &outer(&da_n, &step.x);
            grads.w_hn = &grads.w_hn + &outer(&da_n, &rh);
            grads.b_n = &grads.b_n + &da_n;

            let drh = self.w_hn.t().dot(&da_n);
            let dr = &drh * &step.h_prev;

            // r = σ(a_r), a_r = W_ir x + W_hr h_prev + b_r
            let da_r = &dr * &(&step.r * &step.r.mapv(|v| 1.0 - v));
            grads.w_ir = &grads.w_ir + &outer(&da_r, &step.x);
            grads.w_hr = &grads.w_hr + &outer(&da_r, &step.h_prev);
            grads.b_r = &grads.b_r + &da_r;

            // z = σ(a_z), a_z = W_iz x + W_hz h_prev + b_z
            let da_z = &dz * &(&step.z * &step.z.mapv(|v| 1.0 - v));
            grads.w_iz = &grads.w_iz + &outer(&da_z, &step.x);
            grads.w_hz = &grads.w_hz + &outer(&da_z, &step.h_prev);
            grads.b_z = &grads.b_z + &da_z;

            dh = &dh * &step.z
                + &(&drh * &step.r)
                + &self.w_hr.t().dot(&da_r)
                + &self.w_hz.t().dot(&da_z);
        }
    }

    fn apply_gradients(&mut self, grads: &GruGrads, opt: &mut GruOptimizer) {
        opt.update_in.update_weights(&mut self.w_iz, &grads.w_iz);
        opt.update_in.update_biases(&mut self.b_z, &grads.b_z);
        opt.update_hid.update_weights(&mut self.w_hz, &grads.w_hz);

        opt.reset_in.update_weights(&mut self.w_ir, &grads.w_ir);
        opt.reset_in.update_biases(&mut self.b_r, &grads.b_r);
        opt.reset_hid.update_weights(&mut self.w_hr, &grads.w_hr);

        opt.cand_in.update_weights(&mut self.w_in, &grads.w_in);
        opt.cand_in.update_biases(&mut self.b_n, &grads.b_n);
        opt.cand_hid.update_weights(&mut self.w_hn, &grads.w_hn);
    }

    /// Number of trainable parameters
    pub fn num_params(&self) -> usize {
        3 * (self.hidden_size * self.input_size
            + self.hidden_size * self.hidden_size
            + self.hidden_size)
    }
}

/// Single-layer GRU over a scalar price window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruEncoder {
    cell: GruCell,
}

impl GruEncoder {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self {
            cell: GruCell::new(input_size, hidden_size),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.cell.hidden_size
    }

    /// Encode a window into its final hidden state (pure)
    pub fn encode(&self, window: ArrayView1<f64>) -> Array1<f64> {
        let mut h = self.cell.init_hidden();
        let mut x = Array1::zeros(1);
        for &value in window.iter() {
            x[0] = value;
            h = self.cell.forward(&x, &h);
        }
        h
    }

    /// Encode a window, keeping per-step caches for BPTT
    pub fn encode_cached(&self, window: ArrayView1<f64>) -> (Array1<f64>, Vec<GruStep>) {
        let mut h = self.cell.init_hidden();
        let mut steps = Vec::with_capacity(window.len());
        let mut x = Array1::zeros(1);
        for &value in window.iter() {
            x[0] = value;
            let (h_next, step) = self.cell.forward_cached(&x, &h);
            steps.push(step);
            h = h_next;
        }
        (h, steps)
    }

    /// Zero gradient buffer for the cell
    pub fn zero_grads(&self) -> GruGrads {
        GruGrads::zeros(self.cell.input_size, self.cell.hidden_size)
    }

    /// Accumulate BPTT gradients for one cached window
    pub fn backward(&self, steps: &[GruStep], dh_last: &Array1<f64>, grads: &mut GruGrads) {
        self.cell.backward(steps, dh_last, grads);
    }

    /// Apply accumulated gradients through the per-tensor optimizers
    pub fn apply_gradients(&mut self, grads: &GruGrads, opt: &mut GruOptimizer) {
        self.cell.apply_gradients(grads, opt);
    }

    pub fn num_params(&self) -> usize {
        self.cell.num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_forward_shapes() {
        let cell = GruCell::new(1, 8);
        let h = cell.forward(&array![0.5], &cell.init_hidden());
        assert_eq!(h.len(), 8);
        assert!(h.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_encoder_deterministic() {
        let encoder = GruEncoder::new(1, 6);
        let window = Array1::linspace(-0.5, 0.8, 12);
        let a = encoder.encode(window.view());
        let b = encoder.encode(window.view());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_cached_matches_plain_forward() {
        let encoder = GruEncoder::new(1, 5);
        let window = Array1::linspace(-1.0, 1.0, 9);
        let plain = encoder.encode(window.view());
        let (cached, steps) = encoder.encode_cached(window.view());
        assert_eq!(steps.len(), 9);
        for (x, y) in plain.iter().zip(cached.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-15);
        }
    }

    /// Every analytic parameter gradient must agree with central finite
    /// differences on a scalar loss (sum of the final hidden state).
    #[test]
    fn test_bptt_gradient_check() {
        let mut encoder = GruEncoder::new(1, 4);
        let window = array![0.3, -0.2, 0.5, 0.1, -0.4];

        let (h, steps) = encoder.encode_cached(window.view());
        let mut grads = encoder.zero_grads();
        encoder.backward(&steps, &Array1::ones(h.len()), &mut grads);

        let eps = 1e-6;

        // (tensor tag, row, col) -> analytic gradient entry
        let cases: Vec<(&str, usize, usize, f64)> = vec![
            ("w_in", 0, 0, grads.w_in[[0, 0]]),
            ("w_hn", 1, 2, grads.w_hn[[1, 2]]),
            ("w_iz", 2, 0, grads.w_iz[[2, 0]]),
            ("w_hz", 3, 1, grads.w_hz[[3, 1]]),
            ("w_ir", 1, 0, grads.w_ir[[1, 0]]),
            ("w_hr", 0, 3, grads.w_hr[[0, 3]]),
            ("b_z", 1, 0, grads.b_z[1]),
            ("b_r", 2, 0, grads.b_r[2]),
            ("b_n", 0, 0, grads.b_n[0]),
        ];

        fn entry<'a>(cell: &'a mut GruCell, tag: &str, i: usize, j: usize) -> &'a mut f64 {
            match tag {
                "w_in" => &mut cell.w_in[[i, j]],
                "w_hn" => &mut cell.w_hn[[i, j]],
                "w_iz" => &mut cell.w_iz[[i, j]],
                "w_hz" => &mut cell.w_hz[[i, j]],
                "w_ir" => &mut cell.w_ir[[i, j]],
                "w_hr" => &mut cell.w_hr[[i, j]],
                "b_z" => &mut cell.b_z[i],
                "b_r" => &mut cell.b_r[i],
                "b_n" => &mut cell.b_n[i],
                other => panic!("unknown tensor {other}"),
            }
        }

        for (tag, i, j, analytic) in cases {
            let original = *entry(&mut encoder.cell, tag, i, j);

            *entry(&mut encoder.cell, tag, i, j) = original + eps;
            let plus: f64 = encoder.encode(window.view()).sum();
            *entry(&mut encoder.cell, tag, i, j) = original - eps;
            let minus: f64 = encoder.encode(window.view()).sum();
            *entry(&mut encoder.cell, tag, i, j) = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_relative_eq!(analytic, numeric, epsilon = 1e-5, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_grad_scaling() {
        let encoder = GruEncoder::new(1, 3);
        let window = array![0.2, 0.4];
        let (h, steps) = encoder.encode_cached(window.view());
        let mut grads = encoder.zero_grads();
        encoder.backward(&steps, &Array1::ones(h.len()), &mut grads);

        let norm_before = grads.squared_norm();
        grads.scale(0.5);
        assert_relative_eq!(grads.squared_norm(), norm_before * 0.25, epsilon = 1e-10);
    }
}
