use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rand::rngs::StdRng;

use crate::args::{Args, Loss, ModelKind};
use crate::huffman::HuffmanTree;
use crate::math::{Matrix, ParamVector, Vector};
use crate::rng::worker_rng;
use crate::sampling::NegativeTable;
use crate::tables::{log, sigmoid};

/// A `(feature, relative position)` context pair for the attention paths.
pub type AttnPair = (usize, i32);

/// One training/inference engine.
///
/// The parameter matrices are shared across workers; everything else here
/// is private per-worker state. Updates to the shared matrices go through
/// relaxed atomic cells, so many engines may train concurrently without
/// locks (Hogwild).
pub struct Model {
    wi: Arc<Matrix>,
    wo: Arc<Matrix>,
    attn: Arc<Matrix>,
    bias: Arc<ParamVector>,
    args: Arc<Args>,
    osz: usize,

    hidden: Vector,
    output: Vector,
    grad: Vector,
    softmaxattn: Vec<f32>,
    pairs: Vec<AttnPair>,

    rng: StdRng,
    tree: Option<HuffmanTree>,
    negatives: Option<NegativeTable>,

    loss: f32,
    nexamples: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    score: f32,
    label: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap: the worst surviving candidate sits at the top.
type TopK = BinaryHeap<Reverse<Candidate>>;

impl Model {
    pub fn new(
        wi: Arc<Matrix>,
        wo: Arc<Matrix>,
        attn: Arc<Matrix>,
        bias: Arc<ParamVector>,
        args: Arc<Args>,
        seed: u64,
    ) -> Self {
        assert_eq!(wi.cols, args.dim);
        assert_eq!(wo.cols, args.dim);
        assert_eq!(bias.len(), attn.cols);
        debug_assert_eq!(attn.cols, 2 * args.ws + 1);
        let osz = wo.rows;
        Model {
            hidden: Vector::new(args.dim),
            output: Vector::new(osz),
            grad: Vector::new(args.dim),
            softmaxattn: Vec::new(),
            pairs: Vec::new(),
            rng: worker_rng(seed),
            tree: None,
            negatives: None,
            loss: 0.0,
            nexamples: 1,
            wi,
            wo,
            attn,
            bias,
            args,
            osz,
        }
    }

    /// One-shot setup of the structures the configured loss needs: the
    /// negative table for `ns`, the coding tree for `hs`. Must run before
    /// any update or prediction in those modes.
    pub fn set_target_counts(&mut self, counts: &[i64]) {
        assert_eq!(counts.len(), self.osz);
        if self.args.loss == Loss::Ns {
            self.negatives = Some(NegativeTable::new(counts, &mut self.rng));
        }
        if self.args.loss == Loss::Hs {
            self.tree = Some(HuffmanTree::new(counts));
        }
    }

    /// One step of logistic regression on output row `target`.
    ///
    /// Accumulates into the hidden-space gradient before touching the
    /// output row, so the gradient reflects the pre-update weights.
    pub fn binary_logistic(&mut self, target: usize, label: bool, lr: f32) -> f32 {
        binary_logistic(&self.wo, &self.hidden, &mut self.grad, target, label, lr)
    }

    fn negative_sampling(&mut self, target: usize, lr: f32) -> f32 {
        self.grad.zero();
        let negatives = self
            .negatives
            .as_mut()
            .expect("set_target_counts must run before training with ns loss");
        let mut loss = binary_logistic(&self.wo, &self.hidden, &mut self.grad, target, true, lr);
        for _ in 0..self.args.neg {
            let negative = negatives.next(target);
            loss += binary_logistic(&self.wo, &self.hidden, &mut self.grad, negative, false, lr);
        }
        loss
    }

    fn hierarchical_softmax(&mut self, target: usize, lr: f32) -> f32 {
        self.grad.zero();
        let tree = self
            .tree
            .as_ref()
            .expect("set_target_counts must run before training with hs loss");
        let mut loss = 0.0;
        for (&node, &bit) in tree.path(target).iter().zip(tree.code(target)) {
            loss += binary_logistic(&self.wo, &self.hidden, &mut self.grad, node, bit, lr);
        }
        loss
    }

    fn softmax(&mut self, target: usize, lr: f32) -> f32 {
        self.grad.zero();
        compute_output_softmax(&self.wo, &self.hidden, &mut self.output);
        for i in 0..self.osz {
            let label = if i == target { 1.0 } else { 0.0 };
            let alpha = lr * (label - self.output[i]);
            self.grad.add_row(&self.wo, i, alpha);
            self.wo.add_row(&self.hidden, i, alpha);
        }
        -log(self.output[target])
    }

    fn compute_loss(&mut self, target: usize, lr: f32) -> f32 {
        match self.args.loss {
            Loss::Ns => self.negative_sampling(target, lr),
            Loss::Hs => self.hierarchical_softmax(target, lr),
            Loss::Softmax => self.softmax(target, lr),
        }
    }

    /// Mean of the input embedding rows. `input` must not be empty.
    pub fn compute_hidden(&self, input: &[usize], hidden: &mut Vector) {
        compute_hidden(&self.wi, input, hidden);
    }

    /// Attention-weighted sum of the input embedding rows, context view:
    /// logits are indexed by `(context feature, relative position)`. The
    /// normalized weights are left in `softmaxattn`.
    pub fn compute_attn_hidden(
        &self,
        input: &[AttnPair],
        hidden: &mut Vector,
        softmaxattn: &mut Vec<f32>,
    ) {
        compute_attn_hidden(
            &self.wi,
            &self.attn,
            &self.bias,
            input,
            None,
            hidden,
            softmaxattn,
        );
    }

    /// Feature view: logits are indexed by `(target class, relative
    /// position)` instead of the context feature.
    pub fn compute_attn_hidden2(
        &self,
        input: &[AttnPair],
        target: usize,
        hidden: &mut Vector,
        softmaxattn: &mut Vec<f32>,
    ) {
        compute_attn_hidden(
            &self.wi,
            &self.attn,
            &self.bias,
            input,
            Some(target),
            hidden,
            softmaxattn,
        );
    }

    /// One SGD step on a bag of feature indices.
    pub fn update(&mut self, input: &[usize], target: usize, lr: f32) {
        assert!(target < self.osz);
        if input.is_empty() {
            return;
        }
        compute_hidden(&self.wi, input, &mut self.hidden);
        let loss = self.compute_loss(target, lr);
        self.loss += loss;
        self.nexamples += 1;

        if self.args.model == ModelKind::Sup {
            self.grad.mul(1.0 / input.len() as f32);
        }
        for &idx in input {
            self.wi.add_row(&self.grad, idx, 1.0);
        }
    }

    /// One SGD step through the context-view attention path. Pairs whose
    /// feature equals the target are dropped before the forward pass.
    pub fn update_attn(&mut self, input: &[AttnPair], target: usize, lr: f32) {
        assert!(target < self.osz);
        if input.is_empty() {
            return;
        }
        self.pairs.clear();
        self.pairs
            .extend(input.iter().copied().filter(|&(f, _)| f != target));
        if self.pairs.is_empty() {
            return;
        }
        compute_attn_hidden(
            &self.wi,
            &self.attn,
            &self.bias,
            &self.pairs,
            None,
            &mut self.hidden,
            &mut self.softmaxattn,
        );
        let loss = self.compute_loss(target, lr);
        self.loss += loss;
        self.nexamples += 1;

        compute_attn_gradient(
            &self.wi,
            &self.attn,
            &self.bias,
            &self.pairs,
            None,
            &self.grad,
            &self.hidden,
            &self.softmaxattn,
        );
    }

    /// Feature-view twin of [`Model::update_attn`].
    pub fn update_attn2(&mut self, input: &[AttnPair], target: usize, lr: f32) {
        assert!(target < self.osz);
        if input.is_empty() {
            return;
        }
        self.pairs.clear();
        self.pairs
            .extend(input.iter().copied().filter(|&(f, _)| f != target));
        if self.pairs.is_empty() {
            return;
        }
        compute_attn_hidden(
            &self.wi,
            &self.attn,
            &self.bias,
            &self.pairs,
            Some(target),
            &mut self.hidden,
            &mut self.softmaxattn,
        );
        let loss = self.compute_loss(target, lr);
        self.loss += loss;
        self.nexamples += 1;

        compute_attn_gradient(
            &self.wi,
            &self.attn,
            &self.bias,
            &self.pairs,
            Some(target),
            &self.grad,
            &self.hidden,
            &self.softmaxattn,
        );
    }

    /// Top-k labels with log-probability scores, best first, using the
    /// engine's own scratch.
    pub fn predict(&mut self, input: &[usize], k: usize) -> Vec<(f32, usize)> {
        let mut hidden = std::mem::take(&mut self.hidden);
        let mut output = std::mem::take(&mut self.output);
        let result = self.predict_with(input, k, &mut hidden, &mut output);
        self.hidden = hidden;
        self.output = output;
        result
    }

    /// Like [`Model::predict`] but with caller-owned scratch, so a shared
    /// `&Model` can serve concurrent inference threads.
    pub fn predict_with(
        &self,
        input: &[usize],
        k: usize,
        hidden: &mut Vector,
        output: &mut Vector,
    ) -> Vec<(f32, usize)> {
        assert!(k > 0);
        debug_assert!(!input.is_empty());
        compute_hidden(&self.wi, input, hidden);
        let mut heap = TopK::with_capacity(k + 1);
        if self.args.loss == Loss::Hs {
            let tree = self
                .tree
                .as_ref()
                .expect("set_target_counts must run before predicting with hs loss");
            self.dfs(tree, k, tree.root(), 0.0, hidden, &mut heap);
        } else {
            self.find_k_best(k, hidden, output, &mut heap);
        }
        let mut result: Vec<(f32, usize)> = heap
            .into_iter()
            .map(|Reverse(c)| (c.score, c.label))
            .collect();
        result.sort_by(|a, b| b.0.total_cmp(&a.0));
        result
    }

    fn find_k_best(&self, k: usize, hidden: &Vector, output: &mut Vector, heap: &mut TopK) {
        compute_output_softmax(&self.wo, hidden, output);
        for i in 0..self.osz {
            let score = log(output[i]);
            if heap.len() == k {
                if let Some(&Reverse(worst)) = heap.peek() {
                    if score < worst.score {
                        continue;
                    }
                }
            }
            heap.push(Reverse(Candidate { score, label: i }));
            if heap.len() > k {
                heap.pop();
            }
        }
    }

    /// Depth-first walk of the coding tree accumulating log-probabilities,
    /// pruning subtrees that can no longer beat the worst kept candidate.
    fn dfs(
        &self,
        tree: &HuffmanTree,
        k: usize,
        node: usize,
        score: f32,
        hidden: &Vector,
        heap: &mut TopK,
    ) {
        if heap.len() == k {
            if let Some(&Reverse(worst)) = heap.peek() {
                if score < worst.score {
                    return;
                }
            }
        }

        if tree.is_leaf(node) {
            heap.push(Reverse(Candidate { score, label: node }));
            if heap.len() > k {
                heap.pop();
            }
            return;
        }

        let n = tree.node(node);
        let f = sigmoid(self.wo.dot_row(hidden, node - tree.osz()));
        self.dfs(tree, k, n.left as usize, score + log(1.0 - f), hidden, heap);
        self.dfs(tree, k, n.right as usize, score + log(f), hidden, heap);
    }

    /// Running loss per example since construction.
    pub fn get_loss(&self) -> f32 {
        self.loss / self.nexamples as f32
    }

    pub fn nexamples(&self) -> u64 {
        self.nexamples
    }

    pub fn hidden(&self) -> &Vector {
        &self.hidden
    }

    pub fn grad(&self) -> &Vector {
        &self.grad
    }

    pub fn softmaxattn(&self) -> &[f32] {
        &self.softmaxattn
    }

    pub fn tree(&self) -> Option<&HuffmanTree> {
        self.tree.as_ref()
    }

    /// Draw one negative class distinct from `target`, advancing this
    /// engine's cursor into the shared-shape (but per-engine) table.
    pub fn get_negative(&mut self, target: usize) -> usize {
        self.negatives
            .as_mut()
            .expect("set_target_counts must run before drawing negatives")
            .next(target)
    }
}

/// Map a signed relative position onto an attention column. The matrix
/// covers `-ws ..= ws` with `ws = (cols - 1) / 2`.
fn attn_col(attn: &Matrix, position: i32) -> usize {
    let pad = ((attn.cols - 1) / 2) as i32;
    let col = position + pad;
    debug_assert!(
        col >= 0 && (col as usize) < attn.cols,
        "position {position} outside the attention window"
    );
    col as usize
}

fn compute_hidden(wi: &Matrix, input: &[usize], hidden: &mut Vector) {
    debug_assert!(!input.is_empty());
    hidden.zero();
    for &idx in input {
        hidden.add_row(wi, idx, 1.0);
    }
    hidden.mul(1.0 / input.len() as f32);
}

/// Shared body of the two attention forward passes. `target` selects the
/// feature view (logit row = target class) over the context view (logit
/// row = context feature).
fn compute_attn_hidden(
    wi: &Matrix,
    attn: &Matrix,
    bias: &ParamVector,
    input: &[(usize, i32)],
    target: Option<usize>,
    hidden: &mut Vector,
    softmaxattn: &mut Vec<f32>,
) {
    hidden.zero();
    softmaxattn.clear();

    let mut attention = Vec::with_capacity(input.len());
    let mut attention_max = 0.0f32;
    for &(feature, position) in input {
        let col = attn_col(attn, position);
        let row = target.unwrap_or(feature);
        let a = attn.get(row, col) + bias.get(col);
        if a > attention_max {
            attention_max = a;
        }
        attention.push(a);
    }

    let mut sum = 0.0f32;
    for &a in &attention {
        // operands far below the max would underflow exp; clamp them to zero
        let w = if a - attention_max < -50.0 {
            0.0
        } else {
            (a - attention_max).exp()
        };
        softmaxattn.push(w);
        sum += w;
    }
    for w in softmaxattn.iter_mut() {
        *w /= sum;
    }

    for (i, &(feature, _)) in input.iter().enumerate() {
        hidden.add_row(wi, feature, softmaxattn[i]);
    }
}

/// Backpropagate the hidden-space gradient into the input rows and the
/// attention parameters. `target` again selects the feature view.
///
/// The attention logit gradient uses the simplified softmax derivative
/// `a_i * (<wi[f_i], g> - <g, hidden>)`; the input-row update is scaled by
/// `a_i * |input|` to match the averaging convention of the plain path.
fn compute_attn_gradient(
    wi: &Matrix,
    attn: &Matrix,
    bias: &ParamVector,
    input: &[(usize, i32)],
    target: Option<usize>,
    gradient: &Vector,
    hidden: &Vector,
    softmaxattn: &[f32],
) {
    let input_size = input.len() as f32;
    let g_dot_hidden = gradient.dot(hidden);
    for (i, &(feature, position)) in input.iter().enumerate() {
        let gattn = softmaxattn[i] * (wi.dot_row(gradient, feature) - g_dot_hidden);
        wi.add_row(gradient, feature, softmaxattn[i] * input_size);
        let col = attn_col(attn, position);
        attn.add(target.unwrap_or(feature), col, gattn);
        bias.add(col, gattn);
    }
}

fn binary_logistic(
    wo: &Matrix,
    hidden: &Vector,
    grad: &mut Vector,
    target: usize,
    label: bool,
    lr: f32,
) -> f32 {
    let score = sigmoid(wo.dot_row(hidden, target));
    let alpha = lr * (label as u8 as f32 - score);
    grad.add_row(wo, target, alpha);
    wo.add_row(hidden, target, alpha);
    if label {
        -log(score)
    } else {
        -log(1.0 - score)
    }
}

fn compute_output_softmax(wo: &Matrix, hidden: &Vector, output: &mut Vector) {
    output.mul_matrix(wo, hidden);
    let mut max = output[0];
    for i in 1..output.len() {
        max = max.max(output[i]);
    }
    let mut z = 0.0f32;
    for i in 0..output.len() {
        output[i] = (output[i] - max).exp();
        z += output[i];
    }
    for i in 0..output.len() {
        output[i] /= z;
    }
}
