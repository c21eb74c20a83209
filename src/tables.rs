use once_cell::sync::Lazy;

pub const SIGMOID_TABLE_SIZE: usize = 512;
pub const MAX_SIGMOID: f32 = 8.0;
pub const LOG_TABLE_SIZE: usize = 512;

static SIGMOID_TABLE: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..=SIGMOID_TABLE_SIZE)
        .map(|i| {
            let x = (i as f32 * 2.0 * MAX_SIGMOID) / SIGMOID_TABLE_SIZE as f32 - MAX_SIGMOID;
            1.0 / (1.0 + (-x).exp())
        })
        .collect()
});

static LOG_TABLE: Lazy<Vec<f32>> = Lazy::new(|| {
    (0..=LOG_TABLE_SIZE)
        .map(|i| ((i as f32 + 1e-5) / LOG_TABLE_SIZE as f32).ln())
        .collect()
});

/// Tabulated logistic sigmoid. Saturates to 0 or 1 outside
/// `[-MAX_SIGMOID, MAX_SIGMOID]`; no interpolation between buckets.
pub fn sigmoid(x: f32) -> f32 {
    if x < -MAX_SIGMOID {
        0.0
    } else if x > MAX_SIGMOID {
        1.0
    } else {
        let i = ((x + MAX_SIGMOID) * SIGMOID_TABLE_SIZE as f32 / MAX_SIGMOID / 2.0) as usize;
        SIGMOID_TABLE[i]
    }
}

/// Tabulated natural log for probabilities. Inputs above 1.0 return 0.0;
/// the loss kernels only ever pass values in (0, 1].
pub fn log(x: f32) -> f32 {
    if x > 1.0 {
        return 0.0;
    }
    let i = (x * LOG_TABLE_SIZE as f32) as usize;
    LOG_TABLE[i]
}
