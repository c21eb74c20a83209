use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use std::thread;

use attnvec::math::{Matrix, ParamVector, Vector};

#[test]
fn argmax_prefers_lowest_index_on_ties() {
    let v = Vector::from_vec(vec![0.1, 0.9, 0.2]);
    assert_eq!(v.argmax(), 1);
    let tied = Vector::from_vec(vec![0.5, 3.0, 3.0, 1.0]);
    assert_eq!(tied.argmax(), 1);
}

#[test]
fn l1_dot_and_scalar_mul() {
    let mut v = Vector::from_vec(vec![1.0, -2.0, 3.0]);
    let w = Vector::from_vec(vec![0.5, 0.5, 0.5]);
    assert!((v.l1() - 6.0).abs() < 1e-6);
    assert!((v.dot(&w) - 1.0).abs() < 1e-6);
    v.mul(2.0);
    assert_eq!(v.data, vec![2.0, -4.0, 6.0]);
    v.add_vector(&w, 2.0);
    assert_eq!(v.data, vec![3.0, -3.0, 7.0]);
    v.zero();
    assert_eq!(v.data, vec![0.0, 0.0, 0.0]);
}

#[test]
fn display_prints_space_separated_values() {
    let v = Vector::from_vec(vec![1.5, -2.0, 0.25]);
    assert_eq!(v.to_string(), "1.5 -2 0.25");
}

#[test]
fn add_row_accumulates_scaled_matrix_rows() {
    let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);
    let mut v = Vector::new(3);
    v.add_row(&m, 0, 1.0);
    v.add_row(&m, 1, 0.5);
    assert_eq!(v.data, vec![6.0, 12.0, 18.0]);
}

#[test]
fn dot_row_and_matrix_add_row_agree() {
    let m = Matrix::zeros(2, 4);
    let v = Vector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
    m.add_row(&v, 1, 2.0);
    assert!((m.dot_row(&v, 1) - 2.0 * 30.0).abs() < 1e-5);
    // row 0 untouched
    assert_eq!(m.dot_row(&v, 0), 0.0);
    assert_eq!(m.get(1, 2), 6.0);
}

#[test]
fn mul_matrix_computes_matrix_vector_product() {
    let m = Matrix::from_vec(2, 3, vec![1.0, 0.0, -1.0, 2.0, 2.0, 2.0]);
    let v = Vector::from_vec(vec![3.0, 4.0, 5.0]);
    let mut out = Vector::new(2);
    out.mul_matrix(&m, &v);
    assert!((out[0] - (-2.0)).abs() < 1e-6);
    assert!((out[1] - 24.0).abs() < 1e-6);
}

#[test]
fn mul_matrix_parallel_path_matches_serial() {
    // Big enough to cross the rayon threshold.
    let rows = 300;
    let cols = 80;
    let data: Vec<f32> = (0..rows * cols).map(|i| (i % 17) as f32 - 8.0).collect();
    let m = Matrix::from_vec(rows, cols, data);
    let v = Vector::from_vec((0..cols).map(|i| (i % 5) as f32 * 0.25).collect());
    let mut out = Vector::new(rows);
    out.mul_matrix(&m, &v);
    for r in (0..rows).step_by(37) {
        let expected = m.dot_row(&v, r);
        assert!((out[r] - expected).abs() < 1e-4);
    }
}

#[test]
fn vector_roundtrips_bitwise_through_a_file() {
    let v = Vector::from_vec(vec![0.0, -1.5, 3.25e-7, 1.0e30, -0.0, std::f32::consts::PI]);
    let mut file = tempfile::tempfile().unwrap();
    v.save(&mut file).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let loaded = Vector::load(&mut file).unwrap();
    assert_eq!(loaded.len(), v.len());
    for (a, b) in v.data.iter().zip(loaded.data.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn vector_save_layout_is_dim_then_raw_floats() {
    let v = Vector::from_vec(vec![1.0, 2.0]);
    let mut buf = Vec::new();
    v.save(&mut buf).unwrap();
    assert_eq!(buf.len(), 8 + 2 * 4);
    assert_eq!(u64::from_ne_bytes(buf[0..8].try_into().unwrap()), 2);
    assert_eq!(
        f32::from_ne_bytes(buf[8..12].try_into().unwrap()).to_bits(),
        1.0f32.to_bits()
    );
}

#[test]
fn vector_load_reports_truncated_input() {
    let v = Vector::from_vec(vec![1.0, 2.0, 3.0]);
    let mut buf = Vec::new();
    v.save(&mut buf).unwrap();
    buf.truncate(buf.len() - 2);
    let mut cursor = std::io::Cursor::new(buf);
    assert!(Vector::load(&mut cursor).is_err());
}

#[test]
fn param_vector_supports_shared_accumulation() {
    let b = ParamVector::new(3);
    b.set(1, 2.0);
    b.add(1, 0.5);
    assert_eq!(b.get(1), 2.5);
    assert_eq!(b.to_vec(), vec![0.0, 2.5, 0.0]);
}

#[test]
fn concurrent_row_updates_keep_parameters_finite() {
    let m = Arc::new(Matrix::zeros(8, 16));
    let mut handles = Vec::new();
    for t in 0..4u64 {
        let m = Arc::clone(&m);
        handles.push(thread::spawn(move || {
            let v = Vector::from_vec((0..16).map(|i| (i as f32 + t as f32) * 0.01).collect());
            for i in 0..2000 {
                m.add_row(&v, (i + t as usize) % 8, 0.001);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    // Lost updates are fine; corrupted values are not.
    for x in m.to_vec() {
        assert!(x.is_finite());
        assert!(x >= 0.0);
    }
}
