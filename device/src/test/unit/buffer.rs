use kiln_dtype::DType;
use proptest::prelude::*;

use crate::{Buffer, Error};

#[test]
fn test_clone_shares_allocation() {
    let buffer = Buffer::zeroed(16);
    let alias = buffer.clone();
    alias.store_at(DType::Float32, 2, 7.0).unwrap();

    assert!(buffer.ptr_eq(&alias));
    assert_eq!(buffer.load_at(DType::Float32, 2).unwrap(), 7.0);
}

#[test]
fn test_out_of_bounds_store() {
    let buffer = Buffer::zeroed(8);
    let err = buffer.store(DType::Float32, 1, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { offset: 4, size: 8, buffer_size: 8 }));
}

#[test]
fn test_high_water_mark_tracks_furthest_byte() {
    let buffer = Buffer::zeroed(64);
    buffer.store(DType::Float32, 0, &[1.0, 2.0]).unwrap();
    assert_eq!(buffer.high_water_mark(), 8);

    buffer.load_at(DType::Float64, 3).unwrap();
    assert_eq!(buffer.high_water_mark(), 32);

    buffer.load(DType::Float32, 0, 1).unwrap();
    assert_eq!(buffer.high_water_mark(), 32);

    buffer.reset_high_water_mark();
    assert_eq!(buffer.high_water_mark(), 0);
}

#[test]
fn test_fetch_add_accumulates() {
    let buffer = Buffer::from_slice(&[1.0f32, 2.0]);
    assert_eq!(buffer.fetch_add(DType::Float32, 1, 0.5).unwrap(), 2.0);
    assert_eq!(buffer.to_vec::<f32>(2).unwrap(), vec![1.0, 2.5]);
}

#[test]
fn test_fill_zero() {
    let buffer = Buffer::from_slice(&[3i32, 4, 5]);
    buffer.fill_zero();
    assert_eq!(buffer.to_vec::<i32>(3).unwrap(), vec![0, 0, 0]);
}

#[test]
fn test_read_past_end_is_size_mismatch() {
    let buffer = Buffer::zeroed(4);
    assert!(matches!(buffer.read_bytes(8), Err(Error::SizeMismatch { expected: 8, actual: 4 })));
}

proptest! {
    #[test]
    fn store_then_load_f64(values in prop::collection::vec(-1.0e9f64..1.0e9, 1..32), offset in 0usize..8) {
        let buffer = Buffer::zeroed((values.len() + offset) * 8);
        buffer.store(DType::Float64, offset, &values).unwrap();
        prop_assert_eq!(buffer.load(DType::Float64, offset, values.len()).unwrap(), values.clone());
        prop_assert_eq!(buffer.high_water_mark(), buffer.size());
    }
}
