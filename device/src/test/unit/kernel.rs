use test_case::test_case;

use crate::*;

#[test_case([256, 1, 1], [1000, 1, 1], [1024, 1, 1]; "1d rounds up")]
#[test_case([256, 1, 1], [512, 1, 1], [512, 1, 1]; "1d exact")]
#[test_case([16, 16, 1], [17, 33, 1], [32, 48, 1]; "2d")]
#[test_case([1, 1, 1], [0, 1, 1], [0, 1, 1]; "empty")]
fn test_global_aligned_to_local(local: [usize; 3], global: [usize; 3], expected: [usize; 3]) {
    let info = KernelInfo::builder().kernel_file("K.cpp").kernel_name("K").local(local).global(global).build();
    assert_eq!(info.global, expected);
    assert_eq!(info.local, local);
}

#[test]
fn test_short_grids_are_padded() {
    let info = KernelInfo::builder().kernel_file("K.cpp").kernel_name("K").local(vec![64]).global(vec![100]).build();
    assert_eq!(info.local, [64, 1, 1]);
    assert_eq!(info.global, [128, 1, 1]);
    assert_eq!(info.groups(), [2, 1, 1]);
}

#[test]
#[should_panic(expected = "local size must be positive")]
fn test_zero_local_size_panics() {
    KernelInfo::builder().kernel_file("K.cpp").kernel_name("K").local([0, 1, 1]).global([1, 1, 1]).build();
}

#[test]
fn test_build_params_render_in_order() {
    let params = BuildParams::new().with("MIOPEN_USE_FP32", 1i64).with("OUTPUT_TYPE", "float").with("LOCAL_SIZE", 256usize);
    assert_eq!(params.generate_options(), "-DMIOPEN_USE_FP32=1 -DOUTPUT_TYPE=float -DLOCAL_SIZE=256");
}

#[test]
fn test_build_params_replace_keeps_position() {
    let params = BuildParams::new().with("A", 1i64).with("B", 2i64).with("A", 3i64);
    assert_eq!(params.generate_options(), "-DA=3 -DB=2");
    assert_eq!(params.int("A"), Some(3));
    assert_eq!(params.int("C"), None);
}

#[test]
fn test_view_pads_to_five_dims() {
    let view = TensorView::new(&[2, 3], &[3, 1]);
    assert_eq!(view.lengths, [1, 1, 1, 2, 3]);
    assert_eq!(view.numel(), 6);
    assert_eq!(view.offset_of(4), 4);
}

#[test]
fn test_view_offset_follows_strides() {
    // Transposed 2x3 stored column-major.
    let view = TensorView::new(&[2, 3], &[1, 2]);
    let offsets: Vec<usize> = (0..6).map(|i| view.offset_of(i)).collect();
    assert_eq!(offsets, vec![0, 2, 4, 1, 3, 5]);
}

#[test]
fn test_optional_buffer_argument() {
    let args = [KernelArg::Null, KernelArg::Usize(3)];
    assert!(args.opt_buffer(0).unwrap().is_none());
    assert!(matches!(args.opt_buffer(1), Err(Error::ArgumentMismatch { index: 1, .. })));
    assert!(matches!(args.usize(2), Err(Error::MissingArgument { index: 2 })));
}

#[test]
fn test_with_grid_keeps_program() {
    let table = std::sync::Arc::new(KernelTable::new());
    table.register("K.cpp", "K", |_, _| Ok(()));
    let info = KernelInfo::builder().kernel_file("K.cpp").kernel_name("K").local([1, 1, 1]).global([1, 1, 1]).build();
    let kernel = CpuCompiler::new(table).compile(&info).unwrap();

    let regridded = kernel.with_grid([512, 1, 1], [1000, 1, 1]);

    assert_eq!(regridded.info().global, [1024, 1, 1]);
    assert_eq!(regridded.info().local, [512, 1, 1]);
    assert!(std::sync::Arc::ptr_eq(regridded.program(), kernel.program()));
    assert_eq!(kernel.info().global, [1, 1, 1]);
}
