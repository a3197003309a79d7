#![cfg(feature = "torch")]

use std::sync::Arc;

use tbridge::{Device, Shape, TensorBackend, TensorOptions};
use tbridge_backend_ref_cpu::CpuBackend;
use tbridge_backend_tests::parity;
use tbridge_backend_torch::TorchBackend;

tbridge_backend_tests::define_creation_tests!(torch, || Arc::new(TorchBackend::new()));

#[test]
fn torch_matches_reference_backend() {
    let reference = Arc::new(CpuBackend::new());
    let candidate = Arc::new(TorchBackend::new());
    for seed in [1, 7, 42] {
        parity::backends_agree(&reference, &candidate, seed);
    }
}

#[test]
fn torch_rejects_like_reference_backend() {
    parity::backends_reject_alike(&Arc::new(CpuBackend::new()), &Arc::new(TorchBackend::new()));
}

#[test]
fn host_transfer_keeps_values_and_sparse_reads_back_dense() {
    let backend = TorchBackend::new();
    let ones = backend
        .ones(&Shape::new([2, 2]), &TensorOptions::new())
        .unwrap();
    let moved = backend.to_device(ones, Device::cpu()).unwrap();
    let sparse = backend.to_sparse(moved).unwrap();
    assert_eq!(backend.to_host(&sparse).unwrap().to_f64_vec(), vec![1.0; 4]);
}
