use std::sync::Arc;

use tbridge_backend_ref_cpu::CpuBackend;
use tbridge_backend_tests::parity;

tbridge_backend_tests::define_creation_tests!(cpu_ref, || Arc::new(CpuBackend::new()));

#[test]
fn parity_cases_hold_on_the_reference_backend() {
    let backend = Arc::new(CpuBackend::new());
    for seed in [1, 7, 42] {
        parity::backends_agree(&backend, &backend, seed);
    }
    parity::backends_reject_alike(&backend, &backend);
}
