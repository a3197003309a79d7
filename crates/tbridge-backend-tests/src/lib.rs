pub mod creation;
pub mod parity;

#[macro_export]
macro_rules! define_creation_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            use super::*;
            use $crate::creation;

            macro_rules! creation_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        let backend = ($backend_ctor)();
                        creation::$name(&backend);
                    }
                };
            }

            creation_test!(zeros_ones_full_fill_every_element);
            creation_test!(full_rounds_into_integer_dtypes);
            creation_test!(empty_has_requested_shape_and_dtype);
            creation_test!(scalar_shape_holds_one_element);
            creation_test!(arange_int32_counts_up);
            creation_test!(arange_rounds_length_up);
            creation_test!(arange_rejects_bad_steps);
            creation_test!(linspace_includes_both_ends);
            creation_test!(linspace_handles_degenerate_step_counts);
            creation_test!(eye_places_ones_on_the_diagonal);
            creation_test!(eye_rejects_negative_extents);
            creation_test!(like_factories_return_distinct_tensors);
            creation_test!(from_buffer_deep_copies_caller_memory);
            creation_test!(from_buffer_reads_integer_dtypes);
            creation_test!(sentinel_dtype_uses_native_defaults);
            creation_test!(released_and_unknown_handles_are_rejected);
            creation_test!(negative_extents_are_invalid_arguments);
            creation_test!(malformed_selectors_are_rejected);
            creation_test!(failed_creations_leave_no_handles);
            creation_test!(oversized_shapes_are_native_faults);
            creation_test!(requires_grad_is_recorded);
            creation_test!(sparse_layout_densifies_on_read_back);
            creation_test!(opaque_layout_preserves_values);
            creation_test!(concurrent_creation_yields_distinct_handles);
        }
    };
}
