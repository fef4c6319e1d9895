#![cfg(test)]

use super::factor::{prime_factors, process_grid};

#[test]
fn factors_are_ascending_with_residual_last() {
    assert_eq!(prime_factors(360), vec![2, 2, 2, 3, 3, 5]);
    assert_eq!(prime_factors(97), vec![97]);
    assert_eq!(prime_factors(2 * 2 * 101), vec![2, 2, 101]);
}

#[test]
fn one_has_no_factors() {
    assert!(prime_factors(1).is_empty());
    assert_eq!(process_grid(1), [1, 1, 1]);
}

#[test]
fn grid_product_recovers_input() {
    for n in 1..=256 {
        let grid = process_grid(n);
        assert_eq!(grid[0] * grid[1] * grid[2], n, "n = {n}");
        assert!(grid.iter().all(|&a| a >= 1));
    }
}

#[test]
fn eight_processes_form_a_cube() {
    assert_eq!(process_grid(8), [2, 2, 2]);
}

#[test]
fn largest_factors_are_placed_first_round_robin() {
    // 12 = 2 * 2 * 3; reversed: 3, 2, 2 onto axes 0, 1, 2.
    assert_eq!(process_grid(12), [3, 2, 2]);
    // 360 reversed: 5, 3, 3, 2, 2, 2 -> (5*2, 3*2, 3*2).
    assert_eq!(process_grid(360), [10, 6, 6]);
}

#[test]
fn prime_count_stays_on_first_axis() {
    assert_eq!(process_grid(7), [7, 1, 1]);
}

#[test]
#[should_panic(expected = "positive")]
fn zero_processes_panics() {
    let _ = process_grid(0);
}
