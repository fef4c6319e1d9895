//! Prime factorization and process-grid assignment.
//!
//! A process count is split into a 3-axis grid by distributing its prime
//! factors round-robin over the axes, largest factor first. The result is the
//! most balanced grid reachable for that factorization; no search over factor
//! groupings is performed, and downstream tooling depends on this exact
//! greedy order.

/// Prime factors of `n` in ascending order.
///
/// Trial division up to sqrt(n); any residual factor > 1 is appended last.
/// `prime_factors(1)` is empty.
pub fn prime_factors(mut n: u64) -> Vec<u64> {
    assert!(n > 0, "prime_factors requires a positive integer");
    let mut factors = Vec::new();
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            n /= i;
            factors.push(i);
        } else {
            i += 1;
        }
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Assign `n` processes to a 3-axis grid whose axis product equals `n`.
///
/// The factor sequence is reversed (largest first) and factor `i` is
/// multiplied into axis `i mod 3`.
pub fn process_grid(n: u64) -> [u64; 3] {
    assert!(n > 0, "process_grid requires a positive process count");
    let mut grid = [1u64; 3];
    let mut axis = 0;
    for &f in prime_factors(n).iter().rev() {
        grid[axis] *= f;
        axis = (axis + 1) % 3;
    }
    grid
}
