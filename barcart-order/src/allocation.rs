//! Proportional splitting of an amount in cents using the largest-remainder
//! method: every part gets its floor share, then the leftover cents go to the
//! parts with the largest fractional remainders (earlier parts win ties).
//! The parts always sum to exactly the whole.

use barcart_core::Cents;

pub fn allocate_proportionally(total: Cents, weights: &[Cents]) -> Vec<Cents> {
    let weight_sum: i128 = weights.iter().map(|w| i128::from((*w).max(0))).sum();
    if weight_sum == 0 || weights.is_empty() {
        return vec![0; weights.len()];
    }

    let magnitude = i128::from(total.abs());
    let sign: Cents = if total < 0 { -1 } else { 1 };

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, weight) in weights.iter().enumerate() {
        let scaled = magnitude * i128::from((*weight).max(0));
        shares.push(scaled / weight_sum);
        remainders.push((scaled % weight_sum, idx));
    }

    let allocated: i128 = shares.iter().sum();
    let leftover = (magnitude - allocated) as usize;

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, idx) in remainders.into_iter().take(leftover) {
        shares[idx] += 1;
    }

    shares.into_iter().map(|s| sign * s as Cents).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_proportional_tax_split() {
        // 40/50 and 10/50 of $4.50
        assert_eq!(allocate_proportionally(450, &[4000, 1000]), vec![360, 90]);
    }

    #[test]
    fn test_leftover_cents_go_to_largest_remainders() {
        assert_eq!(allocate_proportionally(100, &[1, 1, 1]), vec![34, 33, 33]);
        assert_eq!(allocate_proportionally(10, &[1, 2, 3]), vec![2, 3, 5]);
    }

    #[test]
    fn test_zero_weights_allocate_nothing() {
        assert_eq!(allocate_proportionally(450, &[0, 0]), vec![0, 0]);
        assert!(allocate_proportionally(450, &[]).is_empty());
    }

    #[test]
    fn test_parts_always_sum_to_whole() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let stores = rng.gen_range(1..8);
            let weights: Vec<Cents> = (0..stores).map(|_| rng.gen_range(0..50_000)).collect();
            let total = rng.gen_range(0..10_000);
            let parts = allocate_proportionally(total, &weights);
            if weights.iter().all(|w| *w == 0) {
                assert!(parts.iter().all(|p| *p == 0));
            } else {
                assert_eq!(parts.iter().sum::<Cents>(), total);
                let weight_sum: Cents = weights.iter().sum();
                for (part, weight) in parts.iter().zip(&weights) {
                    let exact = total as f64 * *weight as f64 / weight_sum as f64;
                    assert!((*part as f64 - exact).abs() < 1.0);
                }
            }
        }
    }
}
