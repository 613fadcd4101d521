//! Math utilites.

use num_traits::PrimInt;

/// Rounds up `src` to the power of two `factor`.
pub fn round_up_pot<T: PrimInt>(src: T, factor: T) -> T {
    debug_assert_eq!(factor.count_ones(), 1); // .is_power_of_two()
    let minus1 = factor - T::one();
    (src + minus1) & !minus1
}

/// Performs integer division between a and b rounding up, instead of down
pub fn round_up_div<T: PrimInt>(a: T, b: T) -> T {
    (a + (b - T::one())) / b
}

#[cfg(test)]
mod test {
    use super::{round_up_div, round_up_pot};

    #[test]
    fn division_rounds_up() {
        assert_eq!(round_up_div(0, 64), 0);
        assert_eq!(round_up_div(1, 64), 1);
        assert_eq!(round_up_div(64, 64), 1);
        assert_eq!(round_up_div(65, 64), 2);
    }

    #[test]
    fn pot_rounding() {
        assert_eq!(round_up_pot(3, 4), 4);
        assert_eq!(round_up_pot(4, 4), 4);
        assert_eq!(round_up_pot(5, 4), 8);
    }
}
