use num_traits::{Num, NumCast, WrappingAdd, WrappingMul, WrappingSub};

/// A fixed-width numeric type that can be stored in a tensor.
///
/// Kernels are written once against this trait and instantiated for every
/// concrete element type: `u8`, `i32`, `i64`, `f32` and `f64`.
pub trait TensorElement:
    Num + NumCast + PartialOrd + Copy + Default + std::fmt::Debug + Send + Sync + 'static
{
    /// The most negative representable value (`-inf` for floats).
    const MIN_VALUE: Self;

    /// The most positive representable value (`+inf` for floats).
    const MAX_VALUE: Self;

    /// Whether the type is an integer type.
    const IS_INTEGER: bool;

    /// `self + rhs`, wrapping around at the bounds of integer types.
    fn wrapping_add(self, rhs: Self) -> Self;

    /// `self - rhs`, wrapping around at the bounds of integer types.
    fn wrapping_sub(self, rhs: Self) -> Self;

    /// `self * rhs`, wrapping around at the bounds of integer types.
    fn wrapping_mul(self, rhs: Self) -> Self;
}

macro_rules! impl_tensor_element {
    (int: $($t:ty),*) => {
        $(
            impl TensorElement for $t {
                const MIN_VALUE: Self = <$t>::MIN;
                const MAX_VALUE: Self = <$t>::MAX;
                const IS_INTEGER: bool = true;

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    WrappingAdd::wrapping_add(&self, &rhs)
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    WrappingSub::wrapping_sub(&self, &rhs)
                }

                #[inline]
                fn wrapping_mul(self, rhs: Self) -> Self {
                    WrappingMul::wrapping_mul(&self, &rhs)
                }
            }
        )*
    };
    (float: $($t:ty),*) => {
        $(
            impl TensorElement for $t {
                const MIN_VALUE: Self = <$t>::NEG_INFINITY;
                const MAX_VALUE: Self = <$t>::INFINITY;
                const IS_INTEGER: bool = false;

                #[inline]
                fn wrapping_add(self, rhs: Self) -> Self {
                    self + rhs
                }

                #[inline]
                fn wrapping_sub(self, rhs: Self) -> Self {
                    self - rhs
                }

                #[inline]
                fn wrapping_mul(self, rhs: Self) -> Self {
                    self * rhs
                }
            }
        )*
    };
}

impl_tensor_element!(int: u8, i32, i64);
impl_tensor_element!(float: f32, f64);

#[cfg(test)]
mod tests {
    use super::TensorElement;

    #[test]
    fn test_extreme_values() {
        assert_eq!(<u8 as TensorElement>::MIN_VALUE, 0);
        assert_eq!(<i32 as TensorElement>::MIN_VALUE, i32::MIN);
        assert_eq!(<i64 as TensorElement>::MAX_VALUE, i64::MAX);
        assert!(<f32 as TensorElement>::MIN_VALUE.is_infinite());
        assert!(<f64 as TensorElement>::MIN_VALUE < f64::MIN);
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(TensorElement::wrapping_add(i32::MAX, 1), i32::MIN);
        assert_eq!(TensorElement::wrapping_sub(0u8, 1), 255);
        assert_eq!(TensorElement::wrapping_mul(200u8, 2), 144);
        assert_eq!(TensorElement::wrapping_add(i64::MAX, 1), i64::MIN);
        assert_eq!(TensorElement::wrapping_add(1.5f32, 2.0), 3.5);
    }
}
