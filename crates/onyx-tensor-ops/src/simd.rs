//! Lane abstraction over the `wide` vector types.
//!
//! | element | vector     | lanes |
//! |---------|------------|-------|
//! | `f32`   | `f32x8`    | 8     |
//! | `f64`   | `f64x4`    | 4     |
//! | `i32`   | `i32x8`    | 8     |
//! | `i64`   | itself     | 1     |
//! | `u8`    | itself     | 1     |
//!
//! Types without a wide vector use a single-lane fallback so every element type goes
//! through the same dispatcher.

use num_traits::Float;
use onyx_tensor::TensorElement;
use wide::{f32x8, f64x4, i32x8};

/// An element type with a lane-parallel vector representation.
pub trait SimdElement: TensorElement {
    /// The vector holding `LANES` elements.
    type Vector: Copy;

    /// Number of elements per vector.
    const LANES: usize;

    /// Whether the type has a fused-multiply-add matmul tile on this target.
    const HAS_FUSED_TILE: bool = false;

    /// Loads the first `LANES` elements of `src`.
    fn load(src: &[Self]) -> Self::Vector;

    /// Stores a vector into the first `LANES` elements of `dst`.
    fn store(v: Self::Vector, dst: &mut [Self]);

    /// A vector with every lane set to `value`.
    fn splat(value: Self) -> Self::Vector;

    /// Lane-wise addition. Integer lanes wrap on overflow, as the `wide` vectors do.
    fn vadd(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise subtraction.
    fn vsub(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise multiplication.
    fn vmul(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise division.
    fn vdiv(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise maximum.
    fn vmax(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise minimum.
    fn vmin(a: Self::Vector, b: Self::Vector) -> Self::Vector;

    /// Lane-wise negation (wrapping for integer types).
    fn vneg(a: Self::Vector) -> Self::Vector;

    /// Lane-wise absolute value.
    fn vabs(a: Self::Vector) -> Self::Vector;

    /// Run the fused-multiply-add 2x4 tile on row-major `a (m x k)` and `b (k x n)`.
    ///
    /// Returns `false` when the type or target has no tile; `c` is then untouched.
    fn fused_tile_matmul(
        _a: &[Self],
        _b: &[Self],
        _c: &mut [Self],
        _m: usize,
        _k: usize,
        _n: usize,
    ) -> bool {
        false
    }
}

/// Float element types with additional lane-wise math.
pub trait SimdFloat: SimdElement + Float {
    /// Lane-wise square root.
    fn vsqrt(a: Self::Vector) -> Self::Vector;
}

macro_rules! impl_wide_lanes {
    ($t:ty, $v:ty, $lanes:expr) => {
        #[inline]
        fn load(src: &[$t]) -> $v {
            let mut lanes = [<$t>::default(); $lanes];
            lanes.copy_from_slice(&src[..$lanes]);
            <$v>::new(lanes)
        }

        #[inline]
        fn store(v: $v, dst: &mut [$t]) {
            dst[..$lanes].copy_from_slice(&v.to_array());
        }

        #[inline]
        fn splat(value: $t) -> $v {
            <$v>::splat(value)
        }

        #[inline]
        fn vadd(a: $v, b: $v) -> $v {
            a + b
        }

        #[inline]
        fn vsub(a: $v, b: $v) -> $v {
            a - b
        }

        #[inline]
        fn vmul(a: $v, b: $v) -> $v {
            a * b
        }

        #[inline]
        fn vmax(a: $v, b: $v) -> $v {
            a.max(b)
        }

        #[inline]
        fn vmin(a: $v, b: $v) -> $v {
            a.min(b)
        }

        #[inline]
        fn vneg(a: $v) -> $v {
            -a
        }

        #[inline]
        fn vabs(a: $v) -> $v {
            a.abs()
        }
    };
}

impl SimdElement for f32 {
    type Vector = f32x8;
    const LANES: usize = 8;
    const HAS_FUSED_TILE: bool = cfg!(target_arch = "x86_64");

    impl_wide_lanes!(f32, f32x8, 8);

    #[inline]
    fn vdiv(a: f32x8, b: f32x8) -> f32x8 {
        a / b
    }

    fn fused_tile_matmul(
        a: &[f32],
        b: &[f32],
        c: &mut [f32],
        m: usize,
        k: usize,
        n: usize,
    ) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            if crate::config::host_has_fma() {
                // SAFETY: AVX2 and FMA support was checked above
                unsafe { crate::matmul::matmul_tile_2x4_f32(a, b, c, m, k, n) };
                return true;
            }
        }
        let _ = (a, b, c, m, k, n);
        false
    }
}

impl SimdFloat for f32 {
    #[inline]
    fn vsqrt(a: f32x8) -> f32x8 {
        a.sqrt()
    }
}

impl SimdElement for f64 {
    type Vector = f64x4;
    const LANES: usize = 4;

    impl_wide_lanes!(f64, f64x4, 4);

    #[inline]
    fn vdiv(a: f64x4, b: f64x4) -> f64x4 {
        a / b
    }
}

impl SimdFloat for f64 {
    #[inline]
    fn vsqrt(a: f64x4) -> f64x4 {
        a.sqrt()
    }
}

impl SimdElement for i32 {
    type Vector = i32x8;
    const LANES: usize = 8;

    impl_wide_lanes!(i32, i32x8, 8);

    // no integer division instruction; divide lane by lane
    #[inline]
    fn vdiv(a: i32x8, b: i32x8) -> i32x8 {
        let (a, b) = (a.to_array(), b.to_array());
        i32x8::new(std::array::from_fn(|i| a[i] / b[i]))
    }
}

macro_rules! impl_single_lane {
    ($($t:ty => $neg:expr, $abs:expr);* $(;)?) => {
        $(
            impl SimdElement for $t {
                type Vector = $t;
                const LANES: usize = 1;

                #[inline]
                fn load(src: &[$t]) -> $t {
                    src[0]
                }

                #[inline]
                fn store(v: $t, dst: &mut [$t]) {
                    dst[0] = v;
                }

                #[inline]
                fn splat(value: $t) -> $t {
                    value
                }

                #[inline]
                fn vadd(a: $t, b: $t) -> $t {
                    a.wrapping_add(b)
                }

                #[inline]
                fn vsub(a: $t, b: $t) -> $t {
                    a.wrapping_sub(b)
                }

                #[inline]
                fn vmul(a: $t, b: $t) -> $t {
                    a.wrapping_mul(b)
                }

                #[inline]
                fn vdiv(a: $t, b: $t) -> $t {
                    a / b
                }

                #[inline]
                fn vmax(a: $t, b: $t) -> $t {
                    a.max(b)
                }

                #[inline]
                fn vmin(a: $t, b: $t) -> $t {
                    a.min(b)
                }

                #[inline]
                fn vneg(a: $t) -> $t {
                    $neg(a)
                }

                #[inline]
                fn vabs(a: $t) -> $t {
                    $abs(a)
                }
            }
        )*
    };
}

impl_single_lane! {
    u8 => u8::wrapping_neg, std::convert::identity;
    i64 => i64::wrapping_neg, i64::wrapping_abs;
}
