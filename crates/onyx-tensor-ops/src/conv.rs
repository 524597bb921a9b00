//! 2D convolution and max pooling over NCHW tensors.

use onyx_tensor::{Tensor, TensorAccess, TensorElement};

use crate::error::TensorOpsError;

/// Explicit padding of the two spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pads {
    /// Rows added above.
    pub top: usize,
    /// Columns added on the left.
    pub left: usize,
    /// Rows added below.
    pub bottom: usize,
    /// Columns added on the right.
    pub right: usize,
}

impl Pads {
    /// Create padding from `[top, left, bottom, right]`.
    pub fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// The same padding on every side.
    pub fn uniform(p: usize) -> Self {
        Self::new(p, p, p, p)
    }
}

/// How the spatial padding is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadMode {
    /// No padding.
    #[default]
    Valid,
    /// Output is `ceil(in / stride)`; an odd padding remainder goes after.
    SameUpper,
    /// Output is `ceil(in / stride)`; an odd padding remainder goes before.
    SameLower,
    /// Fixed padding.
    Explicit(Pads),
}

/// Output size and padding of one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisGeometry {
    /// Number of output positions.
    pub output: usize,
    /// Padding before the first input element.
    pub pad_before: usize,
    /// Padding after the last input element.
    pub pad_after: usize,
}

/// Extent of a dilated filter: `(k - 1) * d + 1`.
#[inline]
pub fn effective_filter_size(kernel: usize, dilation: usize) -> usize {
    (kernel - 1) * dilation + 1
}

fn axis_geometry(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    mode: PadMode,
    explicit: (usize, usize),
) -> Result<AxisGeometry, TensorOpsError> {
    let eff = effective_filter_size(kernel, dilation);
    let (pad_before, pad_after) = match mode {
        PadMode::Valid => (0, 0),
        PadMode::Explicit(_) => explicit,
        PadMode::SameUpper | PadMode::SameLower => {
            let output = input.div_ceil(stride);
            let total = ((output.saturating_sub(1)) * stride + eff).saturating_sub(input);
            if mode == PadMode::SameUpper {
                (total / 2, total - total / 2)
            } else {
                (total - total / 2, total / 2)
            }
        }
    };

    let padded = input + pad_before + pad_after;
    if padded < eff {
        return Err(TensorOpsError::ShapeMismatch(vec![padded], vec![eff]));
    }
    Ok(AxisGeometry {
        output: (padded - eff) / stride + 1,
        pad_before,
        pad_after,
    })
}

/// Output geometry of both spatial axes, `[height, width]`.
///
/// # Errors
///
/// [`TensorOpsError::ShapeMismatch`] when a padded input axis is smaller than the
/// effective filter size, and [`TensorOpsError::InvalidArgument`] for zero-sized
/// kernels, strides or dilations.
pub fn output_geometry(
    input: [usize; 2],
    kernel: [usize; 2],
    strides: [usize; 2],
    dilations: [usize; 2],
    pad: PadMode,
) -> Result<[AxisGeometry; 2], TensorOpsError> {
    if kernel.contains(&0) {
        return Err(TensorOpsError::InvalidArgument(format!(
            "kernel shape must be positive, got {kernel:?}"
        )));
    }
    if strides.contains(&0) {
        return Err(TensorOpsError::InvalidArgument(format!(
            "strides must be >= 1, got {strides:?}"
        )));
    }
    if dilations.contains(&0) {
        return Err(TensorOpsError::InvalidArgument(format!(
            "dilations must be >= 1, got {dilations:?}"
        )));
    }

    let pads = match pad {
        PadMode::Explicit(p) => p,
        _ => Pads::default(),
    };
    Ok([
        axis_geometry(input[0], kernel[0], strides[0], dilations[0], pad, (pads.top, pads.bottom))?,
        axis_geometry(input[1], kernel[1], strides[1], dilations[1], pad, (pads.left, pads.right))?,
    ])
}

/// Parameters of [`conv2d`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dParams {
    /// Number of channel groups.
    pub group: usize,
    /// Padding mode.
    pub pad: PadMode,
    /// Expected kernel size; taken from the weight when `None`.
    pub kernel_shape: Option<[usize; 2]>,
    /// Vertical and horizontal strides.
    pub strides: [usize; 2],
    /// Vertical and horizontal dilations.
    pub dilations: [usize; 2],
}

impl Default for Conv2dParams {
    fn default() -> Self {
        Self {
            group: 1,
            pad: PadMode::Valid,
            kernel_shape: None,
            strides: [1, 1],
            dilations: [1, 1],
        }
    }
}

/// Source row/column for an output position and a kernel tap, `None` in the padding.
#[inline]
fn source_coord(out: usize, stride: usize, tap: usize, dilation: usize, pad: usize, size: usize) -> Option<usize> {
    (out * stride + tap * dilation)
        .checked_sub(pad)
        .filter(|&v| v < size)
}

fn check_rank4<T: TensorElement>(op: &'static str, t: &Tensor<T>) -> Result<[usize; 4], TensorOpsError> {
    match t.shape() {
        &[a, b, c, d] => Ok([a, b, c, d]),
        other => Err(TensorOpsError::rank_mismatch(op, 4, other.len())),
    }
}

/// Grouped 2D convolution.
///
/// `input` is `(N, C, H, W)` and `weight` is `(M, C / group, kH, kW)`; the optional
/// `bias` has shape `(M,)`. The result is `(N, M, oH, oW)`.
///
/// # Example
///
/// ```
/// use onyx_tensor::{Tensor, TensorAccess};
/// use onyx_tensor_ops::conv::{conv2d, Conv2dParams};
///
/// let x = Tensor::<f32>::from_shape_val(&[1, 1, 4, 4], 1.0);
/// let w = Tensor::<f32>::from_shape_val(&[1, 1, 2, 2], 1.0);
/// let y = conv2d(&x, &w, None, &Conv2dParams::default()).unwrap();
/// assert_eq!(y.shape(), &[1, 1, 3, 3]);
/// assert_eq!(y.to_vec(), vec![4.0; 9]);
/// ```
pub fn conv2d<T: TensorElement>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    bias: Option<&Tensor<T>>,
    params: &Conv2dParams,
) -> Result<Tensor<T>, TensorOpsError> {
    let [n, c, h, w] = check_rank4("conv2d", input)?;
    let [m, cpg, kh, kw] = check_rank4("conv2d", weight)?;
    let group = params.group;

    if group == 0 || c % group != 0 || m % group != 0 {
        return Err(TensorOpsError::InvalidArgument(format!(
            "group {group} must divide input channels {c} and output channels {m}"
        )));
    }
    if cpg != c / group {
        return Err(TensorOpsError::ShapeMismatch(
            input.shape().to_vec(),
            weight.shape().to_vec(),
        ));
    }
    if let Some(ks) = params.kernel_shape {
        if ks != [kh, kw] {
            return Err(TensorOpsError::ShapeMismatch(ks.to_vec(), vec![kh, kw]));
        }
    }
    if let Some(b) = bias {
        if b.shape() != [m] {
            return Err(TensorOpsError::ShapeMismatch(vec![m], b.shape().to_vec()));
        }
    }

    let [gy, gx] = output_geometry([h, w], [kh, kw], params.strides, params.dilations, params.pad)?;
    let (oh, ow) = (gy.output, gx.output);
    let [sh, sw] = params.strides;
    let [dh, dw] = params.dilations;
    let out_per_group = m / group;

    let x = Tensor::Dense(input.contiguous());
    let k = Tensor::Dense(weight.contiguous());
    let bias = bias.map(|b| b.to_vec());

    let mut out = vec![T::zero(); n * m * oh * ow];
    let x_pin = x.pin();
    let k_pin = k.pin();
    let (xs, ks) = (x_pin.buffer(), k_pin.buffer());

    let mut out_idx = 0;
    for b in 0..n {
        for oc in 0..m {
            let g = oc / out_per_group;
            let seed = bias.as_ref().map_or(T::zero(), |bias| bias[oc]);
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = seed;
                    for icg in 0..cpg {
                        let ic = g * cpg + icg;
                        let x_plane = &xs[(b * c + ic) * h * w..(b * c + ic + 1) * h * w];
                        let k_plane = &ks[(oc * cpg + icg) * kh * kw..(oc * cpg + icg + 1) * kh * kw];
                        for ky in 0..kh {
                            let Some(iy) = source_coord(oy, sh, ky, dh, gy.pad_before, h) else {
                                continue;
                            };
                            for kx in 0..kw {
                                let Some(ix) = source_coord(ox, sw, kx, dw, gx.pad_before, w) else {
                                    continue;
                                };
                                let tap = x_plane[iy * w + ix].wrapping_mul(k_plane[ky * kw + kx]);
                                acc = acc.wrapping_add(tap);
                            }
                        }
                    }
                    out[out_idx] = acc;
                    out_idx += 1;
                }
            }
        }
    }
    drop(x_pin);
    drop(k_pin);

    Ok(Tensor::from_shape_vec(&[n, m, oh, ow], out)?)
}

/// Parameters of [`max_pool2d`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxPool2dParams {
    /// Window size.
    pub kernel_shape: [usize; 2],
    /// Padding mode.
    pub pad: PadMode,
    /// Window strides; the kernel shape when `None`.
    pub strides: Option<[usize; 2]>,
    /// Spacing between window taps.
    pub dilations: [usize; 2],
}

impl MaxPool2dParams {
    /// Non-overlapping, unpadded windows of `kernel_shape`.
    pub fn new(kernel_shape: [usize; 2]) -> Self {
        Self {
            kernel_shape,
            pad: PadMode::Valid,
            strides: None,
            dilations: [1, 1],
        }
    }
}

/// 2D max pooling of an `(N, C, H, W)` tensor.
///
/// Padded positions never win: the window maximum starts at `T::MIN_VALUE`, so a window
/// lying entirely in the padding yields it (`-inf` for floats).
pub fn max_pool2d<T: TensorElement>(
    input: &Tensor<T>,
    params: &MaxPool2dParams,
) -> Result<Tensor<T>, TensorOpsError> {
    let [n, c, h, w] = check_rank4("max_pool2d", input)?;
    let [kh, kw] = params.kernel_shape;
    let strides = params.strides.unwrap_or(params.kernel_shape);
    let [gy, gx] = output_geometry([h, w], [kh, kw], strides, params.dilations, params.pad)?;
    let (oh, ow) = (gy.output, gx.output);
    let [sh, sw] = strides;
    let [dh, dw] = params.dilations;

    let x = Tensor::Dense(input.contiguous());
    let x_pin = x.pin();
    let xs = x_pin.buffer();

    let mut out = Vec::with_capacity(n * c * oh * ow);
    for p in 0..n * c {
        let plane = &xs[p * h * w..(p + 1) * h * w];
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = T::MIN_VALUE;
                for ky in 0..kh {
                    let Some(iy) = source_coord(oy, sh, ky, dh, gy.pad_before, h) else {
                        continue;
                    };
                    for kx in 0..kw {
                        let Some(ix) = source_coord(ox, sw, kx, dw, gx.pad_before, w) else {
                            continue;
                        };
                        let v = plane[iy * w + ix];
                        if v > acc {
                            acc = v;
                        }
                    }
                }
                out.push(acc);
            }
        }
    }
    drop(x_pin);

    Ok(Tensor::from_shape_vec(&[n, c, oh, ow], out)?)
}
