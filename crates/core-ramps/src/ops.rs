//! In-place transform primitives over ramp triples.
//!
//! Every primitive is parameterised per channel and carries no hidden state,
//! so tools can compose them in any order. Identity parameters (`gamma 1`,
//! `brightness 1`, `limits 0..1`) short-circuit per channel; the identity
//! must hold bit-exact, and a round trip through `f64` does not guarantee
//! that for wide integer stops.

use crate::triple::with_triple;
use crate::{RampTriple, Ramps, Sample};

/// sRGB electro-optical transfer function (encoded to linear).
fn srgb_eotf(v: f64) -> f64 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB opto-electronic transfer function (linear to encoded).
fn srgb_oetf(v: f64) -> f64 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn map_channel<T: Sample>(channel: &mut [T], f: impl Fn(f64) -> f64) {
    for stop in channel.iter_mut() {
        *stop = T::from_f64(f(stop.to_f64()));
    }
}

impl<T: Sample> RampTriple<T> {
    /// Replace each selected channel with the identity ramp: stop `i` gets
    /// `i / (size - 1) * MAX`, rounded to the nearest representable stop.
    pub fn start_over(&mut self, r: bool, g: bool, b: bool) {
        let maxv = T::MAX.to_f64();
        let float = T::DEPTH.is_float();
        for channel in self.selected_mut(r, g, b) {
            let n = channel.len();
            if n <= 1 {
                for stop in channel.iter_mut() {
                    *stop = T::MAX;
                }
                continue;
            }
            for (i, stop) in channel.iter_mut().enumerate() {
                let v = i as f64 / (n - 1) as f64 * maxv;
                *stop = T::from_f64(if float { v } else { v.round() });
            }
        }
    }

    /// Apply a gamma curve per channel: `y <- MAX * (y / MAX)^g`.
    /// `g = 1` leaves the channel untouched; `y = 0` stays `0`.
    pub fn gamma(&mut self, rg: f64, gg: f64, bg: f64) {
        let maxv = T::MAX.to_f64();
        for (channel, g) in [
            (&mut self.red, rg),
            (&mut self.green, gg),
            (&mut self.blue, bg),
        ] {
            if g == 1.0 {
                continue;
            }
            map_channel(channel, |v| (v / maxv).powf(g) * maxv);
        }
    }

    /// Multiplicative brightness per channel: `y <- y * b`, saturating at
    /// the integer range but deliberately not clipped for float stops.
    pub fn rgb_brightness(&mut self, rb: f64, gb: f64, bb: f64) {
        for (channel, b) in [
            (&mut self.red, rb),
            (&mut self.green, gb),
            (&mut self.blue, bb),
        ] {
            if b == 1.0 {
                continue;
            }
            if b == 0.0 {
                channel.fill(T::default());
                continue;
            }
            map_channel(channel, |v| v * b);
        }
    }

    /// Luminance-scaling brightness: the stop is linearised through the sRGB
    /// transfer function, scaled, and re-encoded, so `b` scales emitted
    /// luminance rather than the encoded value. `b = 1` is the identity and
    /// `b = 0` is absolute darkness.
    pub fn cie_brightness(&mut self, rb: f64, gb: f64, bb: f64) {
        let maxv = T::MAX.to_f64();
        for (channel, b) in [
            (&mut self.red, rb),
            (&mut self.green, gb),
            (&mut self.blue, bb),
        ] {
            if b == 1.0 {
                continue;
            }
            if b == 0.0 {
                channel.fill(T::default());
                continue;
            }
            map_channel(channel, |v| srgb_oetf(srgb_eotf(v / maxv) * b) * maxv);
        }
    }

    /// Brightness and contrast limits per channel:
    /// `y <- (min + (y / MAX) * (max - min)) * MAX`.
    pub fn rgb_limits(&mut self, rmin: f64, rmax: f64, gmin: f64, gmax: f64, bmin: f64, bmax: f64) {
        let maxv = T::MAX.to_f64();
        for (channel, min, max) in [
            (&mut self.red, rmin, rmax),
            (&mut self.green, gmin, gmax),
            (&mut self.blue, bmin, bmax),
        ] {
            if min == 0.0 && max == 1.0 {
                continue;
            }
            map_channel(channel, |v| (min + v / maxv * (max - min)) * maxv);
        }
    }

    /// Reverse the selected channels: `y <- MAX - y`. Exact, hence its own
    /// involution.
    pub fn negative(&mut self, r: bool, g: bool, b: bool) {
        for channel in self.selected_mut(r, g, b) {
            for stop in channel.iter_mut() {
                *stop = stop.complement();
            }
        }
    }

    /// Emulate a lower-resolution ramp. Per channel, `x` quantises the
    /// abscissa to `x` sample points and `y` quantises the output to at most
    /// `y` distinct values uniformly distributed in `[0, MAX]`; `0` leaves
    /// that axis unchanged.
    pub fn lower_resolution(&mut self, rx: usize, ry: usize, gx: usize, gy: usize, bx: usize, by: usize) {
        let maxv = T::MAX.to_f64();
        let float = T::DEPTH.is_float();
        for (channel, x, y) in [
            (&mut self.red, rx, ry),
            (&mut self.green, gx, gy),
            (&mut self.blue, bx, by),
        ] {
            let n = channel.len();
            if n == 0 || (x == 0 && y == 0) {
                continue;
            }
            let quantised: Vec<T> = (0..n)
                .map(|i| {
                    let j = match x {
                        0 => i,
                        1 => 0,
                        x if n > 1 => {
                            let grid = (i as f64 / (n - 1) as f64 * (x - 1) as f64).round();
                            (grid / (x - 1) as f64 * (n - 1) as f64).round() as usize
                        }
                        _ => i,
                    };
                    let v = channel[j.min(n - 1)].to_f64();
                    let v = match y {
                        0 => v,
                        1 => 0.0,
                        _ => (v / maxv * (y - 1) as f64).round() / (y - 1) as f64 * maxv,
                    };
                    T::from_f64(if float { v } else { v.round() })
                })
                .collect();
            channel.copy_from_slice(&quantised);
        }
    }

    /// Saturate the selected channels to the representable range. Only float
    /// stops can be out of range; they clamp to `[0, 1]`.
    pub fn clip(&mut self, r: bool, g: bool, b: bool) {
        for channel in self.selected_mut(r, g, b) {
            for stop in channel.iter_mut() {
                *stop = stop.clipped();
            }
        }
    }

    /// Convert the selected channels from sRGB encoding to linear light.
    pub fn linearise(&mut self, r: bool, g: bool, b: bool) {
        let maxv = T::MAX.to_f64();
        for channel in self.selected_mut(r, g, b) {
            map_channel(channel, |v| srgb_eotf(v / maxv) * maxv);
        }
    }

    /// Convert the selected channels from linear light to sRGB encoding.
    /// Inverse of [`RampTriple::linearise`].
    pub fn standardise(&mut self, r: bool, g: bool, b: bool) {
        let maxv = T::MAX.to_f64();
        for channel in self.selected_mut(r, g, b) {
            map_channel(channel, |v| srgb_oetf(v / maxv) * maxv);
        }
    }

    /// Rewrite this triple by sampling `src` at this triple's abscissae:
    /// `dst[i] = src[round(i / (|dst|-1) * (|src|-1))] * DST_MAX / SRC_MAX`,
    /// rounded to the nearest stop for integer destinations. Used to
    /// materialise a filter at a different depth from where it was computed.
    pub fn translate<S: Sample>(&mut self, src: &RampTriple<S>) {
        let smax = S::MAX.to_f64();
        let dmax = T::MAX.to_f64();
        let float = T::DEPTH.is_float();
        for (dst, src) in [
            (&mut self.red, &src.red),
            (&mut self.green, &src.green),
            (&mut self.blue, &src.blue),
        ] {
            let nd = dst.len();
            let ns = src.len();
            if nd == 0 || ns == 0 {
                continue;
            }
            for (i, stop) in dst.iter_mut().enumerate() {
                let j = if nd <= 1 || ns <= 1 {
                    0
                } else {
                    (i as f64 / (nd - 1) as f64 * (ns - 1) as f64).round() as usize
                };
                let v = src[j.min(ns - 1)].to_f64() / smax * dmax;
                *stop = T::from_f64(if float { v } else { v.round() });
            }
        }
    }
}

macro_rules! forward_op {
    ($(#[$meta:meta])* $name:ident ( $($arg:ident : $ty:ty),* )) => {
        $(#[$meta])*
        pub fn $name(&mut self, $($arg: $ty),*) {
            with_triple!(self, t => t.$name($($arg),*))
        }
    };
}

impl Ramps {
    forward_op!(
        /// See [`RampTriple::start_over`].
        start_over(r: bool, g: bool, b: bool)
    );
    forward_op!(
        /// See [`RampTriple::gamma`].
        gamma(rg: f64, gg: f64, bg: f64)
    );
    forward_op!(
        /// See [`RampTriple::rgb_brightness`].
        rgb_brightness(rb: f64, gb: f64, bb: f64)
    );
    forward_op!(
        /// See [`RampTriple::cie_brightness`].
        cie_brightness(rb: f64, gb: f64, bb: f64)
    );
    forward_op!(
        /// See [`RampTriple::rgb_limits`].
        rgb_limits(rmin: f64, rmax: f64, gmin: f64, gmax: f64, bmin: f64, bmax: f64)
    );
    forward_op!(
        /// See [`RampTriple::negative`].
        negative(r: bool, g: bool, b: bool)
    );
    forward_op!(
        /// See [`RampTriple::lower_resolution`].
        lower_resolution(rx: usize, ry: usize, gx: usize, gy: usize, bx: usize, by: usize)
    );
    forward_op!(
        /// See [`RampTriple::clip`].
        clip(r: bool, g: bool, b: bool)
    );
    forward_op!(
        /// See [`RampTriple::linearise`].
        linearise(r: bool, g: bool, b: bool)
    );
    forward_op!(
        /// See [`RampTriple::standardise`].
        standardise(r: bool, g: bool, b: bool)
    );

    /// Materialise `src` into this triple's depth and geometry.
    pub fn translate_from(&mut self, src: &Ramps) {
        with_triple!(self, dst => with_triple!(src, s => dst.translate(s)))
    }

    /// Materialise a double-precision prototype into this triple.
    pub fn translate_from_f64(&mut self, src: &RampTriple<f64>) {
        with_triple!(self, dst => dst.translate(src))
    }
}
