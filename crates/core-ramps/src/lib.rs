//! Gamma-ramp value model and lookup-table arithmetic.
//!
//! A ramp triple holds one lookup table per colour channel; the stop type is
//! one of six depths (four unsigned integer widths and two float widths).
//! All transform primitives operate in place and are referentially local so
//! tools can compose them in any documented order. Out-of-range float
//! intermediates are tolerated until an explicit [`RampTriple::clip`]; the
//! saturating cast in [`Sample::from_f64`] is the only place where integer
//! values are silently corrected.

mod depth;
mod ops;
mod sample;
mod triple;

pub use depth::Depth;
pub use sample::Sample;
pub use triple::{RampError, RampSizes, RampTriple, Ramps};
