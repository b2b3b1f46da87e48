//! `infomax-datasets` provides synthetic source mixtures ready to be used in tests and benchmarks.
//!
//! ## The Big Picture
//!
//! Blind source separation is easiest to verify when the sources are known. The generators in
//! [`generate`] draw independent sources with a prescribed distribution, all with zero mean and
//! unit variance, and mix them linearly into a `(channels, frames)` recording.
//!
//! ## Using a mixture
//!
//! ```ignore
//! let mut rng = Xoshiro256Plus::seed_from_u64(42);
//! let sources = infomax_datasets::generate::laplace_sources(2, 2000, &mut rng);
//! let mixing = infomax_datasets::generate::random_mixing(2, &mut rng);
//! let recording = mixing.dot(&sources);
//! ```

pub mod generate;
