//! Block-adaptive, error-bounded lossy compression of 3D `f32` volumes with
//! random-access decompression.
//!
//! ```no_run
//! let (r1, r2, r3) = (32, 32, 32);
//! let data: Vec<f32> = (0..r1 * r2 * r3).map(|i| (i as f32 * 0.01).sin()).collect();
//! let bytes = szra_core::compress(&data, r1, r2, r3, 1e-3)?;
//! let sub = szra_core::decompress_region(&bytes, None, &[r1, r2, r3], &[4, 4, 4], &[12, 12, 12])?;
//! assert_eq!(sub.len(), 8 * 8 * 8);
//! # Ok::<(), szra_core::SzError>(())
//! ```

pub mod backend;
pub mod bits;
pub mod codec;
pub mod coefficients;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod huffman;
pub mod intervals;
pub mod intstream;
pub mod predictor;
pub mod quantizer;
pub mod reader;
pub mod writer;

pub use backend::{backend_for, ParallelBackend, PredictorBackend, SerialBackend};
pub use codec::{LosslessCodec, PassThroughCodec};
pub use config::{BackendKind, SzConfig};
pub use error::{ErrorKind, Result, SzError};
pub use format::{Preamble, MAGIC, PREAMBLE_SIZE};
pub use geometry::Geometry;
pub use reader::{decompress, decompress_region, inspect, BlockStats, ContainerInfo, Reader};
pub use writer::{compress, Writer};
