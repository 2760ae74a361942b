//! Execution strategies for the per-block regression fit and predictor
//! sampling pass.
//!
//! Both backends run the same kernel ([`fit_block`]) and must produce
//! bit-identical results; they differ only in how blocks are scheduled.
//! Results are always returned in canonical block order.

use std::sync::Mutex;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::config::BackendKind;
use crate::error::{Result, SzError};
use crate::geometry::Geometry;
use crate::predictor::{fit_regression, select_predictor, BlockFit, SamplingParams};

/// Pluggable strategy computing `(coefficients, mode)` for every block.
pub trait PredictorBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit_regression_and_sample(
        &self,
        data: &[f32],
        geometry: &Geometry,
        params: &SamplingParams,
    ) -> Result<Vec<BlockFit>>;
}

/// Per-worker scratch buffers.
struct Scratch {
    block: Vec<f32>,
    padded: Vec<f32>,
}

impl Scratch {
    fn new(geometry: &Geometry) -> Self {
        Self {
            block: vec![0.0; geometry.block_elements],
            padded: vec![0.0; geometry.padded_len()],
        }
    }
}

/// Fit and sample block `index`. Reads only the original volume.
fn fit_block(
    data: &[f32],
    geometry: &Geometry,
    params: &SamplingParams,
    index: usize,
    scratch: &mut Scratch,
) -> BlockFit {
    let coords = geometry.block_coords(index);
    geometry.gather_block(data, coords, &mut scratch.block);
    let coefficients = fit_regression(&scratch.block, geometry.block_size);
    geometry.gather_padded(data, coords, &mut scratch.padded);
    let mode = select_predictor(&scratch.padded, &coefficients, geometry, params);
    BlockFit { coefficients, mode }
}

fn check_volume(data: &[f32], geometry: &Geometry) -> Result<()> {
    if data.len() != geometry.num_elements {
        return Err(SzError::ShapeMismatch {
            stored: data.len() as u64,
            requested: geometry.num_elements as u64,
        });
    }
    Ok(())
}

/// Reference single-threaded host path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl PredictorBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn fit_regression_and_sample(
        &self,
        data: &[f32],
        geometry: &Geometry,
        params: &SamplingParams,
    ) -> Result<Vec<BlockFit>> {
        check_volume(data, geometry)?;
        let mut scratch = Scratch::new(geometry);
        Ok((0..geometry.num_blocks)
            .map(|idx| fit_block(data, geometry, params, idx, &mut scratch))
            .collect())
    }
}

/// Accelerator failure code used when the pool cannot be built.
pub const ACCEL_INIT_FAILED: i32 = -1;
/// Accelerator failure code used when the self-test disagrees with the host.
pub const ACCEL_SELF_TEST_FAILED: i32 = -2;

/// Block-parallel backend on a dedicated thread pool.
///
/// The pool plays the role of an accelerator context: it is created by
/// [`init`](Self::init), verified with [`self_test`](Self::self_test), and
/// torn down by [`release`](Self::release) or on drop. The last failure is
/// kept on the handle as a `(code, message)` pair.
pub struct ParallelBackend {
    pool: ThreadPool,
    last_error: Mutex<Option<(i32, String)>>,
}

impl ParallelBackend {
    /// Build the pool. `threads = 0` lets rayon pick one thread per core.
    pub fn init(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("szra-worker-{i}"))
            .build()
            .map_err(|e| SzError::Accelerator {
                code: ACCEL_INIT_FAILED,
                message: format!("failed to create thread pool: {e}"),
            })?;
        debug!(threads = pool.current_num_threads(), "parallel backend initialised");
        Ok(Self {
            pool,
            last_error: Mutex::new(None),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Element-wise add of two pseudo-random vectors on the pool, checked
    /// against the same sum computed on the calling thread.
    pub fn self_test(&self) -> bool {
        const N: usize = 1024;
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 40) as f32 / (1u64 << 24) as f32
        };
        let a: Vec<f32> = (0..N).map(|_| next()).collect();
        let b: Vec<f32> = (0..N).map(|_| next()).collect();
        let expected: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
        let got: Vec<f32> = self
            .pool
            .install(|| a.par_iter().zip(b.par_iter()).map(|(x, y)| x + y).collect());
        if got == expected {
            true
        } else {
            self.set_error(ACCEL_SELF_TEST_FAILED, "vector-add self test mismatch".into());
            false
        }
    }

    /// Code of the last failure, 0 when none occurred.
    pub fn error_code(&self) -> i32 {
        self.last_error
            .lock()
            .map(|e| e.as_ref().map_or(0, |(code, _)| *code))
            .unwrap_or(ACCEL_INIT_FAILED)
    }

    pub fn error_message(&self) -> Option<String> {
        self.last_error
            .lock()
            .ok()
            .and_then(|e| e.as_ref().map(|(_, msg)| msg.clone()))
    }

    fn set_error(&self, code: i32, message: String) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some((code, message));
        }
    }

    /// Tear down the pool, joining its workers.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ParallelBackend {
    fn drop(&mut self) {
        debug!(threads = self.pool.current_num_threads(), "parallel backend released");
    }
}

impl PredictorBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn fit_regression_and_sample(
        &self,
        data: &[f32],
        geometry: &Geometry,
        params: &SamplingParams,
    ) -> Result<Vec<BlockFit>> {
        check_volume(data, geometry)?;
        // Indexed collect keeps canonical block order regardless of scheduling.
        Ok(self.pool.install(|| {
            (0..geometry.num_blocks)
                .into_par_iter()
                .map_init(
                    || Scratch::new(geometry),
                    |scratch, idx| fit_block(data, geometry, params, idx, scratch),
                )
                .collect()
        }))
    }
}

/// Resolve the configured backend. A parallel backend that fails to
/// initialise or to pass its self test is replaced by the serial path.
pub fn backend_for(kind: BackendKind) -> Box<dyn PredictorBackend> {
    match kind {
        BackendKind::Serial => Box::new(SerialBackend),
        BackendKind::Parallel { threads } => with_fallback(ParallelBackend::init(threads)),
    }
}

fn with_fallback(init: Result<ParallelBackend>) -> Box<dyn PredictorBackend> {
    match init {
        Ok(backend) if backend.self_test() => Box::new(backend),
        Ok(backend) => {
            warn!(
                code = backend.error_code(),
                reason = %backend.error_message().unwrap_or_default(),
                "parallel backend failed its self test, falling back to serial"
            );
            Box::new(SerialBackend)
        }
        Err(e) => {
            warn!(error = %e, "parallel backend unavailable, falling back to serial");
            Box::new(SerialBackend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::PredictorMode;

    /// Smooth planes (Lorenzo territory) for `i < 12`, LCG noise above,
    /// where the regression fit wins.
    fn mixed(r1: usize, r2: usize, r3: usize) -> Vec<f32> {
        let mut state = 7u64;
        let mut out = Vec::with_capacity(r1 * r2 * r3);
        for i in 0..r1 {
            for j in 0..r2 {
                for k in 0..r3 {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let noise = (state >> 40) as f32 / (1u64 << 24) as f32;
                    let (x, y, z) = (i as f32, j as f32, k as f32);
                    out.push(if i < 12 {
                        (x * 0.7).sin() * (y * 0.3).cos() * 5.0 + z * z * 0.05 + x * 0.1
                    } else {
                        noise
                    });
                }
            }
        }
        out
    }

    #[test]
    fn parallel_matches_serial_bit_for_bit() {
        let (r1, r2, r3) = (30, 14, 23);
        let g = Geometry::new(6, r1, r2, r3).unwrap();
        let data = mixed(r1, r2, r3);
        let params = SamplingParams { noise: 1.22e-3, mean: None };
        let serial = SerialBackend.fit_regression_and_sample(&data, &g, &params).unwrap();
        assert_eq!(serial.len(), g.num_blocks);
        assert!(serial.iter().any(|f| f.mode == PredictorMode::Regression));
        assert!(serial.iter().any(|f| f.mode == PredictorMode::Lorenzo));

        let parallel = ParallelBackend::init(4).unwrap();
        assert!(parallel.self_test());
        assert_eq!(parallel.error_code(), 0);
        let par = parallel.fit_regression_and_sample(&data, &g, &params).unwrap();
        assert_eq!(serial, par);
        parallel.release();
    }

    #[test]
    fn wrong_volume_length_is_rejected() {
        let g = Geometry::new(6, 6, 6, 6).unwrap();
        let params = SamplingParams { noise: 0.0, mean: None };
        assert!(matches!(
            SerialBackend.fit_regression_and_sample(&[0.0; 10], &g, &params),
            Err(SzError::ShapeMismatch { stored: 10, requested: 216 })
        ));
    }

    #[test]
    fn failed_init_falls_back_to_serial() {
        let failed = Err(SzError::Accelerator {
            code: ACCEL_INIT_FAILED,
            message: "no device".into(),
        });
        assert_eq!(with_fallback(failed).name(), "serial");
        assert_eq!(backend_for(BackendKind::Serial).name(), "serial");
        assert_eq!(backend_for(BackendKind::Parallel { threads: 2 }).name(), "parallel");
    }
}
