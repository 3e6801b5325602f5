use crossbeam::channel::{self, Receiver};
use crate::error::NormalizeError;
use crate::worker::WorkerResult;

///
/// What one submitted task produces. Fixed rather than generic over `Pool::submit`
/// so `Pool` stays object-safe - the mapper only ever needs `&dyn Pool` to swap
/// between the parallel and single-worker-fallback implementations at runtime.
///
pub type PoolOutcome = Result<WorkerResult, NormalizeError>;
pub type PoolTask = Box<dyn FnOnce() -> PoolOutcome + Send>;

///
/// Generalizes the externally-supplied worker pool (§5): something that can run
/// a boxed closure and report how wide it is. `RayonPool` is the production
/// implementation; `InlinePool` is the null-pool fallback used by the Spooler's
/// single-worker recovery path (§4.6 step 4) and by tests.
///
pub trait Pool: Send + Sync {
    ///
    /// Run `task` and deliver its result on the returned channel. The task is
    /// free to run on another thread (`RayonPool`) or synchronously before this
    /// call returns (`InlinePool`) - either way the receiver yields exactly one
    /// value.
    ///
    fn submit(&self, task: PoolTask) -> Receiver<PoolOutcome>;

    fn width(&self) -> usize;
}

///
/// Backed by a dedicated `rayon::ThreadPool` sized to `pool_width`, matching
/// `celerity`'s use of `rayon` for worker-pool parallelism.
///
pub struct RayonPool {
    inner: rayon::ThreadPool,
    width: usize,
}

impl RayonPool {
    pub fn new(width: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let width = width.max(1);
        let inner = rayon::ThreadPoolBuilder::new().num_threads(width).build()?;
        Ok(Self { inner, width })
    }
}

impl Pool for RayonPool {
    fn submit(&self, task: PoolTask) -> Receiver<PoolOutcome> {
        let (tx, rx) = channel::bounded(1);
        self.inner.spawn(move || {
            let result = task();
            // The receiver may have been dropped (mapper shutting down early); that's
            // not this thread's problem.
            let _ = tx.send(result);
        });
        rx
    }

    fn width(&self) -> usize {
        self.width
    }
}

///
/// The null-pool: runs the task synchronously on the calling thread before
/// returning, matching the original's `NullExecutor`. Used for the Spooler's
/// single-worker fallback (§4.6 step 4), where running in parallel would defeat
/// the point of the fallback.
///
#[derive(Default)]
pub struct InlinePool;

impl Pool for InlinePool {
    fn submit(&self, task: PoolTask) -> Receiver<PoolOutcome> {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(task());
        rx
    }

    fn width(&self) -> usize {
        1
    }
}
