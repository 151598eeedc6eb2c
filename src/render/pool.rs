use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::backend::{DocumentBackend, RgbFrame};
use crate::error::{AppError, AppResult};

/// One raster request handed to a pool worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageJob {
    pub page: usize,
    pub scale: f32,
    pub generation: u64,
}

/// A finished raster, successful or not, tagged with the generation it
/// was queued under so the cache can refuse stale results.
#[derive(Debug)]
pub struct RasterJobDone {
    pub page: usize,
    pub generation: u64,
    pub render_scale: f32,
    pub result: AppResult<RgbFrame>,
    pub elapsed: Duration,
}

struct PoolRuntime {
    _owned: Option<Runtime>,
    handle: Handle,
}

impl PoolRuntime {
    fn new() -> AppResult<Self> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                _owned: None,
                handle,
            });
        }

        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("ovp-raster")
            .build()
            .map_err(|err| {
                AppError::io_with_context(err, "raster pool runtime failed to initialize")
            })?;
        let handle = runtime.handle().clone();
        Ok(Self {
            _owned: Some(runtime),
            handle,
        })
    }

    fn spawn_blocking<F>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }
}

/// Fixed-size background rasterizer pool.
///
/// Each worker owns its own fork of the document backend, so page
/// decoding never contends on a shared handle. Jobs travel over an
/// unbounded MPMC channel; any idle worker picks up the next one.
/// Results come back over a second channel and are ingested on the
/// event thread, which is the only writer of the raster cache. Workers
/// never consult the cache: a result for a page the event side already
/// rendered synchronously replaces the entry rather than being
/// skipped, which publish-by-replace makes safe.
pub struct RasterPool {
    job_tx: Option<flume::Sender<PageJob>>,
    result_rx: flume::Receiver<RasterJobDone>,
    in_flight: HashMap<usize, u64>,
    workers: Vec<JoinHandle<()>>,
    _runtime: PoolRuntime,
}

impl RasterPool {
    /// Forks `worker_threads` render handles off `doc` and starts the
    /// workers. Fails if the backend cannot be forked.
    pub fn spawn(doc: &dyn DocumentBackend, worker_threads: usize) -> AppResult<Self> {
        let worker_threads = worker_threads.max(1);
        let runtime = PoolRuntime::new()?;
        let (job_tx, job_rx) = flume::unbounded::<PageJob>();
        let (result_tx, result_rx) = flume::unbounded::<RasterJobDone>();

        let mut workers = Vec::with_capacity(worker_threads);
        for worker_index in 0..worker_threads {
            let fork = doc.fork_for_render()?;
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let worker = runtime.spawn_blocking(move || {
                raster_worker_main(worker_index, fork, job_rx, result_tx);
            });
            workers.push(worker);
        }

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            in_flight: HashMap::new(),
            workers,
            _runtime: runtime,
        })
    }

    /// Queues one page unless a render for it is already in flight.
    pub fn enqueue(&mut self, job: PageJob) -> bool {
        if self.in_flight.contains_key(&job.page) {
            return false;
        }
        let Some(job_tx) = &self.job_tx else {
            return false;
        };
        if job_tx.send(job).is_err() {
            return false;
        }
        self.in_flight.insert(job.page, job.generation);
        true
    }

    /// Queues every page of the document, the current page first so it
    /// lands in the cache soonest.
    pub fn enqueue_document(
        &mut self,
        current_page: usize,
        page_count: usize,
        scale: f32,
        generation: u64,
    ) -> usize {
        let mut queued = 0;
        if current_page < page_count {
            queued += usize::from(self.enqueue(PageJob {
                page: current_page,
                scale,
                generation,
            }));
        }
        for page in 0..page_count {
            if page == current_page {
                continue;
            }
            queued += usize::from(self.enqueue(PageJob {
                page,
                scale,
                generation,
            }));
        }
        queued
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn has_in_flight(&self, page: usize) -> bool {
        self.in_flight.contains_key(&page)
    }

    /// Non-blocking drain of finished jobs, in completion order.
    pub fn try_recv_done(&mut self) -> Option<RasterJobDone> {
        let done = self.result_rx.try_recv().ok()?;
        self.in_flight.remove(&done.page);
        Some(done)
    }

    /// Waits for the next finished job. Returns `None` once all workers
    /// have exited and the channel is drained.
    pub async fn recv_done(&mut self) -> Option<RasterJobDone> {
        let done = self.result_rx.recv_async().await.ok()?;
        self.in_flight.remove(&done.page);
        Some(done)
    }

    /// Waits until nothing is in flight, discarding results. Used on
    /// shutdown so worker forks are not torn down mid-render.
    pub async fn drain(&mut self) {
        while !self.in_flight.is_empty() {
            if self.recv_done().await.is_none() {
                break;
            }
        }
    }

    fn shutdown(&mut self) {
        // Closing the job channel lets idle workers exit on their own;
        // anything still rendering is abandoned.
        self.job_tx = None;
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for RasterPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn raster_worker_main(
    worker_index: usize,
    doc: Box<dyn DocumentBackend>,
    job_rx: flume::Receiver<PageJob>,
    result_tx: flume::Sender<RasterJobDone>,
) {
    while let Ok(job) = job_rx.recv() {
        let started = Instant::now();
        let result = doc.rasterize_page(job.page, job.scale, job.scale);
        let elapsed = started.elapsed();

        match &result {
            Ok(frame) => debug!(
                "worker {worker_index} rastered page {} at scale {:.3} ({}x{}) in {:?}",
                job.page, job.scale, frame.width, frame.height, elapsed
            ),
            Err(err) => warn!("worker {worker_index} failed page {}: {err}", job.page),
        }

        let done = RasterJobDone {
            page: job.page,
            generation: job.generation,
            render_scale: job.scale,
            result,
            elapsed,
        };
        if result_tx.send(done).is_err() {
            break;
        }
    }
}
